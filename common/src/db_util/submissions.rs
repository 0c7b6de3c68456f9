use super::*;

diesel::table! {
    submissions (id) {
        id -> BigInt,
        vars -> Text,
        unixtime -> BigInt,
        kmpp -> Nullable<Double>,
        spread -> Nullable<BigInt>,
        path -> Text,
        config -> Text,
    }
}

#[derive(Queryable)]
#[diesel(table_name = submissions)]
struct SubmissionPrivate {
    id: i64,
    vars: String,
    unixtime: i64,
    kmpp: Option<f64>,
    spread: Option<i64>,
    path: String,
    config: String,
}

#[derive(Insertable)]
#[diesel(table_name = submissions)]
struct SubmissionPrivateNew {
    vars: String,
    unixtime: i64,
    kmpp: Option<f64>,
    spread: Option<i64>,
    path: String,
    config: String,
}

fn private_to_public(p: SubmissionPrivate) -> Result<SubmissionRecord> {
    use super::conversions::*;
    Ok(SubmissionRecord {
        submission_id: i64_to_u64(p.id)?,
        vars: p.vars,
        unixtime: p.unixtime,
        kmpp: p.kmpp,
        spread: p.spread,
        path: p.path,
        config: p.config,
    })
}

fn build_new_row(new: NewSubmission) -> SubmissionPrivateNew {
    SubmissionPrivateNew {
        vars: new.vars,
        unixtime: new.unixtime,
        kmpp: new.score.map(|s| s.kmpp),
        spread: new.score.map(|s| s.spread),
        path: new.path,
        config: new.config,
    }
}

/// Look up the submission ingested from the archive at `input_path`.
pub fn get_submission_by_path(
    conn: &mut SqliteConnection,
    input_path: &str,
) -> Result<Option<SubmissionRecord>> {
    use self::submissions::dsl::*;

    submissions
        .filter(path.eq(input_path))
        .first::<SubmissionPrivate>(conn)
        .optional()
        .map_err(|e| anyhow!("{e}"))?
        .map(private_to_public)
        .transpose()
}

/// Append a submission. Callers look the path up first; the unique index on `path`
/// rejects a second insert for the same archive.
pub fn insert_submission(
    conn: &mut SqliteConnection,
    new: NewSubmission,
) -> Result<SubmissionRecord> {
    use self::submissions::dsl::*;

    let insert_row = build_new_row(new);
    diesel::insert_into(submissions)
        .values(&insert_row)
        .execute(conn)
        .map_err(|e| anyhow!("could not insert {}: {e}", insert_row.path))?;

    get_submission_by_path(conn, &insert_row.path)?
        .ok_or_else(|| anyhow!("submission {} missing after insert", insert_row.path))
}

/// Number of submissions per configuration, scored or not.
pub fn get_counts_by_config(conn: &mut SqliteConnection) -> Result<BTreeMap<String, u64>> {
    use self::submissions::dsl::*;
    use diesel::dsl::count_star;

    let rows = submissions
        .group_by(config)
        .select((config, count_star()))
        .load::<(String, i64)>(conn)
        .map_err(|e| anyhow!("{e}"))?;

    rows.into_iter()
        .map(|(name, count)| Ok((name, conversions::i64_to_u64(count)?)))
        .collect()
}

/// The scored submission with the lowest kmpp for a configuration; ties go to the lowest id.
///
/// # Errors
/// Returns [`Error::NotFound`] if the configuration has no scored submission.
pub fn get_best_submission_for_config(
    conn: &mut SqliteConnection,
    input_config: &str,
) -> Result<SubmissionRecord> {
    use self::submissions::dsl::*;

    let best = submissions
        .filter(config.eq(input_config))
        .filter(kmpp.is_not_null())
        .order((kmpp.asc(), id.asc()))
        .first::<SubmissionPrivate>(conn)
        .optional()
        .map_err(|e| anyhow!("{e}"))?;

    match best {
        Some(row) => private_to_public(row),
        None => Err(Error::NotFound(input_config.to_string()).into()),
    }
}

/// Up to `k` positive kmpp scores for a configuration, lowest first when `ascending`.
pub fn get_top_scores_for_config(
    conn: &mut SqliteConnection,
    input_config: &str,
    k: usize,
    ascending: bool,
) -> Result<Vec<f64>> {
    use self::submissions::dsl::*;

    let limit = conversions::usize_to_i64(k)?;
    let positive = submissions
        .select(kmpp)
        .filter(config.eq(input_config))
        .filter(kmpp.gt(0.0));
    let rows = if ascending {
        positive.order(kmpp.asc()).limit(limit).load::<Option<f64>>(conn)
    } else {
        positive.order(kmpp.desc()).limit(limit).load::<Option<f64>>(conn)
    }
    .map_err(|e| anyhow!("{e}"))?;

    Ok(rows.into_iter().flatten().collect())
}

/// Every submission for a configuration that has no score, oldest first.
pub fn get_unscored_submissions_for_config(
    conn: &mut SqliteConnection,
    input_config: &str,
) -> Result<Vec<SubmissionRecord>> {
    use self::submissions::dsl::*;

    let items_private: Vec<SubmissionPrivate> = submissions
        .filter(config.eq(input_config))
        .filter(kmpp.is_null())
        .order(id.asc())
        .load(conn)
        .map_err(|e| anyhow!("{e}"))?;

    items_private
        .into_iter()
        .map(private_to_public)
        .collect::<Result<Vec<SubmissionRecord>>>()
}
