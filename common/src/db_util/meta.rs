//! Process metadata kept beside the submissions.

use super::*;

diesel::table! {
    vars (name) {
        name -> Text,
        value -> Nullable<Text>,
    }
}

/// Set a metadata value, replacing any previous one.
pub fn set_var(conn: &mut SqliteConnection, input_name: &str, input_value: &str) -> Result<()> {
    use self::vars::dsl::*;

    diesel::replace_into(vars)
        .values((name.eq(input_name), value.eq(input_value)))
        .execute(conn)
        .map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

/// Get a metadata value if it has been set.
pub fn get_var(conn: &mut SqliteConnection, input_name: &str) -> Result<Option<String>> {
    use self::vars::dsl::*;

    let found = vars
        .filter(name.eq(input_name))
        .select(value)
        .first::<Option<String>>(conn)
        .optional()
        .map_err(|e| anyhow!("{e}"))?;
    Ok(found.flatten())
}
