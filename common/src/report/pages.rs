//! HTML for the published tree.
//!
//! Pages come from templates in the templates directory when present, with `${name}`
//! placeholders filled in. Templates are read at most once per run.

use crate::best::{ConfigSummary, newest_winner};
use crate::{SubmissionRecord, split_config_name};
use itertools::Itertools;
use log::{debug, warn};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const INDEX_PAGE_TEMPLATE: &str = "index_page.html";
pub const REGION_PAGE_TEMPLATE: &str = "region_page.html";
pub const SITE_INDEX_TEMPLATE: &str = "site_index.html";
pub const ANALYTICS_SNIPPET: &str = "google_analytics";
pub const STYLESHEET: &str = "report.css";

const DEFAULT_INDEX_PAGE: &str = r#"<!doctype html>
<html><head><title>${statename}</title><link rel="stylesheet" href="${rooturl}report.css" /></head><body>
<div class="nav">${statenav}</div>
<h1>${statename}</h1>
<p><a href="${ba_large}"><img src="${ba_small}" /></a></p>
<table class="score"><tr><th>kmpp</th><td>${my_kmpp}</td></tr><tr><th>spread</th><td>${my_spread}</td></tr></table>
<p><a href="${permalink}">submission ${submission_id}</a>
 | <a href="solution.dsz">solution.dsz</a> | <a href="solution.csv.gz">solution.csv.gz</a> | <a href="solution.zip">solution.zip</a></p>
${racedata}
${extra}
<p class="share"><a href="http://www.facebook.com/sharer.php?u=${cgipageabsurl}">share</a></p>
${google_analytics}
</body></html>
"#;

const DEFAULT_REGION_PAGE: &str = r#"<!doctype html>
<html><head><title>${statename}</title><link rel="stylesheet" href="${rooturl}report.css" /></head><body>
<div class="nav">${statenav}</div>
<h1>${statename}</h1>
<table>
${bodyrows}
</table>
${extra}
<p class="share"><a href="http://www.facebook.com/sharer.php?u=${cgipageabsurl}">share</a></p>
${google_analytics}
</body></html>
"#;

const DEFAULT_SITE_INDEX: &str = r#"<!doctype html>
<html><head><title>best districting results</title><link rel="stylesheet" href="${rooturl}report.css" /></head><body>
<div class="nav">${statenav}</div>
<h1>best districting results</h1>
<p class="gentime">Generated ${localtime}</p>
${winner}
${google_analytics}
</body></html>
"#;

/// Replace every `${name}` in `template` with its value in one pass, so placeholders
/// inside values are left alone. Unknown placeholders stay.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let found = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(n, _)| *n == name)
                .map(|(_, value)| (*value, end))
        });
        match found {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Join URL parts with exactly one `/` between them. The first part's leading slash and
/// the last part's trailing slash are kept as given; empty parts are skipped.
pub fn urljoin(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if out.is_empty() {
            out.push_str(part);
            continue;
        }
        match (out.ends_with('/'), part.starts_with('/')) {
            (true, true) => out.push_str(&part[1..]),
            (false, false) => {
                out.push('/');
                out.push_str(part);
            }
            _ => out.push_str(part),
        }
    }
    out
}

/// `quote_plus` style encoding for URLs embedded in query strings.
pub fn quote(url: &str) -> String {
    form_urlencoded::byte_serialize(url.as_bytes()).collect()
}

/// Human label for a configuration, e.g. `MA Congress`.
pub fn display_name(config: &str) -> String {
    match split_config_name(config) {
        (region, "") => region.to_string(),
        (region, variant) => format!("{region} {variant}"),
    }
}

/// Scored variants per region, regions in order, `Congress` first within each region.
pub fn scored_variants(summaries: &[ConfigSummary]) -> BTreeMap<&str, Vec<&str>> {
    let mut regions: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for summary in summaries.iter().filter(|s| s.best.is_some()) {
        let (region, variant) = split_config_name(&summary.config);
        regions.entry(region).or_default().push(variant);
    }
    for variants in regions.values_mut() {
        variants.sort_by_key(|v| (*v != "Congress", *v));
    }
    regions
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!("could not read {}: {e}", path.display());
            None
        }
    }
}

/// Page rendering for one run. Holds the cached templates.
pub struct Pages {
    templates: Option<PathBuf>,
    root_url: String,
    site_url: String,
    index_page: OnceCell<String>,
    region_page: OnceCell<String>,
    site_index: OnceCell<String>,
    analytics: OnceCell<String>,
    nav_all: OnceCell<String>,
}

impl Pages {
    pub fn new(templates: Option<PathBuf>, root_url: &str, site_url: &str) -> Self {
        Self {
            templates,
            root_url: root_url.to_string(),
            site_url: site_url.to_string(),
            index_page: OnceCell::new(),
            region_page: OnceCell::new(),
            site_index: OnceCell::new(),
            analytics: OnceCell::new(),
            nav_all: OnceCell::new(),
        }
    }

    fn template<'c>(&self, cell: &'c OnceCell<String>, name: &str, default: &str) -> &'c str {
        cell.get_or_init(|| {
            let found = self
                .templates
                .as_ref()
                .and_then(|dir| read_optional(&dir.join(name)));
            if found.is_none() {
                debug!("using built-in {name}");
            }
            found.unwrap_or_else(|| default.to_string())
        })
    }

    fn analytics(&self) -> &str {
        self.analytics.get_or_init(|| {
            self.templates
                .as_ref()
                .and_then(|dir| read_optional(&dir.join(ANALYTICS_SNIPPET)))
                .unwrap_or_default()
        })
    }

    /// The stylesheet to publish beside the site index, if the templates provide one.
    pub fn stylesheet(&self) -> Option<PathBuf> {
        self.templates
            .as_ref()
            .map(|dir| dir.join(STYLESHEET))
            .filter(|path| path.is_file())
    }

    /// Link table of every scored configuration, grouped by region. `current` is shown
    /// unlinked and its region highlighted. The table for no current configuration is
    /// built once per run.
    pub fn nav(&self, current: Option<&str>, summaries: &[ConfigSummary]) -> String {
        match current {
            None => self
                .nav_all
                .get_or_init(|| self.build_nav(None, summaries))
                .clone(),
            Some(_) => self.build_nav(current, summaries),
        }
    }

    fn build_nav(&self, current: Option<&str>, summaries: &[ConfigSummary]) -> String {
        let mut out = String::from(r#"<table class="snl">"#);
        for (region, variants) in scored_variants(summaries) {
            let mut is_current = false;
            let cells = variants
                .iter()
                .map(|variant| {
                    let config = format!("{region}_{variant}");
                    if current == Some(config.as_str()) {
                        is_current = true;
                        format!("<td><b>{variant}</b></td>")
                    } else {
                        let href = urljoin(&[&self.root_url, &config]) + "/";
                        format!(r#"<td><a href="{href}">{variant}</a></td>"#)
                    }
                })
                .join(" ");
            let class = if is_current { "slgC" } else { "slg" };
            let href = urljoin(&[&self.root_url, region]) + "/";
            let _ = write!(
                out,
                r#"<tr class="{class}"><td><a href="{href}">{region}</a></td>{cells}</tr>"#
            );
        }
        out.push_str("</table>");
        out
    }

    /// Page for one published submission, served from `<config>/<id>/` and `<config>/`.
    pub fn config_page(
        &self,
        best: &SubmissionRecord,
        summaries: &[ConfigSummary],
        race_html: Option<&str>,
        extra_html: Option<&str>,
    ) -> String {
        let config = best.config.as_str();
        let id = best.submission_id.to_string();
        let racedata = race_html
            .map(|race| format!("<h3>Population Race Breakdown Per District</h3>{race}"))
            .unwrap_or_default();
        let permalink = urljoin(&[&self.root_url, config, &id]) + "/";
        let page_url = quote(&(urljoin(&[&self.site_url, &self.root_url, config]) + "/"));
        let image_url = quote(&urljoin(&[&self.site_url, &self.root_url, config, "map500.png"]));
        let kmpp = best.kmpp.map(|k| k.to_string()).unwrap_or_default();
        let spread = best.spread.map(|s| s.to_string()).unwrap_or_default();

        substitute(
            self.template(&self.index_page, INDEX_PAGE_TEMPLATE, DEFAULT_INDEX_PAGE),
            &[
                ("statename", &display_name(config)),
                ("statenav", &self.nav(Some(config), summaries)),
                ("ba_large", "map.png"),
                ("ba_small", "map500.png"),
                ("my_kmpp", &kmpp),
                ("my_spread", &spread),
                ("submission_id", &id),
                ("permalink", &permalink),
                ("racedata", &racedata),
                ("extra", extra_html.unwrap_or_default()),
                ("rooturl", &self.root_url),
                ("cgipageabsurl", &page_url),
                ("cgiimageurl", &image_url),
                ("google_analytics", self.analytics()),
            ],
        )
    }

    /// Page listing every scored variant of `region`, or `None` if it has none.
    pub fn region_page(
        &self,
        region: &str,
        summaries: &[ConfigSummary],
        extra_html: Option<&str>,
    ) -> Option<String> {
        let regions = scored_variants(summaries);
        let variants = regions.get(region)?;
        let first = format!("{region}_{}", variants.first()?);
        let bodyrows = variants
            .iter()
            .map(|variant| {
                let config = format!("{region}_{variant}");
                let url = urljoin(&[&self.root_url, &config]) + "/";
                format!(
                    r#"<tr><td><div><a href="{url}">{name}</a></div><div><a href="{url}"><img src="{url}map500.png" height="150"></a></div></td></tr>"#,
                    name = display_name(&config)
                )
            })
            .join("\n");
        let page_url = quote(&(urljoin(&[&self.site_url, &self.root_url, region]) + "/"));
        let image_url = quote(&urljoin(&[&self.site_url, &self.root_url, &first, "map500.png"]));

        Some(substitute(
            self.template(&self.region_page, REGION_PAGE_TEMPLATE, DEFAULT_REGION_PAGE),
            &[
                ("statename", region),
                ("statenav", &self.nav(None, summaries)),
                ("bodyrows", &bodyrows),
                ("extra", extra_html.unwrap_or_default()),
                ("rooturl", &self.root_url),
                ("cgipageabsurl", &page_url),
                ("cgiimageurl", &image_url),
                ("google_analytics", self.analytics()),
            ],
        ))
    }

    /// Top level page naming the newest winner.
    pub fn site_index(&self, summaries: &[ConfigSummary], generated: &str) -> String {
        let winner = newest_winner(summaries).map(|s| s.config.as_str());
        let (nwinner, nwinnername, winner_html) = match winner {
            Some(config) => {
                let url = urljoin(&[&self.root_url, config]) + "/";
                let name = display_name(config);
                let html = format!(
                    r#"<p>Newest winning result: <a href="{url}">{name}</a><br /><a href="{url}"><img src="{url}map500.png" /></a></p>"#
                );
                (config.to_string(), name, html)
            }
            None => (
                String::new(),
                String::new(),
                "<p>No configuration has a scored solution yet.</p>".to_string(),
            ),
        };
        let page_url = quote(&urljoin(&[&self.site_url, &self.root_url]));
        let image_url = quote(&urljoin(&[&self.site_url, &self.root_url, &nwinner, "map500.png"]));

        substitute(
            self.template(&self.site_index, SITE_INDEX_TEMPLATE, DEFAULT_SITE_INDEX),
            &[
                ("statenav", &self.nav(None, summaries)),
                ("rooturl", &self.root_url),
                ("localtime", generated),
                ("nwinner", &nwinner),
                ("nwinnername", &nwinnername),
                ("winner", &winner_html),
                ("cgipageabsurl", &page_url),
                ("cgiimageurl", &image_url),
                ("google_analytics", self.analytics()),
            ],
        )
    }

    /// Single-page overview of every configuration, for operators.
    pub fn summary_report(&self, summaries: &[ConfigSummary], generated: &str) -> String {
        let mut out = format!(
            r#"<!doctype html>
<html><head><title>solution report</title><link rel="stylesheet" href="report.css" /></head><body><h1>solution report</h1><p class="gentime">Generated {generated}</p>
"#
        );
        let _ = writeln!(out, r#"<div style="float:left"><div></div>{}</div>"#, self.nav(None, summaries));
        match newest_winner(summaries) {
            Some(winner) => {
                let config = &winner.config;
                let _ = writeln!(
                    out,
                    r#"<p>Newest winning result: <a href="{config}/">{config}</a><br /><img src="{config}/map500.png"></p>"#
                );
            }
            None => out.push_str("<p>No configuration has a scored solution yet.</p>\n"),
        }

        let unsolved = summaries
            .iter()
            .filter(|s| s.best.is_none())
            .map(|s| {
                format!(
                    r#"<tr><td><a href="{0}/failures.csv">{0}</a></td><td>{1}</td></tr>"#,
                    s.config, s.count
                )
            })
            .join("\n");
        if !unsolved.is_empty() {
            let _ = writeln!(out, "<h2>no solution</h2>\n<table>{unsolved}\n</table>");
        }

        out.push_str("<table><tr><th>config name</th><th>num<br>solutions<br>reported</th><th>best kmpp</th><th>spread</th><th>id</th><th>path</th></tr>\n");
        for summary in summaries {
            let Some(best) = &summary.best else {
                continue;
            };
            let _ = writeln!(
                out,
                r#"<tr><td><a href="{0}/">{0}</a></td><td>{1}</td><td>{2}</td><td>{3}</td><td>{4}</td><td>{5}</td></tr>"#,
                summary.config,
                summary.count,
                best.kmpp.map(|k| k.to_string()).unwrap_or_default(),
                best.spread.map(|s| s.to_string()).unwrap_or_default(),
                best.submission_id,
                best.path
            );
        }
        out.push_str("</table>\n</body></html>\n");
        out
    }
}
