use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use time::{Date, Month};
use tracing::warn;

use super::SchemeContext;
use crate::scm_version::ScmVersion;
use crate::tag_parse::parse_version_tag;
use crate::version_cls::TagVersion;

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<date>(?P<prefix>[vV]?)(?P<year>\d{2}|\d{4})(?:\.\d{1,2}){2})(?:\.(?P<patch>\d*))?$",
        )
        .expect("date pattern compiles")
    })
}

fn parse_tag_date(date: &str) -> Result<Date> {
    let fields: Vec<&str> = date.split('.').collect();
    let [year, month, day] = fields[..] else {
        return Err(anyhow!("date tag '{date}' does not have three fields"));
    };
    let year: i32 = year.trim_start_matches(['v', 'V']).parse()?;
    // Two-digit years follow the strptime pivot: 00-68 map into the 2000s.
    let year = match year {
        0..=68 => year + 2000,
        69..=99 => year + 1900,
        _ => year,
    };
    let month = Month::try_from(month.parse::<u8>()?)?;
    let day: u8 = day.parse()?;
    Ok(Date::from_calendar_date(year, month, day)?)
}

/// Guess the next date-based version: same day as the tag bumps the patch,
/// any other day restarts at patch 0 on the head date.
fn guess_next_date_ver(version: &ScmVersion, ctx: &SchemeContext<'_>) -> Result<String> {
    let tag_str = version.tag.to_string();
    let captures = date_regex().captures(&tag_str);
    if captures.is_none() {
        warn!(tag = %tag_str, "tag does not correspond to a valid versioning date, assuming legacy version");
    }
    let (prefix, long_year) = captures
        .as_ref()
        .map(|c| (c.name("prefix").map_or("", |m| m.as_str()), c["year"].len() == 4))
        .unwrap_or(("", false));

    let today = version.time.date();
    let head_date = version.node_date.unwrap_or(today);
    let tag_date = match &captures {
        // Legacy non-date tags always restart at patch 0.
        None => head_date.previous_day().unwrap_or(head_date),
        Some(c) => parse_tag_date(&c["date"])?,
    };

    let patch = if captures.is_some() && tag_date == head_date {
        let current: u64 = captures
            .as_ref()
            .and_then(|c| c.name("patch"))
            .map_or(Ok(0), |m| {
                if m.as_str().is_empty() {
                    Ok(0)
                } else {
                    m.as_str().parse()
                }
            })?;
        current + 1
    } else {
        if captures.is_some() && tag_date > head_date {
            warn!(%tag_date, %head_date, "previous tag is ahead of the node date");
        }
        0
    };

    let candidate = if long_year {
        format!(
            "{prefix}{:04}.{:02}.{:02}.{patch}",
            head_date.year(),
            u8::from(head_date.month()),
            head_date.day()
        )
    } else {
        format!(
            "{prefix}{:02}.{:02}.{:02}.{patch}",
            head_date.year() % 100,
            u8::from(head_date.month()),
            head_date.day()
        )
    };
    // Round-trip through the version type so leading zeros normalize away.
    let next = TagVersion::parse(&candidate, ctx.normalize)
        .map_err(|reason| anyhow!("guessed date version '{candidate}' is invalid: {reason}"))?;
    Ok(next.to_string())
}

pub(super) fn calver_by_date(version: &ScmVersion, ctx: &SchemeContext<'_>) -> Result<String> {
    if version.exact() {
        return Ok(version.format_with("{tag}"));
    }
    if let Some(branch) = &version.branch {
        // A release-YY.MM.DD branch pins the version it is named after.
        if branch.starts_with("release-") {
            let last = branch.rsplit('-').next().unwrap_or("");
            if let Ok(branch_match) = parse_version_tag(last, ctx.tag_regex) {
                if date_regex().is_match(&branch_match.version) {
                    return Ok(branch_match.version);
                }
            }
        }
    }
    let guessed = guess_next_date_ver(version, ctx)?;
    Ok(version.format_next_version(&guessed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm_version::ScmVersionBuilder;
    use crate::tag_parse::check_tag_regex;
    use std::path::Path;
    use time::macros::{date, datetime};

    fn scm(tag: &str, distance: u64, node_date: Option<Date>) -> ScmVersion {
        ScmVersionBuilder::new(
            TagVersion::parse(tag, true).unwrap(),
            datetime!(2024-01-01 00:00:00 UTC),
        )
        .distance(distance)
        .node(Some("g1234567".into()))
        .node_date(node_date)
        .build()
    }

    fn render(version: &ScmVersion) -> String {
        let regex = check_tag_regex(None).unwrap();
        let ctx = SchemeContext {
            tag_regex: &regex,
            normalize: true,
            root: Path::new("."),
        };
        calver_by_date(version, &ctx).unwrap()
    }

    #[test]
    fn exact_tag_passes_through() {
        assert_eq!(render(&scm("2023.12.24", 0, None)), "2023.12.24");
    }

    #[test]
    fn other_day_restarts_patch_on_head_date() {
        let version = scm("2023.12.24", 3, Some(date!(2024 - 01 - 01)));
        assert_eq!(render(&version), "2024.1.1.0.dev3");
    }

    #[test]
    fn same_day_bumps_patch() {
        let version = scm("2024.1.1", 1, Some(date!(2024 - 01 - 01)));
        assert_eq!(render(&version), "2024.1.1.1.dev1");
    }

    #[test]
    fn build_time_is_used_without_node_date() {
        let version = scm("2023.12.24", 2, None);
        assert_eq!(render(&version), "2024.1.1.0.dev2");
    }

    #[test]
    fn legacy_tag_falls_back_to_short_year_date() {
        let version = scm("1.2.3", 2, Some(date!(2024 - 01 - 01)));
        assert_eq!(render(&version), "24.1.1.0.dev2");
    }
}
