use anyhow::Result;
use time::format_description::FormatItem;
use time::macros::format_description;

use super::SchemeContext;
use crate::scm_version::ScmVersion;

const DATE_COMPACT: &[FormatItem<'static>] = format_description!("[year][month][day]");
const TIMESTAMP_COMPACT: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Shared body of the node-carrying local schemes. `stamp_fmt` renders the
/// build timestamp either as a date or as a full timestamp.
fn format_local_with_time(
    version: &ScmVersion,
    stamp_fmt: &[FormatItem<'_>],
) -> Result<String> {
    let stamp = version.time.format(stamp_fmt)?;
    Ok(match &version.node {
        Some(node) if version.distance > 0 => {
            if version.dirty {
                format!("+{node}.d{stamp}")
            } else {
                format!("+{node}")
            }
        }
        _ => {
            if version.dirty {
                format!("+d{stamp}")
            } else {
                String::new()
            }
        }
    })
}

pub(super) fn node_and_date(version: &ScmVersion, _ctx: &SchemeContext<'_>) -> Result<String> {
    format_local_with_time(version, DATE_COMPACT)
}

pub(super) fn node_and_timestamp(
    version: &ScmVersion,
    _ctx: &SchemeContext<'_>,
) -> Result<String> {
    format_local_with_time(version, TIMESTAMP_COMPACT)
}

pub(super) fn dirty_tag(version: &ScmVersion, _ctx: &SchemeContext<'_>) -> Result<String> {
    Ok(version.format_choice("", "+dirty"))
}

pub(super) fn no_local_version(
    _version: &ScmVersion,
    _ctx: &SchemeContext<'_>,
) -> Result<String> {
    Ok(String::new())
}
