use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::debug;

use scmver_domain::{tag_to_version, ScmVersion, ScmVersionBuilder, TagVersion};

use crate::backends::git;
use crate::config::Configuration;
use crate::diagnostics::Diagnostics;
use crate::overrides;

pub const GIT_ARCHIVAL_FILE: &str = ".git_archival.txt";
pub const HG_ARCHIVAL_FILE: &str = ".hg_archival.txt";

/// Parse an RFC-822-style `key: value` substitution file.
fn data_from_archival(path: &Path) -> Option<BTreeMap<String, String>> {
    let contents = fs::read_to_string(path).ok()?;
    let mut data = BTreeMap::new();
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(':') {
            data.insert(key.trim().to_owned(), value.trim().to_owned());
        }
    }
    Some(data)
}

fn node_date_from(data: &BTreeMap<String, String>) -> Option<Date> {
    let raw = data.get("node-date")?;
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .map(|stamp| stamp.to_offset(time::UtcOffset::UTC).date())
}

/// Synthesize a version from `.git_archival.txt` in an exported archive.
///
/// Unexpanded `$Format:…$` placeholders mean the hosting did not substitute
/// the file; it is then treated as absent with a warning.
pub fn parse_git_archival(
    root: &Path,
    config: &Configuration,
    diag: &Diagnostics,
) -> Result<Option<ScmVersion>> {
    let path = root.join(GIT_ARCHIVAL_FILE);
    let Some(data) = data_from_archival(&path) else {
        return Ok(None);
    };
    if data.values().any(|value| value.contains("$Format")) {
        diag.warn_once(&format!(
            "'{}' contains unexpanded $Format$ placeholders, ignoring it",
            path.display()
        ));
        return Ok(None);
    }

    let node_date = node_date_from(&data);
    let time = overrides::source_epoch_or_utc_now();

    if let Some(describe_name) = data.get("describe-name") {
        let described = git::parse_describe(describe_name)?;
        let tag = tag_to_version(&described.tag, &config.tag_regex, config.normalize)?;
        return Ok(Some(
            ScmVersionBuilder::new(tag, time)
                .distance(described.distance)
                .node(Some(described.node))
                .node_date(node_date)
                .build(),
        ));
    }

    let node = data
        .get("node")
        .filter(|node| !node.is_empty())
        .map(|node| format!("g{}", &node[..node.len().min(7)]));

    // Without a describe, a version tag in ref-names pins an exact release.
    if let Some(ref_names) = data.get("ref-names") {
        for entry in ref_names.split(',') {
            let Some(candidate) = entry.trim().strip_prefix("tag: ") else {
                continue;
            };
            if let Ok(tag) = tag_to_version(candidate, &config.tag_regex, config.normalize) {
                return Ok(Some(
                    ScmVersionBuilder::new(tag, time)
                        .node(node)
                        .node_date(node_date)
                        .build(),
                ));
            }
        }
    }

    if node.is_none() {
        debug!(path = %path.display(), "archival file carries no usable metadata");
        return Ok(None);
    }
    let tag = TagVersion::parse("0.0", config.normalize).expect("sentinel version parses");
    Ok(Some(
        ScmVersionBuilder::new(tag, time)
            .node(node)
            .node_date(node_date)
            .build(),
    ))
}

/// Synthesize a version from `.hg_archival.txt`.
pub fn parse_hg_archival(root: &Path, config: &Configuration) -> Result<Option<ScmVersion>> {
    let path = root.join(HG_ARCHIVAL_FILE);
    let Some(data) = data_from_archival(&path) else {
        return Ok(None);
    };
    let time = overrides::source_epoch_or_utc_now();
    let node = data
        .get("node")
        .filter(|node| !node.is_empty())
        .map(|node| format!("h{}", &node[..node.len().min(12)]));
    let branch = data.get("branch").cloned();

    if let Some(tag) = data.get("tag") {
        let tag = tag_to_version(tag, &config.tag_regex, config.normalize)?;
        return Ok(Some(
            ScmVersionBuilder::new(tag, time)
                .node(node)
                .branch(branch)
                .build(),
        ));
    }

    match data.get("latesttag") {
        Some(latest) if latest != "null" => {
            let distance = data
                .get("latesttagdistance")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0);
            let tag = tag_to_version(latest, &config.tag_regex, config.normalize)?;
            Ok(Some(
                ScmVersionBuilder::new(tag, time)
                    .distance(distance)
                    .node(node)
                    .branch(branch)
                    .build(),
            ))
        }
        _ => {
            let tag =
                TagVersion::parse("0.0", config.normalize).expect("sentinel version parses");
            Ok(Some(
                ScmVersionBuilder::new(tag, time)
                    .node(node)
                    .branch(branch)
                    .build(),
            ))
        }
    }
}
