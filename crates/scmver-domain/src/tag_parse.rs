use regex::Regex;
use tracing::{debug, warn};

use crate::version_cls::TagVersion;

/// The default tag pattern: an optional project prefix of word characters and
/// dashes, an optional `v`/`V`, the version body, and a discarded build
/// metadata segment introduced by `+`.
pub const DEFAULT_TAG_REGEX: &str =
    r"^(?:[\w-]+-)?(?P<version>[vV]?\d+(?:\.\d+){0,2}[^+]*)(?:\+.*)?$";

/// Failure to turn a tag string into a version.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TagParseError {
    #[error("tag '{tag}' did not match tag_regex '{pattern}'")]
    NoMatch { tag: String, pattern: String },
    #[error("tag_regex '{pattern}' matched tag '{tag}', but the version group is empty")]
    EmptyMatch { tag: String, pattern: String },
    #[error("tag '{tag}' carries version '{version}' which is not PEP 440: {reason}")]
    InvalidVersion {
        tag: String,
        version: String,
        reason: String,
    },
}

/// The pieces of a matched tag: the version body plus whatever the regex
/// matched before and after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    pub version: String,
    pub prefix: String,
    pub suffix: String,
}

/// Compile a tag regex, warning when it cannot identify a version group.
///
/// The pattern must expose the version body either as a group named
/// `version` or as its sole capture group.
pub fn check_tag_regex(pattern: Option<&str>) -> Result<Regex, regex::Error> {
    let pattern = match pattern {
        Some(p) if !p.is_empty() => p,
        _ => DEFAULT_TAG_REGEX,
    };
    let regex = Regex::new(pattern)?;
    let group_count = regex.captures_len() - 1;
    let has_version_group = regex
        .capture_names()
        .any(|name| name == Some("version"));
    if group_count == 0 || (group_count > 1 && !has_version_group) {
        warn!(
            pattern,
            "expected tag_regex to contain a single match group or a group named \
             'version' to identify the version part of any tag"
        );
    }
    Ok(regex)
}

/// Apply `regex` to a tag string and slice out the version body.
pub fn parse_version_tag(tag: &str, regex: &Regex) -> Result<TagMatch, TagParseError> {
    let Some(caps) = regex.captures(tag) else {
        debug!(tag, "tag did not parse");
        return Err(TagParseError::NoMatch {
            tag: tag.to_owned(),
            pattern: regex.as_str().to_owned(),
        });
    };
    let group = if caps.len() == 2 {
        caps.get(1)
    } else {
        caps.name("version")
    };
    let full = caps.get(0).expect("group 0 always participates");
    match group {
        Some(version) if !version.as_str().is_empty() => {
            let result = TagMatch {
                version: version.as_str().to_owned(),
                prefix: tag[full.start()..version.start()].to_owned(),
                suffix: tag[version.end()..full.end()].to_owned(),
            };
            debug!(tag, ?result, "tag parsed");
            Ok(result)
        }
        _ => Err(TagParseError::EmptyMatch {
            tag: tag.to_owned(),
            pattern: regex.as_str().to_owned(),
        }),
    }
}

/// Turn a possibly prefixed tag into a version, honoring `normalize`.
///
/// A suffix matched after the version body (e.g. local build data) is kept
/// when the combined text still parses; otherwise it is stripped with a
/// warning.
pub fn tag_to_version(
    tag: &str,
    regex: &Regex,
    normalize: bool,
) -> Result<TagVersion, TagParseError> {
    let tag_match = parse_version_tag(tag, regex)?;
    let base = TagVersion::parse(&tag_match.version, normalize).map_err(|reason| {
        TagParseError::InvalidVersion {
            tag: tag.to_owned(),
            version: tag_match.version.clone(),
            reason,
        }
    })?;
    if tag_match.suffix.is_empty() {
        return Ok(base);
    }
    let combined = format!("{}{}", tag_match.version, tag_match.suffix);
    match TagVersion::parse(&combined, normalize) {
        Ok(version) => {
            debug!(tag, suffix = %tag_match.suffix, "tag includes build data, preserving it");
            Ok(version)
        }
        Err(_) => {
            warn!(tag, suffix = %tag_match.suffix, "tag will be stripped of its suffix");
            Ok(base)
        }
    }
}
