use std::fmt;
use std::str::FromStr;

use pep440_rs::Version;

/// A parsed tag version.
///
/// Both variants validate against PEP 440; they differ in how they render.
/// `Normalized` prints the canonical form, `NonNormalized` keeps the raw
/// text as written in the tag (casing, `v` prefix, separator spelling).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagVersion {
    Normalized(Version),
    NonNormalized { raw: String, parsed: Version },
}

impl TagVersion {
    /// Parse `text` with the requested normalization behavior.
    pub fn parse(text: &str, normalize: bool) -> Result<Self, String> {
        let parsed = Version::from_str(text).map_err(|err| err.to_string())?;
        if normalize {
            Ok(Self::Normalized(parsed))
        } else {
            Ok(Self::NonNormalized {
                raw: text.to_owned(),
                parsed,
            })
        }
    }

    /// The underlying PEP 440 version, regardless of rendering behavior.
    pub fn version(&self) -> &Version {
        match self {
            Self::Normalized(v) => v,
            Self::NonNormalized { parsed, .. } => parsed,
        }
    }

    pub fn is_normalized(&self) -> bool {
        matches!(self, Self::Normalized(_))
    }
}

impl fmt::Display for TagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalized(v) => write!(f, "{v}"),
            Self::NonNormalized { raw, .. } => f.write_str(raw),
        }
    }
}

/// One component of a version tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuplePart {
    Number(u64),
    Text(String),
}

impl fmt::Display for TuplePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Split a rendered version into tuple components for version-file writers:
/// dotted fields become numbers where they parse and strings otherwise, and
/// a local segment is kept as a single trailing string field.
pub fn version_as_tuple(version: &str) -> Vec<TuplePart> {
    let (public, local) = match version.split_once('+') {
        Some((public, local)) => (public, Some(local)),
        None => (version, None),
    };
    let mut parts: Vec<TuplePart> = public
        .split('.')
        .map(|field| match field.parse::<u64>() {
            Ok(n) => TuplePart::Number(n),
            Err(_) => TuplePart::Text(field.to_owned()),
        })
        .collect();
    if let Some(local) = local {
        parts.push(TuplePart::Text(format!("+{local}")));
    }
    parts
}

/// Drop the dev and local segments of a rendered version, keeping epoch,
/// release, pre and post parts. Non-PEP 440 input is returned untouched.
pub fn strip_dev_and_local(version: &str) -> String {
    match Version::from_str(version) {
        Ok(parsed) => parsed.without_local().with_dev(None).to_string(),
        Err(_) => version.to_owned(),
    }
}
