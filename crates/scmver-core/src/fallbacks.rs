use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::debug;

use scmver_domain::{tag_to_version, ScmVersion, ScmVersionBuilder, TagVersion};

use crate::config::Configuration;
use crate::overrides;

/// Minimal RFC-822 header scan of an sdist `PKG-INFO`: only the headers
/// before the first blank line are considered.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PkgInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

pub fn read_pkg_info(root: &Path) -> Option<PkgInfo> {
    let contents = fs::read_to_string(root.join("PKG-INFO")).ok()?;
    let mut info = PkgInfo::default();
    for line in contents.lines() {
        if line.trim().is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "Name" => info.name = Some(value.trim().to_owned()),
                "Version" => info.version = Some(value.trim().to_owned()),
                _ => {}
            }
        }
    }
    Some(info)
}

/// An extracted sdist carries its version preformatted in `PKG-INFO`.
pub fn parse_pkginfo(root: &Path) -> Result<Option<ScmVersion>> {
    let Some(info) = read_pkg_info(root) else {
        return Ok(None);
    };
    let Some(version) = info.version else {
        debug!(root = %root.display(), "PKG-INFO has no Version header");
        return Ok(None);
    };
    debug!(%version, "version found in PKG-INFO");
    Ok(Some(preformatted(&version)?))
}

/// The `parentdir_prefix_version` rule: a directory named
/// `<prefix><version>` (typical of extracted archives) yields the version.
pub fn parse_parentdir(config: &Configuration) -> Result<Option<ScmVersion>> {
    let Some(prefix) = &config.parentdir_prefix_version else {
        return Ok(None);
    };
    let Some(basename) = config.absolute_root.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let Some(remainder) = basename.strip_prefix(prefix.as_str()) else {
        return Ok(None);
    };
    match tag_to_version(remainder, &config.tag_regex, config.normalize) {
        Ok(tag) => Ok(Some(
            ScmVersionBuilder::new(tag, overrides::source_epoch_or_utc_now())
                .preformatted(true)
                .build(),
        )),
        Err(err) => {
            debug!(basename, %err, "directory name does not carry a version");
            Ok(None)
        }
    }
}

/// The configured last-resort version.
pub fn parse_fallback_version(config: &Configuration) -> Result<Option<ScmVersion>> {
    match &config.fallback_version {
        Some(version) => {
            debug!(%version, "using fallback version");
            Ok(Some(preformatted(version)?))
        }
        None => Ok(None),
    }
}

fn preformatted(version: &str) -> Result<ScmVersion> {
    let tag = TagVersion::parse(version, false)
        .map_err(|reason| anyhow::anyhow!("preformatted version '{version}' is invalid: {reason}"))?;
    Ok(
        ScmVersionBuilder::new(tag, overrides::source_epoch_or_utc_now())
            .preformatted(true)
            .build(),
    )
}
