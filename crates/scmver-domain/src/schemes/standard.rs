use anyhow::{bail, Result};

use super::SchemeContext;
use crate::scm_version::ScmVersion;
use crate::tag_parse::parse_version_tag;
use crate::version_cls::TagVersion;

const SEMVER_MINOR: usize = 2;
const SEMVER_PATCH: usize = 3;
const SEMVER_LEN: usize = 3;

fn render_release(epoch: u64, release: &[u64]) -> String {
    let body = release
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".");
    if epoch == 0 {
        body
    } else {
        format!("{epoch}!{body}")
    }
}

/// Guess the next release from a tag: the local segment is stripped, pre,
/// post and dev parts are dropped, and the last release segment is bumped.
///
/// A `.dev0` tag reuses its base without a bump; other dev numbers are
/// rejected.
pub(super) fn guess_next_version(tag: &TagVersion) -> Result<String> {
    let version = tag.version().clone().without_local();
    match version.dev() {
        Some(0) => return Ok(version.with_dev(None).to_string()),
        Some(dev) => bail!("own dev number {dev} in tag {version} is unsupported"),
        None => {}
    }
    let mut release = version.release().to_vec();
    match release.last_mut() {
        Some(last) => *last += 1,
        None => bail!("tag {version} has no release segment to bump"),
    }
    Ok(render_release(version.epoch(), &release))
}

pub(super) fn guess_next_dev_version(
    version: &ScmVersion,
    _ctx: &SchemeContext<'_>,
) -> Result<String> {
    if version.exact() {
        return Ok(version.format_with("{tag}"));
    }
    // A repository without any commit keeps the pre-tag sentinel: there is
    // nothing to count a bump from yet.
    let guessed = if version.node.is_none() && version.distance == 0 {
        version.tag.to_string()
    } else {
        guess_next_version(&version.tag)?
    };
    Ok(version.format_next_version(&guessed))
}

pub(super) fn no_guess_dev_version(
    version: &ScmVersion,
    _ctx: &SchemeContext<'_>,
) -> Result<String> {
    if version.exact() {
        return Ok(version.format_with("{tag}"));
    }
    let base = version.tag.version().clone().without_local();
    let guessed = match base.dev() {
        Some(0) => base.with_dev(None).to_string(),
        Some(dev) => bail!("own dev number {dev} in tag {base} is unsupported"),
        None => format!("{base}.post1"),
    };
    Ok(version.format_next_version(&guessed))
}

pub(super) fn postrelease_version(
    version: &ScmVersion,
    _ctx: &SchemeContext<'_>,
) -> Result<String> {
    if version.exact() {
        Ok(version.format_with("{tag}"))
    } else {
        Ok(version.format_with("{tag}.post{distance}"))
    }
}

pub(super) fn only_version(version: &ScmVersion, _ctx: &SchemeContext<'_>) -> Result<String> {
    Ok(version.format_with("{tag}"))
}

/// Pad or bump a release to SemVer shape: keep `retain` leading segments
/// (padding missing ones with 0), bump the last kept one when requested, and
/// zero-fill up to three segments.
pub(super) fn guess_next_simple_semver(
    tag: &TagVersion,
    retain: usize,
    increment: bool,
) -> Result<String> {
    let release = tag.version().release();
    let mut parts: Vec<u64> = release.iter().take(retain).copied().collect();
    while parts.len() < retain {
        parts.push(0);
    }
    if increment {
        match parts.last_mut() {
            Some(last) => *last += 1,
            None => bail!("tag {tag} has no release segment to bump"),
        }
    }
    while parts.len() < SEMVER_LEN {
        parts.push(0);
    }
    Ok(render_release(tag.version().epoch(), &parts))
}

pub(super) fn simplified_semver_version(
    version: &ScmVersion,
    _ctx: &SchemeContext<'_>,
) -> Result<String> {
    if version.exact() {
        return guess_next_simple_semver(&version.tag, SEMVER_LEN, false);
    }
    let retain = match &version.branch {
        Some(branch) if branch.contains("feature") => SEMVER_MINOR,
        _ => SEMVER_PATCH,
    };
    let guessed = guess_next_simple_semver(&version.tag, retain, true)?;
    Ok(version.format_next_version(&guessed))
}

pub(super) fn release_branch_semver_version(
    version: &ScmVersion,
    ctx: &SchemeContext<'_>,
) -> Result<String> {
    if version.exact() {
        return Ok(version.format_with("{tag}"));
    }
    if let Some(branch) = &version.branch {
        // A branch named like the tag up to the minor part marks a
        // release/maintenance branch; anything else (issue numbers and the
        // like) falls through to the development-branch minor bump.
        let last_segment = branch.rsplit('/').next().unwrap_or(branch);
        if let Ok(branch_match) = parse_version_tag(last_segment, ctx.tag_regex) {
            let branch_ver = branch_match
                .version
                .strip_prefix('v')
                .unwrap_or(&branch_match.version);
            let tag_str = version.tag.to_string();
            let tag_minor: Vec<&str> = tag_str.split('.').take(SEMVER_MINOR).collect();
            let branch_minor: Vec<&str> = branch_ver.split('.').take(SEMVER_MINOR).collect();
            if tag_minor == branch_minor {
                let guessed = guess_next_version(&version.tag)?;
                return Ok(version.format_next_version(&guessed));
            }
        }
    }
    let guessed = guess_next_simple_semver(&version.tag, SEMVER_MINOR, true)?;
    Ok(version.format_next_version(&guessed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm_version::ScmVersionBuilder;
    use crate::tag_parse::check_tag_regex;
    use regex::Regex;
    use std::path::Path;
    use time::macros::datetime;

    fn scm(tag: &str, distance: u64, dirty: bool, branch: Option<&str>) -> ScmVersion {
        ScmVersionBuilder::new(
            TagVersion::parse(tag, true).unwrap(),
            datetime!(2024-01-01 00:00:00 UTC),
        )
        .distance(distance)
        .node(Some("gdeadbee".into()))
        .dirty(dirty)
        .branch(branch.map(String::from))
        .build()
    }

    fn ctx(regex: &Regex) -> SchemeContext<'_> {
        SchemeContext {
            tag_regex: regex,
            normalize: true,
            root: Path::new("."),
        }
    }

    #[test]
    fn guess_next_bumps_last_release_segment() {
        let tag = TagVersion::parse("1.2.3", true).unwrap();
        assert_eq!(guess_next_version(&tag).unwrap(), "1.2.4");
    }

    #[test]
    fn guess_next_on_two_segment_tag_bumps_minor() {
        // Documented hazard: a v2.0 tag guesses 2.1, not 2.0.1.
        let tag = TagVersion::parse("v2.0", true).unwrap();
        assert_eq!(guess_next_version(&tag).unwrap(), "2.1");
    }

    #[test]
    fn guess_next_strips_local_segment() {
        let tag = TagVersion::parse("1.2.3+foo", true).unwrap();
        assert_eq!(guess_next_version(&tag).unwrap(), "1.2.4");
    }

    #[test]
    fn guess_next_drops_pre_and_post_parts() {
        let tag = TagVersion::parse("1.2.3rc4", true).unwrap();
        assert_eq!(guess_next_version(&tag).unwrap(), "1.2.4");
        let tag = TagVersion::parse("1.2.3.post2", true).unwrap();
        assert_eq!(guess_next_version(&tag).unwrap(), "1.2.4");
    }

    #[test]
    fn dev_zero_tag_reuses_its_base() {
        let tag = TagVersion::parse("1.2.3.dev0", true).unwrap();
        assert_eq!(guess_next_version(&tag).unwrap(), "1.2.3");
        let tag = TagVersion::parse("1.2.3.dev1", true).unwrap();
        assert!(guess_next_version(&tag).is_err());
    }

    #[test]
    fn guess_next_dev_scheme_output() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        assert_eq!(
            guess_next_dev_version(&scm("1.2.3", 0, false, None), &ctx).unwrap(),
            "1.2.3"
        );
        assert_eq!(
            guess_next_dev_version(&scm("1.2.3", 4, false, None), &ctx).unwrap(),
            "1.2.4.dev4"
        );
    }

    #[test]
    fn empty_repository_keeps_sentinel() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        let version = ScmVersionBuilder::new(
            TagVersion::parse("0.0", true).unwrap(),
            datetime!(2024-01-01 00:00:00 UTC),
        )
        .dirty(true)
        .build();
        assert_eq!(
            guess_next_dev_version(&version, &ctx).unwrap(),
            "0.0.dev0"
        );
    }

    #[test]
    fn no_guess_adds_post1_dev() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        assert_eq!(
            no_guess_dev_version(&scm("1.2.3", 4, false, None), &ctx).unwrap(),
            "1.2.3.post1.dev4"
        );
    }

    #[test]
    fn post_release_appends_distance() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        assert_eq!(
            postrelease_version(&scm("1.2.3", 0, false, None), &ctx).unwrap(),
            "1.2.3"
        );
        assert_eq!(
            postrelease_version(&scm("1.2.3", 2, false, None), &ctx).unwrap(),
            "1.2.3.post2"
        );
    }

    #[test]
    fn only_version_ignores_distance_and_dirty() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        assert_eq!(
            only_version(&scm("1.2.3", 7, true, None), &ctx).unwrap(),
            "1.2.3"
        );
    }

    #[test]
    fn simplified_semver_pads_exact_tags() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        assert_eq!(
            simplified_semver_version(&scm("1.2", 0, false, None), &ctx).unwrap(),
            "1.2.0"
        );
    }

    #[test]
    fn simplified_semver_bumps_minor_on_feature_branch() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        assert_eq!(
            simplified_semver_version(&scm("1.2.3", 2, false, Some("feature/login")), &ctx)
                .unwrap(),
            "1.3.0.dev2"
        );
        assert_eq!(
            simplified_semver_version(&scm("1.2.3", 2, false, Some("bugfix/crash")), &ctx)
                .unwrap(),
            "1.2.4.dev2"
        );
    }

    #[test]
    fn release_branch_patch_bumps_on_matching_branch() {
        let regex = check_tag_regex(None).unwrap();
        let ctx = ctx(&regex);
        assert_eq!(
            release_branch_semver_version(&scm("1.2.3", 1, false, Some("release/1.2")), &ctx)
                .unwrap(),
            "1.2.4.dev1"
        );
        assert_eq!(
            release_branch_semver_version(&scm("1.2.3", 1, false, Some("main")), &ctx).unwrap(),
            "1.3.0.dev1"
        );
    }
}
