use std::fs;

use anyhow::Result;
use tracing::debug;

use super::{standard, SchemeContext};
use crate::scm_version::ScmVersion;

const MAJOR_FRAGMENT_TYPES: &[&str] = &["removal"];
const MINOR_FRAGMENT_TYPES: &[&str] = &["feature", "deprecation"];
const PATCH_FRAGMENT_TYPES: &[&str] = &["bugfix", "doc", "misc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bump {
    Major,
    Minor,
    Patch,
}

/// Scan `changelog.d/` for `{name}.{type}.md` fragments and pick the
/// strongest bump they call for.
fn determine_bump(ctx: &SchemeContext<'_>) -> Option<Bump> {
    let changelog = ctx.root.join("changelog.d");
    let entries = fs::read_dir(&changelog).ok()?;
    let mut bump = None;
    for entry in entries.flatten() {
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if matches!(name.as_ref(), "template.md" | "README.md" | ".gitkeep") {
            continue;
        }
        let Some(fragment_type) = name.split('.').nth(1) else {
            continue;
        };
        let found = if MAJOR_FRAGMENT_TYPES.contains(&fragment_type) {
            Some(Bump::Major)
        } else if MINOR_FRAGMENT_TYPES.contains(&fragment_type) {
            Some(Bump::Minor)
        } else if PATCH_FRAGMENT_TYPES.contains(&fragment_type) {
            Some(Bump::Patch)
        } else {
            continue;
        };
        debug!(fragment = %name, ?found, "found changelog fragment");
        bump = match (bump, found) {
            (Some(Bump::Major), _) | (_, Some(Bump::Major)) => Some(Bump::Major),
            (Some(Bump::Minor), _) | (_, Some(Bump::Minor)) => Some(Bump::Minor),
            _ => found,
        };
    }
    bump
}

pub(super) fn version_from_fragments(
    version: &ScmVersion,
    ctx: &SchemeContext<'_>,
) -> Result<String> {
    if version.exact() {
        return Ok(version.format_with("{tag}"));
    }
    let Some(bump) = determine_bump(ctx) else {
        debug!("no changelog fragments found, falling back to guess-next-dev");
        return standard::guess_next_dev_version(version, ctx);
    };
    let guessed = match bump {
        Bump::Major => {
            let major = version.tag.version().release().first().copied().unwrap_or(0);
            format!("{}.0.0", major + 1)
        }
        Bump::Minor => standard::guess_next_simple_semver(&version.tag, 2, true)?,
        Bump::Patch => standard::guess_next_simple_semver(&version.tag, 3, true)?,
    };
    Ok(version.format_next_version(&guessed))
}
