use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::debug;

use scmver_domain::{tag_to_version, ScmVersion, ScmVersionBuilder, TagVersion};

use crate::backends::{git, hg_git};
use crate::config::Configuration;
use crate::diagnostics::Diagnostics;
use crate::overrides;
use crate::run_cmd::{run_command, RunOutput, VcsCommandError};

/// One templated log invocation yields everything about the working
/// revision; fields are newline-separated.
const LOG_TEMPLATE: &str = "{latesttag}\\n{node|short}\\n{branch}\\n{date|rfc3339date}";

pub(crate) struct HgWorkdir {
    root: PathBuf,
    command: String,
}

impl HgWorkdir {
    pub(crate) fn from_potential_root(path: &Path) -> Result<Option<Self>> {
        let command = overrides::hg_command();
        let args = vec!["root".to_owned()];
        let out = match run_command(&command, &args, &[], path) {
            Ok(out) => out,
            Err(VcsCommandError::Spawn { .. }) => {
                debug!(%command, "hg executable not found");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if !out.success() || out.stdout.is_empty() {
            debug!(stderr = %out.stderr, "directory is not a Mercurial repository");
            return Ok(None);
        }
        Ok(Some(Self {
            root: PathBuf::from(out.stdout),
            command,
        }))
    }

    fn hg(&self, args: &[&str]) -> Result<RunOutput, VcsCommandError> {
        let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        run_command(&self.command, &args, &[], &self.root)
    }

    fn identify(&self) -> Result<(String, bool)> {
        let out = self.hg(&["id", "-i"])?.require_success("hg id")?;
        let dirty = out.stdout.ends_with('+');
        Ok((out.stdout.trim_end_matches('+').to_owned(), dirty))
    }

    /// Uncommitted changes to tracked files.
    fn is_dirty(&self) -> Result<bool> {
        let out = self
            .hg(&["status", "-mard"])?
            .require_success("hg status")?;
        Ok(!out.stdout.is_empty())
    }

    fn count_revs(&self, revset: &str) -> Result<u64> {
        let out = self
            .hg(&["log", "-r", revset, "-T", "."])?
            .require_success("hg log")?;
        Ok(out.stdout.len() as u64)
    }

    /// Commits between the tag and the working revision, not counting the
    /// commits that merely added the tag to `.hgtags`.
    fn distance_to_tag(&self, tag: &str) -> Result<u64> {
        let reachable = self.count_revs(&format!("only(., '{tag}')"))?;
        let tagging = self.count_revs(&format!("only(., '{tag}') and file('.hgtags')"))?;
        Ok(reachable.saturating_sub(tagging))
    }

    fn log_head(&self) -> Result<Option<HeadInfo>> {
        let out = self.hg(&["log", "-r", ".", "-T", LOG_TEMPLATE])?;
        if !out.success() {
            debug!(stderr = %out.stderr, "hg log failed for the working revision");
            return Ok(None);
        }
        let mut lines = out.stdout.lines();
        let latest_tag = lines.next().unwrap_or("null").to_owned();
        let node = lines.next().unwrap_or_default().to_owned();
        let branch = lines.next().unwrap_or_default().to_owned();
        let node_date = lines
            .next()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
            .map(|stamp| stamp.to_offset(time::UtcOffset::UTC).date());
        Ok(Some(HeadInfo {
            latest_tag,
            node,
            branch,
            node_date,
        }))
    }
}

struct HeadInfo {
    latest_tag: String,
    node: String,
    branch: String,
    node_date: Option<Date>,
}

fn build_timestamp() -> OffsetDateTime {
    overrides::source_epoch_or_utc_now()
}

fn sentinel(
    config: &Configuration,
    distance: u64,
    node: Option<String>,
    dirty: bool,
    branch: Option<String>,
    node_date: Option<Date>,
) -> ScmVersion {
    let tag = TagVersion::parse("0.0", config.normalize).expect("sentinel version parses");
    ScmVersionBuilder::new(tag, build_timestamp())
        .distance(distance)
        .node(node)
        .dirty(dirty)
        .branch(branch)
        .node_date(node_date)
        .build()
}

pub(crate) fn parse(
    root: &Path,
    config: &Configuration,
    diag: &Diagnostics,
) -> Result<Option<ScmVersion>> {
    // An hg-git bridge checkout carries authoritative Git metadata.
    if hg_git::is_bridge(root) && root.join(".git").exists() {
        debug!(root = %root.display(), "hg-git bridge detected, reading git metadata");
        return git::parse(root, config, diag);
    }

    let Some(wd) = HgWorkdir::from_potential_root(root)? else {
        return Ok(None);
    };

    let (raw_node, id_dirty) = wd.identify()?;
    if raw_node.chars().all(|c| c == '0') {
        // Fresh repository without commits.
        let dirty = id_dirty || wd.is_dirty()?;
        return Ok(Some(sentinel(config, 0, None, dirty, None, None)));
    }

    let Some(head) = wd.log_head()? else {
        return Ok(None);
    };
    let dirty = wd.is_dirty()?;
    let node = Some(format!("h{}", head.node));
    let branch = (!head.branch.is_empty()).then_some(head.branch);

    if head.latest_tag == "null" {
        let distance = wd.count_revs("ancestors(.)")?;
        return Ok(Some(sentinel(
            config,
            distance,
            node,
            dirty,
            branch,
            head.node_date,
        )));
    }

    let distance = wd.distance_to_tag(&head.latest_tag)?;
    let tag = tag_to_version(&head.latest_tag, &config.tag_regex, config.normalize)?;
    let scm = ScmVersionBuilder::new(tag, build_timestamp())
        .distance(distance)
        .node(node)
        .dirty(dirty)
        .branch(branch)
        .node_date(head.node_date)
        .build();
    debug!(%scm, "parsed Mercurial repository");
    Ok(Some(scm))
}

pub(crate) fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let command = overrides::hg_command();
    let args = vec!["files".to_owned()];
    let out = run_command(&command, &args, &[], root)
        .context("failed to run hg files")?
        .require_success("hg files")?;
    Ok(out.stdout.lines().map(PathBuf::from).collect())
}
