use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use scmver_domain::{tag_to_version, ScmVersion, ScmVersionBuilder, TagVersion};

use crate::config::{Configuration, GitPreParse};
use crate::diagnostics::Diagnostics;
use crate::errors::InferenceError;
use crate::overrides;
use crate::run_cmd::{run_command, RunOutput, VcsCommandError};

fn default_describe() -> Vec<String> {
    ["git", "describe", "--dirty", "--tags", "--long", "--match", "*[0-9]*"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

pub(crate) struct GitWorkdir {
    toplevel: PathBuf,
}

impl GitWorkdir {
    /// Resolve the real work-tree root enclosing `path`, or `None` when git
    /// is unavailable or the directory is not a work tree.
    pub(crate) fn from_potential_worktree(path: &Path) -> Result<Option<Self>> {
        let args = vec!["rev-parse".to_owned(), "--show-toplevel".to_owned()];
        let out = match run_command("git", &args, &[], path) {
            Ok(out) => out,
            Err(VcsCommandError::Spawn { .. }) => {
                debug!("git executable not found");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if !out.success() || out.stdout.is_empty() {
            debug!(stderr = %out.stderr, "directory is not a git work tree");
            return Ok(None);
        }
        Ok(Some(Self {
            toplevel: PathBuf::from(out.stdout),
        }))
    }

    fn git(&self, args: &[&str]) -> Result<RunOutput, VcsCommandError> {
        let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        run_command("git", &args, &[], &self.toplevel)
    }

    fn git_dir(&self) -> Result<PathBuf> {
        let out = self
            .git(&["rev-parse", "--absolute-git-dir"])?
            .require_success("git rev-parse")?;
        Ok(PathBuf::from(out.stdout))
    }

    fn is_shallow(&self) -> Result<bool> {
        Ok(self.git_dir()?.join("shallow").is_file())
    }

    /// Uncommitted changes to tracked files, from porcelain status.
    fn is_dirty(&self) -> Result<bool> {
        let out = self
            .git(&["status", "--porcelain", "--untracked-files=no"])?
            .require_success("git status")?;
        Ok(!out.stdout.is_empty())
    }

    /// Re-verify dirtiness by content: files whose only modification is
    /// their mtime must not count.
    fn content_dirty(&self) -> Result<bool> {
        let out = self.git(&["diff", "--quiet", "HEAD"])?;
        match out.code {
            0 => Ok(false),
            1 => Ok(true),
            code => Err(anyhow!("git diff --quiet failed with code {code}: {}", out.stderr)),
        }
    }

    fn head_short(&self) -> Result<Option<String>> {
        let out = self.git(&["rev-parse", "--short", "HEAD"])?;
        if out.success() && !out.stdout.is_empty() {
            Ok(Some(out.stdout))
        } else {
            Ok(None)
        }
    }

    fn commit_count(&self) -> Result<u64> {
        let out = self
            .git(&["rev-list", "--count", "HEAD"])?
            .require_success("git rev-list")?;
        out.stdout
            .parse()
            .with_context(|| format!("unexpected rev-list output '{}'", out.stdout))
    }

    fn branch(&self) -> Result<Option<String>> {
        let out = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if out.success() {
            match out.stdout.as_str() {
                "" | "HEAD" => Ok(None),
                branch => Ok(Some(branch.to_owned())),
            }
        } else {
            // An unborn branch still has a symbolic name.
            let out = self.git(&["symbolic-ref", "--short", "HEAD"])?;
            if out.success() && !out.stdout.is_empty() {
                Ok(Some(out.stdout))
            } else {
                Ok(None)
            }
        }
    }

    fn node_date(&self) -> Result<Option<Date>> {
        let out = self.git(&["-c", "log.showSignature=false", "log", "-n", "1", "--format=%cI"])?;
        if !out.success() || out.stdout.is_empty() {
            return Ok(None);
        }
        let parsed = OffsetDateTime::parse(&out.stdout, &Rfc3339)
            .with_context(|| format!("unexpected committer date '{}'", out.stdout))?;
        Ok(Some(parsed.to_offset(time::UtcOffset::UTC).date()))
    }

    fn changed_files(&self) -> Result<Vec<PathBuf>> {
        let out = self
            .git(&["status", "--porcelain", "--untracked-files=no"])?
            .require_success("git status")?;
        Ok(parse_status_paths(&out.stdout)
            .into_iter()
            .map(|rel| self.toplevel.join(rel))
            .collect())
    }

    /// Latest modification time among changed files, for the dirty-tree
    /// timestamp.
    fn dirty_mtime(&self) -> Result<Option<OffsetDateTime>> {
        let mut latest: Option<OffsetDateTime> = None;
        for path in self.changed_files()? {
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let stamp = OffsetDateTime::from(modified);
            if latest.map_or(true, |current| stamp > current) {
                latest = Some(stamp);
            }
        }
        Ok(latest)
    }

    fn fetch_unshallow(&self) -> Result<RunOutput, VcsCommandError> {
        self.git(&["fetch", "--unshallow"])
    }
}

fn parse_status_paths(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            // Renames are reported as `old -> new`; the new path is the one
            // that exists.
            match path.split_once(" -> ") {
                Some((_, renamed)) => renamed,
                None => path,
            }
        })
        .map(|path| path.trim_matches('"').to_owned())
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Described {
    pub(crate) tag: String,
    pub(crate) distance: u64,
    pub(crate) node: String,
    pub(crate) dirty: bool,
}

/// Split `<tag>-<distance>-g<short_hash>[-dirty]` describe output.
pub(crate) fn parse_describe(output: &str) -> Result<Described> {
    let (body, dirty) = match output.strip_suffix("-dirty") {
        Some(body) => (body, true),
        None => (output, false),
    };
    let mut fields = body.rsplitn(3, '-');
    let node = fields
        .next()
        .filter(|node| node.starts_with('g'))
        .ok_or_else(|| anyhow!("cannot parse describe output '{output}'"))?;
    let distance = fields
        .next()
        .and_then(|raw| raw.parse::<u64>().ok())
        .ok_or_else(|| anyhow!("cannot parse describe distance in '{output}'"))?;
    let tag = fields
        .next()
        .ok_or_else(|| anyhow!("cannot parse describe tag in '{output}'"))?;
    Ok(Described {
        tag: tag.to_owned(),
        distance,
        node: node.to_owned(),
        dirty,
    })
}

fn pre_parse(wd: &GitWorkdir, mode: GitPreParse, diag: &Diagnostics) -> Result<()> {
    let root = wd.toplevel.display().to_string();
    match mode {
        GitPreParse::WarnOnShallow => {
            if wd.is_shallow()? {
                diag.warn_once(&format!(
                    "'{root}' is a shallow clone, the version inferred from it may be wrong"
                ));
            }
        }
        GitPreParse::FailOnShallow => {
            if wd.is_shallow()? {
                return Err(InferenceError::RepoShallow { root }.into());
            }
        }
        GitPreParse::FetchOnShallow => {
            if wd.is_shallow()? {
                warn!(%root, "shallow clone detected, fetching the full history");
                let out = wd.fetch_unshallow()?;
                if !out.success() {
                    debug!(stderr = %out.stderr, "git fetch --unshallow failed");
                    return Err(InferenceError::RepoShallow { root }.into());
                }
            }
        }
        GitPreParse::FailOnMissingSubmodules => {
            let gitmodules = wd.toplevel.join(".gitmodules");
            if let Ok(contents) = fs::read_to_string(&gitmodules) {
                for submodule in submodule_paths(&contents) {
                    if !submodule_populated(&wd.toplevel.join(&submodule)) {
                        return Err(InferenceError::SubmoduleMissing {
                            root,
                            path: submodule,
                        }
                        .into());
                    }
                }
            }
        }
    }
    Ok(())
}

fn submodule_paths(gitmodules: &str) -> Vec<String> {
    gitmodules
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "path").then(|| value.trim().to_owned())
        })
        .collect()
}

fn submodule_populated(path: &Path) -> bool {
    path.read_dir()
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn build_timestamp(wd: &GitWorkdir, dirty: bool) -> Result<OffsetDateTime> {
    if overrides::active().source_date_epoch.is_some() {
        return Ok(overrides::source_epoch_or_utc_now());
    }
    if dirty {
        if let Some(stamp) = wd.dirty_mtime()? {
            return Ok(stamp);
        }
    }
    Ok(OffsetDateTime::now_utc())
}

pub(crate) fn parse(
    root: &Path,
    config: &Configuration,
    diag: &Diagnostics,
) -> Result<Option<ScmVersion>> {
    let Some(wd) = GitWorkdir::from_potential_worktree(root)? else {
        return Ok(None);
    };
    pre_parse(&wd, config.git_pre_parse, diag)?;

    let describe = config
        .git_describe_command
        .clone()
        .unwrap_or_else(default_describe);
    let (program, args) = describe
        .split_first()
        .ok_or_else(|| InferenceError::configuration("describe command is empty"))?;
    let out = run_command(program, args, &[], &wd.toplevel)?;

    let branch = wd.branch()?;
    let node_date = wd.node_date()?;

    let scm = if out.success() {
        let described = parse_describe(&out.stdout)?;
        let dirty = described.dirty && wd.content_dirty()?;
        let tag = tag_to_version(&described.tag, &config.tag_regex, config.normalize)?;
        ScmVersionBuilder::new(tag, build_timestamp(&wd, dirty)?)
            .distance(described.distance)
            .node(Some(described.node))
            .dirty(dirty)
            .branch(branch)
            .node_date(node_date)
            .build()
    } else {
        debug!(stderr = %out.stderr, "git describe failed, assuming an untagged repository");
        let tag = TagVersion::parse("0.0", config.normalize)
            .expect("sentinel version parses");
        match wd.head_short()? {
            Some(short) => {
                let dirty = wd.content_dirty()?;
                ScmVersionBuilder::new(tag, build_timestamp(&wd, dirty)?)
                    .distance(wd.commit_count()?)
                    .node(Some(format!("g{short}")))
                    .dirty(dirty)
                    .branch(branch)
                    .node_date(node_date)
                    .build()
            }
            None => {
                // No commit yet.
                let dirty = wd.is_dirty()?;
                ScmVersionBuilder::new(tag, build_timestamp(&wd, dirty)?)
                    .dirty(dirty)
                    .branch(branch)
                    .build()
            }
        }
    };
    debug!(%scm, "parsed git work tree");
    Ok(Some(scm))
}

pub(crate) fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let args = vec!["ls-files".to_owned()];
    let out = run_command("git", &args, &[], root)?.require_success("git ls-files")?;
    Ok(out.stdout.lines().map(PathBuf::from).collect())
}
