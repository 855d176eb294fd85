use std::path::{Path, PathBuf};

use anyhow::Result;

use scmver_domain::ScmVersion;

use crate::config::Configuration;
use crate::diagnostics::Diagnostics;

pub mod git;
pub mod hg;
mod hg_git;

/// The supported version control backends.
///
/// Detection order matters for the hg-git bridge: Mercurial is probed first
/// so a bridged checkout can decide to read its Git metadata instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mercurial,
    Git,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Mercurial, Backend::Git];

    pub fn name(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Mercurial => "hg",
        }
    }

    /// Presence of the backend's control directory at `path`.
    pub fn detect(self, path: &Path) -> bool {
        match self {
            // `.git` may be a file in linked work trees.
            Self::Git => path.join(".git").exists(),
            Self::Mercurial => path.join(".hg").is_dir(),
        }
    }

    /// Query the working directory at `root` for its version metadata.
    ///
    /// Returns `Ok(None)` when the backend cannot claim the directory after
    /// all (recoverable); errors from a claimed directory propagate.
    pub fn parse(
        self,
        root: &Path,
        config: &Configuration,
        diag: &Diagnostics,
    ) -> Result<Option<ScmVersion>> {
        match self {
            Self::Git => git::parse(root, config, diag),
            Self::Mercurial => hg::parse(root, config, diag),
        }
    }

    /// The files tracked by the SCM, relative to `root`. Used by file-finder
    /// collaborators and the CLI `ls` surface.
    pub fn list_files(self, root: &Path) -> Result<Vec<PathBuf>> {
        match self {
            Self::Git => git::list_files(root),
            Self::Mercurial => hg::list_files(root),
        }
    }
}
