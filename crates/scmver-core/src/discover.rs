use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backends::Backend;
use crate::config::Configuration;
use crate::overrides::{self, EnvSnapshot};

/// The starting directory followed by its ancestors, or just the starting
/// directory when parent search is disabled.
pub fn walk_potential_roots(root: &Path, search_parents: bool) -> Vec<PathBuf> {
    let mut roots = vec![root.to_owned()];
    if !search_parents {
        return roots;
    }
    let mut current = root;
    while let Some(parent) = current.parent() {
        roots.push(parent.to_owned());
        current = parent;
    }
    roots
}

/// Locate the nearest enclosing VCS control directory.
///
/// Walking stops at the first directory on the env-provided ignore list and
/// at the filesystem root.
pub fn discover_backend(
    config: &Configuration,
    env: &EnvSnapshot,
) -> Option<(PathBuf, Backend)> {
    let ignored = overrides::ignore_vcs_roots(env);
    for candidate in walk_potential_roots(
        &config.absolute_root,
        config.search_parent_directories,
    ) {
        if ignored.contains(&candidate) {
            debug!(root = %candidate.display(), "directory is on the VCS root ignore list");
            return None;
        }
        for backend in Backend::ALL {
            if backend.detect(&candidate) {
                debug!(root = %candidate.display(), backend = backend.name(), "found VCS root");
                return Some((candidate, backend));
            }
        }
    }
    None
}
