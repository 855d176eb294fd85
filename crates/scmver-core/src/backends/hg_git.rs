use std::path::Path;

/// Whether the `.hg` directory at `root` is managed by the hg-git
/// extension. The mapfile is written on every push/pull; an intermediate
/// `.hg/git` bare repository also marks the bridge.
pub(crate) fn is_bridge(root: &Path) -> bool {
    let dot_hg = root.join(".hg");
    dot_hg.join("git-mapfile").is_file() || dot_hg.join("git").is_dir()
}
