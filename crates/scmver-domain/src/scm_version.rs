use std::fmt;

use time::{Date, OffsetDateTime};

use crate::version_cls::TagVersion;

/// A parsed version from source control metadata.
///
/// Created once per inference call and immutable afterwards. The node short
/// hash carries its SCM prefix letter (`g` for Git, `h` for Mercurial) as
/// part of the string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScmVersion {
    /// The related tag, or the preformatted version.
    pub tag: TagVersion,
    /// Number of commits since the tag; 0 means the tag commit itself.
    pub distance: u64,
    /// Prefixed short node id, absent when there is no commit yet.
    pub node: Option<String>,
    /// Whether the working copy had uncommitted changes.
    pub dirty: bool,
    /// When set, the string form of `tag` is emitted as-is and both schemes
    /// are bypassed.
    pub preformatted: bool,
    /// Short branch name, if any.
    pub branch: Option<String>,
    /// Date of the head commit, if available.
    pub node_date: Option<Date>,
    /// Build timestamp used by local schemes: `SOURCE_DATE_EPOCH` when set,
    /// otherwise derived from the working tree or the current UTC time.
    pub time: OffsetDateTime,
}

impl ScmVersion {
    /// True when checked out exactly on a tag with no local changes.
    pub fn exact(&self) -> bool {
        self.distance == 0 && !self.dirty
    }

    /// Expand `{tag}`, `{distance}`, `{node}`, `{branch}` and `{dirty}`
    /// placeholders in `fmt`.
    pub fn format_with(&self, fmt: &str) -> String {
        fmt.replace("{tag}", &self.tag.to_string())
            .replace("{distance}", &self.distance.to_string())
            .replace("{node}", self.node.as_deref().unwrap_or("None"))
            .replace("{branch}", self.branch.as_deref().unwrap_or("None"))
            .replace("{dirty}", if self.dirty { "true" } else { "false" })
    }

    /// Pick `clean_format` or `dirty_format` by the dirty flag and expand it.
    pub fn format_choice(&self, clean_format: &str, dirty_format: &str) -> String {
        self.format_with(if self.dirty { dirty_format } else { clean_format })
    }

    /// Compose a guessed next version with the `{guessed}.dev{distance}`
    /// template.
    pub fn format_next_version(&self, guessed: &str) -> String {
        self.format_next_version_with(guessed, "{guessed}.dev{distance}")
    }

    /// Compose a guessed next version with an explicit template exposing
    /// `{guessed}` in addition to the usual placeholders.
    pub fn format_next_version_with(&self, guessed: &str, fmt: &str) -> String {
        self.format_with(&fmt.replace("{guessed}", guessed))
    }
}

impl fmt::Display for ScmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<ScmVersion {} dist={} node={} dirty={} branch={}>",
            self.tag,
            self.distance,
            self.node.as_deref().unwrap_or("None"),
            self.dirty,
            self.branch.as_deref().unwrap_or("None"),
        )
    }
}

/// Builder for `ScmVersion` values, defaulting every field except the tag.
///
/// Backends construct versions through this so that new fields pick up
/// sensible defaults in one place.
#[derive(Debug)]
pub struct ScmVersionBuilder {
    tag: TagVersion,
    distance: u64,
    node: Option<String>,
    dirty: bool,
    preformatted: bool,
    branch: Option<String>,
    node_date: Option<Date>,
    time: OffsetDateTime,
}

impl ScmVersionBuilder {
    pub fn new(tag: TagVersion, time: OffsetDateTime) -> Self {
        Self {
            tag,
            distance: 0,
            node: None,
            dirty: false,
            preformatted: false,
            branch: None,
            node_date: None,
            time,
        }
    }

    pub fn distance(mut self, distance: u64) -> Self {
        self.distance = distance;
        self
    }

    pub fn node(mut self, node: Option<String>) -> Self {
        self.node = node;
        self
    }

    pub fn dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    pub fn preformatted(mut self, preformatted: bool) -> Self {
        self.preformatted = preformatted;
        self
    }

    pub fn branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn node_date(mut self, node_date: Option<Date>) -> Self {
        self.node_date = node_date;
        self
    }

    pub fn time(mut self, time: OffsetDateTime) -> Self {
        self.time = time;
        self
    }

    pub fn build(self) -> ScmVersion {
        ScmVersion {
            tag: self.tag,
            distance: self.distance,
            node: self.node,
            dirty: self.dirty,
            preformatted: self.preformatted,
            branch: self.branch,
            node_date: self.node_date,
            time: self.time,
        }
    }
}
