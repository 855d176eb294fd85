use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use regex::Regex;
use toml_edit::{Item, TableLike};
use tracing::debug;

use scmver_domain::{
    canonicalize_name, check_tag_regex, resolve_local_scheme, resolve_version_scheme,
    SchemeContext, ScmVersion, DEFAULT_LOCAL_SCHEME, DEFAULT_VERSION_SCHEME,
};

use crate::diagnostics::Diagnostics;
use crate::errors::InferenceError;
use crate::overrides::{self, EnvSnapshot};
use crate::pyproject::PyProjectData;

/// Hook run by the Git backend before describing the work tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GitPreParse {
    #[default]
    WarnOnShallow,
    FailOnShallow,
    FetchOnShallow,
    FailOnMissingSubmodules,
}

impl FromStr for GitPreParse {
    type Err = InferenceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "warn_on_shallow" => Ok(Self::WarnOnShallow),
            "fail_on_shallow" => Ok(Self::FailOnShallow),
            "fetch_on_shallow" => Ok(Self::FetchOnShallow),
            "fail_on_missing_submodules" => Ok(Self::FailOnMissingSubmodules),
            other => Err(InferenceError::configuration(format!(
                "unknown scm.git.pre_parse value '{other}'"
            ))),
        }
    }
}

/// Custom parser override handle (stage 2 of the inference pipeline).
pub type ParseFn = fn(&Path, &Configuration, &Diagnostics) -> Result<Option<ScmVersion>>;

/// A partial configuration where every field distinguishes "not set" from
/// "set to a value". Overlays replace only present fields, so user intent
/// never hides behind sentinel defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverlay {
    pub root: Option<PathBuf>,
    pub fallback_root: Option<PathBuf>,
    pub fallback_version: Option<String>,
    pub tag_regex: Option<String>,
    pub parentdir_prefix_version: Option<String>,
    pub version_scheme: Option<Vec<String>>,
    pub local_scheme: Option<String>,
    pub normalize: Option<bool>,
    pub version_file: Option<PathBuf>,
    pub version_file_template: Option<String>,
    pub write_to: Option<PathBuf>,
    pub search_parent_directories: Option<bool>,
    pub git_describe_command: Option<Vec<String>>,
    pub git_describe_command_deprecated: Option<Vec<String>>,
    pub git_pre_parse: Option<GitPreParse>,
    pub dist_name: Option<String>,
}

fn expect_str(source: &str, key: &str, item: &Item) -> Result<String, InferenceError> {
    item.as_str().map(str::to_owned).ok_or_else(|| {
        InferenceError::configuration(format!("{source}: '{key}' must be a string"))
    })
}

fn expect_bool(source: &str, key: &str, item: &Item) -> Result<bool, InferenceError> {
    item.as_bool().ok_or_else(|| {
        InferenceError::configuration(format!("{source}: '{key}' must be a boolean"))
    })
}

fn expect_str_list(source: &str, key: &str, item: &Item) -> Result<Vec<String>, InferenceError> {
    if let Some(value) = item.as_str() {
        return Ok(vec![value.to_owned()]);
    }
    let error =
        || InferenceError::configuration(format!("{source}: '{key}' must be a string or array"));
    let array = item.as_array().ok_or_else(error)?;
    array
        .iter()
        .map(|value| value.as_str().map(str::to_owned).ok_or_else(error))
        .collect()
}

fn command_list(source: &str, key: &str, item: &Item) -> Result<Vec<String>, InferenceError> {
    if let Some(value) = item.as_str() {
        return Ok(value.split_whitespace().map(str::to_owned).collect());
    }
    expect_str_list(source, key, item)
}

impl ConfigOverlay {
    /// Overlay `other` on top of `self`: present fields replace.
    pub fn merge(&mut self, other: ConfigOverlay) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            root,
            fallback_root,
            fallback_version,
            tag_regex,
            parentdir_prefix_version,
            version_scheme,
            local_scheme,
            normalize,
            version_file,
            version_file_template,
            write_to,
            search_parent_directories,
            git_describe_command,
            git_describe_command_deprecated,
            git_pre_parse,
            dist_name,
        );
    }

    /// Build an overlay from a TOML table (`[tool.setuptools_scm]` or an
    /// env override payload). Unknown keys warn and are ignored; wrongly
    /// typed values are configuration errors.
    pub(crate) fn from_toml(
        table: &dyn TableLike,
        source: &str,
        diag: &Diagnostics,
    ) -> Result<Self, InferenceError> {
        let mut overlay = Self::default();
        for (key, item) in table.iter() {
            match key {
                "root" => overlay.root = Some(expect_str(source, key, item)?.into()),
                "fallback_root" => {
                    overlay.fallback_root = Some(expect_str(source, key, item)?.into())
                }
                "fallback_version" => {
                    overlay.fallback_version = Some(expect_str(source, key, item)?)
                }
                "tag_regex" => overlay.tag_regex = Some(expect_str(source, key, item)?),
                "parentdir_prefix_version" => {
                    overlay.parentdir_prefix_version = Some(expect_str(source, key, item)?)
                }
                "version_scheme" => {
                    overlay.version_scheme = Some(expect_str_list(source, key, item)?)
                }
                "local_scheme" => overlay.local_scheme = Some(expect_str(source, key, item)?),
                "normalize" => overlay.normalize = Some(expect_bool(source, key, item)?),
                "version_file" => {
                    overlay.version_file = Some(expect_str(source, key, item)?.into())
                }
                "version_file_template" => {
                    overlay.version_file_template = Some(expect_str(source, key, item)?)
                }
                "write_to" => overlay.write_to = Some(expect_str(source, key, item)?.into()),
                "write_to_template" => {
                    diag.warn_once(&format!(
                        "{source}: 'write_to_template' is deprecated, use 'version_file_template'"
                    ));
                    overlay.version_file_template = Some(expect_str(source, key, item)?);
                }
                "search_parent_directories" => {
                    overlay.search_parent_directories = Some(expect_bool(source, key, item)?)
                }
                "git_describe_command" => {
                    overlay.git_describe_command_deprecated =
                        Some(command_list(source, key, item)?)
                }
                "dist_name" => overlay.dist_name = Some(expect_str(source, key, item)?),
                "scm" => overlay.read_scm_table(item, source)?,
                "relative_to" => {
                    diag.warn_once(&format!(
                        "{source}: ignoring 'relative_to', it is always relative to the \
                         configuration file"
                    ));
                }
                other => {
                    diag.warn_once(&format!("{source}: unknown configuration key '{other}'"));
                }
            }
        }
        Ok(overlay)
    }

    fn read_scm_table(&mut self, item: &Item, source: &str) -> Result<(), InferenceError> {
        let error = |what: &str| {
            InferenceError::configuration(format!("{source}: '{what}' must be a table"))
        };
        let scm = item.as_table_like().ok_or_else(|| error("scm"))?;
        let Some(git) = scm.get("git") else {
            return Ok(());
        };
        let git = git.as_table_like().ok_or_else(|| error("scm.git"))?;
        if let Some(describe) = git.get("describe_command") {
            self.git_describe_command = Some(command_list(source, "describe_command", describe)?);
        }
        if let Some(pre_parse) = git.get("pre_parse") {
            let value = expect_str(source, "pre_parse", pre_parse)?;
            self.git_pre_parse = Some(value.parse()?);
        }
        Ok(())
    }
}

/// The frozen configuration driving one inference call.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub relative_to: Option<PathBuf>,
    pub root: PathBuf,
    pub absolute_root: PathBuf,
    pub fallback_root: PathBuf,
    pub fallback_version: Option<String>,
    pub tag_regex: Regex,
    pub parentdir_prefix_version: Option<String>,
    pub version_scheme: Vec<String>,
    pub local_scheme: String,
    pub normalize: bool,
    pub version_file: Option<PathBuf>,
    pub version_file_template: Option<String>,
    pub write_to: Option<PathBuf>,
    pub search_parent_directories: bool,
    pub git_describe_command: Option<Vec<String>>,
    pub git_pre_parse: GitPreParse,
    pub dist_name: Option<String>,
    pub parse: Option<ParseFn>,
}

impl Configuration {
    /// Resolve a configuration from a pyproject file plus call-site
    /// overrides, then overlay the per-dist env overrides and freeze.
    pub fn from_file(
        pyproject_path: &Path,
        dist_name: Option<&str>,
        call_site: ConfigOverlay,
        env: &EnvSnapshot,
        diag: &Diagnostics,
    ) -> Result<Self> {
        let pyproject = PyProjectData::read(pyproject_path)?;
        Self::from_data(&pyproject, dist_name, call_site, env, diag)
    }

    pub fn from_data(
        pyproject: &PyProjectData,
        dist_name: Option<&str>,
        call_site: ConfigOverlay,
        env: &EnvSnapshot,
        diag: &Diagnostics,
    ) -> Result<Self> {
        let source = format!("[tool.{}]", pyproject.tool_name);
        let mut overlay = ConfigOverlay::from_toml(&pyproject.section, &source, diag)?;

        // The dist name is decided before env overrides; their variable
        // names depend on it.
        let dist_name = match (dist_name, overlay.dist_name.take()) {
            (Some(explicit), Some(section)) => {
                if canonicalize_name(explicit) != canonicalize_name(&section) {
                    diag.warn_once(&format!(
                        "dist_name '{section}' in {source} disagrees with '{explicit}'"
                    ));
                }
                Some(explicit.to_owned())
            }
            (Some(explicit), None) => Some(explicit.to_owned()),
            (None, Some(section)) => Some(section),
            (None, None) => pyproject.project_name.as_deref().map(canonicalize_name),
        };

        overlay.merge(call_site);

        if let Some((variable, map)) =
            overrides::read_toml_overrides(env, dist_name.as_deref())?
        {
            let env_overlay = ConfigOverlay::from_toml(map.table(), &variable, diag)?;
            overlay.merge(env_overlay);
        }

        let relative_to = pyproject.path.exists().then(|| pyproject.path.clone());
        Self::freeze(relative_to, overlay, dist_name, diag)
    }

    fn freeze(
        relative_to: Option<PathBuf>,
        mut overlay: ConfigOverlay,
        dist_name: Option<String>,
        diag: &Diagnostics,
    ) -> Result<Self> {
        // A dist name set by a later overlay still counts when nothing
        // earlier decided one.
        let dist_name = dist_name.or_else(|| overlay.dist_name.take());
        let root = overlay.root.take().unwrap_or_else(|| PathBuf::from("."));
        let absolute_root = compute_absolute_root(&root, relative_to.as_deref(), diag);
        let fallback_root = overlay
            .fallback_root
            .take()
            .map(|fallback| absolutize(&fallback))
            .unwrap_or_else(|| absolute_root.clone());

        let tag_regex = check_tag_regex(overlay.tag_regex.as_deref()).map_err(|err| {
            InferenceError::configuration(format!("tag_regex does not compile: {err}"))
        })?;

        let version_scheme = overlay
            .version_scheme
            .take()
            .unwrap_or_else(|| vec![DEFAULT_VERSION_SCHEME.to_owned()]);
        for name in &version_scheme {
            if resolve_version_scheme(name).is_none() {
                return Err(
                    InferenceError::configuration(format!("unknown version scheme '{name}'"))
                        .into(),
                );
            }
        }
        let local_scheme = overlay
            .local_scheme
            .take()
            .unwrap_or_else(|| DEFAULT_LOCAL_SCHEME.to_owned());
        if resolve_local_scheme(&local_scheme).is_none() {
            return Err(InferenceError::configuration(format!(
                "unknown local scheme '{local_scheme}'"
            ))
            .into());
        }

        if overlay.write_to.is_some() && overlay.version_file.is_some() {
            diag.warn_once("'write_to' is deprecated and 'version_file' is set, using both");
        }
        if overlay.git_describe_command_deprecated.is_some() {
            diag.warn_once(
                "'git_describe_command' is deprecated, use 'scm.git.describe_command'",
            );
        }
        let git_describe_command = overlay
            .git_describe_command
            .take()
            .or(overlay.git_describe_command_deprecated.take());

        let config = Self {
            relative_to,
            root,
            absolute_root,
            fallback_root,
            fallback_version: overlay.fallback_version.take(),
            tag_regex,
            parentdir_prefix_version: overlay.parentdir_prefix_version.take(),
            version_scheme,
            local_scheme,
            normalize: overlay.normalize.unwrap_or(true),
            version_file: overlay.version_file.take(),
            version_file_template: overlay.version_file_template.take(),
            write_to: overlay.write_to.take(),
            search_parent_directories: overlay.search_parent_directories.unwrap_or(false),
            git_describe_command,
            git_pre_parse: overlay.git_pre_parse.unwrap_or_default(),
            dist_name,
            parse: None,
        };
        debug!(
            root = %config.absolute_root.display(),
            version_scheme = ?config.version_scheme,
            local_scheme = %config.local_scheme,
            "configuration frozen"
        );
        Ok(config)
    }

    pub fn scheme_context(&self) -> SchemeContext<'_> {
        SchemeContext {
            tag_regex: &self.tag_regex,
            normalize: self.normalize,
            root: &self.absolute_root,
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_owned())
    };
    normalize_path(&absolute)
}

/// Lexically normalize a path: drop `.` components and resolve `..`
/// against their parents without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn compute_absolute_root(
    root: &Path,
    relative_to: Option<&Path>,
    diag: &Diagnostics,
) -> PathBuf {
    let Some(relative_to) = relative_to else {
        return absolutize(root);
    };
    if root.is_absolute() && relative_to.is_absolute() && !relative_to.starts_with(root) {
        diag.warn_once(&format!(
            "absolute root '{}' overrides relative_to '{}'",
            root.display(),
            relative_to.display()
        ));
    }
    let anchored = if relative_to.is_dir() {
        diag.warn_once(&format!(
            "relative_to is expected to be a file, got directory '{}', assuming its parent \
             directory was passed",
            relative_to.display()
        ));
        relative_to.join(root)
    } else {
        match relative_to.parent() {
            Some(parent) => parent.join(root),
            None => root.to_owned(),
        }
    };
    absolutize(&anchored)
}
