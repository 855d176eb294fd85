use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use toml_edit::{DocumentMut, Item, TableLike};
use tracing::{debug, warn};

use scmver_domain::{canonicalize_name, env_var_dist_name};

use crate::errors::InferenceError;

pub const DEFAULT_TOOL_PREFIX: &str = "SETUPTOOLS_SCM";
pub const FALLBACK_TOOL_PREFIX: &str = "VCS_VERSIONING";

const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(40);

/// A captured view of the process environment.
///
/// All environment reads go through a snapshot so tests can inject their own
/// and a single inference call sees one consistent environment.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Process-wide knobs embedders may override for the current thread.
///
/// Entering a context pushes it on a thread-local stack; dropping the guard
/// restores the previous one. Nested contexts shadow outer ones.
#[derive(Debug, Clone)]
pub struct GlobalOverrides {
    /// Tool prefix consulted before `SETUPTOOLS_SCM_*`.
    pub tool: String,
    /// Raw debug level value, when set.
    pub debug: Option<String>,
    pub subprocess_timeout: Duration,
    pub hg_command: String,
    pub source_date_epoch: Option<i64>,
}

impl GlobalOverrides {
    /// Read the global override variables under `tool`, falling back to the
    /// `VCS_VERSIONING_*` spellings.
    pub fn from_env(tool: &str, env: &EnvSnapshot) -> Self {
        let read = |name: &str| {
            env.var(&format!("{tool}_{name}"))
                .or_else(|| env.var(&format!("{FALLBACK_TOOL_PREFIX}_{name}")))
        };

        let subprocess_timeout = match read("SUBPROCESS_TIMEOUT") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    warn!(value = raw, "invalid SUBPROCESS_TIMEOUT value, using default");
                    DEFAULT_SUBPROCESS_TIMEOUT
                }
            },
            None => DEFAULT_SUBPROCESS_TIMEOUT,
        };

        let source_date_epoch = match env.var("SOURCE_DATE_EPOCH") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(epoch) => Some(epoch),
                Err(_) => {
                    warn!(value = raw, "invalid SOURCE_DATE_EPOCH value, ignoring");
                    None
                }
            },
            None => None,
        };

        Self {
            tool: tool.to_owned(),
            debug: read("DEBUG").map(str::to_owned),
            subprocess_timeout,
            hg_command: read("HG_COMMAND").unwrap_or("hg").to_owned(),
            source_date_epoch,
        }
    }

    /// Make this context active for the current thread until the returned
    /// guard is dropped.
    pub fn enter(self) -> OverridesGuard {
        ACTIVE.with(|stack| stack.borrow_mut().push(self));
        OverridesGuard { _private: () }
    }

    /// Export the context as environment pairs for child processes that run
    /// the engine themselves.
    pub fn export(&self, target: &mut Vec<(String, String)>) {
        if let Some(epoch) = self.source_date_epoch {
            target.push(("SOURCE_DATE_EPOCH".into(), epoch.to_string()));
        }
        if let Some(debug) = &self.debug {
            target.push((format!("{}_DEBUG", self.tool), debug.clone()));
        }
        target.push((
            format!("{}_SUBPROCESS_TIMEOUT", self.tool),
            self.subprocess_timeout.as_secs().to_string(),
        ));
        target.push((format!("{}_HG_COMMAND", self.tool), self.hg_command.clone()));
    }
}

pub struct OverridesGuard {
    _private: (),
}

impl Drop for OverridesGuard {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

thread_local! {
    static ACTIVE: RefCell<Vec<GlobalOverrides>> = const { RefCell::new(Vec::new()) };
}

/// The active context: the innermost entered one, or a fresh read of the
/// environment under the default tool prefix.
pub fn active() -> GlobalOverrides {
    ACTIVE
        .with(|stack| stack.borrow().last().cloned())
        .unwrap_or_else(|| GlobalOverrides::from_env(DEFAULT_TOOL_PREFIX, &EnvSnapshot::capture()))
}

pub fn subprocess_timeout() -> Duration {
    active().subprocess_timeout
}

pub fn hg_command() -> String {
    active().hg_command
}

/// `SOURCE_DATE_EPOCH` when set, the current UTC time otherwise.
pub fn source_epoch_or_utc_now() -> OffsetDateTime {
    match active().source_date_epoch {
        Some(epoch) => {
            OffsetDateTime::from_unix_timestamp(epoch).unwrap_or(OffsetDateTime::UNIX_EPOCH)
        }
        None => OffsetDateTime::now_utc(),
    }
}

/// The prefix chain for named env lookups: the active tool prefix first,
/// then the default, then the fallback spelling.
fn tool_prefixes() -> Vec<String> {
    let mut prefixes = vec![active().tool];
    for prefix in [DEFAULT_TOOL_PREFIX, FALLBACK_TOOL_PREFIX] {
        if !prefixes.iter().any(|p| p == prefix) {
            prefixes.push(prefix.to_owned());
        }
    }
    prefixes
}

/// Reader for `{TOOL}_{NAME}` / `{TOOL}_{NAME}_FOR_{DIST}` variables.
#[derive(Debug)]
pub struct EnvReader<'a> {
    env: &'a EnvSnapshot,
    prefixes: Vec<String>,
    dist_name: Option<String>,
}

impl<'a> EnvReader<'a> {
    pub fn new(env: &'a EnvSnapshot, dist_name: Option<&str>) -> Self {
        Self {
            env,
            prefixes: tool_prefixes(),
            dist_name: dist_name.map(str::to_owned),
        }
    }

    /// Read a named variable: the per-dist variant wins over the generic
    /// one, and alternative or near-miss spellings of the dist suffix are
    /// diagnosed.
    ///
    /// Returns the variable name that matched together with its value.
    pub fn read(&self, name: &str) -> Option<(String, String)> {
        let generic = self.prefixes.iter().find_map(|tool| {
            let variable = format!("{tool}_{name}");
            self.env.var(&variable).map(|v| (variable, v.to_owned()))
        });

        let Some(dist_name) = &self.dist_name else {
            return generic;
        };
        let suffix = env_var_dist_name(dist_name);

        for tool in &self.prefixes {
            let variable = format!("{tool}_{name}_FOR_{suffix}");
            if let Some(value) = self.env.var(&variable) {
                return Some((variable, value.to_owned()));
            }
        }

        // No exact per-dist hit: accept a differently-normalized suffix that
        // still canonicalizes to the same dist, with a nudge toward the
        // expected spelling.
        let expected = format!("{}_{name}_FOR_{suffix}", self.prefixes[0]);
        for tool in &self.prefixes {
            let prefix = format!("{tool}_{name}_FOR_");
            let mut matches = self.alternative_matches(&prefix, dist_name);
            if let Some((variable, value)) = matches.pop() {
                warn!(
                    found = %variable,
                    expected = %expected,
                    "environment variable uses a non-canonical dist name, consider renaming it"
                );
                if !matches.is_empty() {
                    warn!(
                        others = ?matches.iter().map(|(v, _)| v).collect::<Vec<_>>(),
                        using = %variable,
                        "multiple alternative environment variables found"
                    );
                }
                return Some((variable, value));
            }
        }

        // Still nothing: surface likely typos before falling back.
        let close = self.close_matches(name, &suffix);
        if !close.is_empty() {
            warn!(
                expected = %expected,
                candidates = ?close,
                "environment variable not found for dist name, did you mean one of these?"
            );
        }
        generic
    }

    fn alternative_matches(&self, prefix: &str, dist_name: &str) -> Vec<(String, String)> {
        let canonical = canonicalize_name(dist_name);
        let mut matches: Vec<(String, String)> = self
            .env
            .iter()
            .filter(|(variable, _)| variable.starts_with(prefix))
            .filter(|(variable, _)| {
                let suffix = &variable[prefix.len()..];
                canonicalize_name(&suffix.to_ascii_lowercase().replace('_', "-")) == canonical
            })
            .map(|(variable, value)| (variable.to_owned(), value.to_owned()))
            .collect();
        matches.sort();
        matches.reverse();
        matches
    }

    fn close_matches(&self, name: &str, expected_suffix: &str) -> Vec<String> {
        const THRESHOLD: f64 = 0.6;
        let mut close = Vec::new();
        for tool in &self.prefixes {
            let prefix = format!("{tool}_{name}_FOR_");
            for (variable, _) in self.env.iter() {
                let Some(suffix) = variable.strip_prefix(&prefix) else {
                    continue;
                };
                if suffix != expected_suffix
                    && similarity_ratio(suffix, expected_suffix) >= THRESHOLD
                {
                    close.push(variable.to_owned());
                }
            }
        }
        close.sort();
        close.truncate(3);
        close
    }
}

/// Edit-distance similarity in `[0, 1]`.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current.push(substitution.min(previous[j + 1] + 1).min(current[j] + 1));
        }
        previous = current;
    }
    previous[b.len()]
}

/// A parsed TOML payload that may have been written as a bare inline table.
#[derive(Debug)]
pub(crate) struct TomlMap {
    doc: DocumentMut,
    inline: bool,
}

impl TomlMap {
    pub(crate) fn table(&self) -> &dyn TableLike {
        if self.inline {
            self.doc["cheat"]
                .as_table_like()
                .expect("inline payload parsed as a table")
        } else {
            self.doc.as_table()
        }
    }
}

/// Parse TOML content, accepting a `{key = value}` inline table as the
/// whole payload.
pub(crate) fn load_toml_or_inline_map(data: &str) -> Result<TomlMap, String> {
    let inline = data.trim_start().starts_with('{');
    let text = if inline {
        format!("cheat = {data}")
    } else {
        data.to_owned()
    };
    let doc: DocumentMut = text.parse().map_err(|err| format!("{err}"))?;
    if inline && !doc["cheat"].is_table_like() {
        return Err("inline payload is not a table".to_owned());
    }
    Ok(TomlMap { doc, inline })
}

/// Typed pretend-metadata overlay read from the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PretendMetadata {
    pub tag: Option<String>,
    pub distance: Option<u64>,
    pub node: Option<String>,
    pub dirty: Option<bool>,
    pub preformatted: Option<bool>,
    pub branch: Option<String>,
    pub node_date: Option<Date>,
    pub time: Option<OffsetDateTime>,
}

fn decode_error(variable: &str, reason: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(InferenceError::OverrideDecode {
        variable: variable.to_owned(),
        reason: reason.into(),
    })
}

fn expect_str(variable: &str, key: &str, item: &Item) -> Result<String> {
    item.as_str()
        .map(str::to_owned)
        .ok_or_else(|| decode_error(variable, format!("{key} must be a string")))
}

fn expect_bool(variable: &str, key: &str, item: &Item) -> Result<bool> {
    item.as_bool()
        .ok_or_else(|| decode_error(variable, format!("{key} must be a boolean")))
}

fn toml_to_date(variable: &str, key: &str, item: &Item) -> Result<Date> {
    let datetime = item
        .as_datetime()
        .ok_or_else(|| decode_error(variable, format!("{key} must be a TOML date")))?;
    let date = datetime
        .date
        .ok_or_else(|| decode_error(variable, format!("{key} must carry a date component")))?;
    let month = Month::try_from(date.month)
        .map_err(|err| decode_error(variable, format!("{key}: {err}")))?;
    Date::from_calendar_date(i32::from(date.year), month, date.day)
        .map_err(|err| decode_error(variable, format!("{key}: {err}")))
}

fn toml_to_datetime(variable: &str, key: &str, item: &Item) -> Result<OffsetDateTime> {
    let datetime = item
        .as_datetime()
        .ok_or_else(|| decode_error(variable, format!("{key} must be a TOML datetime")))?;
    let date = datetime
        .date
        .ok_or_else(|| decode_error(variable, format!("{key} must carry a date component")))?;
    let month = Month::try_from(date.month)
        .map_err(|err| decode_error(variable, format!("{key}: {err}")))?;
    let date = Date::from_calendar_date(i32::from(date.year), month, date.day)
        .map_err(|err| decode_error(variable, format!("{key}: {err}")))?;
    let time = match datetime.time {
        Some(t) => Time::from_hms_nano(t.hour, t.minute, t.second, t.nanosecond)
            .map_err(|err| decode_error(variable, format!("{key}: {err}")))?,
        None => Time::MIDNIGHT,
    };
    let offset = match datetime.offset {
        Some(toml_edit::Offset::Z) | None => UtcOffset::UTC,
        Some(toml_edit::Offset::Custom { minutes }) => {
            UtcOffset::from_whole_seconds(i32::from(minutes) * 60)
                .map_err(|err| decode_error(variable, format!("{key}: {err}")))?
        }
    };
    Ok(PrimitiveDateTime::new(date, time).assume_offset(offset))
}

/// Read and validate `PRETEND_METADATA` for the dist, if set.
///
/// Unknown keys warn and are discarded; values of the wrong TOML type are an
/// `OverrideDecode` error.
pub fn read_pretend_metadata(
    env: &EnvSnapshot,
    dist_name: Option<&str>,
) -> Result<Option<PretendMetadata>> {
    let reader = EnvReader::new(env, dist_name);
    let Some((variable, raw)) = reader.read("PRETEND_METADATA") else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let map = load_toml_or_inline_map(&raw).map_err(|reason| decode_error(&variable, reason))?;
    let mut metadata = PretendMetadata::default();
    for (key, item) in map.table().iter() {
        match key {
            "tag" => metadata.tag = Some(expect_str(&variable, key, item)?),
            "node" => metadata.node = Some(expect_str(&variable, key, item)?),
            "branch" => metadata.branch = Some(expect_str(&variable, key, item)?),
            "dirty" => metadata.dirty = Some(expect_bool(&variable, key, item)?),
            "preformatted" => metadata.preformatted = Some(expect_bool(&variable, key, item)?),
            "distance" => {
                let value = item
                    .as_integer()
                    .ok_or_else(|| decode_error(&variable, "distance must be an integer"))?;
                let value = u64::try_from(value)
                    .map_err(|_| decode_error(&variable, "distance must be non-negative"))?;
                metadata.distance = Some(value);
            }
            "node_date" => metadata.node_date = Some(toml_to_date(&variable, key, item)?),
            "time" => metadata.time = Some(toml_to_datetime(&variable, key, item)?),
            other => {
                warn!(
                    field = other,
                    variable = %variable,
                    "invalid metadata field in pretend metadata, discarding"
                );
            }
        }
    }
    debug!(?metadata, variable = %variable, "pretend metadata read");
    Ok(Some(metadata))
}

/// Read the pretend version for the dist, if set.
pub fn read_pretend_version(env: &EnvSnapshot, dist_name: Option<&str>) -> Option<String> {
    let reader = EnvReader::new(env, dist_name);
    reader
        .read("PRETEND_VERSION")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Read the per-dist configuration override table, if set.
pub(crate) fn read_toml_overrides(
    env: &EnvSnapshot,
    dist_name: Option<&str>,
) -> Result<Option<(String, TomlMap)>> {
    let reader = EnvReader::new(env, dist_name);
    let Some((variable, raw)) = reader.read("OVERRIDES") else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let map = load_toml_or_inline_map(&raw).map_err(|reason| decode_error(&variable, reason))?;
    Ok(Some((variable, map)))
}

/// Directories never considered VCS roots, from `IGNORE_VCS_ROOTS`.
pub(crate) fn ignore_vcs_roots(env: &EnvSnapshot) -> Vec<PathBuf> {
    for tool in tool_prefixes() {
        if let Some(raw) = env.var(&format!("{tool}_IGNORE_VCS_ROOTS")) {
            return std::env::split_paths(raw).collect();
        }
    }
    Vec::new()
}
