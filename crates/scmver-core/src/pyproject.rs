use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use toml_edit::{DocumentMut, Table};
use tracing::debug;

/// The tool section names recognized in `pyproject.toml`, in precedence
/// order. The primary section's keys win on shallow merge.
const TOOL_SECTIONS: [&str; 2] = ["setuptools_scm", "vcs-versioning"];

/// The structured payload read from `pyproject.toml`.
///
/// No defaults are applied here; the configuration resolver owns those.
#[derive(Debug, Clone)]
pub struct PyProjectData {
    pub path: PathBuf,
    pub tool_name: String,
    pub project_name: Option<String>,
    pub section: Table,
    pub section_present: bool,
    pub project_present: bool,
}

impl PyProjectData {
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            tool_name: TOOL_SECTIONS[0].to_owned(),
            project_name: None,
            section: Table::new(),
            section_present: false,
            project_present: false,
        }
    }

    /// Read and parse the anchor file. A missing file yields the empty
    /// payload; malformed TOML is an error.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no pyproject file, using empty payload");
                return Ok(Self::empty(path));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("invalid TOML in {}", path.display()))?;

        let tool = doc.get("tool").and_then(|item| item.as_table_like());
        let mut section = Table::new();
        let mut section_present = false;
        let mut tool_name = TOOL_SECTIONS[0].to_owned();
        // Merge alias sections shallowly, primary keys winning: iterate in
        // reverse precedence so later inserts overwrite.
        for name in TOOL_SECTIONS.iter().rev() {
            let Some(found) = tool
                .and_then(|tool| tool.get(name))
                .and_then(|item| item.as_table_like())
            else {
                continue;
            };
            section_present = true;
            // The loop runs in reverse precedence, so the last hit is the
            // section that actually governs.
            tool_name = (*name).to_owned();
            for (key, item) in found.iter() {
                section.insert(key, item.clone());
            }
        }

        let project = doc.get("project").and_then(|item| item.as_table_like());
        let project_present = project.is_some();
        let project_name = project
            .and_then(|project| project.get("name"))
            .and_then(|item| item.as_str())
            .map(str::to_owned);

        Ok(Self {
            path: path.to_owned(),
            tool_name,
            project_name,
            section,
            section_present,
            project_present,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_pyproject(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn reads_project_name_and_section() {
        let (_dir, path) = write_pyproject(
            r#"
[project]
name = "My.Pkg"

[tool.setuptools_scm]
local_scheme = "no-local-version"
"#,
        );
        let data = PyProjectData::read(&path).unwrap();
        assert!(data.section_present);
        assert!(data.project_present);
        assert_eq!(data.project_name.as_deref(), Some("My.Pkg"));
        assert_eq!(
            data.section.get("local_scheme").and_then(|i| i.as_str()),
            Some("no-local-version")
        );
    }

    #[test]
    fn missing_file_yields_empty_payload() {
        let dir = tempfile::tempdir().unwrap();
        let data = PyProjectData::read(&dir.path().join("pyproject.toml")).unwrap();
        assert!(!data.section_present);
        assert!(!data.project_present);
        assert!(data.project_name.is_none());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let (_dir, path) = write_pyproject("[tool.setuptools_scm\n");
        assert!(PyProjectData::read(&path).is_err());
    }

    #[test]
    fn primary_section_wins_shallow_merge() {
        let (_dir, path) = write_pyproject(
            r#"
[tool.vcs-versioning]
local_scheme = "dirty-tag"
fallback_version = "9.9"

[tool.setuptools_scm]
local_scheme = "no-local-version"
"#,
        );
        let data = PyProjectData::read(&path).unwrap();
        assert_eq!(data.tool_name, "setuptools_scm");
        assert_eq!(
            data.section.get("local_scheme").and_then(|i| i.as_str()),
            Some("no-local-version")
        );
        assert_eq!(
            data.section.get("fallback_version").and_then(|i| i.as_str()),
            Some("9.9")
        );
    }
}
