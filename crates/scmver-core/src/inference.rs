use anyhow::{anyhow, Result};
use tracing::debug;

use scmver_domain::{format_version, ScmVersion, ScmVersionBuilder, TagVersion};

use crate::archival;
use crate::config::Configuration;
use crate::diagnostics::Diagnostics;
use crate::discover;
use crate::errors::InferenceError;
use crate::fallbacks;
use crate::overrides::{self, EnvSnapshot};

/// Infer the version metadata and render the final version string.
pub fn get_version(config: &Configuration) -> Result<(ScmVersion, String)> {
    let env = EnvSnapshot::capture();
    let diag = Diagnostics::new();
    get_version_with_env(config, &env, &diag)
}

pub fn get_version_with_env(
    config: &Configuration,
    env: &EnvSnapshot,
    diag: &Diagnostics,
) -> Result<(ScmVersion, String)> {
    let scm = get_scm_version(config, env, diag)?;
    let rendered = render(&scm, config)?;
    debug!(version = %rendered, "inferred version");
    Ok((scm, rendered))
}

/// The staged resolution pipeline. The first successful stage wins;
/// recoverable per-stage failures fall through to the next stage.
pub fn get_scm_version(
    config: &Configuration,
    env: &EnvSnapshot,
    diag: &Diagnostics,
) -> Result<ScmVersion> {
    let mut attempts: Vec<&str> = Vec::new();

    if let Some(scm) = pretend_version(config, env, diag)? {
        return Ok(scm);
    }
    attempts.push("no pretend version is set");

    if let Some(parse) = config.parse {
        return match parse(&config.absolute_root, config, diag)? {
            Some(scm) => Ok(scm),
            None => Err(anyhow!(
                "the configured parse function returned no version for '{}'",
                config.absolute_root.display()
            )),
        };
    }

    if let Some(scm) = archival::parse_git_archival(&config.absolute_root, config, diag)? {
        return Ok(scm);
    }
    if let Some(scm) = archival::parse_hg_archival(&config.absolute_root, config)? {
        return Ok(scm);
    }
    attempts.push("no usable archival metadata file is present");

    if let Some((root, backend)) = discover::discover_backend(config, env) {
        if let Some(scm) = backend.parse(&root, config, diag)? {
            return Ok(scm);
        }
        attempts.push("a VCS marker was found but yielded no metadata");
    } else {
        attempts.push("no VCS control directory was found");
    }

    if let Some(scm) = fallbacks::parse_parentdir(config)? {
        return Ok(scm);
    }
    attempts.push("the directory name does not carry a version prefix");

    if let Some(scm) = fallbacks::parse_pkginfo(&config.fallback_root)? {
        return Ok(scm);
    }
    attempts.push("no PKG-INFO file is present");

    if let Some(scm) = fallbacks::parse_fallback_version(config)? {
        return Ok(scm);
    }
    attempts.push("no fallback_version is configured");

    let attempts = attempts
        .iter()
        .map(|attempt| format!("- {attempt}"))
        .collect::<Vec<_>>()
        .join("\n");
    Err(InferenceError::NoVersionInferred {
        root: config.absolute_root.display().to_string(),
        attempts,
    }
    .into())
}

/// Stage 1: a pretend version short-circuits every other stage; pretend
/// metadata fills or overrides individual fields of the result.
fn pretend_version(
    config: &Configuration,
    env: &EnvSnapshot,
    diag: &Diagnostics,
) -> Result<Option<ScmVersion>> {
    let dist_name = config.dist_name.as_deref();
    let Some(version) = overrides::read_pretend_version(env, dist_name) else {
        if overrides::read_pretend_metadata(env, dist_name)?.is_some() {
            diag.warn_once(
                "pretend metadata is set but no pretend version, metadata overrides \
                 cannot be applied without a base version",
            );
        }
        return Ok(None);
    };
    debug!(%version, "using pretend version");
    let metadata = overrides::read_pretend_metadata(env, dist_name)?.unwrap_or_default();
    let tag_text = metadata.tag.unwrap_or(version);
    let tag = TagVersion::parse(&tag_text, false)
        .map_err(|reason| anyhow!("pretend version '{tag_text}' is invalid: {reason}"))?;
    let time = metadata
        .time
        .unwrap_or_else(overrides::source_epoch_or_utc_now);
    Ok(Some(
        ScmVersionBuilder::new(tag, time)
            .distance(metadata.distance.unwrap_or(0))
            .node(metadata.node)
            .dirty(metadata.dirty.unwrap_or(false))
            .preformatted(metadata.preformatted.unwrap_or(true))
            .branch(metadata.branch)
            .node_date(metadata.node_date)
            .build(),
    ))
}

/// Apply the configured schemes and re-validate the produced string through
/// the version type (preformatted output bypasses both).
pub fn render(scm: &ScmVersion, config: &Configuration) -> Result<String> {
    let version = format_version(
        scm,
        &config.scheme_context(),
        &config.version_scheme,
        &config.local_scheme,
    )?;
    if !scm.preformatted {
        TagVersion::parse(&version, config.normalize).map_err(|reason| {
            anyhow!("the rendered version '{version}' does not parse: {reason}")
        })?;
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverlay;
    use crate::overrides::GlobalOverrides;
    use crate::pyproject::PyProjectData;
    use crate::run_cmd::run_command;
    use std::fs;
    use std::path::Path;

    fn config_with(root: &Path, overlay: ConfigOverlay, dist_name: Option<&str>) -> Configuration {
        let diag = Diagnostics::new();
        let overlay = ConfigOverlay {
            root: Some(root.to_owned()),
            ..overlay
        };
        Configuration::from_data(
            &PyProjectData::empty(&root.join("pyproject.toml")),
            dist_name,
            overlay,
            &EnvSnapshot::testing(&[]),
            &diag,
        )
        .unwrap()
    }

    #[test]
    fn pretend_version_for_dist_wins_outside_any_repo() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), ConfigOverlay::default(), Some("my-pkg"));
        let env = EnvSnapshot::testing(&[(
            "SETUPTOOLS_SCM_PRETEND_VERSION_FOR_MY_PKG",
            "9.9.9",
        )]);
        let diag = Diagnostics::new();
        let (scm, version) = get_version_with_env(&config, &env, &diag).unwrap();
        assert!(scm.preformatted);
        assert_eq!(version, "9.9.9");
    }

    #[test]
    fn pretend_metadata_fills_fields_and_reenables_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let env = EnvSnapshot::testing(&[
            ("SETUPTOOLS_SCM_PRETEND_VERSION", "1.2.3"),
            (
                "SETUPTOOLS_SCM_PRETEND_METADATA",
                "{distance = 4, node = \"g1337beef\", preformatted = false, time = 2024-01-01T00:00:00Z}",
            ),
        ]);
        let diag = Diagnostics::new();
        let (scm, version) = get_version_with_env(&config, &env, &diag).unwrap();
        assert_eq!(scm.distance, 4);
        assert_eq!(scm.node.as_deref(), Some("g1337beef"));
        assert_eq!(version, "1.2.4.dev4+g1337beef");
    }

    #[test]
    fn parentdir_prefix_stage_applies_without_vcs() {
        let dir = tempfile::tempdir().unwrap();
        let extracted = dir.path().join("myproj-1.4.0");
        fs::create_dir(&extracted).unwrap();
        let config = config_with(
            &extracted,
            ConfigOverlay {
                parentdir_prefix_version: Some("myproj-".to_owned()),
                ..ConfigOverlay::default()
            },
            None,
        );
        let diag = Diagnostics::new();
        let (_, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert_eq!(version, "1.4.0");
    }

    #[test]
    fn pkg_info_stage_reads_sdist_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("PKG-INFO"), "Name: demo\nVersion: 3.2.1\n").unwrap();
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (_, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert_eq!(version, "3.2.1");
    }

    #[test]
    fn archival_stage_precedes_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".git_archival.txt"),
            "node: deadbee1337beefdeadbee1337beefdeadbee13\ndescribe-name: v2.0.0-3-gdeadbee\n",
        )
        .unwrap();
        fs::write(dir.path().join("PKG-INFO"), "Version: 9.9\n").unwrap();
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (_, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert_eq!(version, "2.0.1.dev3+gdeadbee");
    }

    #[test]
    fn exhausted_stages_report_each_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let err = get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap_err();
        let kind = err.downcast_ref::<InferenceError>().unwrap();
        let message = kind.to_string();
        assert!(matches!(kind, InferenceError::NoVersionInferred { .. }));
        assert!(message.contains("no pretend version"));
        assert!(message.contains("no fallback_version"));
        assert!(message.contains("fallback_version"));
    }

    #[test]
    fn fallback_version_closes_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(
            dir.path(),
            ConfigOverlay {
                fallback_version: Some("0.1.dev0".to_owned()),
                ..ConfigOverlay::default()
            },
            None,
        );
        let diag = Diagnostics::new();
        let (_, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert_eq!(version, "0.1.dev0");
    }

    // Live-repository scenarios; skipped when git is unavailable.

    fn git(dir: &Path, args: &[&str]) {
        let args: Vec<String> = ["-c", "user.name=test", "-c", "user.email=test@example.invalid"]
            .iter()
            .map(|s| (*s).to_string())
            .chain(args.iter().map(|s| (*s).to_string()))
            .collect();
        let out = run_command("git", &args, &[], dir).expect("git runs");
        assert!(out.success(), "git {args:?} failed: {}", out.stderr);
    }

    fn git_available() -> bool {
        run_command("git", &["--version".to_owned()], &[], Path::new("."))
            .map(|out| out.success())
            .unwrap_or(false)
    }

    fn init_tagged_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        fs::write(dir.join("file.txt"), "one\n").unwrap();
        git(dir, &["add", "file.txt"]);
        git(dir, &["commit", "-q", "-m", "first"]);
        git(dir, &["tag", "v1.2.3"]);
    }

    #[test]
    fn clean_tagged_checkout_renders_the_tag() {
        if !git_available() {
            eprintln!("skipping live git test (git not found)");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_tagged_repo(dir.path());
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (scm, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert!(scm.exact());
        assert_eq!(version, "1.2.3");
    }

    #[test]
    fn distance_bumps_and_appends_node() {
        if !git_available() {
            eprintln!("skipping live git test (git not found)");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_tagged_repo(dir.path());
        git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "second"]);
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (scm, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert_eq!(scm.distance, 1);
        assert!(!scm.dirty);
        assert!(
            version.starts_with("1.2.4.dev1+g"),
            "unexpected version {version}"
        );
    }

    #[test]
    fn dirty_tree_appends_source_epoch_date() {
        if !git_available() {
            eprintln!("skipping live git test (git not found)");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_tagged_repo(dir.path());
        git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "second"]);
        fs::write(dir.path().join("file.txt"), "changed\n").unwrap();

        let env = EnvSnapshot::testing(&[("SOURCE_DATE_EPOCH", "1704067200")]);
        let _guard = GlobalOverrides::from_env("SETUPTOOLS_SCM", &env).enter();
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (scm, version) = get_version_with_env(&config, &env, &diag).unwrap();
        assert!(scm.dirty);
        assert!(
            version.starts_with("1.2.4.dev1+g") && version.ends_with(".d20240101"),
            "unexpected version {version}"
        );
    }

    #[test]
    fn mtime_only_touch_stays_clean() {
        if !git_available() {
            eprintln!("skipping live git test (git not found)");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_tagged_repo(dir.path());
        // Rewrite identical content so only the mtime changes.
        fs::write(dir.path().join("file.txt"), "one\n").unwrap();
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (scm, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert!(!scm.dirty);
        assert_eq!(version, "1.2.3");
    }

    #[test]
    fn empty_repository_keeps_sentinel_version() {
        if !git_available() {
            eprintln!("skipping live git test (git not found)");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("file.txt"), "untracked\n").unwrap();
        git(dir.path(), &["add", "file.txt"]);
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (scm, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert_eq!(scm.distance, 0);
        assert!(scm.node.is_none());
        assert!(version.starts_with("0.0.dev0"), "unexpected version {version}");
    }

    #[test]
    fn untagged_history_counts_all_commits() {
        if !git_available() {
            eprintln!("skipping live git test (git not found)");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("file.txt"), "one\n").unwrap();
        git(dir.path(), &["add", "file.txt"]);
        git(dir.path(), &["commit", "-q", "-m", "first"]);
        git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "second"]);
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let (scm, version) =
            get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap();
        assert_eq!(scm.distance, 2);
        assert!(version.starts_with("0.1.dev2+g"), "unexpected version {version}");
    }

    #[test]
    fn tag_rejected_by_version_type_propagates() {
        if !git_available() {
            eprintln!("skipping live git test (git not found)");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("file.txt"), "one\n").unwrap();
        git(dir.path(), &["add", "file.txt"]);
        git(dir.path(), &["commit", "-q", "-m", "first"]);
        // The default regex matches this tag, but its captured body is not
        // a version the version type accepts.
        git(dir.path(), &["tag", "1.2.3.beta.gamma"]);
        let config = config_with(dir.path(), ConfigOverlay::default(), None);
        let diag = Diagnostics::new();
        let err = get_version_with_env(&config, &EnvSnapshot::testing(&[]), &diag).unwrap_err();
        assert!(
            err.to_string().contains("not PEP 440"),
            "unexpected error {err:#}"
        );
    }
}
