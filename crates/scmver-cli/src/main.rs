#![deny(clippy::all, warnings)]

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;

use scmver_core::discover::discover_backend;
use scmver_core::{
    get_version_with_env, ConfigOverlay, Configuration, Diagnostics, EnvSnapshot, GlobalOverrides,
};
use scmver_domain::strip_dev_and_local;

mod cli;
mod output;

use cli::{CommandCli, ScmverCli};
use output::render_version;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = ScmverCli::parse();
    init_tracing(cli.verbose);

    let env_snapshot = EnvSnapshot::capture();
    let _overrides = GlobalOverrides::from_env("SETUPTOOLS_SCM", &env_snapshot).enter();
    let diag = Diagnostics::new();

    let config_path = resolve_config_path(&cli)?;
    let overlay = overlay_from_args(&cli);
    let config = Configuration::from_file(&config_path, None, overlay, &env_snapshot, &diag)
        .map_err(|err| eyre!("{err:#}"))?;

    match &cli.command {
        Some(CommandCli::Ls) => run_ls(&config, &env_snapshot),
        None => run_infer(&cli, &config, &env_snapshot, &diag),
    }
}

fn run_infer(
    cli: &ScmverCli,
    config: &Configuration,
    env_snapshot: &EnvSnapshot,
    diag: &Diagnostics,
) -> Result<()> {
    let (scm, rendered) =
        get_version_with_env(config, env_snapshot, diag).map_err(|err| eyre!("{err:#}"))?;
    let rendered = if cli.strip_dev {
        strip_dev_and_local(&rendered)
    } else {
        rendered
    };
    println!("{}", render_version(cli.format, &rendered, &scm));
    Ok(())
}

fn run_ls(config: &Configuration, env_snapshot: &EnvSnapshot) -> Result<()> {
    let Some((root, backend)) = discover_backend(config, env_snapshot) else {
        return Err(eyre!(
            "no supported SCM was found at '{}'",
            config.absolute_root.display()
        ));
    };
    let files = backend.list_files(&root).map_err(|err| eyre!("{err:#}"))?;
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}

/// An explicit `--config` wins; otherwise the anchor file is looked up in
/// the starting directory and its parents.
fn resolve_config_path(cli: &ScmverCli) -> Result<PathBuf> {
    if let Some(config) = &cli.config {
        return Ok(config.clone());
    }
    let cwd = env::current_dir().map_err(|err| eyre!("cannot resolve cwd: {err}"))?;
    let start = match &cli.root {
        Some(root) if root.is_absolute() => root.clone(),
        Some(root) => cwd.join(root),
        None => cwd,
    };
    let mut current: Option<&Path> = Some(start.as_path());
    while let Some(dir) = current {
        let candidate = dir.join("pyproject.toml");
        if candidate.is_file() {
            return Ok(candidate);
        }
        current = dir.parent();
    }
    Ok(start.join("pyproject.toml"))
}

fn overlay_from_args(cli: &ScmverCli) -> ConfigOverlay {
    ConfigOverlay {
        root: cli.root.clone(),
        version_scheme: cli.version_scheme.clone().map(|scheme| vec![scheme]),
        local_scheme: cli.local_scheme.clone(),
        tag_regex: cli.tag_regex.clone(),
        ..ConfigOverlay::default()
    }
}

fn init_tracing(verbose: u8) {
    let debug_env = env::var("SETUPTOOLS_SCM_DEBUG")
        .ok()
        .filter(|value| !value.is_empty() && value != "0");
    let level = if debug_env.is_some() {
        "debug"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("scmver={level},scmver_cli={level},scmver_core={level},scmver_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
