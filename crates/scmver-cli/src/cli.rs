use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Print the project version inferred from SCM metadata"
)]
pub struct ScmverCli {
    #[arg(
        short,
        long,
        help = "Directory managed by the SCM, default: inferred from the config file, or \".\""
    )]
    pub root: Option<PathBuf>,
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to 'pyproject.toml' with the tool configuration, default: looked up in \
                the current or parent directories"
    )]
    pub config: Option<PathBuf>,
    #[arg(long, value_name = "NAME", help = "Override the main version scheme")]
    pub version_scheme: Option<String>,
    #[arg(long, value_name = "NAME", help = "Override the local scheme")]
    pub local_scheme: Option<String>,
    #[arg(long, value_name = "REGEX", help = "Override the tag parsing regex")]
    pub tag_regex: Option<String>,
    #[arg(
        long,
        help = "Remove the dev and local parts of the version before printing"
    )]
    pub strip_dev: bool,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain, help = "Output format")]
    pub format: OutputFormat,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Option<CommandCli>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Json,
    KeyValue,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(about = "List the files tracked by the SCM")]
    Ls,
}
