#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod archival;
pub mod backends;
pub mod config;
pub mod diagnostics;
pub mod discover;
pub mod errors;
pub mod fallbacks;
pub mod inference;
pub mod overrides;
pub mod pyproject;
pub mod run_cmd;

pub use config::{ConfigOverlay, Configuration, GitPreParse};
pub use diagnostics::Diagnostics;
pub use errors::InferenceError;
pub use inference::{get_scm_version, get_version, get_version_with_env};
pub use overrides::{EnvSnapshot, GlobalOverrides};
pub use pyproject::PyProjectData;
pub use run_cmd::{run_command, run_command_with_timeout, RunOutput, VcsCommandError};
