/// Typed failure kinds surfaced through `anyhow::Error`.
///
/// Recoverable stage failures in the inference pipeline never use these;
/// they move control to the next stage instead. These kinds abort the call.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("'{root}' is a shallow clone, version inference from it is unreliable")]
    RepoShallow { root: String },

    #[error("submodule '{path}' declared in .gitmodules is not checked out under '{root}'")]
    SubmoduleMissing { root: String, path: String },

    #[error(
        "no version could be inferred for '{root}'\n{attempts}\nhint: \
         tag a commit, or set fallback_version in the configuration"
    )]
    NoVersionInferred { root: String, attempts: String },

    #[error("override value in {variable} could not be decoded: {reason}")]
    OverrideDecode { variable: String, reason: String },
}

impl InferenceError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}
