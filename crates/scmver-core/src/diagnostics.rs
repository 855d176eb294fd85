use std::cell::RefCell;
use std::collections::HashSet;

use tracing::warn;

/// Per-inference-call warning sink.
///
/// Warnings go to stderr through `tracing`, and the same message is emitted
/// at most once per call.
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: RefCell<HashSet<String>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `message` unless it was already emitted during this call.
    pub fn warn_once(&self, message: &str) {
        if self.seen.borrow_mut().insert(message.to_owned()) {
            warn!("{message}");
        }
    }

    #[cfg(test)]
    pub(crate) fn emitted(&self, message: &str) -> bool {
        self.seen.borrow().contains(message)
    }
}
