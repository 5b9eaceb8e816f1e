//! Error types for stria passes.

use stria_ir::IrError;

use crate::validation::Failure;

/// Errors returned by passes and the pass manager.
#[derive(Debug, thiserror::Error)]
pub enum OptError {
    /// The module failed validation.
    #[error("validation failed:\n{0}")]
    Validation(#[from] Failure),

    /// A graph edit failed.
    #[error(transparent)]
    Ir(#[from] IrError),

    /// A pass met a module shape it cannot handle. This indicates a bug in
    /// whatever produced the module, not in user input.
    #[error("internal error in {pass}: {message}")]
    Pass { pass: &'static str, message: String },
}

impl OptError {
    pub(crate) fn pass(pass: &'static str, message: impl Into<String>) -> Self {
        Self::Pass {
            pass,
            message: message.into(),
        }
    }
}
