use regocheck_ast::Errors;
use regocheck_loader::LoadError;
use thiserror::Error;

/// Why a check run failed.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Inputs could not be read or parsed; nothing was compiled.
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Compile(#[from] Errors),
}

impl CheckError {
    /// Structured diagnostics carried by this failure, if any.
    pub fn diagnostics(&self) -> Option<&Errors> {
        match self {
            CheckError::Load(err) => err.parse_errors(),
            CheckError::Compile(errs) => Some(errs),
        }
    }
}
