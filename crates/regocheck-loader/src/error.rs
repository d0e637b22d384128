use camino::Utf8PathBuf;
use regocheck_ast::Errors;
use thiserror::Error;

/// Failure to turn input paths into modules or schemas. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("walk {path}: {source}")]
    Walk {
        path: Utf8PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{0}: path is not valid UTF-8")]
    NonUtf8Path(String),

    /// Every parse error found across the loaded files.
    #[error(transparent)]
    Parse(#[from] Errors),

    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("bundle {path}: {message}")]
    Bundle { path: Utf8PathBuf, message: String },

    #[error("schema {path}: {message}")]
    Schema { path: Utf8PathBuf, message: String },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn bundle(path: impl Into<Utf8PathBuf>, message: impl Into<String>) -> Self {
        LoadError::Bundle {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(path: impl Into<Utf8PathBuf>, message: impl Into<String>) -> Self {
        LoadError::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The parse diagnostics, when this is a parse failure.
    pub fn parse_errors(&self) -> Option<&Errors> {
        match self {
            LoadError::Parse(errs) => Some(errs),
            _ => None,
        }
    }
}
