use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown format: {0} (expected 'pretty' or 'json')")]
    UnknownFormat(String),

    #[error("invalid ignore glob: {pattern}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("read capabilities {path}")]
    CapabilitiesRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse capabilities {path}")]
    CapabilitiesParse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
