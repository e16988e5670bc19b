use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Source malformed: {path}: {reason}")]
    SourceMalformed { path: String, reason: String },

    #[error("Remote usage unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl Error {
    /// Whether this error only means "no data this cycle" for a source.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            Error::SourceUnavailable(_) | Error::SourceMalformed { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteUnavailable(err.to_string())
    }
}
