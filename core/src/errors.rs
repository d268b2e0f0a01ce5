use crate::config::ConfigError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error taxonomy for the pipeline core, grouped by what the caller must do
/// about it rather than by subsystem: config errors abort creation of the
/// offending component, transient errors drive retry/cooldown and never
/// escape the executor or orchestrator that absorbed them.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown resource type `{0}`")]
    UnknownType(String),

    #[error("no configuration found for {kind} `{name}`")]
    ConfigNotFound { kind: &'static str, name: String },

    #[error("producer `{producer}` does not allow topic `{topic}`")]
    TopicNotAllowed { producer: String, topic: String },

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("query against {database} failed after exhausting retries: {detail}")]
    RetriesExhausted { database: String, detail: String },

    #[error("unexpected state: {0}")]
    UnexpectedState(String),

    #[error("an IO error occurred: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transient(detail: impl Into<String>) -> Self {
        Error::TransientIo(detail.into())
    }
}
