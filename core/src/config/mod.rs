//! YAML configuration model: `base.yaml`, `agents.yaml`, `databases.yaml`
//! and `producers.yaml` deserialize into the structs below via
//! `serde`/`serde_yaml`; each carries a `validate()` pass that surfaces
//! constraints serde alone can't express (positive intervals, port ranges,
//! cross-references between agents and path files).

mod agent;
mod app;
mod database;
mod producer;

pub use agent::{
    AgentConfig, DataConnectionConfig, PathFileConfig, ProducerConnectionConfig, QueryRefConfig,
    RegexSourceConfig,
};
pub use app::AppConfig;
pub use database::{BaseDatabaseConfig, DbEndpoint};
pub use producer::BaseProducerConfig;

/// Root document for `agents.yaml`, `databases.yaml` and `producers.yaml`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentsDocument {
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabasesDocument {
    pub databases: Vec<BaseDatabaseConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProducersDocument {
    pub producers: Vec<BaseProducerConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BaseDocument {
    pub app: AppConfig,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{field} must be greater than 0, got {value}")]
    MustBePositive { field: &'static str, value: i64 },

    #[error("{field} out of range 1..=65535, got {value}")]
    PortOutOfRange { field: &'static str, value: u32 },

    #[error("agent `{agent}` references unknown path_file `{path_file}`")]
    UnknownPathFile { agent: String, path_file: String },

    #[error("path `{0}` does not exist")]
    PathFileMissing(String),

    #[error("invalid regex pattern for path file `{path_file_name}`: {source}")]
    InvalidPattern {
        path_file_name: String,
        #[source]
        source: regex::Error,
    },
}

/// Parses a YAML document of type `T` from `path`, wrapping I/O and parse
/// failures into [`ConfigError`] with the path attached for diagnostics.
pub fn load_yaml<T: serde::de::DeserializeOwned>(
    path: impl AsRef<std::path::Path>,
) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
