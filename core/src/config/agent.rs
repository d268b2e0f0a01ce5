use super::ConfigError;
use std::collections::HashSet;

/// One entry of `agents.yaml`. Drives one `AgentRuntime`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentConfig {
    #[serde(rename = "type")]
    pub agent_type: String,
    pub name: String,
    #[serde(default = "default_buffer_rows")]
    pub buffer_rows: usize,
    pub path_files: Vec<PathFileConfig>,
    pub producer_connections: Vec<ProducerConnectionConfig>,
    #[serde(default = "default_fetch_logs_interval")]
    pub fetch_logs_interval: u64,
    #[serde(default = "default_execute_query_interval")]
    pub execute_query_interval: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PathFileConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub cursor: Option<u64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProducerConnectionConfig {
    pub producer_type: String,
    pub producer_name: String,
    pub topic: String,
    pub data_connections: Vec<DataConnectionConfig>,
}

/// `source`/`destination` are both optional: a connection with no `source`
/// is query-only and seeded at startup; one with no `destination` delivers
/// the raw match dict without dispatching it anywhere.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DataConnectionConfig {
    pub name: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub is_warning: bool,
    pub source: Option<RegexSourceConfig>,
    pub destination: Option<QueryRefConfig>,
    pub ttl_minutes: Option<u64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegexSourceConfig {
    pub path_file_name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct QueryRefConfig {
    pub database_type: String,
    pub database_name: String,
    pub query_template: String,
}

fn default_buffer_rows() -> usize {
    500
}

fn default_fetch_logs_interval() -> u64 {
    120
}

fn default_execute_query_interval() -> u64 {
    600
}

impl AgentConfig {
    /// Checks positive intervals and buffer size, that every `path_files`
    /// entry points at a file that exists, and that every
    /// `source.path_file_name` resolves to a declared `path_files` entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_rows == 0 {
            return Err(ConfigError::MustBePositive {
                field: "buffer_rows",
                value: self.buffer_rows as i64,
            });
        }
        if self.fetch_logs_interval == 0 {
            return Err(ConfigError::MustBePositive {
                field: "fetch_logs_interval",
                value: self.fetch_logs_interval as i64,
            });
        }
        if self.execute_query_interval == 0 {
            return Err(ConfigError::MustBePositive {
                field: "execute_query_interval",
                value: self.execute_query_interval as i64,
            });
        }

        for path_file in &self.path_files {
            if !std::path::Path::new(&path_file.path).exists() {
                return Err(ConfigError::PathFileMissing(path_file.path.clone()));
            }
        }

        let known: HashSet<&str> = self.path_files.iter().map(|p| p.name.as_str()).collect();
        for producer in &self.producer_connections {
            for data_connection in &producer.data_connections {
                if let Some(source) = &data_connection.source {
                    if !known.contains(source.path_file_name.as_str()) {
                        return Err(ConfigError::UnknownPathFile {
                            agent: self.name.clone(),
                            path_file: source.path_file_name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample(buffer_rows: usize, fetch: u64, exec: u64, path: &str) -> AgentConfig {
        AgentConfig {
            agent_type: "demo".into(),
            name: "a1".into(),
            buffer_rows,
            path_files: vec![PathFileConfig {
                name: "app".into(),
                path: path.to_string(),
                cursor: None,
            }],
            producer_connections: vec![ProducerConnectionConfig {
                producer_type: "kafka".into(),
                producer_name: "demo".into(),
                topic: "errors".into(),
                data_connections: vec![DataConnectionConfig {
                    name: "err".into(),
                    is_error: true,
                    is_warning: false,
                    source: Some(RegexSourceConfig {
                        path_file_name: "app".into(),
                        pattern: r"^ERR (?P<code>\d+)$".into(),
                    }),
                    destination: None,
                    ttl_minutes: None,
                }],
            }],
            fetch_logs_interval: fetch,
            execute_query_interval: exec,
        }
    }

    #[test]
    fn accepts_well_formed_config() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        assert!(sample(500, 120, 600, &path).validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_intervals_and_buffer() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        assert!(sample(0, 120, 600, &path).validate().is_err());
        assert!(sample(500, 0, 600, &path).validate().is_err());
        assert!(sample(500, 120, 0, &path).validate().is_err());
    }

    #[test]
    fn rejects_missing_path_file() {
        let cfg = sample(500, 120, 600, "/nonexistent/does-not-exist.log");
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::PathFileMissing(_))
        ));
    }

    #[test]
    fn rejects_unresolved_path_file_reference() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        let mut cfg = sample(500, 120, 600, &path);
        cfg.producer_connections[0].data_connections[0]
            .source
            .as_mut()
            .unwrap()
            .path_file_name = "missing".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownPathFile { .. })
        ));
    }
}
