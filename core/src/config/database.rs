use super::ConfigError;

/// One entry of `databases.yaml`. `type`/`name` form the registry key a
/// `SharedResourceRegistry<Database>` looks connections up by.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BaseDatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: String,
    pub name: String,
    pub username: String,
    pub password: String,
    pub primary: DbEndpoint,
    pub replica: Option<DbEndpoint>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DbEndpoint {
    pub host: String,
    pub port: u32,
    pub service_name: Option<String>,
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_workers() -> usize {
    10
}

impl BaseDatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_retries",
                value: self.max_retries as i64,
            });
        }
        if self.max_workers == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_workers",
                value: self.max_workers as i64,
            });
        }
        self.primary.validate()?;
        if let Some(replica) = &self.replica {
            replica.validate()?;
        }
        Ok(())
    }
}

impl DbEndpoint {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 || self.port > 65535 {
            return Err(ConfigError::PortOutOfRange {
                field: "primary.port",
                value: self.port,
            });
        }
        Ok(())
    }
}
