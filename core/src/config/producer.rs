use super::ConfigError;

/// One entry of `producers.yaml`. `topics`, when present, is the allowlist
/// enforced when a producer connection is acquired from the registry.
/// Concrete producer subtypes (broker addresses, TLS, `acks`, `batch_size`,
/// …) are out of scope for the core — they live behind the `Producer` trait
/// in whatever driver crate implements them.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BaseProducerConfig {
    #[serde(rename = "type")]
    pub producer_type: String,
    pub name: String,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    5
}

impl BaseProducerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_retries",
                value: self.max_retries as i64,
            });
        }
        Ok(())
    }

    pub fn allows_topic(&self, topic: &str) -> bool {
        match &self.topics {
            Some(allowed) => allowed.iter().any(|t| t == topic),
            None => true,
        }
    }
}
