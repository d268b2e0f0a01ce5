/// `base.yaml`'s `app` section: process-wide identity and logging setup,
/// consumed by the `cli` crate when it initializes `env_logger` — the core
/// never reads this itself.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub log_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
