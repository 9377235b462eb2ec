use crate::error::OmsError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "znak.toml";

/// Prefix for environment overrides, e.g. `ZNAK_DATABASE_URL`.
pub const ENV_PREFIX: &str = "ZNAK_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub loglevel: String,
    pub proxy: Option<Url>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Extra attempts for transient failures; 0 disables retry.
    pub retry_max_times: usize,
    pub user_agent: String,
    /// Bytes of request/response body kept per `api_logs` row.
    pub log_body_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:znak.sqlite".to_string(),
            loglevel: "info".to_string(),
            proxy: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            retry_max_times: 2,
            user_agent: format!("znak-oms/{}", env!("CARGO_PKG_VERSION")),
            log_body_limit: 64 * 1024,
        }
    }
}

impl Config {
    /// Defaults, then `znak.toml`, then `ZNAK_*` environment variables.
    pub fn load() -> Result<Self, OmsError> {
        Self::figment().extract().map_err(OmsError::from)
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|e| {
        eprintln!("invalid configuration, falling back to defaults: {e}");
        Config::default()
    })
});
