use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    // 网关自身
    pub gateway_api_key: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub cors_enabled: bool,
    pub log_format: LogFormat,

    // 下游 Maximo
    pub maximo_api_url: String,
    pub maximo_api_key: String,
    pub maximo_maxauth: String,
    pub maximo_timeout_secs: u64,
    pub maximo_max_retries: u32,

    // Redis
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub redis_password: Option<String>,
    pub redis_enabled: bool,

    // 缓存 TTL（秒）
    pub cache_ttl_asset_secs: u64,
    pub cache_ttl_workorder_secs: u64,
    pub cache_ttl_inventory_secs: u64,
    pub cache_ttl_search_secs: u64,
    pub cache_ttl_user_secs: u64,

    // 限流
    pub rate_limit_enabled: bool,
    pub rate_limit_per_minute: u32,
    pub rate_limit_search_per_minute: u32,
    pub rate_limit_create_per_minute: u32,
    pub rate_limit_idle_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源加载配置，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let log_format = match vars.text("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" | "pretty" => LogFormat::Text,
            other => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        Ok(Config {
            gateway_api_key: vars.required("GATEWAY_API_KEY")?,
            server_host: vars.text("SERVER_HOST", "0.0.0.0"),
            server_port: vars.parse("SERVER_PORT", 8000)?,
            api_base_uri: vars.text("API_BASE_URI", "/api"),
            cors_enabled: vars.flag("CORS_ENABLED", true)?,
            log_format,

            maximo_api_url: vars.required("MAXIMO_API_URL")?,
            maximo_api_key: vars.required("MAXIMO_API_KEY")?,
            maximo_maxauth: vars.text("MAXIMO_MAXAUTH", ""),
            maximo_timeout_secs: vars.parse("MAXIMO_TIMEOUT", 30)?,
            maximo_max_retries: vars.parse("MAXIMO_MAX_RETRIES", 3)?,

            redis_host: vars.text("REDIS_HOST", "localhost"),
            redis_port: vars.parse("REDIS_PORT", 6379)?,
            redis_db: vars.parse("REDIS_DB", 0)?,
            redis_password: vars.optional("REDIS_PASSWORD"),
            redis_enabled: vars.flag("REDIS_ENABLED", true)?,

            cache_ttl_asset_secs: vars.parse("CACHE_TTL_ASSET", 600)?,
            cache_ttl_workorder_secs: vars.parse("CACHE_TTL_WORKORDER", 300)?,
            cache_ttl_inventory_secs: vars.parse("CACHE_TTL_INVENTORY", 600)?,
            cache_ttl_search_secs: vars.parse("CACHE_TTL_SEARCH", 300)?,
            cache_ttl_user_secs: vars.parse("CACHE_TTL_USER", 300)?,

            rate_limit_enabled: vars.flag("RATE_LIMIT_ENABLED", true)?,
            rate_limit_per_minute: vars.parse("RATE_LIMIT_PER_MINUTE", 100)?,
            rate_limit_search_per_minute: vars.parse("RATE_LIMIT_SEARCH_PER_MINUTE", 50)?,
            rate_limit_create_per_minute: vars.parse("RATE_LIMIT_CREATE_PER_MINUTE", 20)?,
            rate_limit_idle_secs: vars.parse("RATE_LIMIT_IDLE_SECS", 600)?,
        })
    }

    pub fn maximo_timeout(&self) -> Duration {
        Duration::from_secs(self.maximo_timeout_secs)
    }

    pub fn rate_limit_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.rate_limit_idle_secs)
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
}

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn text(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value }),
            },
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("GATEWAY_API_KEY", "gateway-key"),
        ("MAXIMO_API_URL", "https://maximo.example.com/maximo"),
        ("MAXIMO_API_KEY", "maximo-key"),
    ];

    #[test]
    fn applies_defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.maximo_timeout(), Duration::from_secs(30));
        assert_eq!(config.maximo_max_retries, 3);
        assert_eq!(config.redis_port, 6379);
        assert!(config.redis_enabled);
        assert_eq!(config.redis_password, None);
        assert_eq!(config.cache_ttl_asset_secs, 600);
        assert_eq!(config.cache_ttl_search_secs, 300);
        assert_eq!(config.rate_limit_per_minute, 100);
        assert_eq!(config.rate_limit_search_per_minute, 50);
        assert_eq!(config.rate_limit_create_per_minute, 20);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.server_port, 8000);
        assert_eq!(config.api_base_uri, "/api");
    }

    #[test]
    fn reports_missing_required_values() {
        let err = load(&REQUIRED[..2]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("MAXIMO_API_KEY"));
    }

    #[test]
    fn parses_overrides_and_rejects_garbage() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("REDIS_ENABLED", "false"),
            ("REDIS_PASSWORD", "s3cret"),
            ("RATE_LIMIT_SEARCH_PER_MINUTE", "5"),
            ("LOG_FORMAT", "JSON"),
        ]);
        let config = load(&pairs).unwrap();
        assert!(!config.redis_enabled);
        assert_eq!(config.redis_password.as_deref(), Some("s3cret"));
        assert_eq!(config.rate_limit_search_per_minute, 5);
        assert_eq!(config.log_format, LogFormat::Json);

        pairs.push(("MAXIMO_TIMEOUT", "thirty"));
        let err = load(&pairs).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "MAXIMO_TIMEOUT",
                value: "thirty".into()
            }
        );
    }
}
