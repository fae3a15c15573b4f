use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::global_limiter::GlobalLimiterConfig;
use crate::per_client_limiter::PerClientConfig;
use crate::shortener::ShortenerConfig;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "0.0.0.0:8090")]
    pub bind_addr: SocketAddr,

    /// Public origin of the service, always allowed by CORS
    #[envconfig(from = "BASE_URL", default = "https://pety.to")]
    pub base_url: String,

    /// Comma separated extra CORS origins
    #[envconfig(
        from = "CORS_ALLOWED_ORIGINS",
        default = "http://localhost:3000,http://localhost:8090"
    )]
    pub cors_allowed_origins: String,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Tokens available at startup, defaults to the capacity
    #[envconfig(from = "GLOBAL_LIMITER_COUNT")]
    pub global_limiter_count: Option<u64>,

    #[envconfig(from = "GLOBAL_LIMITER_CAP", default = "50000")]
    pub global_limiter_cap: u64,

    /// Tokens added per second
    #[envconfig(from = "GLOBAL_LIMITER_RATE", default = "600000")]
    pub global_limiter_rate: u64,

    /// Distinct clients tracked at once
    #[envconfig(from = "PER_CLIENT_LIMITER_CAP", default = "50000")]
    pub per_client_limiter_cap: usize,

    /// Requests per client per window
    #[envconfig(from = "PER_CLIENT_LIMITER_LIMIT", default = "10")]
    pub per_client_limiter_limit: usize,

    #[envconfig(from = "PER_CLIENT_WINDOW_SECONDS", default = "60")]
    pub per_client_window_secs: u64,

    #[envconfig(from = "PER_CLIENT_LIMITER_CLIENT_TTL", default = "1800")]
    pub per_client_client_ttl_secs: u64,

    #[envconfig(from = "PER_CLIENT_SWEEP_INTERVAL_SECONDS", default = "1800")]
    pub per_client_sweep_interval_secs: u64,

    #[envconfig(from = "SHORTENER_CAP", default = "100000")]
    pub shortener_cap: usize,

    #[envconfig(from = "SHORTENER_TTL_SECONDS", default = "3600")]
    pub shortener_ttl_secs: u64,

    #[envconfig(from = "SHORT_CODE_LENGTH", default = "4")]
    pub short_code_length: usize,

    #[envconfig(from = "MAX_URL_LENGTH", default = "4096")]
    pub max_url_length: usize,

    #[envconfig(
        from = "FALLBACK_404_HTML",
        default = "<h1>Short link not found</h1><p>It seems this short link has expired or never existed.</p><a href='/'>Go to homepage</a>"
    )]
    pub fallback_404_html: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config::init_from_env()?)
    }

    pub fn global_limiter(&self) -> GlobalLimiterConfig {
        GlobalLimiterConfig {
            initial_count: self.global_limiter_count.unwrap_or(self.global_limiter_cap),
            capacity: self.global_limiter_cap,
            rate_per_second: self.global_limiter_rate,
        }
    }

    pub fn per_client_limiter(&self) -> PerClientConfig {
        PerClientConfig::new(
            self.per_client_limiter_cap,
            self.per_client_limiter_limit,
            Duration::from_secs(self.per_client_window_secs),
            Duration::from_secs(self.per_client_client_ttl_secs),
        )
        .with_sweep_interval(Duration::from_secs(self.per_client_sweep_interval_secs))
    }

    pub fn shortener(&self) -> ShortenerConfig {
        ShortenerConfig::new(
            self.shortener_cap,
            Duration::from_secs(self.shortener_ttl_secs),
            self.short_code_length,
        )
    }

    /// The base URL followed by the configured extra origins.
    pub fn cors_origins(&self) -> Vec<String> {
        std::iter::once(self.base_url.as_str())
            .chain(self.cors_allowed_origins.split(','))
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8090".parse().unwrap());
        assert_eq!(config.global_limiter().initial_count, 50000);
        assert_eq!(config.global_limiter().rate_per_second, 600000);
        assert_eq!(config.per_client_limiter().window, Duration::from_secs(60));
        assert_eq!(config.per_client_limiter().client_ttl, Duration::from_secs(1800));
        assert_eq!(config.shortener().ttl, Duration::from_secs(3600));
        assert_eq!(config.shortener().code_length, 4);
        assert_eq!(
            config.cors_origins(),
            vec!["https://pety.to", "http://localhost:3000", "http://localhost:8090"]
        );
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<String, String> = [
            ("GLOBAL_LIMITER_CAP", "10"),
            ("GLOBAL_LIMITER_COUNT", "3"),
            ("PER_CLIENT_WINDOW_SECONDS", "5"),
            ("CORS_ALLOWED_ORIGINS", " http://a.test , "),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::init_from_hashmap(&vars).unwrap();
        assert_eq!(config.global_limiter().capacity, 10);
        assert_eq!(config.global_limiter().initial_count, 3);
        assert_eq!(config.per_client_limiter().window, Duration::from_secs(5));
        assert_eq!(config.cors_origins(), vec!["https://pety.to", "http://a.test"]);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let vars: HashMap<String, String> =
            [("SHORTENER_CAP".to_string(), "lots".to_string())].into_iter().collect();
        let err = GateError::from(Config::init_from_hashmap(&vars).unwrap_err());
        assert!(matches!(err, GateError::Configuration(_)));
    }
}
