use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub uri: String,
    pub max_connections: u32,
}

fn default_max_billing_periods() -> usize {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Requests with more periods are rejected before any query runs.
    #[serde(default = "default_max_billing_periods")]
    pub max_billing_periods: usize,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            max_billing_periods: default_max_billing_periods(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `billing_service=debug`.
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    pub metrics: Option<MetricsConfig>,
    pub log: Option<LogConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("BILLING_CONFIG").unwrap_or_else(|_| "billing-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.log.as_ref().map(|l| l.filter.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [postgres]
            uri = "postgres://billing@localhost/meters"
            max_connections = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.postgres.max_connections, 4);
        assert_eq!(cfg.billing.max_billing_periods, 24);
        assert!(cfg.metrics.is_none());
        assert_eq!(cfg.log_filter(), None);
    }

    #[test]
    fn full_config() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [postgres]
            uri = "postgres://billing@localhost/meters"
            max_connections = 8

            [billing]
            max_billing_periods = 12

            [metrics]
            bind_addr = "127.0.0.1:9100"

            [log]
            filter = "billing_service=debug"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.billing.max_billing_periods, 12);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9100");
        assert_eq!(cfg.log.unwrap().filter, "billing_service=debug");
    }

    #[test]
    fn missing_postgres_section_is_an_error() {
        assert!(AppConfig::from_toml_str("[billing]\nmax_billing_periods = 3\n").is_err());
    }
}
