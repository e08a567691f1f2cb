use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Where batch logs go: always the console, optionally a Loki push target
/// when the binary is built with the `loki` feature and LOKI_ENABLED is set.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
    pub service_name: String,
    pub environment: String,
    pub log_level: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            loki_enabled: std::env::var("LOKI_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            loki_url: std::env::var("LOKI_URL").ok(),
            service_name: env_or("SERVICE_NAME", "riskbatch"),
            environment: env_or("ENVIRONMENT", "development"),
            log_level: env_or("RUST_LOG", "info"),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.loki_enabled && self.loki_url.is_none() {
            return Err("LOKI_ENABLED is true but LOKI_URL is not set".to_string());
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer());

    #[cfg(feature = "loki")]
    if config.loki_enabled {
        if let Some(loki_url) = &config.loki_url {
            let url = url::Url::parse(loki_url)?;
            let (loki_layer, task) = tracing_loki::builder()
                .label("service", &config.service_name)?
                .label("environment", &config.environment)?
                .build_url(url)?;

            // Background task ships the buffered log lines
            tokio::spawn(task);

            registry.with(loki_layer).init();
            tracing::info!("✅ Logging initialized with Loki push to {}", loki_url);
            return Ok(());
        }
    }

    registry.init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loki_without_url_fails_validation() {
        let config = LoggingConfig {
            loki_enabled: true,
            loki_url: None,
            service_name: "riskbatch".to_string(),
            environment: "test".to_string(),
            log_level: "info".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn console_only_config_is_valid() {
        let config = LoggingConfig {
            loki_enabled: false,
            loki_url: None,
            service_name: "riskbatch".to_string(),
            environment: "test".to_string(),
            log_level: "debug".to_string(),
        };
        assert!(config.validate().is_ok());
    }
}
