// Configuration module entry point
// Loads server configuration from an optional file plus environment overrides

mod types;

use std::time::Duration;

// Re-export public types
pub use types::{LoggingConfig, PerformanceConfig, ServerConfig};

/// Environment variable prefix, e.g. `TINYSERVE_MAX_CONCURRENCY=8`
const ENV_PREFIX: &str = "TINYSERVE";

impl ServerConfig {
    /// Configuration with defaults for everything but the prefixes
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            max_concurrency: 64,
            endpoint_filter: Vec::new(),
            performance: PerformanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from specified file path (extension optional).
    ///
    /// A missing file is not an error. Nested keys are overridden from the
    /// environment with `__`, e.g. `TINYSERVE_PERFORMANCE__QUEUE_DEPTH=32`;
    /// list keys take comma-separated values.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("prefixes")
                    .with_list_parse_key("endpoint_filter"),
            )
            .set_default("max_concurrency", 64)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.header_read_timeout", 30)?
            .set_default("performance.listen_backlog", 128)?
            .set_default("performance.queue_depth", 128)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", false)?
            .set_default("logging.access_log_format", "common")?
            .build()?;

        settings.try_deserialize()
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub fn with_endpoint_filter<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoint_filter = entries.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_performance(mut self, performance: PerformanceConfig) -> Self {
        self.performance = performance;
        self
    }

    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub const fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.header_read_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_new_uses_defaults() {
        let config = ServerConfig::new(["http://*:8080/"]);
        assert_eq!(config.prefixes, vec!["http://*:8080/".to_string()]);
        assert_eq!(config.max_concurrency, 64);
        assert!(config.endpoint_filter.is_empty());
        assert_eq!(config.performance, PerformanceConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.access_log);
        assert_eq!(config.header_read_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder_setters() {
        let config = ServerConfig::new(["http://localhost:9000/"])
            .with_max_concurrency(4)
            .with_endpoint_filter(["127.0.0.1"]);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.endpoint_filter, vec!["127.0.0.1".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
prefixes = ["http://*:8080/", "http://localhost:9090/media"]
max_concurrency = 8
endpoint_filter = ["127.0.0.1:8080"]

[performance]
queue_depth = 16

[logging]
access_log = true
"#
        )
        .unwrap();

        let config = ServerConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.prefixes.len(), 2);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.endpoint_filter, vec!["127.0.0.1:8080".to_string()]);
        assert_eq!(config.performance.queue_depth, 16);
        assert_eq!(config.performance.listen_backlog, 128);
        assert!(config.performance.keep_alive);
        assert!(config.logging.access_log);
        assert_eq!(config.logging.access_log_format, "common");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let config = ServerConfig::load_from(path.to_str().unwrap()).unwrap();
        assert!(config.prefixes.is_empty());
        assert_eq!(config.max_concurrency, 64);
        assert_eq!(config.performance.header_read_timeout, 30);
    }
}
