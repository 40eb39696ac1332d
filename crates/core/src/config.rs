use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::OutputEncoding;

/// Default time budget for a startup check, in seconds.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct TestbedConfig {
    pub images: ImagesConfig,
    pub startup: StartupConfig,
    pub output: OutputConfig,
    pub docker: DockerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    /// Populate the image cache from a single bulk listing. When disabled every
    /// refresh inspects the reference directly.
    pub bulk_listing: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StartupConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub encoding: OutputEncoding,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DockerConfig {
    /// Daemon address (`unix://`, `tcp://`, `http://`). Local defaults when unset.
    pub host: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { bulk_listing: true }
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
        }
    }
}

impl StartupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout_secs: 120,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,testbed=debug".into(),
            json: false,
        }
    }
}

impl TestbedConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name("testbed").required(false));

        if let Ok(path) = std::env::var("TESTBED_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }

        // Map TESTBED__IMAGES__BULK_LISTING=false to images.bulk_listing
        let s = builder
            .add_source(
                Environment::with_prefix("TESTBED")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults() {
        let config = TestbedConfig::default();
        assert!(config.images.bulk_listing);
        assert_eq!(config.startup.timeout(), Duration::from_secs(30));
        assert_eq!(config.output.encoding, OutputEncoding::Utf8);
        assert!(config.docker.host.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let toml = r#"
            [images]
            bulk_listing = false

            [output]
            encoding = "latin1"
        "#;

        let config: TestbedConfig = Config::builder()
            .add_source(Config::try_from(&TestbedConfig::default()).unwrap())
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(!config.images.bulk_listing);
        assert_eq!(config.output.encoding, OutputEncoding::Latin1);
        assert_eq!(config.startup.timeout_secs, DEFAULT_STARTUP_TIMEOUT_SECS);
        assert_eq!(config.logging.filter, "info,testbed=debug");
    }
}
