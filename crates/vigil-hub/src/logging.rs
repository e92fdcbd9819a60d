use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vigil_event::{Event, EventBuilder};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. If None, no file logging.
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub rotation: Rotation,

    /// Whether to output JSON format.
    #[serde(default)]
    pub json_format: bool,

    /// Whether to also output to console (stdout).
    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "vigil".into()
}

fn default_true() -> bool {
    true
}

impl LogConfig {
    /// Load from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, Event> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| {
                EventBuilder::wrap(err)
                    .message(format!("reading log config {} failed", path.display()))
                    .freeze()
            })?;
        toml::from_str(&content).map_err(|err| {
            EventBuilder::wrap(err)
                .message(format!("parsing log config {} failed", path.display()))
                .freeze()
        })
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: Rotation::default(),
            json_format: false,
            console_output: true,
        }
    }
}

/// Initialize the logging system. Should be called once at program startup.
/// Returns a guard that must be held alive for the duration of the program
/// (for the non-blocking file writer).
pub fn init_logging(config: &LogConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Boxed to unify layer types.
    let console_layer: Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> =
        if config.console_output {
            if config.json_format {
                Some(Box::new(fmt::layer().json()))
            } else {
                Some(Box::new(fmt::layer()))
            }
        } else {
            None
        };

    let (file_layer, guard): (
        Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>>,
        Option<tracing_appender::non_blocking::WorkerGuard>,
    ) = if let Some(ref log_dir) = config.log_dir {
        let rotation = match config.rotation {
            Rotation::Daily => rolling::Rotation::DAILY,
            Rotation::Never => rolling::Rotation::NEVER,
            Rotation::Hourly => rolling::Rotation::HOURLY,
        };

        let file_appender = rolling::RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(log_dir)
            .expect("failed to create rolling file appender");

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json_format {
            Box::new(fmt::layer().json().with_writer(non_blocking))
        } else {
            Box::new(fmt::layer().with_writer(non_blocking))
        };

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    registry.with(console_layer).with(file_layer).init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.file_prefix, "vigil");
        assert!(config.console_output);
        assert!(!config.json_format);
        assert!(config.log_dir.is_none());
        assert!(matches!(config.rotation, Rotation::Hourly));
    }

    #[test]
    fn test_rotation_parses_lowercase() {
        let config: LogConfig = serde_json::from_str(r#"{"rotation": "daily"}"#).unwrap();
        assert!(matches!(config.rotation, Rotation::Daily));
    }

    #[test]
    fn test_config_loads_from_toml_file() {
        let path = std::env::temp_dir().join(format!("vigil-log-config-{}.toml", std::process::id()));
        std::fs::write(&path, "level = \"debug\"\nrotation = \"never\"\n").unwrap();
        let config = LogConfig::from_toml_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.level, "debug");
        assert!(matches!(config.rotation, Rotation::Never));
    }
}
