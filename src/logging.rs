//! Logging Module
//!
//! Sets up application logging with `tracing`: a compact console layer and,
//! when a log directory is configured, a daily rolling file layer.

use crate::config::LoggingConfig;
use crate::{Result, TapeGcError};
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix of the rolling log files
const LOG_FILE_NAME: &str = "tape-gc.log";

/// Logger manager for the collector's application logs
pub struct LoggerManager {
    pub config: LoggingConfig,
}

impl LoggerManager {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Initialize the logging system.
    ///
    /// `RUST_LOG` overrides the configured level. Calling this when a global
    /// subscriber is already installed is not an error.
    pub fn initialize(&self) -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.config.log_level))
            .map_err(|e| {
                TapeGcError::ConfigError(format!(
                    "Invalid log level '{}': {}",
                    self.config.log_level, e
                ))
            })?;

        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false)
            .with_level(true)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
            .compact();

        let file_layer = match &self.config.log_dir {
            Some(log_dir) => {
                std::fs::create_dir_all(log_dir).map_err(|e| {
                    TapeGcError::IoError(format!(
                        "Failed to create log directory {}: {}",
                        log_dir.display(),
                        e
                    ))
                })?;
                let file_appender =
                    RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file_appender)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_names(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                        .compact(),
                )
            }
            None => None,
        };

        let result = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();

        match result {
            Ok(()) => {
                info!(
                    "Tape GC logging initialized (version {}, built {})",
                    env!("BUILD_VERSION"),
                    env!("BUILD_TIMESTAMP")
                );
                if let Some(log_dir) = &self.config.log_dir {
                    info!("Application logs will be written to: {:?}", log_dir);
                }
            }
            Err(_) => {
                // Already initialized, likely in tests - this is fine
                debug!("Tracing subscriber already initialized, skipping");
            }
        }

        Ok(())
    }
}
