//! Structured logging for hostmap
//!
//! Builds the global `tracing` subscriber from a [`LogConfig`]:
//!
//! - **Console**: JSON lines (default) or pretty human-readable output
//! - **Files**: JSON lines with daily, hourly or no rotation via `tracing-appender`
//! - **Filtering**: `RUST_LOG` when set, otherwise the configured level and per-target directives
//! - **Host context**: spans opened under a [`HostContextGuard`] carry the host they belong to
//!
//! # Quick Start
//!
//! ```ignore
//! use hostmap_logging::{HostmapSubscriberBuilder, LogConfig};
//!
//! // JSONL to console
//! HostmapSubscriberBuilder::new().init();
//!
//! // Pretty output while developing
//! let _guard = HostmapSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! Keep the returned guard alive while logging to a file; dropping it
//! flushes the background writer.

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{HostContextData, HostContextGuard};
pub use layers::{HostContextExtension, HostContextLayer};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid filter directive: {0}")]
    Filter(#[from] ParseError),

    #[error("Log file setup failed: {0}")]
    File(String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Builder for the hostmap logging subscriber
///
/// Console output is JSON lines unless the config asks for pretty output.
pub struct HostmapSubscriberBuilder {
    config: LogConfig,
}

impl HostmapSubscriberBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration this builder will install
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Build the filter: `RUST_LOG` if set, else the configured directives
    pub fn env_filter(&self) -> Result<EnvFilter, LogError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let mut filter = EnvFilter::try_new(&self.config.default_level)?;
        for directive in self.config.directives().into_iter().skip(1) {
            filter = filter.add_directive(directive.parse()?);
        }
        Ok(filter)
    }

    /// Install the subscriber globally
    ///
    /// Returns the file writer's guard when file output is configured.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LogError> {
        let filter = self.env_filter()?;

        let (file_layer, guard) = match &self.config.file {
            Some(file) => {
                let (writer, guard) = file_writer(file)?;
                (
                    Some(layers::jsonl_layer(writer, &self.config.jsonl)),
                    Some(guard),
                )
            }
            None => (None, None),
        };

        let console = &self.config.console;
        let pretty_console = (console.enabled && console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });
        let jsonl_console = (console.enabled && !console.pretty)
            .then(|| layers::jsonl_layer(std::io::stdout, &self.config.jsonl));

        Registry::default()
            .with(filter)
            .with(HostContextLayer::new())
            .with(pretty_console)
            .with(jsonl_console)
            .with(file_layer)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// Install the subscriber globally, reporting failures on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: logging not initialized: {e}");
                None
            }
        }
    }
}

impl Default for HostmapSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the non-blocking writer for file output
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogError> {
    fs::create_dir_all(&config.directory).map_err(|e| LogError::File(e.to_string()))?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(&path).map_err(|e| LogError::File(e.to_string()))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.clone())
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder
        .build(&config.directory)
        .map_err(|e| LogError::File(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    HostmapSubscriberBuilder::new().init()
}

/// Initialize logging for development (pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    HostmapSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for tests; repeated calls are harmless
pub fn init_testing() {
    let _ = HostmapSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
