//! Logging setup for gateway services
//!
//! Console and rolling-file layers on top of `tracing-subscriber`, each with
//! its own `EnvFilter`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or filter directive (`info`, `sparkplug_sync=debug,warn`)
    pub level: String,
    /// Enable console output
    pub console: bool,
    /// Log file path; rotated daily when set
    pub file: Option<String>,
    pub format: LogFormat,
    /// Enable ANSI colors in console output
    pub ansi: bool,
    /// Include span enter/exit events
    pub span_events: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: None,
            format: LogFormat::Pretty,
            ansi: true,
            span_events: false,
        }
    }
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::config(format!("Invalid log level: {}", e)))
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::FULL
    } else {
        FmtSpan::NONE
    }
}

fn console_layer<S>(config: &LogConfig) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let base = fmt::layer()
        .with_ansi(config.ansi)
        .with_target(true)
        .with_span_events(span_events(config.span_events));
    match config.format {
        LogFormat::Json => base
            .json()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => base
            .pretty()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

fn file_layer<S>(config: &LogConfig, writer: NonBlocking) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(span_events(config.span_events));
    match config.format {
        LogFormat::Json => base
            .json()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed(),
        // Pretty output is for terminals; files get the full single-line format
        LogFormat::Pretty => base.with_thread_ids(true).with_thread_names(true).boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// Initialize logging with the given configuration
///
/// Returns a guard that must be kept alive for file logging to work
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers = Vec::new();
    let mut guard = None;

    if config.console {
        layers.push(
            console_layer(config)
                .with_filter(env_filter(&config.level)?)
                .boxed(),
        );
    }

    if let Some(file_path) = &config.file {
        let path = Path::new(file_path);
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(directory)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sparkplug-bridge.log");
        let appender = tracing_appender::rolling::daily(directory, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        layers.push(
            file_layer(config, writer)
                .with_filter(env_filter(&config.level)?)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(guard)
}

/// Initialize logging for tests
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// A builder for constructing log configuration
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn console(mut self, enable: bool) -> Self {
        self.config.console = enable;
        self
    }

    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.config.file = Some(path.into());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn ansi(mut self, enable: bool) -> Self {
        self.config.ansi = enable;
        self
    }

    pub fn span_events(mut self, enable: bool) -> Self {
        self.config.span_events = enable;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}
