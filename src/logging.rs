//! Logging System
//!
//! Structured logging built on the `tracing` crate. The protocol modules
//! emit `debug!`/`info!`/`warn!` records; this module wires them to a
//! configurable destination for embedders that do not install their own
//! subscriber.

use crate::error::VerifyError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is enabled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stderr, stdout, file, file+stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output includes file; None means use runtime default
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format, stdout/stderr only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
        }
    }
}

/// Resolve the log file path with precedence: explicit path, PARLEY_LOG_FILE
/// env, config file, platform state directory default.
pub fn resolve_log_file_path(
    explicit: Option<PathBuf>,
    config_file: Option<PathBuf>,
) -> Result<PathBuf, VerifyError> {
    if let Some(p) = explicit {
        if !p.as_os_str().is_empty() {
            return Ok(p);
        }
    }
    if let Ok(env_path) = std::env::var("PARLEY_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(p) = config_file {
        if !p.as_os_str().is_empty() {
            return Ok(p);
        }
    }
    let project_dirs = directories::ProjectDirs::from("", "parley", "parley").ok_or_else(|| {
        VerifyError::ConfigError("could not determine platform state directory".to_string())
    })?;
    let state_dir = project_dirs
        .state_dir()
        .ok_or_else(|| {
            VerifyError::ConfigError("platform state directory not available".to_string())
        })?
        .to_path_buf();
    Ok(state_dir.join("parley.log"))
}

/// Initialize the logging system.
///
/// The PARLEY_LOG environment variable overrides the configured filter
/// when set (standard EnvFilter syntax).
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), VerifyError> {
    let disabled = config.map(|c| !c.enabled).unwrap_or(false);
    if disabled {
        Registry::default()
            .with(EnvFilter::new("off"))
            .with(fmt::layer().with_writer(std::io::sink))
            .init();
        return Ok(());
    }

    let filter = build_env_filter(config)?;
    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(VerifyError::ConfigError(format!(
            "invalid log format: {format} (must be 'json' or 'text')"
        )));
    }
    let output = config.map(|c| c.output.as_str()).unwrap_or("stderr");
    let use_color = config.map(|c| c.color).unwrap_or(true);

    let open_log_file = || -> Result<std::fs::File, VerifyError> {
        let path = resolve_log_file_path(None, config.and_then(|c| c.file.clone()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VerifyError::ConfigError(format!("failed to create log directory: {e}"))
            })?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| VerifyError::ConfigError(format!("failed to open log file {path:?}: {e}")))
    };

    let base = Registry::default().with(filter);
    let json = format == "json";

    macro_rules! init_with_writer {
        ($writer:expr, $ansi:expr) => {{
            if json {
                base.with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_writer($writer),
                )
                .init();
            } else {
                base.with(
                    fmt::layer()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_ansi($ansi)
                        .with_writer($writer),
                )
                .init();
            }
        }};
    }

    match output {
        "stdout" => init_with_writer!(std::io::stdout, use_color),
        "stderr" => init_with_writer!(std::io::stderr, use_color),
        "file" => init_with_writer!(open_log_file()?, false),
        "file+stderr" => init_with_writer!(open_log_file()?.and(std::io::stderr), false),
        other => {
            return Err(VerifyError::ConfigError(format!(
                "invalid log output: {other} (must be stdout, stderr, file or file+stderr)"
            )))
        }
    }

    Ok(())
}

/// Build the environment filter from config, deferring to PARLEY_LOG.
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, VerifyError> {
    if let Ok(filter) = EnvFilter::try_from_env("PARLEY_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    EnvFilter::try_new(level)
        .map_err(|e| VerifyError::ConfigError(format!("invalid log level '{level}': {e}")))
}
