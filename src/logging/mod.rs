//! Logging infrastructure - structured tracing throughout the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels via `JNAT_LOG_*` or `RUST_LOG`
//! - Zero-cost when disabled
//! - Stable `event = "..."` fields for every bridge event
//! - Console (plain or JSON) and file output

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

/// Serializable logging section of `RuntimeOptions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: Option<String>,
    pub file: Option<String>,
    pub json: bool,
    pub spans: bool,
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // JNAT_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("JNAT_LOG_LEVEL") {
            config.level = parse_level(&level_str).unwrap_or(Level::INFO);
        }

        // JNAT_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("JNAT_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("JNAT_LOG_JSON").is_ok();
        config.show_spans = std::env::var("JNAT_LOG_SPANS").is_ok();

        config
    }

    /// Build from the options file section
    pub fn from_settings(settings: &LogSettings) -> Self {
        Self {
            level: settings
                .level
                .as_deref()
                .and_then(parse_level)
                .unwrap_or(Level::INFO),
            file_output: settings.file.is_some(),
            log_path: settings.file.clone(),
            json_format: settings.json,
            show_spans: settings.spans,
        }
    }

    /// Create high-performance config (minimal logging)
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Create debug config (verbose logging)
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("jnat.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

pub(crate) fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber; a subscriber installed by the
/// host application is left in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("jnat={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (json_layer, plain_layer) = if config.json_format {
            let layer = fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone());
            (Some(layer), None)
        } else {
            let layer = fmt::layer()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone())
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions));
            (None, Some(layer))
        };

        let file_layer = config
            .log_path
            .as_deref()
            .filter(|_| config.file_output)
            .map(|path| {
                let path = Path::new(path);
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file = path
                    .file_name()
                    .map(|f| f.to_os_string())
                    .unwrap_or_else(|| "jnat.log".into());
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(tracing_appender::rolling::never(dir, file))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .with(plain_layer)
            .with(file_layer)
            .try_init()
            .ok();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Bridge events
// ============================================================================

pub fn log_runtime_init(backend: &str) {
    info!(event = "runtime_init", backend, "managed runtime bridge starting");
}

pub fn log_runtime_shutdown(backend: &str) {
    info!(event = "runtime_shutdown", backend, "managed runtime bridge stopped");
}

pub fn log_thread_attach(thread: &str, daemon: bool) {
    debug!(event = "thread_attach", thread, daemon, "thread attached");
}

pub fn log_thread_detach(thread: &str) {
    debug!(event = "thread_detach", thread, "thread detached");
}

pub fn log_thread_leak(thread: &str) {
    warn!(
        event = "thread_leak",
        thread,
        "thread exited while attached; detaching"
    );
}

#[inline]
pub fn log_class_resolved(name: &str, cached: bool) {
    trace!(event = "class_resolved", class = name, cached, "class resolved");
}

#[inline]
pub fn log_member_resolved(class: &str, name: &str, signature: &str, cached: bool) {
    trace!(
        event = "member_resolved",
        class,
        member = name,
        signature,
        cached,
        "member resolved"
    );
}

pub fn log_resolution_failed(what: &str, name: &str) {
    debug!(event = "resolution_failed", kind = what, name, "resolution failed");
}

#[inline]
pub fn log_invocation(kind: &str, member: &str, args: usize) {
    trace!(event = "invoke", kind, member, args, "calling into runtime");
}

pub fn log_exception(class_name: &str, message: Option<&str>, causes: usize) {
    debug!(
        event = "exception_materialized",
        class = class_name,
        detail = message.unwrap_or(""),
        causes,
        "managed exception materialized"
    );
}

pub fn log_reference_leak(live_globals: usize, live_weaks: usize, leaked_threads: usize) {
    warn!(
        event = "reference_leak",
        live_globals,
        live_weaks,
        leaked_threads,
        "unreleased references at shutdown"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}
