//! Runtime options: defaults, TOML files and `JNAT_*` environment overrides

use crate::error::{BridgeError, BridgeResult};
use crate::logging::LogSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Attach new threads as daemons
    pub attach_as_daemon: bool,

    /// Prefix for names given to threads attached by the bridge
    pub thread_name_prefix: String,

    /// Verify receiver compatibility before instance calls and field access
    pub check_receivers: bool,

    /// Longest cause chain materialized for one exception
    pub max_cause_depth: usize,

    /// Log unreleased references and leaked threads at shutdown
    pub report_leaks_on_shutdown: bool,

    /// Install a subscriber with these settings at startup
    pub log: Option<LogSettings>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            attach_as_daemon: false,
            thread_name_prefix: "jnat".to_string(),
            check_receivers: true,
            max_cause_depth: 16,
            report_leaks_on_shutdown: true,
            log: None,
        }
    }
}

impl RuntimeOptions {
    pub fn from_toml_str(source: &str) -> BridgeResult<Self> {
        let options: Self = toml::from_str(source).map_err(|e| BridgeError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Apply `JNAT_ATTACH_DAEMON`, `JNAT_THREAD_PREFIX`, `JNAT_CHECK_RECEIVERS`
    /// and `JNAT_MAX_CAUSE_DEPTH`
    pub fn with_env_overrides(self) -> BridgeResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> BridgeResult<Self> {
        if let Some(v) = lookup("JNAT_ATTACH_DAEMON") {
            self.attach_as_daemon = parse_flag("JNAT_ATTACH_DAEMON", &v)?;
        }
        if let Some(v) = lookup("JNAT_THREAD_PREFIX") {
            self.thread_name_prefix = v;
        }
        if let Some(v) = lookup("JNAT_CHECK_RECEIVERS") {
            self.check_receivers = parse_flag("JNAT_CHECK_RECEIVERS", &v)?;
        }
        if let Some(v) = lookup("JNAT_MAX_CAUSE_DEPTH") {
            self.max_cause_depth = v
                .trim()
                .parse()
                .map_err(|_| BridgeError::Config(format!("JNAT_MAX_CAUSE_DEPTH: invalid number `{}`", v)))?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.max_cause_depth == 0 {
            return Err(BridgeError::Config("max_cause_depth must be at least 1".into()));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(BridgeError::Config("thread_name_prefix contains NUL".into()));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> BridgeResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BridgeError::Config(format!("{}: invalid flag `{}`", key, value))),
    }
}
