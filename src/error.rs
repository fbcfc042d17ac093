//! Error taxonomy for every bridge operation
//!
//! Raw runtime status codes never leave the crate: backends report
//! `BackendError` and the bridge normalizes it into `BridgeError`.

use serde::Serialize;
use std::fmt;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failure reported by a `ManagedRuntime` implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct BackendError {
    /// Runtime-specific status code
    pub code: i32,
    /// Human readable description
    pub message: String,
}

impl BackendError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors surfaced to native callers
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("runtime already initialized in this process")]
    AlreadyInitialized,

    #[error("runtime startup failed: {0}")]
    StartupFailed(String),

    #[error("runtime is not running")]
    RuntimeNotRunning,

    #[error("cannot shut down: {count} thread(s) still attached")]
    ActiveThreadsAttached { count: usize },

    #[error("failed to attach thread: {0}")]
    AttachFailed(String),

    #[error("environment handle is detached")]
    Detached,

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("member not found: {class}.{name} {signature}")]
    MemberNotFound {
        class: String,
        name: String,
        signature: String,
    },

    #[error("invalid type signature `{signature}`: {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("expected {expected} argument(s), got {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("member {member} cannot be used with {target}")]
    IncompatibleMember { member: String, target: String },

    #[error("object reference #{0} is released or owned by another thread")]
    InvalidReference(u64),

    #[error("failed to promote object reference #{0}")]
    PromotionFailed(u64),

    #[error("a managed exception is pending on this environment")]
    ExceptionPending,

    #[error("{0}")]
    Invocation(StructuredError),

    #[error("exception raised while materializing {during}")]
    NestedException { during: String },

    #[error("native code panicked: {0}")]
    NativePanic(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Runtime or thread setup; never retried automatically
    Setup,
    /// Class or member lookup; a later retry may succeed
    Resolution,
    /// Caller-side contract violation while converting values
    Marshaling,
    /// Exception raised inside the managed runtime
    Invocation,
    /// Reference lifetime violation
    Reference,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInitialized
            | Self::StartupFailed(_)
            | Self::RuntimeNotRunning
            | Self::ActiveThreadsAttached { .. }
            | Self::AttachFailed(_)
            | Self::Detached
            | Self::Config(_) => ErrorKind::Setup,
            Self::ClassNotFound(_) | Self::MemberNotFound { .. } | Self::InvalidSignature { .. } => {
                ErrorKind::Resolution
            }
            Self::TypeMismatch { .. } | Self::ArityMismatch { .. } | Self::IncompatibleMember { .. } => {
                ErrorKind::Marshaling
            }
            Self::Invocation(_) | Self::NestedException { .. } | Self::ExceptionPending | Self::NativePanic(_) => {
                ErrorKind::Invocation
            }
            Self::InvalidReference(_) | Self::PromotionFailed(_) => ErrorKind::Reference,
        }
    }

    /// Materialized managed exception, if this error carries one
    pub fn exception(&self) -> Option<&StructuredError> {
        match self {
            Self::Invocation(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn type_mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// One link in an exception's cause chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CauseEntry {
    pub class_name: String,
    pub message: Option<String>,
}

/// Managed exception converted into native form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredError {
    /// Binary name of the exception class, e.g. `java.lang.IllegalStateException`
    pub class_name: String,
    pub message: Option<String>,
    /// Causes, outermost first
    pub cause_chain: Vec<CauseEntry>,
}

impl StructuredError {
    /// Root cause (last link of the chain), or the exception itself
    pub fn root_cause(&self) -> CauseEntry {
        self.cause_chain.last().cloned().unwrap_or_else(|| CauseEntry {
            class_name: self.class_name.clone(),
            message: self.message.clone(),
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_link(f, &self.class_name, self.message.as_deref())?;
        for cause in &self.cause_chain {
            write!(f, "\ncaused by: ")?;
            write_link(f, &cause.class_name, cause.message.as_deref())?;
        }
        Ok(())
    }
}

fn write_link(f: &mut fmt::Formatter<'_>, class: &str, message: Option<&str>) -> fmt::Result {
    match message {
        Some(m) => write!(f, "{}: {}", class, m),
        None => write!(f, "{}", class),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StructuredError {
        StructuredError {
            class_name: "java.lang.IllegalStateException".into(),
            message: Some("outer".into()),
            cause_chain: vec![CauseEntry {
                class_name: "java.lang.ArithmeticException".into(),
                message: None,
            }],
        }
    }

    #[test]
    fn test_structured_error_display() {
        let text = sample().to_string();
        assert_eq!(
            text,
            "java.lang.IllegalStateException: outer\ncaused by: java.lang.ArithmeticException"
        );
    }

    #[test]
    fn test_root_cause() {
        assert_eq!(sample().root_cause().class_name, "java.lang.ArithmeticException");

        let bare = StructuredError {
            class_name: "X".into(),
            message: None,
            cause_chain: vec![],
        };
        assert_eq!(bare.root_cause().class_name, "X");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(BridgeError::RuntimeNotRunning.kind(), ErrorKind::Setup);
        assert_eq!(BridgeError::ClassNotFound("A".into()).kind(), ErrorKind::Resolution);
        assert_eq!(BridgeError::type_mismatch("int", "long").kind(), ErrorKind::Marshaling);
        assert_eq!(BridgeError::Invocation(sample()).kind(), ErrorKind::Invocation);
        assert_eq!(BridgeError::InvalidReference(3).kind(), ErrorKind::Reference);
    }

    #[test]
    fn test_json_report() {
        let json = sample().to_json();
        assert!(json.contains("\"class_name\":\"java.lang.IllegalStateException\""));
    }
}
