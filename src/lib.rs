//! jnat - native-side bridge into a managed (JVM-style) runtime
//!
//! Native code resolves classes and members by name and signature, invokes
//! them with marshaled values, moves object references between the local,
//! global and weak scopes, and turns managed exceptions into structured
//! errors. Every operation goes through an `EnvironmentHandle` bound to the
//! calling thread; the handle sequences calls to a `ManagedRuntime` backend.

// Core modules
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod exception;
pub mod logging;
pub mod marshal;
pub mod refs;
pub mod resolve;
pub mod runtime;
pub mod signature;

// Backends
#[cfg(any(test, feature = "scripted"))]
pub mod scripted;
#[cfg(feature = "jvm")]
pub mod jvm;

mod array;

// Re-export commonly used items
pub use backend::ManagedRuntime;
pub use config::RuntimeOptions;
pub use dispatch::{FieldTarget, Operation};
pub use entry::{entry, export, NativeReturn};
pub use jnat_macros::jnat;
pub use error::{BackendError, BridgeError, BridgeResult, CauseEntry, ErrorKind, StructuredError};
pub use exception::PendingException;
pub use marshal::Value;
pub use refs::{FrameGuard, LeakReport, ObjectReference, RefScope, RefStats};
pub use resolve::{ClassDescriptor, MemberIdentifier, MemberKind, ResolverStats};
pub use runtime::{current, global, initialize, AttachState, EnvironmentHandle, LifecycleState, RuntimeHandle};
pub use signature::{JavaType, MethodSignature};
