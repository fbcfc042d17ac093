//! Managed-runtime capability set
//!
//! Design: the bridge never reimplements lookup, invocation or reference
//! bookkeeping. It only sequences calls to a `ManagedRuntime`:
//! - `types.rs` - opaque handles and the on-the-wire value model
//! - this file  - the capability trait itself
//!
//! Every method that can raise inside the runtime leaves the exception
//! pending; callers must query `exception_check` before issuing anything else.

mod types;

pub use types::{AttachMode, CallTarget, RawEnv, RawField, RawMethod, RawObject, WireType, WireValue};

use crate::error::BackendError;

/// Operations offered by the hosting managed runtime
pub trait ManagedRuntime: Send + Sync {
    /// Short backend name for diagnostics
    fn name(&self) -> &str {
        "managed-runtime"
    }

    /// Probe the runtime before the bridge starts using it
    fn startup(&self) -> Result<(), BackendError> {
        Ok(())
    }

    // ========================================================================
    // Threads and lifecycle
    // ========================================================================

    /// Attach the calling thread; returns the existing environment if already attached
    fn attach_current_thread(&self, mode: AttachMode, thread_name: &str) -> Result<RawEnv, BackendError>;

    /// Environment of a calling thread the runtime attached on its own, such
    /// as one it started; the bridge borrows it and never detaches it
    fn borrowed_env(&self) -> Option<RawEnv> {
        None
    }

    /// Detach the calling thread
    fn detach_current_thread(&self, env: RawEnv) -> Result<(), BackendError>;

    /// Tear the runtime down; no environment is valid afterwards
    fn destroy(&self) -> Result<(), BackendError>;

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Find a class by slashed name; returns a local reference
    fn find_class(&self, env: RawEnv, name: &str) -> Option<RawObject>;

    fn method_id(
        &self,
        env: RawEnv,
        class: RawObject,
        name: &str,
        signature: &str,
        is_static: bool,
    ) -> Option<RawMethod>;

    fn field_id(
        &self,
        env: RawEnv,
        class: RawObject,
        name: &str,
        signature: &str,
        is_static: bool,
    ) -> Option<RawField>;

    /// Class of an object; returns a local reference
    fn object_class(&self, env: RawEnv, object: RawObject) -> Option<RawObject>;

    fn is_instance_of(&self, env: RawEnv, object: RawObject, class: RawObject) -> bool;

    // ========================================================================
    // Invocation and field access
    // ========================================================================

    /// Invoke a method; object results are new local references
    fn call_method(
        &self,
        env: RawEnv,
        target: CallTarget,
        method: RawMethod,
        ret: WireType,
        args: &[WireValue],
    ) -> WireValue;

    fn new_object(&self, env: RawEnv, class: RawObject, constructor: RawMethod, args: &[WireValue]) -> Option<RawObject>;

    fn get_field(&self, env: RawEnv, target: CallTarget, field: RawField, ty: WireType) -> WireValue;

    fn set_field(&self, env: RawEnv, target: CallTarget, field: RawField, value: WireValue);

    // ========================================================================
    // Exceptions
    // ========================================================================

    fn exception_check(&self, env: RawEnv) -> bool;

    /// Pending throwable as a new local reference
    fn exception_occurred(&self, env: RawEnv) -> Option<RawObject>;

    fn exception_clear(&self, env: RawEnv);

    fn throw_new(&self, env: RawEnv, class: RawObject, message: &str) -> Result<(), BackendError>;

    // ========================================================================
    // References
    // ========================================================================

    fn new_local_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject>;

    fn delete_local_ref(&self, env: RawEnv, object: RawObject);

    fn new_global_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject>;

    fn delete_global_ref(&self, env: RawEnv, object: RawObject);

    fn new_weak_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject>;

    fn delete_weak_ref(&self, env: RawEnv, object: RawObject);

    /// Identity comparison; `None` stands for null
    fn is_same_object(&self, env: RawEnv, a: Option<RawObject>, b: Option<RawObject>) -> bool;

    // ========================================================================
    // Strings (UTF-16 code units)
    // ========================================================================

    fn new_string(&self, env: RawEnv, units: &[u16]) -> Option<RawObject>;

    fn string_units(&self, env: RawEnv, string: RawObject) -> Option<Vec<u16>>;

    // ========================================================================
    // Arrays
    // ========================================================================

    fn array_length(&self, env: RawEnv, array: RawObject) -> Option<i32>;

    fn new_array(&self, env: RawEnv, element: WireType, len: i32) -> Option<RawObject>;

    fn new_object_array(
        &self,
        env: RawEnv,
        len: i32,
        element_class: RawObject,
        init: Option<RawObject>,
    ) -> Option<RawObject>;

    fn get_array_region(
        &self,
        env: RawEnv,
        array: RawObject,
        element: WireType,
        start: i32,
        len: i32,
    ) -> Option<Vec<WireValue>>;

    fn set_array_region(&self, env: RawEnv, array: RawObject, start: i32, values: &[WireValue]);

    /// Element as a new local reference; `None` for null or on exception
    fn get_object_array_element(&self, env: RawEnv, array: RawObject, index: i32) -> Option<RawObject>;

    fn set_object_array_element(&self, env: RawEnv, array: RawObject, index: i32, value: Option<RawObject>);
}
