//! Native entry points called by the managed runtime
//!
//! Errors and panics must not unwind across the boundary. `entry` runs the
//! body in a local frame and turns a returned error, or a panic, into a
//! managed `java.lang.RuntimeException` that the caller observes once the
//! native method returns. `export` is the same for exported functions
//! generated by `jnat!`, using the process-wide runtime.

use crate::error::{BridgeError, BridgeResult};
use crate::exception::RUNTIME_EXCEPTION_CLASS;
use crate::logging::{error, warn};
use crate::runtime::{self, EnvironmentHandle, RuntimeHandle};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run the body of a native method
///
/// Returns `None` when the body failed or panicked; an exception is then
/// pending and the native method should return its type's zero value.
pub fn entry<T>(runtime: &RuntimeHandle, body: impl FnOnce(&EnvironmentHandle) -> BridgeResult<T>) -> Option<T> {
    let env = match runtime.current_env() {
        Ok(env) => env,
        Err(e) => {
            error!(error = %e, "native entry could not obtain an environment");
            return None;
        }
    };

    // The frame guard closes during unwinding, so locals are released either way
    match panic::catch_unwind(AssertUnwindSafe(|| env.with_frame(body))) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            raise(&env, &e);
            None
        }
        Err(payload) => {
            let err = BridgeError::NativePanic(panic_message(payload.as_ref()));
            error!(error = %err, "panic caught at native entry");
            raise(&env, &err);
            None
        }
    }
}

/// Body of a function exported to the runtime, run against the global runtime
///
/// Failures return `R::zero()` with an exception pending, as `entry` does.
pub fn export<R: NativeReturn>(body: impl FnOnce(&EnvironmentHandle) -> BridgeResult<R>) -> R {
    match runtime::global() {
        Ok(runtime) => entry(&runtime, body).unwrap_or_else(R::zero),
        Err(e) => {
            error!(error = %e, "exported function called without a running runtime");
            R::zero()
        }
    }
}

/// Value an exported function returns when its body failed
pub trait NativeReturn {
    fn zero() -> Self;
}

macro_rules! zero_return {
    ($($ty:ty => $zero:expr),* $(,)?) => {
        $(impl NativeReturn for $ty {
            #[inline]
            fn zero() -> Self {
                $zero
            }
        })*
    };
}

zero_return! {
    () => (),
    bool => false,
    i8 => 0,
    u8 => 0,
    i16 => 0,
    u16 => 0,
    i32 => 0,
    u32 => 0,
    i64 => 0,
    u64 => 0,
    f32 => 0.0,
    f64 => 0.0,
}

impl<T> NativeReturn for *mut T {
    #[inline]
    fn zero() -> Self {
        std::ptr::null_mut()
    }
}

impl<T> NativeReturn for *const T {
    #[inline]
    fn zero() -> Self {
        std::ptr::null()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn raise(env: &EnvironmentHandle, err: &BridgeError) {
    // The managed caller already has an exception to observe
    if env.has_pending_exception() {
        return;
    }

    if let Err(e) = env.throw_new(RUNTIME_EXCEPTION_CLASS, &err.to_string()) {
        warn!(error = %e, original = %err, "failed to raise exception in managed caller");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeOptions;
    use crate::scripted::fixture;

    #[test]
    fn test_error_raises_runtime_exception() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());

        let result: Option<()> = entry(&runtime, |env| env.resolve_class("demo.Missing").map(drop));
        assert_eq!(result, None);

        let env = runtime.current_env().unwrap();
        let error = env.materialize(env.check_exception().unwrap()).unwrap();
        assert_eq!(error.class_name, "java.lang.RuntimeException");
        assert_eq!(error.message.as_deref(), Some("class not found: demo/Missing"));
        env.detach();
    }

    #[test]
    fn test_panic_becomes_runtime_exception() {
        let (backend, runtime) = fixture(RuntimeOptions::default());

        let result: Option<i32> = entry(&runtime, |env| {
            let _scratch = env.new_text("scratch")?;
            panic!("index 7 out of range");
        });
        assert_eq!(result, None);

        let env = runtime.current_env().unwrap();
        assert_eq!(backend.thread_handle_counts().locals, 0);
        assert_eq!(env.reference_stats().frame_depth, 1);
        let error = env.materialize(env.check_exception().unwrap()).unwrap();
        assert_eq!(error.class_name, "java.lang.RuntimeException");
        assert_eq!(error.message.as_deref(), Some("native code panicked: index 7 out of range"));
        assert_eq!(backend.thread_handle_counts().locals, 0);

        // Still usable afterwards
        assert_eq!(entry(&runtime, |_| Ok(5)), Some(5));
        assert_eq!(backend.protocol_violations(), 0);
        env.detach();
    }

    #[test]
    fn test_panic_message_payloads() {
        let formatted = panic::catch_unwind(|| panic!("code {}", 3)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "code 3");

        let other = panic::catch_unwind(|| panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_zero_returns() {
        assert_eq!(i32::zero(), 0);
        assert!(!bool::zero());
        assert_eq!(f64::zero(), 0.0);
        assert!(<*mut u8>::zero().is_null());
        assert!(<*const u8>::zero().is_null());
    }
}
