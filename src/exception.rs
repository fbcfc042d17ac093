//! Pending managed exceptions and their conversion into `StructuredError`
//!
//! Materializing an exception runs more managed code (`getClass().getName()`,
//! `getMessage()`, `getCause()`). Those calls use the `Nested` policy so a
//! failure while describing an exception never recurses into another
//! materialization.

use crate::dispatch::{OnException, Operation};
use crate::error::{BridgeError, BridgeResult, CauseEntry, StructuredError};
use crate::logging::log_exception;
use crate::marshal::Value;
use crate::refs::{ObjectReference, RefScope};
use crate::runtime::EnvironmentHandle;

pub const THROWABLE_CLASS: &str = "java/lang/Throwable";
pub const RUNTIME_EXCEPTION_CLASS: &str = "java/lang/RuntimeException";

/// A throwable raised inside the runtime and not yet cleared
#[derive(Debug)]
pub struct PendingException {
    throwable: ObjectReference,
}

impl PendingException {
    pub fn throwable(&self) -> &ObjectReference {
        &self.throwable
    }
}

impl EnvironmentHandle {
    /// Pending exception on this thread, if any; does not clear it
    pub fn check_exception(&self) -> Option<PendingException> {
        if self.ensure_usable().is_err() {
            return None;
        }
        let backend = self.backend();
        if !backend.exception_check(self.raw()) {
            return None;
        }
        let raw = backend.exception_occurred(self.raw())?;
        Some(PendingException {
            throwable: self.track(raw, RefScope::Local),
        })
    }

    #[inline]
    pub fn has_pending_exception(&self) -> bool {
        self.is_attached() && self.backend().exception_check(self.raw())
    }

    /// Clear the pending exception, if any
    pub fn clear_exception(&self) {
        if self.is_attached() {
            self.backend().exception_clear(self.raw());
        }
    }

    /// Clear `pending` and describe it with its cause chain
    pub fn materialize(&self, pending: PendingException) -> BridgeResult<StructuredError> {
        self.clear_exception();
        let result = self.with_frame(|env| env.describe_chain(&pending.throwable));
        self.release(&pending.throwable);

        let mut links = result?.into_iter();
        let Some(top) = links.next() else {
            return Err(BridgeError::NestedException {
                during: "exception description".into(),
            });
        };

        let error = StructuredError {
            class_name: top.class_name,
            message: top.message,
            cause_chain: links.collect(),
        };
        log_exception(&error.class_name, error.message.as_deref(), error.cause_chain.len());
        Ok(error)
    }

    /// Turn the exception pending on this thread into an error
    pub(crate) fn materialize_pending(&self) -> BridgeError {
        match self.check_exception() {
            Some(pending) => match self.materialize(pending) {
                Ok(error) => BridgeError::Invocation(error),
                Err(e) => e,
            },
            None => {
                self.clear_exception();
                BridgeError::NestedException {
                    during: "exception lookup".into(),
                }
            }
        }
    }

    /// Raise a new exception of `class_name` on this thread
    ///
    /// The exception is left pending for the managed caller to observe.
    pub fn throw_new(&self, class_name: &str, message: &str) -> BridgeResult<()> {
        let class = self.resolve_class(class_name)?;
        self.backend()
            .throw_new(self.raw(), class.raw(), message)
            .map_err(|_| BridgeError::MemberNotFound {
                class: class.name().to_string(),
                name: "<init>".into(),
                signature: "(Ljava/lang/String;)V".into(),
            })
    }

    fn describe_chain(&self, throwable: &ObjectReference) -> BridgeResult<Vec<CauseEntry>> {
        let limit = self.runtime().options().max_cause_depth;
        let class = self.resolve_class(THROWABLE_CLASS)?;
        let get_message = self.resolve_method(&class, "getMessage", "()Ljava/lang/String;", false)?;
        let get_cause = self.resolve_method(&class, "getCause", "()Ljava/lang/Throwable;", false)?;

        let mut links = Vec::new();
        let mut seen = vec![*throwable];
        let mut current = *throwable;
        while links.len() < limit {
            let raw = self.raw_object(&current)?;
            let class_name = self.runtime_class_name(raw, OnException::Nested("exception class name"))?;

            let message = match self.execute_with(
                Operation::CallInstance {
                    receiver: &current,
                    method: &get_message,
                },
                &[],
                OnException::Nested("exception message"),
            )? {
                Value::Text(text) => Some(text),
                _ => None,
            };
            links.push(CauseEntry { class_name, message });

            let cause = self.execute_with(
                Operation::CallInstance {
                    receiver: &current,
                    method: &get_cause,
                },
                &[],
                OnException::Nested("exception cause"),
            )?;
            let Value::Object(next) = cause else {
                break;
            };
            if self.seen_before(&next, &seen)? {
                break;
            }
            seen.push(next);
            current = next;
        }
        Ok(links)
    }

    /// Whether `object` is one of the links already described (cyclic causes)
    fn seen_before(&self, object: &ObjectReference, seen: &[ObjectReference]) -> BridgeResult<bool> {
        for earlier in seen {
            if self.is_same_object(object, earlier)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
