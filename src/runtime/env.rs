//! Per-thread environment handles
//!
//! Design: an `EnvironmentHandle` is `!Send` (it wraps an `Rc`), so the
//! compiler keeps it on the thread that attached. A thread-local registry
//! hands the same handle back on repeated `current` calls and detaches
//! threads that exit while still attached. Threads the runtime attached on
//! its own are borrowed: never counted, never detached by the bridge.

use super::RuntimeHandle;
use crate::backend::{AttachMode, ManagedRuntime, RawEnv};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{debug, log_thread_attach, log_thread_detach, log_thread_leak, warn};
use crate::refs::LocalTable;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    AttachedNative,
    AttachedAsDaemon,
    /// Attached by the runtime itself; detaching only drops the handle
    Borrowed,
}

thread_local! {
    static ATTACHED: RefCell<ThreadAttachments> = RefCell::new(ThreadAttachments::default());
}

/// Environments attached by this thread, one per runtime
#[derive(Default)]
struct ThreadAttachments {
    envs: Vec<EnvironmentHandle>,
}

impl Drop for ThreadAttachments {
    fn drop(&mut self) {
        for env in self.envs.drain(..) {
            if env.state() == AttachState::Borrowed {
                env.release_attachment();
            } else if env.is_attached() {
                env.inner.runtime.inner().record_thread_leak();
                log_thread_leak(&env.inner.thread_name);
                env.release_attachment();
            }
        }
    }
}

/// Environment of the calling thread, attaching it on first use
pub fn current(runtime: &RuntimeHandle) -> BridgeResult<EnvironmentHandle> {
    runtime.ensure_running()?;

    let existing = ATTACHED
        .try_with(|attached| {
            attached
                .borrow()
                .envs
                .iter()
                .find(|env| env.inner.runtime.id() == runtime.id() && env.is_attached())
                .cloned()
        })
        .map_err(|_| BridgeError::AttachFailed("thread is exiting".into()))?;

    match existing {
        Some(env) => Ok(env),
        None => EnvironmentHandle::attach(runtime),
    }
}

/// Capability to talk to the runtime from one attached thread
#[derive(Clone)]
pub struct EnvironmentHandle {
    inner: Rc<EnvInner>,
}

struct EnvInner {
    runtime: RuntimeHandle,
    raw: RawEnv,
    thread: ThreadId,
    thread_name: String,
    state: Cell<AttachState>,
    locals: LocalTable,
}

impl EnvironmentHandle {
    fn attach(runtime: &RuntimeHandle) -> BridgeResult<Self> {
        let shared = runtime.inner();
        let _gate = shared.gate.read();
        runtime.ensure_running()?;

        let options = runtime.options();
        let (mode, state) = if options.attach_as_daemon {
            (AttachMode::Daemon, AttachState::AttachedAsDaemon)
        } else {
            (AttachMode::Native, AttachState::AttachedNative)
        };

        let current = thread::current();
        let thread_name = match current.name() {
            Some(name) => format!("{}-{}", options.thread_name_prefix, name),
            None => format!("{}-{:?}", options.thread_name_prefix, current.id()),
        };

        let backend = runtime.backend();
        let (raw, state) = match backend.borrowed_env() {
            Some(raw) => (raw, AttachState::Borrowed),
            None => {
                let raw = backend
                    .attach_current_thread(mode, &thread_name)
                    .map_err(|e| BridgeError::AttachFailed(e.to_string()))?;
                shared.attached.fetch_add(1, Ordering::AcqRel);
                (raw, state)
            }
        };

        let env = Self {
            inner: Rc::new(EnvInner {
                runtime: runtime.clone(),
                raw,
                thread: current.id(),
                thread_name,
                state: Cell::new(state),
                locals: LocalTable::new(),
            }),
        };

        let registered = ATTACHED.try_with(|attached| attached.borrow_mut().envs.push(env.clone()));
        if registered.is_err() {
            env.release_attachment();
            return Err(BridgeError::AttachFailed("thread is exiting".into()));
        }

        log_thread_attach(&env.inner.thread_name, options.attach_as_daemon);
        Ok(env)
    }

    /// Release every local reference and detach the thread
    ///
    /// Detaching twice is a no-op.
    pub fn detach(&self) {
        if !self.is_attached() {
            return;
        }
        self.release_attachment();

        let _ = ATTACHED.try_with(|attached| {
            if let Ok(mut attached) = attached.try_borrow_mut() {
                attached.envs.retain(|env| !Rc::ptr_eq(&env.inner, &self.inner));
            }
        });
    }

    fn release_attachment(&self) {
        if !self.is_attached() {
            return;
        }

        self.release_all_locals();

        if self.state() == AttachState::Borrowed {
            self.inner.state.set(AttachState::Detached);
            debug!(thread = %self.inner.thread_name, "borrowed environment released");
            return;
        }

        if let Err(e) = self.backend().detach_current_thread(self.inner.raw) {
            warn!(thread = %self.inner.thread_name, error = %e, "detach reported an error");
        }

        self.inner.state.set(AttachState::Detached);
        self.inner.runtime.inner().attached.fetch_sub(1, Ordering::AcqRel);
        log_thread_detach(&self.inner.thread_name);
    }

    #[inline]
    pub fn state(&self) -> AttachState {
        self.inner.state.get()
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.state() != AttachState::Detached
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.inner.runtime
    }

    pub fn thread_name(&self) -> &str {
        &self.inner.thread_name
    }

    /// Raw environment pointer, for handing to runtime-specific code
    #[inline]
    pub fn raw(&self) -> RawEnv {
        self.inner.raw
    }

    #[inline]
    pub(crate) fn backend(&self) -> &dyn ManagedRuntime {
        self.inner.runtime.backend()
    }

    #[inline]
    pub(crate) fn locals(&self) -> &LocalTable {
        &self.inner.locals
    }

    /// Fails unless the handle is attached and the runtime is running
    pub(crate) fn ensure_usable(&self) -> BridgeResult<()> {
        if !self.is_attached() {
            return Err(BridgeError::Detached);
        }
        debug_assert_eq!(self.inner.thread, thread::current().id());
        self.inner.runtime.ensure_running()
    }

    /// Fails if an exception is already pending on this environment
    pub(crate) fn ensure_clear(&self) -> BridgeResult<()> {
        if self.backend().exception_check(self.inner.raw) {
            Err(BridgeError::ExceptionPending)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("thread", &self.inner.thread_name)
            .field("state", &self.state())
            .finish()
    }
}
