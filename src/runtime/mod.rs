//! Runtime handle - process-wide lifecycle of the bridged runtime
//!
//! Design: one `RuntimeHandle` per hosted runtime, shared by all threads:
//! - lifecycle state machine (Uninitialized -> Running -> ShuttingDown -> Stopped)
//! - attach/shutdown gate so shutdown never races a new attachment
//! - owner of the shared descriptor cache and the global reference table

mod env;

#[cfg(test)]
mod tests;

pub use env::{current, AttachState, EnvironmentHandle};

use crate::backend::{AttachMode, ManagedRuntime};
use crate::config::RuntimeOptions;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{self, log_reference_leak, log_runtime_init, log_runtime_shutdown, warn, LogConfig};
use crate::refs::{GlobalTable, LeakReport};
use crate::resolve::{Resolver, ResolverStats};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// The process-wide runtime installed by `initialize`
static GLOBAL: OnceCell<RuntimeHandle> = OnceCell::new();

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::ShuttingDown,
            3 => Self::Stopped,
            _ => Self::Uninitialized,
        }
    }
}

/// Install the process-wide runtime
///
/// Only one call per process can succeed; a failed startup leaves the slot
/// empty so a later call may retry.
pub fn initialize(backend: Arc<dyn ManagedRuntime>, options: RuntimeOptions) -> BridgeResult<RuntimeHandle> {
    let mut fresh = false;
    let handle = GLOBAL.get_or_try_init(|| {
        fresh = true;
        RuntimeHandle::start(backend, options)
    })?;

    if !fresh {
        return Err(BridgeError::AlreadyInitialized);
    }
    Ok(handle.clone())
}

/// The process-wide runtime, if `initialize` succeeded
pub fn global() -> BridgeResult<RuntimeHandle> {
    GLOBAL.get().cloned().ok_or(BridgeError::RuntimeNotRunning)
}

/// Lifecycle of the process-wide runtime
pub fn global_state() -> LifecycleState {
    GLOBAL.get().map_or(LifecycleState::Uninitialized, RuntimeHandle::state)
}

/// Shared handle to a running bridge
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    id: u64,
    backend: Arc<dyn ManagedRuntime>,
    options: RuntimeOptions,
    state: AtomicU8,
    gate: RwLock<()>,
    attached: AtomicUsize,
    leaked_threads: AtomicUsize,
    globals: GlobalTable,
    resolver: Resolver,
}

impl RuntimeHandle {
    /// Start a bridge that is not registered as the process-wide runtime
    ///
    /// Used when several independent runtimes live in one process, as in tests.
    pub fn isolated(backend: Arc<dyn ManagedRuntime>, options: RuntimeOptions) -> BridgeResult<Self> {
        Self::start(backend, options)
    }

    fn start(backend: Arc<dyn ManagedRuntime>, options: RuntimeOptions) -> BridgeResult<Self> {
        if let Some(settings) = &options.log {
            logging::init_with_config(LogConfig::from_settings(settings));
        }

        backend
            .startup()
            .map_err(|e| BridgeError::StartupFailed(e.to_string()))?;

        log_runtime_init(backend.name());

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
                backend,
                options,
                state: AtomicU8::new(LifecycleState::Running as u8),
                gate: RwLock::new(()),
                attached: AtomicUsize::new(0),
                leaked_threads: AtomicUsize::new(0),
                globals: GlobalTable::new(),
                resolver: Resolver::new(),
            }),
        })
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    pub fn backend(&self) -> &dyn ManagedRuntime {
        &*self.inner.backend
    }

    /// Environment of the calling thread, attaching it on first use
    pub fn current_env(&self) -> BridgeResult<EnvironmentHandle> {
        current(self)
    }

    pub fn attached_threads(&self) -> usize {
        self.inner.attached.load(Ordering::Acquire)
    }

    /// Outstanding Global/Weak references and leaked threads
    pub fn leak_report(&self) -> LeakReport {
        let (live_globals, live_weaks) = self.inner.globals.counts();
        LeakReport {
            live_globals,
            live_weaks,
            leaked_threads: self.inner.leaked_threads.load(Ordering::Relaxed),
            attached_threads: self.attached_threads(),
        }
    }

    pub fn resolver_stats(&self) -> ResolverStats {
        self.inner.resolver.stats()
    }

    /// Stop the runtime; every thread must have detached first
    pub fn shutdown(&self) -> BridgeResult<()> {
        let inner = &self.inner;
        let _gate = inner.gate.write();

        if self.state() != LifecycleState::Running {
            return Err(BridgeError::RuntimeNotRunning);
        }

        let count = inner.attached.load(Ordering::Acquire);
        if count > 0 {
            return Err(BridgeError::ActiveThreadsAttached { count });
        }

        self.set_state(LifecycleState::ShuttingDown);

        // Descriptor references belong to the bridge; drop them on a scratch attachment
        let name = format!("{}-shutdown", inner.options.thread_name_prefix);
        match inner.backend.attach_current_thread(AttachMode::Daemon, &name) {
            Ok(env) => {
                inner.resolver.release_all(&*inner.backend, env);
                if let Err(e) = inner.backend.detach_current_thread(env) {
                    warn!(error = %e, "failed to detach shutdown thread");
                }
            }
            Err(e) => warn!(error = %e, "cannot attach for descriptor cleanup"),
        }

        if inner.options.report_leaks_on_shutdown {
            let report = self.leak_report();
            if report.has_leaks() {
                log_reference_leak(report.live_globals, report.live_weaks, report.leaked_threads);
            }
        }

        if let Err(e) = inner.backend.destroy() {
            warn!(error = %e, "runtime teardown reported an error");
        }

        self.set_state(LifecycleState::Stopped);
        log_runtime_shutdown(inner.backend.name());
        Ok(())
    }

    #[inline]
    pub(crate) fn ensure_running(&self) -> BridgeResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(BridgeError::RuntimeNotRunning)
        }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    fn set_state(&self, state: LifecycleState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }
}

impl RuntimeInner {
    #[inline]
    pub(crate) fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    #[inline]
    pub(crate) fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub(crate) fn record_thread_leak(&self) {
        self.leaked_threads.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("id", &self.id())
            .field("backend", &self.inner.backend.name())
            .field("state", &self.state())
            .field("attached", &self.attached_threads())
            .finish()
    }
}
