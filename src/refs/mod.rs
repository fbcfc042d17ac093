//! Object references with explicit scopes
//!
//! Design: native code never holds raw runtime handles. It holds an
//! `ObjectReference`, a plain id looked up in one of two tables:
//! - `LocalTable`  - per environment, organized in frames; popped frames
//!   release their locals, so loops cannot exhaust the local capacity
//! - `GlobalTable` - per runtime, shared by all threads (Global and Weak)
//!
//! A released or foreign id resolves to `InvalidReference` instead of
//! touching a dangling handle.

#[cfg(test)]
mod tests;

use crate::backend::RawObject;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{debug, trace};
use crate::runtime::EnvironmentHandle;
use dashmap::DashMap;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifetime class of an object reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefScope {
    /// Valid on the creating thread until its frame is popped
    Local,
    /// Valid on any thread until released
    Global,
    /// Does not keep the object alive; upgrade before use
    Weak,
}

/// Opaque, copyable name for a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    id: u64,
    scope: RefScope,
}

impl ObjectReference {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn scope(&self) -> RefScope {
        self.scope
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.scope == RefScope::Local
    }
}

/// Local reference accounting for one environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefStats {
    pub created_locals: u64,
    pub released_locals: u64,
    pub live_locals: usize,
    /// Open frames, including the base frame
    pub frame_depth: usize,
}

/// Runtime-wide leak diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeakReport {
    pub live_globals: usize,
    pub live_weaks: usize,
    pub leaked_threads: usize,
    pub attached_threads: usize,
}

impl LeakReport {
    pub fn has_leaks(&self) -> bool {
        self.live_globals > 0 || self.live_weaks > 0 || self.leaked_threads > 0
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================================================
// Tables
// ============================================================================

pub(crate) struct LocalTable {
    state: RefCell<LocalState>,
}

struct LocalState {
    live: HashMap<u64, RawObject>,
    frames: Vec<Vec<u64>>,
    created: u64,
    released: u64,
}

impl LocalTable {
    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(LocalState {
                live: HashMap::new(),
                frames: vec![Vec::new()],
                created: 0,
                released: 0,
            }),
        }
    }

    fn insert(&self, id: u64, raw: RawObject) {
        let mut state = self.state.borrow_mut();
        state.live.insert(id, raw);
        match state.frames.last_mut() {
            Some(frame) => frame.push(id),
            None => state.frames.push(vec![id]),
        }
        state.created += 1;
    }

    fn get(&self, id: u64) -> Option<RawObject> {
        self.state.borrow().live.get(&id).copied()
    }

    fn remove(&self, id: u64) -> Option<RawObject> {
        let mut state = self.state.borrow_mut();
        let raw = state.live.remove(&id)?;
        state.released += 1;
        Some(raw)
    }

    fn push_frame(&self) -> usize {
        let mut state = self.state.borrow_mut();
        state.frames.push(Vec::new());
        state.frames.len()
    }

    /// Close every frame at or above `depth`; returns their ids, newest first
    fn close_frames(&self, depth: usize) -> Vec<u64> {
        let mut state = self.state.borrow_mut();
        let mut ids = Vec::new();
        while state.frames.len() >= depth.max(1) {
            match state.frames.pop() {
                Some(frame) => ids.extend(frame.into_iter().rev()),
                None => break,
            }
        }
        if state.frames.is_empty() {
            state.frames.push(Vec::new());
        }
        ids
    }

    fn stats(&self) -> RefStats {
        let state = self.state.borrow();
        RefStats {
            created_locals: state.created,
            released_locals: state.released,
            live_locals: state.live.len(),
            frame_depth: state.frames.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GlobalEntry {
    raw: RawObject,
    scope: RefScope,
}

#[derive(Default)]
pub(crate) struct GlobalTable {
    entries: DashMap<u64, GlobalEntry>,
}

impl GlobalTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn insert(&self, id: u64, raw: RawObject, scope: RefScope) {
        self.entries.insert(id, GlobalEntry { raw, scope });
    }

    fn get(&self, id: u64) -> Option<RawObject> {
        self.entries.get(&id).map(|e| e.raw)
    }

    fn remove(&self, id: u64) -> Option<GlobalEntry> {
        self.entries.remove(&id).map(|(_, e)| e)
    }

    /// (globals, weaks) still registered
    pub(crate) fn counts(&self) -> (usize, usize) {
        self.entries.iter().fold((0, 0), |(g, w), e| match e.scope {
            RefScope::Weak => (g, w + 1),
            _ => (g + 1, w),
        })
    }
}

// ============================================================================
// Environment operations
// ============================================================================

/// Closes a local frame on drop
#[must_use = "the frame closes when the guard is dropped"]
pub struct FrameGuard<'a> {
    env: &'a EnvironmentHandle,
    depth: usize,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.env.close_frames(self.depth);
    }
}

impl EnvironmentHandle {
    /// Register a raw handle the backend just produced
    pub(crate) fn track(&self, raw: RawObject, scope: RefScope) -> ObjectReference {
        let id = NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed);
        match scope {
            RefScope::Local => self.locals().insert(id, raw),
            RefScope::Global | RefScope::Weak => self.runtime().inner().globals().insert(id, raw, scope),
        }
        ObjectReference { id, scope }
    }

    /// Raw handle behind a reference
    pub fn raw_object(&self, reference: &ObjectReference) -> BridgeResult<RawObject> {
        let raw = match reference.scope {
            RefScope::Local => self.locals().get(reference.id),
            RefScope::Global | RefScope::Weak => self.runtime().inner().globals().get(reference.id),
        };
        raw.ok_or(BridgeError::InvalidReference(reference.id))
    }

    /// Adopt a raw local handle received from the runtime, e.g. a native method argument
    pub fn adopt_local(&self, raw: RawObject) -> BridgeResult<ObjectReference> {
        self.ensure_usable()?;
        Ok(self.track(raw, RefScope::Local))
    }

    /// Global reference to the same object, usable from any thread
    pub fn promote(&self, reference: &ObjectReference) -> BridgeResult<ObjectReference> {
        self.ensure_usable()?;
        let raw = self.raw_object(reference)?;
        let backend = self.backend();

        match backend.new_global_ref(self.raw(), raw) {
            Some(global) => Ok(self.track(global, RefScope::Global)),
            None => {
                if backend.exception_check(self.raw()) {
                    backend.exception_clear(self.raw());
                }
                Err(BridgeError::PromotionFailed(reference.id))
            }
        }
    }

    /// Weak reference to the same object
    pub fn downgrade(&self, reference: &ObjectReference) -> BridgeResult<ObjectReference> {
        self.ensure_usable()?;
        let raw = self.raw_object(reference)?;
        let backend = self.backend();

        match backend.new_weak_ref(self.raw(), raw) {
            Some(weak) => Ok(self.track(weak, RefScope::Weak)),
            None => {
                if backend.exception_check(self.raw()) {
                    backend.exception_clear(self.raw());
                }
                Err(BridgeError::PromotionFailed(reference.id))
            }
        }
    }

    /// Local reference to a weakly held object, `None` once it was collected
    pub fn upgrade(&self, weak: &ObjectReference) -> BridgeResult<Option<ObjectReference>> {
        self.ensure_usable()?;
        let raw = self.raw_object(weak)?;
        Ok(self
            .backend()
            .new_local_ref(self.raw(), raw)
            .map(|local| self.track(local, RefScope::Local)))
    }

    /// Whether the referenced object still exists
    pub fn is_alive(&self, reference: &ObjectReference) -> BridgeResult<bool> {
        self.ensure_usable()?;
        let raw = self.raw_object(reference)?;
        Ok(match reference.scope {
            RefScope::Weak => !self.backend().is_same_object(self.raw(), Some(raw), None),
            RefScope::Local | RefScope::Global => true,
        })
    }

    /// Identity comparison of two references
    pub fn is_same_object(&self, a: &ObjectReference, b: &ObjectReference) -> BridgeResult<bool> {
        self.ensure_usable()?;
        let a = self.raw_object(a)?;
        let b = self.raw_object(b)?;
        Ok(self.backend().is_same_object(self.raw(), Some(a), Some(b)))
    }

    /// Release a reference; releasing twice is a no-op
    pub fn release(&self, reference: &ObjectReference) {
        match reference.scope {
            RefScope::Local => {
                if let Some(raw) = self.locals().remove(reference.id) {
                    if self.ensure_usable().is_ok() {
                        self.backend().delete_local_ref(self.raw(), raw);
                    }
                }
            }
            RefScope::Global | RefScope::Weak => {
                // Entry stays registered (and reported as live) until a usable env deletes it
                if self.ensure_usable().is_err() {
                    debug!(reference = reference.id, "environment unusable; reference left live");
                    return;
                }
                let Some(entry) = self.runtime().inner().globals().remove(reference.id) else {
                    return;
                };
                match entry.scope {
                    RefScope::Weak => self.backend().delete_weak_ref(self.raw(), entry.raw),
                    _ => self.backend().delete_global_ref(self.raw(), entry.raw),
                }
            }
        }
    }

    /// Open a local frame; locals created until the guard drops are released with it
    pub fn push_frame(&self) -> FrameGuard<'_> {
        let depth = self.locals().push_frame();
        trace!(depth, "local frame opened");
        FrameGuard { env: self, depth }
    }

    /// Run `f` inside a local frame
    pub fn with_frame<T>(&self, f: impl FnOnce(&EnvironmentHandle) -> T) -> T {
        let _frame = self.push_frame();
        f(self)
    }

    pub fn reference_stats(&self) -> RefStats {
        self.locals().stats()
    }

    fn close_frames(&self, depth: usize) {
        let ids = self.locals().close_frames(depth);
        self.delete_locals(ids);
    }

    pub(crate) fn release_all_locals(&self) {
        let ids = self.locals().close_frames(1);
        self.delete_locals(ids);
    }

    fn delete_locals(&self, ids: Vec<u64>) {
        let usable = self.is_attached();
        for id in ids {
            if let Some(raw) = self.locals().remove(id) {
                if usable {
                    self.backend().delete_local_ref(self.raw(), raw);
                }
            }
        }
    }
}
