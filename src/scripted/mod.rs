//! Scripted runtime - an in-process `ManagedRuntime` for tests and demos
//!
//! Design: classes are declared in Rust with `ClassBuilder`; method bodies
//! are closures over a `Call` context. The runtime keeps real reference
//! tables and per-thread pending exceptions so the bridge's bookkeeping
//! can be observed:
//! - `heap.rs`  - objects, handles, classes and environments
//! - `class.rs` - builders, script call context and bootstrap classes
//!
//! Bodies run without the heap lock held, so they may call back into the
//! runtime. Every capability issued while an exception is pending (other
//! than the exception and delete operations) counts as a protocol violation.

mod class;
mod heap;

#[cfg(test)]
mod tests;

pub use class::{Body, Call, ClassBuilder, Thrown};
pub use heap::{HandleCounts, ObjectId, Slot};

use crate::backend::{
    AttachMode, CallTarget, ManagedRuntime, RawEnv, RawField, RawMethod, RawObject, WireType, WireValue,
};
use crate::error::BackendError;
use crate::logging::trace;
use crate::signature::{JavaType, MethodSignature};
use dashmap::DashMap;
use heap::{ClassId, FieldDef, HandleKind, Heap, MethodDef, ObjectData, OBJECT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Called with the class or member name on every lookup, before the runtime
/// answers; may call back into the bridge
pub type LookupHook = Arc<dyn Fn(&str) + Send + Sync>;

pub struct ScriptedRuntime {
    pub(crate) heap: Mutex<Heap>,
    pub(crate) output: Mutex<Vec<String>>,
    class_lookups: DashMap<String, usize>,
    member_lookups: AtomicUsize,
    lookup_delay: Mutex<Option<Duration>>,
    lookup_hook: Mutex<Option<LookupHook>>,
    refuse_attach: AtomicBool,
    fail_startup: AtomicBool,
    destroyed: AtomicBool,
    violations: AtomicUsize,
}

impl ScriptedRuntime {
    /// Runtime preloaded with `java/lang` bootstrap classes
    pub fn new() -> Arc<Self> {
        let runtime = Self {
            heap: Mutex::new(Heap::new()),
            output: Mutex::new(Vec::new()),
            class_lookups: DashMap::new(),
            member_lookups: AtomicUsize::new(0),
            lookup_delay: Mutex::new(None),
            lookup_hook: Mutex::new(None),
            refuse_attach: AtomicBool::new(false),
            fail_startup: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            violations: AtomicUsize::new(0),
        };
        {
            let mut heap = runtime.heap.lock();
            for builder in class::bootstrap_classes() {
                if let Err(e) = install(&mut heap, builder) {
                    crate::logging::error!(error = %e, "bootstrap class rejected");
                }
            }
        }
        Arc::new(runtime)
    }

    /// Add a class; its superclass must already exist
    pub fn define(&self, builder: ClassBuilder) -> Result<(), BackendError> {
        let mut heap = self.heap.lock();
        if heap.class_id(&builder.name).is_some() {
            return Err(BackendError::new(-1, format!("class {} already defined", builder.name)));
        }
        install(&mut heap, builder)
    }

    // ========================================================================
    // Test controls and inspection
    // ========================================================================

    /// Lines written by script bodies
    pub fn output(&self) -> Vec<String> {
        self.output.lock().clone()
    }

    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock())
    }

    /// How often `name` was looked up through `find_class`
    pub fn class_lookups(&self, name: &str) -> usize {
        self.class_lookups.get(name).map_or(0, |n| *n)
    }

    pub fn member_lookups(&self) -> usize {
        self.member_lookups.load(Ordering::Relaxed)
    }

    /// Slow down class and member lookups to widen race windows
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        *self.lookup_delay.lock() = delay;
    }

    pub fn set_lookup_hook(&self, hook: Option<LookupHook>) {
        *self.lookup_hook.lock() = hook;
    }

    /// Attach the calling thread the way a runtime-started thread would be,
    /// without going through `attach_current_thread`
    pub fn adopt_current_thread(&self, name: &str) -> Result<RawEnv, BackendError> {
        let mut heap = self.heap.lock();
        let current = thread::current().id();
        if heap.threads.contains_key(&current) {
            return Err(BackendError::new(-5, "thread already attached"));
        }
        let env = heap.add_env(current, name, false);
        if let Some(state) = heap.envs.get_mut(&env) {
            state.runtime_owned = true;
        }
        RawEnv::from_raw(env).ok_or_else(|| BackendError::new(-1, "null environment"))
    }

    /// Undo `adopt_current_thread`, as the runtime does when its thread ends
    pub fn release_adopted_thread(&self) -> bool {
        let mut heap = self.heap.lock();
        let Some(env) = heap.threads.get(&thread::current().id()).copied() else {
            return false;
        };
        if !heap.envs.get(&env).map_or(false, |e| e.runtime_owned) {
            return false;
        }
        heap.remove_env(env).is_some()
    }

    pub fn refuse_attach(&self, refuse: bool) {
        self.refuse_attach.store(refuse, Ordering::Relaxed);
    }

    pub fn fail_startup(&self, fail: bool) {
        self.fail_startup.store(fail, Ordering::Relaxed);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Calls issued while an exception was pending, or with invalid handles
    pub fn protocol_violations(&self) -> usize {
        self.violations.load(Ordering::Relaxed)
    }

    /// Live handles across all threads
    pub fn handle_counts(&self) -> HandleCounts {
        self.heap.lock().handle_counts(None)
    }

    /// Live handles, counting only the calling thread's locals
    pub fn thread_handle_counts(&self) -> HandleCounts {
        let heap = self.heap.lock();
        // Environment ids start at 1, so 0 matches no locals
        let env = heap.threads.get(&thread::current().id()).copied().unwrap_or(0);
        heap.handle_counts(Some(env))
    }

    pub fn attached_threads(&self) -> usize {
        self.heap.lock().envs.len()
    }

    /// (name, daemon) of every attached thread
    pub fn attached_thread_names(&self) -> Vec<(String, bool)> {
        let heap = self.heap.lock();
        let mut names: Vec<_> = heap.envs.values().map(|e| (e.name.clone(), e.daemon)).collect();
        names.sort();
        names
    }

    pub fn object_count(&self) -> usize {
        self.heap.lock().object_count()
    }

    /// Reclaim objects unreachable from strong handles, statics and pending
    /// exceptions; returns the number of objects freed
    ///
    /// Objects held only by a running script body are not roots, so collect
    /// while no body is executing.
    pub fn collect_garbage(&self) -> usize {
        let freed = self.heap.lock().collect(&[]);
        trace!(freed, "scripted collection");
        freed
    }

    // ========================================================================
    // Internals
    // ========================================================================

    pub(crate) fn run(&self, body: &Body, env: usize, this: Option<ObjectId>, args: Vec<Slot>) -> Result<Slot, Thrown> {
        let mut call = Call {
            runtime: self,
            env,
            this,
            args,
        };
        body(&mut call)
    }

    pub(crate) fn described_class_name(&self, class_object: ObjectId) -> Option<String> {
        let heap = self.heap.lock();
        let class = heap.class_of_class_object(class_object)?;
        Some(heap.class_name(class).to_string())
    }

    /// Count a capability call; flags calls made while an exception is pending
    fn enter(&self, heap: &Heap, env: RawEnv) -> usize {
        let env = env.as_raw();
        if heap.pending(env).is_some() {
            self.violation("call with pending exception");
        }
        env
    }

    fn violation(&self, what: &str) {
        trace!(what, "scripted protocol violation");
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    fn raise(&self, heap: &mut Heap, env: usize, thrown: &Thrown) {
        let exception = heap.materialize(thrown);
        heap.set_pending(env, Some(exception));
    }

    fn delay_lookup(&self, name: &str) {
        let delay = *self.lookup_delay.lock();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let hook = self.lookup_hook.lock().clone();
        if let Some(hook) = hook {
            hook(name);
        }
    }

    fn class_id(&self, heap: &Heap, class: RawObject) -> Option<ClassId> {
        let id = heap.class_of_class_object(heap.deref(class)?);
        if id.is_none() {
            self.violation("invalid class handle");
        }
        id
    }
}

/// Scripted backend behind an isolated bridge runtime
#[cfg(test)]
pub(crate) fn fixture(options: crate::config::RuntimeOptions) -> (Arc<ScriptedRuntime>, crate::runtime::RuntimeHandle) {
    let backend = ScriptedRuntime::new();
    let runtime = crate::runtime::RuntimeHandle::isolated(backend.clone(), options).expect("scripted runtime starts");
    (backend, runtime)
}

fn install(heap: &mut Heap, builder: ClassBuilder) -> Result<(), BackendError> {
    let rejected = |what: &str, sig: &str| BackendError::new(-1, format!("{}: bad {} `{}`", builder.name, what, sig));

    let mut methods = Vec::with_capacity(builder.methods.len());
    for m in &builder.methods {
        let sig = MethodSignature::parse(&m.signature).map_err(|_| rejected("method signature", &m.signature))?;
        methods.push(sig.ret.wire_type());
    }
    let mut fields = Vec::with_capacity(builder.fields.len());
    for f in &builder.fields {
        let ty = JavaType::parse(&f.signature).map_err(|_| rejected("field type", &f.signature))?;
        fields.push(ty.wire_type());
    }

    let class = match heap.class_id(&builder.name) {
        Some(existing) => existing,
        None => {
            let parent = match &builder.super_name {
                Some(name) => heap
                    .class_id(name)
                    .ok_or_else(|| BackendError::new(-1, format!("unknown superclass {}", name)))?,
                None => OBJECT,
            };
            heap.add_class(&builder.name, Some(parent))
        }
    };

    for (spec, ret) in builder.methods.into_iter().zip(methods) {
        heap.methods.push(MethodDef {
            class,
            name: spec.name,
            signature: spec.signature,
            ret,
            is_static: spec.is_static,
            body: spec.body,
        });
    }
    for (spec, ty) in builder.fields.into_iter().zip(fields) {
        let index = heap.fields.len();
        heap.fields.push(FieldDef {
            class,
            name: spec.name,
            signature: spec.signature,
            ty,
            is_static: spec.is_static,
        });
        if spec.is_static && spec.initial != Slot::Void {
            heap.set_static(index, spec.initial);
        }
    }
    Ok(())
}

#[inline]
fn member_index(raw: usize) -> usize {
    raw.saturating_sub(1)
}

fn out_of_bounds(index: i64, len: usize) -> Thrown {
    Thrown::new(
        "java/lang/ArrayIndexOutOfBoundsException",
        format!("Index {} out of bounds for length {}", index, len),
    )
}

/// Bounds-checked element range
fn region(start: i32, len: i32, total: usize) -> Result<std::ops::Range<usize>, Thrown> {
    let (Ok(start), Ok(len)) = (usize::try_from(start), usize::try_from(len)) else {
        return Err(out_of_bounds(i64::from(start.min(len)), total));
    };
    match start.checked_add(len) {
        Some(end) if end <= total => Ok(start..end),
        _ => Err(out_of_bounds((start + len).saturating_sub(1) as i64, total)),
    }
}

impl ManagedRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    fn startup(&self) -> Result<(), BackendError> {
        if self.fail_startup.load(Ordering::Relaxed) {
            return Err(BackendError::new(-1, "scripted startup refused"));
        }
        Ok(())
    }

    // ========================================================================
    // Threads and lifecycle
    // ========================================================================

    fn attach_current_thread(&self, mode: AttachMode, thread_name: &str) -> Result<RawEnv, BackendError> {
        if self.is_destroyed() {
            return Err(BackendError::new(-2, "runtime destroyed"));
        }
        if self.refuse_attach.load(Ordering::Relaxed) {
            return Err(BackendError::new(-4, "attach refused"));
        }

        let mut heap = self.heap.lock();
        let current = thread::current().id();
        let env = match heap.threads.get(&current) {
            Some(env) => *env,
            None => heap.add_env(current, thread_name, mode == AttachMode::Daemon),
        };
        RawEnv::from_raw(env).ok_or_else(|| BackendError::new(-1, "null environment"))
    }

    fn borrowed_env(&self) -> Option<RawEnv> {
        let heap = self.heap.lock();
        let env = *heap.threads.get(&thread::current().id())?;
        heap.envs.get(&env).filter(|e| e.runtime_owned)?;
        RawEnv::from_raw(env)
    }

    fn detach_current_thread(&self, env: RawEnv) -> Result<(), BackendError> {
        let mut heap = self.heap.lock();
        if heap.envs.get(&env.as_raw()).map_or(false, |e| e.runtime_owned) {
            self.violation("detach of a runtime-owned thread");
        }
        heap.remove_env(env.as_raw())
            .map(drop)
            .ok_or_else(|| BackendError::new(-2, "thread not attached"))
    }

    fn destroy(&self) -> Result<(), BackendError> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(BackendError::new(-1, "runtime already destroyed"));
        }
        let heap = self.heap.lock();
        if !heap.envs.is_empty() {
            self.violation("destroy with attached threads");
        }
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    fn find_class(&self, env: RawEnv, name: &str) -> Option<RawObject> {
        self.delay_lookup(name);
        *self.class_lookups.entry(name.to_string()).or_insert(0) += 1;

        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        match heap.class_id(name) {
            Some(class) => {
                let object = heap.classes[class].object;
                Some(heap.new_handle(object, HandleKind::Local(env)))
            }
            None => {
                self.raise(&mut heap, env, &Thrown::new("java/lang/NoClassDefFoundError", name));
                None
            }
        }
    }

    fn method_id(&self, env: RawEnv, class: RawObject, name: &str, signature: &str, is_static: bool) -> Option<RawMethod> {
        self.delay_lookup(name);
        self.member_lookups.fetch_add(1, Ordering::Relaxed);

        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let class = self.class_id(&heap, class)?;
        match heap.find_method(class, name, signature, is_static) {
            Some(index) => RawMethod::from_raw(index + 1),
            None => {
                self.raise(&mut heap, env, &Thrown::new("java/lang/NoSuchMethodError", name));
                None
            }
        }
    }

    fn field_id(&self, env: RawEnv, class: RawObject, name: &str, signature: &str, is_static: bool) -> Option<RawField> {
        self.delay_lookup(name);
        self.member_lookups.fetch_add(1, Ordering::Relaxed);

        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let class = self.class_id(&heap, class)?;
        match heap.find_field(class, name, signature, is_static) {
            Some(index) => RawField::from_raw(index + 1),
            None => {
                self.raise(&mut heap, env, &Thrown::new("java/lang/NoSuchFieldError", name));
                None
            }
        }
    }

    fn object_class(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let object = heap.deref(object)?;
        let class = heap.object(object)?.class;
        let class_object = heap.classes.get(class)?.object;
        Some(heap.new_handle(class_object, HandleKind::Local(env)))
    }

    fn is_instance_of(&self, env: RawEnv, object: RawObject, class: RawObject) -> bool {
        let heap = self.heap.lock();
        self.enter(&heap, env);
        let Some(class) = self.class_id(&heap, class) else {
            return false;
        };
        heap.deref(object)
            .and_then(|o| heap.object(o))
            .map_or(false, |o| heap.is_subclass(o.class, class))
    }

    // ========================================================================
    // Invocation and field access
    // ========================================================================

    fn call_method(&self, env: RawEnv, target: CallTarget, method: RawMethod, ret: WireType, args: &[WireValue]) -> WireValue {
        let env_id = env.as_raw();
        let prepared = {
            let mut heap = self.heap.lock();
            self.enter(&heap, env);
            let index = member_index(method.as_raw());
            let Some(def) = heap.methods.get(index) else {
                self.violation("invalid method id");
                return ret.zero();
            };
            if def.ret != ret {
                self.violation("return type differs from declaration");
            }
            let (name, signature) = (def.name.clone(), def.signature.clone());
            let args: Option<Vec<Slot>> = args.iter().map(|a| heap.from_wire(*a)).collect();

            match (target, args) {
                (_, None) => None,
                (CallTarget::Static(_), Some(args)) => Some((Arc::clone(&def.body), None, args)),
                (CallTarget::Instance(receiver), Some(args)) => match heap.deref(receiver) {
                    Some(this) => {
                        let class = heap.object(this).map_or(OBJECT, |o| o.class);
                        let target = heap.find_method(class, &name, &signature, false).unwrap_or(index);
                        Some((Arc::clone(&heap.methods[target].body), Some(this), args))
                    }
                    None => {
                        self.raise(&mut heap, env_id, &Thrown::bare("java/lang/NullPointerException"));
                        return ret.zero();
                    }
                },
            }
        };

        let Some((body, this, args)) = prepared else {
            self.violation("invalid argument handle");
            return ret.zero();
        };

        let outcome = self.run(&body, env_id, this, args);
        let mut heap = self.heap.lock();
        match outcome {
            Ok(slot) => heap.to_wire(slot, ret, env_id),
            Err(thrown) => {
                self.raise(&mut heap, env_id, &thrown);
                ret.zero()
            }
        }
    }

    fn new_object(&self, env: RawEnv, class: RawObject, constructor: RawMethod, args: &[WireValue]) -> Option<RawObject> {
        let env_id = env.as_raw();
        let (body, this, args) = {
            let mut heap = self.heap.lock();
            self.enter(&heap, env);
            let class = self.class_id(&heap, class)?;
            let Some(def) = heap.methods.get(member_index(constructor.as_raw())) else {
                self.violation("invalid constructor id");
                return None;
            };
            let body = Arc::clone(&def.body);
            let Some(args) = args.iter().map(|a| heap.from_wire(*a)).collect::<Option<Vec<Slot>>>() else {
                self.violation("invalid argument handle");
                return None;
            };
            let this = heap.alloc(class, ObjectData::Plain(HashMap::new()));
            (body, this, args)
        };

        let outcome = self.run(&body, env_id, Some(this), args);
        let mut heap = self.heap.lock();
        match outcome {
            Ok(_) => Some(heap.new_handle(this, HandleKind::Local(env_id))),
            Err(thrown) => {
                self.raise(&mut heap, env_id, &thrown);
                None
            }
        }
    }

    fn get_field(&self, env: RawEnv, target: CallTarget, field: RawField, ty: WireType) -> WireValue {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let index = member_index(field.as_raw());
        let slot = match target {
            CallTarget::Static(_) => heap.static_value(index),
            CallTarget::Instance(object) => match heap.deref(object) {
                Some(object) => heap.instance_value(object, index),
                None => {
                    self.raise(&mut heap, env, &Thrown::bare("java/lang/NullPointerException"));
                    return ty.zero();
                }
            },
        };
        heap.to_wire(slot, ty, env)
    }

    fn set_field(&self, env: RawEnv, target: CallTarget, field: RawField, value: WireValue) {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let index = member_index(field.as_raw());
        let Some(value) = heap.from_wire(value) else {
            self.violation("invalid value handle");
            return;
        };
        match target {
            CallTarget::Static(_) => heap.set_static(index, value),
            CallTarget::Instance(object) => match heap.deref(object) {
                Some(object) => heap.set_instance_value(object, index, value),
                None => self.raise(&mut heap, env, &Thrown::bare("java/lang/NullPointerException")),
            },
        }
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    fn exception_check(&self, env: RawEnv) -> bool {
        self.heap.lock().pending(env.as_raw()).is_some()
    }

    fn exception_occurred(&self, env: RawEnv) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        let pending = heap.pending(env.as_raw())?;
        Some(heap.new_handle(pending, HandleKind::Local(env.as_raw())))
    }

    fn exception_clear(&self, env: RawEnv) {
        self.heap.lock().set_pending(env.as_raw(), None);
    }

    fn throw_new(&self, env: RawEnv, class: RawObject, message: &str) -> Result<(), BackendError> {
        let env_id = env.as_raw();
        let (body, this, message) = {
            let mut heap = self.heap.lock();
            self.enter(&heap, env);
            let class = self
                .class_id(&heap, class)
                .ok_or_else(|| BackendError::new(-1, "invalid class handle"))?;
            let constructor = heap
                .find_method(class, "<init>", "(Ljava/lang/String;)V", false)
                .ok_or_else(|| BackendError::new(-1, format!("{} has no (String) constructor", heap.class_name(class))))?;
            let body = Arc::clone(&heap.methods[constructor].body);
            let message = heap.new_string(message.encode_utf16().collect());
            let this = heap.alloc(class, ObjectData::Plain(HashMap::new()));
            (body, this, message)
        };

        let outcome = self.run(&body, env_id, Some(this), vec![Slot::Object(message)]);
        let mut heap = self.heap.lock();
        match outcome {
            Ok(_) => heap.set_pending(env_id, Some(this)),
            Err(thrown) => self.raise(&mut heap, env_id, &thrown),
        }
        Ok(())
    }

    // ========================================================================
    // References
    // ========================================================================

    fn new_local_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let object = heap.deref(object)?;
        Some(heap.new_handle(object, HandleKind::Local(env)))
    }

    fn delete_local_ref(&self, _env: RawEnv, object: RawObject) {
        if !self.heap.lock().delete_handle(object, false, false) {
            self.violation("delete of unknown local");
        }
    }

    fn new_global_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        self.enter(&heap, env);
        let object = heap.deref(object)?;
        Some(heap.new_handle(object, HandleKind::Global))
    }

    fn delete_global_ref(&self, _env: RawEnv, object: RawObject) {
        if !self.heap.lock().delete_handle(object, true, false) {
            self.violation("delete of unknown global");
        }
    }

    fn new_weak_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        self.enter(&heap, env);
        let object = heap.deref(object)?;
        Some(heap.new_handle(object, HandleKind::Weak))
    }

    fn delete_weak_ref(&self, _env: RawEnv, object: RawObject) {
        if !self.heap.lock().delete_handle(object, false, true) {
            self.violation("delete of unknown weak");
        }
    }

    fn is_same_object(&self, env: RawEnv, a: Option<RawObject>, b: Option<RawObject>) -> bool {
        let heap = self.heap.lock();
        self.enter(&heap, env);
        a.and_then(|r| heap.deref(r)) == b.and_then(|r| heap.deref(r))
    }

    // ========================================================================
    // Strings
    // ========================================================================

    fn new_string(&self, env: RawEnv, units: &[u16]) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let string = heap.new_string(units.to_vec());
        Some(heap.new_handle(string, HandleKind::Local(env)))
    }

    fn string_units(&self, env: RawEnv, string: RawObject) -> Option<Vec<u16>> {
        let heap = self.heap.lock();
        self.enter(&heap, env);
        heap.string_units(heap.deref(string)?).map(<[u16]>::to_vec)
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    fn array_length(&self, env: RawEnv, array: RawObject) -> Option<i32> {
        let heap = self.heap.lock();
        self.enter(&heap, env);
        let len = match &heap.object(heap.deref(array)?)?.data {
            ObjectData::Primitives(_, values) => values.len(),
            ObjectData::References(_, values) => values.len(),
            _ => return None,
        };
        i32::try_from(len).ok()
    }

    fn new_array(&self, env: RawEnv, element: WireType, len: i32) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let Ok(len) = usize::try_from(len) else {
            self.raise(&mut heap, env, &Thrown::new("java/lang/NegativeArraySizeException", len.to_string()));
            return None;
        };
        let array = heap.alloc(OBJECT, ObjectData::Primitives(element, vec![Slot::zero(element); len]));
        Some(heap.new_handle(array, HandleKind::Local(env)))
    }

    fn new_object_array(&self, env: RawEnv, len: i32, element_class: RawObject, init: Option<RawObject>) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let class = self.class_id(&heap, element_class)?;
        let Ok(len) = usize::try_from(len) else {
            self.raise(&mut heap, env, &Thrown::new("java/lang/NegativeArraySizeException", len.to_string()));
            return None;
        };
        let init = init.and_then(|r| heap.deref(r));
        let array = heap.alloc(OBJECT, ObjectData::References(class, vec![init; len]));
        Some(heap.new_handle(array, HandleKind::Local(env)))
    }

    fn get_array_region(&self, env: RawEnv, array: RawObject, element: WireType, start: i32, len: i32) -> Option<Vec<WireValue>> {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let array = heap.deref(array)?;

        let slots = match &heap.object(array)?.data {
            ObjectData::Primitives(ty, values) if *ty == element => region(start, len, values.len()).map(|r| values[r].to_vec()),
            _ => return None,
        };
        match slots {
            Ok(slots) => Some(slots.into_iter().map(|s| heap.to_wire(s, element, env)).collect()),
            Err(thrown) => {
                self.raise(&mut heap, env, &thrown);
                None
            }
        }
    }

    fn set_array_region(&self, env: RawEnv, array: RawObject, start: i32, values: &[WireValue]) {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let Some(array) = heap.deref(array) else {
            self.violation("invalid array handle");
            return;
        };
        let Some(slots) = values.iter().map(|v| heap.from_wire(*v)).collect::<Option<Vec<Slot>>>() else {
            self.violation("invalid value handle");
            return;
        };
        let count = i32::try_from(slots.len()).unwrap_or(i32::MAX);

        let outcome = match heap.object_mut(array).map(|o| &mut o.data) {
            Some(ObjectData::Primitives(ty, elements)) => {
                if slots.iter().any(|s| s.wire_type() != *ty) {
                    Err(Thrown::bare("java/lang/ArrayStoreException"))
                } else {
                    region(start, count, elements.len()).map(|r| elements[r].copy_from_slice(&slots))
                }
            }
            _ => Err(Thrown::bare("java/lang/ArrayStoreException")),
        };
        if let Err(thrown) = outcome {
            self.raise(&mut heap, env, &thrown);
        }
    }

    fn get_object_array_element(&self, env: RawEnv, array: RawObject, index: i32) -> Option<RawObject> {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let array = heap.deref(array)?;

        let element = match &heap.object(array)?.data {
            ObjectData::References(_, elements) => region(index, 1, elements.len()).map(|r| elements[r.start]),
            _ => return None,
        };
        match element {
            Ok(Some(object)) => Some(heap.new_handle(object, HandleKind::Local(env))),
            Ok(None) => None,
            Err(thrown) => {
                self.raise(&mut heap, env, &thrown);
                None
            }
        }
    }

    fn set_object_array_element(&self, env: RawEnv, array: RawObject, index: i32, value: Option<RawObject>) {
        let mut heap = self.heap.lock();
        let env = self.enter(&heap, env);
        let Some(array) = heap.deref(array) else {
            self.violation("invalid array handle");
            return;
        };
        let value = value.and_then(|r| heap.deref(r));
        let value_class = value.and_then(|v| heap.object(v)).map(|o| o.class);

        let element_class = match heap.object(array).map(|o| &o.data) {
            Some(ObjectData::References(class, _)) => *class,
            _ => {
                self.violation("not a reference array");
                return;
            }
        };
        if value_class.map_or(false, |c| !heap.is_subclass(c, element_class)) {
            self.raise(&mut heap, env, &Thrown::bare("java/lang/ArrayStoreException"));
            return;
        }

        let outcome = match heap.object_mut(array).map(|o| &mut o.data) {
            Some(ObjectData::References(_, elements)) => region(index, 1, elements.len()).map(|r| elements[r.start] = value),
            _ => Ok(()),
        };
        if let Err(thrown) = outcome {
            self.raise(&mut heap, env, &thrown);
        }
    }
}
