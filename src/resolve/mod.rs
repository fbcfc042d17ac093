//! Class and member resolution with a shared descriptor cache
//!
//! Design: lookups are expensive, so every descriptor is resolved once per
//! runtime and shared by all threads:
//! - one `OnceCell` per key; concurrent first resolutions of the same key
//!   block on the cell and observe the single stored result
//! - failures are returned but never stored, so a later retry can succeed
//! - cached class descriptors hold global references owned by the bridge
//! - a lookup that re-enters resolution of its own key on the same thread
//!   (a class initializer calling back into native code) bypasses the cell
//!   and gets an uncached descriptor

#[cfg(test)]
mod tests;

use crate::backend::{ManagedRuntime, RawEnv, RawField, RawMethod, RawObject};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{debug, log_class_resolved, log_member_resolved, log_resolution_failed, perf};
use crate::runtime::EnvironmentHandle;
use crate::signature::{normalize_class_name, JavaType, MethodSignature};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub const CONSTRUCTOR_NAME: &str = "<init>";

// ============================================================================
// Descriptors
// ============================================================================

/// A resolved class, valid on every thread until shutdown
#[derive(Clone)]
pub struct ClassDescriptor {
    inner: Arc<ClassInner>,
}

struct ClassInner {
    name: String,
    raw: RawObject,
    serial: u64,
}

impl ClassDescriptor {
    /// Slashed internal name, e.g. `java/lang/String`
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Dotted binary name, e.g. `java.lang.String`
    pub fn binary_name(&self) -> String {
        self.inner.name.replace('/', ".")
    }

    /// Global reference to the class object
    #[inline]
    pub fn raw(&self) -> RawObject {
        self.inner.raw
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.serial == other.inner.serial
    }
}

impl Eq for ClassDescriptor {}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassDescriptor").field(&self.inner.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Constructor,
    Field,
}

/// Declared type of a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberDescriptor {
    Method(MethodSignature),
    Field(JavaType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawMember {
    Method(RawMethod),
    Field(RawField),
}

/// A resolved method, constructor or field
#[derive(Clone)]
pub struct MemberIdentifier {
    inner: Arc<MemberInner>,
}

struct MemberInner {
    class: ClassDescriptor,
    name: String,
    kind: MemberKind,
    is_static: bool,
    descriptor: MemberDescriptor,
    raw: RawMember,
}

impl MemberIdentifier {
    pub fn class(&self) -> &ClassDescriptor {
        &self.inner.class
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn kind(&self) -> MemberKind {
        self.inner.kind
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.inner.is_static
    }

    pub fn descriptor(&self) -> &MemberDescriptor {
        &self.inner.descriptor
    }

    /// Descriptor text, e.g. `(I)V` or `Ljava/lang/String;`
    pub fn signature(&self) -> String {
        match &self.inner.descriptor {
            MemberDescriptor::Method(sig) => sig.to_string(),
            MemberDescriptor::Field(ty) => ty.to_string(),
        }
    }

    /// Parameter types; empty for fields
    pub fn param_types(&self) -> &[JavaType] {
        match &self.inner.descriptor {
            MemberDescriptor::Method(sig) => &sig.params,
            MemberDescriptor::Field(_) => &[],
        }
    }

    /// Return type of a method, or the type of a field
    pub fn value_type(&self) -> &JavaType {
        match &self.inner.descriptor {
            MemberDescriptor::Method(sig) => &sig.ret,
            MemberDescriptor::Field(ty) => ty,
        }
    }

    #[inline]
    pub(crate) fn raw(&self) -> RawMember {
        self.inner.raw
    }
}

impl PartialEq for MemberIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.inner.raw == other.inner.raw && self.inner.class == other.inner.class
    }
}

impl Eq for MemberIdentifier {}

impl fmt::Display for MemberIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.inner.class.name(), self.inner.name, self.signature())
    }
}

impl fmt::Debug for MemberIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberIdentifier")
            .field("member", &self.to_string())
            .field("kind", &self.inner.kind)
            .field("static", &self.inner.is_static)
            .finish()
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemberKey {
    class: u64,
    name: String,
    signature: String,
    is_static: bool,
    field: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FlightKey {
    Class(String),
    Member(MemberKey),
}

thread_local! {
    /// Keys this thread is currently initializing, tagged with the resolver address
    static IN_FLIGHT: RefCell<HashSet<(usize, FlightKey)>> = RefCell::new(HashSet::new());
}

/// Marks a key as being initialized by the current thread until dropped
struct Flight {
    key: (usize, FlightKey),
}

impl Flight {
    /// None when the current thread is already initializing `key`
    fn enter(resolver: &Resolver, key: FlightKey) -> Option<Self> {
        let key = (resolver as *const Resolver as usize, key);
        let fresh = IN_FLIGHT
            .try_with(|set| set.borrow_mut().insert(key.clone()))
            .unwrap_or(true);
        fresh.then_some(Self { key })
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        let _ = IN_FLIGHT.try_with(|set| set.borrow_mut().remove(&self.key));
    }
}

/// Resolution counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Class lookups issued to the runtime
    pub class_lookups: usize,
    /// Method and field lookups issued to the runtime
    pub member_lookups: usize,
    /// Resolutions answered from the cache
    pub cache_hits: usize,
    pub cached_classes: usize,
    pub cached_members: usize,
}

pub(crate) struct Resolver {
    classes: DashMap<String, Arc<OnceCell<ClassDescriptor>>>,
    members: DashMap<MemberKey, Arc<OnceCell<MemberIdentifier>>>,
    next_serial: AtomicU64,
    class_lookups: AtomicUsize,
    member_lookups: AtomicUsize,
    hits: AtomicUsize,
    /// Globals of uncached class descriptors from reentrant lookups
    uncached: DashMap<u64, RawObject>,
}

impl Resolver {
    pub(crate) fn new() -> Self {
        Self {
            classes: DashMap::new(),
            members: DashMap::new(),
            next_serial: AtomicU64::new(1),
            class_lookups: AtomicUsize::new(0),
            member_lookups: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            uncached: DashMap::new(),
        }
    }

    pub(crate) fn stats(&self) -> ResolverStats {
        ResolverStats {
            class_lookups: self.class_lookups.load(Ordering::Relaxed),
            member_lookups: self.member_lookups.load(Ordering::Relaxed),
            cache_hits: self.hits.load(Ordering::Relaxed),
            cached_classes: self.classes.iter().filter(|c| c.get().is_some()).count(),
            cached_members: self.members.iter().filter(|m| m.get().is_some()).count(),
        }
    }

    /// Drop every cached descriptor and its global reference
    pub(crate) fn release_all(&self, backend: &dyn ManagedRuntime, env: RawEnv) {
        self.members.clear();
        for entry in self.classes.iter() {
            if let Some(class) = entry.get() {
                backend.delete_global_ref(env, class.raw());
            }
        }
        self.classes.clear();
        for entry in self.uncached.iter() {
            backend.delete_global_ref(env, *entry.value());
        }
        self.uncached.clear();
    }
}

/// Cell for `key`; the map shard lock is released before the cell is used
fn cell_for<K, V>(map: &DashMap<K, Arc<OnceCell<V>>>, key: &K) -> Arc<OnceCell<V>>
where
    K: Eq + Hash + Clone,
{
    if let Some(cell) = map.get(key) {
        return Arc::clone(&cell);
    }
    Arc::clone(&map.entry(key.clone()).or_default())
}

// ============================================================================
// Environment operations
// ============================================================================

impl EnvironmentHandle {
    /// Resolve a class by dotted or slashed name
    pub fn resolve_class(&self, name: &str) -> BridgeResult<ClassDescriptor> {
        self.ensure_usable()?;
        self.ensure_clear()?;

        let name = normalize_class_name(name);
        let resolver = self.runtime().inner().resolver();
        let cell = cell_for(&resolver.classes, &name);

        if let Some(class) = cell.get() {
            resolver.hits.fetch_add(1, Ordering::Relaxed);
            log_class_resolved(&name, true);
            return Ok(class.clone());
        }

        let Some(_flight) = Flight::enter(resolver, FlightKey::Class(name.clone())) else {
            debug!(class = %name, "reentrant resolution; descriptor not cached");
            let class = self.lookup_class(&name)?;
            resolver.uncached.insert(class.inner.serial, class.raw());
            return Ok(class);
        };
        let class = cell.get_or_try_init(|| self.lookup_class(&name))?;
        log_class_resolved(&name, false);
        Ok(class.clone())
    }

    fn lookup_class(&self, name: &str) -> BridgeResult<ClassDescriptor> {
        let resolver = self.runtime().inner().resolver();
        resolver.class_lookups.fetch_add(1, Ordering::Relaxed);
        let _timer = perf::track("find_class");

        let backend = self.backend();
        let env = self.raw();
        let local = backend.find_class(env, name);

        if backend.exception_check(env) {
            backend.exception_clear(env);
            if let Some(local) = local {
                backend.delete_local_ref(env, local);
            }
            log_resolution_failed("class", name);
            return Err(BridgeError::ClassNotFound(name.to_string()));
        }

        let Some(local) = local else {
            log_resolution_failed("class", name);
            return Err(BridgeError::ClassNotFound(name.to_string()));
        };

        let global = backend.new_global_ref(env, local);
        backend.delete_local_ref(env, local);
        let raw = global.ok_or_else(|| BridgeError::ClassNotFound(name.to_string()))?;

        Ok(ClassDescriptor {
            inner: Arc::new(ClassInner {
                name: name.to_string(),
                raw,
                serial: resolver.next_serial.fetch_add(1, Ordering::Relaxed),
            }),
        })
    }

    /// Resolve an instance or static method
    pub fn resolve_method(
        &self,
        class: &ClassDescriptor,
        name: &str,
        signature: &str,
        is_static: bool,
    ) -> BridgeResult<MemberIdentifier> {
        let sig = MethodSignature::parse(signature)?;
        let kind = if name == CONSTRUCTOR_NAME {
            MemberKind::Constructor
        } else {
            MemberKind::Method
        };
        self.resolve_member(class, name, kind, is_static, MemberDescriptor::Method(sig))
    }

    /// Resolve a constructor; the signature must return `V`
    pub fn resolve_constructor(&self, class: &ClassDescriptor, signature: &str) -> BridgeResult<MemberIdentifier> {
        let sig = MethodSignature::parse(signature)?;
        if sig.ret != JavaType::Void {
            return Err(BridgeError::InvalidSignature {
                signature: signature.to_string(),
                reason: "constructors return void".into(),
            });
        }
        self.resolve_member(
            class,
            CONSTRUCTOR_NAME,
            MemberKind::Constructor,
            false,
            MemberDescriptor::Method(sig),
        )
    }

    /// Resolve an instance or static field
    pub fn resolve_field(
        &self,
        class: &ClassDescriptor,
        name: &str,
        field_type: &str,
        is_static: bool,
    ) -> BridgeResult<MemberIdentifier> {
        let ty = JavaType::parse(field_type)?;
        self.resolve_member(class, name, MemberKind::Field, is_static, MemberDescriptor::Field(ty))
    }

    fn resolve_member(
        &self,
        class: &ClassDescriptor,
        name: &str,
        kind: MemberKind,
        is_static: bool,
        descriptor: MemberDescriptor,
    ) -> BridgeResult<MemberIdentifier> {
        self.ensure_usable()?;
        self.ensure_clear()?;

        let resolver = self.runtime().inner().resolver();
        let signature = match &descriptor {
            MemberDescriptor::Method(sig) => sig.to_string(),
            MemberDescriptor::Field(ty) => ty.to_string(),
        };
        let key = MemberKey {
            class: class.inner.serial,
            name: name.to_string(),
            signature,
            is_static,
            field: kind == MemberKind::Field,
        };
        let cell = cell_for(&resolver.members, &key);

        if let Some(member) = cell.get() {
            resolver.hits.fetch_add(1, Ordering::Relaxed);
            log_member_resolved(class.name(), name, &key.signature, true);
            return Ok(member.clone());
        }

        let Some(_flight) = Flight::enter(resolver, FlightKey::Member(key.clone())) else {
            debug!(class = class.name(), member = name, "reentrant resolution; identifier not cached");
            return self.lookup_member(class, name, &key.signature, kind, is_static, descriptor);
        };
        let member = cell.get_or_try_init(|| {
            self.lookup_member(class, name, &key.signature, kind, is_static, descriptor)
        })?;
        log_member_resolved(class.name(), name, &key.signature, false);
        Ok(member.clone())
    }

    fn lookup_member(
        &self,
        class: &ClassDescriptor,
        name: &str,
        signature: &str,
        kind: MemberKind,
        is_static: bool,
        descriptor: MemberDescriptor,
    ) -> BridgeResult<MemberIdentifier> {
        let resolver = self.runtime().inner().resolver();
        resolver.member_lookups.fetch_add(1, Ordering::Relaxed);

        let backend = self.backend();
        let env = self.raw();
        let raw = match kind {
            MemberKind::Field => backend
                .field_id(env, class.raw(), name, signature, is_static)
                .map(RawMember::Field),
            MemberKind::Method | MemberKind::Constructor => backend
                .method_id(env, class.raw(), name, signature, is_static)
                .map(RawMember::Method),
        };

        let pending = backend.exception_check(env);
        if pending {
            backend.exception_clear(env);
        }

        match raw {
            Some(raw) if !pending => Ok(MemberIdentifier {
                inner: Arc::new(MemberInner {
                    class: class.clone(),
                    name: name.to_string(),
                    kind,
                    is_static,
                    descriptor,
                    raw,
                }),
            }),
            _ => {
                log_resolution_failed("member", name);
                Err(BridgeError::MemberNotFound {
                    class: class.name().to_string(),
                    name: name.to_string(),
                    signature: signature.to_string(),
                })
            }
        }
    }
}
