//! Object heap, handle tables and class registry of the scripted runtime

use super::class::{Body, Thrown};
use crate::backend::{RawObject, WireType, WireValue};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::thread::ThreadId;

pub(crate) type ClassId = usize;

pub(crate) const OBJECT: ClassId = 0;
pub(crate) const CLASS: ClassId = 1;

/// Identity of an object in the scripted heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

/// A value as script bodies see it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Slot {
    #[default]
    Void,
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ObjectId),
}

impl Slot {
    pub fn zero(ty: WireType) -> Self {
        match ty {
            WireType::Void => Self::Void,
            WireType::Boolean => Self::Boolean(false),
            WireType::Byte => Self::Byte(0),
            WireType::Char => Self::Char(0),
            WireType::Short => Self::Short(0),
            WireType::Int => Self::Int(0),
            WireType::Long => Self::Long(0),
            WireType::Float => Self::Float(0.0),
            WireType::Double => Self::Double(0.0),
            WireType::Object => Self::Null,
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Void => WireType::Void,
            Self::Boolean(_) => WireType::Boolean,
            Self::Byte(_) => WireType::Byte,
            Self::Char(_) => WireType::Char,
            Self::Short(_) => WireType::Short,
            Self::Int(_) => WireType::Int,
            Self::Long(_) => WireType::Long,
            Self::Float(_) => WireType::Float,
            Self::Double(_) => WireType::Double,
            Self::Null | Self::Object(_) => WireType::Object,
        }
    }

    pub fn object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }
}

pub(crate) enum ObjectData {
    Plain(HashMap<usize, Slot>),
    Str(Vec<u16>),
    Class(ClassId),
    Primitives(WireType, Vec<Slot>),
    References(ClassId, Vec<Option<ObjectId>>),
}

pub(crate) struct HeapObject {
    pub(crate) class: ClassId,
    pub(crate) data: ObjectData,
}

pub(crate) struct ClassDef {
    pub(crate) name: String,
    pub(crate) super_class: Option<ClassId>,
    pub(crate) object: ObjectId,
}

pub(crate) struct MethodDef {
    pub(crate) class: ClassId,
    pub(crate) name: String,
    pub(crate) signature: String,
    pub(crate) ret: WireType,
    pub(crate) is_static: bool,
    pub(crate) body: Body,
}

pub(crate) struct FieldDef {
    pub(crate) class: ClassId,
    pub(crate) name: String,
    pub(crate) signature: String,
    pub(crate) ty: WireType,
    pub(crate) is_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Local(usize),
    Global,
    Weak,
}

pub(crate) struct Handle {
    pub(crate) object: Option<ObjectId>,
    pub(crate) kind: HandleKind,
}

pub(crate) struct EnvState {
    pub(crate) thread: ThreadId,
    pub(crate) name: String,
    pub(crate) daemon: bool,
    /// Attached by the runtime itself rather than through `attach_current_thread`
    pub(crate) runtime_owned: bool,
    pub(crate) pending: Option<ObjectId>,
}

/// Live handle counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCounts {
    pub locals: usize,
    pub globals: usize,
    pub weaks: usize,
}

pub(crate) struct Heap {
    objects: HashMap<usize, HeapObject>,
    next_object: usize,
    handles: HashMap<usize, Handle>,
    next_handle: NonZeroUsize,
    pub(crate) classes: Vec<ClassDef>,
    class_names: HashMap<String, ClassId>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) fields: Vec<FieldDef>,
    statics: HashMap<usize, Slot>,
    pub(crate) envs: HashMap<usize, EnvState>,
    pub(crate) threads: HashMap<ThreadId, usize>,
    next_env: usize,
}

impl Heap {
    pub(crate) fn new() -> Self {
        let mut heap = Self {
            objects: HashMap::new(),
            next_object: 1,
            handles: HashMap::new(),
            next_handle: NonZeroUsize::MIN,
            classes: Vec::new(),
            class_names: HashMap::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            statics: HashMap::new(),
            envs: HashMap::new(),
            threads: HashMap::new(),
            next_env: 1,
        };
        heap.add_class("java/lang/Object", None);
        heap.add_class("java/lang/Class", Some(OBJECT));
        heap
    }

    // ========================================================================
    // Classes and members
    // ========================================================================

    pub(crate) fn add_class(&mut self, name: &str, super_class: Option<ClassId>) -> ClassId {
        let id = self.classes.len();
        let object = self.alloc(CLASS, ObjectData::Class(id));
        self.classes.push(ClassDef {
            name: name.to_string(),
            super_class,
            object,
        });
        self.class_names.insert(name.to_string(), id);
        id
    }

    pub(crate) fn class_id(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    pub(crate) fn class_name(&self, class: ClassId) -> &str {
        self.classes.get(class).map_or("java/lang/Object", |c| c.name.as_str())
    }

    /// Class represented by a class object
    pub(crate) fn class_of_class_object(&self, object: ObjectId) -> Option<ClassId> {
        match self.objects.get(&object.0)?.data {
            ObjectData::Class(id) => Some(id),
            _ => None,
        }
    }

    pub(crate) fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.classes.get(c).and_then(|def| def.super_class);
        }
        false
    }

    fn chain(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(Some(class), move |c| self.classes.get(*c).and_then(|def| def.super_class))
    }

    /// Most derived method matching name, signature and staticness
    pub(crate) fn find_method(&self, class: ClassId, name: &str, signature: &str, is_static: bool) -> Option<usize> {
        self.chain(class).find_map(|c| {
            self.methods
                .iter()
                .position(|m| m.class == c && m.name == name && m.signature == signature && m.is_static == is_static)
        })
    }

    pub(crate) fn find_field(&self, class: ClassId, name: &str, signature: &str, is_static: bool) -> Option<usize> {
        self.chain(class).find_map(|c| {
            self.fields
                .iter()
                .position(|f| f.class == c && f.name == name && f.signature == signature && f.is_static == is_static)
        })
    }

    pub(crate) fn field_by_name(&self, class: ClassId, name: &str, is_static: bool) -> Option<usize> {
        self.chain(class).find_map(|c| {
            self.fields
                .iter()
                .position(|f| f.class == c && f.name == name && f.is_static == is_static)
        })
    }

    pub(crate) fn static_value(&self, field: usize) -> Slot {
        match self.statics.get(&field) {
            Some(value) => *value,
            None => self.fields.get(field).map_or(Slot::Null, |f| Slot::zero(f.ty)),
        }
    }

    pub(crate) fn set_static(&mut self, field: usize, value: Slot) {
        self.statics.insert(field, value);
    }

    // ========================================================================
    // Objects
    // ========================================================================

    pub(crate) fn alloc(&mut self, class: ClassId, data: ObjectData) -> ObjectId {
        let id = self.next_object;
        self.next_object += 1;
        self.objects.insert(id, HeapObject { class, data });
        ObjectId(id)
    }

    pub(crate) fn object(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(&id.0)
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(&id.0)
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn new_string(&mut self, units: Vec<u16>) -> ObjectId {
        let class = self.class_id("java/lang/String").unwrap_or(OBJECT);
        self.alloc(class, ObjectData::Str(units))
    }

    pub(crate) fn string_units(&self, id: ObjectId) -> Option<&[u16]> {
        match &self.object(id)?.data {
            ObjectData::Str(units) => Some(units),
            _ => None,
        }
    }

    pub(crate) fn instance_value(&self, object: ObjectId, field: usize) -> Slot {
        let default = self.fields.get(field).map_or(Slot::Null, |f| Slot::zero(f.ty));
        match self.object(object).map(|o| &o.data) {
            Some(ObjectData::Plain(values)) => values.get(&field).copied().unwrap_or(default),
            _ => default,
        }
    }

    pub(crate) fn set_instance_value(&mut self, object: ObjectId, field: usize, value: Slot) {
        if let Some(HeapObject {
            data: ObjectData::Plain(values),
            ..
        }) = self.object_mut(object)
        {
            values.insert(field, value);
        }
    }

    /// Allocate an exception object for `thrown`, causes included
    pub(crate) fn materialize(&mut self, thrown: &Thrown) -> ObjectId {
        let class = self
            .class_id(&thrown.class)
            .or_else(|| self.class_id("java/lang/RuntimeException"))
            .unwrap_or(OBJECT);
        let object = self.alloc(class, ObjectData::Plain(HashMap::new()));

        if let Some(message) = &thrown.message {
            let text = self.new_string(message.encode_utf16().collect());
            if let Some(field) = self.field_by_name(class, "detailMessage", false) {
                self.set_instance_value(object, field, Slot::Object(text));
            }
        }
        if let Some(cause) = &thrown.cause {
            let cause = self.materialize(cause);
            if let Some(field) = self.field_by_name(class, "cause", false) {
                self.set_instance_value(object, field, Slot::Object(cause));
            }
        }
        object
    }

    // ========================================================================
    // Handles
    // ========================================================================

    pub(crate) fn new_handle(&mut self, object: ObjectId, kind: HandleKind) -> RawObject {
        let id = self.next_handle;
        self.next_handle = id.saturating_add(1);
        self.handles.insert(
            id.get(),
            Handle {
                object: Some(object),
                kind,
            },
        );
        RawObject::from_nonzero(id)
    }

    pub(crate) fn handle(&self, raw: RawObject) -> Option<&Handle> {
        self.handles.get(&raw.as_raw())
    }

    /// Object behind a handle; `None` for unknown handles and cleared weaks
    pub(crate) fn deref(&self, raw: RawObject) -> Option<ObjectId> {
        self.handle(raw)?.object
    }

    /// Remove a handle of the expected kind; false if the handle was not valid
    pub(crate) fn delete_handle(&mut self, raw: RawObject, global: bool, weak: bool) -> bool {
        let matches = match self.handles.get(&raw.as_raw()) {
            Some(h) => match h.kind {
                HandleKind::Local(_) => !global && !weak,
                HandleKind::Global => global,
                HandleKind::Weak => weak,
            },
            None => false,
        };
        if matches {
            self.handles.remove(&raw.as_raw());
        }
        matches
    }

    pub(crate) fn drop_env_locals(&mut self, env: usize) {
        self.handles.retain(|_, h| h.kind != HandleKind::Local(env));
    }

    pub(crate) fn handle_counts(&self, env: Option<usize>) -> HandleCounts {
        let mut counts = HandleCounts::default();
        for handle in self.handles.values() {
            match handle.kind {
                HandleKind::Local(owner) if env.map_or(true, |e| e == owner) => counts.locals += 1,
                HandleKind::Local(_) => {}
                HandleKind::Global => counts.globals += 1,
                HandleKind::Weak => counts.weaks += 1,
            }
        }
        counts
    }

    // ========================================================================
    // Environments
    // ========================================================================

    pub(crate) fn add_env(&mut self, thread: ThreadId, name: &str, daemon: bool) -> usize {
        let id = self.next_env;
        self.next_env += 1;
        self.envs.insert(
            id,
            EnvState {
                thread,
                name: name.to_string(),
                daemon,
                runtime_owned: false,
                pending: None,
            },
        );
        self.threads.insert(thread, id);
        id
    }

    pub(crate) fn remove_env(&mut self, env: usize) -> Option<EnvState> {
        let state = self.envs.remove(&env)?;
        self.threads.remove(&state.thread);
        self.drop_env_locals(env);
        Some(state)
    }

    pub(crate) fn pending(&self, env: usize) -> Option<ObjectId> {
        self.envs.get(&env).and_then(|e| e.pending)
    }

    pub(crate) fn set_pending(&mut self, env: usize, exception: Option<ObjectId>) {
        if let Some(state) = self.envs.get_mut(&env) {
            state.pending = exception;
        }
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Mark from strong handles, statics, class objects and pending exceptions,
    /// then sweep; weak handles to swept objects are cleared
    pub(crate) fn collect(&mut self, pinned: &[ObjectId]) -> usize {
        let mut stack: Vec<ObjectId> = pinned.to_vec();
        stack.extend(
            self.handles
                .values()
                .filter(|h| h.kind != HandleKind::Weak)
                .filter_map(|h| h.object),
        );
        stack.extend(self.statics.values().filter_map(Slot::object));
        stack.extend(self.classes.iter().map(|c| c.object));
        stack.extend(self.envs.values().filter_map(|e| e.pending));

        let mut marked: HashSet<ObjectId> = HashSet::new();
        while let Some(id) = stack.pop() {
            if !marked.insert(id) {
                continue;
            }
            match self.object(id).map(|o| &o.data) {
                Some(ObjectData::Plain(values)) => stack.extend(values.values().filter_map(Slot::object)),
                Some(ObjectData::References(_, elements)) => stack.extend(elements.iter().flatten().copied()),
                _ => {}
            }
        }

        let before = self.objects.len();
        self.objects.retain(|id, _| marked.contains(&ObjectId(*id)));
        for handle in self.handles.values_mut() {
            if handle.object.map_or(false, |o| !marked.contains(&o)) {
                handle.object = None;
            }
        }
        before - self.objects.len()
    }

    // ========================================================================
    // Wire conversion
    // ========================================================================

    /// Wire value for a script slot; objects get a new local handle
    pub(crate) fn to_wire(&mut self, slot: Slot, ty: WireType, env: usize) -> WireValue {
        match (slot, ty) {
            (Slot::Boolean(b), WireType::Boolean) => WireValue::Boolean(u8::from(b)),
            (Slot::Byte(v), WireType::Byte) => WireValue::Byte(v),
            (Slot::Char(v), WireType::Char) => WireValue::Char(v),
            (Slot::Short(v), WireType::Short) => WireValue::Short(v),
            (Slot::Int(v), WireType::Int) => WireValue::Int(v),
            (Slot::Long(v), WireType::Long) => WireValue::Long(v),
            (Slot::Float(v), WireType::Float) => WireValue::Float(v),
            (Slot::Double(v), WireType::Double) => WireValue::Double(v),
            (Slot::Object(id), WireType::Object) => WireValue::Object(Some(self.new_handle(id, HandleKind::Local(env)))),
            (_, ty) => ty.zero(),
        }
    }

    /// Script slot for a wire value; `None` if it names an invalid handle
    pub(crate) fn from_wire(&self, value: WireValue) -> Option<Slot> {
        Some(match value {
            WireValue::Void => Slot::Void,
            WireValue::Boolean(b) => Slot::Boolean(b != 0),
            WireValue::Byte(v) => Slot::Byte(v),
            WireValue::Char(v) => Slot::Char(v),
            WireValue::Short(v) => Slot::Short(v),
            WireValue::Int(v) => Slot::Int(v),
            WireValue::Long(v) => Slot::Long(v),
            WireValue::Float(v) => Slot::Float(v),
            WireValue::Double(v) => Slot::Double(v),
            WireValue::Object(None) => Slot::Null,
            WireValue::Object(Some(raw)) => Slot::Object(self.deref(raw)?),
        })
    }
}
