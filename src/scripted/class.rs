//! Class definitions for the scripted runtime

use super::heap::{HandleKind, ObjectData, ObjectId, Slot};
use super::ScriptedRuntime;
use crate::backend::RawObject;
use crate::signature::normalize_class_name;
use std::fmt;
use std::sync::Arc;

/// Body of a scripted method or constructor
pub type Body = Arc<dyn Fn(&mut Call<'_>) -> Result<Slot, Thrown> + Send + Sync>;

/// Exception raised by a script body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    /// Slashed or dotted class name
    pub class: String,
    pub message: Option<String>,
    pub cause: Option<Box<Thrown>>,
}

impl Thrown {
    pub fn new(class: &str, message: impl Into<String>) -> Self {
        Self {
            class: normalize_class_name(class),
            message: Some(message.into()),
            cause: None,
        }
    }

    /// Exception without a message
    pub fn bare(class: &str) -> Self {
        Self {
            class: normalize_class_name(class),
            message: None,
            cause: None,
        }
    }

    pub fn caused_by(mut self, cause: Thrown) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {}", self.class, m),
            None => f.write_str(&self.class),
        }
    }
}

/// Context handed to a running script body
pub struct Call<'a> {
    pub(crate) runtime: &'a ScriptedRuntime,
    pub(crate) env: usize,
    pub(crate) this: Option<ObjectId>,
    pub(crate) args: Vec<Slot>,
}

impl Call<'_> {
    /// Receiver; `None` in static methods
    pub fn this(&self) -> Option<ObjectId> {
        self.this
    }

    pub fn args(&self) -> &[Slot] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Slot {
        self.args.get(index).copied().unwrap_or(Slot::Void)
    }

    pub fn int(&self, index: usize) -> Option<i32> {
        self.arg(index).as_int()
    }

    pub fn long(&self, index: usize) -> Option<i64> {
        self.arg(index).as_long()
    }

    /// Argument as text, if it is a string object
    pub fn string(&self, index: usize) -> Option<String> {
        self.text(self.arg(index))
    }

    pub fn text(&self, slot: Slot) -> Option<String> {
        let id = slot.object()?;
        let heap = self.runtime.heap.lock();
        heap.string_units(id).map(String::from_utf16_lossy)
    }

    pub fn new_string(&self, text: &str) -> Slot {
        self.string_from_units(text.encode_utf16().collect())
    }

    /// String object from raw UTF-16, unpaired surrogates included
    pub fn string_from_units(&self, units: Vec<u16>) -> Slot {
        Slot::Object(self.runtime.heap.lock().new_string(units))
    }

    /// Turn the receiver under construction into a string object
    fn become_string(&self, units: Vec<u16>) {
        let Some(this) = self.this else { return };
        if let Some(object) = self.runtime.heap.lock().object_mut(this) {
            object.data = ObjectData::Str(units);
        }
    }

    /// Local handle for an object slot, as a native method receives its arguments
    pub fn local_ref(&self, slot: Slot) -> Option<RawObject> {
        let id = slot.object()?;
        Some(self.runtime.heap.lock().new_handle(id, HandleKind::Local(self.env)))
    }

    /// Write a line to the captured console
    pub fn print(&self, line: impl Into<String>) {
        self.runtime.output.lock().push(line.into());
    }

    /// Slashed name of an object's class
    pub fn class_name(&self, object: ObjectId) -> Option<String> {
        let heap = self.runtime.heap.lock();
        let class = heap.object(object)?.class;
        Some(heap.class_name(class).to_string())
    }

    pub fn field(&self, object: ObjectId, name: &str) -> Slot {
        let heap = self.runtime.heap.lock();
        let Some(class) = heap.object(object).map(|o| o.class) else {
            return Slot::Null;
        };
        match heap.field_by_name(class, name, false) {
            Some(field) => heap.instance_value(object, field),
            None => Slot::Null,
        }
    }

    pub fn set_field(&self, object: ObjectId, name: &str, value: Slot) {
        let mut heap = self.runtime.heap.lock();
        let Some(class) = heap.object(object).map(|o| o.class) else {
            return;
        };
        if let Some(field) = heap.field_by_name(class, name, false) {
            heap.set_instance_value(object, field, value);
        }
    }

    pub fn static_field(&self, class: &str, name: &str) -> Slot {
        let heap = self.runtime.heap.lock();
        heap.class_id(&normalize_class_name(class))
            .and_then(|c| heap.field_by_name(c, name, true))
            .map_or(Slot::Null, |field| heap.static_value(field))
    }

    pub fn set_static_field(&self, class: &str, name: &str, value: Slot) {
        let mut heap = self.runtime.heap.lock();
        let field = heap
            .class_id(&normalize_class_name(class))
            .and_then(|c| heap.field_by_name(c, name, true));
        if let Some(field) = field {
            heap.set_static(field, value);
        }
    }

    /// Call an instance method on `object` from inside a body
    pub fn invoke(&self, object: ObjectId, name: &str, signature: &str, args: Vec<Slot>) -> Result<Slot, Thrown> {
        let body = {
            let heap = self.runtime.heap.lock();
            let class = heap
                .object(object)
                .map(|o| o.class)
                .ok_or_else(|| Thrown::bare("java/lang/NullPointerException"))?;
            let method = heap
                .find_method(class, name, signature, false)
                .ok_or_else(|| Thrown::new("java/lang/NoSuchMethodError", name))?;
            Arc::clone(&heap.methods[method].body)
        };
        self.runtime.run(&body, self.env, Some(object), args)
    }
}

// ============================================================================
// Builder
// ============================================================================

pub(crate) struct MethodSpec {
    pub(crate) name: String,
    pub(crate) signature: String,
    pub(crate) is_static: bool,
    pub(crate) body: Body,
}

pub(crate) struct FieldSpec {
    pub(crate) name: String,
    pub(crate) signature: String,
    pub(crate) is_static: bool,
    pub(crate) initial: Slot,
}

/// Declarative class definition
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) methods: Vec<MethodSpec>,
    pub(crate) fields: Vec<FieldSpec>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_class_name(name),
            super_name: None,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Superclass; `java/lang/Object` when not set
    pub fn extends(mut self, name: &str) -> Self {
        self.super_name = Some(normalize_class_name(name));
        self
    }

    pub fn constructor<F>(self, signature: &str, body: F) -> Self
    where
        F: Fn(&mut Call<'_>) -> Result<Slot, Thrown> + Send + Sync + 'static,
    {
        self.with_method("<init>", signature, false, Arc::new(body))
    }

    pub fn method<F>(self, name: &str, signature: &str, body: F) -> Self
    where
        F: Fn(&mut Call<'_>) -> Result<Slot, Thrown> + Send + Sync + 'static,
    {
        self.with_method(name, signature, false, Arc::new(body))
    }

    pub fn static_method<F>(self, name: &str, signature: &str, body: F) -> Self
    where
        F: Fn(&mut Call<'_>) -> Result<Slot, Thrown> + Send + Sync + 'static,
    {
        self.with_method(name, signature, true, Arc::new(body))
    }

    pub fn field(mut self, name: &str, signature: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            signature: signature.to_string(),
            is_static: false,
            initial: Slot::Void,
        });
        self
    }

    pub fn static_field(mut self, name: &str, signature: &str, initial: Slot) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            signature: signature.to_string(),
            is_static: true,
            initial,
        });
        self
    }

    fn with_method(mut self, name: &str, signature: &str, is_static: bool, body: Body) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            signature: signature.to_string(),
            is_static,
            body,
        });
        self
    }
}

// ============================================================================
// Bootstrap classes
// ============================================================================

const THROWABLE: &str = "java/lang/Throwable";

/// Subclass-only exception types: (name, superclass)
const EXCEPTION_TYPES: &[(&str, &str)] = &[
    ("java/lang/Exception", THROWABLE),
    ("java/lang/Error", THROWABLE),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
    ("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
];

pub(crate) fn bootstrap_classes() -> Vec<ClassBuilder> {
    let mut classes = vec![
        ClassBuilder::new("java/lang/Object")
            .constructor("()V", |_| Ok(Slot::Void))
            .method("toString", "()Ljava/lang/String;", |call| {
                let this = call.this().map_or(0, |id| id.0);
                let name = call.this().and_then(|id| call.class_name(id)).unwrap_or_default();
                Ok(call.new_string(&format!("{}@{:x}", name.replace('/', "."), this)))
            }),
        ClassBuilder::new("java/lang/Class").method("getName", "()Ljava/lang/String;", |call| {
            let name = call
                .this()
                .and_then(|id| call.runtime.described_class_name(id))
                .ok_or_else(|| Thrown::bare("java/lang/NullPointerException"))?;
            Ok(call.new_string(&name.replace('/', ".")))
        }),
        ClassBuilder::new("java/lang/String")
            .constructor("()V", |call| {
                call.become_string(Vec::new());
                Ok(Slot::Void)
            })
            .constructor("(Ljava/lang/String;)V", |call| {
                let original = call.string(0).ok_or_else(|| Thrown::bare("java/lang/NullPointerException"))?;
                call.become_string(original.encode_utf16().collect());
                Ok(Slot::Void)
            })
            .method("length", "()I", |call| {
                let len = call.this().and_then(|id| call.text(Slot::Object(id))).map_or(0, |s| s.encode_utf16().count());
                Ok(Slot::Int(i32::try_from(len).unwrap_or(i32::MAX)))
            }),
        ClassBuilder::new(THROWABLE)
            .field("detailMessage", "Ljava/lang/String;")
            .field("cause", "Ljava/lang/Throwable;")
            .constructor("()V", |_| Ok(Slot::Void))
            .constructor("(Ljava/lang/String;)V", |call| {
                if let Some(this) = call.this() {
                    call.set_field(this, "detailMessage", call.arg(0));
                }
                Ok(Slot::Void)
            })
            .constructor("(Ljava/lang/String;Ljava/lang/Throwable;)V", |call| {
                if let Some(this) = call.this() {
                    call.set_field(this, "detailMessage", call.arg(0));
                    call.set_field(this, "cause", call.arg(1));
                }
                Ok(Slot::Void)
            })
            .method("getMessage", "()Ljava/lang/String;", |call| {
                Ok(call.this().map_or(Slot::Null, |this| call.field(this, "detailMessage")))
            })
            .method("getCause", "()Ljava/lang/Throwable;", |call| {
                Ok(call.this().map_or(Slot::Null, |this| call.field(this, "cause")))
            }),
    ];

    classes.extend(
        EXCEPTION_TYPES
            .iter()
            .map(|(name, parent)| ClassBuilder::new(name).extends(parent)),
    );
    classes
}
