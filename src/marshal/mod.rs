//! Value marshaling between native values and wire values
//!
//! Design: conversions are exact. An `Int` is accepted only where `I` is
//! declared; there is no silent widening, narrowing or boxing. The single
//! exception is text, which becomes a new managed string wherever a string,
//! `CharSequence` or `Object` is expected.


use crate::backend::{RawObject, WireValue};
use crate::error::{BridgeError, BridgeResult};
use crate::refs::{ObjectReference, RefScope};
use crate::runtime::EnvironmentHandle;
use crate::signature::{JavaType, STRING_CLASS};
use smallvec::SmallVec;

/// Transient references created while marshaling one call's arguments
pub(crate) type Transients = SmallVec<[ObjectReference; 4]>;

/// A native-side value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Null,
    Boolean(bool),
    Byte(i8),
    /// UTF-16 code unit
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Object(ObjectReference),
}

impl Value {
    /// Name used in mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Char(_) => "char",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Text(_) => "text",
            Self::Object(_) => "object",
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectReference> {
        match self {
            Self::Object(r) => Some(r),
            _ => None,
        }
    }

    /// Checked conversion of a `Char` code unit
    pub fn as_char(&self) -> Option<char> {
        match self {
            Self::Char(unit) => char::from_u32(u32::from(*unit)),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Text,
    ObjectReference => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Void
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// Environment operations
// ============================================================================

impl EnvironmentHandle {
    /// Convert a native value for a parameter declared as `expected`
    ///
    /// Text becomes a managed string tracked as a local of the current frame.
    pub fn to_managed(&self, value: &Value, expected: &JavaType) -> BridgeResult<WireValue> {
        self.ensure_usable()?;
        let mut transients = Transients::new();
        self.marshal_arg(value, expected, &mut transients)
    }

    /// Convert a borrowed wire value; the caller keeps ownership of any handle in it
    pub fn from_managed(&self, wire: WireValue, expected: &JavaType) -> BridgeResult<Value> {
        self.ensure_usable()?;
        check_wire(&wire, expected)?;

        match wire {
            WireValue::Object(None) => Ok(Value::Null),
            WireValue::Object(Some(raw)) if expected.is_string() => Ok(Value::Text(self.text_from_raw(raw)?)),
            WireValue::Object(Some(raw)) => {
                let local = self
                    .backend()
                    .new_local_ref(self.raw(), raw)
                    .ok_or_else(|| BridgeError::type_mismatch(expected, "collected object"))?;
                Ok(Value::Object(self.track(local, RefScope::Local)))
            }
            primitive => Ok(primitive_value(primitive)),
        }
    }

    /// Create a managed string from text
    pub fn new_text(&self, text: &str) -> BridgeResult<ObjectReference> {
        self.ensure_usable()?;
        let units: Vec<u16> = text.encode_utf16().collect();
        match self.backend().new_string(self.raw(), &units) {
            Some(raw) => Ok(self.track(raw, RefScope::Local)),
            None => Err(self.failure_or(BridgeError::type_mismatch(STRING_CLASS, "unallocatable text"))),
        }
    }

    /// Read a managed string
    pub fn read_text(&self, string: &ObjectReference) -> BridgeResult<String> {
        self.ensure_usable()?;
        let raw = self.raw_object(string)?;
        self.text_from_raw(raw)
    }

    pub(crate) fn text_from_raw(&self, raw: RawObject) -> BridgeResult<String> {
        let units = self
            .backend()
            .string_units(self.raw(), raw)
            .ok_or_else(|| self.failure_or(BridgeError::type_mismatch(STRING_CLASS, "non-string object")))?;
        String::from_utf16(&units).map_err(|_| BridgeError::type_mismatch("well-formed UTF-16", "unpaired surrogate"))
    }

    pub(crate) fn marshal_arg(
        &self,
        value: &Value,
        expected: &JavaType,
        transients: &mut Transients,
    ) -> BridgeResult<WireValue> {
        let wire = match (value, expected) {
            (Value::Boolean(b), JavaType::Boolean) => WireValue::Boolean(u8::from(*b)),
            (Value::Byte(v), JavaType::Byte) => WireValue::Byte(*v),
            (Value::Char(v), JavaType::Char) => WireValue::Char(*v),
            (Value::Short(v), JavaType::Short) => WireValue::Short(*v),
            (Value::Int(v), JavaType::Int) => WireValue::Int(*v),
            (Value::Long(v), JavaType::Long) => WireValue::Long(*v),
            (Value::Float(v), JavaType::Float) => WireValue::Float(*v),
            (Value::Double(v), JavaType::Double) => WireValue::Double(*v),
            (Value::Null, ty) if ty.is_reference() => WireValue::Object(None),
            (Value::Object(r), ty) if ty.is_reference() => WireValue::Object(Some(self.raw_object(r)?)),
            (Value::Text(text), ty) if ty.accepts_text() => {
                let string = self.new_text(text)?;
                let raw = self.raw_object(&string)?;
                transients.push(string);
                WireValue::Object(Some(raw))
            }
            (value, ty) => return Err(BridgeError::type_mismatch(ty, value.type_name())),
        };
        Ok(wire)
    }

    /// Convert a value the runtime handed over; owns any returned local handle
    pub(crate) fn take_return(&self, wire: WireValue, expected: &JavaType) -> BridgeResult<Value> {
        if let Err(e) = check_wire(&wire, expected) {
            if let WireValue::Object(Some(raw)) = wire {
                self.backend().delete_local_ref(self.raw(), raw);
            }
            return Err(e);
        }

        match wire {
            WireValue::Object(None) => Ok(Value::Null),
            WireValue::Object(Some(raw)) => {
                let local = self.track(raw, RefScope::Local);
                if !expected.is_string() {
                    return Ok(Value::Object(local));
                }
                let text = self.text_from_raw(raw);
                self.release(&local);
                text.map(Value::Text)
            }
            primitive => Ok(primitive_value(primitive)),
        }
    }

    /// Materialized pending exception if there is one, otherwise `fallback`
    pub(crate) fn failure_or(&self, fallback: BridgeError) -> BridgeError {
        if self.backend().exception_check(self.raw()) {
            self.materialize_pending()
        } else {
            fallback
        }
    }
}

fn check_wire(wire: &WireValue, expected: &JavaType) -> BridgeResult<()> {
    if wire.wire_type() == expected.wire_type() {
        Ok(())
    } else {
        Err(BridgeError::type_mismatch(expected, wire.wire_type().managed_name()))
    }
}

fn primitive_value(wire: WireValue) -> Value {
    match wire {
        WireValue::Void => Value::Void,
        WireValue::Boolean(b) => Value::Boolean(b != 0),
        WireValue::Byte(v) => Value::Byte(v),
        WireValue::Char(v) => Value::Char(v),
        WireValue::Short(v) => Value::Short(v),
        WireValue::Int(v) => Value::Int(v),
        WireValue::Long(v) => Value::Long(v),
        WireValue::Float(v) => Value::Float(v),
        WireValue::Double(v) => Value::Double(v),
        WireValue::Object(None) => Value::Null,
        // Object handles are tracked by the callers before reaching here
        WireValue::Object(Some(_)) => Value::Null,
    }
}
