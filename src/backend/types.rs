//! Opaque handles and on-the-wire values crossing the native/managed boundary

use std::num::NonZeroUsize;

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// Wrap a raw handle value; zero means null
            #[inline]
            pub fn from_raw(raw: usize) -> Option<Self> {
                NonZeroUsize::new(raw).map(Self)
            }

            #[inline]
            pub const fn from_nonzero(raw: NonZeroUsize) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn as_raw(self) -> usize {
                self.0.get()
            }
        }
    };
}

raw_handle!(
    /// Object handle; whether it is local, global or weak depends on its origin
    RawObject
);
raw_handle!(
    /// Resolved method identifier
    RawMethod
);
raw_handle!(
    /// Resolved field identifier
    RawField
);
raw_handle!(
    /// Per-thread environment pointer
    RawEnv
);

/// How a thread registers with the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    Native,
    Daemon,
}

/// Receiver of an invocation or field access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Instance(RawObject),
    Static(RawObject),
}

/// Wire-level type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object,
}

impl WireType {
    /// Size of the value in bytes on the managed side
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
            Self::Object => core::mem::size_of::<usize>(),
        }
    }

    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Byte | Self::Char | Self::Short | Self::Int | Self::Long)
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    #[inline]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, Self::Void | Self::Object)
    }

    /// Managed-language spelling (for error messages)
    pub const fn managed_name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Object => "object",
        }
    }

    /// Zero value of this type
    pub const fn zero(self) -> WireValue {
        match self {
            Self::Void => WireValue::Void,
            Self::Boolean => WireValue::Boolean(0),
            Self::Byte => WireValue::Byte(0),
            Self::Char => WireValue::Char(0),
            Self::Short => WireValue::Short(0),
            Self::Int => WireValue::Int(0),
            Self::Long => WireValue::Long(0),
            Self::Float => WireValue::Float(0.0),
            Self::Double => WireValue::Double(0.0),
            Self::Object => WireValue::Object(None),
        }
    }
}

/// Value as the managed runtime sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue {
    Void,
    Boolean(u8),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(Option<RawObject>),
}

impl WireValue {
    #[inline]
    pub const fn wire_type(&self) -> WireType {
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
            Self::Object(_) => WireType::Object,
        }
    }

    #[inline]
    pub const fn null() -> Self {
        Self::Object(None)
    }

    #[inline]
    pub fn as_object(&self) -> Option<RawObject> {
        match self {
            Self::Object(o) => *o,
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl Default for WireValue {
    #[inline]
    fn default() -> Self {
        Self::Void
    }
}
