//! Type descriptors and method signatures
//!
//! Renders and parses the runtime's descriptor grammar:
//! `Z B C S I J F D V`, `Lpkg/Name;`, `[T` and `(params)ret`.

use crate::backend::WireType;
use crate::error::{BridgeError, BridgeResult};
use std::fmt;
use std::str::FromStr;

/// A managed-side type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JavaType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    /// Class type, slashed internal name
    Object(String),
    Array(Box<JavaType>),
}

pub const STRING_CLASS: &str = "java/lang/String";
pub const OBJECT_CLASS: &str = "java/lang/Object";

impl JavaType {
    /// Class type from a dotted or slashed name
    pub fn object(name: &str) -> Self {
        Self::Object(normalize_class_name(name))
    }

    pub fn string() -> Self {
        Self::Object(STRING_CLASS.to_string())
    }

    pub fn array(element: JavaType) -> Self {
        Self::Array(Box::new(element))
    }

    /// Wire tag used to carry values of this type
    pub const fn wire_type(&self) -> WireType {
        match self {
            Self::Boolean => WireType::Boolean,
            Self::Byte => WireType::Byte,
            Self::Char => WireType::Char,
            Self::Short => WireType::Short,
            Self::Int => WireType::Int,
            Self::Long => WireType::Long,
            Self::Float => WireType::Float,
            Self::Double => WireType::Double,
            Self::Void => WireType::Void,
            Self::Object(_) | Self::Array(_) => WireType::Object,
        }
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::Object(name) if name == STRING_CLASS)
    }

    /// Whether a text value may be passed where this type is expected
    pub fn accepts_text(&self) -> bool {
        matches!(self, Self::Object(name)
            if name == STRING_CLASS || name == OBJECT_CLASS || name == "java/lang/CharSequence")
    }

    pub fn parse(descriptor: &str) -> BridgeResult<Self> {
        let bytes = descriptor.as_bytes();
        let mut pos = 0;
        let ty = parse_type(bytes, &mut pos).map_err(|reason| invalid(descriptor, reason))?;
        if pos != bytes.len() {
            return Err(invalid(descriptor, "trailing characters"));
        }
        if ty == JavaType::Void {
            return Err(invalid(descriptor, "void is only valid as a return type"));
        }
        Ok(ty)
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("Z"),
            Self::Byte => f.write_str("B"),
            Self::Char => f.write_str("C"),
            Self::Short => f.write_str("S"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Float => f.write_str("F"),
            Self::Double => f.write_str("D"),
            Self::Void => f.write_str("V"),
            Self::Object(name) => write!(f, "L{};", name),
            Self::Array(element) => write!(f, "[{}", element),
        }
    }
}

impl FromStr for JavaType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parameter and return types of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub params: Vec<JavaType>,
    pub ret: JavaType,
}

impl MethodSignature {
    pub fn new(params: Vec<JavaType>, ret: JavaType) -> Self {
        Self { params, ret }
    }

    pub fn parse(descriptor: &str) -> BridgeResult<Self> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(invalid(descriptor, "expected `(`"));
        }

        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(b'V') => return Err(invalid(descriptor, "void parameter")),
                Some(_) => {
                    params.push(parse_type(bytes, &mut pos).map_err(|r| invalid(descriptor, r))?)
                }
                None => return Err(invalid(descriptor, "unterminated parameter list")),
            }
        }

        let ret = parse_type(bytes, &mut pos).map_err(|r| invalid(descriptor, r))?;
        if pos != bytes.len() {
            return Err(invalid(descriptor, "trailing characters"));
        }

        Ok(Self { params, ret })
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, "){}", self.ret)
    }
}

impl FromStr for MethodSignature {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Convert `java.lang.String` or `Ljava/lang/String;` into `java/lang/String`
pub fn normalize_class_name(name: &str) -> String {
    let name = name.trim();
    let name = name
        .strip_prefix('L')
        .and_then(|n| n.strip_suffix(';'))
        .unwrap_or(name);
    name.replace('.', "/")
}

/// Deepest array type a class file can describe
const MAX_ARRAY_DIMENSIONS: usize = 255;

fn parse_type(bytes: &[u8], pos: &mut usize) -> Result<JavaType, &'static str> {
    let tag = *bytes.get(*pos).ok_or("unexpected end of descriptor")?;
    *pos += 1;

    let ty = match tag {
        b'Z' => JavaType::Boolean,
        b'B' => JavaType::Byte,
        b'C' => JavaType::Char,
        b'S' => JavaType::Short,
        b'I' => JavaType::Int,
        b'J' => JavaType::Long,
        b'F' => JavaType::Float,
        b'D' => JavaType::Double,
        b'V' => JavaType::Void,
        b'L' => {
            let start = *pos;
            let len = bytes[start..]
                .iter()
                .position(|&b| b == b';')
                .ok_or("unterminated class name")?;
            if len == 0 {
                return Err("empty class name");
            }
            *pos = start + len + 1;
            let name = std::str::from_utf8(&bytes[start..start + len]).map_err(|_| "class name is not UTF-8")?;
            JavaType::Object(name.to_string())
        }
        b'[' => {
            let mut dims = 1;
            while bytes.get(*pos) == Some(&b'[') {
                dims += 1;
                *pos += 1;
            }
            if dims > MAX_ARRAY_DIMENSIONS {
                return Err("more than 255 array dimensions");
            }
            let element = parse_type(bytes, pos)?;
            if element == JavaType::Void {
                return Err("array of void");
            }
            (0..dims).fold(element, |inner, _| JavaType::Array(Box::new(inner)))
        }
        _ => return Err("unknown type tag"),
    };

    Ok(ty)
}

fn invalid(descriptor: &str, reason: &str) -> BridgeError {
    BridgeError::InvalidSignature {
        signature: descriptor.to_string(),
        reason: reason.to_string(),
    }
}
