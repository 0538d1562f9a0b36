//! The scalar type system shared by all three encodings.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One of the eight scalar types a PLY property can have.
///
/// The header grammar knows two spellings for each type (`char`/`int8`,
/// `uchar`/`uint8`, ..., `double`/`float64`); both resolve to the same
/// variant. On output the traditional short spelling is emitted. The
/// seventeenth type token, `list`, is not a scalar type but the marker of a
/// list property and is handled by the header parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

/// Width of a scalar value in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarLen {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl ScalarLen {
    pub fn as_usize(self) -> usize {
        self as usize
    }
}

impl ScalarType {
    /// Returns the number of bytes this type occupies on disk.
    pub fn len(self) -> ScalarLen {
        match self {
            ScalarType::Char => ScalarLen::One,
            ScalarType::UChar => ScalarLen::One,
            ScalarType::Short => ScalarLen::Two,
            ScalarType::UShort => ScalarLen::Two,
            ScalarType::Int => ScalarLen::Four,
            ScalarType::UInt => ScalarLen::Four,
            ScalarType::Float => ScalarLen::Four,
            ScalarType::Double => ScalarLen::Eight,
        }
    }

    /// Returns `true` if and only if the type is either `float` or `double`.
    pub fn is_floating_point(self) -> bool {
        self == ScalarType::Float || self == ScalarType::Double
    }

    /// Returns `true` if and only if the type is one of `char`, `short` or
    /// `int`.
    pub fn is_signed_integer(self) -> bool {
        matches!(self, ScalarType::Char | ScalarType::Short | ScalarType::Int)
    }

    /// Returns `true` if and only if the type is one of `uchar`, `ushort` or
    /// `uint`.
    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, ScalarType::UChar | ScalarType::UShort | ScalarType::UInt)
    }

    /// The spelling emitted into headers.
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Char => "char",
            ScalarType::UChar => "uchar",
            ScalarType::Short => "short",
            ScalarType::UShort => "ushort",
            ScalarType::Int => "int",
            ScalarType::UInt => "uint",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "char" | "int8" => Ok(ScalarType::Char),
            "uchar" | "uint8" => Ok(ScalarType::UChar),
            "short" | "int16" => Ok(ScalarType::Short),
            "ushort" | "uint16" => Ok(ScalarType::UShort),
            "int" | "int32" => Ok(ScalarType::Int),
            "uint" | "uint32" => Ok(ScalarType::UInt),
            "float" | "float32" => Ok(ScalarType::Float),
            "double" | "float64" => Ok(ScalarType::Double),
            other => Err(Error::UnknownType(other.to_string())),
        }
    }
}
