//! # Argument Values
//!
//! Dynamic representation of the raw arguments a caller hands to a transform
//! constructor, before any validation has happened.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Interpolation mode tag accepted by resizing and geometric ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inter {
    Nearest,
    Antialias,
    #[serde(alias = "linear")]
    Bilinear,
    #[serde(alias = "cubic")]
    Bicubic,
}

impl fmt::Display for Inter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "Inter.NEAREST"),
            Self::Antialias => write!(f, "Inter.ANTIALIAS"),
            Self::Bilinear => write!(f, "Inter.BILINEAR"),
            Self::Bicubic => write!(f, "Inter.BICUBIC"),
        }
    }
}

/// Border (padding) mode tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Border {
    Constant,
    Edge,
    Reflect,
    Symmetric,
}

impl fmt::Display for Border {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => write!(f, "Border.CONSTANT"),
            Self::Edge => write!(f, "Border.EDGE"),
            Self::Reflect => write!(f, "Border.REFLECT"),
            Self::Symmetric => write!(f, "Border.SYMMETRIC"),
        }
    }
}

/// Element data type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
    String,
}

impl DataType {
    /// Whether the type is an integer or floating-point number type.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Bool | Self::String)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        };
        write!(f, "{name}")
    }
}

/// Where a transform-op object executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpBackend {
    /// Executed by the native tensor engine.
    Native,
    /// Executed as a host-language callable.
    Python,
}

/// A raw constructor argument.
///
/// `None` is the "not supplied" sentinel; optional parameters holding it are
/// skipped by validators.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArgValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<ArgValue>),
    Tuple(Vec<ArgValue>),
    Dict(Vec<(ArgValue, ArgValue)>),
    Inter(Inter),
    Border(Border),
    /// An n-dimensional array; only its shape is inspected.
    Array { shape: Vec<usize> },
    Op(OpBackend),
    Callable,
    DType(DataType),
    /// Handle to an already constructed vocabulary.
    Vocab,
}

/// Type tags used when declaring the accepted types of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    None,
    Bool,
    Int,
    Float,
    /// Any int or float (never a bool).
    Number,
    Str,
    Bytes,
    List,
    Tuple,
    Dict,
    Inter,
    Border,
    Array,
    /// A transform-op object of the given backend.
    Op(OpBackend),
    Callable,
    DType,
    Vocab,
}

impl ArgType {
    /// Whether `value` is an instance of this type.
    #[must_use]
    pub fn matches(self, value: &ArgValue) -> bool {
        match (self, value) {
            (Self::None, ArgValue::None)
            | (Self::Bool, ArgValue::Bool(_))
            | (Self::Int, ArgValue::Int(_))
            | (Self::Float, ArgValue::Float(_))
            | (Self::Number, ArgValue::Int(_) | ArgValue::Float(_))
            | (Self::Str, ArgValue::Str(_))
            | (Self::Bytes, ArgValue::Bytes(_))
            | (Self::List, ArgValue::List(_))
            | (Self::Tuple, ArgValue::Tuple(_))
            | (Self::Dict, ArgValue::Dict(_))
            | (Self::Inter, ArgValue::Inter(_))
            | (Self::Border, ArgValue::Border(_))
            | (Self::Array, ArgValue::Array { .. })
            | (Self::Callable, ArgValue::Callable)
            | (Self::DType, ArgValue::DType(_))
            | (Self::Vocab, ArgValue::Vocab) => true,
            (Self::Op(want), ArgValue::Op(got)) => want == *got,
            _ => false,
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Number => "Number",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Inter => "Inter",
            Self::Border => "Border",
            Self::Array => "ndarray",
            Self::Op(OpBackend::Native) => "TensorOp",
            Self::Op(OpBackend::Python) => "PyOp",
            Self::Callable => "function",
            Self::DType => "Type",
            Self::Vocab => "Vocab",
        };
        write!(f, "{name}")
    }
}

impl ArgValue {
    /// Builds a tuple from any iterator of convertible values.
    pub fn tuple<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ArgValue>,
    {
        Self::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Builds a list from any iterator of convertible values.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ArgValue>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Numeric view of ints and floats. Bools are not numbers here.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[ArgValue]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// The most specific [`ArgType`] describing this value.
    #[must_use]
    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::None => ArgType::None,
            Self::Bool(_) => ArgType::Bool,
            Self::Int(_) => ArgType::Int,
            Self::Float(_) => ArgType::Float,
            Self::Str(_) => ArgType::Str,
            Self::Bytes(_) => ArgType::Bytes,
            Self::List(_) => ArgType::List,
            Self::Tuple(_) => ArgType::Tuple,
            Self::Dict(_) => ArgType::Dict,
            Self::Inter(_) => ArgType::Inter,
            Self::Border(_) => ArgType::Border,
            Self::Array { .. } => ArgType::Array,
            Self::Op(backend) => ArgType::Op(*backend),
            Self::Callable => ArgType::Callable,
            Self::DType(_) => ArgType::DType,
            Self::Vocab => ArgType::Vocab,
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[ArgValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) if s.is_empty() => write!(f, "\"\""),
            Self::Str(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Self::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Self::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Self::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Inter(inter) => write!(f, "{inter}"),
            Self::Border(border) => write!(f, "{border}"),
            Self::Array { shape } => write!(f, "ndarray(shape={shape:?})"),
            Self::Op(OpBackend::Native) => write!(f, "<TensorOp>"),
            Self::Op(OpBackend::Python) => write!(f, "<PyOp>"),
            Self::Callable => write!(f, "<function>"),
            Self::DType(dtype) => write!(f, "{dtype}"),
            Self::Vocab => write!(f, "<Vocab>"),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f32> for ArgValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Inter> for ArgValue {
    fn from(v: Inter) -> Self {
        Self::Inter(v)
    }
}

impl From<Border> for ArgValue {
    fn from(v: Border) -> Self {
        Self::Border(v)
    }
}

impl From<DataType> for ArgValue {
    fn from(v: DataType) -> Self {
        Self::DType(v)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(v: Vec<T>) -> Self {
        Self::list(v)
    }
}

impl<A: Into<ArgValue>, B: Into<ArgValue>> From<(A, B)> for ArgValue {
    fn from((a, b): (A, B)) -> Self {
        Self::Tuple(vec![a.into(), b.into()])
    }
}

impl<A: Into<ArgValue>, B: Into<ArgValue>, C: Into<ArgValue>> From<(A, B, C)> for ArgValue {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self::Tuple(vec![a.into(), b.into(), c.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_not_a_number() {
        assert!(!ArgType::Number.matches(&ArgValue::Bool(true)));
        assert!(!ArgType::Int.matches(&ArgValue::Bool(false)));
        assert!(ArgType::Number.matches(&ArgValue::Int(3)));
        assert!(ArgType::Number.matches(&ArgValue::Float(0.5)));
        assert_eq!(ArgValue::Bool(true).as_f64(), None);
    }

    #[test]
    fn op_type_respects_backend() {
        let native = ArgValue::Op(OpBackend::Native);
        assert!(ArgType::Op(OpBackend::Native).matches(&native));
        assert!(!ArgType::Op(OpBackend::Python).matches(&native));
    }

    #[test]
    fn conversions_build_expected_shapes() {
        assert_eq!(ArgValue::from((1, 2)), ArgValue::Tuple(vec![1.into(), 2.into()]));
        assert_eq!(ArgValue::from(None::<i64>), ArgValue::None);
        assert_eq!(
            ArgValue::from(vec!["a", "b"]),
            ArgValue::List(vec!["a".into(), "b".into()])
        );
        assert_eq!(ArgValue::from((0, 0, 0)).as_seq().map(<[ArgValue]>::len), Some(3));
    }

    #[test]
    fn display_mimics_constructor_repr() {
        assert_eq!(ArgValue::from((1, 2.0)).to_string(), "(1, 2.0)");
        assert_eq!(ArgValue::from(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(ArgValue::Bool(true).to_string(), "True");
        assert_eq!(ArgValue::from("").to_string(), "\"\"");
        assert_eq!(ArgValue::Inter(Inter::Bilinear).to_string(), "Inter.BILINEAR");
    }

    #[test]
    fn numeric_dtypes() {
        assert!(DataType::Int32.is_numeric());
        assert!(DataType::Float16.is_numeric());
        assert!(!DataType::String.is_numeric());
        assert!(!DataType::Bool.is_numeric());
    }

    #[test]
    fn tags_deserialize_from_snake_case() {
        let inter: Inter = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(inter, Inter::Bilinear);
        let border: Border = serde_json::from_str("\"edge\"").unwrap();
        assert_eq!(border, Border::Edge);
        let dtype: DataType = serde_json::from_str("\"uint8\"").unwrap();
        assert_eq!(dtype, DataType::Uint8);
    }
}
