use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The argument is not of an accepted type (or has the wrong arity).
    Type,
    /// The argument has the right type but falls outside its domain.
    Value,
}

/// Errors raised while validating transform constructor arguments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Argument type is not among the accepted types.
    #[error("Argument {name} with value {value} is not of type {expected}.")]
    WrongType {
        name: String,
        value: String,
        expected: String,
    },

    /// A composite argument has the wrong number of elements.
    #[error("{name} should be {expected}, got a sequence of length {got}.")]
    WrongArity {
        name: String,
        expected: String,
        got: usize,
    },

    /// A numeric argument falls outside its closed interval.
    #[error("Input {name} is not within the required interval of [{min}, {max}], got {value}.")]
    OutOfRange {
        name: String,
        value: String,
        min: String,
        max: String,
    },

    /// A word list repeats a word.
    #[error("{name} contains duplicate word: {word}.")]
    DuplicateWord { name: String, word: String },

    /// The word list and the special tokens share words.
    #[error("special_tokens and word_list contain duplicate word: {words:?}.")]
    OverlappingWords { words: BTreeSet<String> },

    /// Two sequences that must be the same length are not.
    #[error("Length of {left} ({left_len}) and {right} ({right_len}) must be equal.")]
    LengthMismatch {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },

    /// A (low, high) pair is not ordered.
    #[error("{name} should be in (min, max) format, got ({low}, {high}).")]
    Unordered {
        name: String,
        low: String,
        high: String,
    },

    /// A mandatory value was passed as the unset sentinel.
    #[error("{name} is not provided.")]
    Missing { name: String },

    /// Domain violation that does not fit the structured variants.
    #[error("{name}: {reason}")]
    InvalidValue { name: String, reason: String },

    /// Type violation that does not fit the structured variants.
    #[error("{name}: {reason}")]
    InvalidType { name: String, reason: String },

    /// A required constructor parameter was neither passed nor defaulted.
    #[error("missing a required argument: '{name}'")]
    MissingArgument { name: String },

    /// A keyword does not name any constructor parameter.
    #[error("got an unexpected keyword argument '{name}'")]
    UnexpectedArgument { name: String },

    /// A parameter was passed both positionally and by keyword.
    #[error("multiple values for argument '{name}'")]
    DuplicateArgument { name: String },

    /// More positional arguments than the constructor declares.
    #[error("too many positional arguments: expected at most {expected}, got {got}")]
    TooManyPositional { expected: usize, got: usize },

    /// The operation name is not known to the dispatcher.
    #[error("unknown operation: {0:?}")]
    UnknownOperation(String),
}

impl ValidationError {
    /// Returns whether this is a type-kind or value-kind failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongType { .. }
            | Self::WrongArity { .. }
            | Self::InvalidType { .. }
            | Self::MissingArgument { .. }
            | Self::UnexpectedArgument { .. }
            | Self::DuplicateArgument { .. }
            | Self::TooManyPositional { .. } => ErrorKind::Type,
            Self::OutOfRange { .. }
            | Self::DuplicateWord { .. }
            | Self::OverlappingWords { .. }
            | Self::LengthMismatch { .. }
            | Self::Unordered { .. }
            | Self::Missing { .. }
            | Self::InvalidValue { .. }
            | Self::UnknownOperation(_) => ErrorKind::Value,
        }
    }

    /// Name of the offending parameter, when the failure concerns one.
    #[must_use]
    pub fn param(&self) -> Option<&str> {
        match self {
            Self::WrongType { name, .. }
            | Self::WrongArity { name, .. }
            | Self::OutOfRange { name, .. }
            | Self::DuplicateWord { name, .. }
            | Self::Unordered { name, .. }
            | Self::Missing { name }
            | Self::InvalidValue { name, .. }
            | Self::InvalidType { name, .. }
            | Self::MissingArgument { name }
            | Self::UnexpectedArgument { name }
            | Self::DuplicateArgument { name } => Some(name),
            Self::LengthMismatch { left, .. } => Some(left),
            Self::OverlappingWords { .. }
            | Self::TooManyPositional { .. }
            | Self::UnknownOperation(_) => None,
        }
    }

    pub(crate) fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_type(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidType {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = ValidationError::DuplicateWord {
            name: "word_list".into(),
            word: "a".into(),
        };
        assert_eq!(err.to_string(), "word_list contains duplicate word: a.");

        let err = ValidationError::OutOfRange {
            name: "prob".into(),
            value: "1.5".into(),
            min: "0".into(),
            max: "1".into(),
        };
        assert!(err.to_string().contains("[0, 1]"));
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn kinds_follow_taxonomy() {
        let arity = ValidationError::WrongArity {
            name: "size".into(),
            expected: "of length 2".into(),
            got: 3,
        };
        assert_eq!(arity.kind(), ErrorKind::Type);
        assert_eq!(arity.param(), Some("size"));

        let overlap = ValidationError::OverlappingWords {
            words: BTreeSet::from(["b".to_string()]),
        };
        assert_eq!(overlap.kind(), ErrorKind::Value);
        assert_eq!(overlap.param(), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ValidationError>();
    }
}
