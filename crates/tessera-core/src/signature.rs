//! # Constructor Signatures
//!
//! Binds positional and keyword arguments to the declared parameters of a
//! transform constructor, filling in defaults the way a call would.

use crate::error::{Result, ValidationError};
use crate::value::ArgValue;

static UNSET: ArgValue = ArgValue::None;

/// One declared constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: &'static str,
    /// `None` means the parameter is required.
    pub default: Option<ArgValue>,
}

/// Ordered parameter list of a constructor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter without a default.
    #[must_use]
    pub fn required(mut self, name: &'static str) -> Self {
        self.params.push(Param {
            name,
            default: None,
        });
        self
    }

    /// Appends a parameter with a default value.
    #[must_use]
    pub fn optional(mut self, name: &'static str, default: impl Into<ArgValue>) -> Self {
        self.params.push(Param {
            name,
            default: Some(default.into()),
        });
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Matches arguments against the parameter list.
    ///
    /// Positional values fill parameters in declaration order, keywords are
    /// matched by name, and anything left falls back to its default.
    pub fn bind(
        &self,
        positional: Vec<ArgValue>,
        keyword: Vec<(String, ArgValue)>,
    ) -> Result<BoundArgs> {
        if positional.len() > self.params.len() {
            return Err(ValidationError::TooManyPositional {
                expected: self.params.len(),
                got: positional.len(),
            });
        }

        let mut slots: Vec<Option<ArgValue>> = vec![None; self.params.len()];
        for (slot, value) in slots.iter_mut().zip(positional) {
            *slot = Some(value);
        }

        for (name, value) in keyword {
            let idx = self
                .params
                .iter()
                .position(|p| p.name == name)
                .ok_or_else(|| ValidationError::UnexpectedArgument { name: name.clone() })?;
            if slots[idx].is_some() {
                return Err(ValidationError::DuplicateArgument { name });
            }
            slots[idx] = Some(value);
        }

        let entries = self
            .params
            .iter()
            .zip(slots)
            .map(|(param, slot)| match slot.or_else(|| param.default.clone()) {
                Some(value) => Ok((param.name, value)),
                None => Err(ValidationError::MissingArgument {
                    name: param.name.to_string(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BoundArgs { entries })
    }
}

/// Arguments bound to parameter names, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    entries: Vec<(&'static str, ArgValue)>,
}

impl BoundArgs {
    /// Value bound to `name`, or the unset sentinel if there is none.
    pub fn get(&self, name: &str) -> &ArgValue {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(&UNSET, |(_, v)| v)
    }

    /// Replaces the value bound to an existing parameter.
    pub(crate) fn set(&mut self, name: &str, value: ArgValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ArgValue)> + '_ {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sig() -> Signature {
        Signature::new()
            .required("size")
            .optional("padding", ArgValue::None)
            .optional("pad_if_needed", false)
    }

    #[test]
    fn positional_then_defaults() {
        let bound = sig().bind(vec![32.into()], vec![]).unwrap();
        assert_eq!(bound.get("size"), &ArgValue::Int(32));
        assert_eq!(bound.get("padding"), &ArgValue::None);
        assert_eq!(bound.get("pad_if_needed"), &ArgValue::Bool(false));
        assert_eq!(bound.len(), 3);
    }

    #[test]
    fn keywords_match_by_name() {
        let bound = sig()
            .bind(vec![], vec![("size".into(), 8.into()), ("pad_if_needed".into(), true.into())])
            .unwrap();
        assert_eq!(bound.get("size"), &ArgValue::Int(8));
        assert_eq!(bound.get("pad_if_needed"), &ArgValue::Bool(true));
    }

    #[test]
    fn missing_required_argument() {
        let err = sig().bind(vec![], vec![]).unwrap_err();
        assert_eq!(err, ValidationError::MissingArgument { name: "size".into() });
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn unexpected_and_duplicate_keywords() {
        let err = sig()
            .bind(vec![1.into()], vec![("fill".into(), 0.into())])
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedArgument { .. }));

        let err = sig()
            .bind(vec![1.into()], vec![("size".into(), 2.into())])
            .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateArgument { .. }));
    }

    #[test]
    fn too_many_positional() {
        let err = sig()
            .bind(vec![1.into(), 2.into(), false.into(), 4.into()], vec![])
            .unwrap_err();
        assert_eq!(err, ValidationError::TooManyPositional { expected: 3, got: 4 });
    }

    #[test]
    fn unknown_name_reads_as_unset() {
        let bound = sig().bind(vec![1.into()], vec![]).unwrap();
        assert!(bound.get("nope").is_none());
    }
}
