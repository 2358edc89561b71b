//! Leaf type and range checks shared by every validator.

use crate::error::{Result, ValidationError};
use crate::value::{ArgType, ArgValue};

pub const UINT8_MAX: i64 = 255;
pub const INT32_MAX: i64 = 2_147_483_647;
pub const UINT32_MAX: i64 = 4_294_967_295;
/// Largest integer exactly representable by an `f64`.
pub const FLOAT_MAX_INTEGER: i64 = 9_007_199_254_740_992;

fn describe(types: &[ArgType]) -> String {
    let names: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("({})", names.join(", "))
}

fn fmt_bound(bound: f64) -> String {
    if bound == f64::INFINITY {
        "inf".to_string()
    } else if bound == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        bound.to_string()
    }
}

/// Fails with a type error unless `value` matches one of `types`.
pub fn type_check(value: &ArgValue, types: &[ArgType], name: &str) -> Result<()> {
    if types.iter().any(|t| t.matches(value)) {
        Ok(())
    } else {
        Err(ValidationError::WrongType {
            name: name.to_string(),
            value: value.to_string(),
            expected: describe(types),
        })
    }
}

/// Type-checks each element, naming them `name[i]`.
pub fn type_check_each(values: &[ArgValue], types: &[ArgType], name: &str) -> Result<()> {
    values
        .iter()
        .enumerate()
        .try_for_each(|(i, v)| type_check(v, types, &format!("{name}[{i}]")))
}

/// Type-checks elements against an explicit list of names.
pub fn type_check_list(values: &[ArgValue], types: &[ArgType], names: &[String]) -> Result<()> {
    values
        .iter()
        .zip(names)
        .try_for_each(|(v, n)| type_check(v, types, n))
}

/// Checks that a number lies in the closed interval `[min, max]`.
pub fn check_value(value: &ArgValue, (min, max): (f64, f64), name: &str) -> Result<()> {
    let Some(x) = value.as_f64() else {
        return type_check(value, &[ArgType::Number], name);
    };
    if x.is_nan() || x < min || x > max {
        return Err(ValidationError::OutOfRange {
            name: name.to_string(),
            value: value.to_string(),
            min: fmt_bound(min),
            max: fmt_bound(max),
        });
    }
    Ok(())
}

/// Integer in `[0, 255]`.
pub fn check_uint8(value: &ArgValue, name: &str) -> Result<()> {
    type_check(value, &[ArgType::Int], name)?;
    check_value(value, (0.0, UINT8_MAX as f64), name)
}

/// Integer in `[0, 2^32 - 1]`.
pub fn check_uint32(value: &ArgValue, name: &str) -> Result<()> {
    type_check(value, &[ArgType::Int], name)?;
    check_value(value, (0.0, UINT32_MAX as f64), name)
}

/// Number strictly greater than zero.
pub fn check_positive(value: &ArgValue, name: &str) -> Result<()> {
    type_check(value, &[ArgType::Number], name)?;
    match value.as_f64() {
        Some(x) if x > 0.0 => Ok(()),
        _ => Err(ValidationError::invalid_value(
            name,
            format!("must be greater than 0, got {value}"),
        )),
    }
}

/// Non-negative number representable as an `f32`.
pub fn check_pos_float32(value: &ArgValue, name: &str) -> Result<()> {
    check_value(value, (0.0, f64::from(f32::MAX)), name)
}

/// Tuple of exactly two elements.
pub fn check_2tuple(value: &ArgValue, name: &str) -> Result<()> {
    type_check(value, &[ArgType::Tuple], name)?;
    match value.as_seq() {
        Some(items) if items.len() == 2 => Ok(()),
        Some(items) => Err(ValidationError::invalid_value(
            name,
            format!("needs to be a 2-tuple, got a tuple of length {}", items.len()),
        )),
        None => Ok(()),
    }
}

/// Ordered `(low, high)` pair with both ends inside `bounds`.
pub fn check_range(value: &ArgValue, (min, max): (f64, f64), name: &str) -> Result<()> {
    type_check(value, &[ArgType::List, ArgType::Tuple], name)?;
    let items = value.as_seq().unwrap_or_default();
    if items.len() != 2 {
        return Err(ValidationError::WrongArity {
            name: name.to_string(),
            expected: "a (min, max) sequence of length 2".to_string(),
            got: items.len(),
        });
    }
    type_check_each(items, &[ArgType::Number], name)?;
    let (low, high) = (items[0].as_f64(), items[1].as_f64());
    if let (Some(low), Some(high)) = (low, high) {
        if low > high {
            return Err(ValidationError::Unordered {
                name: name.to_string(),
                low: items[0].to_string(),
                high: items[1].to_string(),
            });
        }
    }
    check_value(&items[0], (min, max), &format!("{name}[0]"))?;
    check_value(&items[1], (min, max), &format!("{name}[1]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn type_check_names_the_argument() {
        let err = type_check(&ArgValue::from("x"), &[ArgType::Int], "size").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.param(), Some("size"));
        assert!(err.to_string().contains("(int)"));
    }

    #[test]
    fn bool_rejected_where_int_expected() {
        assert!(type_check(&ArgValue::Bool(true), &[ArgType::Int], "n").is_err());
        assert!(type_check(&ArgValue::Bool(true), &[ArgType::Bool], "n").is_ok());
    }

    #[test]
    fn check_value_is_inclusive() {
        assert!(check_value(&0.0.into(), (0.0, 1.0), "prob").is_ok());
        assert!(check_value(&1.0.into(), (0.0, 1.0), "prob").is_ok());
        let err = check_value(&1.5.into(), (0.0, 1.0), "prob").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn check_value_rejects_nan_and_non_numbers() {
        assert!(check_value(&f64::NAN.into(), (0.0, 1.0), "x").is_err());
        let err = check_value(&"1".into(), (0.0, 1.0), "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn uint_checks() {
        assert!(check_uint8(&255.into(), "fill").is_ok());
        assert!(check_uint8(&256.into(), "fill").is_err());
        assert!(check_uint8(&1.0.into(), "fill").is_err());
        assert!(check_uint32(&UINT32_MAX.into(), "freq").is_ok());
        assert!(check_uint32(&(-1).into(), "freq").is_err());
    }

    #[test]
    fn positive_is_strict() {
        assert!(check_positive(&0.1.into(), "alpha").is_ok());
        let err = check_positive(&0.into(), "alpha").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn two_tuple_requires_tuple_of_two() {
        assert!(check_2tuple(&(1, 2).into(), "center").is_ok());
        assert_eq!(
            check_2tuple(&vec![1, 2].into(), "center").unwrap_err().kind(),
            ErrorKind::Type
        );
        assert_eq!(
            check_2tuple(&(1, 2, 3).into(), "center").unwrap_err().kind(),
            ErrorKind::Value
        );
    }

    #[test]
    fn range_must_be_ordered_and_bounded() {
        assert!(check_range(&(0.08, 1.0).into(), (0.0, 16.0), "scale").is_ok());
        assert!(matches!(
            check_range(&(2.0, 1.0).into(), (0.0, 16.0), "scale"),
            Err(ValidationError::Unordered { .. })
        ));
        assert!(matches!(
            check_range(&(-1.0, 1.0).into(), (0.0, 16.0), "scale"),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(
            check_range(&(1.0, 2.0, 3.0).into(), (0.0, 16.0), "scale")
                .unwrap_err()
                .kind(),
            ErrorKind::Type
        );
    }
}
