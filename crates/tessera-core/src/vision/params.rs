//! Parameter-level checks reused by several vision constructors.

use crate::error::{Result, ValidationError};
use crate::helpers::{
    check_pos_float32, check_range, check_uint8, check_value, type_check, type_check_each,
    FLOAT_MAX_INTEGER, INT32_MAX,
};
use crate::value::{ArgType, ArgValue};

const SIZE_SHAPE: &str = "a single integer or a list/tuple (h, w) of length 2";

fn size_arity(name: &str, got: usize) -> ValidationError {
    ValidationError::WrongArity {
        name: name.to_string(),
        expected: SIZE_SHAPE.to_string(),
        got,
    }
}

/// Crop size: an int `>= 1` or an `(h, w)` pair of such values.
pub fn check_crop_size(size: &ArgValue) -> Result<()> {
    type_check(size, &[ArgType::Int, ArgType::List, ArgType::Tuple], "size")?;
    match size {
        ArgValue::Int(_) => check_value(size, (1.0, FLOAT_MAX_INTEGER as f64), "size"),
        _ => match size.as_seq() {
            Some(dims) if dims.len() == 2 => dims.iter().try_for_each(|v| {
                check_value(v, (1.0, FLOAT_MAX_INTEGER as f64), "size")
            }),
            Some(dims) => Err(size_arity("size", dims.len())),
            None => Err(size_arity("size", 0)),
        },
    }
}

/// Resize size: like the crop size, but each dimension must fit an `i32`.
pub fn check_resize_size(size: &ArgValue) -> Result<()> {
    match size {
        ArgValue::Int(_) => check_value(size, (1.0, FLOAT_MAX_INTEGER as f64), "size"),
        ArgValue::List(dims) | ArgValue::Tuple(dims) if dims.len() == 2 => dims
            .iter()
            .enumerate()
            .try_for_each(|(i, v)| {
                check_value(v, (1.0, INT32_MAX as f64), &format!("size at dim {i}"))
            }),
        ArgValue::List(dims) | ArgValue::Tuple(dims) => Err(size_arity("size", dims.len())),
        other => type_check(other, &[ArgType::Int, ArgType::List, ArgType::Tuple], "size"),
    }
}

fn check_mean_std<F>(mean: &ArgValue, std: &ArgValue, check: F) -> Result<()>
where
    F: Fn(&ArgValue, &str) -> Result<()>,
{
    type_check(mean, &[ArgType::List, ArgType::Tuple], "mean")?;
    type_check(std, &[ArgType::List, ArgType::Tuple], "std")?;
    let mean = mean.as_seq().unwrap_or_default();
    let std = std.as_seq().unwrap_or_default();
    if mean.len() != std.len() {
        return Err(ValidationError::LengthMismatch {
            left: "mean".to_string(),
            left_len: mean.len(),
            right: "std".to_string(),
            right_len: std.len(),
        });
    }
    mean.iter().try_for_each(|v| check(v, "mean_value"))?;
    std.iter().try_for_each(|v| check(v, "std_value"))
}

/// Mean/std for the native normalize op: equal length, each in `[0, f32::MAX]`.
pub fn check_normalize_c_param(mean: &ArgValue, std: &ArgValue) -> Result<()> {
    check_mean_std(mean, std, check_pos_float32)
}

/// Mean/std for the host-side normalize op: equal length, each in `[0, 1]`.
pub fn check_normalize_py_param(mean: &ArgValue, std: &ArgValue) -> Result<()> {
    check_mean_std(mean, std, |v, name| check_value(v, (0.0, 1.0), name))
}

/// Fill color: a uint8 or an RGB triple of uint8.
pub fn check_fill_value(fill_value: &ArgValue) -> Result<()> {
    match fill_value {
        ArgValue::Int(_) => check_uint8(fill_value, "fill_value"),
        ArgValue::Tuple(rgb) if rgb.len() == 3 => {
            rgb.iter().try_for_each(|v| check_uint8(v, "fill_value"))
        }
        ArgValue::Tuple(rgb) => Err(ValidationError::WrongArity {
            name: "fill_value".to_string(),
            expected: "a single integer or a 3-tuple".to_string(),
            got: rgb.len(),
        }),
        other => type_check(other, &[ArgType::Int, ArgType::Tuple], "fill_value"),
    }
}

/// Padding: a single width or 2/4 per-side widths, all in `[0, i32::MAX]`.
pub fn check_padding(padding: &ArgValue) -> Result<()> {
    type_check(
        padding,
        &[ArgType::Tuple, ArgType::List, ArgType::Number],
        "padding",
    )?;
    match padding.as_seq() {
        Some(widths) => {
            if !matches!(widths.len(), 2 | 4) {
                return Err(ValidationError::invalid_value(
                    "padding",
                    format!(
                        "the size of the padding list or tuple should be 2 or 4, got {}",
                        widths.len()
                    ),
                ));
            }
            widths.iter().enumerate().try_for_each(|(i, w)| {
                type_check(w, &[ArgType::Int], &format!("padding[{i}]"))?;
                check_value(w, (0.0, INT32_MAX as f64), "pad_value")
            })
        }
        None => check_value(padding, (0.0, INT32_MAX as f64), "padding"),
    }
}

/// Rotation degrees: a non-negative number or a `(min, max)` pair.
pub fn check_degrees(degrees: &ArgValue) -> Result<()> {
    type_check(
        degrees,
        &[ArgType::Number, ArgType::List, ArgType::Tuple],
        "degrees",
    )?;
    match degrees.as_seq() {
        Some(pair) if pair.len() == 2 => type_check_each(pair, &[ArgType::Number], "degrees"),
        Some(pair) => Err(ValidationError::WrongArity {
            name: "degrees".to_string(),
            expected: "a sequence of length 2".to_string(),
            got: pair.len(),
        }),
        None => check_value(degrees, (0.0, f64::INFINITY), "degrees"),
    }
}

/// Color jitter factor: a non-negative scalar or an ordered pair inside `bound`.
pub fn check_color_adjust_param(value: &ArgValue, name: &str, bound: (f64, f64)) -> Result<()> {
    type_check(value, &[ArgType::Number, ArgType::List, ArgType::Tuple], name)?;
    match value.as_f64() {
        Some(x) if x < 0.0 => Err(ValidationError::invalid_value(
            name,
            format!("the input value of {name} cannot be negative, got {value}"),
        )),
        Some(_) => Ok(()),
        None => check_range(value, bound, name),
    }
}

/// Erasing value: a scalar, the string `"random"`-style tag, bytes, or an RGB triple.
pub fn check_erasing_value(value: &ArgValue) -> Result<()> {
    let ok = match value {
        ArgValue::Int(_) | ArgValue::Float(_) | ArgValue::Str(_) | ArgValue::Bytes(_) => true,
        ArgValue::List(rgb) | ArgValue::Tuple(rgb) => rgb.len() == 3,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::invalid_value(
            "value",
            "the value for erasing should be either a single value, or a string 'random', \
             or a sequence of 3 elements for RGB respectively",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn crop_size_bounds_and_arity() {
        assert!(check_crop_size(&1.into()).is_ok());
        assert!(check_crop_size(&(32, 48).into()).is_ok());
        assert!(check_crop_size(&vec![32, 48].into()).is_ok());

        let err = check_crop_size(&0.into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);

        let err = check_crop_size(&(1, 2, 3).into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.param(), Some("size"));

        let err = check_crop_size(&2.5.into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn resize_size_dims_fit_int32() {
        assert!(check_resize_size(&(INT32_MAX, 1).into()).is_ok());
        let err = check_resize_size(&(INT32_MAX + 1, 1).into()).unwrap_err();
        assert_eq!(err.param(), Some("size at dim 0"));
        assert_eq!(check_resize_size(&"big".into()).unwrap_err().kind(), ErrorKind::Type);
        assert_eq!(check_resize_size(&vec![1].into()).unwrap_err().kind(), ErrorKind::Type);
    }

    #[test]
    fn normalize_lengths_must_match() {
        let err = check_normalize_c_param(&vec![0.5, 0.5].into(), &vec![0.2].into()).unwrap_err();
        assert!(matches!(err, ValidationError::LengthMismatch { .. }));

        assert!(check_normalize_c_param(&vec![121.0, 115.0, 100.0].into(), &vec![70.0, 68.0, 71.0].into()).is_ok());
        assert!(check_normalize_py_param(&vec![121.0].into(), &vec![0.5].into()).is_err());
        assert!(check_normalize_py_param(&vec![0.5].into(), &vec![0.5].into()).is_ok());
    }

    #[test]
    fn fill_value_forms() {
        assert!(check_fill_value(&0.into()).is_ok());
        assert!(check_fill_value(&(255, 0, 10).into()).is_ok());
        assert_eq!(check_fill_value(&(255, 0).into()).unwrap_err().kind(), ErrorKind::Type);
        assert_eq!(check_fill_value(&256.into()).unwrap_err().kind(), ErrorKind::Value);
        assert_eq!(check_fill_value(&vec![1, 2, 3].into()).unwrap_err().kind(), ErrorKind::Type);
    }

    #[test]
    fn padding_forms() {
        assert!(check_padding(&4.into()).is_ok());
        assert!(check_padding(&(1, 2).into()).is_ok());
        assert!(check_padding(&vec![1, 2, 3, 4].into()).is_ok());
        assert_eq!(check_padding(&(1, 2, 3).into()).unwrap_err().kind(), ErrorKind::Value);
        assert_eq!(check_padding(&(1, -2).into()).unwrap_err().kind(), ErrorKind::Value);
        assert_eq!(check_padding(&(1.5, 2).into()).unwrap_err().kind(), ErrorKind::Type);
        assert_eq!(check_padding(&(-1).into()).unwrap_err().kind(), ErrorKind::Value);
    }

    #[test]
    fn degrees_forms() {
        assert!(check_degrees(&30.into()).is_ok());
        assert!(check_degrees(&(-30, 30).into()).is_ok());
        assert_eq!(check_degrees(&(-1).into()).unwrap_err().kind(), ErrorKind::Value);
        assert_eq!(check_degrees(&(1, 2, 3).into()).unwrap_err().kind(), ErrorKind::Type);
    }

    #[test]
    fn color_adjust_param() {
        assert!(check_color_adjust_param(&0.4.into(), "brightness", (0.0, 1e9)).is_ok());
        assert!(check_color_adjust_param(&(-0.5, 0.5).into(), "hue", (-0.5, 0.5)).is_ok());
        assert!(check_color_adjust_param(&(-0.6, 0.5).into(), "hue", (-0.5, 0.5)).is_err());
        assert!(check_color_adjust_param(&(-0.1).into(), "contrast", (0.0, 1e9)).is_err());
        assert_eq!(
            check_color_adjust_param(&(0.1, 0.2, 0.3).into(), "saturation", (0.0, 1e9))
                .unwrap_err()
                .kind(),
            ErrorKind::Type
        );
    }

    #[test]
    fn erasing_value_forms() {
        assert!(check_erasing_value(&0.into()).is_ok());
        assert!(check_erasing_value(&"random".into()).is_ok());
        assert!(check_erasing_value(&(1, 2, 3).into()).is_ok());
        assert!(check_erasing_value(&(1, 2).into()).is_err());
        assert!(check_erasing_value(&ArgValue::None).is_err());
    }
}
