//! Per-constructor validators for vision transforms.
//!
//! Each function receives the bound arguments of exactly one constructor and
//! either returns `Ok(())` or the first violation it finds.

use crate::error::{Result, ValidationError};
use crate::helpers::{
    check_2tuple, check_pos_float32, check_positive, check_range, check_value, type_check,
    type_check_list, FLOAT_MAX_INTEGER,
};
use crate::signature::BoundArgs;
use crate::value::{ArgType, ArgValue, OpBackend};

use super::params::{
    check_color_adjust_param, check_crop_size, check_degrees, check_erasing_value,
    check_fill_value, check_normalize_c_param, check_normalize_py_param, check_padding,
    check_resize_size,
};

const ANY_FLOAT: (f64, f64) = (0.0, FLOAT_MAX_INTEGER as f64);

fn optional<F>(value: &ArgValue, check: F) -> Result<()>
where
    F: FnOnce(&ArgValue) -> Result<()>,
{
    if value.is_none() { Ok(()) } else { check(value) }
}

fn check_prob_value(prob: &ArgValue, name: &str) -> Result<()> {
    type_check(prob, &[ArgType::Float, ArgType::Int], name)?;
    check_value(prob, (0.0, 1.0), name)
}

fn seq_len(value: &ArgValue) -> usize {
    value.as_seq().map_or(0, <[ArgValue]>::len)
}

/// `size`
pub fn check_crop(args: &BoundArgs) -> Result<()> {
    check_crop_size(args.get("size"))
}

/// `size`, `interpolation`
pub fn check_resize_interpolation(args: &BoundArgs) -> Result<()> {
    check_resize_size(args.get("size"))?;
    optional(args.get("interpolation"), |v| {
        type_check(v, &[ArgType::Inter], "interpolation")
    })
}

/// `size`
pub fn check_resize(args: &BoundArgs) -> Result<()> {
    check_resize_size(args.get("size"))
}

/// `size`, `scale`, `ratio`, `interpolation`, `max_attempts`
pub fn check_random_resize_crop(args: &BoundArgs) -> Result<()> {
    check_crop_size(args.get("size"))?;
    optional(args.get("scale"), |v| check_range(v, ANY_FLOAT, "scale"))?;
    optional(args.get("ratio"), |v| {
        check_range(v, ANY_FLOAT, "ratio")?;
        match v.as_seq() {
            Some(pair) => check_positive(&pair[0], "ratio[0]"),
            None => Ok(()),
        }
    })?;
    optional(args.get("interpolation"), |v| {
        type_check(v, &[ArgType::Inter], "interpolation")
    })?;
    optional(args.get("max_attempts"), |v| {
        check_value(v, (1.0, FLOAT_MAX_INTEGER as f64), "max_attempts")
    })
}

/// `prob`
pub fn check_prob(args: &BoundArgs) -> Result<()> {
    check_prob_value(args.get("prob"), "prob")
}

/// `mean`, `std` for the native normalize op.
pub fn check_normalize_c(args: &BoundArgs) -> Result<()> {
    check_normalize_c_param(args.get("mean"), args.get("std"))
}

/// `mean`, `std` for the host-side normalize op.
pub fn check_normalize_py(args: &BoundArgs) -> Result<()> {
    check_normalize_py_param(args.get("mean"), args.get("std"))
}

/// `size`, `padding`, `pad_if_needed`, `fill_value`, `padding_mode`
pub fn check_random_crop(args: &BoundArgs) -> Result<()> {
    check_crop_size(args.get("size"))?;
    type_check(args.get("pad_if_needed"), &[ArgType::Bool], "pad_if_needed")?;
    optional(args.get("padding"), check_padding)?;
    optional(args.get("fill_value"), check_fill_value)?;
    optional(args.get("padding_mode"), |v| {
        type_check(v, &[ArgType::Border], "padding_mode")
    })
}

/// `brightness`, `contrast`, `saturation`, `hue`
pub fn check_random_color_adjust(args: &BoundArgs) -> Result<()> {
    for name in ["brightness", "contrast", "saturation"] {
        check_color_adjust_param(args.get(name), name, ANY_FLOAT)?;
    }
    check_color_adjust_param(args.get("hue"), "hue", (-0.5, 0.5))
}

/// `degrees`, `resample`, `expand`, `center`, `fill_value`
pub fn check_random_rotation(args: &BoundArgs) -> Result<()> {
    check_degrees(args.get("degrees"))?;
    optional(args.get("resample"), |v| {
        type_check(v, &[ArgType::Inter], "resample")
    })?;
    optional(args.get("expand"), |v| type_check(v, &[ArgType::Bool], "expand"))?;
    optional(args.get("center"), |v| check_2tuple(v, "center"))?;
    optional(args.get("fill_value"), check_fill_value)
}

/// `transforms`
pub fn check_transforms_list(args: &BoundArgs) -> Result<()> {
    type_check(args.get("transforms"), &[ArgType::List], "transforms")
}

/// `transforms`, `prob`
pub fn check_random_apply(args: &BoundArgs) -> Result<()> {
    type_check(args.get("transforms"), &[ArgType::List], "transforms")?;
    optional(args.get("prob"), |v| check_prob_value(v, "prob"))
}

/// `size`, `use_vertical_flip`
pub fn check_ten_crop(args: &BoundArgs) -> Result<()> {
    check_crop_size(args.get("size"))?;
    optional(args.get("use_vertical_flip"), |v| {
        type_check(v, &[ArgType::Bool], "use_vertical_flip")
    })
}

/// `num_output_channels`: 1 or 3.
pub fn check_num_channels(args: &BoundArgs) -> Result<()> {
    optional(args.get("num_output_channels"), |v| match v.as_i64() {
        Some(1 | 3) => Ok(()),
        _ => Err(ValidationError::invalid_value(
            "num_output_channels",
            format!("number of channels of the output grayscale image should be either 1 or 3, got {v}"),
        )),
    })
}

/// `padding`, `fill_value`, `padding_mode`
pub fn check_pad(args: &BoundArgs) -> Result<()> {
    check_padding(args.get("padding"))?;
    check_fill_value(args.get("fill_value"))?;
    type_check(args.get("padding_mode"), &[ArgType::Border], "padding_mode")
}

/// `distortion_scale`, `prob`, `interpolation`
pub fn check_random_perspective(args: &BoundArgs) -> Result<()> {
    check_value(args.get("distortion_scale"), (0.0, 1.0), "distortion_scale")?;
    check_value(args.get("prob"), (0.0, 1.0), "prob")?;
    type_check(args.get("interpolation"), &[ArgType::Inter], "interpolation")
}

/// `batch_size`, `alpha`, `is_single`
pub fn check_mix_up(args: &BoundArgs) -> Result<()> {
    check_value(args.get("batch_size"), (1.0, FLOAT_MAX_INTEGER as f64), "batch_size")?;
    check_positive(args.get("alpha"), "alpha")?;
    type_check(args.get("is_single"), &[ArgType::Bool], "is_single")
}

/// `prob`, `scale`, `ratio`, `value`, `inplace`, `max_attempts`
pub fn check_random_erasing(args: &BoundArgs) -> Result<()> {
    check_value(args.get("prob"), (0.0, 1.0), "prob")?;
    check_range(args.get("scale"), ANY_FLOAT, "scale")?;
    check_range(args.get("ratio"), ANY_FLOAT, "ratio")?;
    check_erasing_value(args.get("value"))?;
    type_check(args.get("inplace"), &[ArgType::Bool], "inplace")?;
    check_value(args.get("max_attempts"), (1.0, FLOAT_MAX_INTEGER as f64), "max_attempts")
}

/// `length`, `num_patches`
pub fn check_cutout(args: &BoundArgs) -> Result<()> {
    check_value(args.get("length"), (1.0, FLOAT_MAX_INTEGER as f64), "length")?;
    check_value(args.get("num_patches"), (1.0, FLOAT_MAX_INTEGER as f64), "num_patches")
}

/// `transformation_matrix`, `mean_vector`
pub fn check_linear_transform(args: &BoundArgs) -> Result<()> {
    let matrix = args.get("transformation_matrix");
    let mean = args.get("mean_vector");
    type_check(matrix, &[ArgType::Array], "transformation_matrix")?;
    type_check(mean, &[ArgType::Array], "mean_vector")?;
    let (ArgValue::Array { shape: m_shape }, ArgValue::Array { shape: v_shape }) = (matrix, mean)
    else {
        return Ok(());
    };

    if m_shape.len() < 2 || m_shape[0] != m_shape[1] {
        return Err(ValidationError::invalid_value(
            "transformation_matrix",
            format!("should be a square matrix, got shape {m_shape:?} instead"),
        ));
    }
    if v_shape.first() != Some(&m_shape[0]) {
        return Err(ValidationError::invalid_value(
            "mean_vector",
            format!(
                "length {:?} should match either one dimension of the square transformation_matrix {m_shape:?}",
                v_shape.first()
            ),
        ));
    }
    Ok(())
}

/// `degrees`, `translate`, `scale`, `shear`, `resample`, `fill_value`
pub fn check_random_affine(args: &BoundArgs) -> Result<()> {
    check_degrees(args.get("degrees"))?;

    optional(args.get("translate"), |v| {
        type_check(v, &[ArgType::List, ArgType::Tuple], "translate")?;
        let items = v.as_seq().unwrap_or_default();
        let names: Vec<String> = (0..items.len()).map(|i| format!("translate_{i}")).collect();
        type_check_list(items, &[ArgType::Int, ArgType::Float], &names)?;
        if items.len() != 2 {
            return Err(ValidationError::WrongArity {
                name: "translate".to_string(),
                expected: "a list or tuple of length 2".to_string(),
                got: items.len(),
            });
        }
        items.iter().enumerate().try_for_each(|(i, t)| {
            check_value(t, (0.0, 1.0), &format!("translate at {i}"))
        })
    })?;

    optional(args.get("scale"), |v| {
        type_check(v, &[ArgType::Tuple, ArgType::List], "scale")?;
        let items = v.as_seq().unwrap_or_default();
        if items.len() != 2 {
            return Err(ValidationError::WrongArity {
                name: "scale".to_string(),
                expected: "a list or tuple of length 2".to_string(),
                got: items.len(),
            });
        }
        items
            .iter()
            .enumerate()
            .try_for_each(|(i, s)| check_positive(s, &format!("scale[{i}]")))
    })?;

    optional(args.get("shear"), |v| {
        type_check(v, &[ArgType::Number, ArgType::Tuple, ArgType::List], "shear")?;
        match v.as_seq() {
            Some(items) if !matches!(items.len(), 2 | 4) => {
                return Err(ValidationError::WrongArity {
                    name: "shear".to_string(),
                    expected: "of length 2 or 4".to_string(),
                    got: items.len(),
                });
            }
            Some(_) => {}
            None => check_positive(v, "shear")?,
        }
        type_check(args.get("resample"), &[ArgType::Inter], "resample")
    })?;

    optional(args.get("fill_value"), check_fill_value)
}

/// `rescale`, `shift`
pub fn check_rescale(args: &BoundArgs) -> Result<()> {
    check_pos_float32(args.get("rescale"), "rescale")?;
    type_check(args.get("shift"), &[ArgType::Number], "shift")
}

/// `operations`, `num_ops` for the native uniform-augment op.
pub fn check_uniform_augment_cpp(args: &BoundArgs) -> Result<()> {
    let operations = args.get("operations");
    let num_ops = args.get("num_ops");
    type_check(num_ops, &[ArgType::Int], "num_ops")?;
    check_positive(num_ops, "num_ops")?;
    type_check(operations, &[ArgType::List], "operations")?;

    let ops = operations.as_seq().unwrap_or_default();
    if num_ops.as_i64().unwrap_or_default() > ops.len() as i64 {
        return Err(ValidationError::invalid_value(
            "num_ops",
            "num_ops is greater than operations list size",
        ));
    }
    let names: Vec<String> = (0..ops.len()).map(|i| format!("tensor_op_{i}")).collect();
    type_check_list(ops, &[ArgType::Op(OpBackend::Native)], &names)
}

/// `transform`, `ratio`
pub fn check_bounding_box_augment_cpp(args: &BoundArgs) -> Result<()> {
    check_prob_value(args.get("ratio"), "ratio")?;
    type_check(
        args.get("transform"),
        &[ArgType::Op(OpBackend::Native)],
        "transform",
    )
}

/// `transforms`, `num_ops` for the host-side uniform-augment op.
pub fn check_uniform_augment_py(args: &BoundArgs) -> Result<()> {
    let transforms = args.get("transforms");
    type_check(transforms, &[ArgType::List], "transforms")?;
    let items = transforms.as_seq().unwrap_or_default();
    if items.is_empty() {
        return Err(ValidationError::invalid_value(
            "transforms",
            "transforms list is empty",
        ));
    }
    if items.iter().any(|t| matches!(t, ArgValue::Op(OpBackend::Native))) {
        return Err(ValidationError::invalid_value(
            "transforms",
            "transform list only accepts Python operations",
        ));
    }

    let num_ops = args.get("num_ops");
    type_check(num_ops, &[ArgType::Int], "num_ops")?;
    check_positive(num_ops, "num_ops")?;
    if num_ops.as_i64().unwrap_or_default() > items.len() as i64 {
        return Err(ValidationError::invalid_value(
            "num_ops",
            "num_ops cannot be greater than the length of transforms list",
        ));
    }
    Ok(())
}

/// `degrees` as an ordered, positive `(min, max)` pair.
pub fn check_positive_degrees(args: &BoundArgs) -> Result<()> {
    let degrees = args.get("degrees");
    let Some(pair) = degrees.as_seq() else {
        return Ok(());
    };
    if pair.len() != 2 {
        return Err(ValidationError::invalid_value(
            "degrees",
            format!("must be a sequence with length 2, got {}", pair.len()),
        ));
    }
    check_positive(&pair[0], "degrees[0]")?;
    type_check(&pair[1], &[ArgType::Number], "degrees[1]")?;
    if pair[0].as_f64() > pair[1].as_f64() {
        return Err(ValidationError::Unordered {
            name: "degrees".to_string(),
            low: pair[0].to_string(),
            high: pair[1].to_string(),
        });
    }
    Ok(())
}

/// `transforms`: a non-empty list.
pub fn check_compose_list(args: &BoundArgs) -> Result<()> {
    let transforms = args.get("transforms");
    type_check(transforms, &[ArgType::List], "transforms")?;
    if seq_len(transforms) == 0 {
        return Err(ValidationError::invalid_value(
            "transforms",
            "transforms list is empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::signature::Signature;
    use crate::value::Inter;

    fn bind(names: &[&'static str], values: Vec<ArgValue>) -> BoundArgs {
        names
            .iter()
            .fold(Signature::new(), |sig, name| sig.optional(*name, ArgValue::None))
            .bind(values, vec![])
            .unwrap()
    }

    #[test]
    fn random_resize_crop_ratio_must_start_positive() {
        let names = ["size", "scale", "ratio", "interpolation", "max_attempts"];
        let ok = bind(&names, vec![224.into(), (0.08, 1.0).into(), (0.75, 1.33).into()]);
        assert!(check_random_resize_crop(&ok).is_ok());

        let zero = bind(&names, vec![224.into(), ArgValue::None, (0.0, 1.0).into()]);
        assert_eq!(check_random_resize_crop(&zero).unwrap_err().param(), Some("ratio[0]"));

        let attempts = bind(
            &names,
            vec![224.into(), ArgValue::None, ArgValue::None, Inter::Bilinear.into(), 0.into()],
        );
        assert_eq!(check_random_resize_crop(&attempts).unwrap_err().kind(), ErrorKind::Value);
    }

    #[test]
    fn random_rotation_center_is_a_pair() {
        let names = ["degrees", "resample", "expand", "center", "fill_value"];
        let ok = bind(
            &names,
            vec![90.into(), Inter::Nearest.into(), true.into(), (10, 10).into(), 0.into()],
        );
        assert!(check_random_rotation(&ok).is_ok());

        let bad = bind(&names, vec![90.into(), ArgValue::None, ArgValue::None, vec![10, 10].into()]);
        assert_eq!(check_random_rotation(&bad).unwrap_err().param(), Some("center"));
    }

    #[test]
    fn mix_up_and_cutout_counts() {
        let mix = ["batch_size", "alpha", "is_single"];
        assert!(check_mix_up(&bind(&mix, vec![32.into(), 0.2.into(), true.into()])).is_ok());
        assert!(check_mix_up(&bind(&mix, vec![0.into(), 0.2.into(), true.into()])).is_err());
        assert!(check_mix_up(&bind(&mix, vec![32.into(), 0.into(), true.into()])).is_err());

        let cut = ["length", "num_patches"];
        assert!(check_cutout(&bind(&cut, vec![16.into(), 1.into()])).is_ok());
        assert!(check_cutout(&bind(&cut, vec![16.into(), 0.into()])).is_err());
    }

    #[test]
    fn random_erasing_value_forms() {
        let names = ["prob", "scale", "ratio", "value", "inplace", "max_attempts"];
        let with_value = |value: ArgValue| {
            bind(
                &names,
                vec![0.5.into(), (0.02, 0.33).into(), (0.3, 3.3).into(), value, false.into(), 10.into()],
            )
        };
        assert!(check_random_erasing(&with_value("random".into())).is_ok());
        assert!(check_random_erasing(&with_value((0, 0, 0).into())).is_ok());
        assert_eq!(
            check_random_erasing(&with_value((0, 0).into())).unwrap_err().kind(),
            ErrorKind::Value
        );
    }

    #[test]
    fn rescale_and_bounding_box() {
        let names = ["rescale", "shift"];
        assert!(check_rescale(&bind(&names, vec![(1.0 / 255.0).into(), 0.0.into()])).is_ok());
        assert!(check_rescale(&bind(&names, vec![(-1.0).into(), 0.0.into()])).is_err());

        let names = ["transform", "ratio"];
        let native = ArgValue::Op(OpBackend::Native);
        assert!(check_bounding_box_augment_cpp(&bind(&names, vec![native, 0.3.into()])).is_ok());
        let err = check_bounding_box_augment_cpp(&bind(
            &names,
            vec![ArgValue::Op(OpBackend::Python), 0.3.into()],
        ))
        .unwrap_err();
        assert_eq!(err.param(), Some("transform"));
    }

    #[test]
    fn ten_crop_flag_type() {
        let names = ["size", "use_vertical_flip"];
        assert!(check_ten_crop(&bind(&names, vec![(24, 24).into(), true.into()])).is_ok());
        assert_eq!(
            check_ten_crop(&bind(&names, vec![24.into(), 1.into()])).unwrap_err().kind(),
            ErrorKind::Type
        );
    }
}
