//! Per-constructor validators for text transforms.

use crate::error::{Result, ValidationError};
use crate::helpers::{check_positive, check_uint32, check_value, type_check, INT32_MAX};
use crate::signature::BoundArgs;
use crate::value::{ArgType, ArgValue};

/// `vocab`, `unknown`
pub fn check_lookup(args: &BoundArgs) -> Result<()> {
    let unknown = args.get("unknown");
    if !unknown.is_none() {
        type_check(unknown, &[ArgType::Int], "unknown")?;
        check_positive(unknown, "unknown")?;
    }
    type_check(args.get("vocab"), &[ArgType::Vocab], "vocab")
}

/// `hmm_path`, `mp_path`, `mode`: binding alone is the check.
pub fn check_jieba_init(_args: &BoundArgs) -> Result<()> {
    Ok(())
}

/// `word`, `freq`
pub fn check_jieba_add_word(args: &BoundArgs) -> Result<()> {
    if args.get("word").is_none() {
        return Err(ValidationError::Missing {
            name: "word".to_string(),
        });
    }
    let freq = args.get("freq");
    if freq.is_none() {
        return Ok(());
    }
    check_uint32(freq, "freq")
}

/// `user_dict`: binding alone is the check.
pub fn check_jieba_add_dict(_args: &BoundArgs) -> Result<()> {
    Ok(())
}

fn check_pad(pad: &ArgValue, name: &str) -> Result<i64> {
    match pad {
        ArgValue::Tuple(items) if items.len() == 2 => match (&items[0], &items[1]) {
            (ArgValue::Str(_), ArgValue::Int(width)) => Ok(*width),
            _ => Err(pad_error(name)),
        },
        _ => Err(pad_error(name)),
    }
}

fn pad_error(name: &str) -> ValidationError {
    ValidationError::invalid_value(
        name,
        format!("{name} needs to be a tuple of (str, int) str is pad token and int is pad_width"),
    )
}

/// `n`, `left_pad`, `right_pad`, `separator`
///
/// A scalar `n` is normalized into a one-element list.
pub fn check_ngram(args: &mut BoundArgs) -> Result<()> {
    let n = match args.get("n") {
        scalar @ ArgValue::Int(_) => ArgValue::List(vec![scalar.clone()]),
        other => other.clone(),
    };
    let grams = match &n {
        ArgValue::List(grams) if !grams.is_empty() => grams,
        _ => {
            return Err(ValidationError::invalid_value(
                "n",
                "n needs to be a non-empty list of positive integers",
            ));
        }
    };
    for (i, gram) in grams.iter().enumerate() {
        type_check(gram, &[ArgType::Int], &format!("gram[{i}]"))?;
        check_value(gram, (0.0, INT32_MAX as f64), &format!("gram_{i}"))?;
    }

    let left = check_pad(args.get("left_pad"), "left_pad")?;
    let right = check_pad(args.get("right_pad"), "right_pad")?;
    if left < 0 || right < 0 {
        return Err(ValidationError::invalid_value(
            "pad_width",
            "padding width need to be positive numbers",
        ));
    }
    type_check(args.get("separator"), &[ArgType::Str], "separator")?;

    args.set("n", n);
    Ok(())
}

/// `max_length`: binding alone is the check.
pub fn check_pair_truncate(_args: &BoundArgs) -> Result<()> {
    Ok(())
}

/// `data_type`: must be a numeric element type.
pub fn check_to_number(args: &BoundArgs) -> Result<()> {
    let data_type = args.get("data_type");
    type_check(data_type, &[ArgType::DType], "data_type")?;
    match data_type {
        ArgValue::DType(dtype) if dtype.is_numeric() => Ok(()),
        _ => Err(ValidationError::invalid_type(
            "data_type",
            "data_type is not numeric data type",
        )),
    }
}

/// `tokenizer`: must be callable.
pub fn check_python_tokenizer(args: &BoundArgs) -> Result<()> {
    match args.get("tokenizer") {
        ArgValue::Callable => Ok(()),
        _ => Err(ValidationError::invalid_type(
            "tokenizer",
            "tokenizer is not a callable python function",
        )),
    }
}
