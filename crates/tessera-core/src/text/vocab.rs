//! # Vocabulary Ingestion Guards
//!
//! Checks for the four ways a vocabulary can be built: from a word list, from a
//! word→id dictionary, from a vocabulary file, or from a frequency scan over a
//! dataset.

use std::collections::BTreeSet;

use crate::error::{Result, ValidationError};
use crate::helpers::{check_value, type_check, type_check_each, INT32_MAX};
use crate::signature::BoundArgs;
use crate::value::{ArgType, ArgValue};

/// Checks that `words` is a list of distinct strings and returns them as a set.
pub fn check_unique_list_of_words(words: &ArgValue, name: &str) -> Result<BTreeSet<String>> {
    type_check(words, &[ArgType::List], name)?;
    let mut seen = BTreeSet::new();
    for word in words.as_seq().unwrap_or_default() {
        type_check(word, &[ArgType::Str], name)?;
        let word = word.as_str().unwrap_or_default();
        if !seen.insert(word.to_string()) {
            return Err(ValidationError::DuplicateWord {
                name: name.to_string(),
                word: word.to_string(),
            });
        }
    }
    Ok(seen)
}

fn check_special_tokens(special_tokens: &ArgValue) -> Result<Option<BTreeSet<String>>> {
    if special_tokens.is_none() {
        return Ok(None);
    }
    check_unique_list_of_words(special_tokens, "special_tokens").map(Some)
}

fn check_vocab_id(value: &ArgValue, name: &str) -> Result<()> {
    type_check(value, &[ArgType::Int], name)?;
    check_value(value, (-1.0, INT32_MAX as f64), name)
}

/// `word_list`, `special_tokens`, `special_first`
pub fn check_from_list(args: &BoundArgs) -> Result<()> {
    let words = check_unique_list_of_words(args.get("word_list"), "word_list")?;
    if let Some(tokens) = check_special_tokens(args.get("special_tokens"))? {
        let overlap: BTreeSet<String> = words.intersection(&tokens).cloned().collect();
        if !overlap.is_empty() {
            return Err(ValidationError::OverlappingWords { words: overlap });
        }
    }
    type_check(args.get("special_first"), &[ArgType::Bool], "special_first")
}

/// `word_dict`: string keys, ids in `[-1, i32::MAX]`.
pub fn check_from_dict(args: &BoundArgs) -> Result<()> {
    let word_dict = args.get("word_dict");
    type_check(word_dict, &[ArgType::Dict], "word_dict")?;
    let ArgValue::Dict(entries) = word_dict else {
        return Ok(());
    };
    entries.iter().try_for_each(|(word, word_id)| {
        type_check(word, &[ArgType::Str], "word")?;
        check_vocab_id(word_id, "word_id")
    })
}

/// `file_path`, `delimiter`, `vocab_size`, `special_tokens`, `special_first`
pub fn check_from_file(args: &BoundArgs) -> Result<()> {
    check_special_tokens(args.get("special_tokens"))?;
    type_check(args.get("file_path"), &[ArgType::Str], "file_path")?;
    type_check(args.get("delimiter"), &[ArgType::Str], "delimiter")?;
    let vocab_size = args.get("vocab_size");
    if !vocab_size.is_none() {
        check_vocab_id(vocab_size, "vocab_size")?;
    }
    type_check(args.get("special_first"), &[ArgType::Bool], "special_first")
}

fn check_freq_range(freq_range: &ArgValue) -> Result<()> {
    type_check(freq_range, &[ArgType::Tuple], "freq_range")?;
    let bounds = freq_range.as_seq().unwrap_or_default();
    if bounds.len() != 2 {
        return Err(ValidationError::invalid_value(
            "freq_range",
            "needs to be a tuple of 2 integers or an int and a None",
        ));
    }
    if !bounds.iter().all(|b| b.is_none() || b.as_i64().is_some()) {
        return Err(ValidationError::invalid_value(
            "freq_range",
            "needs to be either None or a tuple of 2 integers or an int and a None",
        ));
    }
    if let (Some(low), Some(high)) = (bounds[0].as_i64(), bounds[1].as_i64()) {
        if low < 0 {
            return Err(ValidationError::OutOfRange {
                name: "freq_range".to_string(),
                value: freq_range.to_string(),
                min: "0".to_string(),
                max: high.to_string(),
            });
        }
        if low > high {
            return Err(ValidationError::Unordered {
                name: "freq_range".to_string(),
                low: low.to_string(),
                high: high.to_string(),
            });
        }
    }
    Ok(())
}

/// `dataset`, `columns`, `freq_range`, `top_k`, `special_tokens`, `special_first`
///
/// A single column name is normalized into a one-element list.
pub fn check_from_dataset(args: &mut BoundArgs) -> Result<()> {
    let columns = args.get("columns").clone();
    if !columns.is_none() {
        let columns = match columns {
            list @ ArgValue::List(_) => list,
            single => ArgValue::List(vec![single]),
        };
        type_check_each(columns.as_seq().unwrap_or_default(), &[ArgType::Str], "columns")?;
        args.set("columns", columns);
    }

    let freq_range = args.get("freq_range");
    if !freq_range.is_none() {
        check_freq_range(freq_range)?;
    }

    let top_k = args.get("top_k");
    type_check(top_k, &[ArgType::Int, ArgType::None], "top_k")?;
    if !top_k.is_none() {
        check_value(top_k, (0.0, INT32_MAX as f64), "top_k")?;
    }

    type_check(args.get("special_first"), &[ArgType::Bool], "special_first")?;
    check_special_tokens(args.get("special_tokens"))?;
    Ok(())
}
