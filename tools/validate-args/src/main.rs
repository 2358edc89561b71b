//! Reads one `{"op", "args", "kwargs"}` request per stdin line, validates it
//! and prints `{"op", "ok", "kind", "error"}`.

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use tessera_core::{ArgValue, ErrorKind, Operation};

#[derive(Parser)]
#[command(name = "tessera-validate")]
#[command(about = "Validate transform constructor arguments read as JSON lines")]
#[command(version)]
struct Cli {
    /// Print the known operation names and exit
    #[arg(long)]
    list: bool,
}

#[derive(Debug, Deserialize)]
pub struct Request {
    pub op: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Outcome {
    pub op: String,
    pub ok: bool,
    pub kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl Outcome {
    fn failed(op: &str, kind: Option<ErrorKind>, error: String) -> Self {
        Self {
            op: op.to_string(),
            ok: false,
            kind,
            error: Some(error),
        }
    }
}

fn tag<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Result<T, String> {
    serde_json::from_value(value.clone()).map_err(|e| format!("bad {key} tag {value}: {e}"))
}

/// Maps a JSON value onto an argument value.
pub fn to_arg(value: &Value) -> Result<ArgValue, String> {
    match value {
        Value::Null => Ok(ArgValue::None),
        Value::Bool(b) => Ok(ArgValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(ArgValue::Int(i)),
            None => n
                .as_f64()
                .map(ArgValue::Float)
                .ok_or_else(|| format!("unrepresentable number {n}")),
        },
        Value::String(s) => Ok(ArgValue::Str(s.clone())),
        Value::Array(items) => Ok(ArgValue::List(
            items.iter().map(to_arg).collect::<Result<_, _>>()?,
        )),
        Value::Object(map) => {
            let mut entries = map.iter();
            let (Some((key, inner)), None) = (entries.next(), entries.next()) else {
                return Err(format!("expected a single-key tagged object, got {value}"));
            };
            match key.as_str() {
                "tuple" => match inner {
                    Value::Array(items) => Ok(ArgValue::Tuple(
                        items.iter().map(to_arg).collect::<Result<_, _>>()?,
                    )),
                    other => Err(format!("tuple expects an array, got {other}")),
                },
                "inter" => Ok(ArgValue::Inter(tag(key, inner)?)),
                "border" => Ok(ArgValue::Border(tag(key, inner)?)),
                "dtype" => Ok(ArgValue::DType(tag(key, inner)?)),
                "op" => Ok(ArgValue::Op(tag(key, inner)?)),
                "array" => Ok(ArgValue::Array {
                    shape: tag(key, inner)?,
                }),
                "dict" => match inner {
                    Value::Object(entries) => Ok(ArgValue::Dict(
                        entries
                            .iter()
                            .map(|(k, v)| Ok((ArgValue::Str(k.clone()), to_arg(v)?)))
                            .collect::<Result<_, String>>()?,
                    )),
                    other => Err(format!("dict expects an object, got {other}")),
                },
                "bytes" => match inner {
                    Value::String(s) => Ok(ArgValue::Bytes(s.as_bytes().to_vec())),
                    other => Err(format!("bytes expects a string, got {other}")),
                },
                "callable" => Ok(ArgValue::Callable),
                "vocab" => Ok(ArgValue::Vocab),
                other => Err(format!("unknown tag {other:?}")),
            }
        }
    }
}

/// Validates one request line.
pub fn process(line: &str) -> Outcome {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return Outcome::failed("", None, format!("malformed request: {e}")),
    };
    let op: Operation = match request.op.parse() {
        Ok(op) => op,
        Err(e) => return Outcome::failed(&request.op, None, e.to_string()),
    };

    let positional = match request.args.iter().map(to_arg).collect::<Result<Vec<_>, _>>() {
        Ok(args) => args,
        Err(e) => return Outcome::failed(&request.op, None, e),
    };
    let keyword = match request
        .kwargs
        .iter()
        .map(|(k, v)| to_arg(v).map(|v| (k.clone(), v)))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(kwargs) => kwargs,
        Err(e) => return Outcome::failed(&request.op, None, e),
    };

    match op.check(positional, keyword) {
        Ok(_) => Outcome {
            op: request.op,
            ok: true,
            kind: None,
            error: None,
        },
        Err(e) => Outcome::failed(&request.op, Some(e.kind()), e.to_string()),
    }
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.list {
        for op in Operation::all() {
            writeln!(out, "{op}")?;
        }
        return Ok(());
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let outcome = process(line);
        let json = serde_json::to_string(&outcome).map_err(io::Error::other)?;
        writeln!(out, "{json}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{Border, Inter};

    #[test]
    fn maps_plain_and_tagged_values() {
        assert_eq!(to_arg(&json!(3)).unwrap(), ArgValue::Int(3));
        assert_eq!(to_arg(&json!(0.5)).unwrap(), ArgValue::Float(0.5));
        assert_eq!(to_arg(&json!(true)).unwrap(), ArgValue::Bool(true));
        assert_eq!(to_arg(&json!(null)).unwrap(), ArgValue::None);
        assert_eq!(
            to_arg(&json!({"tuple": [1, 2]})).unwrap(),
            ArgValue::tuple([1, 2])
        );
        assert_eq!(
            to_arg(&json!({"inter": "bilinear"})).unwrap(),
            ArgValue::Inter(Inter::Bilinear)
        );
        assert_eq!(
            to_arg(&json!({"border": "edge"})).unwrap(),
            ArgValue::Border(Border::Edge)
        );
        assert_eq!(
            to_arg(&json!({"array": [2, 3]})).unwrap(),
            ArgValue::Array { shape: vec![2, 3] }
        );
        assert_eq!(
            to_arg(&json!({"dict": {"a": 1}})).unwrap(),
            ArgValue::Dict(vec![(ArgValue::Str("a".into()), ArgValue::Int(1))])
        );
        assert_eq!(to_arg(&json!({"vocab": true})).unwrap(), ArgValue::Vocab);
        assert!(to_arg(&json!({"nope": 1})).is_err());
        assert!(to_arg(&json!({"tuple": [1], "inter": "nearest"})).is_err());
    }

    #[test]
    fn valid_request() {
        let outcome = process(r#"{"op": "random_crop", "args": [32], "kwargs": {"padding": 4}}"#);
        assert!(outcome.ok, "{outcome:?}");
        assert_eq!(outcome.kind, None);
    }

    #[test]
    fn rejected_request_reports_kind() {
        let outcome = process(r#"{"op": "from_list", "args": [["a", "b", "a"]]}"#);
        assert!(!outcome.ok);
        assert_eq!(outcome.kind, Some(ErrorKind::Value));
        assert_eq!(
            outcome.error.as_deref(),
            Some("word_list contains duplicate word: a.")
        );

        let outcome = process(r#"{"op": "random_crop", "args": ["32"]}"#);
        assert_eq!(outcome.kind, Some(ErrorKind::Type));
    }

    #[test]
    fn unknown_op_and_bad_json() {
        let outcome = process(r#"{"op": "warp"}"#);
        assert!(!outcome.ok);
        assert_eq!(outcome.op, "warp");
        assert_eq!(outcome.kind, None);

        let outcome = process("{not json");
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().starts_with("malformed request"));
    }
}
