//! CLUENER submission: predicts raw text lines and writes entity spans.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use candle_core::{Device, Tensor};
use serde_json::{Value, json};
use tokenizers::models::wordpiece::WordPiece;
use tracing::{debug, info};

use crate::crf::argmax_last;
use crate::label_map::LabelMap;
use crate::model::BertNer;

/// File the predictions are written to.
pub const SUBMISSION_FILE: &str = "ner_predict.json";

const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";
const UNK: &str = "[UNK]";

/// Model inputs for one text, padded to the sequence length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub input_ids: Vec<u32>,
    pub input_mask: Vec<u32>,
    /// Characters actually encoded, after truncation.
    pub len: usize,
}

/// Character-level lookup into a WordPiece vocabulary.
#[derive(Debug, Clone)]
pub struct CharTokenizer {
    vocab: HashMap<String, u32>,
    seq_length: usize,
}

impl CharTokenizer {
    pub fn new(vocab: HashMap<String, u32>, seq_length: usize) -> anyhow::Result<Self> {
        for special in [CLS, SEP, UNK] {
            if !vocab.contains_key(special) {
                anyhow::bail!("vocabulary has no {special} token");
            }
        }
        if seq_length < 2 {
            anyhow::bail!("sequence length {seq_length} leaves no room for [CLS] and [SEP]");
        }
        Ok(Self { vocab, seq_length })
    }

    pub fn from_file(path: &Path, seq_length: usize) -> anyhow::Result<Self> {
        let file = path
            .to_str()
            .ok_or_else(|| anyhow!("vocabulary path {} is not UTF-8", path.display()))?;
        let vocab = WordPiece::read_file(file)
            .map_err(|e| anyhow!("failed to read vocabulary {}: {e}", path.display()))?;
        Self::new(vocab, seq_length)
    }

    fn id(&self, token: &str) -> u32 {
        self.vocab
            .get(token)
            .or_else(|| self.vocab.get(UNK))
            .copied()
            .unwrap_or_default()
    }

    pub fn encode(&self, text: &str) -> Encoded {
        let chars: Vec<char> = text.chars().take(self.seq_length - 2).collect();
        let mut input_ids = Vec::with_capacity(self.seq_length);
        input_ids.push(self.id(CLS));
        for c in &chars {
            input_ids.push(self.id(&c.to_lowercase().collect::<String>()));
        }
        input_ids.push(self.id(SEP));
        let mut input_mask = vec![1; input_ids.len()];
        input_ids.resize(self.seq_length, 0);
        input_mask.resize(self.seq_length, 0);
        Encoded {
            input_ids,
            input_mask,
            len: chars.len(),
        }
    }
}

/// One recognized entity, character offsets inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub kind: String,
    pub start: usize,
    pub end: usize,
}

fn split_tag(tag: &str) -> (char, &str) {
    let mut chars = tag.chars();
    let Some(head) = chars.next() else {
        return ('O', "");
    };
    let rest = chars.as_str();
    match rest.strip_prefix('-').or_else(|| rest.strip_prefix('_')) {
        Some(kind) => (head.to_ascii_uppercase(), kind),
        None => ('O', ""),
    }
}

/// Entity spans of a BIOES or BMES tag sequence.
pub fn extract_entities<S: AsRef<str>>(tags: &[S]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut open: Option<(&str, usize)> = None;
    for (i, tag) in tags.iter().enumerate() {
        match split_tag(tag.as_ref()) {
            ('B', kind) => open = Some((kind, i)),
            ('I' | 'M', kind) => {
                if open.is_some_and(|(current, _)| current != kind) {
                    open = None;
                }
            }
            ('E', kind) => {
                if let Some((current, start)) = open.take() {
                    if current == kind {
                        entities.push(Entity {
                            kind: kind.to_string(),
                            start,
                            end: i,
                        });
                    }
                }
            }
            ('S', kind) => {
                open = None;
                entities.push(Entity {
                    kind: kind.to_string(),
                    start: i,
                    end: i,
                });
            }
            _ => open = None,
        }
    }
    entities
}

/// `{type: {text: [[start, end], ...]}}` for one text.
pub fn label_json(text: &str, entities: &[Entity]) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let mut by_kind: BTreeMap<&str, BTreeMap<String, Vec<[usize; 2]>>> = BTreeMap::new();
    for entity in entities {
        if entity.end >= chars.len() {
            continue;
        }
        let surface: String = chars[entity.start..=entity.end].iter().collect();
        by_kind
            .entry(&entity.kind)
            .or_default()
            .entry(surface)
            .or_default()
            .push([entity.start, entity.end]);
    }
    json!(by_kind)
}

/// Predicted tag names for the characters of `text`.
pub fn predict_tags(
    model: &BertNer,
    tokenizer: &CharTokenizer,
    labels: &LabelMap,
    text: &str,
    device: &Device,
) -> anyhow::Result<Vec<String>> {
    let encoded = tokenizer.encode(text);
    let seq = encoded.input_ids.len();
    let input_ids = Tensor::from_vec(encoded.input_ids, (1, seq), device)?;
    let input_mask = Tensor::from_vec(encoded.input_mask, (1, seq), device)?;
    let segment_ids = input_ids.zeros_like()?;
    let logits = model.predict(&input_ids, &input_mask, &segment_ids)?;

    let ids: Vec<usize> = match model.crf() {
        Some(crf) => crf.decode(&logits)?.into_iter().flatten().collect(),
        None => argmax_last(&logits)?.into_iter().map(|id| id as usize).collect(),
    };
    Ok(ids
        .into_iter()
        .skip(1)
        .take(encoded.len)
        .map(|id| labels.label(id).unwrap_or("O").to_string())
        .collect())
}

/// Predicts every line of `data_path` and writes the submission into
/// `out_dir`. Returns the written file.
pub fn submit(
    model: &BertNer,
    tokenizer: &CharTokenizer,
    labels: &LabelMap,
    data_path: &Path,
    out_dir: &Path,
    device: &Device,
) -> anyhow::Result<PathBuf> {
    let reader = BufReader::new(
        File::open(data_path).with_context(|| format!("failed to open {}", data_path.display()))?,
    );
    let out_path = out_dir.join(SUBMISSION_FILE);
    let mut writer = BufWriter::new(
        File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?,
    );

    let mut written = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", data_path.display(), index + 1))?;
        let text = record
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("{}:{}: no \"text\" field", data_path.display(), index + 1))?;
        let tags = predict_tags(model, tokenizer, labels, text, device)?;
        debug!(text, preds = ?tags, "predicted");

        let id = record.get("id").cloned().unwrap_or_else(|| json!(index));
        let row = json!({
            "id": id,
            "label": label_json(text, &extract_entities(&tags)),
        });
        writeln!(writer, "{row}")?;
        written += 1;
    }
    writer.flush()?;
    info!(path = %out_path.display(), records = written, "submission written");
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(seq_length: usize) -> CharTokenizer {
        let vocab: HashMap<String, u32> = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "a", "b", "中"]
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();
        CharTokenizer::new(vocab, seq_length).unwrap()
    }

    #[test]
    fn encode_pads_and_lowercases() {
        let encoded = tokenizer(8).encode("Ab中z");
        assert_eq!(encoded.input_ids, vec![2, 4, 5, 6, 1, 3, 0, 0]);
        assert_eq!(encoded.input_mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
        assert_eq!(encoded.len, 4);
    }

    #[test]
    fn encode_truncates() {
        let encoded = tokenizer(4).encode("abab");
        assert_eq!(encoded.input_ids, vec![2, 4, 5, 3]);
        assert_eq!(encoded.len, 2);
    }

    #[test]
    fn vocabulary_needs_special_tokens() {
        let vocab = HashMap::from([("a".to_string(), 0)]);
        assert!(CharTokenizer::new(vocab, 8).is_err());
    }

    #[test]
    fn bioes_entities() {
        let tags = ["B-name", "I-name", "E-name", "O", "S-address", "B-game", "E-book"];
        assert_eq!(
            extract_entities(&tags),
            vec![
                Entity {
                    kind: "name".into(),
                    start: 0,
                    end: 2
                },
                Entity {
                    kind: "address".into(),
                    start: 4,
                    end: 4
                },
            ]
        );
    }

    #[test]
    fn bmes_entities_with_underscore() {
        let tags = ["B_org", "M_org", "E_org", "S_pos"];
        let entities = extract_entities(&tags);
        assert_eq!(entities.len(), 2);
        assert_eq!((entities[0].start, entities[0].end), (0, 2));
        assert_eq!(entities[1].kind, "pos");
    }

    #[test]
    fn label_json_groups_by_type_and_text() {
        let text = "张三和张三";
        let entities = vec![
            Entity {
                kind: "name".into(),
                start: 0,
                end: 1,
            },
            Entity {
                kind: "name".into(),
                start: 3,
                end: 4,
            },
        ];
        assert_eq!(
            label_json(text, &entities),
            json!({"name": {"张三": [[0, 1], [3, 4]]}})
        );
    }
}
