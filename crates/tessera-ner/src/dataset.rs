//! JSON-lines NER datasets.
//!
//! Each line holds one pre-tokenized record:
//! `{"input_ids": [...], "input_mask": [...], "segment_ids": [...], "label_ids": [...]}`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::{Device, Tensor};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::DatasetError;

type Result<T> = std::result::Result<T, DatasetError>;

/// Column names, in the order the network consumes them.
pub const COLUMNS: [&str; 4] = ["input_ids", "input_mask", "segment_ids", "label_ids"];

#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    pub input_ids: Vec<u32>,
    pub input_mask: Vec<u32>,
    pub segment_ids: Vec<u32>,
    pub label_ids: Vec<u32>,
}

impl Record {
    fn column(&self, name: &str) -> Option<&[u32]> {
        match name {
            "input_ids" => Some(&self.input_ids),
            "input_mask" => Some(&self.input_mask),
            "segment_ids" => Some(&self.segment_ids),
            "label_ids" => Some(&self.label_ids),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub dtype: String,
    #[serde(default = "default_rank")]
    pub rank: usize,
    #[serde(default)]
    pub shape: Vec<usize>,
}

fn default_rank() -> usize {
    1
}

/// Column layout every record must follow.
#[derive(Debug, Clone, Deserialize)]
pub struct Schema {
    pub columns: BTreeMap<String, ColumnSchema>,
}

impl Schema {
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| DatasetError::Json {
            path: display,
            line: 0,
            source,
        })
    }

    fn check(&self, raw: &Value, record: &Record, path: &str, line: usize) -> Result<()> {
        let schema_error = |column: &str, reason: String| DatasetError::Schema {
            path: path.to_string(),
            line,
            column: column.to_string(),
            reason,
        };
        for (name, column) in &self.columns {
            if !raw.get(name).is_some_and(Value::is_array) {
                return Err(schema_error(name, "missing from record".into()));
            }
            if !column.dtype.starts_with("int") && !column.dtype.starts_with("uint") {
                return Err(schema_error(
                    name,
                    format!("unsupported type {:?}", column.dtype),
                ));
            }
            if column.rank != 1 {
                return Err(schema_error(name, format!("rank {} is not 1", column.rank)));
            }
            let Some(values) = record.column(name) else {
                continue;
            };
            if let Some(&expected) = column.shape.first() {
                if values.len() != expected {
                    return Err(schema_error(
                        name,
                        format!("length {} does not match shape [{expected}]", values.len()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One batch, every tensor `[batch_size, seq_length]` of u32.
#[derive(Debug, Clone)]
pub struct Batch {
    pub input_ids: Tensor,
    pub input_mask: Tensor,
    pub segment_ids: Tensor,
    pub label_ids: Tensor,
}

/// Records of one split, served in fixed-size batches.
#[derive(Debug, Clone)]
pub struct NerDataset {
    records: Vec<Record>,
    batch_size: usize,
    repeat_count: usize,
    seq_length: usize,
}

impl NerDataset {
    /// Reads `data_path`, checking every record against `schema_path` when
    /// given. Batches drop the remainder.
    pub fn load(
        data_path: &Path,
        schema_path: Option<&Path>,
        batch_size: usize,
        repeat_count: usize,
    ) -> Result<Self> {
        let display_path = data_path.display().to_string();
        let schema = schema_path.map(Schema::load).transpose()?;
        let io_error = |source| DatasetError::Io {
            path: display_path.clone(),
            source,
        };
        let reader = BufReader::new(File::open(data_path).map_err(io_error)?);

        let mut records = Vec::new();
        let mut seq_length = None;
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(io_error)?;
            let line_no = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let json_error = |source| DatasetError::Json {
                path: display_path.clone(),
                line: line_no,
                source,
            };
            let raw: Value = serde_json::from_str(&line).map_err(json_error)?;
            if let Some(schema) = &schema {
                let record: Record = serde_json::from_value(raw.clone()).map_err(json_error)?;
                schema.check(&raw, &record, &display_path, line_no)?;
                records.push(record);
            } else {
                records.push(serde_json::from_value(raw).map_err(json_error)?);
            }

            let Some(record) = records.last() else {
                continue;
            };
            let expected = *seq_length.get_or_insert(record.input_ids.len());
            for name in COLUMNS {
                let len = record.column(name).map_or(0, <[u32]>::len);
                if len != expected {
                    return Err(DatasetError::Schema {
                        path: display_path.clone(),
                        line: line_no,
                        column: name.to_string(),
                        reason: format!("length {len} differs from sequence length {expected}"),
                    });
                }
            }
        }

        let batch_size = batch_size.max(1);
        if records.len() < batch_size {
            return Err(DatasetError::TooSmall {
                path: display_path,
                records: records.len(),
                batch_size,
            });
        }
        info!(
            path = %display_path,
            records = records.len(),
            batch_size,
            "dataset loaded"
        );
        Ok(Self {
            records,
            batch_size,
            repeat_count: repeat_count.max(1),
            seq_length: seq_length.unwrap_or(0),
        })
    }

    /// Number of batches per epoch.
    pub fn dataset_size(&self) -> usize {
        self.records.len() / self.batch_size
    }

    pub fn repeat_count(&self) -> usize {
        self.repeat_count
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn seq_length(&self) -> usize {
        self.seq_length
    }

    /// Batches of one pass over the data.
    pub fn batches<'a>(&'a self, device: &'a Device) -> impl Iterator<Item = Result<Batch>> + 'a {
        self.records
            .chunks_exact(self.batch_size)
            .map(move |chunk| self.stack(chunk, device))
    }

    fn stack(&self, chunk: &[Record], device: &Device) -> Result<Batch> {
        let shape = (chunk.len(), self.seq_length);
        let column = |pick: fn(&Record) -> &Vec<u32>| -> Result<Tensor> {
            let flat: Vec<u32> = chunk.iter().flat_map(|r| pick(r).iter().copied()).collect();
            Ok(Tensor::from_vec(flat, shape, device)?)
        };
        Ok(Batch {
            input_ids: column(|r| &r.input_ids)?,
            input_mask: column(|r| &r.input_mask)?,
            segment_ids: column(|r| &r.segment_ids)?,
            label_ids: column(|r| &r.label_ids)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(seq: usize, label: u32) -> String {
        let ids: Vec<u32> = (0..seq as u32).collect();
        serde_json::json!({
            "input_ids": ids,
            "input_mask": vec![1; seq],
            "segment_ids": vec![0; seq],
            "label_ids": vec![label; seq],
        })
        .to_string()
    }

    fn write_lines(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn batches_drop_remainder() {
        let lines: Vec<String> = (0..5).map(|i| record(4, i)).collect();
        let file = write_lines(&lines);
        let dataset = NerDataset::load(file.path(), None, 2, 3).unwrap();
        assert_eq!(dataset.dataset_size(), 2);
        assert_eq!(dataset.repeat_count(), 3);
        assert_eq!(dataset.seq_length(), 4);

        let batches: Vec<Batch> = dataset
            .batches(&Device::Cpu)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].input_ids.dims(), &[2, 4]);
        let labels = batches[1].label_ids.to_vec2::<u32>().unwrap();
        assert_eq!(labels, vec![vec![2; 4], vec![3; 4]]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let file = write_lines(&[record(3, 0), String::new(), record(3, 1)]);
        let dataset = NerDataset::load(file.path(), None, 1, 1).unwrap();
        assert_eq!(dataset.dataset_size(), 2);
    }

    #[test]
    fn ragged_records_are_rejected() {
        let file = write_lines(&[record(3, 0), record(4, 0)]);
        let err = NerDataset::load(file.path(), None, 1, 1).unwrap_err();
        assert!(matches!(err, DatasetError::Schema { line: 2, .. }));
    }

    #[test]
    fn too_few_records_for_a_batch() {
        let file = write_lines(&[record(3, 0)]);
        let err = NerDataset::load(file.path(), None, 2, 1).unwrap_err();
        assert!(matches!(err, DatasetError::TooSmall { records: 1, .. }));
    }

    #[test]
    fn schema_checks_shape() {
        let schema = write_lines(&[serde_json::json!({
            "columns": {
                "input_ids": {"type": "int32", "rank": 1, "shape": [4]},
                "label_ids": {"type": "int32", "rank": 1, "shape": [4]}
            }
        })
        .to_string()]);
        let good = write_lines(&[record(4, 0)]);
        assert!(NerDataset::load(good.path(), Some(schema.path()), 1, 1).is_ok());

        let bad = write_lines(&[record(3, 0)]);
        let err = NerDataset::load(bad.path(), Some(schema.path()), 1, 1).unwrap_err();
        assert!(matches!(err, DatasetError::Schema { ref column, .. } if column == "input_ids"));
    }

    #[test]
    fn malformed_json_reports_line() {
        let file = write_lines(&[record(2, 0), "{not json".to_string()]);
        let err = NerDataset::load(file.path(), None, 1, 1).unwrap_err();
        assert!(matches!(err, DatasetError::Json { line: 2, .. }));
    }
}
