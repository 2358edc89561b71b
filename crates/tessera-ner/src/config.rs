//! # Run Configuration
//!
//! Command-line surface of the driver and the immutable configuration it is
//! turned into once every precondition holds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use candle_transformers::models::bert::Config as BertConfig;
use clap::Parser;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ConfigError, Result};
use crate::optim::OptimizerConfig;

/// Sequence length every record and CLUE sample is padded to.
pub const DEFAULT_SEQ_LENGTH: usize = 128;

/// Command-line arguments of `run_ner`.
#[derive(Debug, Clone, Parser)]
#[command(name = "run_ner")]
#[command(about = "Fine-tune and evaluate a BERT token classifier")]
#[command(version)]
pub struct Cli {
    /// Device type: CPU or GPU
    #[arg(long = "device_target", default_value = "CPU")]
    pub device_target: String,

    /// Assessment method: accuracy, f1, mcc, spearman_correlation or clue_benchmark
    #[arg(long = "assessment_method", default_value = "accuracy")]
    pub assessment_method: String,

    /// Enable training: true or false
    #[arg(long = "do_train", default_value = "false")]
    pub do_train: String,

    /// Enable evaluation: true or false
    #[arg(long = "do_eval", default_value = "false")]
    pub do_eval: String,

    /// Use a CRF layer on top of the classifier: true or false
    #[arg(long = "use_crf", default_value = "false")]
    pub use_crf: String,

    /// Device id
    #[arg(long = "device_id", default_value_t = 0)]
    pub device_id: usize,

    /// Epoch number
    #[arg(long = "epoch_num", default_value_t = 1)]
    pub epoch_num: usize,

    /// Number of classes when no CRF label map is used
    #[arg(long = "num_class", default_value_t = 2)]
    pub num_class: usize,

    /// WordPiece vocabulary, used by the CLUE benchmark
    #[arg(long = "vocab_file_path", default_value = "")]
    pub vocab_file_path: String,

    /// label → id JSON map, used by the CRF and the CLUE benchmark
    #[arg(long = "label2id_file_path", default_value = "")]
    pub label2id_file_path: String,

    /// Directory fine-tuned checkpoints are written to
    #[arg(long = "save_finetune_checkpoint_path", default_value = "")]
    pub save_finetune_checkpoint_path: String,

    /// Pretrained checkpoint loaded before fine-tuning
    #[arg(long = "load_pretrain_checkpoint_path", default_value = "")]
    pub load_pretrain_checkpoint_path: String,

    /// Fine-tuned checkpoint loaded for evaluation
    #[arg(long = "load_finetune_checkpoint_path", default_value = "")]
    pub load_finetune_checkpoint_path: String,

    /// Training data (JSON lines)
    #[arg(long = "train_data_file_path", default_value = "")]
    pub train_data_file_path: String,

    /// Evaluation data (JSON lines)
    #[arg(long = "eval_data_file_path", default_value = "")]
    pub eval_data_file_path: String,

    /// Column schema checked against every record
    #[arg(long = "schema_file_path", default_value = "")]
    pub schema_file_path: String,

    /// Optimizer: AdamWeightDecayDynamicLR, Lamb or Momentum
    #[arg(long = "optimizer", default_value = "Lamb")]
    pub optimizer: String,

    /// BERT network config (JSON); the built-in base config is used when empty
    #[arg(long = "bert_config_path", default_value = "")]
    pub bert_config_path: String,

    /// Batch size
    #[arg(long = "batch_size", default_value_t = 16)]
    pub batch_size: usize,

    /// Compute precision: float32 or float16
    #[arg(long = "compute_type", default_value = "float32")]
    pub compute_type: String,
}

/// Device the network runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTarget {
    Cpu,
    Gpu { device_id: usize },
}

impl DeviceTarget {
    fn parse(target: &str, device_id: usize) -> Result<Self> {
        match target {
            "CPU" => Ok(Self::Cpu),
            "GPU" => Ok(Self::Gpu { device_id }),
            other => Err(ConfigError::UnsupportedTarget(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu { device_id } => write!(f, "GPU:{device_id}"),
        }
    }
}

/// How evaluation results are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentMethod {
    Accuracy,
    F1,
    Mcc,
    SpearmanCorrelation,
    ClueBenchmark,
}

impl FromStr for AssessmentMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "accuracy" => Ok(Self::Accuracy),
            "f1" => Ok(Self::F1),
            "mcc" => Ok(Self::Mcc),
            "spearman_correlation" => Ok(Self::SpearmanCorrelation),
            "clue_benchmark" => Ok(Self::ClueBenchmark),
            _ => Err(ConfigError::UnsupportedAssessment(s.to_string())),
        }
    }
}

impl fmt::Display for AssessmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accuracy => "accuracy",
            Self::F1 => "f1",
            Self::Mcc => "mcc",
            Self::SpearmanCorrelation => "spearman_correlation",
            Self::ClueBenchmark => "clue_benchmark",
        };
        write!(f, "{name}")
    }
}

/// Numeric precision of the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeType {
    Float32,
    Float16,
}

impl FromStr for ComputeType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "float32" | "fp32" => Ok(Self::Float32),
            "float16" | "fp16" => Ok(Self::Float16),
            _ => Err(ConfigError::UnsupportedComputeType(s.to_string())),
        }
    }
}

/// Shape of the network plus batching and precision.
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub batch_size: usize,
    pub seq_length: usize,
    pub hidden_size: usize,
    pub compute_type: ComputeType,
    pub bert: BertConfig,
}

#[derive(Deserialize)]
struct NetDims {
    hidden_size: usize,
    #[serde(default = "default_seq_length")]
    seq_length: usize,
}

fn default_seq_length() -> usize {
    DEFAULT_SEQ_LENGTH
}

/// BERT-base (Chinese vocabulary) network shape.
const BERT_BASE_CONFIG: &str = r#"{
    "vocab_size": 21128,
    "hidden_size": 768,
    "num_hidden_layers": 12,
    "num_attention_heads": 12,
    "intermediate_size": 3072,
    "hidden_act": "gelu",
    "hidden_dropout_prob": 0.1,
    "max_position_embeddings": 512,
    "type_vocab_size": 2,
    "initializer_range": 0.02,
    "layer_norm_eps": 1e-12,
    "pad_token_id": 0,
    "position_embedding_type": "absolute",
    "use_cache": false,
    "classifier_dropout": null,
    "model_type": "bert"
}"#;

impl NetConfig {
    /// Parses a BERT config document. `seq_length` is optional and defaults to 128.
    pub fn from_json(text: &str, path: &str) -> Result<Self> {
        let json_err = |source| ConfigError::Json {
            path: path.to_string(),
            source,
        };
        let bert: BertConfig = serde_json::from_str(text).map_err(json_err)?;
        let dims: NetDims = serde_json::from_str(text).map_err(json_err)?;
        Ok(Self {
            batch_size: 16,
            seq_length: dims.seq_length,
            hidden_size: dims.hidden_size,
            compute_type: ComputeType::Float32,
            bert,
        })
    }

    /// Reads a BERT config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text, &path.display().to_string())
    }

    /// The built-in BERT-base configuration.
    pub fn bert_base() -> Result<Self> {
        Self::from_json(BERT_BASE_CONFIG, "<bert-base>")
    }
}

/// Validated, immutable driver configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub device: DeviceTarget,
    pub assessment: AssessmentMethod,
    pub do_train: bool,
    pub do_eval: bool,
    pub use_crf: bool,
    pub epoch_num: usize,
    pub num_class: usize,
    pub vocab_file_path: Option<PathBuf>,
    pub label2id_file_path: Option<PathBuf>,
    pub save_finetune_checkpoint_path: Option<PathBuf>,
    pub load_pretrain_checkpoint_path: Option<PathBuf>,
    pub load_finetune_checkpoint_path: Option<PathBuf>,
    pub train_data_file_path: Option<PathBuf>,
    pub eval_data_file_path: Option<PathBuf>,
    pub schema_file_path: Option<PathBuf>,
    pub optimizer: OptimizerConfig,
    pub net: NetConfig,
}

fn parse_flag(flag: &'static str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            flag,
            value: value.to_string(),
        }),
    }
}

fn non_empty(path: &str) -> Option<PathBuf> {
    if path.is_empty() { None } else { Some(PathBuf::from(path)) }
}

impl RunConfig {
    /// Checks every precondition and freezes the configuration.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let do_train = parse_flag("do_train", &cli.do_train)?;
        let do_eval = parse_flag("do_eval", &cli.do_eval)?;
        let use_crf = parse_flag("use_crf", &cli.use_crf)?;
        let assessment: AssessmentMethod = cli.assessment_method.parse()?;

        if !do_train && !do_eval {
            return Err(ConfigError::NothingToDo);
        }
        if do_train && cli.train_data_file_path.is_empty() {
            return Err(ConfigError::MissingDataPath {
                flag: "train_data_file_path",
                task: "finetune",
            });
        }
        if do_eval && cli.eval_data_file_path.is_empty() {
            return Err(ConfigError::MissingDataPath {
                flag: "eval_data_file_path",
                task: "evaluation",
            });
        }
        let clue = assessment == AssessmentMethod::ClueBenchmark;
        if clue && cli.vocab_file_path.is_empty() {
            return Err(ConfigError::MissingPath {
                flag: "vocab_file_path",
                purpose: "do clue benchmark",
            });
        }
        if use_crf && cli.label2id_file_path.is_empty() {
            return Err(ConfigError::MissingPath {
                flag: "label2id_file_path",
                purpose: "use crf",
            });
        }
        if clue && cli.label2id_file_path.is_empty() {
            return Err(ConfigError::MissingPath {
                flag: "label2id_file_path",
                purpose: "do clue benchmark",
            });
        }

        let device = DeviceTarget::parse(&cli.device_target, cli.device_id)?;
        let optimizer = OptimizerConfig::from_name(&cli.optimizer)?;

        let mut net = match non_empty(&cli.bert_config_path) {
            Some(path) => NetConfig::load(&path)?,
            None => NetConfig::bert_base()?,
        };
        net.batch_size = if clue { 1 } else { cli.batch_size };
        net.compute_type = cli.compute_type.parse()?;
        if net.compute_type == ComputeType::Float16 {
            warn!("{device} only supports fp32 for now, running with fp32");
            net.compute_type = ComputeType::Float32;
        }

        Ok(Self {
            device,
            assessment,
            do_train,
            do_eval,
            use_crf,
            epoch_num: cli.epoch_num,
            num_class: cli.num_class,
            vocab_file_path: non_empty(&cli.vocab_file_path),
            label2id_file_path: non_empty(&cli.label2id_file_path),
            save_finetune_checkpoint_path: non_empty(&cli.save_finetune_checkpoint_path),
            load_pretrain_checkpoint_path: non_empty(&cli.load_pretrain_checkpoint_path),
            load_finetune_checkpoint_path: non_empty(&cli.load_finetune_checkpoint_path),
            train_data_file_path: non_empty(&cli.train_data_file_path),
            eval_data_file_path: non_empty(&cli.eval_data_file_path),
            schema_file_path: non_empty(&cli.schema_file_path),
            optimizer,
            net,
        })
    }
}
