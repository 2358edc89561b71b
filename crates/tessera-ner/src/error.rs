use thiserror::Error;

/// Configuration and precondition failures of the NER driver.
///
/// Every variant is fatal and is raised before any model or dataset is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one of 'do_train' or 'do_eval' must be true")]
    NothingToDo,

    #[error("'{flag}' must be set when do {task} task")]
    MissingDataPath { flag: &'static str, task: &'static str },

    #[error("'{flag}' must be set to {purpose}")]
    MissingPath {
        flag: &'static str,
        purpose: &'static str,
    },

    #[error("invalid boolean for --{flag}: {value:?}, expected 'true' or 'false'")]
    InvalidFlag { flag: &'static str, value: String },

    #[error(
        "Assessment method not supported: {0:?}, support: [accuracy, f1, mcc, spearman_correlation, clue_benchmark]"
    )]
    UnsupportedAssessment(String),

    #[error("Target error: {0:?}, CPU or GPU is supported.")]
    UnsupportedTarget(String),

    #[error("Optimizer not supported: {0:?}. support: [AdamWeightDecayDynamicLR, Lamb, Momentum]")]
    UnsupportedOptimizer(String),

    #[error("Compute type not supported: {0:?}, support: [float32, float16]")]
    UnsupportedComputeType(String),

    #[error("Pretrain model missed, finetune task must load pretrain model!")]
    PretrainMissing,

    #[error("Finetune model missed, evaluation task must load finetune model!")]
    FinetuneMissing,

    #[error("label map {path} is empty")]
    EmptyLabelMap { path: String },

    #[error("label map {path}: {reason}")]
    InvalidLabelMap { path: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Failures while reading or writing `.ckpt` files.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("parameter {name} has shape {found:?} in the checkpoint but {expected:?} in the network")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("no checkpoint named {prefix}-{epoch}_{step}.ckpt in {dir}")]
    NotFound {
        dir: String,
        prefix: String,
        epoch: usize,
        step: usize,
    },

    #[error("parameter store lock poisoned")]
    LockPoisoned,

    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

/// Failures while loading a JSON-lines dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {source}")]
    Json {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}:{line}: column {column}: {reason}")]
    Schema {
        path: String,
        line: usize,
        column: String,
        reason: String,
    },

    #[error("{path}: dataset holds {records} records, fewer than one batch of {batch_size}")]
    TooSmall {
        path: String,
        records: usize,
        batch_size: usize,
    },

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}
