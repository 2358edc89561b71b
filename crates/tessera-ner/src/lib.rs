//! # Tessera NER
//!
//! Fine-tuning and evaluation driver for a BERT token classifier with an
//! optional CRF head.
//!
//! The driver runs up to two phases. Training loads a pretrained checkpoint,
//! optimizes under dynamic loss scaling and writes one checkpoint per epoch.
//! Evaluation loads a fine-tuned checkpoint and either scores a labelled
//! dataset or writes a CLUENER submission.
//!
//! ```no_run
//! use clap::Parser;
//! use tessera_ner::{Cli, RunConfig};
//!
//! let config = RunConfig::from_cli(&Cli::parse())?;
//! tessera_ner::run(&config)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod callbacks;
pub mod checkpoint;
pub mod clue;
pub mod config;
pub mod crf;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod label_map;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod scaler;

pub use config::{AssessmentMethod, Cli, ComputeType, DeviceTarget, NetConfig, RunConfig};
pub use driver::run;
pub use error::{CheckpointError, ConfigError, DatasetError};
pub use label_map::LabelMap;
pub use model::BertNer;
pub use optim::OptimizerConfig;
