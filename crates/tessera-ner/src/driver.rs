//! # Driver
//!
//! Runs the configured phases in order: train, then evaluate. When both run,
//! evaluation loads the newest checkpoint the training phase wrote.

use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use tracing::{info, warn};

use crate::callbacks::{Callback, LossMonitor, StepOutput, TimeMonitor};
use crate::checkpoint::{CheckpointSaver, latest_checkpoint, load_param_into_net, make_directory};
use crate::clue::{self, CharTokenizer};
use crate::config::{AssessmentMethod, DeviceTarget, RunConfig};
use crate::dataset::NerDataset;
use crate::error::{CheckpointError, ConfigError};
use crate::label_map::LabelMap;
use crate::metrics::{Assessment, REPORT_RULE};
use crate::model::BertNer;
use crate::optim::TrainOptimizer;
use crate::scaler::DynamicLossScaler;

/// Prefix of every checkpoint the training phase writes.
pub const CHECKPOINT_PREFIX: &str = "ner";

/// Checkpoints kept on disk during training.
const KEEP_CHECKPOINT_MAX: usize = 1;

fn device(target: DeviceTarget) -> anyhow::Result<Device> {
    match target {
        DeviceTarget::Cpu => Ok(Device::Cpu),
        DeviceTarget::Gpu { device_id } => Device::new_cuda(device_id)
            .with_context(|| format!("failed to open GPU device {device_id}")),
    }
}

/// Labels and label count shared by both phases.
struct Labels {
    map: Option<LabelMap>,
    num_labels: usize,
    crf_tags: Option<(usize, usize)>,
}

impl Labels {
    fn load(config: &RunConfig) -> anyhow::Result<Self> {
        let needs_map = config.use_crf || config.assessment == AssessmentMethod::ClueBenchmark;
        let map = match (&config.label2id_file_path, needs_map) {
            (Some(path), true) => Some(LabelMap::load(path)?),
            _ => None,
        };
        if config.use_crf {
            let map = map
                .map(LabelMap::with_crf_tags)
                .ok_or(ConfigError::MissingPath {
                    flag: "label2id_file_path",
                    purpose: "use crf",
                })?;
            return Ok(Self {
                num_labels: map.len(),
                crf_tags: map.crf_tags(),
                map: Some(map),
            });
        }
        Ok(Self {
            map,
            num_labels: config.num_class,
            crf_tags: None,
        })
    }
}

fn build_network(
    config: &RunConfig,
    labels: &Labels,
    device: &Device,
) -> anyhow::Result<(VarMap, BertNer)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = BertNer::new(vb, &config.net, labels.num_labels, labels.crf_tags)?;
    Ok((varmap, model))
}

/// Runs every requested phase.
pub fn run(config: &RunConfig) -> anyhow::Result<()> {
    let device = device(config.device)?;
    let labels = Labels::load(config)?;
    let save_dir = match &config.save_finetune_checkpoint_path {
        Some(path) => make_directory(path)?,
        None => std::env::current_dir()?,
    };
    info!(
        device = %config.device,
        assessment = %config.assessment,
        use_crf = config.use_crf,
        num_labels = labels.num_labels,
        "configured"
    );

    let mut finetuned = config.load_finetune_checkpoint_path.clone();
    if config.do_train {
        let train_path = config
            .train_data_file_path
            .as_deref()
            .ok_or(ConfigError::MissingDataPath {
                flag: "train_data_file_path",
                task: "finetune",
            })?;
        let dataset = NerDataset::load(
            train_path,
            config.schema_file_path.as_deref(),
            config.net.batch_size,
            config.epoch_num,
        )?;
        train(config, &labels, &dataset, &save_dir, &device)?;

        if config.do_eval {
            let steps_per_epoch = dataset.dataset_size();
            let newest = latest_checkpoint(
                &save_dir,
                steps_per_epoch,
                dataset.repeat_count(),
                CHECKPOINT_PREFIX,
            )?
            .ok_or_else(|| CheckpointError::NotFound {
                dir: save_dir.display().to_string(),
                prefix: CHECKPOINT_PREFIX.to_string(),
                epoch: dataset.repeat_count(),
                step: steps_per_epoch,
            })?;
            finetuned = Some(newest);
        }
    }

    if config.do_eval {
        evaluate(config, &labels, finetuned.as_deref(), &save_dir, &device)?;
    }
    Ok(())
}

fn train(
    config: &RunConfig,
    labels: &Labels,
    dataset: &NerDataset,
    save_dir: &Path,
    device: &Device,
) -> anyhow::Result<()> {
    let pretrained = config
        .load_pretrain_checkpoint_path
        .as_deref()
        .ok_or(ConfigError::PretrainMissing)?;
    let steps_per_epoch = dataset.dataset_size();
    let epoch_num = dataset.repeat_count();

    let (varmap, model) = build_network(config, labels, device)?;
    load_param_into_net(&varmap, pretrained, device)?;

    let named: Vec<(String, candle_core::Var)> = varmap
        .data()
        .lock()
        .map_err(|_| CheckpointError::LockPoisoned)?
        .iter()
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect();
    let vars: Vec<candle_core::Var> = named.iter().map(|(_, var)| var.clone()).collect();
    let mut optimizer = TrainOptimizer::new(config.optimizer, named, steps_per_epoch * epoch_num)?;
    let mut scaler = DynamicLossScaler::default();

    let mut callbacks: Vec<Box<dyn Callback>> = vec![
        Box::new(TimeMonitor::new(steps_per_epoch)),
        Box::new(LossMonitor),
        Box::new(CheckpointSaver::new(
            save_dir,
            CHECKPOINT_PREFIX,
            steps_per_epoch,
            KEEP_CHECKPOINT_MAX,
        )?),
    ];
    info!(
        optimizer = config.optimizer.name(),
        steps_per_epoch, epoch_num, "fine-tuning"
    );

    let mut global_step = 0;
    for epoch in 1..=epoch_num {
        for callback in &mut callbacks {
            callback.on_epoch_begin(epoch);
        }
        for (index, batch) in dataset.batches(device).enumerate() {
            let batch = batch?;
            let loss = model.loss(
                &batch.input_ids,
                &batch.input_mask,
                &batch.segment_ids,
                &batch.label_ids,
            )?;
            let mut grads = scaler.scale(&loss)?.backward()?;
            let overflow = scaler.unscale_and_clip(&mut grads, &vars)?;
            if overflow {
                warn!(step = global_step + 1, scale = scaler.loss_scale(), "gradient overflow, step skipped");
            } else {
                optimizer.step(&grads)?;
            }
            let loss_scale = scaler.loss_scale();
            scaler.update(overflow);

            global_step += 1;
            let output = StepOutput {
                epoch,
                step_in_epoch: index + 1,
                global_step,
                loss: loss.to_scalar::<f32>()?,
                overflow,
                loss_scale,
                varmap: &varmap,
            };
            for callback in &mut callbacks {
                callback.on_step_end(&output)?;
            }
        }
        for callback in &mut callbacks {
            callback.on_epoch_end(epoch);
        }
    }
    Ok(())
}

fn evaluate(
    config: &RunConfig,
    labels: &Labels,
    checkpoint: Option<&Path>,
    save_dir: &Path,
    device: &Device,
) -> anyhow::Result<()> {
    let checkpoint = checkpoint.ok_or(ConfigError::FinetuneMissing)?;
    let eval_path: PathBuf = config
        .eval_data_file_path
        .clone()
        .ok_or(ConfigError::MissingDataPath {
            flag: "eval_data_file_path",
            task: "evaluation",
        })?;

    let (varmap, model) = build_network(config, labels, device)?;
    load_param_into_net(&varmap, checkpoint, device)?;

    let Some(mut assessment) = Assessment::new(config.assessment, config.use_crf, labels.num_labels)
    else {
        let vocab = config.vocab_file_path.as_deref().ok_or(ConfigError::MissingPath {
            flag: "vocab_file_path",
            purpose: "do clue benchmark",
        })?;
        let label_map = labels.map.as_ref().ok_or(ConfigError::MissingPath {
            flag: "label2id_file_path",
            purpose: "do clue benchmark",
        })?;
        let tokenizer = CharTokenizer::from_file(vocab, config.net.seq_length)?;
        clue::submit(&model, &tokenizer, label_map, &eval_path, save_dir, device)?;
        return Ok(());
    };

    let dataset = NerDataset::load(
        &eval_path,
        config.schema_file_path.as_deref(),
        config.net.batch_size,
        1,
    )?;
    for batch in dataset.batches(device) {
        let batch = batch?;
        let logits = model.predict(&batch.input_ids, &batch.input_mask, &batch.segment_ids)?;
        assessment.update(&logits, &batch.label_ids, model.crf())?;
    }

    println!("{REPORT_RULE}");
    for line in assessment.report() {
        println!("{line}");
    }
    println!("{REPORT_RULE}");
    Ok(())
}
