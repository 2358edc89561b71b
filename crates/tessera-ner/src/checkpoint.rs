//! # Checkpoints
//!
//! `.ckpt` files are safetensors archives of every named parameter. This
//! module loads them into a live parameter store, rotates the files written
//! during training and finds the newest one afterwards.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarMap;
use regex::Regex;
use tracing::{info, warn};

use crate::error::CheckpointError;

pub const CHECKPOINT_EXTENSION: &str = "ckpt";

type Result<T> = std::result::Result<T, CheckpointError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Creates `path` (and its parents) when missing.
pub fn make_directory(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        info!(dir = %path.display(), "creating checkpoint directory");
        std::fs::create_dir_all(path).map_err(io_error(path))?;
    }
    Ok(path.to_path_buf())
}

/// Writes every parameter of `varmap` to `path`.
pub fn save(varmap: &VarMap, path: &Path) -> Result<()> {
    varmap.save(path)?;
    Ok(())
}

/// Copies every tensor of the checkpoint at `path` whose name exists in
/// `varmap`. Returns the names of the network parameters the checkpoint did
/// not contain.
pub fn load_param_into_net(varmap: &VarMap, path: &Path, device: &Device) -> Result<Vec<String>> {
    let tensors = candle_core::safetensors::load(path, device)?;
    let data = varmap.data().lock().map_err(|_| CheckpointError::LockPoisoned)?;

    let mut missing = Vec::new();
    for (name, var) in data.iter() {
        let Some(tensor) = tensors.get(name) else {
            missing.push(name.clone());
            continue;
        };
        if tensor.dims() != var.dims() {
            return Err(CheckpointError::ShapeMismatch {
                name: name.clone(),
                expected: var.dims().to_vec(),
                found: tensor.dims().to_vec(),
            });
        }
        var.set(&tensor.to_dtype(var.dtype())?)?;
    }
    missing.sort();

    if !missing.is_empty() {
        warn!(
            checkpoint = %path.display(),
            "{} parameters are not loaded: {:?}",
            missing.len(),
            missing
        );
    }
    info!(
        checkpoint = %path.display(),
        loaded = data.len() - missing.len(),
        "checkpoint loaded"
    );
    Ok(missing)
}

fn checkpoint_pattern(prefix: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"^{}(?:_(\d+))?-(\d+)_(\d+)\.{CHECKPOINT_EXTENSION}$",
        regex::escape(prefix)
    ))
    .ok()
}

/// A checkpoint file name split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CheckpointName {
    suffix: Option<usize>,
    epoch: usize,
    step: usize,
}

fn parse_name(pattern: &Regex, file_name: &str) -> Option<CheckpointName> {
    let caps = pattern.captures(file_name)?;
    let suffix = match caps.get(1) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };
    Some(CheckpointName {
        suffix,
        epoch: caps.get(2)?.as_str().parse().ok()?,
        step: caps.get(3)?.as_str().parse().ok()?,
    })
}

fn checkpoints_in(dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, CheckpointName)>> {
    let Some(pattern) = checkpoint_pattern(prefix) else {
        return Ok(Vec::new());
    };
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(name) = parse_name(&pattern, file_name) {
            found.push((entry.path(), name));
        }
    }
    Ok(found)
}

/// Newest checkpoint of a finished run: the file whose epoch is `epoch_num`
/// and whose step is `steps_per_epoch`, preferring the highest `_n` suffix.
pub fn latest_checkpoint(
    dir: &Path,
    steps_per_epoch: usize,
    epoch_num: usize,
    prefix: &str,
) -> Result<Option<PathBuf>> {
    let best = checkpoints_in(dir, prefix)?
        .into_iter()
        .filter(|(_, name)| name.epoch == epoch_num && name.step == steps_per_epoch)
        .max_by_key(|(_, name)| name.suffix.unwrap_or(0))
        .map(|(path, _)| path);
    Ok(best)
}

/// Periodic checkpoint writer that keeps a bounded number of files.
#[derive(Debug)]
pub struct CheckpointSaver {
    dir: PathBuf,
    prefix: String,
    save_steps: usize,
    keep_max: usize,
    saved: VecDeque<PathBuf>,
}

impl CheckpointSaver {
    /// If `dir` already holds checkpoints named after `prefix`, the saver
    /// writes under `{prefix}_{n}` instead, `n` being one past the highest
    /// suffix present.
    pub fn new(dir: &Path, prefix: &str, save_steps: usize, keep_max: usize) -> Result<Self> {
        make_directory(dir)?;
        let existing = checkpoints_in(dir, prefix)?;
        let prefix = if existing.is_empty() {
            prefix.to_string()
        } else {
            let next = existing
                .iter()
                .map(|(_, name)| name.suffix.unwrap_or(0))
                .max()
                .unwrap_or(0)
                + 1;
            format!("{prefix}_{next}")
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix,
            save_steps: save_steps.max(1),
            keep_max: keep_max.max(1),
            saved: VecDeque::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path_for(&self, epoch: usize, step_in_epoch: usize) -> PathBuf {
        self.dir.join(format!(
            "{}-{epoch}_{step_in_epoch}.{CHECKPOINT_EXTENSION}",
            self.prefix
        ))
    }

    /// Saves when `global_step` is a multiple of the save interval.
    pub fn on_step(
        &mut self,
        varmap: &VarMap,
        epoch: usize,
        step_in_epoch: usize,
        global_step: usize,
    ) -> Result<Option<PathBuf>> {
        if global_step % self.save_steps != 0 {
            return Ok(None);
        }
        while self.saved.len() >= self.keep_max {
            if let Some(old) = self.saved.pop_front() {
                if old.exists() {
                    std::fs::remove_file(&old).map_err(io_error(&old))?;
                }
            }
        }
        let path = self.path_for(epoch, step_in_epoch);
        save(varmap, &path)?;
        info!(checkpoint = %path.display(), "checkpoint saved");
        self.saved.push_back(path.clone());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Tensor};
    use candle_nn::{Init, VarBuilder};

    fn varmap_with(names: &[(&str, (usize, usize))]) -> VarMap {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        for (name, shape) in names {
            vb.get_with_hints(*shape, name, Init::Const(0.0)).unwrap();
        }
        varmap
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.ckpt");

        let source = varmap_with(&[("a", (2, 2)), ("b", (1, 3))]);
        source
            .data()
            .lock()
            .unwrap()
            .get("a")
            .unwrap()
            .set(&Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap())
            .unwrap();
        save(&source, &path).unwrap();

        let target = varmap_with(&[("a", (2, 2)), ("c", (4, 1))]);
        let missing = load_param_into_net(&target, &path, &Device::Cpu).unwrap();
        assert_eq!(missing, vec!["c".to_string()]);
        let a = target.data().lock().unwrap()["a"]
            .as_tensor()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert_eq!(a, 4.0);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.ckpt");
        save(&varmap_with(&[("a", (2, 2))]), &path).unwrap();

        let target = varmap_with(&[("a", (3, 2))]);
        let err = load_param_into_net(&target, &path, &Device::Cpu).unwrap_err();
        assert!(matches!(err, CheckpointError::ShapeMismatch { .. }));
    }

    #[test]
    fn latest_checkpoint_prefers_highest_suffix() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ner-2_10.ckpt");
        touch(dir.path(), "ner_1-2_10.ckpt");
        touch(dir.path(), "ner_3-2_10.ckpt");
        touch(dir.path(), "ner_4-1_10.ckpt");
        touch(dir.path(), "ner_5-2_9.ckpt");
        touch(dir.path(), "nerd-2_10.ckpt");
        touch(dir.path(), "ner_7-2_10.meta");

        let found = latest_checkpoint(dir.path(), 10, 2, "ner").unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "ner_3-2_10.ckpt");

        assert!(latest_checkpoint(dir.path(), 10, 3, "ner").unwrap().is_none());
    }

    #[test]
    fn latest_checkpoint_without_suffix() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ner-1_4.ckpt");
        let found = latest_checkpoint(dir.path(), 4, 1, "ner").unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "ner-1_4.ckpt");
    }

    #[test]
    fn saver_renames_prefix_and_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = CheckpointSaver::new(dir.path(), "ner", 2, 1).unwrap();
        assert_eq!(fresh.prefix(), "ner");

        touch(dir.path(), "ner-1_2.ckpt");
        touch(dir.path(), "ner_2-1_2.ckpt");
        let mut saver = CheckpointSaver::new(dir.path(), "ner", 2, 1).unwrap();
        assert_eq!(saver.prefix(), "ner_3");

        let varmap = varmap_with(&[("w", (1, 1))]);
        assert!(saver.on_step(&varmap, 1, 1, 1).unwrap().is_none());
        let first = saver.on_step(&varmap, 1, 2, 2).unwrap().unwrap();
        assert!(first.ends_with("ner_3-1_2.ckpt"));
        let second = saver.on_step(&varmap, 2, 2, 4).unwrap().unwrap();
        assert!(second.exists());
        assert!(!first.exists());
    }

    #[test]
    fn make_directory_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        assert_eq!(make_directory(&nested).unwrap(), nested);
        assert!(nested.is_dir());
        make_directory(&nested).unwrap();
    }
}
