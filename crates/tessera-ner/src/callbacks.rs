//! Hooks run by the training loop around every step and epoch.

use std::time::Instant;

use candle_nn::VarMap;
use tracing::info;

use crate::checkpoint::CheckpointSaver;
use crate::error::CheckpointError;

/// What the loop knows right after an optimizer step.
#[derive(Clone, Copy)]
pub struct StepOutput<'a> {
    /// 1-based epoch.
    pub epoch: usize,
    /// 1-based step inside the epoch.
    pub step_in_epoch: usize,
    /// 1-based step across all epochs.
    pub global_step: usize,
    pub loss: f32,
    pub overflow: bool,
    pub loss_scale: f64,
    pub varmap: &'a VarMap,
}

pub trait Callback {
    fn on_epoch_begin(&mut self, _epoch: usize) {}

    fn on_step_end(&mut self, _output: &StepOutput<'_>) -> Result<(), CheckpointError> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _epoch: usize) {}
}

/// Logs the loss of every step.
#[derive(Debug, Default)]
pub struct LossMonitor;

impl Callback for LossMonitor {
    fn on_step_end(&mut self, output: &StepOutput<'_>) -> Result<(), CheckpointError> {
        info!(
            "epoch: {}, step: {}, outputs are ({}, {}, {})",
            output.epoch, output.global_step, output.loss, output.overflow, output.loss_scale
        );
        Ok(())
    }
}

/// Logs how long each epoch and each of its steps took.
#[derive(Debug)]
pub struct TimeMonitor {
    steps_per_epoch: usize,
    started: Option<Instant>,
}

impl TimeMonitor {
    pub fn new(steps_per_epoch: usize) -> Self {
        Self {
            steps_per_epoch,
            started: None,
        }
    }
}

impl Callback for TimeMonitor {
    fn on_epoch_begin(&mut self, _epoch: usize) {
        self.started = Some(Instant::now());
    }

    fn on_epoch_end(&mut self, epoch: usize) {
        let Some(started) = self.started.take() else {
            return;
        };
        let epoch_ms = started.elapsed().as_secs_f64() * 1000.0;
        let step_ms = epoch_ms / self.steps_per_epoch.max(1) as f64;
        info!(epoch, "epoch time: {epoch_ms:.3} ms, per step time: {step_ms:.3} ms");
    }
}

impl Callback for CheckpointSaver {
    fn on_step_end(&mut self, output: &StepOutput<'_>) -> Result<(), CheckpointError> {
        self.on_step(
            output.varmap,
            output.epoch,
            output.step_in_epoch,
            output.global_step,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{Init, VarBuilder};

    fn output(varmap: &VarMap, epoch: usize, step: usize, global: usize) -> StepOutput<'_> {
        StepOutput {
            epoch,
            step_in_epoch: step,
            global_step: global,
            loss: 0.5,
            overflow: false,
            loss_scale: 1.0,
            varmap,
        }
    }

    #[test]
    fn time_monitor_resets_per_epoch() {
        let mut monitor = TimeMonitor::new(4);
        monitor.on_epoch_begin(1);
        assert!(monitor.started.is_some());
        monitor.on_epoch_end(1);
        assert!(monitor.started.is_none());
        monitor.on_epoch_end(2);
    }

    #[test]
    fn checkpoint_saver_as_callback() {
        let dir = tempfile::tempdir().unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        vb.get_with_hints((2, 2), "w", Init::Const(1.0)).unwrap();
        let mut callbacks: Vec<Box<dyn Callback>> = vec![
            Box::new(LossMonitor),
            Box::new(CheckpointSaver::new(dir.path(), "ner", 2, 1).unwrap()),
        ];
        for global in 1..=4 {
            let step = (global - 1) % 2 + 1;
            let epoch = (global - 1) / 2 + 1;
            for callback in &mut callbacks {
                callback.on_step_end(&output(&varmap, epoch, step, global)).unwrap();
            }
        }
        assert!(dir.path().join("ner-2_2.ckpt").exists());
        assert!(!dir.path().join("ner-1_2.ckpt").exists());
    }
}
