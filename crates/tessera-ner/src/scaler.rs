//! Dynamic loss scaling with gradient clipping and overflow detection.

use candle_core::backprop::GradStore;
use candle_core::{DType, Result, Tensor, Var};

/// Each gradient is clipped to this L2 norm after unscaling.
pub const GRADIENT_CLIP_NORM: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossScaleConfig {
    pub initial_scale: f64,
    pub factor: f64,
    pub window: usize,
}

impl Default for LossScaleConfig {
    fn default() -> Self {
        Self {
            initial_scale: 2f64.powi(32),
            factor: 2.0,
            window: 1000,
        }
    }
}

/// Loss scale that backs off on overflow and grows after a window of
/// clean steps.
#[derive(Debug, Clone)]
pub struct DynamicLossScaler {
    scale: f64,
    clean_steps: usize,
    config: LossScaleConfig,
}

impl Default for DynamicLossScaler {
    fn default() -> Self {
        Self::new(LossScaleConfig::default())
    }
}

impl DynamicLossScaler {
    pub fn new(config: LossScaleConfig) -> Self {
        Self {
            scale: config.initial_scale.max(1.0),
            clean_steps: 0,
            config,
        }
    }

    pub fn loss_scale(&self) -> f64 {
        self.scale
    }

    pub fn scale(&self, loss: &Tensor) -> Result<Tensor> {
        loss.affine(self.scale, 0.0)
    }

    /// Unscales and clips the gradients of `vars` in place.
    ///
    /// Returns `true` when any gradient is non-finite; the gradient store is
    /// left partially processed in that case and must not be applied.
    pub fn unscale_and_clip(&self, grads: &mut GradStore, vars: &[Var]) -> Result<bool> {
        let inv = 1.0 / self.scale;
        for var in vars {
            let Some(grad) = grads.remove(var.as_tensor()) else {
                continue;
            };
            let grad = grad.to_dtype(DType::F32)?.affine(inv, 0.0)?;
            let norm_sq = grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
            if !norm_sq.is_finite() {
                return Ok(true);
            }
            let norm = norm_sq.sqrt();
            let grad = if norm > GRADIENT_CLIP_NORM {
                grad.affine(GRADIENT_CLIP_NORM / norm, 0.0)?
            } else {
                grad
            };
            grads.insert(var.as_tensor(), grad);
        }
        Ok(false)
    }

    /// Records the outcome of a step.
    pub fn update(&mut self, overflow: bool) {
        if overflow {
            self.scale = (self.scale / self.config.factor).max(1.0);
            self.clean_steps = 0;
        } else {
            self.clean_steps += 1;
            if self.clean_steps >= self.config.window {
                self.scale *= self.config.factor;
                self.clean_steps = 0;
            }
        }
    }
}
