//! # Optimizers
//!
//! The three optimizers the driver can fine-tune with, their learning-rate
//! schedule, and the wrapper the training loop drives them through.

use candle_core::backprop::GradStore;
use candle_core::{DType, Result, Tensor, Var};
use candle_nn::Optimizer;

use crate::error::ConfigError;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const LAMB_EPS: f64 = 1e-6;

/// Parameter names matched by the weight-decay filter.
const NO_DECAY: &[&str] = &["layernorm", "layer_norm", "bias", "gamma", "beta"];

/// Whether weight decay applies to the parameter called `name`.
pub fn decays(name: &str) -> bool {
    let lower = name.to_lowercase();
    !NO_DECAY.iter().any(|pattern| lower.contains(pattern))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamWeightDecayConfig {
    pub learning_rate: f64,
    pub end_learning_rate: f64,
    pub power: f64,
    pub weight_decay: f64,
    pub eps: f64,
}

impl Default for AdamWeightDecayConfig {
    fn default() -> Self {
        Self {
            learning_rate: 5e-5,
            end_learning_rate: 1e-7,
            power: 1.0,
            weight_decay: 1e-5,
            eps: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambConfig {
    pub start_learning_rate: f64,
    pub end_learning_rate: f64,
    pub power: f64,
    pub weight_decay: f64,
}

impl Default for LambConfig {
    fn default() -> Self {
        Self {
            start_learning_rate: 2e-5,
            end_learning_rate: 1e-7,
            power: 1.0,
            weight_decay: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumConfig {
    pub learning_rate: f64,
    pub momentum: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            learning_rate: 2e-5,
            momentum: 0.9,
        }
    }
}

/// Optimizer selected on the command line, with its hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerConfig {
    AdamWeightDecayDynamicLR(AdamWeightDecayConfig),
    Lamb(LambConfig),
    Momentum(MomentumConfig),
}

impl OptimizerConfig {
    pub fn from_name(name: &str) -> std::result::Result<Self, ConfigError> {
        match name {
            "AdamWeightDecayDynamicLR" => Ok(Self::AdamWeightDecayDynamicLR(Default::default())),
            "Lamb" => Ok(Self::Lamb(Default::default())),
            "Momentum" => Ok(Self::Momentum(Default::default())),
            other => Err(ConfigError::UnsupportedOptimizer(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AdamWeightDecayDynamicLR(_) => "AdamWeightDecayDynamicLR",
            Self::Lamb(_) => "Lamb",
            Self::Momentum(_) => "Momentum",
        }
    }

    /// Learning-rate schedule over `decay_steps` optimizer updates.
    pub fn schedule(&self, decay_steps: usize) -> PolynomialDecay {
        match *self {
            Self::AdamWeightDecayDynamicLR(cfg) => PolynomialDecay::new(
                cfg.learning_rate,
                cfg.end_learning_rate,
                cfg.power,
                decay_steps,
            ),
            Self::Lamb(cfg) => PolynomialDecay::new(
                cfg.start_learning_rate,
                cfg.end_learning_rate,
                cfg.power,
                decay_steps,
            ),
            Self::Momentum(cfg) => PolynomialDecay::constant(cfg.learning_rate),
        }
    }
}

/// Linear warmup over the first 10% of the steps, then polynomial decay
/// from the peak rate down to the end rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolynomialDecay {
    peak: f64,
    end: f64,
    power: f64,
    warmup_steps: usize,
    decay_steps: usize,
}

impl PolynomialDecay {
    pub fn new(peak: f64, end: f64, power: f64, decay_steps: usize) -> Self {
        Self {
            peak,
            end,
            power,
            warmup_steps: decay_steps / 10,
            decay_steps,
        }
    }

    /// A schedule that always returns `lr`.
    pub fn constant(lr: f64) -> Self {
        Self {
            peak: lr,
            end: lr,
            power: 1.0,
            warmup_steps: 0,
            decay_steps: 0,
        }
    }

    pub fn warmup_steps(&self) -> usize {
        self.warmup_steps
    }

    /// Rate for the update that follows `step` completed updates.
    pub fn learning_rate(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.peak * (step + 1) as f64 / self.warmup_steps as f64;
        }
        let span = self.decay_steps.saturating_sub(self.warmup_steps);
        if span == 0 {
            return self.end;
        }
        let progress = ((step - self.warmup_steps) as f64 / span as f64).min(1.0);
        (self.peak - self.end) * (1.0 - progress).powf(self.power) + self.end
    }
}

#[derive(Debug)]
struct Slot {
    var: Var,
    decay: bool,
    m: Tensor,
    v: Tensor,
}

impl Slot {
    fn new(var: Var, decay: bool) -> Result<Self> {
        let m = var.zeros_like()?.to_dtype(DType::F32)?;
        let v = m.clone();
        Ok(Self { var, decay, m, v })
    }

    fn param(&self) -> Result<Tensor> {
        self.var.as_tensor().to_dtype(DType::F32)
    }

    fn write(&self, value: &Tensor) -> Result<()> {
        self.var.set(&value.to_dtype(self.var.dtype())?)
    }
}

fn slots(vars: Vec<Var>) -> Result<Vec<Slot>> {
    vars.into_iter()
        .filter(|var| var.dtype().is_float())
        .map(|var| {
            let decay = var.rank() >= 2;
            Slot::new(var, decay)
        })
        .collect()
}

fn named_slots(vars: Vec<(String, Var)>) -> Result<Vec<Slot>> {
    vars.into_iter()
        .filter(|(_, var)| var.dtype().is_float())
        .map(|(name, var)| Slot::new(var, decays(&name)))
        .collect()
}

/// Adam with decoupled weight decay, without bias correction.
#[derive(Debug)]
pub struct AdamWeightDecay {
    slots: Vec<Slot>,
    lr: f64,
    weight_decay: f64,
    eps: f64,
}

impl AdamWeightDecay {
    /// Builds the optimizer from named parameters; the name decides whether
    /// weight decay applies.
    pub fn from_named(vars: Vec<(String, Var)>, cfg: AdamWeightDecayConfig) -> Result<Self> {
        Ok(Self {
            slots: named_slots(vars)?,
            lr: cfg.learning_rate,
            weight_decay: cfg.weight_decay,
            eps: cfg.eps,
        })
    }
}

impl Optimizer for AdamWeightDecay {
    type Config = AdamWeightDecayConfig;

    fn new(vars: Vec<Var>, cfg: Self::Config) -> Result<Self> {
        Ok(Self {
            slots: slots(vars)?,
            lr: cfg.learning_rate,
            weight_decay: cfg.weight_decay,
            eps: cfg.eps,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        for slot in &mut self.slots {
            let Some(grad) = grads.get(slot.var.as_tensor()) else {
                continue;
            };
            let grad = grad.to_dtype(DType::F32)?;
            slot.m = ((&slot.m * BETA1)? + (&grad * (1.0 - BETA1))?)?;
            slot.v = ((&slot.v * BETA2)? + (grad.sqr()? * (1.0 - BETA2))?)?;
            let param = slot.param()?;
            let mut update = slot.m.div(&(slot.v.sqrt()? + self.eps)?)?;
            if slot.decay {
                update = (update + (&param * self.weight_decay)?)?;
            }
            slot.write(&(param - (update * self.lr)?)?)?;
        }
        Ok(())
    }
}

/// Layer-wise adaptive moments (LAMB).
#[derive(Debug)]
pub struct Lamb {
    slots: Vec<Slot>,
    lr: f64,
    weight_decay: f64,
    step: i32,
}

impl Lamb {
    /// Builds the optimizer from named parameters; the name decides whether
    /// weight decay applies.
    pub fn from_named(vars: Vec<(String, Var)>, cfg: LambConfig) -> Result<Self> {
        Ok(Self {
            slots: named_slots(vars)?,
            lr: cfg.start_learning_rate,
            weight_decay: cfg.weight_decay,
            step: 0,
        })
    }
}

fn l2_norm(tensor: &Tensor) -> Result<f64> {
    Ok(tensor.sqr()?.sum_all()?.to_scalar::<f32>()?.sqrt() as f64)
}

impl Optimizer for Lamb {
    type Config = LambConfig;

    fn new(vars: Vec<Var>, cfg: Self::Config) -> Result<Self> {
        Ok(Self {
            slots: slots(vars)?,
            lr: cfg.start_learning_rate,
            weight_decay: cfg.weight_decay,
            step: 0,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step += 1;
        let correction1 = 1.0 - BETA1.powi(self.step);
        let correction2 = 1.0 - BETA2.powi(self.step);
        for slot in &mut self.slots {
            let Some(grad) = grads.get(slot.var.as_tensor()) else {
                continue;
            };
            let grad = grad.to_dtype(DType::F32)?;
            slot.m = ((&slot.m * BETA1)? + (&grad * (1.0 - BETA1))?)?;
            slot.v = ((&slot.v * BETA2)? + (grad.sqr()? * (1.0 - BETA2))?)?;
            let m_hat = (&slot.m / correction1)?;
            let v_hat = (&slot.v / correction2)?;
            let param = slot.param()?;
            let mut update = m_hat.div(&(v_hat.sqrt()? + LAMB_EPS)?)?;
            if slot.decay {
                update = (update + (&param * self.weight_decay)?)?;
            }
            let w_norm = l2_norm(&param)?;
            let g_norm = l2_norm(&update)?;
            let trust = if w_norm > 0.0 && g_norm > 0.0 {
                w_norm / g_norm
            } else {
                1.0
            };
            slot.write(&(param - (update * (self.lr * trust))?)?)?;
        }
        Ok(())
    }
}

/// SGD with heavy-ball momentum.
#[derive(Debug)]
pub struct Momentum {
    slots: Vec<Slot>,
    lr: f64,
    momentum: f64,
}

impl Optimizer for Momentum {
    type Config = MomentumConfig;

    fn new(vars: Vec<Var>, cfg: Self::Config) -> Result<Self> {
        Ok(Self {
            slots: slots(vars)?,
            lr: cfg.learning_rate,
            momentum: cfg.momentum,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        for slot in &mut self.slots {
            let Some(grad) = grads.get(slot.var.as_tensor()) else {
                continue;
            };
            let grad = grad.to_dtype(DType::F32)?;
            slot.m = ((&slot.m * self.momentum)? + grad)?;
            let param = slot.param()?;
            slot.write(&(param - (&slot.m * self.lr)?)?)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Inner {
    Adam(AdamWeightDecay),
    Lamb(Lamb),
    Momentum(Momentum),
}

/// The configured optimizer plus its schedule.
///
/// The schedule only advances on updates that were actually applied.
#[derive(Debug)]
pub struct TrainOptimizer {
    inner: Inner,
    schedule: PolynomialDecay,
    step: usize,
}

impl TrainOptimizer {
    pub fn new(
        config: OptimizerConfig,
        vars: Vec<(String, Var)>,
        decay_steps: usize,
    ) -> Result<Self> {
        let schedule = config.schedule(decay_steps);
        let inner = match config {
            OptimizerConfig::AdamWeightDecayDynamicLR(cfg) => {
                Inner::Adam(AdamWeightDecay::from_named(vars, cfg)?)
            }
            OptimizerConfig::Lamb(cfg) => Inner::Lamb(Lamb::from_named(vars, cfg)?),
            OptimizerConfig::Momentum(cfg) => {
                let vars = vars.into_iter().map(|(_, var)| var).collect();
                Inner::Momentum(Momentum::new(vars, cfg)?)
            }
        };
        Ok(Self {
            inner,
            schedule,
            step: 0,
        })
    }

    /// Number of applied updates.
    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn learning_rate(&self) -> f64 {
        self.schedule.learning_rate(self.step)
    }

    /// Applies one update with the scheduled learning rate.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        let lr = self.learning_rate();
        match &mut self.inner {
            Inner::Adam(opt) => {
                opt.set_learning_rate(lr);
                opt.step(grads)?;
            }
            Inner::Lamb(opt) => {
                opt.set_learning_rate(lr);
                opt.step(grads)?;
            }
            Inner::Momentum(opt) => {
                opt.set_learning_rate(lr);
                opt.step(grads)?;
            }
        }
        self.step += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn quadratic_grads(var: &Var) -> GradStore {
        // d/dw of sum(w^2) is 2w.
        var.as_tensor().sqr().unwrap().sum_all().unwrap().backward().unwrap()
    }

    #[test]
    fn from_name_defaults() {
        match OptimizerConfig::from_name("Lamb").unwrap() {
            OptimizerConfig::Lamb(cfg) => {
                assert_eq!(cfg.start_learning_rate, 2e-5);
                assert_eq!(cfg.weight_decay, 0.01);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            OptimizerConfig::from_name("Momentum").unwrap().name(),
            "Momentum"
        );
        assert!(matches!(
            OptimizerConfig::from_name("adam"),
            Err(ConfigError::UnsupportedOptimizer(_))
        ));
    }

    #[test]
    fn decay_filter_by_name() {
        assert!(decays("bert.encoder.layer.0.attention.self.query.weight"));
        assert!(!decays("bert.embeddings.LayerNorm.weight"));
        assert!(!decays("classifier.bias"));
    }

    #[test]
    fn polynomial_decay_shape() {
        let schedule = PolynomialDecay::new(1e-3, 0.0, 1.0, 100);
        assert_eq!(schedule.warmup_steps(), 10);
        assert!((schedule.learning_rate(0) - 1e-4).abs() < 1e-12);
        assert!((schedule.learning_rate(9) - 1e-3).abs() < 1e-12);
        assert!((schedule.learning_rate(10) - 1e-3).abs() < 1e-12);
        assert!((schedule.learning_rate(55) - 5e-4).abs() < 1e-12);
        assert!(schedule.learning_rate(100).abs() < 1e-12);
        assert!(schedule.learning_rate(500).abs() < 1e-12);
    }

    #[test]
    fn constant_schedule() {
        let schedule = PolynomialDecay::constant(0.1);
        assert_eq!(schedule.learning_rate(0), 0.1);
        assert_eq!(schedule.learning_rate(1000), 0.1);
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let var = Var::new(&[1f32, -2.0], &Device::Cpu).unwrap();
        let cfg = MomentumConfig {
            learning_rate: 0.1,
            momentum: 0.5,
        };
        let mut opt = Momentum::new(vec![var.clone()], cfg).unwrap();
        // v = 2w = [2, -4]; w = [0.8, -1.6]
        opt.step(&quadratic_grads(&var)).unwrap();
        // v = 0.5 * [2, -4] + [1.6, -3.2] = [2.6, -5.2]; w = [0.54, -1.08]
        opt.step(&quadratic_grads(&var)).unwrap();
        let w = var.as_tensor().to_vec1::<f32>().unwrap();
        assert!((w[0] - 0.54).abs() < 1e-5);
        assert!((w[1] + 1.08).abs() < 1e-5);
    }

    #[test]
    fn adam_first_step_without_bias_correction() {
        let var = Var::new(&[[1f32, 1.0], [1.0, 1.0]], &Device::Cpu).unwrap();
        let cfg = AdamWeightDecayConfig {
            learning_rate: 0.1,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut opt = AdamWeightDecay::new(vec![var.clone()], cfg).unwrap();
        opt.step(&quadratic_grads(&var)).unwrap();
        // m = 0.2, v = 0.004; update = 0.2 / (sqrt(0.004) + 1e-6)
        let expected = 1.0 - 0.1 * (0.2 / (0.004f64.sqrt() + 1e-6));
        let w = var.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for value in w {
            assert!((value as f64 - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn lamb_trust_ratio_scales_step() {
        let var = Var::new(&[[3f32, 4.0]], &Device::Cpu).unwrap();
        let cfg = LambConfig {
            start_learning_rate: 0.1,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut opt = Lamb::new(vec![var.clone()], cfg).unwrap();
        opt.step(&quadratic_grads(&var)).unwrap();
        // Bias-corrected first step gives update ~ sign(g) = [1, 1], norm sqrt(2);
        // ||w|| = 5, so each entry moves by 0.1 * 5 / sqrt(2).
        let delta = 0.1 * 5.0 / 2f64.sqrt();
        let w = var.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!((w[0] as f64 - (3.0 - delta)).abs() < 1e-3);
        assert!((w[1] as f64 - (4.0 - delta)).abs() < 1e-3);
    }

    #[test]
    fn train_optimizer_follows_schedule() {
        let var = Var::new(&[1f32], &Device::Cpu).unwrap();
        let config = OptimizerConfig::Momentum(MomentumConfig {
            learning_rate: 0.25,
            momentum: 0.0,
        });
        let mut opt = TrainOptimizer::new(config, vec![("w".into(), var.clone())], 10).unwrap();
        assert_eq!(opt.learning_rate(), 0.25);
        opt.step(&quadratic_grads(&var)).unwrap();
        assert_eq!(opt.steps(), 1);
        let w = var.as_tensor().to_vec1::<f32>().unwrap();
        assert!((w[0] - 0.5).abs() < 1e-6);
    }
}
