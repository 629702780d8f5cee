use candle_core::{Var, backprop::GradStore};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use polgrad_core::{ObjectiveError, Result, optimizer::PolicyOptimizer};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::trace;

pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

/// Rescales the gradients of `vars` in place so that their global L2 norm is at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f32) -> Result<f32> {
    let mut total_norm_squared = 0f32;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = max_norm / (total_norm + 1e-6);
        trace!(total_norm, max_norm, clip_coef, "clipping gradient norm");
        for var in vars {
            let clipped = match grads.get(var.as_tensor()) {
                Some(grad) => grad.affine(clip_coef as f64, 0.)?,
                None => continue,
            };
            grads.insert(var.as_tensor(), clipped);
        }
    }
    Ok(total_norm)
}

/// A candle optimizer with optional global gradient-norm clipping.
pub struct OptimizerWithMaxGrad<O: Optimizer = AdamW> {
    pub optimizer: O,
    pub max_grad_norm: Option<f32>,
    vars: Vec<Var>,
}

impl<O: Optimizer + Debug> Debug for OptimizerWithMaxGrad<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerWithMaxGrad")
            .field("optimizer", &self.optimizer)
            .field("max_grad_norm", &self.max_grad_norm)
            .field("num_vars", &self.vars.len())
            .finish()
    }
}

impl<O: Optimizer> OptimizerWithMaxGrad<O> {
    /// `vars` must be the variables `optimizer` was built over.
    pub fn new(optimizer: O, max_grad_norm: Option<f32>, vars: Vec<Var>) -> Self {
        Self {
            optimizer,
            max_grad_norm,
            vars,
        }
    }
}

impl OptimizerWithMaxGrad<AdamW> {
    /// Plain Adam (no weight decay) with the given learning rate.
    pub fn adam(vars: Vec<Var>, learning_rate: f64) -> Result<Self> {
        OptimizerConfig {
            learning_rate,
            ..Default::default()
        }
        .build(vars)
    }
}

impl<O: Optimizer + Debug> PolicyOptimizer for OptimizerWithMaxGrad<O> {
    fn step(&mut self, mut grads: GradStore) -> Result<()> {
        if let Some(max_norm) = self.max_grad_norm {
            clip_grad_norm(&mut grads, &self.vars, max_norm)?;
        }
        self.optimizer.step(&grads)?;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.optimizer.set_learning_rate(lr)
    }

    fn max_grad_norm(&self) -> Option<f32> {
        self.max_grad_norm
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub max_grad_norm: Option<f32>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            weight_decay: 0.,
            max_grad_norm: None,
        }
    }
}

impl OptimizerConfig {
    pub fn build(&self, vars: Vec<Var>) -> Result<OptimizerWithMaxGrad<AdamW>> {
        if !(self.learning_rate > 0. && self.learning_rate.is_finite()) {
            return Err(ObjectiveError::config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        match self.max_grad_norm {
            Some(max_norm) if !(max_norm > 0.) => {
                return Err(ObjectiveError::config(format!(
                    "max_grad_norm must be positive, got {max_norm}"
                )));
            }
            _ => {}
        }
        let params = ParamsAdamW {
            lr: self.learning_rate,
            weight_decay: self.weight_decay,
            ..Default::default()
        };
        let optimizer = AdamW::new(vars.clone(), params)?;
        Ok(OptimizerWithMaxGrad::new(optimizer, self.max_grad_norm, vars))
    }
}
