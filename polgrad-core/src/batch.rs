use crate::{
    error::{ObjectiveError, Result},
    tensors::ensure_vector,
};
use candle_core::{DType, Device, Tensor};

/// A batch of transitions as consumed by the policy objectives.
///
/// `s` and `a` are batched along their first dimension. `logp` holds the log-probability of each
/// action under the policy that collected it (the propensity) and `w` optional importance weights.
/// All of them share the same non-zero batch size, which is checked on construction. `logp` and
/// `w` are stored as `f32`.
#[derive(Debug, Clone)]
pub struct TransitionBatch {
    s: Tensor,
    a: Tensor,
    logp: Option<Tensor>,
    w: Option<Tensor>,
}

impl TransitionBatch {
    pub fn new(s: Tensor, a: Tensor, logp: Option<Tensor>) -> Result<Self> {
        let batch_size = leading_dim("S", &s)?;
        if batch_size == 0 {
            return Err(ObjectiveError::Shape {
                what: "S",
                expected: "at least one transition".to_owned(),
                got: s.dims().to_vec(),
            });
        }
        let action_batch = leading_dim("A", &a)?;
        if action_batch != batch_size {
            return Err(ObjectiveError::Shape {
                what: "A",
                expected: format!("leading dimension {batch_size}"),
                got: a.dims().to_vec(),
            });
        }
        let logp = match logp {
            Some(logp) => {
                ensure_vector("logP", &logp, batch_size)?;
                Some(logp.to_dtype(DType::F32)?)
            }
            None => None,
        };
        Ok(Self { s, a, logp, w: None })
    }

    pub fn with_weights(mut self, w: Tensor) -> Result<Self> {
        ensure_vector("W", &w, self.batch_size())?;
        self.w = Some(w.to_dtype(DType::F32)?);
        Ok(self)
    }

    /// Stacks per-step observations and actions into a batch.
    pub fn from_steps(
        states: &[Tensor],
        actions: &[Tensor],
        logps: Option<&[f32]>,
        device: &Device,
    ) -> Result<Self> {
        if states.is_empty() {
            return Err(ObjectiveError::Shape {
                what: "S",
                expected: "at least one transition".to_owned(),
                got: vec![0],
            });
        }
        let s = Tensor::stack(states, 0)?;
        let a = Tensor::stack(actions, 0)?;
        let logp = logps
            .map(|logps| Tensor::from_slice(logps, logps.len(), device))
            .transpose()?;
        Self::new(s, a, logp)
    }

    pub fn s(&self) -> &Tensor {
        &self.s
    }

    pub fn a(&self) -> &Tensor {
        &self.a
    }

    pub fn logp(&self) -> Option<&Tensor> {
        self.logp.as_ref()
    }

    pub fn w(&self) -> Option<&Tensor> {
        self.w.as_ref()
    }

    pub fn has_propensities(&self) -> bool {
        self.logp.is_some()
    }

    pub fn batch_size(&self) -> usize {
        self.s.dims()[0]
    }
}

fn leading_dim(what: &'static str, t: &Tensor) -> Result<usize> {
    t.dims().first().copied().ok_or_else(|| ObjectiveError::Shape {
        what,
        expected: "at least one (batch) dimension".to_owned(),
        got: vec![],
    })
}
