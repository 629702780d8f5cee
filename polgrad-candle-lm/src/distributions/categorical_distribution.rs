use super::HeadDistribution;
use candle_core::{DType, Tensor};
use candle_nn::ops::{log_softmax, softmax};
use polgrad_core::{ObjectiveError, Result, distributions::ProbaDist};

/// Categorical distribution over `action_size` discrete actions, parametrized by logits.
#[derive(Clone, Debug)]
pub struct CategoricalDistribution {
    action_size: usize,
}

impl CategoricalDistribution {
    pub fn new(action_size: usize) -> Self {
        Self { action_size }
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    fn one_hot(&self, indices: &Tensor) -> Result<Tensor> {
        let device = indices.device();
        let indices: Vec<u32> = indices.to_dtype(DType::U32)?.to_vec1()?;
        let batch_size = indices.len();
        // TODO: there is a one_hot function in candle_nn::encoding, switch once actions are stored as u32
        let mut mask = vec![0f32; batch_size * self.action_size];
        for (row, action) in indices.into_iter().enumerate() {
            let action = action as usize;
            if action >= self.action_size {
                return Err(ObjectiveError::config(format!(
                    "action {action} out of range for {} categories",
                    self.action_size
                )));
            }
            mask[row * self.action_size + action] = 1.;
        }
        Ok(Tensor::from_vec(
            mask,
            (batch_size, self.action_size),
            device,
        )?)
    }
}

impl ProbaDist for CategoricalDistribution {
    type Params = Tensor;

    /// Accepts either action indices `(batch,)` or one-hot rows `(batch, action_size)`.
    fn preprocess_variate(&self, variate: &Tensor) -> Result<Tensor> {
        match variate.dims() {
            [_, n] if *n == self.action_size => Ok(variate.to_dtype(DType::F32)?),
            [_] => self.one_hot(variate),
            dims => Err(ObjectiveError::Shape {
                what: "categorical variate",
                expected: format!("(batch,) or (batch, {})", self.action_size),
                got: dims.to_vec(),
            }),
        }
    }

    fn log_proba(&self, logits: &Tensor, variate: &Tensor) -> Result<Tensor> {
        let log_probs = log_softmax(logits, 1)?;
        Ok(variate.mul(&log_probs)?.sum(1)?)
    }

    fn entropy(&self, logits: &Tensor) -> Result<Tensor> {
        let log_probs = log_softmax(logits, 1)?;
        let probs = softmax(logits, 1)?;
        Ok(probs.mul(&log_probs)?.sum(1)?.neg()?)
    }
}

impl HeadDistribution for CategoricalDistribution {
    fn head_dim(&self) -> usize {
        self.action_size
    }

    fn params_from_head(&self, head: Tensor) -> Result<Tensor> {
        Ok(head)
    }
}
