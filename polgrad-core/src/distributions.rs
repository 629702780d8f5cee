use crate::error::Result;
use candle_core::Tensor;
use std::fmt::Debug;

/// A family of probability distributions over actions.
///
/// The objectives never look inside `Params`; they only hand it back to the distribution.
pub trait ProbaDist: Debug + 'static {
    /// Output of the policy's function approximator for a batch of observations.
    type Params: Clone + Debug;

    /// Converts raw batched actions into the representation `log_proba` expects.
    fn preprocess_variate(&self, variate: &Tensor) -> Result<Tensor>;

    /// Log-density of each preprocessed variate, shape `(batch,)`.
    fn log_proba(&self, params: &Self::Params, variate: &Tensor) -> Result<Tensor>;

    /// Entropy per transition, shape `(batch,)`.
    fn entropy(&self, params: &Self::Params) -> Result<Tensor>;
}
