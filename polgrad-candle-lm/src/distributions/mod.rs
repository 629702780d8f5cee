pub mod categorical_distribution;
pub mod diagonal_distribution;

use candle_core::Tensor;
use polgrad_core::{Result, distributions::ProbaDist};

pub use categorical_distribution::CategoricalDistribution;
pub use diagonal_distribution::{DiagGaussianDistribution, DiagGaussianParams};

/// A distribution whose parameters are read off the output of a network head.
pub trait HeadDistribution: ProbaDist + Clone {
    /// Width of the network output this distribution consumes.
    fn head_dim(&self) -> usize;

    fn params_from_head(&self, head: Tensor) -> Result<Self::Params>;
}
