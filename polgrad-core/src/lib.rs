pub mod batch;
pub mod distributions;
pub mod error;
pub mod hyperparams;
pub mod metrics;
pub mod optimizer;
pub mod policies;
pub mod regularizers;
pub mod rng;
pub mod tensors;

pub use error::{ObjectiveError, Result};
