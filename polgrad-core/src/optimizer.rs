use crate::error::Result;
use candle_core::backprop::GradStore;
use std::fmt::Debug;

/// Applies a gradient store to the variables an optimizer was built over.
pub trait PolicyOptimizer: Debug {
    fn step(&mut self, grads: GradStore) -> Result<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    fn max_grad_norm(&self) -> Option<f32> {
        None
    }
}
