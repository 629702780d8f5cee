use crate::{distributions::ProbaDist, error::Result, hyperparams::Hyperparams, metrics::Metrics};
use candle_core::Tensor;
use std::fmt::Debug;

/// An additive penalty on the policy loss.
pub trait PolicyRegularizer<D: ProbaDist>: Debug {
    fn name(&self) -> &'static str;

    fn hyperparams(&self) -> Hyperparams;

    /// Per-transition penalty, shape `(batch,)`. It is averaged and added to the loss, so its
    /// gradient flows into the same update as the objective's.
    fn penalty(&self, dist: &D, params: &D::Params, hyperparams: &Hyperparams) -> Result<Tensor>;

    fn metrics(&self, _dist: &D, _params: &D::Params, _hyperparams: &Hyperparams) -> Result<Metrics> {
        Ok(Metrics::default())
    }
}
