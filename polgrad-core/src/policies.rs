use crate::{distributions::ProbaDist, error::Result, rng::PrngKey};
use candle_core::{Tensor, Var};
use std::fmt::Debug;

pub type DistParams<P> = <<P as Policy>::Dist as ProbaDist>::Params;

pub type PolicyState<P> = <P as Policy>::State;

/// A parametrized policy. The trainable parameters are candle variables owned by the policy,
/// anything else the forward pass carries between calls lives in `State`.
pub trait Policy: Debug + 'static {
    type Dist: ProbaDist;
    type State: Clone + Debug;

    /// Forward pass. Must not mutate the policy: the updated state is returned and only committed
    /// by whoever applies the update.
    fn function(
        &self,
        state: &Self::State,
        rng: PrngKey,
        observations: &Tensor,
        is_training: bool,
    ) -> Result<(DistParams<Self>, Self::State)>;

    fn proba_dist(&self) -> &Self::Dist;

    fn state(&self) -> &Self::State;

    fn set_state(&mut self, state: Self::State);

    fn trainable_vars(&self) -> Vec<Var>;
}
