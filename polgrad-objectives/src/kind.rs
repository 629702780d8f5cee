use crate::{
    objective::{ObjectiveAux, ObjectiveCore, ObjectiveOutput, PolicyObjective},
    ppo_clip::PpoClip,
    vanilla_pg::VanillaPg,
};
use candle_core::Tensor;
use polgrad_core::{
    Result,
    batch::TransitionBatch,
    hyperparams::Hyperparams,
    metrics::Metrics,
    policies::{Policy, PolicyState},
    rng::PrngKey,
};

/// The closed set of objective strategies, for callers that pick one at runtime.
#[derive(Debug)]
pub enum ObjectiveKind<P: Policy> {
    PpoClip(PpoClip<P>),
    VanillaPg(VanillaPg<P>),
}

macro_rules! delegate {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            ObjectiveKind::PpoClip($inner) => $body,
            ObjectiveKind::VanillaPg($inner) => $body,
        }
    };
}

impl<P: Policy> From<PpoClip<P>> for ObjectiveKind<P> {
    fn from(objective: PpoClip<P>) -> Self {
        Self::PpoClip(objective)
    }
}

impl<P: Policy> From<VanillaPg<P>> for ObjectiveKind<P> {
    fn from(objective: VanillaPg<P>) -> Self {
        Self::VanillaPg(objective)
    }
}

impl<P: Policy> ObjectiveKind<P> {
    pub fn as_ppo_clip(&self) -> Option<&PpoClip<P>> {
        match self {
            Self::PpoClip(objective) => Some(objective),
            Self::VanillaPg(_) => None,
        }
    }

    pub fn as_ppo_clip_mut(&mut self) -> Option<&mut PpoClip<P>> {
        match self {
            Self::PpoClip(objective) => Some(objective),
            Self::VanillaPg(_) => None,
        }
    }
}

impl<P: Policy> PolicyObjective for ObjectiveKind<P> {
    type Policy = P;

    fn name(&self) -> &'static str {
        delegate!(self, o => o.name())
    }

    fn requires_propensities(&self) -> bool {
        delegate!(self, o => o.requires_propensities())
    }

    fn core(&self) -> &ObjectiveCore<P> {
        delegate!(self, o => o.core())
    }

    fn core_mut(&mut self) -> &mut ObjectiveCore<P> {
        delegate!(self, o => o.core_mut())
    }

    fn own_hyperparams(&self) -> Hyperparams {
        delegate!(self, o => o.own_hyperparams())
    }

    fn objective_func(
        &self,
        state: &PolicyState<P>,
        hyperparams: &Hyperparams,
        rng: PrngKey,
        transition_batch: &TransitionBatch,
        adv: &Tensor,
    ) -> Result<ObjectiveOutput<P>> {
        delegate!(self, o => o.objective_func(state, hyperparams, rng, transition_batch, adv))
    }

    fn objective_metrics(
        &self,
        aux: &ObjectiveAux<P>,
        transition_batch: &TransitionBatch,
        hyperparams: &Hyperparams,
    ) -> Result<Metrics> {
        delegate!(self, o => o.objective_metrics(aux, transition_batch, hyperparams))
    }
}
