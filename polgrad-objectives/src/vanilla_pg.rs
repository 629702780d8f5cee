use crate::objective::{ObjectiveAux, ObjectiveCore, ObjectiveOutput, PolicyObjective};
use candle_core::{DType, Tensor};
use polgrad_core::{
    Result,
    batch::TransitionBatch,
    distributions::ProbaDist,
    hyperparams::Hyperparams,
    optimizer::PolicyOptimizer,
    policies::{Policy, PolicyState},
    regularizers::PolicyRegularizer,
    rng::{PrngKey, RngSequence},
    tensors::{Logp, ensure_finite, ensure_vector},
};

/// Importance weights are clipped to this range before use.
pub const WEIGHT_CLIP: (f32, f32) = (0.1, 10.);

/// Vanilla policy gradient, `J(theta; s, a) = w * A(s, a) * log pi_theta(a|s)`.
///
/// Batches need no propensities. Optional importance weights `w` are clipped to
/// [`WEIGHT_CLIP`], missing weights count as 1.
#[derive(Debug)]
pub struct VanillaPg<P: Policy> {
    core: ObjectiveCore<P>,
}

impl<P: Policy> VanillaPg<P> {
    pub const REQUIRES_PROPENSITIES: bool = false;

    pub const NAME: &'static str = "VanillaPg";

    pub fn new(
        pi: P,
        optimizer: Option<Box<dyn PolicyOptimizer>>,
        regularizer: Option<Box<dyn PolicyRegularizer<P::Dist>>>,
    ) -> Result<Self> {
        Ok(Self {
            core: ObjectiveCore::new(pi, optimizer, regularizer)?,
        })
    }
}

impl<P: Policy> PolicyObjective for VanillaPg<P> {
    type Policy = P;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn requires_propensities(&self) -> bool {
        Self::REQUIRES_PROPENSITIES
    }

    fn core(&self) -> &ObjectiveCore<P> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectiveCore<P> {
        &mut self.core
    }

    fn own_hyperparams(&self) -> Hyperparams {
        Hyperparams::empty()
    }

    fn objective_func(
        &self,
        state: &PolicyState<P>,
        _hyperparams: &Hyperparams,
        rng: PrngKey,
        transition_batch: &TransitionBatch,
        adv: &Tensor,
    ) -> Result<ObjectiveOutput<P>> {
        let batch_size = transition_batch.batch_size();
        ensure_vector("Adv", adv, batch_size)?;
        ensure_finite("Adv", adv)?;
        let mut rngs = RngSequence::new(rng);

        let pi = &self.core.pi;
        let (dist_params, state_new) =
            pi.function(state, rngs.next_key(), transition_batch.s(), true)?;
        let dist = pi.proba_dist();
        let a_raw = dist.preprocess_variate(transition_batch.a())?;
        let log_pi = Logp(dist.log_proba(&dist_params, &a_raw)?);
        ensure_vector("log_pi", &log_pi, batch_size)?;

        let w = match transition_batch.w() {
            Some(w) => w.to_dtype(DType::F32)?.clamp(WEIGHT_CLIP.0, WEIGHT_CLIP.1)?,
            None => Tensor::ones(batch_size, DType::F32, adv.device())?,
        };
        let objective = w.mul(adv)?.mul(&log_pi)?.sum_all()?;

        Ok(ObjectiveOutput {
            objective,
            aux: ObjectiveAux {
                dist_params,
                log_pi: log_pi.0,
                state_new,
            },
        })
    }
}
