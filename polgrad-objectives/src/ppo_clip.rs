use crate::objective::{ObjectiveAux, ObjectiveCore, ObjectiveOutput, PolicyObjective};
use candle_core::Tensor;
use polgrad_core::{
    ObjectiveError, Result,
    batch::TransitionBatch,
    distributions::ProbaDist,
    hyperparams::Hyperparams,
    metrics::Metrics,
    optimizer::PolicyOptimizer,
    policies::{Policy, PolicyState},
    regularizers::PolicyRegularizer,
    rng::{PrngKey, RngSequence},
    tensors::{Logp, Ratio, ensure_finite, ensure_vector},
};
use std::ops::Deref;

pub const DEFAULT_EPSILON: f32 = 0.2;

fn validate_epsilon(epsilon: f64) -> Result<f32> {
    if epsilon.is_finite() && epsilon > 0. {
        Ok(epsilon as f32)
    } else {
        Err(ObjectiveError::config(format!(
            "epsilon must be a positive float, got {epsilon}"
        )))
    }
}

/// Per-transition `min(adv * ratio, adv * clip(ratio, 1 - epsilon, 1 + epsilon))`, together with
/// the clipped ratio. The minimum is taken elementwise, before any reduction.
pub fn clipped_surrogate(ratio: &Tensor, adv: &Tensor, epsilon: f32) -> Result<(Tensor, Tensor)> {
    let ratio_clip = ratio.clamp(1. - epsilon, 1. + epsilon)?;
    let terms = Tensor::minimum(&adv.mul(ratio)?, &adv.mul(&ratio_clip)?)?;
    Ok((terms, ratio_clip))
}

/// PPO-clip policy objective.
///
/// ```text
/// J(theta; s, a) = min(rho * A(s, a), clip(rho, 1 - epsilon, 1 + epsilon) * A(s, a))
/// rho = pi_theta(a|s) / pi_old(a|s)
/// ```
///
/// The clipped ratio removes the incentive to move the policy further than `epsilon` away from
/// the policy that collected the batch, which allows somewhat more off-policy updates than the
/// vanilla policy gradient. `pi_old` comes from the batch's propensities.
#[derive(Debug)]
pub struct PpoClip<P: Policy> {
    core: ObjectiveCore<P>,
    epsilon: f32,
}

impl<P: Policy> PpoClip<P> {
    pub const REQUIRES_PROPENSITIES: bool = true;

    pub const NAME: &'static str = "PpoClip";

    pub fn new(
        pi: P,
        optimizer: Option<Box<dyn PolicyOptimizer>>,
        regularizer: Option<Box<dyn PolicyRegularizer<P::Dist>>>,
        epsilon: f32,
    ) -> Result<Self> {
        let epsilon = validate_epsilon(epsilon as f64)?;
        Ok(Self {
            core: ObjectiveCore::new(pi, optimizer, regularizer)?,
            epsilon,
        })
    }

    /// Default optimizer, no regularizer, `epsilon = 0.2`.
    pub fn with_defaults(pi: P) -> Result<Self> {
        Self::new(pi, None, None, DEFAULT_EPSILON)
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f32) -> Result<()> {
        self.epsilon = validate_epsilon(epsilon as f64)?;
        Ok(())
    }
}

impl<P: Policy> PolicyObjective for PpoClip<P> {
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
        Hyperparams::empty().with_float("epsilon", self.epsilon as f64)
    }

    fn objective_func(
        &self,
        state: &PolicyState<P>,
        hyperparams: &Hyperparams,
        rng: PrngKey,
        transition_batch: &TransitionBatch,
        adv: &Tensor,
    ) -> Result<ObjectiveOutput<P>> {
        let epsilon = validate_epsilon(hyperparams.float("epsilon")?)?;
        let batch_size = transition_batch.batch_size();
        ensure_vector("Adv", adv, batch_size)?;
        ensure_finite("Adv", adv)?;
        let logp_old = transition_batch.logp().ok_or_else(|| {
            ObjectiveError::config("PpoClip requires logP in the transition batch")
        })?;
        let mut rngs = RngSequence::new(rng);

        // distribution params from the function approximator
        let pi = &self.core.pi;
        let (dist_params, state_new) =
            pi.function(state, rngs.next_key(), transition_batch.s(), true)?;

        // probability ratios, logp_old is log(pi_old)
        let dist = pi.proba_dist();
        let a_raw = dist.preprocess_variate(transition_batch.a())?;
        let log_pi = Logp(dist.log_proba(&dist_params, &a_raw)?);
        ensure_vector("log_pi", &log_pi, batch_size)?;
        let ratio = Ratio((log_pi.deref() - logp_old)?.exp()?);
        ensure_vector("ratio", &ratio, batch_size)?;

        let (terms, ratio_clip) = clipped_surrogate(&ratio, adv, epsilon)?;
        ensure_vector("ratio_clip", &ratio_clip, batch_size)?;
        let objective = terms.sum_all()?;

        Ok(ObjectiveOutput {
            objective,
            aux: ObjectiveAux {
                dist_params,
                log_pi: log_pi.0,
                state_new,
            },
        })
    }

    fn objective_metrics(
        &self,
        aux: &ObjectiveAux<P>,
        transition_batch: &TransitionBatch,
        hyperparams: &Hyperparams,
    ) -> Result<Metrics> {
        let mut metrics = Metrics::default();
        let Some(logp_old) = transition_batch.logp() else {
            return Ok(metrics);
        };
        let epsilon = hyperparams.float("epsilon")? as f32;
        let log_pi: Vec<f32> = aux.log_pi.to_vec1()?;
        let logp_old: Vec<f32> = logp_old.to_vec1()?;
        if log_pi.is_empty() {
            return Ok(metrics);
        }
        let mut clipped = 0usize;
        let mut kl = 0f32;
        for (new, old) in log_pi.iter().zip(logp_old.iter()) {
            if ((new - old).exp() - 1.).abs() > epsilon {
                clipped += 1;
            }
            kl += old - new;
        }
        let n = log_pi.len() as f32;
        metrics.record(Self::NAME, "clip_fraction", clipped as f32 / n);
        metrics.record(Self::NAME, "approx_kl", kl / n);
        Ok(metrics)
    }
}
