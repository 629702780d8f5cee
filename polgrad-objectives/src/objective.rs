use crate::diagnostics::GradDiagnostics;
use candle_core::{Tensor, Var, backprop::GradStore};
use polgrad_candle_lm::optimizer::{DEFAULT_LEARNING_RATE, OptimizerWithMaxGrad};
use polgrad_core::{
    ObjectiveError, Result,
    batch::TransitionBatch,
    hyperparams::Hyperparams,
    metrics::Metrics,
    optimizer::PolicyOptimizer,
    policies::{DistParams, Policy, PolicyState},
    regularizers::PolicyRegularizer,
    rng::PrngKey,
    tensors::PolicyLoss,
};
use tracing::{debug, warn};

/// Data computed by an objective's forward pass that downstream consumers (the regularizer, the
/// diagnostics, the state commit) reuse instead of running the policy a second time.
#[derive(Debug)]
pub struct ObjectiveAux<P: Policy> {
    pub dist_params: DistParams<P>,
    pub log_pi: Tensor,
    pub state_new: PolicyState<P>,
}

#[derive(Debug)]
pub struct ObjectiveOutput<P: Policy> {
    /// Scalar to be maximized.
    pub objective: Tensor,
    pub aux: ObjectiveAux<P>,
}

pub struct GradsAndMetrics<P: Policy> {
    pub grads: GradStore,
    pub state_new: PolicyState<P>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateStatus {
    Applied,
    /// Nothing was applied, the policy and optimizer are unchanged.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub status: UpdateStatus,
    pub metrics: Metrics,
}

impl UpdateReport {
    pub fn is_applied(&self) -> bool {
        self.status == UpdateStatus::Applied
    }
}

/// State shared by every objective: the policy being optimized, its optimizer and an optional
/// regularizer.
#[derive(Debug)]
pub struct ObjectiveCore<P: Policy> {
    pub pi: P,
    pub optimizer: Box<dyn PolicyOptimizer>,
    pub regularizer: Option<Box<dyn PolicyRegularizer<P::Dist>>>,
}

impl<P: Policy> ObjectiveCore<P> {
    /// Without an explicit optimizer, Adam with a learning rate of 1e-3 over all of the policy's
    /// trainable variables is used.
    pub fn new(
        pi: P,
        optimizer: Option<Box<dyn PolicyOptimizer>>,
        regularizer: Option<Box<dyn PolicyRegularizer<P::Dist>>>,
    ) -> Result<Self> {
        let optimizer = match optimizer {
            Some(optimizer) => optimizer,
            None => Box::new(OptimizerWithMaxGrad::adam(
                pi.trainable_vars(),
                DEFAULT_LEARNING_RATE,
            )?),
        };
        Ok(Self {
            pi,
            optimizer,
            regularizer,
        })
    }

    pub fn regularizer_hyperparams(&self) -> Hyperparams {
        self.regularizer
            .as_ref()
            .map(|reg| reg.hyperparams())
            .unwrap_or_default()
    }
}

/// The contract shared by all policy objectives.
///
/// Implementors provide `objective_func`, a pure function of the policy parameters, the function
/// state and a batch, plus access to their `ObjectiveCore`. Everything else (propensity checks,
/// hyperparameter snapshots, the gradient step and its diagnostics) is provided.
pub trait PolicyObjective {
    type Policy: Policy;

    fn name(&self) -> &'static str;

    /// Whether batches must carry the behavior policy's log-probabilities.
    fn requires_propensities(&self) -> bool;

    fn core(&self) -> &ObjectiveCore<Self::Policy>;

    fn core_mut(&mut self) -> &mut ObjectiveCore<Self::Policy>;

    /// The objective's own tunables, without the regularizer's.
    fn own_hyperparams(&self) -> Hyperparams;

    fn objective_func(
        &self,
        state: &PolicyState<Self::Policy>,
        hyperparams: &Hyperparams,
        rng: PrngKey,
        transition_batch: &TransitionBatch,
        adv: &Tensor,
    ) -> Result<ObjectiveOutput<Self::Policy>>;

    /// Strategy specific diagnostics computed from the auxiliary output.
    fn objective_metrics(
        &self,
        _aux: &ObjectiveAux<Self::Policy>,
        _transition_batch: &TransitionBatch,
        _hyperparams: &Hyperparams,
    ) -> Result<Metrics> {
        Ok(Metrics::default())
    }

    fn pi(&self) -> &Self::Policy {
        &self.core().pi
    }

    /// Fresh snapshot of the current hyperparameters, rebuilt on every call.
    fn hyperparams(&self) -> Hyperparams {
        self.own_hyperparams()
            .with_nested("regularizer", self.core().regularizer_hyperparams())
    }

    fn check_propensities(&self, transition_batch: &TransitionBatch) -> Result<()> {
        if self.requires_propensities() && !transition_batch.has_propensities() {
            return Err(ObjectiveError::config(format!(
                "{} requires propensities, but the transition batch has no logP",
                self.name()
            )));
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.core().optimizer.learning_rate()
    }

    fn set_optimizer(&mut self, optimizer: Box<dyn PolicyOptimizer>) {
        self.core_mut().optimizer = optimizer;
    }

    /// Gradients of the loss `-objective + mean(penalty)` with respect to the policy's trainable
    /// variables, without applying them.
    fn grads_and_metrics(
        &self,
        transition_batch: &TransitionBatch,
        adv: &Tensor,
        rng: PrngKey,
    ) -> Result<GradsAndMetrics<Self::Policy>> {
        self.check_propensities(transition_batch)?;
        let name = self.name();
        let hyperparams = self.hyperparams();
        let core = self.core();
        let ObjectiveOutput { objective, aux } =
            self.objective_func(core.pi.state(), &hyperparams, rng, transition_batch, adv)?;

        let mut metrics = Metrics::default();
        let loss_bare = objective.neg()?;
        let loss = PolicyLoss(match &core.regularizer {
            Some(regularizer) => {
                let reg_hyperparams = hyperparams.nested("regularizer");
                let dist = core.pi.proba_dist();
                let penalty = regularizer
                    .penalty(dist, &aux.dist_params, &reg_hyperparams)?
                    .mean_all()?;
                metrics.extend(regularizer.metrics(dist, &aux.dist_params, &reg_hyperparams)?);
                (&loss_bare + &penalty)?
            }
            None => loss_bare.clone(),
        });
        let loss_value = loss.to_scalar::<f32>()?;
        if !loss_value.is_finite() {
            return Err(ObjectiveError::numeric(format!(
                "{name} produced a non-finite loss {loss_value}"
            )));
        }

        let grads = loss.backward()?;
        let diagnostics = GradDiagnostics::compute(&grads, &core.pi.trainable_vars())?;
        if !diagnostics.finite {
            return Err(ObjectiveError::numeric(format!(
                "{name} produced non-finite gradients"
            )));
        }
        metrics.record(name, "loss", loss_value);
        metrics.record(name, "loss_bare", loss_bare.to_scalar::<f32>()?);
        diagnostics.record(&mut metrics, name);
        metrics.extend(self.objective_metrics(&aux, transition_batch, &hyperparams)?);

        Ok(GradsAndMetrics {
            grads,
            state_new: aux.state_new,
            metrics,
        })
    }

    /// Steps the optimizer and commits the function state produced by the forward pass.
    fn apply_grads(&mut self, grads: GradStore, state_new: PolicyState<Self::Policy>) -> Result<()> {
        let core = self.core_mut();
        core.optimizer.step(grads)?;
        core.pi.set_state(state_new);
        Ok(())
    }

    /// One gradient step on the batch.
    ///
    /// Configuration and shape problems are returned as errors. Non-finite advantages, losses or
    /// gradients are not: the step is skipped and the report says why, so a training loop can
    /// move on to the next batch.
    fn update(
        &mut self,
        transition_batch: &TransitionBatch,
        adv: &Tensor,
        rng: PrngKey,
    ) -> Result<UpdateReport> {
        let GradsAndMetrics {
            grads,
            state_new,
            metrics,
        } = match self.grads_and_metrics(transition_batch, adv, rng) {
            Ok(grads_and_metrics) => grads_and_metrics,
            Err(ObjectiveError::Numeric(reason)) => {
                warn!(objective = self.name(), %reason, "skipping policy update");
                return Ok(UpdateReport {
                    status: UpdateStatus::Skipped { reason },
                    metrics: Metrics::default(),
                });
            }
            Err(err) => return Err(err),
        };
        self.apply_grads(grads, state_new)?;
        debug!(
            objective = self.name(),
            loss = ?metrics.get(&format!("{}/loss", self.name())),
            grads_norm = ?metrics.get(&format!("{}/grads_norm", self.name())),
            "policy update applied"
        );
        Ok(UpdateReport {
            status: UpdateStatus::Applied,
            metrics,
        })
    }
}

/// Averages the gradients of several workers into one store, to be applied in a single step.
/// A variable missing from a worker's store counts as a zero gradient for that worker.
pub fn average_grads(grads: Vec<GradStore>, vars: &[Var]) -> Result<GradStore> {
    let num_workers = grads.len();
    let mut stores = grads.into_iter();
    let Some(mut averaged) = stores.next() else {
        return Err(ObjectiveError::config("no gradients to average"));
    };
    let rest: Vec<GradStore> = stores.collect();
    let scale = 1. / num_workers as f64;
    for var in vars {
        let t = var.as_tensor();
        let mut sum: Option<Tensor> = averaged.get(t).cloned();
        for store in &rest {
            if let Some(grad) = store.get(t) {
                sum = Some(match sum {
                    Some(acc) => (acc + grad)?,
                    None => grad.clone(),
                });
            }
        }
        if let Some(sum) = sum {
            averaged.insert(t, sum.affine(scale, 0.)?);
        }
    }
    Ok(averaged)
}
