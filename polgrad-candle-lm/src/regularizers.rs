use candle_core::Tensor;
use polgrad_core::{
    ObjectiveError, Result, distributions::ProbaDist, hyperparams::Hyperparams, metrics::Metrics,
    regularizers::PolicyRegularizer,
};
use serde::{Deserialize, Serialize};

/// Rewards spread-out policies: the penalty is `-beta * H(pi)` per transition.
#[derive(Debug, Clone)]
pub struct EntropyRegularizer {
    beta: f32,
}

impl EntropyRegularizer {
    pub fn new(beta: f32) -> Result<Self> {
        if !beta.is_finite() || beta < 0. {
            return Err(ObjectiveError::config(format!(
                "entropy coefficient must be non-negative, got {beta}"
            )));
        }
        Ok(Self { beta })
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }
}

impl<D: ProbaDist> PolicyRegularizer<D> for EntropyRegularizer {
    fn name(&self) -> &'static str {
        "EntropyRegularizer"
    }

    fn hyperparams(&self) -> Hyperparams {
        Hyperparams::empty().with_float("beta", self.beta as f64)
    }

    fn penalty(&self, dist: &D, params: &D::Params, hyperparams: &Hyperparams) -> Result<Tensor> {
        let beta = hyperparams.float("beta")?;
        Ok(dist.entropy(params)?.affine(-beta, 0.)?)
    }

    fn metrics(&self, dist: &D, params: &D::Params, hyperparams: &Hyperparams) -> Result<Metrics> {
        let mut metrics = Metrics::default();
        let entropy = dist.entropy(params)?.mean_all()?.to_scalar::<f32>()?;
        metrics.record("EntropyRegularizer", "entropy", entropy);
        metrics.record("EntropyRegularizer", "beta", hyperparams.float("beta")? as f32);
        Ok(metrics)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyRegularizerConfig {
    pub beta: f32,
}

impl Default for EntropyRegularizerConfig {
    fn default() -> Self {
        Self { beta: 0.001 }
    }
}

impl EntropyRegularizerConfig {
    pub fn build(&self) -> Result<EntropyRegularizer> {
        EntropyRegularizer::new(self.beta)
    }
}
