use crate::{
    kind::ObjectiveKind,
    ppo_clip::{DEFAULT_EPSILON, PpoClip},
    vanilla_pg::VanillaPg,
};
use polgrad_candle_lm::{optimizer::OptimizerConfig, regularizers::EntropyRegularizerConfig};
use polgrad_core::{
    Result, optimizer::PolicyOptimizer, policies::Policy, regularizers::PolicyRegularizer,
};
use serde::{Deserialize, Serialize};

fn default_epsilon() -> f32 {
    DEFAULT_EPSILON
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectiveConfig {
    PpoClip {
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    VanillaPg,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self::PpoClip {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveBuilder {
    pub objective: ObjectiveConfig,
    pub optimizer: OptimizerConfig,
    pub entropy_regularizer: Option<EntropyRegularizerConfig>,
}

impl ObjectiveBuilder {
    pub fn new(objective: ObjectiveConfig) -> Self {
        Self {
            objective,
            ..Default::default()
        }
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_entropy_regularizer(mut self, regularizer: EntropyRegularizerConfig) -> Self {
        self.entropy_regularizer = Some(regularizer);
        self
    }

    pub fn build<P: Policy>(&self, pi: P) -> Result<ObjectiveKind<P>> {
        let optimizer: Box<dyn PolicyOptimizer> =
            Box::new(self.optimizer.build(pi.trainable_vars())?);
        let regularizer = match &self.entropy_regularizer {
            Some(config) => {
                Some(Box::new(config.build()?) as Box<dyn PolicyRegularizer<P::Dist>>)
            }
            None => None,
        };
        let objective: ObjectiveKind<P> = match self.objective {
            ObjectiveConfig::PpoClip { epsilon } => {
                PpoClip::new(pi, Some(optimizer), regularizer, epsilon)?.into()
            }
            ObjectiveConfig::VanillaPg => VanillaPg::new(pi, Some(optimizer), regularizer)?.into(),
        };
        Ok(objective)
    }
}
