use crate::{
    distributions::{CategoricalDistribution, DiagGaussianDistribution, HeadDistribution},
    mlp::Mlp,
    obs_norm::ObsNormState,
};
use candle_core::{DType, Device, Shape, Tensor, Var};
use candle_nn::{Activation, Init, Module, VarBuilder, VarMap};
use polgrad_core::{
    ObjectiveError, Result,
    policies::Policy,
    rng::{PrngKey, RngSequence},
};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub hidden_layers: Vec<usize>,
    /// Keep running observation statistics as function state and normalize with them.
    pub normalize_observations: bool,
    /// Dropout probability on the input features, training mode only.
    pub dropout: Option<f32>,
    /// Initial log standard deviation of gaussian policies.
    pub log_std_init: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 64],
            normalize_observations: false,
            dropout: None,
            log_std_init: 0.,
        }
    }
}

/// An MLP policy: observations go through `net`, whose output parametrizes `D`.
pub struct SequentialPolicy<D: HeadDistribution> {
    net: Mlp,
    dist: D,
    varmap: VarMap,
    state: Option<ObsNormState>,
    dropout: Option<f32>,
    obs_dim: usize,
}

impl<D: HeadDistribution> std::fmt::Debug for SequentialPolicy<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialPolicy")
            .field("net", &self.net)
            .field("dist", &self.dist)
            .field("state", &self.state)
            .field("dropout", &self.dropout)
            .field("obs_dim", &self.obs_dim)
            .finish()
    }
}

impl SequentialPolicy<CategoricalDistribution> {
    pub fn categorical(
        obs_dim: usize,
        action_size: usize,
        config: &PolicyConfig,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let dist = CategoricalDistribution::new(action_size);
        Self::build(obs_dim, dist, varmap, &vb, config, device)
    }
}

impl SequentialPolicy<DiagGaussianDistribution> {
    pub fn diag_gaussian(
        obs_dim: usize,
        action_dim: usize,
        config: &PolicyConfig,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let log_std = vb.get_with_hints(
            action_dim,
            "log_std",
            Init::Const(config.log_std_init as f64),
        )?;
        let dist = DiagGaussianDistribution::new(action_dim, log_std);
        Self::build(obs_dim, dist, varmap, &vb, config, device)
    }
}

impl<D: HeadDistribution> SequentialPolicy<D> {
    fn build(
        obs_dim: usize,
        dist: D,
        varmap: VarMap,
        vb: &VarBuilder,
        config: &PolicyConfig,
        device: &Device,
    ) -> Result<Self> {
        if let Some(p) = config.dropout {
            if !(0. ..1.).contains(&p) {
                return Err(ObjectiveError::config(format!(
                    "dropout must be in [0, 1), got {p}"
                )));
            }
        }
        let layers = [&config.hidden_layers[..], &[dist.head_dim()]].concat();
        let net = Mlp::build(obs_dim, &layers, Activation::Relu, vb, "policy")?;
        let state = if config.normalize_observations {
            Some(ObsNormState::new(obs_dim, device)?)
        } else {
            None
        };
        Ok(Self {
            net,
            dist,
            varmap,
            state,
            dropout: config.dropout,
            obs_dim,
        })
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Log-probabilities of `actions` under the current parameters, detached from the graph.
    /// This is what a sampler records as propensities.
    pub fn propensities(&self, observations: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let (params, _) = self.function(&self.state, PrngKey::new(0), observations, false)?;
        let variate = self.dist.preprocess_variate(actions)?;
        Ok(self.dist.log_proba(&params, &variate)?.detach())
    }
}

fn dropout_mask(key: PrngKey, shape: &Shape, p: f32, device: &Device) -> Result<Tensor> {
    let mut rng = key.to_rng();
    let scale = 1. / (1. - p);
    let mask: Vec<f32> = (0..shape.elem_count())
        .map(|_| if rng.random::<f32>() < p { 0. } else { scale })
        .collect();
    Ok(Tensor::from_vec(mask, shape.clone(), device)?)
}

impl<D: HeadDistribution> Policy for SequentialPolicy<D> {
    type Dist = D;
    type State = Option<ObsNormState>;

    fn function(
        &self,
        state: &Option<ObsNormState>,
        rng: PrngKey,
        observations: &Tensor,
        is_training: bool,
    ) -> Result<(D::Params, Option<ObsNormState>)> {
        match observations.dims() {
            [_, obs_dim] if *obs_dim == self.obs_dim => {}
            dims => {
                return Err(ObjectiveError::Shape {
                    what: "observations",
                    expected: format!("(batch, {})", self.obs_dim),
                    got: dims.to_vec(),
                });
            }
        }
        let mut rngs = RngSequence::new(rng);
        let (features, state_new) = match state {
            Some(obs_norm) => {
                let obs_norm = if is_training {
                    obs_norm.updated(observations)?
                } else {
                    obs_norm.clone()
                };
                (obs_norm.normalize(observations)?, Some(obs_norm))
            }
            None => (observations.clone(), None),
        };
        let features = match self.dropout {
            Some(p) if is_training && p > 0. => {
                let mask = dropout_mask(rngs.next_key(), features.shape(), p, features.device())?;
                features.mul(&mask)?
            }
            _ => features,
        };
        let head = self.net.forward(&features)?;
        Ok((self.dist.params_from_head(head)?, state_new))
    }

    fn proba_dist(&self) -> &D {
        &self.dist
    }

    fn state(&self) -> &Option<ObsNormState> {
        &self.state
    }

    fn set_state(&mut self, state: Option<ObsNormState>) {
        self.state = state;
    }

    fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(hidden_layers: Vec<usize>) -> PolicyConfig {
        PolicyConfig {
            hidden_layers,
            ..Default::default()
        }
    }

    #[test]
    fn categorical_forward_shapes() -> Result<()> {
        let device = Device::Cpu;
        let pi = SequentialPolicy::categorical(4, 3, &config(vec![16]), &device)?;
        let obs = Tensor::zeros((5, 4), DType::F32, &device)?;
        let (logits, state) = pi.function(pi.state(), PrngKey::new(1), &obs, true)?;
        assert_eq!(logits.dims(), &[5, 3]);
        assert!(state.is_none());
        assert_eq!(pi.trainable_vars().len(), 4);

        let bad_obs = Tensor::zeros((5, 2), DType::F32, &device)?;
        assert!(matches!(
            pi.function(pi.state(), PrngKey::new(1), &bad_obs, true),
            Err(ObjectiveError::Shape { .. })
        ));
        Ok(())
    }

    #[test]
    fn gaussian_log_std_is_trainable() -> Result<()> {
        let device = Device::Cpu;
        let config = PolicyConfig {
            hidden_layers: vec![],
            log_std_init: -0.5,
            ..Default::default()
        };
        let pi = SequentialPolicy::diag_gaussian(3, 2, &config, &device)?;
        // linear weight, linear bias, log_std
        assert_eq!(pi.trainable_vars().len(), 3);
        assert!((pi.proba_dist().std()? - (-0.5f32).exp()).abs() < 1e-5);
        let obs = Tensor::ones((4, 3), DType::F32, &device)?;
        let actions = Tensor::zeros((4, 2), DType::F32, &device)?;
        let logp = pi.propensities(&obs, &actions)?;
        assert_eq!(logp.dims(), &[4]);
        Ok(())
    }

    #[test]
    fn state_only_advances_in_training_mode() -> Result<()> {
        let device = Device::Cpu;
        let config = PolicyConfig {
            hidden_layers: vec![8],
            normalize_observations: true,
            ..Default::default()
        };
        let pi = SequentialPolicy::categorical(2, 2, &config, &device)?;
        let obs = Tensor::new(&[[1f32, 2.], [3., 4.]], &device)?;
        let (_, eval_state) = pi.function(pi.state(), PrngKey::new(0), &obs, false)?;
        assert_eq!(eval_state.as_ref().map(|s| s.count), Some(0.));
        let (_, train_state) = pi.function(pi.state(), PrngKey::new(0), &obs, true)?;
        assert_eq!(train_state.as_ref().map(|s| s.count), Some(2.));
        // the policy itself is untouched until the state is committed
        assert_eq!(pi.state().as_ref().map(|s| s.count), Some(0.));
        Ok(())
    }

    #[test]
    fn dropout_is_keyed() -> Result<()> {
        let device = Device::Cpu;
        let config = PolicyConfig {
            hidden_layers: vec![32],
            dropout: Some(0.5),
            ..Default::default()
        };
        let pi = SequentialPolicy::categorical(16, 2, &config, &device)?;
        let obs = Tensor::ones((4, 16), DType::F32, &device)?;
        let run = |seed: u64, training: bool| -> Result<Vec<Vec<f32>>> {
            let (logits, _) = pi.function(pi.state(), PrngKey::new(seed), &obs, training)?;
            Ok(logits.to_vec2()?)
        };
        assert_eq!(run(5, true)?, run(5, true)?);
        assert_eq!(run(5, false)?, run(6, false)?);
        assert_ne!(run(5, true)?, run(6, true)?);

        let bad = PolicyConfig {
            dropout: Some(1.),
            ..Default::default()
        };
        assert!(SequentialPolicy::categorical(16, 2, &bad, &device).is_err());
        Ok(())
    }

    #[test]
    fn config_defaults_from_json() {
        let config: PolicyConfig = serde_json::from_str(r#"{"hidden_layers": [32]}"#).unwrap();
        assert_eq!(config.hidden_layers, vec![32]);
        assert!(!config.normalize_observations);
        assert_eq!(config.dropout, None);
    }
}
