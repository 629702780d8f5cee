use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder, linear};
use either::Either;

pub type MlpLayer = Either<Linear, Activation>;

/// Fully connected network, `Clone + Sync` so a policy can be shared with inference workers
/// (`candle_nn::Sequential` boxes its layers and is neither).
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<MlpLayer>,
    output_dim: usize,
}

impl Mlp {
    /// `widths` lists the output width of every linear layer, the last entry being the network's
    /// output. Every linear layer but the last is followed by `activation`. Layer `i` lives under
    /// `{prefix}{i}` in `vb`.
    pub fn build(
        input_dim: usize,
        widths: &[usize],
        activation: Activation,
        vb: &VarBuilder,
        prefix: &str,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(2 * widths.len());
        let mut in_dim = input_dim;
        for (idx, &out_dim) in widths.iter().enumerate() {
            if idx > 0 {
                layers.push(Either::Right(activation));
            }
            layers.push(Either::Left(linear(
                in_dim,
                out_dim,
                vb.pp(format!("{prefix}{idx}")),
            )?));
            in_dim = out_dim;
        }
        Ok(Self {
            layers,
            output_dim: in_dim,
        })
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.layers.iter().try_fold(xs.clone(), |xs, layer| match layer {
            Either::Left(linear) => linear.forward(&xs),
            Either::Right(activation) => activation.forward(&xs),
        })
    }
}
