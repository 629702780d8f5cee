use super::HeadDistribution;
use candle_core::{DType, Tensor};
use polgrad_core::{ObjectiveError, Result, distributions::ProbaDist};

#[derive(Debug, Clone)]
pub struct DiagGaussianParams {
    /// `(batch, action_dim)`
    pub mu: Tensor,
    /// `(action_dim,)`, shared across the batch
    pub log_std: Tensor,
}

/// Gaussian with diagonal covariance. The mean comes from the network head, the log standard
/// deviation is a state-independent trainable variable.
#[derive(Debug, Clone)]
pub struct DiagGaussianDistribution {
    action_dim: usize,
    log_std: Tensor,
}

impl DiagGaussianDistribution {
    pub fn new(action_dim: usize, log_std: Tensor) -> Self {
        Self {
            action_dim,
            log_std,
        }
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn std(&self) -> Result<f32> {
        Ok(self.log_std.exp()?.mean_all()?.to_scalar::<f32>()?)
    }
}

impl ProbaDist for DiagGaussianDistribution {
    type Params = DiagGaussianParams;

    fn preprocess_variate(&self, variate: &Tensor) -> Result<Tensor> {
        match variate.dims() {
            [_, d] if *d == self.action_dim => Ok(variate.to_dtype(DType::F32)?),
            [_] if self.action_dim == 1 => Ok(variate.to_dtype(DType::F32)?.unsqueeze(1)?),
            dims => Err(ObjectiveError::Shape {
                what: "gaussian variate",
                expected: format!("(batch, {})", self.action_dim),
                got: dims.to_vec(),
            }),
        }
    }

    fn log_proba(&self, params: &DiagGaussianParams, variate: &Tensor) -> Result<Tensor> {
        let DiagGaussianParams { mu, log_std } = params;
        let log_std = log_std.broadcast_as(mu.shape())?;
        let var = log_std.affine(2., 0.)?.exp()?;
        let log_sqrt_2pi = f64::ln(f64::sqrt(2. * std::f64::consts::PI));
        let sq_diff = variate.sub(mu)?.sqr()?;
        let log_probs = sq_diff
            .div(&var.affine(2., 0.)?)?
            .neg()?
            .sub(&log_std)?
            .affine(1., -log_sqrt_2pi)?;
        Ok(log_probs.sum(1)?)
    }

    fn entropy(&self, params: &DiagGaussianParams) -> Result<Tensor> {
        let DiagGaussianParams { mu, log_std } = params;
        let per_dim = 0.5 * ((2. * std::f64::consts::PI).ln() + 1.);
        let entropy = log_std
            .broadcast_as(mu.shape())?
            .affine(1., per_dim)?
            .sum(1)?;
        Ok(entropy)
    }
}

impl HeadDistribution for DiagGaussianDistribution {
    fn head_dim(&self) -> usize {
        self.action_dim
    }

    fn params_from_head(&self, mu: Tensor) -> Result<DiagGaussianParams> {
        Ok(DiagGaussianParams {
            mu,
            log_std: self.log_std.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn standard_normal_log_density() -> Result<()> {
        let device = Device::Cpu;
        let dist = DiagGaussianDistribution::new(2, Tensor::zeros(2, DType::F32, &device)?);
        let params = dist.params_from_head(Tensor::zeros((1, 2), DType::F32, &device)?)?;
        let x = dist.preprocess_variate(&Tensor::new(&[[1f32, -1.]], &device)?)?;
        let log_p: Vec<f32> = dist.log_proba(&params, &x)?.to_vec1()?;
        // two independent N(0, 1) evaluated at +-1
        let expected = 2. * (-0.5 - 0.5 * (2. * std::f32::consts::PI).ln());
        assert!((log_p[0] - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn scaled_log_density_and_entropy() -> Result<()> {
        let device = Device::Cpu;
        let log_std = Tensor::new(&[2f32.ln()], &device)?;
        let dist = DiagGaussianDistribution::new(1, log_std);
        let params = dist.params_from_head(Tensor::new(&[[1f32], [0.]], &device)?)?;
        // one-dimensional actions may come without the trailing axis
        let x = dist.preprocess_variate(&Tensor::new(&[3f32, 0.], &device)?)?;
        assert_eq!(x.dims(), &[2, 1]);
        let log_p: Vec<f32> = dist.log_proba(&params, &x)?.to_vec1()?;
        let norm = 2f32.ln() + 0.5 * (2. * std::f32::consts::PI).ln();
        assert!((log_p[0] - (-0.5 - norm)).abs() < 1e-5);
        assert!((log_p[1] - (-norm)).abs() < 1e-5);

        let entropy: Vec<f32> = dist.entropy(&params)?.to_vec1()?;
        let expected = 0.5 * ((2. * std::f32::consts::PI).ln() + 1.) + 2f32.ln();
        assert_eq!(entropy.len(), 2);
        assert!((entropy[0] - expected).abs() < 1e-5);
        assert!((dist.std()? - 2.).abs() < 1e-5);
        Ok(())
    }
}
