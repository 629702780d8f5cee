use candle_core::{DType, Device, Result, Tensor, shape::Dim};

/// Observations are clipped to this many standard deviations after normalization.
pub const OBS_CLIP: f64 = 10.;

const VAR_EPS: f64 = 1e-8;

/// Running mean and variance of the observations seen in training mode. This is the function
/// state of a `SequentialPolicy`: it is threaded through forward passes and never updated in
/// place.
#[derive(Debug, Clone)]
pub struct ObsNormState {
    pub mean: Tensor,
    pub var: Tensor,
    pub count: f32,
}

fn biased_var<D: Dim>(t: &Tensor, dim: D) -> Result<Tensor> {
    let dim = dim.to_index(t.shape(), "var")?;
    let mean = t.mean_keepdim(dim)?;
    let squares = t.broadcast_sub(&mean)?.sqr()?;
    (squares.sum_keepdim(dim)? / t.dim(dim)? as f64)?.squeeze(dim)
}

impl ObsNormState {
    pub fn new(obs_dim: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            mean: Tensor::zeros(obs_dim, DType::F32, device)?,
            var: Tensor::ones(obs_dim, DType::F32, device)?,
            count: 0.,
        })
    }

    /// The state after observing `batch` (shape `(batch, obs_dim)`).
    pub fn updated(&self, batch: &Tensor) -> Result<Self> {
        let batch = batch.detach();
        let batch_mean = batch.mean(0)?;
        let batch_var = biased_var(&batch, 0)?;
        let batch_count = batch.dim(0)? as f32;
        self.merge_moments(&batch_mean, &batch_var, batch_count)
    }

    // parallel variant of Welford's algorithm
    fn merge_moments(&self, batch_mean: &Tensor, batch_var: &Tensor, batch_count: f32) -> Result<Self> {
        let tot_count = self.count + batch_count;
        let delta = batch_mean.sub(&self.mean)?;
        let mean = self
            .mean
            .add(&delta.affine((batch_count / tot_count) as f64, 0.)?)?;
        let m_a = self.var.affine(self.count as f64, 0.)?;
        let m_b = batch_var.affine(batch_count as f64, 0.)?;
        let correction = delta
            .sqr()?
            .affine((self.count * batch_count / tot_count) as f64, 0.)?;
        let var = m_a
            .add(&m_b)?
            .add(&correction)?
            .affine(1. / tot_count as f64, 0.)?;
        Ok(Self {
            mean,
            var,
            count: tot_count,
        })
    }

    pub fn normalize(&self, observations: &Tensor) -> Result<Tensor> {
        let std = self.var.affine(1., VAR_EPS)?.sqrt()?;
        observations
            .broadcast_sub(&self.mean)?
            .broadcast_div(&std)?
            .clamp(-OBS_CLIP, OBS_CLIP)
    }
}
