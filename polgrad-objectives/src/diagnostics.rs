use candle_core::{Var, backprop::GradStore};
use polgrad_core::{Result, metrics::Metrics};

/// Summary statistics over every gradient element of a set of variables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradDiagnostics {
    pub norm: f32,
    pub max: f32,
    pub mean: f32,
    pub var: f32,
    pub finite: bool,
}

impl GradDiagnostics {
    pub fn compute(grads: &GradStore, vars: &[Var]) -> Result<Self> {
        let mut count = 0usize;
        let mut sum = 0f64;
        let mut sum_sq = 0f64;
        let mut max = 0f64;
        let mut finite = true;
        for var in vars {
            let Some(grad) = grads.get(var.as_tensor()) else {
                continue;
            };
            let values: Vec<f32> = grad.flatten_all()?.to_vec1()?;
            for v in values {
                let v = v as f64;
                finite &= v.is_finite();
                sum += v;
                sum_sq += v * v;
                max = max.max(v.abs());
                count += 1;
            }
        }
        let (mean, var) = if count == 0 {
            (0., 0.)
        } else {
            let mean = sum / count as f64;
            (mean, (sum_sq / count as f64 - mean * mean).max(0.))
        };
        Ok(Self {
            norm: sum_sq.sqrt() as f32,
            max: max as f32,
            mean: mean as f32,
            var: var as f32,
            finite,
        })
    }

    pub fn record(&self, metrics: &mut Metrics, prefix: &str) {
        metrics.record(prefix, "grads_norm", self.norm);
        metrics.record(prefix, "grads_max", self.max);
        metrics.record(prefix, "grads_mean", self.mean);
        metrics.record(prefix, "grads_var", self.var);
    }
}
