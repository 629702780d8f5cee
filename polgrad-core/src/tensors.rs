use crate::error::{ObjectiveError, Result};
use candle_core::Tensor;
use derive_more::{Deref, DerefMut, Display};

/// Log-probabilities of the taken actions under the current policy.
#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct Logp(pub Tensor);

/// `exp(log_pi - logp_old)`
#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct Ratio(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display, Clone)]
pub struct PolicyLoss(pub Tensor);

/// Fails unless `t` has shape `(len,)`. No broadcasting is ever attempted.
pub fn ensure_vector(what: &'static str, t: &Tensor, len: usize) -> Result<()> {
    if t.dims() == [len] {
        Ok(())
    } else {
        Err(ObjectiveError::Shape {
            what,
            expected: format!("({len},)"),
            got: t.dims().to_vec(),
        })
    }
}

pub fn ensure_finite(what: &str, t: &Tensor) -> Result<()> {
    let values: Vec<f32> = t.flatten_all()?.to_dtype(candle_core::DType::F32)?.to_vec1()?;
    match values.iter().position(|v| !v.is_finite()) {
        None => Ok(()),
        Some(idx) => Err(ObjectiveError::numeric(format!(
            "{what} has a non-finite value {} at index {idx}",
            values[idx]
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn vector_shape_is_strict() -> Result<()> {
        let v = Tensor::new(&[1f32, 2., 3.], &Device::Cpu)?;
        ensure_vector("v", &v, 3)?;
        assert!(matches!(
            ensure_vector("v", &v, 4),
            Err(ObjectiveError::Shape { .. })
        ));
        let column = v.unsqueeze(1)?;
        let err = ensure_vector("column", &column, 3).unwrap_err();
        match err {
            ObjectiveError::Shape { got, .. } => assert_eq!(got, vec![3, 1]),
            other => panic!("unexpected error {other}"),
        }
        Ok(())
    }

    #[test]
    fn finiteness() -> Result<()> {
        let ok = Tensor::new(&[0f32, -1.5], &Device::Cpu)?;
        ensure_finite("ok", &ok)?;
        let bad = Tensor::new(&[0f32, f32::NAN], &Device::Cpu)?;
        assert!(ensure_finite("bad", &bad).unwrap_err().is_numeric());
        let inf = Tensor::new(&[f32::INFINITY], &Device::Cpu)?;
        assert!(ensure_finite("inf", &inf).unwrap_err().is_numeric());
        Ok(())
    }
}
