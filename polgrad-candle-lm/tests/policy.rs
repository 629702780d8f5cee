use candle_core::{Device, Tensor};
use polgrad_candle_lm::policy::{PolicyConfig, SequentialPolicy};
use polgrad_core::{
    ObjectiveError, Result, distributions::ProbaDist, policies::Policy, rng::PrngKey,
};

fn observations() -> Result<Tensor> {
    Ok(Tensor::new(
        &[[0.1f32, 2.0, -0.5], [1.4, -0.3, 0.2]],
        &Device::Cpu,
    )?)
}

#[test]
fn gaussian_propensities_match_density() -> Result<()> {
    let config = PolicyConfig {
        log_std_init: -0.5,
        ..Default::default()
    };
    let pi = SequentialPolicy::diag_gaussian(3, 2, &config, &Device::Cpu)?;
    let obs = observations()?;
    let actions = Tensor::new(&[[0.2f32, -0.1], [1.0, 0.5]], &Device::Cpu)?;
    let (params, _) = pi.function(pi.state(), PrngKey::new(0), &obs, false)?;
    let mu: Vec<Vec<f32>> = params.mu.to_vec2()?;
    let logp: Vec<f32> = pi.propensities(&obs, &actions)?.to_vec1()?;

    let var = (-1f32).exp();
    let expected = |row: usize, a: [f32; 2]| -> f32 {
        a.iter()
            .zip(&mu[row])
            .map(|(a, mu)| {
                -(a - mu).powi(2) / (2. * var) + 0.5 - (2. * std::f32::consts::PI).sqrt().ln()
            })
            .sum()
    };
    assert!((logp[0] - expected(0, [0.2, -0.1])).abs() < 1e-4);
    assert!((logp[1] - expected(1, [1.0, 0.5])).abs() < 1e-4);
    Ok(())
}

#[test]
fn normalization_state_is_returned_not_written() -> Result<()> {
    let config = PolicyConfig {
        normalize_observations: true,
        ..Default::default()
    };
    let mut pi = SequentialPolicy::categorical(3, 4, &config, &Device::Cpu)?;
    let obs = observations()?;

    let (_, eval_state) = pi.function(pi.state(), PrngKey::new(0), &obs, false)?;
    assert!(matches!(&eval_state, Some(s) if s.count == 0.));

    let (logits, train_state) = pi.function(pi.state(), PrngKey::new(0), &obs, true)?;
    assert_eq!(logits.dims(), [2, 4]);
    assert!(matches!(&train_state, Some(s) if s.count == 2.));
    assert!(matches!(pi.state(), Some(s) if s.count == 0.));

    pi.set_state(train_state);
    let mean: Vec<f32> = match pi.state() {
        Some(s) => s.mean.to_vec1()?,
        None => vec![],
    };
    assert_eq!(mean.len(), 3);
    assert!((mean[0] - 0.75).abs() < 1e-5);
    Ok(())
}

#[test]
fn observation_width_is_checked() -> Result<()> {
    let pi = SequentialPolicy::categorical(3, 2, &PolicyConfig::default(), &Device::Cpu)?;
    let obs = Tensor::new(&[[0.1f32, 2.0], [1.4, -0.3]], &Device::Cpu)?;
    assert!(matches!(
        pi.function(pi.state(), PrngKey::new(0), &obs, true),
        Err(ObjectiveError::Shape { what: "observations", .. })
    ));
    let bad_action = Tensor::new(&[0u32, 2], &Device::Cpu)?;
    assert!(
        pi.proba_dist()
            .preprocess_variate(&bad_action)
            .is_err()
    );
    Ok(())
}
