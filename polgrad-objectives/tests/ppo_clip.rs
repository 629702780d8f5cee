use candle_core::{Device, Tensor};
use polgrad_candle_lm::{
    distributions::CategoricalDistribution,
    policy::{PolicyConfig, SequentialPolicy},
};
use polgrad_core::{
    ObjectiveError, Result, batch::TransitionBatch, hyperparams::Hyperparams, policies::Policy,
    rng::PrngKey,
};
use polgrad_objectives::{PolicyObjective, PpoClip};

type CategoricalPolicy = SequentialPolicy<CategoricalDistribution>;

fn linear_config() -> PolicyConfig {
    PolicyConfig {
        hidden_layers: vec![],
        ..Default::default()
    }
}

// A single action policy: log_pi is identically zero whatever the parameters.
fn single_action_ppo() -> Result<PpoClip<CategoricalPolicy>> {
    let pi = SequentialPolicy::categorical(2, 1, &linear_config(), &Device::Cpu)?;
    PpoClip::with_defaults(pi)
}

fn batch(logp: Option<&[f32]>) -> Result<TransitionBatch> {
    let device = Device::Cpu;
    let s = Tensor::new(&[[0.1f32, -0.3], [1.0, 0.5], [-2.0, 0.7]], &device)?;
    let a = Tensor::new(&[0u32, 0, 0], &device)?;
    let logp = match logp {
        Some(logp) => Some(Tensor::new(logp, &device)?),
        None => None,
    };
    TransitionBatch::new(s, a, logp)
}

fn known_ratio_batch() -> Result<TransitionBatch> {
    batch(Some(&[0., 2f32.ln(), 0.5f32.ln()]))
}

#[test]
fn clipped_objective_on_known_ratios() -> Result<()> {
    let ppo = single_action_ppo()?;
    let adv = Tensor::new(&[1f32, 1., -1.], &Device::Cpu)?;
    let out = ppo.objective_func(
        ppo.pi().state(),
        &ppo.hyperparams(),
        PrngKey::new(0),
        &known_ratio_batch()?,
        &adv,
    )?;
    for log_pi in out.aux.log_pi.to_vec1::<f32>()? {
        assert!(log_pi.abs() < 1e-6);
    }
    // ratio [1, 0.5, 2], ratio_clip [1, 0.8, 1.2], mins [1, 0.5, -2]
    let objective = out.objective.to_scalar::<f32>()?;
    assert!((objective + 0.5).abs() < 1e-5, "objective {objective}");
    Ok(())
}

#[test]
fn unit_ratio_objective_is_advantage_sum() -> Result<()> {
    let ppo = single_action_ppo()?;
    let adv = Tensor::new(&[0.5f32, -2., 3.25], &Device::Cpu)?;
    let out = ppo.objective_func(
        ppo.pi().state(),
        &ppo.hyperparams(),
        PrngKey::new(7),
        &batch(Some(&[0., 0., 0.]))?,
        &adv,
    )?;
    assert!((out.objective.to_scalar::<f32>()? - 1.75).abs() < 1e-5);
    Ok(())
}

#[test]
fn clip_diagnostics() -> Result<()> {
    let ppo = single_action_ppo()?;
    let adv = Tensor::new(&[1f32, 1., -1.], &Device::Cpu)?;
    let out = ppo.grads_and_metrics(&known_ratio_batch()?, &adv, PrngKey::new(0))?;
    let clip_fraction = out.metrics.get("PpoClip/clip_fraction");
    assert!(matches!(clip_fraction, Some(f) if (f - 2. / 3.).abs() < 1e-5));
    let approx_kl = out.metrics.get("PpoClip/approx_kl");
    assert!(matches!(approx_kl, Some(kl) if kl.abs() < 1e-5));
    let loss = out.metrics.get("PpoClip/loss");
    assert!(matches!(loss, Some(loss) if (loss - 0.5).abs() < 1e-5));
    assert_eq!(
        out.metrics.get("PpoClip/loss"),
        out.metrics.get("PpoClip/loss_bare")
    );
    for name in ["grads_norm", "grads_max", "grads_mean", "grads_var"] {
        assert!(out.metrics.get(&format!("PpoClip/{name}")).is_some());
    }
    Ok(())
}

#[test]
fn column_advantages_are_rejected() -> Result<()> {
    let mut ppo = single_action_ppo()?;
    let adv = Tensor::new(&[[1f32], [1.], [-1.]], &Device::Cpu)?;
    let result = ppo.objective_func(
        ppo.pi().state(),
        &ppo.hyperparams(),
        PrngKey::new(0),
        &known_ratio_batch()?,
        &adv,
    );
    assert!(matches!(result, Err(ObjectiveError::Shape { what: "Adv", .. })));
    let result = ppo.update(&known_ratio_batch()?, &adv, PrngKey::new(0));
    assert!(matches!(result, Err(ObjectiveError::Shape { .. })));
    Ok(())
}

#[test]
fn missing_propensities_are_rejected() -> Result<()> {
    let mut ppo = single_action_ppo()?;
    let batch = batch(None)?;
    assert!(matches!(
        ppo.check_propensities(&batch),
        Err(ObjectiveError::Configuration(_))
    ));
    let adv = Tensor::new(&[1f32, 1., -1.], &Device::Cpu)?;
    let result = ppo.update(&batch, &adv, PrngKey::new(0));
    assert!(matches!(result, Err(ObjectiveError::Configuration(_))));
    assert!(ppo.check_propensities(&known_ratio_batch()?).is_ok());
    Ok(())
}

#[test]
fn hyperparams_snapshot_tracks_epsilon() -> Result<()> {
    let mut ppo = single_action_ppo()?;
    let first = ppo.hyperparams();
    assert_eq!(first, ppo.hyperparams());
    assert!((first.float("epsilon")? - 0.2).abs() < 1e-6);
    assert!(first.nested("regularizer").is_empty());

    ppo.set_epsilon(0.3)?;
    let second = ppo.hyperparams();
    assert_ne!(first, second);
    assert!((second.float("epsilon")? - 0.3).abs() < 1e-6);
    // the earlier snapshot is a value, not a view
    assert!((first.float("epsilon")? - 0.2).abs() < 1e-6);

    assert!(matches!(
        ppo.set_epsilon(0.),
        Err(ObjectiveError::Configuration(_))
    ));
    assert!(ppo.set_epsilon(f32::INFINITY).is_err());
    assert_eq!(ppo.epsilon(), 0.3);
    Ok(())
}

#[test]
fn invalid_epsilon_is_rejected() -> Result<()> {
    let pi = SequentialPolicy::categorical(2, 1, &linear_config(), &Device::Cpu)?;
    assert!(matches!(
        PpoClip::new(pi, None, None, -0.1),
        Err(ObjectiveError::Configuration(_))
    ));

    let ppo = single_action_ppo()?;
    let adv = Tensor::new(&[1f32, 1., -1.], &Device::Cpu)?;
    for hyperparams in [
        Hyperparams::empty().with_float("epsilon", -1.),
        Hyperparams::empty().with_float("epsilon", f64::NAN),
        Hyperparams::empty(),
    ] {
        let result = ppo.objective_func(
            ppo.pi().state(),
            &hyperparams,
            PrngKey::new(0),
            &known_ratio_batch()?,
            &adv,
        );
        assert!(matches!(result, Err(ObjectiveError::Configuration(_))));
    }
    Ok(())
}

#[test]
fn larger_epsilon_from_snapshot_is_used() -> Result<()> {
    let ppo = single_action_ppo()?;
    let adv = Tensor::new(&[1f32, 1., -1.], &Device::Cpu)?;
    // with epsilon = 0.6 the band is [0.4, 1.6]: mins [1, 0.5, -2]
    let hyperparams = Hyperparams::empty().with_float("epsilon", 0.6);
    let out = ppo.objective_func(
        ppo.pi().state(),
        &hyperparams,
        PrngKey::new(0),
        &known_ratio_batch()?,
        &adv,
    )?;
    assert!((out.objective.to_scalar::<f32>()? + 0.5).abs() < 1e-5);
    // with epsilon = 0.05 the band is [0.95, 1.05]: mins [1, 0.5, -2] again, clipping only
    // ever lowers the surrogate
    let hyperparams = Hyperparams::empty().with_float("epsilon", 0.05);
    let out = ppo.objective_func(
        ppo.pi().state(),
        &hyperparams,
        PrngKey::new(0),
        &known_ratio_batch()?,
        &adv,
    )?;
    assert!((out.objective.to_scalar::<f32>()? + 0.5).abs() < 1e-5);
    Ok(())
}
