//! Generalized advantage estimation and advantage weights.
use anyhow::Result;
use awr_core::error::AwrError;
use rand::{distributions::WeightedIndex, Rng};

/// Computes discounted returns and advantages with generalized advantage estimation.
///
/// `bootstrap` stands for the value of the state following the last transition and is
/// ignored when the last transition ends an episode. `done` cuts both the bootstrap
/// and the accumulation of the advantage at episode boundaries.
///
/// Returns `(discounted_returns, advantages)`. Computation is done in `f64`.
pub fn discount_return(
    rewards: &[f32],
    dones: &[bool],
    values: &[f32],
    bootstrap: f32,
    gamma: f64,
    lambda: f64,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let n = rewards.len();
    if dones.len() != n || values.len() != n {
        return Err(AwrError::Config(format!(
            "rewards, dones and values must have the same length, got {}, {} and {}",
            n,
            dones.len(),
            values.len()
        ))
        .into());
    }

    let mut returns = vec![0f32; n];
    let mut advantages = vec![0f32; n];
    let mut gae = 0f64;
    let mut next_value = bootstrap as f64;

    for t in (0..n).rev() {
        let value = values[t] as f64;
        let reward = rewards[t] as f64;
        let delta = match dones[t] {
            true => reward - value,
            false => reward + gamma * next_value - value,
        };
        let not_done = if dones[t] { 0.0 } else { 1.0 };
        gae = delta + gamma * lambda * not_done * gae;
        returns[t] = (gae + value) as f32;
        advantages[t] = gae as f32;
        next_value = value;
    }

    Ok((returns, advantages))
}

/// Weight of a sample in the policy loss, `min(exp(advantage / beta), max_weight)`.
pub fn exp_advantage_weight(advantage: f32, beta: f32, max_weight: f32) -> f32 {
    let w = (advantage / beta).exp();
    if w > max_weight {
        max_weight
    } else {
        w
    }
}

/// Draws an index with probability proportional to `probs`.
///
/// Fails with [`AwrError::NumericDegeneracy`] if the probabilities are not finite,
/// negative or all zero.
pub fn sample_categorical(probs: &[f32], rng: &mut impl Rng) -> Result<usize> {
    let dist = WeightedIndex::new(probs).map_err(|e| {
        AwrError::NumericDegeneracy(format!("invalid action probabilities {:?}: {}", probs, e))
    })?;
    Ok(rng.sample(dist))
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn assert_close(xs: &[f32], ys: &[f64]) {
        assert_eq!(xs.len(), ys.len());
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert!((*x as f64 - y).abs() < 1e-6, "{:?} != {:?}", xs, ys);
        }
    }

    #[test]
    fn test_single_step_terminal_episode() -> Result<()> {
        let (ret, adv) = discount_return(&[2.5], &[true], &[0.7], 100.0, 0.99, 0.95)?;
        assert_eq!(ret[0], 2.5);
        assert_eq!(adv[0], 2.5 - 0.7);
        Ok(())
    }

    #[test]
    fn test_four_step_episode() -> Result<()> {
        let (ret, adv) = discount_return(
            &[1.0, 1.0, 1.0, -1.0],
            &[false, false, false, true],
            &[0.5; 4],
            0.0,
            0.99,
            0.95,
        )?;
        assert_close(&ret, &[2.0630498910625, 1.103987125, 0.08425, -1.0]);
        assert_close(&adv, &[1.5630498910625, 0.603987125, -0.41575, -1.5]);
        Ok(())
    }

    #[test]
    fn test_done_cuts_later_steps() -> Result<()> {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5];
        let dones = [false, true, false, false, false];
        let (ret1, adv1) =
            discount_return(&[1.0, 2.0, 3.0, 4.0, 5.0], &dones, &values, 1.0, 0.9, 0.8)?;
        let (ret2, adv2) =
            discount_return(&[1.0, 2.0, -7.0, 0.0, 9.0], &dones, &values, -3.0, 0.9, 0.8)?;
        assert_eq!(adv1[..2], adv2[..2]);
        assert_eq!(ret1[..2], ret2[..2]);
        assert_ne!(adv1[2], adv2[2]);
        Ok(())
    }

    #[test]
    fn test_bootstrap_of_unfinished_trajectory() -> Result<()> {
        // delta = 1 + 0.5 * 4 - 1 = 2
        let (ret, adv) = discount_return(&[1.0], &[false], &[1.0], 4.0, 0.5, 0.9)?;
        assert_close(&adv, &[2.0]);
        assert_close(&ret, &[3.0]);
        Ok(())
    }

    #[test]
    fn test_length_mismatch() {
        let err = discount_return(&[1.0, 1.0], &[false], &[0.0, 0.0], 0.0, 0.99, 0.95)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AwrError>(),
            Some(AwrError::Config(_))
        ));
    }

    #[test]
    fn test_weight_clipping() {
        assert_eq!(exp_advantage_weight(10.0, 1.0, 20.0), 20.0);
        assert_eq!(exp_advantage_weight(f32::INFINITY, 1.0, 20.0), 20.0);
        assert_eq!(exp_advantage_weight(0.0, 1.0, 20.0), 1.0);
        assert!((exp_advantage_weight(1.0, 2.0, 20.0) - 0.5f32.exp()).abs() < 1e-6);
        assert_eq!(exp_advantage_weight(-f32::INFINITY, 1.0, 20.0), 0.0);
    }

    #[test]
    fn test_sample_categorical_frequency() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(42);
        let n = 10_000;
        let mut n_ones = 0;
        for _ in 0..n {
            n_ones += sample_categorical(&[0.8, 0.2], &mut rng)?;
        }
        let freq = n_ones as f32 / n as f32;
        assert!((freq - 0.2).abs() < 0.02, "frequency of action 1: {}", freq);
        Ok(())
    }

    #[test]
    fn test_sample_categorical_is_reproducible() -> Result<()> {
        let probs = [0.1, 0.2, 0.3, 0.4];
        let mut rng1 = SmallRng::seed_from_u64(7);
        let mut rng2 = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(
                sample_categorical(&probs, &mut rng1)?,
                sample_categorical(&probs, &mut rng2)?
            );
        }
        Ok(())
    }

    #[test]
    fn test_sample_categorical_rejects_nan() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(sample_categorical(&[f32::NAN, 0.5], &mut rng).is_err());
    }
}
