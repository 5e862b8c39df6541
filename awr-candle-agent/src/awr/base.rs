use super::{
    advantage::{discount_return, exp_advantage_weight, sample_categorical},
    Actor, AwrConfig, Critic,
};
use crate::{
    mlp::Mlp,
    util::{all_finite, smooth_l1_loss, states_to_tensor, CriticLoss},
};
use anyhow::Result;
use awr_core::{
    error::AwrError,
    record::{Record, RecordValue},
    Agent, Batch, Configurable, Policy, ReplayBufferBase,
};
use candle_core::{Device, Tensor};
use candle_nn::loss::mse;
use log::{debug, info, trace};
use rand::{rngs::SmallRng, seq::index, SeedableRng};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Advantage-weighted regression (AWR) agent.
///
/// Owns a state-value network ([`Critic`]) and a categorical policy ([`Actor`]), each with
/// its own parameters and optimizer, and a seeded RNG used for both action sampling and
/// minibatch sampling.
pub struct Awr {
    critic: Critic<Mlp>,
    actor: Actor<Mlp>,
    input_size: usize,
    output_size: usize,
    gamma: f64,
    lambda: f64,
    beta: f32,
    max_weight: f32,
    batch_size: usize,
    critic_update_iter: usize,
    actor_update_iter: usize,
    critic_loss: CriticLoss,
    device: Device,
    rng: SmallRng,
    train: bool,
    n_opts: usize,
}

impl Awr {
    /// Number of successful training passes.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Sets the policy to training or evaluation mode.
    ///
    /// In evaluation mode noisy layers use their mean parameters.
    pub fn set_train(&mut self, train: bool) {
        self.train = train;
        self.actor.set_train(train);
    }

    fn check_state(&self, state: &[f32]) -> Result<()> {
        if state.len() != self.input_size {
            return Err(AwrError::Config(format!(
                "state of length {} given to an agent with input_size {}",
                state.len(),
                self.input_size
            ))
            .into());
        }
        Ok(())
    }

    /// Returns the action probabilities for a single state.
    pub fn action_probs(&self, state: &[f32]) -> Result<Vec<f32>> {
        self.check_state(state)?;
        let x = Tensor::from_slice(state, (1, self.input_size), &self.device)?;
        Ok(self.actor.probs(&x)?.squeeze(0)?.to_vec1::<f32>()?)
    }

    /// Samples an action from the policy's categorical distribution.
    pub fn select_action(&mut self, state: &[f32]) -> Result<usize> {
        let probs = self.action_probs(state)?;
        sample_categorical(&probs, &mut self.rng)
    }

    /// Returns the critic's value estimates of the given states.
    pub fn values(&self, states: &[Vec<f32>]) -> Result<Vec<f32>> {
        let x = states_to_tensor(states, self.input_size, &self.device)?;
        Ok(self.critic.forward(&x)?.to_vec1::<f32>()?)
    }

    fn validate_batch(&self, batch: &Batch) -> Result<()> {
        batch.validate()?;
        let n = batch.len();
        let fail = |msg: String| -> Result<()> { Err(AwrError::Config(msg).into()) };

        if n == 0 {
            return fail("empty batch".to_string());
        }
        if self.batch_size > n {
            return fail(format!(
                "batch_size {} is larger than the batch of {} transitions",
                self.batch_size, n
            ));
        }
        if let Some(s) = batch
            .states
            .iter()
            .chain(batch.next_states.iter())
            .find(|s| s.len() != self.input_size)
        {
            return fail(format!(
                "state of length {} in a batch for input_size {}",
                s.len(),
                self.input_size
            ));
        }
        if let Some(a) = batch.actions.iter().find(|&&a| a >= self.output_size) {
            return fail(format!(
                "action {} out of range for output_size {}",
                a, self.output_size
            ));
        }

        Ok(())
    }

    /// Evaluates the critic on the batch and returns `(discounted_returns, advantages)`.
    ///
    /// The batch is split into runs of consecutive transitions. A run ends at a transition
    /// that ends an episode, at the last transition, or where the next state is not the state
    /// of the following transition, as happens when an interrupted episode is followed by a
    /// reset. A run that does not end an episode is bootstrapped with the critic's estimate of
    /// its last next-state.
    fn estimate(&self, batch: &Batch, states: &Tensor) -> Result<(Vec<f32>, Vec<f32>)> {
        let values = self.critic.forward(states)?.to_vec1::<f32>()?;
        let next_states = states_to_tensor(&batch.next_states, self.input_size, &self.device)?;
        let next_values = self.critic.forward(&next_states)?.to_vec1::<f32>()?;
        let n = batch.len();
        let mut returns = Vec::with_capacity(n);
        let mut advantages = Vec::with_capacity(n);
        let mut start = 0;

        for t in 0..n {
            let is_run_end =
                batch.dones[t] || t + 1 == n || batch.next_states[t] != batch.states[t + 1];
            if !is_run_end {
                continue;
            }
            let (ret, adv) = discount_return(
                &batch.rewards[start..=t],
                &batch.dones[start..=t],
                &values[start..=t],
                next_values[t],
                self.gamma,
                self.lambda,
            )?;
            returns.extend(ret);
            advantages.extend(adv);
            start = t + 1;
        }

        Ok((returns, advantages))
    }

    fn sample_indices(&mut self, n: usize) -> Result<Tensor> {
        let idx = index::sample(&mut self.rng, n, self.batch_size)
            .into_iter()
            .map(|i| i as u32)
            .collect::<Vec<_>>();
        Ok(Tensor::from_vec(idx, self.batch_size, &self.device)?)
    }

    /// Regresses the critic toward `returns` with `critic_update_iter` minibatch steps.
    ///
    /// Returns the mean loss.
    fn update_critic(&mut self, states: &Tensor, returns: &[f32]) -> Result<f32> {
        let n = returns.len();
        let returns = Tensor::from_slice(returns, n, &self.device)?;
        let mut loss_critic = 0f32;

        for i in 0..self.critic_update_iter {
            let idx = self.sample_indices(n)?;
            let x = states.index_select(&idx, 0)?;
            let tgt = returns.index_select(&idx, 0)?;
            let pred = self.critic.forward(&x)?;
            let loss = match self.critic_loss {
                CriticLoss::Mse => mse(&pred, &tgt)?,
                CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &tgt)?,
            };
            self.critic.backward_step(&loss)?;

            let loss = loss.to_scalar::<f32>()?;
            if !loss.is_finite() {
                return Err(AwrError::NumericDegeneracy(format!(
                    "critic loss {} at iteration {}",
                    loss, i
                ))
                .into());
            }
            trace!("critic iteration {}: loss {}", i, loss);
            loss_critic += loss;
        }

        Ok(loss_critic / self.critic_update_iter.max(1) as f32)
    }

    /// Fits the policy to the taken actions weighted by `weights`, with
    /// `actor_update_iter` minibatch steps.
    ///
    /// Returns the mean loss.
    fn update_actor(&mut self, states: &Tensor, actions: &Tensor, weights: &Tensor) -> Result<f32> {
        let n = states.dims()[0];
        let mut loss_actor = 0f32;

        for i in 0..self.actor_update_iter {
            let idx = self.sample_indices(n)?;
            let x = states.index_select(&idx, 0)?;
            let act = actions.index_select(&idx, 0)?;
            let w = weights.index_select(&idx, 0)?.detach();
            let logp = self.actor.logp(&x, &act)?;
            let loss = (-1f64 * (logp * w)?)?.mean_all()?;
            self.actor.backward_step(&loss)?;

            let loss = loss.to_scalar::<f32>()?;
            if !loss.is_finite() {
                return Err(AwrError::NumericDegeneracy(format!(
                    "actor loss {} at iteration {}",
                    loss, i
                ))
                .into());
            }
            trace!("actor iteration {}: loss {}", i, loss);
            loss_actor += loss;
        }

        Ok(loss_actor / self.actor_update_iter.max(1) as f32)
    }

    /// Performs a training pass on the whole batch.
    ///
    /// Advantages are estimated before and after the critic update, and the actor is
    /// trained on the latter. If the pass fails after validation, both networks get back the
    /// parameters they had when the pass started. Optimizer states are kept.
    pub fn train_on_batch(&mut self, batch: &Batch) -> Result<Record> {
        self.validate_batch(batch)?;
        let critic_params = self.critic.snapshot()?;
        let actor_params = self.actor.snapshot()?;

        match self.train_on_batch_(batch) {
            Ok(record) => {
                self.n_opts += 1;
                Ok(record)
            }
            Err(e) => {
                self.critic.restore(&critic_params)?;
                self.actor.restore(&actor_params)?;
                debug!("Parameters restored after a failed training pass");
                Err(e)
            }
        }
    }

    fn train_on_batch_(&mut self, batch: &Batch) -> Result<Record> {
        let n = batch.len();
        let states = states_to_tensor(&batch.states, self.input_size, &self.device)?;
        let actions = batch.actions.iter().map(|&a| a as u32).collect::<Vec<_>>();
        let actions = Tensor::from_vec(actions, n, &self.device)?;

        let (returns, _) = self.estimate(batch, &states)?;
        if !all_finite(&returns) {
            return Err(AwrError::NumericDegeneracy("non-finite discounted returns".to_string()).into());
        }
        let loss_critic = self.update_critic(&states, &returns)?;

        // Advantages with the updated critic
        let (_, advantages) = self.estimate(batch, &states)?;
        if !all_finite(&advantages) {
            return Err(AwrError::NumericDegeneracy("non-finite advantages".to_string()).into());
        }
        let weights = advantages
            .iter()
            .map(|&adv| exp_advantage_weight(adv, self.beta, self.max_weight))
            .collect::<Vec<_>>();
        let n_clipped = weights.iter().filter(|&&w| w == self.max_weight).count();
        let weight_mean = weights.iter().sum::<f32>() / n as f32;
        let weights = Tensor::from_vec(weights, n, &self.device)?;
        let loss_actor = self.update_actor(&states, &actions, &weights)?;

        let adv_mean = advantages.iter().sum::<f32>() / n as f32;
        let adv_abs_max = advantages.iter().fold(0f32, |m, a| m.max(a.abs()));
        info!(
            "Training pass on {} transitions: loss_critic {:.4}, loss_actor {:.4}, {} weights clipped",
            n, loss_critic, loss_actor, n_clipped
        );

        Ok(Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic)),
            ("loss_actor", RecordValue::Scalar(loss_actor)),
            ("adv_mean", RecordValue::Scalar(adv_mean)),
            ("adv_abs_max", RecordValue::Scalar(adv_abs_max)),
            ("weight_mean", RecordValue::Scalar(weight_mean)),
            ("n_clipped", RecordValue::Scalar(n_clipped as f32)),
        ]))
    }

    /// Saves the parameters of the actor and the critic in a directory.
    pub fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let actor_path = self.actor.save(path.join("actor"))?;
        let critic_path = self.critic.save(path.join("critic"))?;

        Ok(vec![actor_path, critic_path])
    }

    /// Loads the parameters saved with [`Awr::save_params`].
    pub fn load_params(&mut self, path: &Path) -> Result<()> {
        self.actor.load(path.join("actor"))?;
        self.critic.load(path.join("critic"))?;

        Ok(())
    }
}

impl Policy for Awr {
    fn sample(&mut self, obs: &[f32]) -> Result<usize> {
        self.select_action(obs)
    }
}

impl Configurable for Awr {
    type Config = AwrConfig;

    /// Constructs [`Awr`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        config.validate()?;
        let device = config.device.open()?;
        let actor = Actor::build(config.actor_mlp_config(), &config.actor_opt_config, &device)?;
        let critic = Critic::build(config.critic_mlp_config(), &config.critic_opt_config, &device)?;
        info!(
            "Build AWR agent: input_size {}, output_size {}, units {:?}, noisy {}",
            config.input_size, config.output_size, config.units, config.use_noisy_net
        );

        Ok(Awr {
            critic,
            actor,
            input_size: config.input_size,
            output_size: config.output_size,
            gamma: config.gamma,
            lambda: config.lambda,
            beta: config.beta as f32,
            max_weight: config.max_weight as f32,
            batch_size: config.batch_size,
            critic_update_iter: config.critic_update_iter,
            actor_update_iter: config.actor_update_iter,
            critic_loss: config.critic_loss,
            device,
            rng: SmallRng::seed_from_u64(config.seed),
            train: false,
            n_opts: 0,
        })
    }
}

impl<R> Agent<R> for Awr
where
    R: ReplayBufferBase<Batch = Batch>,
{
    fn train(&mut self) {
        self.set_train(true);
    }

    fn eval(&mut self) {
        self.set_train(false);
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        let batch = buffer.snapshot();
        self.train_on_batch(&batch)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::opt::OptimizerConfig;
    use awr_core::Transition;
    use tempdir::TempDir;
    use test_log::test;

    fn config() -> AwrConfig {
        AwrConfig::default()
            .dims(2, 3)
            .units(vec![16])
            .batch_size(8)
            .update_iters(50, 20)
            .num_sample(16)
            .max_replay(100)
            .critic_opt_config(OptimizerConfig::Adam { lr: 1e-2 })
            .actor_opt_config(OptimizerConfig::Adam { lr: 1e-2 })
    }

    fn batch(n: usize) -> Batch {
        (0..n)
            .map(|i| {
                let state = vec![i as f32 / n as f32, (i % 3) as f32];
                let next_state = vec![(i + 1) as f32 / n as f32, ((i + 1) % 3) as f32];
                Transition::new(state, i % 3, (i % 2) as f32, next_state, i % 5 == 4)
            })
            .collect()
    }

    fn is_error(err: &anyhow::Error, f: impl Fn(&AwrError) -> bool) -> bool {
        err.downcast_ref::<AwrError>().map_or(false, f)
    }

    #[test]
    fn test_action_probs() -> Result<()> {
        let agent = Awr::build(config())?;
        let probs = agent.action_probs(&[0.1, 0.2])?;
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let err = agent.action_probs(&[0.1, 0.2, 0.3]).unwrap_err();
        assert!(is_error(&err, |e| matches!(e, AwrError::Config(_))));
        Ok(())
    }

    #[test]
    fn test_select_action_is_reproducible() -> Result<()> {
        let mut agent1 = Awr::build(config())?;
        let mut agent2 = Awr::build(config())?;
        let dir = TempDir::new("awr_params")?;
        agent1.save_params(dir.path())?;
        agent2.load_params(dir.path())?;

        let state = [0.3, -0.5];
        for _ in 0..100 {
            let a = agent1.select_action(&state)?;
            assert!(a < 3);
            assert_eq!(a, agent2.select_action(&state)?);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_batch_is_rejected_before_update() -> Result<()> {
        let mut agent = Awr::build(config())?;
        let states = batch(16).states;
        let values = agent.values(&states)?;

        let mut misaligned = batch(16);
        misaligned.rewards.push(1.0);
        let too_small = batch(4);
        let mut bad_action = batch(16);
        bad_action.actions[3] = 3;
        let mut bad_state = batch(16);
        bad_state.next_states[5] = vec![0.0];

        for b in [misaligned, too_small, bad_action, bad_state, Batch::default()] {
            let err = agent.train_on_batch(&b).unwrap_err();
            assert!(is_error(&err, |e| matches!(e, AwrError::Config(_))));
        }
        assert_eq!(agent.values(&states)?, values);
        assert_eq!(agent.n_opts(), 0);
        Ok(())
    }

    #[test]
    fn test_critic_update_changes_advantages() -> Result<()> {
        let mut agent = Awr::build(config())?;
        let batch = batch(16);
        let states = states_to_tensor(&batch.states, 2, &Device::Cpu)?;

        let (returns, adv_before) = agent.estimate(&batch, &states)?;
        agent.update_critic(&states, &returns)?;
        let (_, adv_after) = agent.estimate(&batch, &states)?;

        let diff = adv_before
            .iter()
            .zip(adv_after.iter())
            .fold(0f32, |m, (a, b)| m.max((a - b).abs()));
        assert!(diff > 1e-4);
        Ok(())
    }

    #[test]
    fn test_advantages_do_not_cross_an_interrupted_episode() -> Result<()> {
        let agent = Awr::build(config())?;
        // The episode is interrupted after two steps, then restarts from `reset_state`
        let batch_with = |reset_state: Vec<f32>| -> Batch {
            vec![
                Transition::new(vec![0.0, 0.0], 0, 1.0, vec![1.0, 0.0], false),
                Transition::new(vec![1.0, 0.0], 1, 1.0, vec![2.0, 0.0], false),
                Transition::new(reset_state, 2, 1.0, vec![3.0, 1.0], true),
            ]
            .into_iter()
            .collect()
        };
        let batch1 = batch_with(vec![2.0, 0.0]);
        let batch2 = batch_with(vec![-50.0, 0.0]);
        let states1 = states_to_tensor(&batch1.states, 2, &Device::Cpu)?;
        let states2 = states_to_tensor(&batch2.states, 2, &Device::Cpu)?;
        let (_, adv1) = agent.estimate(&batch1, &states1)?;
        let (_, adv2) = agent.estimate(&batch2, &states2)?;
        for t in 0..2 {
            assert!((adv1[t] - adv2[t]).abs() < 1e-6);
        }
        assert!((adv1[2] - adv2[2]).abs() > 1e-6);

        // The interrupted episode is bootstrapped with the value of its own next-state
        let v = agent.values(&[vec![1.0, 0.0], vec![2.0, 0.0]])?;
        let expected = 1.0 + 0.99 * v[1] as f64 - v[0] as f64;
        assert!((adv2[1] as f64 - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_training_pass() -> Result<()> {
        let mut agent = Awr::build(config().max_weight(1.5))?;
        let batch = batch(16);
        let probs = agent.action_probs(&batch.states[0])?;
        let record = agent.train_on_batch(&batch)?;

        for key in ["loss_critic", "loss_actor", "adv_mean", "adv_abs_max", "weight_mean"] {
            assert!(record.get_scalar(key)?.is_finite());
        }
        assert!(record.get_scalar("weight_mean")? <= 1.5);
        assert!(record.get_scalar("n_clipped")? <= 16.0);
        assert_ne!(agent.action_probs(&batch.states[0])?, probs);
        assert_eq!(agent.n_opts(), 1);
        Ok(())
    }

    #[test]
    fn test_degenerate_pass_restores_parameters() -> Result<()> {
        let mut agent = Awr::build(config())?;
        let mut batch = batch(16);
        batch.rewards.iter_mut().for_each(|r| *r = 1e30);
        let values = agent.values(&batch.states)?;
        let probs = agent.action_probs(&batch.states[0])?;

        let err = agent.train_on_batch(&batch).unwrap_err();
        assert!(is_error(&err, AwrError::is_numeric_degeneracy));
        assert_eq!(agent.values(&batch.states)?, values);
        assert_eq!(agent.action_probs(&batch.states[0])?, probs);
        assert_eq!(agent.n_opts(), 0);
        Ok(())
    }

    #[test]
    fn test_noisy_policy_modes() -> Result<()> {
        let mut agent = Awr::build(config().use_noisy_net(true))?;
        let state = [0.5, 1.0];

        agent.set_train(false);
        assert_eq!(agent.action_probs(&state)?, agent.action_probs(&state)?);

        agent.set_train(true);
        assert_ne!(agent.action_probs(&state)?, agent.action_probs(&state)?);
        Ok(())
    }
}
