//! Collection-then-train loop.
mod config;
mod sampler;
use crate::{
    error::{self, AwrError},
    record::{Record, RecordValue, Recorder},
    Agent, Env, ExperienceBufferBase, ReplayBufferBase, Transition,
};
use anyhow::Result;
use chrono::Local;
pub use config::TrainerConfig;
use log::{info, warn};
pub use sampler::Sampler;

/// Manages the training loop.
///
/// # Training loop
///
/// 1. Build the environment, the buffer and a [`Sampler`].
/// 2. Take an environment step with the agent's policy and push the transition
///    into the buffer.
/// 3. If the episode has just ended and at least `num_sample` transitions were pushed
///    since the last training pass, call [`Agent::opt_with_record`] with the buffer and
///    write the returned record to the recorder.
/// 4. Stop after `max_opts` training passes or `max_env_steps` environment steps,
///    otherwise go back to 2.
///
/// Collection pauses while a training pass runs, so the buffer is never read and written
/// at the same time.
///
/// # Failures
///
/// * A training pass failing with [`AwrError::NumericDegeneracy`] is skipped; the agent
///   keeps its previous parameters and collection continues.
/// * An environment failure ([`AwrError::Env`], [`AwrError::EnvTimeout`]) discards the
///   current episode and the environment is reset. More than `max_env_failures`
///   consecutive failures abort training.
/// * Any other error aborts training.
pub struct Trainer<E, R>
where
    E: Env,
    R: ExperienceBufferBase<Item = Transition> + ReplayBufferBase,
{
    /// Configuration of the environment for training.
    env_config: E::Config,

    /// Configuration of the buffer.
    replay_buffer_config: R::Config,

    num_sample: usize,
    max_opts: usize,
    max_env_steps: Option<usize>,
    max_env_failures: usize,
    env_seed: i64,
}

impl<E, R> Trainer<E, R>
where
    E: Env,
    R: ExperienceBufferBase<Item = Transition> + ReplayBufferBase,
{
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig, env_config: E::Config, replay_buffer_config: R::Config) -> Self {
        Self {
            env_config,
            replay_buffer_config,
            num_sample: config.num_sample,
            max_opts: config.max_opts,
            max_env_steps: config.max_env_steps,
            max_env_failures: config.max_env_failures,
            env_seed: config.env_seed,
        }
    }

    fn is_finished(&self, env_steps: usize, opt_steps: usize) -> bool {
        opt_steps >= self.max_opts || self.max_env_steps.map_or(false, |n| env_steps >= n)
    }

    /// Train the agent.
    ///
    /// Returns the buffer, which holds the most recent transitions.
    pub fn train<A>(&mut self, agent: &mut A, recorder: &mut dyn Recorder) -> Result<R>
    where
        A: Agent<R>,
    {
        if self.num_sample == 0 {
            return Err(AwrError::Config("num_sample must be positive".to_string()).into());
        }
        let env = E::build(&self.env_config, self.env_seed)?;
        let mut buffer = R::build(&self.replay_buffer_config);
        let mut sampler = Sampler::new(env);
        let mut env_steps = 0;
        let mut opt_steps = 0;
        let mut new_samples = 0;
        let mut env_failures = 0;
        agent.train();

        while !self.is_finished(env_steps, opt_steps) {
            let (record, is_done) = match sampler.sample_and_push(agent, &mut buffer) {
                Ok(v) => v,
                Err(e) => match error::kind(&e) {
                    Some(kind) if kind.is_env_failure() => {
                        env_failures += 1;
                        if env_failures > self.max_env_failures {
                            return Err(e);
                        }
                        warn!("Environment failure ({}), resetting the environment", e);
                        sampler.reset();
                        continue;
                    }
                    _ => return Err(e),
                },
            };
            env_failures = 0;
            env_steps += 1;
            new_samples += 1;

            if !record.is_empty() {
                recorder.write(record);
            }

            if !is_done || new_samples < self.num_sample {
                continue;
            }
            new_samples = 0;

            info!(
                "Training pass {} with {} transitions ({} env steps)",
                opt_steps + 1,
                buffer.len(),
                env_steps
            );
            match agent.opt_with_record(&mut buffer) {
                Ok(record) => {
                    opt_steps += 1;
                    let record = record.merge(Record::from_slice(&[
                        ("opt_steps", RecordValue::Scalar(opt_steps as f32)),
                        ("env_steps", RecordValue::Scalar(env_steps as f32)),
                        ("datetime", RecordValue::DateTime(Local::now())),
                    ]));
                    recorder.write(record);
                }
                Err(e) => match error::kind(&e) {
                    Some(AwrError::NumericDegeneracy(msg)) => {
                        warn!("Training pass skipped: {}", msg);
                    }
                    _ => return Err(e),
                },
            }
        }
        info!(
            "Training finished: {} passes, {} env steps, {} episodes",
            opt_steps,
            env_steps,
            sampler.n_episodes()
        );

        Ok(buffer)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        record::{BufferedRecorder, NullRecorder},
        Batch, Policy, Step, TransitionBuffer, TransitionBufferConfig,
    };
    use test_log::test;

    const EPISODE_LENGTH: usize = 5;

    #[derive(Clone)]
    struct CountingEnvConfig {
        /// Global step at which `step()` fails once.
        fail_at: Option<usize>,
    }

    /// Episodes of fixed length with observation `[t]` and reward 1.
    struct CountingEnv {
        t: usize,
        n_steps: usize,
        fail_at: Option<usize>,
    }

    impl Env for CountingEnv {
        type Config = CountingEnvConfig;
        type Info = ();

        fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
            Ok(Self {
                t: 0,
                n_steps: 0,
                fail_at: config.fail_at,
            })
        }

        fn reset(&mut self) -> Result<Vec<f32>> {
            self.t = 0;
            Ok(vec![0.0])
        }

        fn step(&mut self, act: usize) -> Result<Step<Self>> {
            self.n_steps += 1;
            if self.fail_at == Some(self.n_steps) {
                return Err(AwrError::Env("connection dropped".to_string()).into());
            }
            self.t += 1;
            let is_truncated = self.t == EPISODE_LENGTH;
            Ok(Step::new(vec![self.t as f32], act, 1.0, false, is_truncated, ()))
        }

        fn max_episode_steps(&self) -> Option<usize> {
            Some(EPISODE_LENGTH)
        }
    }

    /// Records the batches it was trained on.
    #[derive(Default)]
    struct CountingAgent {
        batches: Vec<Batch>,
        degenerate_passes: usize,
        train: bool,
    }

    impl Policy for CountingAgent {
        fn sample(&mut self, _obs: &[f32]) -> Result<usize> {
            Ok(0)
        }
    }

    impl Agent<TransitionBuffer> for CountingAgent {
        fn train(&mut self) {
            self.train = true;
        }

        fn eval(&mut self) {
            self.train = false;
        }

        fn is_train(&self) -> bool {
            self.train
        }

        fn opt_with_record(&mut self, buffer: &mut TransitionBuffer) -> Result<Record> {
            if self.degenerate_passes > 0 {
                self.degenerate_passes -= 1;
                return Err(AwrError::NumericDegeneracy("nan".to_string()).into());
            }
            let batch = buffer.snapshot();
            let record = Record::from_scalar("batch_len", batch.len() as f32);
            self.batches.push(batch);
            Ok(record)
        }
    }

    fn trainer(
        config: TrainerConfig,
        fail_at: Option<usize>,
        capacity: usize,
    ) -> Trainer<CountingEnv, TransitionBuffer> {
        Trainer::build(
            config,
            CountingEnvConfig { fail_at },
            TransitionBufferConfig::default().capacity(capacity),
        )
    }

    fn pass_records(recorder: &BufferedRecorder) -> Vec<&Record> {
        recorder
            .iter()
            .filter(|r| r.get("opt_steps").is_some())
            .collect()
    }

    #[test]
    fn test_training_pass_after_num_sample_at_episode_end() -> Result<()> {
        let config = TrainerConfig::default().num_sample(7).max_opts(3);
        let mut agent = CountingAgent::default();
        let mut recorder = BufferedRecorder::new();
        let buffer = trainer(config, None, 100).train(&mut agent, &mut recorder)?;

        // 7 transitions rounded up to the end of the second episode
        assert_eq!(agent.batches.len(), 3);
        assert_eq!(
            agent.batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(buffer.n_pushed(), 30);
        assert!(agent.is_train());

        let batch = &agent.batches[0];
        batch.validate()?;
        assert_eq!(batch.states[0], vec![0.0]);
        assert_eq!(batch.next_states[4], vec![5.0]);
        assert!(batch.dones[4]);
        assert_eq!(batch.states[5], vec![0.0]);

        let passes = pass_records(&recorder);
        assert_eq!(passes.len(), 3);
        assert_eq!(passes[2].get_scalar("batch_len")?, 30.0);
        assert_eq!(passes[2].get_scalar("env_steps")?, 30.0);

        let episodes = recorder
            .iter()
            .filter(|r| r.get("episode_return").is_some())
            .count();
        assert_eq!(episodes, 6);

        Ok(())
    }

    #[test]
    fn test_buffer_capacity_bounds_the_batch() -> Result<()> {
        let config = TrainerConfig::default().num_sample(10).max_opts(3);
        let mut agent = CountingAgent::default();
        let mut recorder = BufferedRecorder::new();
        trainer(config, None, 15).train(&mut agent, &mut recorder)?;

        assert_eq!(
            agent.batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
            vec![10, 15, 15]
        );
        Ok(())
    }

    #[test]
    fn test_degenerate_pass_is_skipped() -> Result<()> {
        let config = TrainerConfig::default().num_sample(5).max_opts(2);
        let mut agent = CountingAgent {
            degenerate_passes: 1,
            ..Default::default()
        };
        let mut recorder = BufferedRecorder::new();
        trainer(config, None, 100).train(&mut agent, &mut recorder)?;

        // The first pass is skipped, the next two succeed
        assert_eq!(
            agent.batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
            vec![10, 15]
        );
        assert_eq!(pass_records(&recorder).len(), 2);
        Ok(())
    }

    #[test]
    fn test_env_failure_resets_the_episode() -> Result<()> {
        let config = TrainerConfig::default().num_sample(5).max_opts(1);
        let mut agent = CountingAgent::default();
        let mut recorder = BufferedRecorder::new();
        trainer(config, Some(3), 100).train(&mut agent, &mut recorder)?;

        // Two steps before the failure, then a full episode after the reset
        let batch = &agent.batches[0];
        assert_eq!(batch.len(), 7);
        assert_eq!(batch.states[2], vec![0.0]);
        assert!(batch.dones[6]);
        // The interrupted episode stays open and its last next-state is not the reset state
        assert!(!batch.dones[1]);
        assert_eq!(batch.next_states[1], vec![2.0]);
        Ok(())
    }

    #[test]
    fn test_max_env_steps_stops_training() -> Result<()> {
        let config = TrainerConfig::default()
            .num_sample(1000)
            .max_opts(1)
            .max_env_steps(12);
        let mut agent = CountingAgent::default();
        let buffer = trainer(config, None, 100).train(&mut agent, &mut NullRecorder::new())?;

        assert!(agent.batches.is_empty());
        assert_eq!(buffer.len(), 12);
        Ok(())
    }
}
