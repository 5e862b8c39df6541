//! Environment running in its own thread.
use anyhow::Result;
use awr_core::{error::AwrError, Env, Step};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Configuration of [`ThreadedEnv`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ThreadedEnvConfig<C> {
    /// Configuration of the environment run in the worker thread.
    pub env_config: C,

    /// How long to wait for each response of the worker, in milliseconds.
    pub response_timeout_ms: u64,
}

impl<C> ThreadedEnvConfig<C> {
    /// Wraps the configuration of an environment with a 10 second timeout.
    pub fn new(env_config: C) -> Self {
        Self {
            env_config,
            response_timeout_ms: 10_000,
        }
    }

    /// Sets the response timeout.
    pub fn response_timeout_ms(mut self, v: u64) -> Self {
        self.response_timeout_ms = v;
        self
    }
}

/// Request to the worker thread.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EnvRequest {
    /// Reset the environment.
    Reset,

    /// Take a step with the given action.
    Step(usize),

    /// Stop the worker.
    Close,
}

/// Response of the worker thread.
#[derive(Debug)]
pub(crate) enum EnvResponse<I> {
    /// The environment was built.
    Built {
        /// Step limit of the environment.
        max_episode_steps: Option<usize>,
    },

    /// Observation after a reset.
    Reset(Vec<f32>),

    /// Result of a step.
    Step {
        /// Next observation.
        obs: Vec<f32>,

        /// Reward.
        reward: f32,

        /// Episode terminated.
        is_terminated: bool,

        /// Episode truncated.
        is_truncated: bool,

        /// Information of the step.
        info: I,
    },
}

struct Message<T> {
    id: u64,
    body: T,
}

type Response<I> = Message<Result<EnvResponse<I>>>;

fn worker<E: Env>(
    env_config: E::Config,
    seed: i64,
    requests: Receiver<Message<EnvRequest>>,
    responses: Sender<Response<E::Info>>,
) {
    let mut env = match E::build(&env_config, seed) {
        Ok(env) => {
            let body = Ok(EnvResponse::Built {
                max_episode_steps: env.max_episode_steps(),
            });
            if responses.send(Message { id: 0, body }).is_err() {
                return;
            }
            env
        }
        Err(e) => {
            let _ = responses.send(Message { id: 0, body: Err(e) });
            return;
        }
    };

    for Message { id, body } in requests.iter() {
        let body = match body {
            EnvRequest::Close => break,
            EnvRequest::Reset => env.reset().map(EnvResponse::Reset),
            EnvRequest::Step(act) => env.step(act).map(|step| EnvResponse::Step {
                obs: step.obs,
                reward: step.reward,
                is_terminated: step.is_terminated,
                is_truncated: step.is_truncated,
                info: step.info,
            }),
        };
        if responses.send(Message { id, body }).is_err() {
            break;
        }
    }
    debug!("Environment worker stopped");
}

/// Runs an environment in a dedicated thread.
///
/// Every call of [`Env::reset`] or [`Env::step`] sends a request to the worker and blocks
/// until the matching response arrives, at most `response_timeout_ms` milliseconds.
/// A timeout fails with [`AwrError::EnvTimeout`] and a vanished worker with
/// [`AwrError::Env`]; errors of the wrapped environment are passed through.
/// Responses to requests that timed out are discarded when they arrive later.
///
/// Dropping the wrapper stops the worker and joins it, unless a request timed out, in
/// which case the worker is left to finish on its own.
pub struct ThreadedEnv<E: Env> {
    requests: Sender<Message<EnvRequest>>,
    responses: Receiver<Response<E::Info>>,
    handle: Option<JoinHandle<()>>,
    next_id: u64,
    timeout: Duration,
    timed_out: bool,
    max_episode_steps: Option<usize>,
}

impl<E: Env> ThreadedEnv<E> {
    fn wait(&mut self, id: u64) -> Result<EnvResponse<E::Info>> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(msg) if msg.id == id => return msg.body,
                Ok(msg) => debug!("Discard stale response {}", msg.id),
                Err(RecvTimeoutError::Timeout) => {
                    self.timed_out = true;
                    return Err(AwrError::EnvTimeout(self.timeout).into());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AwrError::Env("environment worker is gone".to_string()).into())
                }
            }
        }
    }

    fn request(&mut self, req: EnvRequest) -> Result<EnvResponse<E::Info>> {
        self.next_id += 1;
        let id = self.next_id;
        self.requests
            .send(Message { id, body: req })
            .map_err(|_| AwrError::Env("environment worker is gone".to_string()))?;
        self.wait(id)
    }
}

fn unexpected<I>(resp: &EnvResponse<I>) -> anyhow::Error {
    let kind = match resp {
        EnvResponse::Built { .. } => "Built",
        EnvResponse::Reset(_) => "Reset",
        EnvResponse::Step { .. } => "Step",
    };
    AwrError::Env(format!("unexpected {} response", kind)).into()
}

impl<E> Env for ThreadedEnv<E>
where
    E: Env + 'static,
    E::Config: Send + 'static,
    E::Info: Send + 'static,
{
    type Config = ThreadedEnvConfig<E::Config>;
    type Info = E::Info;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let env_config = config.env_config.clone();
        let handle = thread::Builder::new()
            .name("awr-env".to_string())
            .spawn(move || worker::<E>(env_config, seed, req_rx, resp_tx))?;

        let mut env = Self {
            requests: req_tx,
            responses: resp_rx,
            handle: Some(handle),
            next_id: 0,
            timeout: Duration::from_millis(config.response_timeout_ms),
            timed_out: false,
            max_episode_steps: None,
        };
        match env.wait(0)? {
            EnvResponse::Built { max_episode_steps } => env.max_episode_steps = max_episode_steps,
            resp => return Err(unexpected(&resp)),
        }

        Ok(env)
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        match self.request(EnvRequest::Reset)? {
            EnvResponse::Reset(obs) => Ok(obs),
            resp => Err(unexpected(&resp)),
        }
    }

    fn step(&mut self, act: usize) -> Result<Step<Self>> {
        match self.request(EnvRequest::Step(act))? {
            EnvResponse::Step {
                obs,
                reward,
                is_terminated,
                is_truncated,
                info,
            } => Ok(Step::new(obs, act, reward, is_terminated, is_truncated, info)),
            resp => Err(unexpected(&resp)),
        }
    }

    fn max_episode_steps(&self) -> Option<usize> {
        self.max_episode_steps
    }
}

impl<E: Env> Drop for ThreadedEnv<E> {
    fn drop(&mut self) {
        let _ = self.requests.send(Message {
            id: 0,
            body: EnvRequest::Close,
        });
        if let Some(handle) = self.handle.take() {
            match self.timed_out {
                true => warn!("Environment worker timed out before; not waiting for it"),
                false => {
                    if handle.join().is_err() {
                        warn!("Environment worker panicked");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{CartPole, CartPoleConfig};
    use test_log::test;

    #[derive(Clone)]
    struct SlowEnvConfig {
        /// The first `n_slow` steps sleep this long.
        delay: Duration,
        n_slow: usize,
        fail_build: bool,
    }

    struct SlowEnv {
        delay: Duration,
        n_slow: usize,
        n_steps: usize,
    }

    impl Env for SlowEnv {
        type Config = SlowEnvConfig;
        type Info = ();

        fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
            if config.fail_build {
                return Err(AwrError::Config("cannot build".to_string()).into());
            }
            Ok(Self {
                delay: config.delay,
                n_slow: config.n_slow,
                n_steps: 0,
            })
        }

        fn reset(&mut self) -> Result<Vec<f32>> {
            Ok(vec![self.n_steps as f32])
        }

        fn step(&mut self, act: usize) -> Result<Step<Self>> {
            self.n_steps += 1;
            if self.n_steps <= self.n_slow {
                thread::sleep(self.delay);
            }
            Ok(Step::new(vec![self.n_steps as f32], act, 1.0, false, false, ()))
        }

        fn max_episode_steps(&self) -> Option<usize> {
            None
        }
    }

    fn slow_config(n_slow: usize, fail_build: bool) -> ThreadedEnvConfig<SlowEnvConfig> {
        ThreadedEnvConfig::new(SlowEnvConfig {
            delay: Duration::from_millis(300),
            n_slow,
            fail_build,
        })
        .response_timeout_ms(100)
    }

    #[test]
    fn test_same_trajectory_as_the_wrapped_env() -> Result<()> {
        let config = CartPoleConfig::default();
        let mut env = CartPole::build(&config, 5)?;
        let mut threaded = ThreadedEnv::<CartPole>::build(&ThreadedEnvConfig::new(config), 5)?;
        assert_eq!(threaded.max_episode_steps(), Some(500));

        assert_eq!(env.reset()?, threaded.reset()?);
        for t in 0..20 {
            let step = env.step(t % 2)?;
            let step_ = threaded.step(t % 2)?;
            assert_eq!(step.obs, step_.obs);
            assert_eq!(step.is_done(), step_.is_done());
            if step.is_done() {
                break;
            }
        }
        Ok(())
    }

    #[test]
    fn test_env_errors_pass_through() -> Result<()> {
        let mut env = ThreadedEnv::<CartPole>::build(
            &ThreadedEnvConfig::new(CartPoleConfig::default()),
            0,
        )?;
        env.reset()?;
        let err = env.step(5).err().expect("invalid action must fail");
        assert!(matches!(
            err.downcast_ref::<AwrError>(),
            Some(AwrError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn test_build_failure() {
        let err = ThreadedEnv::<SlowEnv>::build(&slow_config(0, true), 0)
            .err()
            .expect("build must fail");
        assert!(matches!(
            err.downcast_ref::<AwrError>(),
            Some(AwrError::Config(_))
        ));
    }

    #[test]
    fn test_timeout_and_stale_response() -> Result<()> {
        let mut env = ThreadedEnv::<SlowEnv>::build(&slow_config(1, false), 0)?;
        let err = env.step(0).err().expect("slow step must time out");
        assert!(err
            .downcast_ref::<AwrError>()
            .map_or(false, AwrError::is_env_failure));

        // Let the worker finish the slow step; its response must be skipped
        thread::sleep(Duration::from_millis(400));
        assert_eq!(env.reset()?, vec![1.0]);
        assert_eq!(env.step(0)?.obs, vec![2.0]);
        Ok(())
    }
}
