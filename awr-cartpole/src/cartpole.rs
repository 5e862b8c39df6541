//! Cart-pole balancing task.
use anyhow::Result;
use awr_core::{error::AwrError, Env, Step};
use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

const GRAVITY: f64 = 9.8;
const MASS_CART: f64 = 1.0;
const MASS_POLE: f64 = 0.1;
const TOTAL_MASS: f64 = MASS_CART + MASS_POLE;
const HALF_LENGTH: f64 = 0.5;
const POLE_MASS_LENGTH: f64 = MASS_POLE * HALF_LENGTH;
const FORCE_MAG: f64 = 10.0;
const TAU: f64 = 0.02;
const X_THRESHOLD: f64 = 2.4;
const THETA_THRESHOLD: f64 = 12.0 * 2.0 * std::f64::consts::PI / 360.0;

/// Configuration of [`CartPole`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CartPoleConfig {
    /// Episodes are truncated after this number of steps.
    pub max_episode_steps: usize,

    /// If `true`, every step is printed with `log::debug!`.
    pub render: bool,
}

impl Default for CartPoleConfig {
    fn default() -> Self {
        Self {
            max_episode_steps: 500,
            render: false,
        }
    }
}

impl CartPoleConfig {
    /// Sets the step limit.
    pub fn max_episode_steps(mut self, v: usize) -> Self {
        self.max_episode_steps = v;
        self
    }

    /// Sets text rendering.
    pub fn render(mut self, v: bool) -> Self {
        self.render = v;
        self
    }

    /// Constructs [`CartPoleConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CartPoleConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Cart-pole balancing task.
///
/// Observation: `[x, x_dot, theta, theta_dot]`. Actions: `0` pushes the cart to the
/// left, `1` to the right. The reward is `1.0` for every step. An episode terminates
/// when the pole tilts more than 12 degrees or the cart leaves `[-2.4, 2.4]`, and is
/// truncated after `max_episode_steps` steps.
pub struct CartPole {
    state: [f64; 4],
    steps: usize,
    done: bool,
    max_episode_steps: usize,
    render: bool,
    rng: StdRng,
}

impl CartPole {
    fn obs(&self) -> Vec<f32> {
        self.state.iter().map(|&v| v as f32).collect()
    }
}

impl Env for CartPole {
    type Config = CartPoleConfig;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Ok(Self {
            state: [0.0; 4],
            steps: 0,
            // step() before the first reset() is an error
            done: true,
            max_episode_steps: config.max_episode_steps,
            render: config.render,
            rng: StdRng::seed_from_u64(seed as u64),
        })
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        for v in self.state.iter_mut() {
            *v = self.rng.gen_range(-0.05..=0.05);
        }
        self.steps = 0;
        self.done = false;
        Ok(self.obs())
    }

    fn step(&mut self, act: usize) -> Result<Step<Self>> {
        if act > 1 {
            return Err(AwrError::Config(format!("CartPole has 2 actions, got {}", act)).into());
        }
        if self.done {
            return Err(AwrError::Env("step() called on a finished episode".to_string()).into());
        }

        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if act == 1 { FORCE_MAG } else { -FORCE_MAG };
        let (sin, cos) = theta.sin_cos();
        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin - cos * temp)
            / (HALF_LENGTH * (4.0 / 3.0 - MASS_POLE * cos * cos / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos / TOTAL_MASS;

        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        self.steps += 1;

        let [x, _, theta, _] = self.state;
        let is_terminated = x.abs() > X_THRESHOLD || theta.abs() > THETA_THRESHOLD;
        let is_truncated = !is_terminated && self.steps >= self.max_episode_steps;
        self.done = is_terminated || is_truncated;

        if self.render {
            debug!(
                "step {:>4} act {} x {:+.3} theta {:+.3}{}",
                self.steps,
                act,
                x,
                theta,
                if self.done { " done" } else { "" }
            );
        }

        Ok(Step::new(self.obs(), act, 1.0, is_terminated, is_truncated, ()))
    }

    fn max_episode_steps(&self) -> Option<usize> {
        Some(self.max_episode_steps)
    }
}
