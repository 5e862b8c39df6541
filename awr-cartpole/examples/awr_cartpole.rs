use anyhow::Result;
use awr_candle_agent::{
    awr::{Awr, AwrConfig},
    Device,
};
use awr_cartpole::{
    CartPole, CartPoleConfig, EpisodeMonitor, EpisodeMonitorConfig, ThreadedEnv, ThreadedEnvConfig,
};
use awr_core::{
    record::{Record, RecordValue, Recorder},
    Configurable, Trainer, TransitionBuffer,
};
use clap::Parser;
use log::info;
use std::path::PathBuf;

type Env = ThreadedEnv<EpisodeMonitor<CartPole>>;

const DIM_OBS: usize = 4;
const DIM_ACT: usize = 2;
const MAX_OPTS: usize = 200;
const RESPONSE_TIMEOUT_MS: u64 = 10_000;

/// Train AWR agent in cartpole environment
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML file of the agent configuration; defaults are used if not given
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of training passes
    #[arg(long, default_value_t = MAX_OPTS)]
    max_opts: usize,

    /// Random seed of the agent and the environment
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Use noisy linear layers in the policy network
    #[arg(short, long, default_value_t = false)]
    noisy: bool,

    /// Use the GPU with the given ordinal
    #[arg(long)]
    cuda: Option<usize>,

    /// Print every environment step (log level debug)
    #[arg(short, long, default_value_t = false)]
    render: bool,

    /// Directory where the trained parameters are saved
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

/// Logs the scalars of training pass records.
struct LogRecorder;

impl Recorder for LogRecorder {
    fn write(&mut self, record: Record) {
        if record.get("opt_steps").is_none() {
            return;
        }
        let mut items = record
            .iter()
            .filter_map(|(k, v)| match v {
                RecordValue::Scalar(v) => Some(format!("{}: {:.4}", k, v)),
                _ => None,
            })
            .collect::<Vec<_>>();
        items.sort();
        info!("{}", items.join(", "));
    }
}

fn create_agent_config(args: &Args) -> Result<AwrConfig> {
    let config = match &args.config {
        Some(path) => AwrConfig::load(path)?,
        None => AwrConfig::default().dims(DIM_OBS, DIM_ACT),
    };
    let device = match args.cuda {
        Some(n) => Device::Cuda(n),
        None => config.device,
    };
    let use_noisy_net = args.noisy || config.use_noisy_net;
    Ok(config
        .seed(args.seed)
        .use_noisy_net(use_noisy_net)
        .device(device))
}

fn create_env_config(args: &Args) -> ThreadedEnvConfig<EpisodeMonitorConfig<CartPoleConfig>> {
    let cartpole_config = CartPoleConfig::default().render(args.render);
    ThreadedEnvConfig::new(EpisodeMonitorConfig::new(cartpole_config))
        .response_timeout_ms(RESPONSE_TIMEOUT_MS)
}

fn train(args: &Args) -> Result<()> {
    let agent_config = create_agent_config(args)?;
    let trainer_config = agent_config
        .trainer_config()
        .max_opts(args.max_opts)
        .env_seed(args.seed as i64);
    let mut trainer = Trainer::<Env, TransitionBuffer>::build(
        trainer_config,
        create_env_config(args),
        agent_config.buffer_config(),
    );
    let mut agent = Awr::build(agent_config)?;

    trainer.train(&mut agent, &mut LogRecorder)?;

    if let Some(model_dir) = &args.model_dir {
        agent.save_params(model_dir)?;
        info!("Saved parameters in {:?}", model_dir);
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    train(&args)
}
