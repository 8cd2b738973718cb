use anyhow::{Context, Result};
use breakout_dqn::{
    config::DqnConfig,
    env::{CatchEnv, Environment},
    network::{LayerSpec, QNetwork},
    trainer::Trainer,
};
use clap::Parser;
use log::info;
use rand::{rngs::StdRng, SeedableRng};
use std::path::PathBuf;

/// Train a Double-DQN agent on the Catch pixel game
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON training configuration; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the number of episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Overrides the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Board height in pixels
    #[arg(long, default_value_t = 20)]
    height: usize,

    /// Board width in pixels
    #[arg(long, default_value_t = 16)]
    width: usize,

    /// Write the trained network (best weights) to this file
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write the training report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write the recent loss, reward, length, Q-value and epsilon histories as JSON to this file
    #[arg(long)]
    metrics: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<DqnConfig> {
    let mut config = match &args.config {
        Some(path) => DqnConfig::load(path).with_context(|| format!("reading config {:?}", path))?,
        None => DqnConfig::default(),
    };
    if let Some(episodes) = args.episodes {
        config = config.episodes(episodes);
    }
    if let Some(seed) = args.seed {
        config = config.seed(seed);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let env = CatchEnv::new(args.height, args.width, config.seed)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let network = QNetwork::build(
        &env.observation_shape(),
        &LayerSpec::breakout(),
        env.num_actions(),
        config.optimizer.build(),
        config.learning_rate,
        &mut rng,
    )
    .context("building the Q-network")?;
    info!("Q-network\n{}", network.summary());

    let mut trainer = Trainer::new(config, env, network)?;
    let report = trainer.train()?;

    if let Some(path) = &args.report {
        report.save(path)?;
        info!("Save report to {:?}", path);
    }
    if let Some(path) = &args.metrics {
        trainer.metrics().save(path)?;
        info!("Save metrics to {:?}", path);
    }
    if let Some(path) = &args.save {
        trainer.into_online().save(path)?;
    }

    Ok(())
}
