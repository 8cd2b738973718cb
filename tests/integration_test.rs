use breakout_dqn::activations::Activation;
use breakout_dqn::config::{DqnConfig, TargetUpdate};
use breakout_dqn::env::{CatchEnv, Environment};
use breakout_dqn::estimator::ValueEstimator;
use breakout_dqn::layers::Padding;
use breakout_dqn::loss::LossFunction;
use breakout_dqn::network::{LayerSpec, QNetwork};
use breakout_dqn::policy::ExplorationRange;
use breakout_dqn::trainer::{Trainer, TrainingReport};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn small_network(env: &CatchEnv, config: &DqnConfig) -> QNetwork {
    let hidden = vec![
        LayerSpec::Conv2D {
            filters: 4,
            kernel_size: 3,
            stride: 2,
            padding: Padding::Same,
            activation: Activation::Relu,
        },
        LayerSpec::MaxPool2D { pool_size: 2 },
        LayerSpec::Flatten,
        LayerSpec::Dense { units: 16, activation: Activation::Relu },
    ];
    let mut rng = StdRng::seed_from_u64(config.seed);
    QNetwork::build(
        &env.observation_shape(),
        &hidden,
        env.num_actions(),
        config.optimizer.build(),
        config.learning_rate,
        &mut rng,
    )
    .unwrap()
}

fn run(config: DqnConfig) -> (TrainingReport, QNetwork) {
    let env = CatchEnv::new(8, 8, config.seed).unwrap();
    let network = small_network(&env, &config);
    let mut trainer = Trainer::new(config, env, network).unwrap();
    let report = trainer.train().unwrap();
    (report, trainer.into_online())
}

fn quick_config() -> DqnConfig {
    DqnConfig::default()
        .episodes(12)
        .max_steps(30)
        .warmup_episodes(3)
        .batch_size(8)
        .buffer_capacity(500)
        .target_update(TargetUpdate::Hard { period: 4 })
        .epsilon(1.0, 0.05, 10)
        .exploration(ExplorationRange::AllActions)
        .seed(13)
}

#[test]
fn test_catch_training_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (report, network) = run(quick_config());

    assert_eq!(report.episodes, 12);
    assert_eq!(report.episode_lengths.len(), 12);
    assert!(report.episode_lengths.iter().all(|&n| n >= 1 && n <= 30));
    assert_eq!(report.best_score, *report.episode_lengths.iter().max().unwrap());
    let best = report.best_episode.unwrap();
    assert_eq!(report.episode_lengths[best], report.best_score);
    // Earlier episodes never reach the best score
    assert!(report.episode_lengths[..best].iter().all(|&n| n < report.best_score));
    // Training ran after the warm-up episodes
    assert!(report.mean_loss.unwrap().is_finite());

    let env = CatchEnv::new(8, 8, 0).unwrap();
    let q = network
        .predict(ndarray::ArrayD::zeros(ndarray::IxDyn(&[1, 8, 8, 1])).view())
        .unwrap();
    assert_eq!(q.dim(), (1, env.num_actions()));
}

#[test]
fn test_runs_are_reproducible() {
    let config = quick_config().episodes(6).loss(LossFunction::Mse);
    let (first, first_net) = run(config.clone());
    let (second, second_net) = run(config);
    assert_eq!(first, second);
    assert_eq!(first_net.get_weights(), second_net.get_weights());
}

#[test]
fn test_soft_updates_end_to_end() {
    let config = quick_config()
        .episodes(8)
        .target_update(TargetUpdate::Soft { tau: 0.01 });
    let (report, _) = run(config);
    assert_eq!(report.episodes, 8);
}

#[test]
fn test_config_and_report_files() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let config = quick_config()
        .episodes(5)
        .target_update(TargetUpdate::Soft { tau: 0.05 })
        .loss(LossFunction::Huber { delta: 2.0 });
    config.save(&config_path).unwrap();
    let loaded = DqnConfig::load(&config_path).unwrap();
    assert_eq!(loaded, config);

    let (report, network) = run(loaded);
    let report_path = dir.path().join("report.json");
    report.save(&report_path).unwrap();
    let text = std::fs::read_to_string(&report_path).unwrap();
    let parsed: TrainingReport = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, report);

    let model_path = dir.path().join("model.bin");
    network.save(&model_path).unwrap();
    let restored = QNetwork::load(&model_path).unwrap();
    assert_eq!(restored.get_weights(), network.get_weights());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = DqnConfig::default().discount(-0.1);
    let env = CatchEnv::new(8, 8, 0).unwrap();
    let network = small_network(&env, &DqnConfig::default());
    assert!(Trainer::new(config, env, network).is_err());
}
