//! Episode loop and Double-DQN updates.
//!
//! [`Trainer`] owns the environment, the online and target estimators, the
//! replay buffer and the random number generator. Each episode is played with
//! the epsilon-greedy policy; after the warm-up episodes every episode ends
//! with one gradient step on a sampled batch, and the target estimator follows
//! the online one through [`TargetUpdate`]. The online weights of the longest
//! episode are kept and restored when training finishes.
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::config::{DqnConfig, TargetUpdate};
use crate::env::Environment;
use crate::error::{DqnError, Result};
use crate::estimator::{argmax, soft_update, ValueEstimator, Weights};
use crate::loss::Loss;
use crate::metrics::MetricsTracker;
use crate::policy::{EpsilonGreedy, EpsilonSchedule, ExplorationRange};
use crate::replay_buffer::{ReplayBuffer, Transition};

/// Episodes averaged in the progress log
const PROGRESS_WINDOW: usize = 100;

/// Outcome of one training episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    /// Steps taken before the episode ended or hit the step limit
    pub steps: usize,
    pub total_reward: f32,
    pub epsilon: f32,
    /// Loss of the training step run after the episode, if any
    pub loss: Option<f32>,
    /// The episode set a new best score and its weights were kept
    pub new_best: bool,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub episodes: usize,
    pub best_score: usize,
    pub best_episode: Option<usize>,
    pub episode_lengths: Vec<usize>,
    pub mean_loss: Option<f32>,
}

impl TrainingReport {
    /// Saves the report as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_json::to_string_pretty(&self)?.as_bytes())?;
        Ok(())
    }
}

/// TD targets `r + (1 - done) * discount * Q_target(s', argmax_a Q_online(s', a))`.
///
/// The next action is chosen by the online estimate and valued by the target
/// estimate. Terminal transitions yield the bare reward.
pub fn td_targets(
    rewards: ArrayView1<f32>,
    dones: &[bool],
    online_next: ArrayView2<f32>,
    target_next: ArrayView2<f32>,
    discount: f32,
) -> Result<Array1<f32>> {
    let batch_size = rewards.len();
    if dones.len() != batch_size
        || online_next.nrows() != batch_size
        || online_next.dim() != target_next.dim()
    {
        return Err(DqnError::dimension_mismatch(
            format!("{} rows everywhere", batch_size),
            format!(
                "{} dones, online {:?}, target {:?}",
                dones.len(),
                online_next.dim(),
                target_next.dim()
            ),
        ));
    }

    let mut targets = Array1::zeros(batch_size);
    for i in 0..batch_size {
        targets[i] = if dones[i] {
            rewards[i]
        } else {
            let best_next = argmax(online_next.row(i))?;
            rewards[i] + discount * target_next[[i, best_next]]
        };
    }
    Ok(targets)
}

pub struct Trainer<E: Environment, V: ValueEstimator> {
    config: DqnConfig,
    env: E,
    online: V,
    target: V,
    buffer: ReplayBuffer,
    policy: EpsilonGreedy,
    schedule: EpsilonSchedule,
    rng: StdRng,
    metrics: MetricsTracker,
    best_weights: Option<Weights>,
    best_score: usize,
    best_episode: Option<usize>,
    episode_lengths: Vec<usize>,
}

impl<E: Environment, V: ValueEstimator> Trainer<E, V> {
    /// The target estimator starts as a copy of `online`.
    pub fn new(config: DqnConfig, env: E, online: V) -> Result<Self> {
        config.validate()?;
        if env.num_actions() != online.num_actions() {
            return Err(DqnError::dimension_mismatch(
                format!("{} actions", env.num_actions()),
                format!("an estimator with {} outputs", online.num_actions()),
            ));
        }
        if let ExplorationRange::Fixed(n) = config.exploration {
            if n > env.num_actions() {
                return Err(DqnError::invalid_parameter(
                    "exploration".to_string(),
                    format!("random actions 0..{} exceed the {} available actions", n, env.num_actions()),
                ));
            }
        }

        let target = online.clone();
        Ok(Trainer {
            buffer: ReplayBuffer::new(config.buffer_capacity),
            policy: EpsilonGreedy::new(config.exploration),
            schedule: config.schedule(),
            rng: StdRng::seed_from_u64(config.seed),
            metrics: MetricsTracker::default(),
            best_weights: None,
            best_score: 0,
            best_episode: None,
            episode_lengths: Vec::with_capacity(config.episodes),
            config,
            env,
            online,
            target,
        })
    }

    /// Runs every configured episode, then loads the best snapshot into the
    /// online estimator.
    pub fn train(&mut self) -> Result<TrainingReport> {
        for episode in 0..self.config.episodes {
            self.train_episode(episode)?;
        }
        self.restore_best()?;

        let report = self.report();
        info!(
            "Training finished: {} steps, best score {} (episode {:?}), mean loss {:?}",
            self.metrics.total_steps(),
            report.best_score,
            report.best_episode,
            report.mean_loss
        );
        Ok(report)
    }

    /// One episode followed by the best-snapshot check, a training step after
    /// the warm-up and the target update.
    pub fn train_episode(&mut self, episode: usize) -> Result<EpisodeSummary> {
        let epsilon = self.schedule.epsilon(episode);
        let (steps, total_reward) = self.play_episode(epsilon)?;
        self.episode_lengths.push(steps);

        let new_best = steps > self.best_score;
        if new_best {
            self.best_weights = Some(self.online.get_weights());
            self.best_score = steps;
            self.best_episode = Some(episode);
        }

        let trained = episode > self.config.warmup_episodes;
        let loss = if trained {
            let loss = self.training_step()?;
            debug!("Episode {} loss {:.5}", episode, loss);
            Some(loss)
        } else {
            None
        };
        info!("{}", self.progress_line(episode, steps, epsilon));

        match self.config.target_update {
            TargetUpdate::Hard { period } => {
                if episode % period == 0 {
                    self.sync_target()?;
                }
            }
            TargetUpdate::Soft { tau } => {
                if trained {
                    let mut weights = self.target.get_weights();
                    soft_update(&mut weights, &self.online.get_weights(), tau)?;
                    self.target.set_weights(&weights)?;
                }
            }
        }

        Ok(EpisodeSummary {
            episode,
            steps,
            total_reward,
            epsilon,
            loss,
            new_best,
        })
    }

    /// `Episode: e, Steps: n, eps: x` followed by recent means over [`PROGRESS_WINDOW`] episodes.
    pub fn progress_line(&self, episode: usize, steps: usize, epsilon: f32) -> String {
        let mut line = format!("Episode: {}, Steps: {}, eps: {:.3}", episode, steps, epsilon);
        if let (Some(length), Some(reward)) = (
            self.metrics.avg_episode_length(PROGRESS_WINDOW),
            self.metrics.avg_episode_reward(PROGRESS_WINDOW),
        ) {
            line.push_str(&format!(", mean steps: {:.1}, mean reward: {:.2}", length, reward));
        }
        if let Some(loss) = self.metrics.avg_loss(PROGRESS_WINDOW) {
            line.push_str(&format!(", mean loss: {:.5}", loss));
        }
        line
    }

    /// Plays one episode with a fixed epsilon, storing every transition.
    ///
    /// Returns the number of steps taken and the summed reward.
    pub fn play_episode(&mut self, epsilon: f32) -> Result<(usize, f32)> {
        self.metrics.start_episode();
        self.metrics.record_epsilon(epsilon);

        let mut state = self.env.reset()?;
        for _ in 0..self.config.max_steps {
            let action = self
                .policy
                .select_action(&self.online, state.view(), epsilon, &mut self.rng)?;
            let step = self.env.step(action)?;
            self.metrics.step(step.reward);

            let done = step.done;
            self.buffer.append(Transition {
                state,
                action,
                reward: step.reward,
                next_state: step.next_state.clone(),
                done,
            });
            state = step.next_state;
            if done {
                break;
            }
        }

        Ok(self.metrics.end_episode())
    }

    /// One Double-DQN gradient step on a sampled batch; returns the loss.
    pub fn training_step(&mut self) -> Result<f32> {
        let batch = self.buffer.sample(self.config.batch_size, &mut self.rng)?;
        let num_actions = self.online.num_actions();

        let online_next = self.online.predict(batch.next_states.view())?;
        let target_next = self.target.predict(batch.next_states.view())?;
        let targets = td_targets(
            batch.rewards.view(),
            &batch.dones,
            online_next.view(),
            target_next.view(),
            self.config.discount,
        )?;

        let q_values = self.online.forward(batch.states.view())?;
        let mut taken = Array1::zeros(batch.len());
        for (i, &action) in batch.actions.iter().enumerate() {
            if action >= num_actions {
                return Err(DqnError::InvalidAction { action, num_actions });
            }
            taken[i] = q_values[[i, action]];
        }

        let loss = self.config.loss.compute(taken.view(), targets.view());
        if !loss.is_finite() {
            return Err(DqnError::Numerical(format!("loss is {}", loss)));
        }

        // Only the taken action of each row receives gradient
        let row_gradients = self.config.loss.gradient(taken.view(), targets.view());
        let mut output_gradient = Array2::zeros(q_values.raw_dim());
        for (i, &action) in batch.actions.iter().enumerate() {
            output_gradient[[i, action]] = row_gradients[i];
        }
        let gradients = self.online.backward(output_gradient.view())?;
        self.online.apply_gradients(&gradients)?;

        self.metrics.record_loss(loss);
        if let Some(mean_q) = taken.mean() {
            self.metrics.record_q_value(mean_q);
        }
        Ok(loss)
    }

    /// Copies the online weights into the target estimator.
    pub fn sync_target(&mut self) -> Result<()> {
        self.target.set_weights(&self.online.get_weights())
    }

    /// Loads the best snapshot, if one was taken, into the online estimator.
    pub fn restore_best(&mut self) -> Result<()> {
        if let Some(weights) = &self.best_weights {
            self.online.set_weights(weights)?;
        }
        Ok(())
    }

    pub fn report(&self) -> TrainingReport {
        TrainingReport {
            episodes: self.episode_lengths.len(),
            best_score: self.best_score,
            best_episode: self.best_episode,
            episode_lengths: self.episode_lengths.clone(),
            mean_loss: self.metrics.mean_loss(),
        }
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn online(&self) -> &V {
        &self.online
    }

    pub fn target(&self) -> &V {
        &self.target
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn best_weights(&self) -> Option<&Weights> {
        self.best_weights.as_ref()
    }

    pub fn best_score(&self) -> usize {
        self.best_score
    }

    /// Consumes the trainer, returning the online estimator.
    pub fn into_online(self) -> V {
        self.online
    }
}
