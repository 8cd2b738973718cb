use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

/// Bounded histories of the values logged during training
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Loss of each training step
    pub losses: VecDeque<f32>,

    /// Undiscounted reward per episode
    pub episode_rewards: VecDeque<f32>,

    /// Steps per episode
    pub episode_lengths: VecDeque<usize>,

    /// Mean Q-value of the taken actions per training step
    pub q_values: VecDeque<f32>,

    /// Epsilon in effect per episode
    pub epsilons: VecDeque<f32>,
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T, limit: usize) {
    if history.len() >= limit {
        history.pop_front();
    }
    history.push_back(value);
}

fn recent_mean<'a, I>(values: I, window: usize) -> Option<f32>
where
    I: DoubleEndedIterator<Item = &'a f32>,
{
    let (sum, n) = values.rev().take(window).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f32)
    }
}

/// Tracks metrics during training
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    metrics: TrainingMetrics,
    history_size: usize,

    // Episode tracking
    current_episode_reward: f32,
    current_episode_length: usize,
    episode_count: usize,

    // Totals over the whole run
    total_steps: usize,
    loss_sum: f64,
    loss_count: usize,
}

impl MetricsTracker {
    pub fn new(history_size: usize) -> Self {
        MetricsTracker {
            metrics: TrainingMetrics::default(),
            history_size: history_size.max(1),
            current_episode_reward: 0.0,
            current_episode_length: 0,
            episode_count: 0,
            total_steps: 0,
            loss_sum: 0.0,
            loss_count: 0,
        }
    }

    /// Record the loss of a training step
    pub fn record_loss(&mut self, loss: f32) {
        push_bounded(&mut self.metrics.losses, loss, self.history_size);
        self.loss_sum += loss as f64;
        self.loss_count += 1;
    }

    /// Record a Q-value estimate
    pub fn record_q_value(&mut self, q_value: f32) {
        push_bounded(&mut self.metrics.q_values, q_value, self.history_size);
    }

    /// Record epsilon value
    pub fn record_epsilon(&mut self, epsilon: f32) {
        push_bounded(&mut self.metrics.epsilons, epsilon, self.history_size);
    }

    /// Start a new episode
    pub fn start_episode(&mut self) {
        self.current_episode_reward = 0.0;
        self.current_episode_length = 0;
    }

    /// Record a step within an episode
    pub fn step(&mut self, reward: f32) {
        self.current_episode_reward += reward;
        self.current_episode_length += 1;
        self.total_steps += 1;
    }

    /// End the current episode, returning its length and total reward
    pub fn end_episode(&mut self) -> (usize, f32) {
        push_bounded(&mut self.metrics.episode_rewards, self.current_episode_reward, self.history_size);
        push_bounded(&mut self.metrics.episode_lengths, self.current_episode_length, self.history_size);
        self.episode_count += 1;
        (self.current_episode_length, self.current_episode_reward)
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Mean of every loss recorded so far, not only the retained history
    pub fn mean_loss(&self) -> Option<f32> {
        if self.loss_count == 0 {
            None
        } else {
            Some((self.loss_sum / self.loss_count as f64) as f32)
        }
    }

    /// Get recent average loss
    pub fn avg_loss(&self, window: usize) -> Option<f32> {
        recent_mean(self.metrics.losses.iter(), window)
    }

    /// Get recent average episode reward
    pub fn avg_episode_reward(&self, window: usize) -> Option<f32> {
        recent_mean(self.metrics.episode_rewards.iter(), window)
    }

    /// Get recent average episode length
    pub fn avg_episode_length(&self, window: usize) -> Option<f32> {
        let n = window.min(self.metrics.episode_lengths.len());
        if n == 0 {
            return None;
        }
        let sum: usize = self.metrics.episode_lengths.iter().rev().take(n).sum();
        Some(sum as f32 / n as f32)
    }

    /// Save metrics to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        let serialized = serde_json::to_string_pretty(&self.metrics)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_bookkeeping() {
        let mut tracker = MetricsTracker::new(2);
        for rewards in [&[1.0, 0.0][..], &[0.0], &[1.0, 1.0, -1.0]] {
            tracker.start_episode();
            for &r in rewards {
                tracker.step(r);
            }
            tracker.end_episode();
        }
        assert_eq!(tracker.episode_count(), 3);
        assert_eq!(tracker.total_steps(), 6);
        // Only the last two episodes are retained
        assert_eq!(tracker.metrics().episode_lengths, VecDeque::from(vec![1, 3]));
        assert_eq!(tracker.avg_episode_length(10), Some(2.0));
        assert_eq!(tracker.avg_episode_reward(1), Some(1.0));
    }

    #[test]
    fn test_mean_loss_covers_evicted_history() {
        let mut tracker = MetricsTracker::new(1);
        assert_eq!(tracker.mean_loss(), None);
        tracker.record_loss(1.0);
        tracker.record_loss(3.0);
        assert_eq!(tracker.avg_loss(5), Some(3.0));
        assert_eq!(tracker.mean_loss(), Some(2.0));
    }

    #[test]
    fn test_save_writes_histories() {
        let mut tracker = MetricsTracker::new(10);
        tracker.record_q_value(0.5);
        tracker.record_epsilon(0.25);
        tracker.start_episode();
        tracker.step(1.0);
        tracker.end_episode();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        tracker.save(&path).unwrap();
        let saved: TrainingMetrics = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.q_values, VecDeque::from(vec![0.5f32]));
        assert_eq!(saved.epsilons, VecDeque::from(vec![0.25f32]));
        assert_eq!(saved.episode_lengths, VecDeque::from(vec![1]));
    }
}
