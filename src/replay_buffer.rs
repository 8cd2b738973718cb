use ndarray::{stack, Array1, ArrayD, ArrayViewD, Axis};
use rand::Rng;
use std::collections::{vec_deque, VecDeque};

use crate::error::{DqnError, Result};

/// One environment step as stored for replay.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: ArrayD<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: ArrayD<f32>,
    pub done: bool,
}

/// Sampled transitions as five aligned sequences, batch axis first.
#[derive(Clone, Debug)]
pub struct Batch {
    pub states: ArrayD<f32>,
    pub actions: Vec<usize>,
    pub rewards: Array1<f32>,
    pub next_states: ArrayD<f32>,
    pub dones: Vec<bool>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Fixed-capacity FIFO store of transitions.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        ReplayBuffer {
            buffer: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity,
        }
    }

    /// Push a transition, evicting the oldest once the buffer is full.
    pub fn append(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Draw `batch_size` transitions uniformly with replacement.
    ///
    /// Fails with [`DqnError::InsufficientData`] while the buffer holds fewer
    /// than `batch_size` transitions. The buffer itself is left untouched.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Batch> {
        if batch_size == 0 || self.buffer.len() < batch_size {
            return Err(DqnError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }

        let picked: Vec<&Transition> = (0..batch_size)
            .map(|_| &self.buffer[rng.gen_range(0..self.buffer.len())])
            .collect();

        let states: Vec<ArrayViewD<f32>> = picked.iter().map(|t| t.state.view()).collect();
        let next_states: Vec<ArrayViewD<f32>> = picked.iter().map(|t| t.next_state.view()).collect();

        Ok(Batch {
            states: stack(Axis(0), &states)?,
            actions: picked.iter().map(|t| t.action).collect(),
            rewards: picked.iter().map(|t| t.reward).collect(),
            next_states: stack(Axis(0), &next_states)?,
            dones: picked.iter().map(|t| t.done).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> vec_deque::Iter<'_, Transition> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
