use ndarray::{arr1, ArrayD};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::DqnError;
use crate::replay_buffer::{ReplayBuffer, Transition};

fn transition(i: usize) -> Transition {
    Transition {
        state: arr1(&[i as f32, 0.0]).into_dyn(),
        action: i % 3,
        reward: i as f32,
        next_state: arr1(&[i as f32 + 1.0, 0.0]).into_dyn(),
        done: i % 2 == 0,
    }
}

#[test]
fn test_replay_buffer_append_and_sample() {
    let mut buffer = ReplayBuffer::new(10);
    buffer.append(transition(4));
    assert_eq!(buffer.len(), 1);

    let mut rng = StdRng::seed_from_u64(0);
    let batch = buffer.sample(3, &mut rng);
    assert!(matches!(batch, Err(DqnError::InsufficientData { requested: 3, available: 1 })));

    let batch = buffer.sample(1, &mut rng).unwrap();
    assert_eq!(batch.states, arr1(&[4.0f32, 0.0]).into_dyn().insert_axis(ndarray::Axis(0)));
    assert_eq!(batch.actions, vec![1]);
    assert_eq!(batch.rewards[0], 4.0);
    assert_eq!(batch.dones, vec![true]);
}

#[test]
fn test_replay_buffer_capacity() {
    let mut buffer = ReplayBuffer::new(3);
    for i in 0..5 {
        buffer.append(transition(i));
    }

    // Should only keep last 3
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.capacity(), 3);
    let rewards: Vec<f32> = buffer.iter().map(|t| t.reward).collect();
    assert_eq!(rewards, vec![2.0f32, 3.0, 4.0]);
}

#[test]
fn test_sample_is_aligned_and_non_destructive() {
    let mut buffer = ReplayBuffer::new(100);
    for i in 0..10 {
        buffer.append(transition(i));
    }
    let mut rng = StdRng::seed_from_u64(7);
    // More draws than stored transitions is fine with replacement
    let batch = buffer.sample(10, &mut rng).unwrap();
    assert_eq!(buffer.len(), 10);
    assert_eq!(batch.len(), 10);
    assert_eq!(batch.states.shape(), &[10, 2]);
    assert_eq!(batch.next_states.shape(), &[10, 2]);

    for row in 0..batch.len() {
        let i = batch.states[[row, 0]] as usize;
        assert_eq!(batch.actions[row], i % 3);
        assert_eq!(batch.rewards[row], i as f32);
        assert_eq!(batch.next_states[[row, 0]], i as f32 + 1.0);
        assert_eq!(batch.dones[row], i % 2 == 0);
    }
}

#[test]
fn test_replay_buffer_is_empty() {
    let mut buffer = ReplayBuffer::new(10);
    assert!(buffer.is_empty());
    buffer.append(transition(0));
    assert!(!buffer.is_empty());
    buffer.clear();
    assert!(buffer.is_empty());
    let mut rng = StdRng::seed_from_u64(0);
    assert!(buffer.sample(1, &mut rng).is_err());
}

#[test]
fn test_image_states_stack_on_batch_axis() {
    let mut buffer = ReplayBuffer::new(4);
    for i in 0..4 {
        buffer.append(Transition {
            state: ArrayD::from_elem(vec![3, 2, 1], i as f32),
            action: 0,
            reward: 0.0,
            next_state: ArrayD::zeros(vec![3, 2, 1]),
            done: false,
        });
    }
    let mut rng = StdRng::seed_from_u64(3);
    let batch = buffer.sample(5, &mut rng);
    assert!(batch.is_err());
    let batch = buffer.sample(4, &mut rng).unwrap();
    assert_eq!(batch.states.shape(), &[4, 3, 2, 1]);
}
