#[cfg(test)]
mod property_tests {
    use breakout_dqn::estimator::argmax;
    use breakout_dqn::policy::EpsilonSchedule;
    use breakout_dqn::replay_buffer::{ReplayBuffer, Transition};
    use ndarray::arr1;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn transition(id: usize) -> Transition {
        Transition {
            state: arr1(&[id as f32]).into_dyn(),
            action: id % 4,
            reward: id as f32 * 0.5,
            next_state: arr1(&[id as f32 + 0.25]).into_dyn(),
            done: id % 3 == 0,
        }
    }

    proptest! {
        #[test]
        fn test_buffer_keeps_most_recent(capacity in 1usize..50, appended in 0usize..200) {
            let mut buffer = ReplayBuffer::new(capacity);
            for id in 0..appended {
                buffer.append(transition(id));
            }

            prop_assert_eq!(buffer.len(), appended.min(capacity));
            let kept: Vec<usize> = buffer.iter().map(|t| t.state[[0]] as usize).collect();
            let expected: Vec<usize> = (appended.saturating_sub(capacity)..appended).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn test_sample_draws_existing_transitions(
            appended in 1usize..60,
            batch_size in 1usize..40,
            seed in any::<u64>(),
        ) {
            let mut buffer = ReplayBuffer::new(30);
            for id in 0..appended {
                buffer.append(transition(id));
            }
            let mut rng = StdRng::seed_from_u64(seed);
            let result = buffer.sample(batch_size, &mut rng);
            if batch_size > buffer.len() {
                prop_assert!(result.is_err());
                return Ok(());
            }

            let batch = result.unwrap();
            prop_assert_eq!(batch.states.shape(), &[batch_size, 1]);
            prop_assert_eq!(batch.actions.len(), batch_size);
            prop_assert_eq!(batch.rewards.len(), batch_size);
            prop_assert_eq!(batch.next_states.shape(), &[batch_size, 1]);
            prop_assert_eq!(batch.dones.len(), batch_size);

            let oldest = appended.saturating_sub(30);
            for row in 0..batch_size {
                let id = batch.states[[row, 0]] as usize;
                prop_assert!(id >= oldest && id < appended);
                let stored = transition(id);
                prop_assert_eq!(batch.actions[row], stored.action);
                prop_assert_eq!(batch.rewards[row], stored.reward);
                prop_assert_eq!(batch.next_states[[row, 0]], stored.next_state[[0]]);
                prop_assert_eq!(batch.dones[row], stored.done);
            }
        }

        #[test]
        fn test_epsilon_within_bounds(episode in 0usize..100_000) {
            let schedule = EpsilonSchedule::default();
            let epsilon = schedule.epsilon(episode);
            prop_assert!(epsilon >= 0.01 && epsilon <= 1.0);
            prop_assert!(schedule.epsilon(episode + 1) <= epsilon);
        }

        #[test]
        fn test_argmax_is_a_first_maximum(values in prop::collection::vec(-100.0f32..100.0, 1..20)) {
            let index = argmax(&values).unwrap();
            prop_assert!(values.iter().all(|&v| v <= values[index]));
            prop_assert!(values[..index].iter().all(|&v| v < values[index]));
        }
    }
}
