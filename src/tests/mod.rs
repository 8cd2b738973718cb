// Test modules for all components
pub mod stubs;
pub mod test_replay_buffer;
