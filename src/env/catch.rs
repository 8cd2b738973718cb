use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Environment, Step};
use crate::error::{DqnError, Result};

const PADDLE_WIDTH: usize = 3;

/// A one-channel pixel game: balls fall from the top row and the paddle on
/// the bottom row has to catch them.
///
/// Actions are `0` stay, `1` left and `2` right. Every caught ball scores
/// `1.0` and a new one drops from a random column; the episode ends on the
/// first miss with a reward of `-1.0`. Observations are `[height, width, 1]`.
pub struct CatchEnv {
    height: usize,
    width: usize,
    ball: (usize, usize),
    paddle: usize,
    caught: usize,
    rng: StdRng,
}

impl CatchEnv {
    pub fn new(height: usize, width: usize, seed: u64) -> Result<Self> {
        if height < 2 || width < PADDLE_WIDTH {
            return Err(DqnError::invalid_parameter(
                "catch".to_string(),
                format!("a {}x{} board cannot hold a ball and a paddle", height, width),
            ));
        }
        let mut env = CatchEnv {
            height,
            width,
            ball: (0, 0),
            paddle: 0,
            caught: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        env.start();
        Ok(env)
    }

    fn start(&mut self) {
        self.paddle = (self.width - PADDLE_WIDTH) / 2;
        self.caught = 0;
        self.drop_ball();
    }

    fn drop_ball(&mut self) {
        self.ball = (0, self.rng.gen_range(0..self.width));
    }

    fn observe(&self) -> ArrayD<f32> {
        let mut frame = ArrayD::zeros(IxDyn(&[self.height, self.width, 1]));
        frame[[self.ball.0, self.ball.1, 0]] = 1.0;
        for col in self.paddle..self.paddle + PADDLE_WIDTH {
            frame[[self.height - 1, col, 0]] = 1.0;
        }
        frame
    }
}

impl Environment for CatchEnv {
    fn reset(&mut self) -> Result<ArrayD<f32>> {
        self.start();
        Ok(self.observe())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        match action {
            0 => {}
            1 => self.paddle = self.paddle.saturating_sub(1),
            2 => self.paddle = (self.paddle + 1).min(self.width - PADDLE_WIDTH),
            _ => return Err(DqnError::InvalidAction { action, num_actions: 3 }),
        }
        if self.ball.0 >= self.height - 1 {
            return Err(DqnError::invalid_parameter("catch", "the episode is over, call reset() first"));
        }
        self.ball.0 += 1;

        let landed = self.ball.0 == self.height - 1;
        let on_paddle = (self.paddle..self.paddle + PADDLE_WIDTH).contains(&self.ball.1);
        let (reward, done) = match (landed, on_paddle) {
            (false, _) => (0.0, false),
            (true, true) => (1.0, false),
            (true, false) => (-1.0, true),
        };

        let mut step = Step::new(self.observe(), reward, done);
        if landed && on_paddle {
            self.caught += 1;
            self.drop_ball();
        }
        step.info.insert("caught".to_string(), self.caught as f32);
        Ok(step)
    }

    fn observation_shape(&self) -> Vec<usize> {
        vec![self.height, self.width, 1]
    }

    fn num_actions(&self) -> usize {
        3
    }
}
