use ndarray::{ArrayD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

/// Gradient-descent update rule applied to the online network's parameters.
pub trait Optimizer {
    /// Update one parameter tensor in place.
    ///
    /// `index` identifies the tensor across calls so stateful rules can keep
    /// per-tensor moments.
    fn update(&mut self, index: usize, param: &mut ArrayViewMutD<f32>, gradient: &ArrayD<f32>, learning_rate: f32);

    /// Marks the end of one optimisation step over all tensors
    fn step(&mut self) {}
}

/// Serialisable choice of update rule, stored in the training configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum OptimizerConfig {
    Sgd,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> OptimizerWrapper {
        match *self {
            OptimizerConfig::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerConfig::Adam { beta1, beta2, epsilon } => {
                OptimizerWrapper::Adam(Adam::new(beta1, beta2, epsilon))
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl Optimizer for OptimizerWrapper {
    fn update(&mut self, index: usize, param: &mut ArrayViewMutD<f32>, gradient: &ArrayD<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update(index, param, gradient, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update(index, param, gradient, learning_rate),
        }
    }

    fn step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.step(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _index: usize, param: &mut ArrayViewMutD<f32>, gradient: &ArrayD<f32>, learning_rate: f32) {
        param.zip_mut_with(gradient, |w, &g| *w -= learning_rate * g);
    }
}

/// Adam with bias-corrected first and second moments kept per parameter tensor.
#[derive(Serialize, Deserialize, Clone)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m: Vec<Option<ArrayD<f32>>>,
    v: Vec<Option<ArrayD<f32>>>,
    pub t: usize,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 1,
        }
    }

    fn moments(&mut self, index: usize, gradient: &ArrayD<f32>) -> (&mut ArrayD<f32>, &mut ArrayD<f32>) {
        if self.m.len() <= index {
            self.m.resize(index + 1, None);
            self.v.resize(index + 1, None);
        }
        let m = self.m[index].get_or_insert_with(|| ArrayD::zeros(gradient.raw_dim()));
        let v = self.v[index].get_or_insert_with(|| ArrayD::zeros(gradient.raw_dim()));
        (m, v)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-7)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, index: usize, param: &mut ArrayViewMutD<f32>, gradient: &ArrayD<f32>, learning_rate: f32) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let correction1 = 1.0 - beta1.powi(self.t as i32);
        let correction2 = 1.0 - beta2.powi(self.t as i32);

        let (m, v) = self.moments(index, gradient);
        Zip::from(param)
            .and(m)
            .and(v)
            .and(gradient)
            .for_each(|w, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }

    fn step(&mut self) {
        self.t += 1;
    }
}
