//! Online surrogate fitness model.
//!
//! Wraps a small regression model retrained from the full observation
//! buffer after each generation. Predictions are clipped to
//! `[0, max_label]`; in upper-bound mode a confidence margin derived from
//! the posterior predictive variance is added before clipping.

use crate::schema::{EstimateMode, EstimatorConfig, KernelKind};
use crate::search::buffer::Buffer;

/// Floor for the residual-variance estimate, so the confidence margin
/// never collapses to exactly zero on interpolated training points.
const NOISE_FLOOR: f64 = 1e-6;

/// Surrogate estimator over feature vectors.
#[derive(Debug, Clone)]
pub struct Estimator {
    config: EstimatorConfig,
    model: Option<Model>,
}

#[derive(Debug, Clone)]
enum Model {
    Linear(LinearModel),
    Rbf(RbfModel),
}

/// Bayesian ridge regression: weights plus the inverse design matrix for
/// predictive variance.
#[derive(Debug, Clone)]
struct LinearModel {
    weights: Vec<f64>,
    inv_design: Vec<Vec<f64>>,
    noise: f64,
}

/// RBF kernel ridge regression with the GP-style predictive variance.
#[derive(Debug, Clone)]
struct RbfModel {
    inputs: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    inv_gram: Vec<Vec<f64>>,
    gamma: f64,
    noise: f64,
}

impl Estimator {
    /// Create an untrained estimator.
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// The configured regression kernel.
    pub fn kernel(&self) -> KernelKind {
        self.config.kernel
    }

    /// Switch the regression kernel. The current fit is discarded; the
    /// model is rebuilt on the next [`fit`].
    ///
    /// [`fit`]: Estimator::fit
    pub fn set_kernel(&mut self, kernel: KernelKind) {
        if self.config.kernel != kernel {
            self.config.kernel = kernel;
            self.model = None;
        }
    }

    /// The configured estimate mode.
    pub fn mode(&self) -> EstimateMode {
        self.config.mode
    }

    /// Whether a model has been fit.
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Retrain from the full buffer contents. An empty buffer clears the
    /// model.
    pub fn fit(&mut self, buffer: &Buffer) {
        let (inputs, targets) = buffer.training_set();
        if inputs.is_empty() {
            self.model = None;
            return;
        }
        self.model = match self.config.kernel {
            KernelKind::Linear => {
                fit_linear(&inputs, &targets, self.config.ridge).map(Model::Linear)
            }
            KernelKind::Rbf => {
                fit_rbf(&inputs, &targets, self.config.ridge, self.config.rbf_gamma)
                    .map(Model::Rbf)
            }
        };
    }

    /// Bound-clipped estimate for a feature vector.
    ///
    /// Untrained estimators are optimistic: they report `max_label` in
    /// upper-bound mode (everything unexplored looks promising) and zero in
    /// mean mode.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let Some(model) = &self.model else {
            return match self.config.mode {
                EstimateMode::Mean => 0.0,
                EstimateMode::UpperBound => self.config.max_label,
            };
        };

        let (mean, variance) = match model {
            Model::Linear(m) => m.predict(features),
            Model::Rbf(m) => m.predict(features),
        };

        let estimate = match self.config.mode {
            EstimateMode::Mean => mean,
            EstimateMode::UpperBound => mean + self.config.ucb_beta * variance.max(0.0).sqrt(),
        };
        estimate.clamp(0.0, self.config.max_label)
    }
}

impl LinearModel {
    fn predict(&self, features: &[f64]) -> (f64, f64) {
        let phi = with_bias(features, self.weights.len());
        let mean = dot(&self.weights, &phi);
        // Predictive variance: sigma^2 * phi^T (X^T X + lambda I)^-1 phi.
        let projected = mat_vec(&self.inv_design, &phi);
        let variance = self.noise * dot(&phi, &projected);
        (mean, variance)
    }
}

impl RbfModel {
    fn predict(&self, features: &[f64]) -> (f64, f64) {
        let k: Vec<f64> = self
            .inputs
            .iter()
            .map(|x| rbf(features, x, self.gamma))
            .collect();
        let mean = dot(&self.alpha, &k);
        // GP predictive variance: k(x, x) - k^T (K + lambda I)^-1 k.
        let projected = mat_vec(&self.inv_gram, &k);
        let variance = (1.0 - dot(&k, &projected)).max(0.0) + self.noise;
        (mean, variance)
    }
}

fn fit_linear(inputs: &[Vec<f64>], targets: &[f64], ridge: f64) -> Option<LinearModel> {
    let dims = inputs[0].len() + 1;
    let phi: Vec<Vec<f64>> = inputs.iter().map(|x| with_bias(x, dims)).collect();

    // A = Phi^T Phi + lambda I, b = Phi^T y.
    let mut a = vec![vec![0.0; dims]; dims];
    let mut b = vec![0.0; dims];
    for (row, &y) in phi.iter().zip(targets) {
        for i in 0..dims {
            b[i] += row[i] * y;
            for j in 0..dims {
                a[i][j] += row[i] * row[j];
            }
        }
    }
    for (i, row) in a.iter_mut().enumerate() {
        row[i] += ridge;
    }

    let inv_design = invert(&a)?;
    let weights = mat_vec(&inv_design, &b);

    let residual: f64 = phi
        .iter()
        .zip(targets)
        .map(|(row, &y)| (y - dot(&weights, row)).powi(2))
        .sum();
    let noise = (residual / targets.len() as f64).max(NOISE_FLOOR);

    Some(LinearModel {
        weights,
        inv_design,
        noise,
    })
}

fn fit_rbf(inputs: &[Vec<f64>], targets: &[f64], ridge: f64, gamma: f64) -> Option<RbfModel> {
    let n = inputs.len();
    let mut gram = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            gram[i][j] = rbf(&inputs[i], &inputs[j], gamma);
        }
        gram[i][i] += ridge;
    }

    let inv_gram = invert(&gram)?;
    let alpha = mat_vec(&inv_gram, targets);

    let residual: f64 = (0..n)
        .map(|i| {
            let fitted: f64 = (0..n).map(|j| alpha[j] * gram[i][j]).sum::<f64>()
                - ridge * alpha[i];
            (targets[i] - fitted).powi(2)
        })
        .sum();
    let noise = (residual / n as f64).max(NOISE_FLOOR);

    Some(RbfModel {
        inputs: inputs.to_vec(),
        alpha,
        inv_gram,
        gamma,
        noise,
    })
}

/// Feature vector with a trailing bias term, padded or truncated to `dims`.
fn with_bias(features: &[f64], dims: usize) -> Vec<f64> {
    let mut phi = vec![0.0; dims];
    for (slot, &f) in phi.iter_mut().zip(features) {
        *slot = f;
    }
    phi[dims - 1] = 1.0;
    phi
}

fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-gamma * sq).exp()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Invert a small dense matrix by Gauss-Jordan elimination with partial
/// pivoting. Returns `None` for a singular matrix (cannot happen with a
/// positive ridge term, kept as a guard).
fn invert(m: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = m.len();
    let mut aug: Vec<Vec<f64>> = m
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| {
                aug[a][col]
                    .abs()
                    .partial_cmp(&aug[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if aug[pivot][col].abs() < 1e-12 {
            return None;
        }
        aug.swap(col, pivot);

        let scale = aug[col][col];
        for x in aug[col].iter_mut() {
            *x /= scale;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[row][col];
                if factor != 0.0 {
                    for k in 0..2 * n {
                        let v = aug[col][k];
                        aug[row][k] -= factor * v;
                    }
                }
            }
        }
    }

    Some(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}
