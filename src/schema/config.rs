//! Configuration types for the quality-diversity engine.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Archive grid layout.
    pub grid: GridConfig,
    /// Population management parameters.
    pub population: PopulationConfig,
    /// Emitter tuning parameters.
    pub emitter: EmitterConfig,
    /// Surrogate estimator parameters.
    pub estimator: EstimatorConfig,
    /// Merge policy for colliding observation keys.
    #[serde(default)]
    pub buffer_merge: MergePolicy,
    /// Restrict interactive selection to a single, non-empty bin.
    #[serde(default = "default_true")]
    pub enforce_quantity: bool,
    /// Increment every candidate's age at the end of each generation.
    #[serde(default = "default_true")]
    pub aging: bool,
    /// RNG seed. `None` draws a fresh seed at construction.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            population: PopulationConfig::default(),
            emitter: EmitterConfig::default(),
            estimator: EstimatorConfig::default(),
            buffer_merge: MergePolicy::default(),
            enforce_quantity: true,
            aging: true,
            rng_seed: None,
        }
    }
}

/// Archive grid layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Initial number of bins along each descriptor axis.
    pub resolution: (usize, usize),
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { resolution: (8, 8) }
    }
}

/// Population management parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Maximum candidates per bin population (feasible and infeasible each).
    pub bin_capacity: usize,
    /// Candidates generated when the archive is reset.
    pub initial_size: usize,
    /// Offspring produced per selected bin in the human phase.
    pub offspring_per_selection: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            bin_capacity: 10,
            initial_size: 20,
            offspring_per_selection: 2,
        }
    }
}

/// Emitter tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Automatic emitter iterations per generation.
    pub iterations: usize,
    /// Offspring produced per emitter-chosen bin.
    pub offspring_per_bin: usize,
    /// Softmax temperature for bandit emitters.
    pub tau: f64,
    /// Multiplicative decay applied to `tau` after each generation.
    pub tau_decay: f64,
    /// Initial exploration probability for bandit emitters.
    pub epsilon: f64,
    /// Multiplicative decay applied to the exploration probability after
    /// each generation.
    pub sampling_decay: f64,
    /// Neighborhood size for the k-nearest emitter.
    pub neighbors: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            offspring_per_bin: 2,
            tau: 1.0,
            tau_decay: 0.95,
            epsilon: 0.2,
            sampling_decay: 0.9,
            neighbors: 5,
        }
    }
}

/// Surrogate estimator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Regression kernel.
    pub kernel: KernelKind,
    /// Point estimate or upper-confidence bound.
    pub mode: EstimateMode,
    /// Upper bound on achievable label value; predictions are clipped to
    /// `[0, max_label]`.
    pub max_label: f64,
    /// Ridge regularization strength.
    pub ridge: f64,
    /// Confidence multiplier applied to the predictive standard deviation
    /// in upper-bound mode.
    pub ucb_beta: f64,
    /// RBF kernel length scale.
    pub rbf_gamma: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kernel: KernelKind::Linear,
            mode: EstimateMode::Mean,
            max_label: 1.0,
            ridge: 1e-3,
            ucb_beta: 1.0,
            rbf_gamma: 2.0,
        }
    }
}

/// Regression kernel used by the surrogate estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    /// Ridge linear regression.
    Linear,
    /// RBF kernel ridge regression.
    Rbf,
}

/// How the estimator reports a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateMode {
    /// Posterior mean.
    Mean,
    /// Posterior mean plus a confidence margin from the predictive variance.
    UpperBound,
}

/// Policy for combining a new observation with an existing one at the same
/// feature key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Running mean over all observations.
    #[default]
    Mean,
    /// Keep the maximum observed value.
    Max,
    /// Keep the most recent observation.
    Newest,
}

/// The closed set of emitter strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmitterKind {
    /// Uniform sampling over existing elites.
    Random,
    /// Consumes the human selection only; no automatic choice.
    Human,
    /// Expands the bins with the highest elite fitness.
    Greedy,
    /// Samples bins proportionally to accumulated human preference.
    PreferenceMatrix,
    /// Contextual bandit rewarded by offspring fitness deltas.
    ContextualBandit,
    /// Contextual bandit rewarded by accumulated human preference.
    PreferenceBandit,
    /// Nearest-neighbor vote over buffered observations.
    KNearest,
    /// Ranks bins with a linear-kernel surrogate.
    LinearKernel,
    /// Ranks bins with an RBF-kernel surrogate.
    RbfKernel,
}

impl EmitterKind {
    /// All emitter kinds, in display order.
    pub const ALL: [EmitterKind; 9] = [
        EmitterKind::Random,
        EmitterKind::Human,
        EmitterKind::Greedy,
        EmitterKind::PreferenceMatrix,
        EmitterKind::ContextualBandit,
        EmitterKind::PreferenceBandit,
        EmitterKind::KNearest,
        EmitterKind::LinearKernel,
        EmitterKind::RbfKernel,
    ];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            EmitterKind::Random => "Random",
            EmitterKind::Human => "Human",
            EmitterKind::Greedy => "Greedy",
            EmitterKind::PreferenceMatrix => "Preference Matrix",
            EmitterKind::ContextualBandit => "Contextual Bandit",
            EmitterKind::PreferenceBandit => "Preference Bandit",
            EmitterKind::KNearest => "KNN",
            EmitterKind::LinearKernel => "Linear Kernel",
            EmitterKind::RbfKernel => "RBF Kernel",
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (nx, ny) = self.grid.resolution;
        if nx == 0 || ny == 0 {
            return Err(ConfigError::InvalidResolution);
        }
        if self.population.bin_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.population.initial_size == 0 {
            return Err(ConfigError::InvalidInitialSize);
        }
        if self.population.offspring_per_selection == 0 || self.emitter.offspring_per_bin == 0 {
            return Err(ConfigError::InvalidOffspringCount);
        }
        if self.emitter.tau <= 0.0 {
            return Err(ConfigError::InvalidBanditParameter("tau must be positive"));
        }
        for (name, value) in [
            ("tau_decay", self.emitter.tau_decay),
            ("sampling_decay", self.emitter.sampling_decay),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(ConfigError::InvalidDecay(name));
            }
        }
        if !(0.0..=1.0).contains(&self.emitter.epsilon) {
            return Err(ConfigError::InvalidBanditParameter(
                "epsilon must be in [0, 1]",
            ));
        }
        if self.emitter.neighbors == 0 {
            return Err(ConfigError::InvalidBanditParameter(
                "neighbors must be positive",
            ));
        }
        if self.estimator.max_label <= 0.0 {
            return Err(ConfigError::InvalidEstimatorParameter(
                "max_label must be positive",
            ));
        }
        if self.estimator.ridge <= 0.0 {
            return Err(ConfigError::InvalidEstimatorParameter(
                "ridge must be positive",
            ));
        }
        if self.estimator.rbf_gamma <= 0.0 {
            return Err(ConfigError::InvalidEstimatorParameter(
                "rbf_gamma must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid resolution must be non-zero along both axes")]
    InvalidResolution,
    #[error("Bin capacity must be non-zero")]
    InvalidCapacity,
    #[error("Initial population size must be non-zero")]
    InvalidInitialSize,
    #[error("Offspring counts must be non-zero")]
    InvalidOffspringCount,
    #[error("Invalid bandit parameter: {0}")]
    InvalidBanditParameter(&'static str),
    #[error("Decay {0} must be in (0, 1]")]
    InvalidDecay(&'static str),
    #[error("Invalid estimator parameter: {0}")]
    InvalidEstimatorParameter(&'static str),
    #[error("Domain catalog invalid: {0}")]
    InvalidCatalog(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_resolution() {
        let mut config = EngineConfig::default();
        config.grid.resolution = (0, 4);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidResolution)
        ));
    }

    #[test]
    fn test_invalid_decay() {
        let mut config = EngineConfig::default();
        config.emitter.sampling_decay = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDecay("sampling_decay"))
        ));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.grid.resolution, config.grid.resolution);
        assert_eq!(back.estimator.kernel, config.estimator.kernel);
    }
}
