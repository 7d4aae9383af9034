//! Bandit emitters: every bin is an arm.
//!
//! Arm selection is softmax over estimated reward with temperature `tau`,
//! mixed with an epsilon probability of uniform exploration. Both schedules
//! decay after each generation, converging toward pure exploitation.

use std::collections::HashMap;
use std::time::Instant;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::StructureDomain;
use crate::schema::{EmitterConfig, EmitterKind};
use crate::search::emitter::{Emitter, EmitterContext};

/// Lower bound for the softmax temperature.
const TAU_FLOOR: f64 = 1e-3;

/// Initial value assumed for an arm that has never been pulled.
const OPTIMISM: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct ArmStats {
    mean: f64,
    count: u32,
}

/// Shared bandit mechanics: arm statistics plus the two decay schedules.
#[derive(Debug)]
struct BanditCore {
    tau: f64,
    tau_decay: f64,
    epsilon: f64,
    sampling_decay: f64,
    arms: HashMap<(usize, usize), ArmStats>,
    shape: Option<(usize, usize)>,
}

impl BanditCore {
    fn new(config: &EmitterConfig) -> Self {
        Self {
            tau: config.tau,
            tau_decay: config.tau_decay,
            epsilon: config.epsilon,
            sampling_decay: config.sampling_decay,
            arms: HashMap::new(),
            shape: None,
        }
    }

    /// Arm statistics are keyed by grid coordinate; a grid reshape
    /// invalidates them. Statistics gathered before the first step (human
    /// selections) are kept.
    fn ensure_shape(&mut self, shape: (usize, usize)) {
        match self.shape {
            None => self.shape = Some(shape),
            Some(known) if known != shape => {
                self.shape = Some(shape);
                self.arms.clear();
            }
            _ => {}
        }
    }

    fn value(&self, coords: (usize, usize)) -> f64 {
        self.arms.get(&coords).map(|s| s.mean).unwrap_or(OPTIMISM)
    }

    fn select(&self, valid: &[(usize, usize)], rng: &mut StdRng) -> Option<(usize, usize)> {
        if valid.is_empty() {
            return None;
        }
        if rng.r#gen::<f64>() < self.epsilon {
            return Some(valid[rng.gen_range(0..valid.len())]);
        }
        let values: Vec<f64> = valid.iter().map(|&c| self.value(c)).collect();
        let top = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = values.iter().map(|v| ((v - top) / self.tau).exp()).collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => Some(valid[dist.sample(rng)]),
            Err(_) => Some(valid[rng.gen_range(0..valid.len())]),
        }
    }

    fn update(&mut self, coords: (usize, usize), reward: f64) {
        let stats = self.arms.entry(coords).or_insert(ArmStats {
            mean: 0.0,
            count: 0,
        });
        stats.mean = (stats.mean * f64::from(stats.count) + reward) / f64::from(stats.count + 1);
        stats.count += 1;
    }

    fn decay(&mut self) {
        self.tau = (self.tau * self.tau_decay).max(TAU_FLOOR);
        self.epsilon *= self.sampling_decay;
    }
}

/// Contextual bandit: reward is the fitness delta of the produced offspring
/// relative to the parent elite.
#[derive(Debug)]
pub struct ContextualBanditEmitter {
    core: BanditCore,
}

impl ContextualBanditEmitter {
    pub fn new(config: &EmitterConfig) -> Self {
        Self {
            core: BanditCore::new(config),
        }
    }
}

impl<D: StructureDomain> Emitter<D> for ContextualBanditEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::ContextualBandit
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();
        self.core.ensure_shape(ctx.archive.shape());
        let valid = ctx.archive.valid_bins();
        if let Some(coords) = self.core.select(&valid, ctx.rng) {
            if let Some(report) = ctx.expand(coords) {
                self.core.update(coords, report.reward());
            }
        }
        start.elapsed().as_secs_f64()
    }

    fn on_generation_end(&mut self) {
        self.core.decay();
    }
}

/// Preference bandit: same mechanics, but the reward signal is accumulated
/// human preference instead of fitness.
#[derive(Debug)]
pub struct PreferenceBanditEmitter {
    core: BanditCore,
}

impl PreferenceBanditEmitter {
    pub fn new(config: &EmitterConfig) -> Self {
        Self {
            core: BanditCore::new(config),
        }
    }
}

impl<D: StructureDomain> Emitter<D> for PreferenceBanditEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::PreferenceBandit
    }

    fn on_selection(&mut self, selected: &[(usize, usize)]) {
        for &coords in selected {
            self.core.update(coords, 1.0);
        }
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();
        self.core.ensure_shape(ctx.archive.shape());
        let valid = ctx.archive.valid_bins();
        if let Some(coords) = self.core.select(&valid, ctx.rng) {
            ctx.expand(coords);
        }
        start.elapsed().as_secs_f64()
    }

    fn on_generation_end(&mut self) {
        self.core.decay();
    }
}
