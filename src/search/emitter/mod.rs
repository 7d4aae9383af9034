//! Pluggable emitters: strategies deciding where the archive samples next.
//!
//! Every emitter implements the same contract: one [`step`] expands some
//! part of the archive by producing, evaluating, and inserting offspring
//! through the shared [`EmitterContext`], and returns the wall-clock seconds
//! it spent. Emitters are swappable at runtime without invalidating archive
//! content; internal state (bandit statistics, preference weights) is
//! emitter-local and dies with the emitter on switch.
//!
//! [`step`]: Emitter::step

mod bandit;
mod greedy;
mod human;
mod kernel;
mod knn;
mod pref_matrix;
mod random;

pub use bandit::{ContextualBanditEmitter, PreferenceBanditEmitter};
pub use greedy::GreedyEmitter;
pub use human::HumanEmitter;
pub use kernel::KernelEmitter;
pub use knn::KNearestEmitter;
pub use pref_matrix::PreferenceMatrixEmitter;
pub use random::RandomEmitter;

use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::StructureDomain;
use crate::schema::{EmitterConfig, EmitterKind, KernelKind};
use crate::search::archive::MapElites;
use crate::search::buffer::Buffer;
use crate::search::candidate::Population;
use crate::search::estimator::Estimator;

/// Shared state handed to an emitter for one step.
pub struct EmitterContext<'a, D: StructureDomain> {
    pub archive: &'a mut MapElites<D>,
    pub buffer: &'a mut Buffer,
    pub estimator: &'a Estimator,
    /// The human bin selection for this generation, if any.
    pub selection: &'a [(usize, usize)],
    pub generation: usize,
    pub rng: &'a mut StdRng,
}

/// What one bin expansion produced.
#[derive(Debug, Clone, Copy)]
pub struct ExpandReport {
    /// Weighted fitness of the parent elite.
    pub parent_fitness: f64,
    /// Best weighted fitness among the evaluated offspring (parent fitness
    /// when every offspring was discarded).
    pub best_offspring: f64,
    /// Offspring accepted into the archive.
    pub inserted: usize,
}

impl ExpandReport {
    /// Fitness delta of the best offspring relative to its parent.
    pub fn reward(&self) -> f64 {
        self.best_offspring - self.parent_fitness
    }
}

impl<D: StructureDomain> EmitterContext<'_, D> {
    /// Expand one bin: mutate its elite into offspring, evaluate them,
    /// insert the survivors, and record their observations in the buffer.
    ///
    /// The feasible elite is the preferred parent; a bin holding only
    /// infeasible candidates breeds from its infeasible elite instead, so
    /// constraint-violating lineages keep moving toward repair.
    ///
    /// Returns `None` when the bin is missing or empty.
    pub fn expand(&mut self, coords: (usize, usize)) -> Option<ExpandReport> {
        let objectives = self.archive.objectives().to_vec();
        let (parent_genotype, parent_fitness) = {
            let bin = self.archive.bin(coords)?;
            let parent = bin
                .elite(Population::Feasible, &objectives)
                .or_else(|| bin.elite(Population::Infeasible, &objectives))?;
            (
                parent.genotype().to_string(),
                parent.weighted_fitness(&objectives),
            )
        };

        let count = self.archive.config().emitter.offspring_per_bin;
        let domain = std::sync::Arc::clone(self.archive.domain());
        let genotypes: Vec<(String, u64)> = (0..count)
            .map(|_| {
                (
                    domain.mutate(&parent_genotype, self.rng),
                    self.rng.r#gen(),
                )
            })
            .collect();

        let mut best_offspring = parent_fitness;
        let mut inserted = 0;
        for candidate in self.archive.evaluate(&genotypes) {
            best_offspring = best_offspring.max(candidate.weighted_fitness(&objectives));
            let features = self.archive.normalized_behavior(&candidate);
            self.buffer
                .insert(&features, candidate.weighted_fitness(&objectives));
            if self.archive.insert(candidate) {
                inserted += 1;
            }
        }

        Some(ExpandReport {
            parent_fitness,
            best_offspring,
            inserted,
        })
    }

    /// A uniformly random selectable bin.
    pub fn random_valid_bin(&mut self) -> Option<(usize, usize)> {
        let valid = self.archive.valid_bins();
        if valid.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..valid.len());
        Some(valid[idx])
    }
}

/// One exploration strategy over the archive.
pub trait Emitter<D: StructureDomain>: Send {
    /// Which registry entry this emitter is.
    fn kind(&self) -> EmitterKind;

    /// Display name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Run one automatic step, side-effecting the archive through the
    /// context. Returns elapsed wall-clock seconds.
    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64;

    /// Observe the human selection for this generation.
    fn on_selection(&mut self, _selected: &[(usize, usize)]) {}

    /// Generation finished: advance decay schedules.
    fn on_generation_end(&mut self) {}
}

/// Instantiate an emitter from the closed registry.
pub fn build_emitter<D: StructureDomain>(
    kind: EmitterKind,
    config: &EmitterConfig,
) -> Box<dyn Emitter<D>> {
    match kind {
        EmitterKind::Random => Box::new(RandomEmitter::new()),
        EmitterKind::Human => Box::new(HumanEmitter::new()),
        EmitterKind::Greedy => Box::new(GreedyEmitter::new()),
        EmitterKind::PreferenceMatrix => Box::new(PreferenceMatrixEmitter::new()),
        EmitterKind::ContextualBandit => Box::new(ContextualBanditEmitter::new(config)),
        EmitterKind::PreferenceBandit => Box::new(PreferenceBanditEmitter::new(config)),
        EmitterKind::KNearest => Box::new(KNearestEmitter::new(config.neighbors)),
        EmitterKind::LinearKernel => Box::new(KernelEmitter::new(KernelKind::Linear)),
        EmitterKind::RbfKernel => Box::new(KernelEmitter::new(KernelKind::Rbf)),
    }
}

/// Weighted fitness of a bin's best elite (feasible preferred), for ranking.
pub(crate) fn bin_elite_fitness<D: StructureDomain>(
    archive: &MapElites<D>,
    coords: (usize, usize),
) -> Option<f64> {
    let bin = archive.bin(coords)?;
    let objectives = archive.objectives();
    bin.elite(Population::Feasible, objectives)
        .or_else(|| bin.elite(Population::Infeasible, objectives))
        .map(|e| e.weighted_fitness(objectives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EngineConfig, EstimatorConfig, MergePolicy};
    use crate::testutil::{candidate_at, tower_archive};
    use rand::SeedableRng;

    #[test]
    fn test_expand_inserts_offspring_and_observations() {
        let mut archive = tower_archive((4, 4));
        archive.insert(candidate_at((0.5, 0.5), 0.8, true));

        let mut buffer = Buffer::new(MergePolicy::Mean);
        let estimator = Estimator::new(EstimatorConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = EmitterContext {
            archive: &mut archive,
            buffer: &mut buffer,
            estimator: &estimator,
            selection: &[],
            generation: 0,
            rng: &mut rng,
        };

        let report = ctx.expand((2, 2)).unwrap();
        assert!(report.best_offspring >= 0.0);
        assert!(!ctx.buffer.is_empty());
        // Empty bin: nothing to expand.
        assert!(ctx.expand((0, 0)).is_none());
    }

    #[test]
    fn test_registry_builds_every_kind() {
        let config = EngineConfig::default().emitter;
        for kind in EmitterKind::ALL {
            let emitter = build_emitter::<crate::testutil::TowerDomain>(kind, &config);
            assert_eq!(emitter.kind(), kind);
        }
    }
}
