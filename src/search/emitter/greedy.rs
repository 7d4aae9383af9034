//! Pure exploitation: always expand the best bin.

use std::time::Instant;

use crate::domain::StructureDomain;
use crate::schema::EmitterKind;
use crate::search::emitter::{bin_elite_fitness, Emitter, EmitterContext};

/// Expands the bin whose elite has the highest current fitness.
#[derive(Debug, Default)]
pub struct GreedyEmitter;

impl GreedyEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl<D: StructureDomain> Emitter<D> for GreedyEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Greedy
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();
        let best = ctx
            .archive
            .valid_bins()
            .into_iter()
            .filter_map(|coords| bin_elite_fitness(ctx.archive, coords).map(|f| (coords, f)))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((coords, _)) = best {
            ctx.expand(coords);
        }
        start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EstimatorConfig, MergePolicy};
    use crate::search::buffer::Buffer;
    use crate::search::candidate::Population;
    use crate::search::estimator::Estimator;
    use crate::testutil::{candidate_at, tower_archive};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_greedy_expands_the_highest_fitness_bin() {
        let mut archive = tower_archive((4, 4));
        archive.insert(candidate_at((0.1, 0.1), 0.2, true));
        archive.insert(candidate_at((0.9, 0.9), 0.9, true));
        let low_before = archive.bin((0, 0)).unwrap().len(Population::Feasible);

        let mut buffer = Buffer::new(MergePolicy::Mean);
        let estimator = Estimator::new(EstimatorConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        let mut emitter = GreedyEmitter::new();
        let mut ctx = EmitterContext {
            archive: &mut archive,
            buffer: &mut buffer,
            estimator: &estimator,
            selection: &[],
            generation: 0,
            rng: &mut rng,
        };
        Emitter::step(&mut emitter, &mut ctx);

        // The best bin's elite was the mutation parent; the low-fitness bin
        // gained nothing directly from parenting.
        assert!(!ctx.buffer.is_empty());
        let low_after = ctx.archive.bin((0, 0)).unwrap().len(Population::Feasible);
        assert_eq!(low_before, low_after);
    }
}
