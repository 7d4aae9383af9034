//! Surrogate-driven emitter: rank bins with the regression model.

use std::time::Instant;

use crate::domain::StructureDomain;
use crate::schema::{EmitterKind, KernelKind};
use crate::search::emitter::{Emitter, EmitterContext};

/// Scores every selectable bin with the session surrogate's prediction at
/// the bin center and expands the top-ranked one. Installing this emitter
/// re-targets the surrogate to the named kernel (see the session).
#[derive(Debug)]
pub struct KernelEmitter {
    kernel: KernelKind,
}

impl KernelEmitter {
    pub fn new(kernel: KernelKind) -> Self {
        Self { kernel }
    }

    /// The kernel this emitter ranks with.
    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }
}

impl<D: StructureDomain> Emitter<D> for KernelEmitter {
    fn kind(&self) -> EmitterKind {
        match self.kernel {
            KernelKind::Linear => EmitterKind::LinearKernel,
            KernelKind::Rbf => EmitterKind::RbfKernel,
        }
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();
        let best = ctx
            .archive
            .valid_bins()
            .into_iter()
            .map(|coords| {
                let center = ctx.archive.normalized_center(coords);
                (coords, ctx.estimator.predict(&center))
            })
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
    use crate::schema::{EstimateMode, EstimatorConfig, MergePolicy};
    use crate::search::buffer::Buffer;
    use crate::search::candidate::Population;
    use crate::search::estimator::Estimator;
    use crate::testutil::{candidate_at, tower_archive};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_kernel_emitter_expands_the_predicted_best_bin() {
        let mut archive = tower_archive((4, 4));
        archive.insert(candidate_at((0.15, 0.15), 0.5, true));
        archive.insert(candidate_at((0.85, 0.85), 0.5, true));

        // Teach the surrogate that the high corner is where reward lives.
        let mut buffer = Buffer::new(MergePolicy::Mean);
        for d in [0.0, 0.05, 0.1] {
            buffer.insert(&[0.85 + d * 0.1, 0.85], 0.9);
            buffer.insert(&[0.15 + d * 0.1, 0.15], 0.1);
        }
        let mut estimator = Estimator::new(EstimatorConfig {
            kernel: KernelKind::Rbf,
            mode: EstimateMode::Mean,
            ..EstimatorConfig::default()
        });
        estimator.fit(&buffer);

        let low_before = archive.bin((0, 0)).unwrap().len(Population::Feasible);
        let mut rng = StdRng::seed_from_u64(29);
        let mut emitter = KernelEmitter::new(KernelKind::Rbf);
        let mut ctx = EmitterContext {
            archive: &mut archive,
            buffer: &mut buffer,
            estimator: &estimator,
            selection: &[],
            generation: 0,
            rng: &mut rng,
        };
        Emitter::step(&mut emitter, &mut ctx);

        // The low corner was not used as a parent; its membership is
        // untouched by the step.
        let low_after = ctx.archive.bin((0, 0)).unwrap().len(Population::Feasible);
        assert_eq!(low_before, low_after);
        assert!(ctx.buffer.len() > 6);
    }

    #[test]
    fn test_kind_tracks_the_kernel() {
        let linear = KernelEmitter::new(KernelKind::Linear);
        let rbf = KernelEmitter::new(KernelKind::Rbf);
        assert_eq!(
            Emitter::<crate::testutil::TowerDomain>::kind(&linear),
            EmitterKind::LinearKernel
        );
        assert_eq!(
            Emitter::<crate::testutil::TowerDomain>::kind(&rbf),
            EmitterKind::RbfKernel
        );
    }
}
