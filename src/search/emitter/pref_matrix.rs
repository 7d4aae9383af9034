//! Preference-matrix emitter: samples bins by accumulated human choices.

use std::time::Instant;

use rand::distributions::{Distribution, WeightedIndex};

use crate::domain::StructureDomain;
use crate::schema::EmitterKind;
use crate::search::emitter::{Emitter, EmitterContext};

/// Prior weight so never-selected bins stay reachable.
const BASE_WEIGHT: f64 = 1.0;

/// Maintains an explicit preference weight per bin, built from the
/// cumulative history of human selections, and samples bins proportionally
/// to it. The matrix rebuilds itself whenever the grid shape changes.
#[derive(Debug, Default)]
pub struct PreferenceMatrixEmitter {
    weights: Vec<f64>,
    shape: (usize, usize),
    // Selections observed before the matrix saw the current grid.
    pending: Vec<(usize, usize)>,
}

impl PreferenceMatrixEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_shape(&mut self, shape: (usize, usize)) {
        if self.shape != shape {
            self.shape = shape;
            self.weights = vec![0.0; shape.0 * shape.1];
        }
        for (i, j) in self.pending.drain(..) {
            if i < shape.0 && j < shape.1 {
                self.weights[i * shape.1 + j] += 1.0;
            }
        }
    }
}

impl<D: StructureDomain> Emitter<D> for PreferenceMatrixEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::PreferenceMatrix
    }

    fn on_selection(&mut self, selected: &[(usize, usize)]) {
        // Applied lazily at the next step, once the grid shape is known.
        self.pending.extend_from_slice(selected);
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();
        self.ensure_shape(ctx.archive.shape());

        let valid = ctx.archive.valid_bins();
        if valid.is_empty() {
            return start.elapsed().as_secs_f64();
        }

        let ny = self.shape.1;
        let weights: Vec<f64> = valid
            .iter()
            .map(|(i, j)| BASE_WEIGHT + self.weights[i * ny + j])
            .collect();
        // Weights are strictly positive, so the distribution always builds.
        if let Ok(dist) = WeightedIndex::new(&weights) {
            let coords = valid[dist.sample(ctx.rng)];
            ctx.expand(coords);
        }
        start.elapsed().as_secs_f64()
    }
}
