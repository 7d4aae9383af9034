//! Nearest-neighbor emitter over buffered observations.

use std::time::Instant;

use crate::domain::StructureDomain;
use crate::schema::EmitterKind;
use crate::search::buffer::Buffer;
use crate::search::emitter::{Emitter, EmitterContext};

/// Ranks candidate bins by similarity, in descriptor space, to previously
/// high-reward observations: each bin's k nearest observations vote on
/// whether the neighborhood is promising, and the bin with the strongest
/// majority wins. Falls back to a uniform choice while the buffer is empty.
#[derive(Debug)]
pub struct KNearestEmitter {
    neighbors: usize,
}

impl KNearestEmitter {
    pub fn new(neighbors: usize) -> Self {
        Self { neighbors }
    }

    /// Fraction of a bin's k nearest observations whose label reaches the
    /// buffer-wide median, with the mean neighbor distance as tie-breaker.
    fn score(&self, buffer: &Buffer, center: &[f64], threshold: f64) -> (f64, f64) {
        let mut neighbors: Vec<(f64, f64)> = buffer
            .entries()
            .map(|entry| (distance(&entry.features, center), entry.value))
            .collect();
        neighbors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(self.neighbors);

        let k = neighbors.len();
        if k == 0 {
            return (0.0, f64::INFINITY);
        }
        let votes = neighbors.iter().filter(|(_, v)| *v >= threshold).count();
        let mean_distance = neighbors.iter().map(|(d, _)| d).sum::<f64>() / k as f64;
        (votes as f64 / k as f64, mean_distance)
    }
}

impl<D: StructureDomain> Emitter<D> for KNearestEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::KNearest
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();

        if ctx.buffer.is_empty() {
            if let Some(coords) = ctx.random_valid_bin() {
                ctx.expand(coords);
            }
            return start.elapsed().as_secs_f64();
        }

        let threshold = median(ctx.buffer.entries().map(|e| e.value));
        let best = ctx
            .archive
            .valid_bins()
            .into_iter()
            .map(|coords| {
                let center = ctx.archive.normalized_center(coords);
                let (votes, mean_distance) = self.score(ctx.buffer, &center, threshold);
                (coords, votes, mean_distance)
            })
            // Majority vote first, closer neighborhood on ties.
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal)
                    })
            });
        if let Some((coords, _, _)) = best {
            ctx.expand(coords);
        }
        start.elapsed().as_secs_f64()
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() {
        0.0
    } else {
        sorted[sorted.len() / 2]
    }
}
