//! Uninformed baseline: expand a uniformly random non-empty bin.

use std::time::Instant;

use crate::domain::StructureDomain;
use crate::schema::EmitterKind;
use crate::search::emitter::{Emitter, EmitterContext};

/// Samples existing elites uniformly, ignoring fitness.
#[derive(Debug, Default)]
pub struct RandomEmitter;

impl RandomEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl<D: StructureDomain> Emitter<D> for RandomEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Random
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();
        if let Some(coords) = ctx.random_valid_bin() {
            ctx.expand(coords);
        }
        start.elapsed().as_secs_f64()
    }
}
