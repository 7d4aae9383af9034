//! Pure human steering: no automatic bin choice at all.

use std::time::Instant;

use crate::domain::StructureDomain;
use crate::schema::EmitterKind;
use crate::search::emitter::{Emitter, EmitterContext};

/// Strictly consumes the externally supplied selection; a no-op when none
/// is given.
#[derive(Debug, Default)]
pub struct HumanEmitter;

impl HumanEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl<D: StructureDomain> Emitter<D> for HumanEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Human
    }

    fn step(&mut self, ctx: &mut EmitterContext<'_, D>) -> f64 {
        let start = Instant::now();
        let selected: Vec<(usize, usize)> = ctx.selection.to_vec();
        for coords in selected {
            ctx.expand(coords);
        }
        start.elapsed().as_secs_f64()
    }
}
