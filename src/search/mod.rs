//! Search module - the quality-diversity algorithmic core.
//!
//! - `candidate`: evolvable artifacts and the elite ordering
//! - `bin`: grid cells with bounded feasible/infeasible populations
//! - `archive`: the MAP-Elites grid and its bulk operations
//! - `buffer`: merged observations feeding the surrogate
//! - `estimator`: the online regression surrogate
//! - `emitter`: pluggable exploration strategies

pub mod archive;
pub mod bin;
pub mod buffer;
pub mod candidate;
pub mod emitter;
pub mod estimator;
