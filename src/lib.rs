//! Elitemap - interactive quality-diversity search over a behavior grid.
//!
//! This crate implements an interactive MAP-Elites / FI-2Pop loop: a 2-D
//! archive of bins over two behavior descriptors, each bin holding bounded
//! feasible and infeasible populations, driven by a family of swappable
//! emitters and an online surrogate fitness model, with a human operator
//! steering exploration through bin selections.
//!
//! # Architecture
//!
//! The crate is split into four areas:
//!
//! - `schema`: configuration and persisted-snapshot types
//! - `search`: the algorithmic core (archive, bins, buffer, estimator,
//!   emitters)
//! - `domain`: the trait a generative domain implements to plug in
//! - `session`: the step orchestrator and the lock-gated surface exposed to
//!   collaborators such as a dashboard
//!
//! The generative grammar, fitness functions, feasibility test, and export
//! encoding are all external: implement [`StructureDomain`] and hand it to a
//! [`Session`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use elitemap::{EmitterKind, EngineConfig, Population, Session};
//! # use elitemap::{DescriptorSpec, DomainError, ObjectiveSpec, StructureDomain};
//! # use rand::rngs::StdRng;
//! # struct MyDomain { descriptors: Vec<DescriptorSpec>, objectives: Vec<ObjectiveSpec> }
//! # impl StructureDomain for MyDomain {
//! #     type Phenotype = Vec<u32>;
//! #     fn descriptors(&self) -> &[DescriptorSpec] { &self.descriptors }
//! #     fn objectives(&self) -> &[ObjectiveSpec] { &self.objectives }
//! #     fn generate(&self, _rng: &mut StdRng) -> String { "11".into() }
//! #     fn mutate(&self, g: &str, _rng: &mut StdRng) -> String { g.into() }
//! #     fn crossover(&self, a: &str, _b: &str, _rng: &mut StdRng) -> String { a.into() }
//! #     fn realize(&self, _g: &str, _seed: u64) -> Result<Vec<u32>, DomainError> { Ok(vec![1]) }
//! #     fn is_feasible(&self, _p: &Vec<u32>) -> bool { true }
//! #     fn score_fitness(&self, _p: &Vec<u32>) -> Result<Vec<f64>, DomainError> { Ok(vec![0.5]) }
//! #     fn score_behavior(&self, _p: &Vec<u32>, _d: usize) -> f64 { 0.5 }
//! #     fn export(&self, _p: &Vec<u32>) -> Vec<u8> { Vec::new() }
//! # }
//! # fn my_domain() -> MyDomain {
//! #     MyDomain {
//! #         descriptors: vec![
//! #             DescriptorSpec { name: "a".into(), bounds: (0.0, 1.0) },
//! #             DescriptorSpec { name: "b".into(), bounds: (0.0, 1.0) },
//! #         ],
//! #         objectives: vec![ObjectiveSpec { name: "f".into(), bounds: (0.0, 1.0), weight: 1.0 }],
//! #     }
//! # }
//!
//! let session = Session::new(Arc::new(my_domain()), EngineConfig::default())?;
//!
//! // Seed the archive, pick a strategy, run a few interactive generations.
//! session.request_reset()?;
//! session.set_emitter(EmitterKind::ContextualBandit)?;
//! for _ in 0..10 {
//!     let selected = session.valid_bins().into_iter().next();
//!     let report = session.request_step(selected.as_slice(), 5)?;
//!     println!(
//!         "generation {}: {} new solutions",
//!         report.generation, report.new_solutions
//!     );
//! }
//!
//! println!(
//!     "mean genotype length: {}",
//!     session.population_complexity(Population::Feasible)
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod domain;
pub mod schema;
pub mod search;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use domain::{DescriptorSpec, DomainError, ObjectiveSpec, StructureDomain};
pub use schema::{EmitterKind, EngineConfig, PopulationSnapshot};
pub use search::archive::{ArchiveError, MapElites};
pub use search::bin::{BinMetric, MapBin};
pub use search::candidate::{Candidate, Population};
pub use session::{Session, SessionError, StepReport};
