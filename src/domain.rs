//! External collaborator interface for generative structure domains.
//!
//! The engine never builds, scores, or encodes a structure itself. The
//! generative grammar, phenotype realization, fitness functions, feasibility
//! checking, and the game-specific export encoding all live behind
//! [`StructureDomain`]. The engine calls these methods and treats them as
//! synchronous, possibly CPU-bound black boxes.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Index into a domain's descriptor catalog.
pub type DescriptorId = usize;

/// Index into a domain's objective catalog.
pub type ObjectiveId = usize;

/// A behavior descriptor: one candidate axis for the archive grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorSpec {
    /// Human-readable name, shown on axis labels.
    pub name: String,
    /// Inclusive numeric bounds of the descriptor value.
    pub bounds: (f64, f64),
}

/// A fitness objective with its current weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    /// Human-readable name.
    pub name: String,
    /// Inclusive bounds of the raw score, used for read-time normalization.
    pub bounds: (f64, f64),
    /// Weight applied at read time when combining objectives.
    pub weight: f64,
}

/// Errors surfaced by domain collaborators.
///
/// None of these are fatal to the archive: a failed offspring is discarded
/// and the step continues, a rejected ruleset leaves the prior one installed.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid genotype: {0}")]
    InvalidGenotype(String),
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    #[error("ruleset rejected: {0}")]
    RuleValidation(String),
}

/// The generative domain consumed by the engine.
///
/// Genotypes are symbolic strings; the associated [`Phenotype`] is the
/// realized structure. Feasibility is decided once, at evaluation time, and
/// the engine treats it as immutable afterwards.
///
/// [`Phenotype`]: StructureDomain::Phenotype
pub trait StructureDomain: Send + Sync {
    /// The realized artifact produced from a genotype.
    type Phenotype: Clone + Send + Sync;

    /// The fixed catalog of behavior descriptors this domain can score.
    /// Must contain at least two entries.
    fn descriptors(&self) -> &[DescriptorSpec];

    /// The fitness objectives this domain scores, in the order
    /// [`score_fitness`] reports them.
    ///
    /// [`score_fitness`]: StructureDomain::score_fitness
    fn objectives(&self) -> &[ObjectiveSpec];

    /// Generate a fresh random genotype.
    fn generate(&self, rng: &mut StdRng) -> String;

    /// Produce a mutated copy of a genotype.
    fn mutate(&self, genotype: &str, rng: &mut StdRng) -> String;

    /// Recombine two genotypes into an offspring genotype.
    fn crossover(&self, a: &str, b: &str, rng: &mut StdRng) -> String;

    /// Build the phenotype for a genotype. `seed` is the candidate's stable
    /// realization seed, so repeated calls reproduce the same structure.
    fn realize(&self, genotype: &str, seed: u64) -> Result<Self::Phenotype, DomainError>;

    /// Whether a realized structure satisfies the domain's constraints.
    fn is_feasible(&self, phenotype: &Self::Phenotype) -> bool;

    /// Raw per-objective scores, aligned with [`objectives`].
    ///
    /// [`objectives`]: StructureDomain::objectives
    fn score_fitness(&self, phenotype: &Self::Phenotype) -> Result<Vec<f64>, DomainError>;

    /// Scalar projection of a phenotype onto one descriptor axis.
    fn score_behavior(&self, phenotype: &Self::Phenotype, descriptor: DescriptorId) -> f64;

    /// Encode a phenotype into the external blueprint format.
    fn export(&self, phenotype: &Self::Phenotype) -> Vec<u8>;

    /// Validate the domain's current ruleset. Called before a replacement
    /// domain is installed; a rejected domain is discarded and the prior one
    /// retained.
    fn validate(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
