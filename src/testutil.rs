//! Shared test fixtures: a small deterministic tower-building domain.
//!
//! Genotypes are digit strings; each digit is the height of one stacked
//! segment. The domain is cheap, fully deterministic, and exercises every
//! collaborator signature.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::{DescriptorId, DescriptorSpec, DomainError, ObjectiveSpec, StructureDomain};
use crate::schema::EngineConfig;
use crate::search::archive::MapElites;
use crate::search::candidate::Candidate;

const MAX_SEGMENTS: usize = 12;

/// A realized tower: one height per stacked segment.
#[derive(Debug, Clone)]
pub struct Tower {
    pub heights: Vec<u32>,
}

/// Deterministic toy domain over digit-string genotypes.
pub struct TowerDomain {
    descriptors: Vec<DescriptorSpec>,
    objectives: Vec<ObjectiveSpec>,
}

impl TowerDomain {
    pub fn new() -> Self {
        let unit = (0.0, 1.0);
        Self {
            descriptors: vec![
                DescriptorSpec {
                    name: "width ratio".into(),
                    bounds: unit,
                },
                DescriptorSpec {
                    name: "mass ratio".into(),
                    bounds: unit,
                },
                DescriptorSpec {
                    name: "peak ratio".into(),
                    bounds: unit,
                },
            ],
            objectives: vec![
                ObjectiveSpec {
                    name: "height".into(),
                    bounds: unit,
                    weight: 1.0,
                },
                ObjectiveSpec {
                    name: "uniformity".into(),
                    bounds: unit,
                    weight: 1.0,
                },
            ],
        }
    }

    /// A plausible genotype for a target (width ratio, mass ratio) pair.
    pub fn genotype_for(behavior: (f64, f64)) -> String {
        let len = ((behavior.0 * MAX_SEGMENTS as f64).round() as usize).clamp(1, MAX_SEGMENTS);
        let digit = ((behavior.1 * 9.0).round() as u32).min(9);
        std::iter::repeat(char::from_digit(digit, 10).unwrap())
            .take(len)
            .collect()
    }
}

impl StructureDomain for TowerDomain {
    type Phenotype = Tower;

    fn descriptors(&self) -> &[DescriptorSpec] {
        &self.descriptors
    }

    fn objectives(&self) -> &[ObjectiveSpec] {
        &self.objectives
    }

    fn generate(&self, rng: &mut StdRng) -> String {
        let len = rng.gen_range(1..=MAX_SEGMENTS);
        (0..len)
            .map(|_| char::from_digit(rng.gen_range(0..10), 10).unwrap())
            .collect()
    }

    fn mutate(&self, genotype: &str, rng: &mut StdRng) -> String {
        let mut chars: Vec<char> = genotype.chars().collect();
        match rng.gen_range(0..3u8) {
            0 if chars.len() < MAX_SEGMENTS => {
                chars.push(char::from_digit(rng.gen_range(0..10), 10).unwrap());
            }
            1 if chars.len() > 1 => {
                let idx = rng.gen_range(0..chars.len());
                chars.remove(idx);
            }
            _ => {
                let idx = rng.gen_range(0..chars.len());
                chars[idx] = char::from_digit(rng.gen_range(0..10), 10).unwrap();
            }
        }
        chars.into_iter().collect()
    }

    fn crossover(&self, a: &str, b: &str, rng: &mut StdRng) -> String {
        let cut_a = rng.gen_range(0..=a.len());
        let cut_b = rng.gen_range(0..=b.len());
        let mut child: String = a[..cut_a].to_string();
        child.push_str(&b[cut_b..]);
        if child.is_empty() {
            child.push('1');
        }
        child.truncate(MAX_SEGMENTS);
        child
    }

    fn realize(&self, genotype: &str, _seed: u64) -> Result<Tower, DomainError> {
        if genotype.is_empty() {
            return Err(DomainError::InvalidGenotype("empty genotype".into()));
        }
        let heights = genotype
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .ok_or_else(|| DomainError::InvalidGenotype(format!("bad symbol {c:?}")))
            })
            .collect::<Result<Vec<u32>, _>>()?;
        Ok(Tower { heights })
    }

    fn is_feasible(&self, phenotype: &Tower) -> bool {
        phenotype.heights.iter().all(|&h| h > 0)
    }

    fn score_fitness(&self, phenotype: &Tower) -> Result<Vec<f64>, DomainError> {
        let n = phenotype.heights.len() as f64;
        let mean = phenotype.heights.iter().sum::<u32>() as f64 / n / 9.0;
        let max = *phenotype.heights.iter().max().unwrap_or(&0) as f64;
        let min = *phenotype.heights.iter().min().unwrap_or(&0) as f64;
        Ok(vec![mean, 1.0 - (max - min) / 9.0])
    }

    fn score_behavior(&self, phenotype: &Tower, descriptor: DescriptorId) -> f64 {
        let n = phenotype.heights.len() as f64;
        match descriptor {
            0 => n / MAX_SEGMENTS as f64,
            1 => phenotype.heights.iter().sum::<u32>() as f64 / (9.0 * n),
            _ => *phenotype.heights.iter().max().unwrap_or(&0) as f64 / 9.0,
        }
    }

    fn export(&self, phenotype: &Tower) -> Vec<u8> {
        phenotype.heights.iter().map(|&h| h as u8).collect()
    }
}

/// An archive over [`TowerDomain`] with a small test configuration.
pub fn tower_archive(resolution: (usize, usize)) -> MapElites<TowerDomain> {
    let mut config = EngineConfig::default();
    config.grid.resolution = resolution;
    config.population.bin_capacity = 10;
    config.population.initial_size = 40;
    MapElites::new(Arc::new(TowerDomain::new()), config).unwrap()
}

/// A candidate with a cached behavior projection and a single-objective
/// fitness, no phenotype attached.
pub fn candidate_at(behavior: (f64, f64), fitness: f64, feasible: bool) -> Candidate<Tower> {
    let mut candidate = Candidate::new(TowerDomain::genotype_for(behavior), 1, feasible);
    candidate.behavior = behavior;
    candidate.fitness = vec![fitness, 0.0];
    candidate
}
