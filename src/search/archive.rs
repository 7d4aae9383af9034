//! The MAP-Elites grid: a 2-D array of bins over behavior space.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;

use crate::domain::{DescriptorId, ObjectiveSpec, StructureDomain};
use crate::schema::{
    BinRecord, CandidateRecord, ConfigError, EngineConfig, PopulationSnapshot, SnapshotError,
};
use crate::search::bin::{BinMetric, MapBin};
use crate::search::candidate::{Candidate, Population};

/// Bookkeeping counters for one archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveCounters {
    /// Candidates accepted since the counter was last cleared.
    pub n_new_solutions: usize,
    /// Candidates dropped because their descriptor fell outside the grid.
    pub out_of_bounds: usize,
}

/// Archive operation errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("bin index ({0}, {1}) outside the grid")]
    InvalidBin(usize, usize),
    #[error("descriptor {0} not in the catalog")]
    UnknownDescriptor(usize),
    #[error("active descriptors must be distinct")]
    DuplicateDescriptor,
    #[error("expected {expected} objective weights, got {got}")]
    WeightCountMismatch { expected: usize, got: usize },
    #[error("replacement domain catalog does not match: {0}")]
    CatalogMismatch(&'static str),
}

/// The MAP-Elites grid.
///
/// Bins are stored flat in axis-0-major order; per-axis width arrays define
/// the (possibly non-uniform, after subdivision) bin boundaries. The sum of
/// widths along each axis always equals the full range of that axis'
/// descriptor bounds.
pub struct MapElites<D: StructureDomain> {
    domain: Arc<D>,
    config: EngineConfig,
    bins: Vec<MapBin<D::Phenotype>>,
    shape: (usize, usize),
    widths: (Vec<f64>, Vec<f64>),
    // Cumulative upper bin edges per axis, kept in sync with `widths`.
    edges: (Vec<f64>, Vec<f64>),
    active: (DescriptorId, DescriptorId),
    objectives: Vec<ObjectiveSpec>,
    /// Restrict interactive selection to a single, non-empty bin.
    pub enforce_quantity: bool,
    generation: usize,
    counters: ArchiveCounters,
    next_id: u64,
}

impl<D: StructureDomain> MapElites<D> {
    /// Create an empty archive over the first two catalog descriptors.
    pub fn new(domain: Arc<D>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if domain.descriptors().len() < 2 {
            return Err(ConfigError::InvalidCatalog(
                "at least two behavior descriptors required",
            ));
        }
        if domain.objectives().is_empty() {
            return Err(ConfigError::InvalidCatalog(
                "at least one fitness objective required",
            ));
        }

        let objectives = domain.objectives().to_vec();
        let enforce_quantity = config.enforce_quantity;
        let mut archive = Self {
            domain,
            config,
            bins: Vec::new(),
            shape: (0, 0),
            widths: (Vec::new(), Vec::new()),
            edges: (Vec::new(), Vec::new()),
            active: (0, 1),
            objectives,
            enforce_quantity,
            generation: 0,
            counters: ArchiveCounters::default(),
            next_id: 0,
        };
        archive.rebuild_grid();
        Ok(archive)
    }

    /// Rebuild an empty grid at the configured resolution with uniform bin
    /// widths over the active descriptor bounds.
    fn rebuild_grid(&mut self) {
        let (nx, ny) = self.config.grid.resolution;
        let (lo0, hi0) = self.descriptor_bounds(self.active.0);
        let (lo1, hi1) = self.descriptor_bounds(self.active.1);
        self.widths = (
            vec![(hi0 - lo0) / nx as f64; nx],
            vec![(hi1 - lo1) / ny as f64; ny],
        );
        self.shape = (nx, ny);
        self.bins = Self::empty_bins(
            self.shape,
            &self.widths,
            self.config.population.bin_capacity,
        );
        self.recompute_edges();
    }

    fn recompute_edges(&mut self) {
        let lo0 = self.descriptor_bounds(self.active.0).0;
        let lo1 = self.descriptor_bounds(self.active.1).0;
        self.edges = (
            cumulative_edges(lo0, &self.widths.0),
            cumulative_edges(lo1, &self.widths.1),
        );
    }

    fn empty_bins(
        shape: (usize, usize),
        widths: &(Vec<f64>, Vec<f64>),
        capacity: usize,
    ) -> Vec<MapBin<D::Phenotype>> {
        let (nx, ny) = shape;
        let mut bins = Vec::with_capacity(nx * ny);
        for i in 0..nx {
            for j in 0..ny {
                bins.push(MapBin::new((i, j), (widths.0[i], widths.1[j]), capacity));
            }
        }
        bins
    }

    fn idx(&self, (i, j): (usize, usize)) -> usize {
        i * self.shape.1 + j
    }

    fn descriptor_bounds(&self, id: DescriptorId) -> (f64, f64) {
        self.domain.descriptors()[id].bounds
    }

    /// Grid shape along (axis 0, axis 1).
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// The domain collaborator.
    pub fn domain(&self) -> &Arc<D> {
        &self.domain
    }

    /// Engine configuration this archive was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current objective table (weights included).
    pub fn objectives(&self) -> &[ObjectiveSpec] {
        &self.objectives
    }

    /// Catalog indices of the two active descriptors.
    pub fn active_descriptors(&self) -> (DescriptorId, DescriptorId) {
        self.active
    }

    /// Per-axis bin widths.
    pub fn axis_widths(&self) -> (&[f64], &[f64]) {
        (&self.widths.0, &self.widths.1)
    }

    /// One bin by coordinate.
    pub fn bin(&self, coords: (usize, usize)) -> Option<&MapBin<D::Phenotype>> {
        (coords.0 < self.shape.0 && coords.1 < self.shape.1)
            .then(|| &self.bins[self.idx(coords)])
    }

    /// Iterate all bins in axis-0-major order.
    pub fn bins(&self) -> impl Iterator<Item = &MapBin<D::Phenotype>> {
        self.bins.iter()
    }

    /// Bookkeeping counters.
    pub fn counters(&self) -> ArchiveCounters {
        self.counters
    }

    /// Clear the accepted-candidate counter (after reporting it).
    pub fn reset_new_solution_count(&mut self) {
        self.counters.n_new_solutions = 0;
    }

    /// Generation counter.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Advance the generation counter by one.
    pub fn advance_generation(&mut self) {
        self.generation += 1;
    }

    /// Map a behavior pair to a grid coordinate by binary-searching the
    /// cumulative bin widths along each axis. A pure function of the value
    /// and the current boundaries. Returns `None` outside the grid bounds.
    pub fn bin_index(&self, behavior: (f64, f64)) -> Option<(usize, usize)> {
        let i = locate(
            behavior.0,
            self.descriptor_bounds(self.active.0),
            &self.edges.0,
        )?;
        let j = locate(
            behavior.1,
            self.descriptor_bounds(self.active.1),
            &self.edges.1,
        )?;
        Some((i, j))
    }

    /// Realize and score a batch of genotypes in parallel.
    ///
    /// Offspring whose realization or scoring fails are discarded; the rest
    /// come back fully evaluated (phenotype, fitness, feasibility, behavior)
    /// and ready for insertion.
    pub fn evaluate(&self, genotypes: &[(String, u64)]) -> Vec<Candidate<D::Phenotype>> {
        let domain = &self.domain;
        let active = self.active;
        genotypes
            .par_iter()
            .filter_map(|(genotype, seed)| {
                let phenotype = match domain.realize(genotype, *seed) {
                    Ok(p) => p,
                    Err(e) => {
                        log::debug!("discarding offspring {genotype:?}: {e}");
                        return None;
                    }
                };
                let fitness = match domain.score_fitness(&phenotype) {
                    Ok(f) => f,
                    Err(e) => {
                        log::debug!("discarding offspring {genotype:?}: {e}");
                        return None;
                    }
                };
                let feasible = domain.is_feasible(&phenotype);
                let behavior = (
                    domain.score_behavior(&phenotype, active.0),
                    domain.score_behavior(&phenotype, active.1),
                );
                let mut candidate = Candidate::new(genotype.clone(), *seed, feasible);
                candidate.fitness = fitness;
                candidate.behavior = behavior;
                candidate.set_phenotype(phenotype);
                Some(candidate)
            })
            .collect()
    }

    /// Insert a candidate into the bin matching its behavior descriptors.
    ///
    /// When the candidate carries a realized phenotype its projection is
    /// recomputed through the external scorer; otherwise the cached value is
    /// used (snapshot loads, re-binning). A descriptor outside the grid
    /// drops the candidate silently (counted, `false`); a full population
    /// that rejects the candidate also returns `false`.
    pub fn insert(&mut self, mut candidate: Candidate<D::Phenotype>) -> bool {
        if let Some(behavior) = candidate.phenotype().map(|p| {
            (
                self.domain.score_behavior(p, self.active.0),
                self.domain.score_behavior(p, self.active.1),
            )
        }) {
            candidate.behavior = behavior;
        }
        let accepted = self.place(candidate);
        if accepted {
            self.counters.n_new_solutions += 1;
        }
        accepted
    }

    /// Place a candidate by its cached behavior without touching the
    /// new-solution counter.
    fn place(&mut self, mut candidate: Candidate<D::Phenotype>) -> bool {
        match self.bin_index(candidate.behavior) {
            Some(coords) => {
                candidate.id = self.next_id;
                self.next_id += 1;
                let idx = self.idx(coords);
                self.bins[idx].insert(candidate, &self.objectives).accepted()
            }
            None => {
                self.counters.out_of_bounds += 1;
                false
            }
        }
    }

    /// Evaluate a genotype batch and insert the survivors. Returns the
    /// number of accepted candidates.
    pub fn evaluate_and_insert(&mut self, genotypes: &[(String, u64)]) -> usize {
        let mut accepted = 0;
        for candidate in self.evaluate(genotypes) {
            if self.insert(candidate) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Split the identified bin's descriptor range in half along both axes.
    ///
    /// The grid stays rectangular: column `i` and row `j` are each split in
    /// two, growing the grid from `(nx, ny)` to `(nx + 1, ny + 1)`. Every
    /// member of every affected bin is moved into its refined bin by
    /// re-mapping its cached behavior against the narrower ranges; no member
    /// is dropped or duplicated.
    pub fn subdivide_range(&mut self, bin_idx: (usize, usize)) -> Result<(), ArchiveError> {
        let (i, j) = bin_idx;
        if i >= self.shape.0 || j >= self.shape.1 {
            return Err(ArchiveError::InvalidBin(i, j));
        }

        let mut drained = Vec::new();
        for bin in &mut self.bins {
            drained.extend(bin.drain(Population::Feasible));
            drained.extend(bin.drain(Population::Infeasible));
        }

        let half0 = self.widths.0[i] / 2.0;
        self.widths.0[i] = half0;
        self.widths.0.insert(i + 1, half0);
        let half1 = self.widths.1[j] / 2.0;
        self.widths.1[j] = half1;
        self.widths.1.insert(j + 1, half1);
        self.shape = (self.shape.0 + 1, self.shape.1 + 1);
        self.bins = Self::empty_bins(
            self.shape,
            &self.widths,
            self.config.population.bin_capacity,
        );
        self.recompute_edges();

        for candidate in drained {
            // Refinement is strictly finer, so every member lands in
            // exactly one child below capacity.
            let coords = self
                .bin_index(candidate.behavior)
                .unwrap_or((self.shape.0 - 1, self.shape.1 - 1));
            let idx = self.idx(coords);
            let outcome = self.bins[idx].insert(candidate, &self.objectives);
            debug_assert!(outcome.accepted());
        }

        log::debug!(
            "subdivided bin ({i}, {j}); grid is now {}x{}",
            self.shape.0,
            self.shape.1
        );
        Ok(())
    }

    /// Reset or rescan every bin's `new_elite` flags.
    ///
    /// With `reset` the flags are cleared for the new generation; otherwise
    /// each population's elite is compared against the elite recorded at the
    /// previous scan and flagged when it changed.
    pub fn update_elites(&mut self, reset: bool) {
        if reset {
            for bin in &mut self.bins {
                bin.clear_new_elite();
            }
        } else {
            for bin in &mut self.bins {
                for pop in Population::BOTH {
                    bin.rescan_elite(pop, &self.objectives);
                }
            }
        }
    }

    /// Swap the two active behavior descriptors and rebuild the grid.
    ///
    /// Every candidate's projection is recomputed under the new axes and
    /// the whole population is re-inserted into a fresh uniform grid.
    pub fn update_behavior_descriptors(
        &mut self,
        pair: (DescriptorId, DescriptorId),
    ) -> Result<(), ArchiveError> {
        let catalog = self.domain.descriptors().len();
        for id in [pair.0, pair.1] {
            if id >= catalog {
                return Err(ArchiveError::UnknownDescriptor(id));
            }
        }
        if pair.0 == pair.1 {
            return Err(ArchiveError::DuplicateDescriptor);
        }

        let mut drained = Vec::new();
        for bin in &mut self.bins {
            drained.extend(bin.drain(Population::Feasible));
            drained.extend(bin.drain(Population::Infeasible));
        }

        self.active = pair;
        self.rebuild_grid();

        let domain = Arc::clone(&self.domain);
        for mut candidate in drained {
            if candidate.phenotype().is_none() {
                match domain.realize(candidate.genotype(), candidate.seed) {
                    Ok(p) => candidate.set_phenotype(p),
                    Err(e) => {
                        log::debug!("dropping candidate during descriptor swap: {e}");
                        continue;
                    }
                }
            }
            let behavior = candidate
                .phenotype()
                .map(|p| {
                    (
                        domain.score_behavior(p, pair.0),
                        domain.score_behavior(p, pair.1),
                    )
                })
                .unwrap_or(candidate.behavior);
            candidate.behavior = behavior;
            self.place(candidate);
        }

        log::info!(
            "active descriptors set to ({}, {})",
            self.domain.descriptors()[pair.0].name,
            self.domain.descriptors()[pair.1].name
        );
        Ok(())
    }

    /// Rewrite per-objective weights. Weights are applied at read time, so
    /// no stored candidate is touched.
    pub fn update_fitness_weights(&mut self, weights: &[f64]) -> Result<(), ArchiveError> {
        if weights.len() != self.objectives.len() {
            return Err(ArchiveError::WeightCountMismatch {
                expected: self.objectives.len(),
                got: weights.len(),
            });
        }
        for (objective, &weight) in self.objectives.iter_mut().zip(weights) {
            objective.weight = weight;
        }
        Ok(())
    }

    /// Discard all populations and regenerate an initial population through
    /// the domain's generator.
    pub fn reset(&mut self, rng: &mut StdRng) {
        self.rebuild_grid();
        self.counters = ArchiveCounters::default();
        self.generation = 0;

        let genotypes: Vec<(String, u64)> = (0..self.config.population.initial_size)
            .map(|_| (self.domain.generate(rng), rng.r#gen()))
            .collect();
        let inserted = self.evaluate_and_insert(&genotypes);
        self.update_elites(false);

        log::info!(
            "archive reset: {inserted}/{} initial candidates placed",
            genotypes.len()
        );
    }

    /// Coordinates of bins eligible for interactive selection (non-empty in
    /// at least one population).
    pub fn valid_bins(&self) -> Vec<(usize, usize)> {
        self.bins
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| b.coords)
            .collect()
    }

    /// The elite of one bin population.
    pub fn elite(
        &self,
        coords: (usize, usize),
        pop: Population,
    ) -> Option<&Candidate<D::Phenotype>> {
        self.bin(coords)?.elite(pop, &self.objectives)
    }

    /// Owned serialized view of one bin population's elite, for display.
    pub fn elite_record(&self, coords: (usize, usize), pop: Population) -> Option<CandidateRecord> {
        self.elite(coords, pop).map(to_record)
    }

    /// Swap in a replacement domain (e.g. a new ruleset). The replacement
    /// must expose the same descriptor and objective catalogs; otherwise it
    /// is rejected and the prior domain retained.
    pub fn set_domain(&mut self, domain: Arc<D>) -> Result<(), ArchiveError> {
        if domain.descriptors().len() != self.domain.descriptors().len() {
            return Err(ArchiveError::CatalogMismatch("descriptor count changed"));
        }
        if domain.objectives().len() != self.domain.objectives().len() {
            return Err(ArchiveError::CatalogMismatch("objective count changed"));
        }
        self.domain = domain;
        Ok(())
    }

    /// Total members of one population across all bins.
    pub fn count(&self, pop: Population) -> usize {
        self.bins.iter().map(|b| b.len(pop)).sum()
    }

    /// Total members across both populations.
    pub fn total_count(&self) -> usize {
        self.count(Population::Feasible) + self.count(Population::Infeasible)
    }

    /// Scalar complexity summary of one population: mean genotype length.
    pub fn population_complexity(&self, pop: Population) -> f64 {
        let mut sum = 0usize;
        let mut count = 0usize;
        for bin in &self.bins {
            for candidate in bin.members(pop) {
                sum += candidate.genotype().len();
                count += 1;
            }
        }
        if count > 0 { sum as f64 / count as f64 } else { 0.0 }
    }

    /// Per-bin metric values in axis-0-major order, for display.
    pub fn metric_values(&self, metric: BinMetric, use_mean: bool, pop: Population) -> Vec<f64> {
        self.bins
            .iter()
            .map(|b| b.metric(metric, use_mean, pop, &self.objectives))
            .collect()
    }

    /// Re-realize any candidate missing its memoized phenotype.
    pub fn refresh_phenotypes(&mut self) {
        let domain = Arc::clone(&self.domain);
        for bin in &mut self.bins {
            for pop in Population::BOTH {
                for candidate in bin.iter_mut(pop) {
                    if candidate.phenotype().is_none() {
                        match domain.realize(candidate.genotype(), candidate.seed) {
                            Ok(p) => candidate.set_phenotype(p),
                            Err(e) => log::debug!("phenotype refresh failed: {e}"),
                        }
                    }
                }
            }
        }
    }

    /// Increment every candidate's age by one generation.
    pub fn age_population(&mut self) {
        for bin in &mut self.bins {
            for pop in Population::BOTH {
                for candidate in bin.iter_mut(pop) {
                    candidate.age += 1;
                }
            }
        }
    }

    /// Set every candidate's display color.
    pub fn recolor(&mut self, color: [f32; 3]) {
        for bin in &mut self.bins {
            for pop in Population::BOTH {
                for candidate in bin.iter_mut(pop) {
                    candidate.color = color;
                }
            }
        }
    }

    /// Normalized [0, 1] center of a bin, in active-descriptor space.
    pub fn normalized_center(&self, coords: (usize, usize)) -> [f64; 2] {
        let (lo0, hi0) = self.descriptor_bounds(self.active.0);
        let (lo1, hi1) = self.descriptor_bounds(self.active.1);
        let offset0: f64 = self.widths.0[..coords.0].iter().sum();
        let offset1: f64 = self.widths.1[..coords.1].iter().sum();
        [
            (offset0 + self.widths.0[coords.0] / 2.0) / (hi0 - lo0),
            (offset1 + self.widths.1[coords.1] / 2.0) / (hi1 - lo1),
        ]
    }

    /// Normalized [0, 1] projection of a candidate's behavior pair.
    pub fn normalized_behavior(&self, candidate: &Candidate<D::Phenotype>) -> [f64; 2] {
        let (lo0, hi0) = self.descriptor_bounds(self.active.0);
        let (lo1, hi1) = self.descriptor_bounds(self.active.1);
        [
            ((candidate.behavior.0 - lo0) / (hi0 - lo0)).clamp(0.0, 1.0),
            ((candidate.behavior.1 - lo1) / (hi1 - lo1)).clamp(0.0, 1.0),
        ]
    }

    /// Serialize the full population.
    pub fn to_snapshot(&self) -> PopulationSnapshot {
        let record = |c: &Candidate<D::Phenotype>| to_record(c);
        PopulationSnapshot {
            active_descriptors: self.active,
            shape: self.shape,
            widths: self.widths.clone(),
            bins: self
                .bins
                .iter()
                .map(|b| BinRecord {
                    coords: b.coords,
                    size: b.size,
                    feasible: b.members(Population::Feasible).iter().map(record).collect(),
                    infeasible: b
                        .members(Population::Infeasible)
                        .iter()
                        .map(record)
                        .collect(),
                })
                .collect(),
        }
    }

    /// Replace the population from a snapshot. Fails atomically: on any
    /// error the archive is left unmodified.
    pub fn load_snapshot(&mut self, snapshot: &PopulationSnapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;

        let catalog = self.domain.descriptors().len();
        let (d0, d1) = snapshot.active_descriptors;
        if d0 >= catalog || d1 >= catalog || d0 == d1 {
            return Err(SnapshotError::Incompatible(
                "active descriptors not in this domain's catalog",
            ));
        }
        let objective_count = self.objectives.len();
        let capacity = self.config.population.bin_capacity;

        // Build the replacement grid completely before touching self.
        let mut bins = Self::empty_bins(snapshot.shape, &snapshot.widths, capacity);
        let mut next_id = self.next_id;
        for record in &snapshot.bins {
            let idx = record.coords.0 * snapshot.shape.1 + record.coords.1;
            let bin = &mut bins[idx];
            for c in record.feasible.iter().chain(&record.infeasible) {
                if c.fitness.len() != objective_count {
                    return Err(SnapshotError::Incompatible(
                        "candidate fitness vector does not match the objective table",
                    ));
                }
                let mut candidate: Candidate<D::Phenotype> =
                    Candidate::new(c.genotype.clone(), c.seed, c.feasible);
                candidate.id = next_id;
                next_id += 1;
                candidate.fitness = c.fitness.clone();
                candidate.behavior = c.behavior;
                candidate.age = c.age;
                candidate.color = c.color;
                if !bin.insert(candidate, &self.objectives).accepted() {
                    return Err(SnapshotError::Incompatible(
                        "bin record exceeds the configured population capacity",
                    ));
                }
            }
        }

        self.bins = bins;
        self.shape = snapshot.shape;
        self.widths = snapshot.widths.clone();
        self.active = (d0, d1);
        self.recompute_edges();
        self.next_id = next_id;
        self.generation = 0;
        self.counters = ArchiveCounters::default();

        // Elites and novelty flags are derived, not stored: record the scan
        // baseline, then start with clean flags.
        self.update_elites(false);
        self.update_elites(true);
        Ok(())
    }
}

fn to_record<P>(c: &Candidate<P>) -> CandidateRecord {
    CandidateRecord {
        genotype: c.genotype().to_string(),
        fitness: c.fitness.clone(),
        behavior: c.behavior,
        feasible: c.is_feasible(),
        age: c.age,
        seed: c.seed,
        color: c.color,
    }
}

/// Cumulative upper edges of a width array starting at `lo`.
fn cumulative_edges(lo: f64, widths: &[f64]) -> Vec<f64> {
    widths
        .iter()
        .scan(lo, |acc, w| {
            *acc += w;
            Some(*acc)
        })
        .collect()
}

/// Binary search of a descriptor value over cumulative bin edges.
///
/// Values outside the descriptor bounds return `None`; a value exactly on
/// the upper bound belongs to the last bin.
fn locate(value: f64, bounds: (f64, f64), edges: &[f64]) -> Option<usize> {
    let (lo, hi) = bounds;
    if value < lo || value > hi {
        return None;
    }
    let idx = edges.partition_point(|&edge| edge <= value);
    Some(idx.min(edges.len() - 1))
}
