//! Step orchestrator and the surface exposed to collaborators.
//!
//! A session owns the archive, the observation buffer, the surrogate
//! estimator, and the installed emitter. Every mutating operation is gated
//! by the process lock: a plain try-lock with no queuing, so at most one
//! step's worth of input is accepted at a time and later triggers are
//! rejected as [`SessionError::Busy`]. A second, independent lock guards
//! artifact export so a download never interleaves with a structural
//! mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::StructureDomain;
use crate::schema::{
    CandidateRecord, ConfigError, EmitterKind, EngineConfig, KernelKind, PopulationSnapshot,
    SnapshotError,
};
use crate::search::archive::{ArchiveCounters, ArchiveError, MapElites};
use crate::search::bin::BinMetric;
use crate::search::buffer::Buffer;
use crate::search::candidate::Population;
use crate::search::emitter::{build_emitter, Emitter, EmitterContext};
use crate::search::estimator::Estimator;

/// Session operation errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A step or export is already running. Recoverable; surfaces only as a
    /// busy indicator.
    #[error("a step is already running")]
    Busy,
    /// The selection violates quantity or validity constraints. The whole
    /// step is aborted with no partial mutation.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    /// A replacement ruleset failed validation; the prior one is retained.
    #[error("ruleset rejected: {0}")]
    RuleValidation(String),
    /// No feasible elite to export from the requested bin.
    #[error("no exportable elite in bin ({0}, {1})")]
    NothingToExport(usize, usize),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Summary of one completed generation step.
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    /// Generation counter after the step.
    pub generation: usize,
    /// Candidates accepted into the archive during the step.
    pub new_solutions: usize,
    /// Total wall-clock seconds.
    pub elapsed_seconds: f64,
    /// Seconds spent inside emitter steps.
    pub emitter_seconds: f64,
}

struct SessionState<D: StructureDomain> {
    archive: MapElites<D>,
    buffer: Buffer,
    estimator: Estimator,
    emitter: Box<dyn Emitter<D>>,
    rng: StdRng,
}

/// An interactive quality-diversity session.
pub struct Session<D: StructureDomain> {
    state: Mutex<SessionState<D>>,
    process_lock: AtomicBool,
    export_lock: AtomicBool,
}

impl<D: StructureDomain> Session<D> {
    /// Create a session with an empty archive.
    pub fn new(domain: Arc<D>, config: EngineConfig) -> Result<Self, ConfigError> {
        let seed = config.rng_seed.unwrap_or_else(rand::random);
        let rng = StdRng::seed_from_u64(seed);
        let buffer = Buffer::new(config.buffer_merge);
        let estimator = Estimator::new(config.estimator.clone());
        let emitter = build_emitter(EmitterKind::Random, &config.emitter);
        let archive = MapElites::new(domain, config)?;

        Ok(Self {
            state: Mutex::new(SessionState {
                archive,
                buffer,
                estimator,
                emitter,
                rng,
            }),
            process_lock: AtomicBool::new(false),
            export_lock: AtomicBool::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, SessionState<D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a step is currently running.
    pub fn is_busy(&self) -> bool {
        self.process_lock.load(Ordering::Acquire)
    }

    /// Whether an export is currently running.
    pub fn is_exporting(&self) -> bool {
        self.export_lock.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Read-only surface
    // ------------------------------------------------------------------

    /// Grid shape along (axis 0, axis 1).
    pub fn grid_shape(&self) -> (usize, usize) {
        self.state().archive.shape()
    }

    /// Generation counter.
    pub fn generation(&self) -> usize {
        self.state().archive.generation()
    }

    /// Archive bookkeeping counters.
    pub fn counters(&self) -> ArchiveCounters {
        self.state().archive.counters()
    }

    /// Per-bin metric values in axis-0-major order.
    pub fn metric_values(&self, metric: BinMetric, use_mean: bool, pop: Population) -> Vec<f64> {
        self.state().archive.metric_values(metric, use_mean, pop)
    }

    /// Per-axis bin widths, for absolute axis labels.
    pub fn axis_widths(&self) -> (Vec<f64>, Vec<f64>) {
        let state = self.state();
        let (w0, w1) = state.archive.axis_widths();
        (w0.to_vec(), w1.to_vec())
    }

    /// The elite of one bin population, as an owned record.
    pub fn elite(&self, coords: (usize, usize), pop: Population) -> Option<CandidateRecord> {
        self.state().archive.elite_record(coords, pop)
    }

    /// Coordinates of bins eligible for selection.
    pub fn valid_bins(&self) -> Vec<(usize, usize)> {
        self.state().archive.valid_bins()
    }

    /// Mean genotype length of one population.
    pub fn population_complexity(&self, pop: Population) -> f64 {
        self.state().archive.population_complexity(pop)
    }

    /// Names in the domain's descriptor catalog.
    pub fn descriptor_names(&self) -> Vec<String> {
        self.state()
            .archive
            .domain()
            .descriptors()
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    /// Names of the fitness objectives.
    pub fn objective_names(&self) -> Vec<String> {
        self.state()
            .archive
            .objectives()
            .iter()
            .map(|o| o.name.clone())
            .collect()
    }

    /// Display names of every available emitter.
    pub fn emitter_names() -> Vec<&'static str> {
        EmitterKind::ALL.iter().map(|k| k.name()).collect()
    }

    /// The installed emitter.
    pub fn current_emitter(&self) -> EmitterKind {
        self.state().emitter.kind()
    }

    /// Surrogate estimate for a feature vector.
    pub fn estimate(&self, features: &[f64]) -> f64 {
        self.state().estimator.predict(features)
    }

    // ------------------------------------------------------------------
    // Mutating surface, gated by the process lock
    // ------------------------------------------------------------------

    /// Run one generation: a human phase over `selected` (skipped when
    /// empty), then `automatic_iterations` emitter steps, then
    /// post-processing. An invalid selection aborts the whole step before
    /// any mutation; a concurrent step is rejected as busy.
    pub fn request_step(
        &self,
        selected: &[(usize, usize)],
        automatic_iterations: usize,
    ) -> Result<StepReport, SessionError> {
        let _guard = self.acquire_process_lock()?;
        let mut state = self.state();
        let start = Instant::now();

        Self::validate_selection(&state.archive, selected)?;

        let generation = state.archive.generation();
        log::info!("started step {}", generation + 1);

        // New generation: clear every bin's novelty flags first.
        state.archive.update_elites(true);
        state.emitter.on_selection(selected);

        if !selected.is_empty() {
            Self::human_phase(&mut state, selected);
        }

        let mut emitter_seconds = 0.0;
        let SessionState {
            archive,
            buffer,
            estimator,
            emitter,
            rng,
        } = &mut *state;
        for _ in 0..automatic_iterations {
            let mut ctx = EmitterContext {
                archive: &mut *archive,
                buffer: &mut *buffer,
                estimator: &*estimator,
                selection: selected,
                generation,
                rng: &mut *rng,
            };
            emitter_seconds += emitter.step(&mut ctx);
        }

        // Post-processing: elite rescan, phenotype refresh, aging, surrogate
        // retrain, then the generation counter.
        archive.update_elites(false);
        archive.refresh_phenotypes();
        if archive.config().aging {
            archive.age_population();
        }
        estimator.fit(buffer);
        emitter.on_generation_end();
        archive.advance_generation();

        let new_solutions = archive.counters().n_new_solutions;
        archive.reset_new_solution_count();
        let report = StepReport {
            generation: archive.generation(),
            new_solutions,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            emitter_seconds,
        };
        log::info!(
            "completed step {} (created {} solutions)",
            report.generation,
            report.new_solutions
        );
        Ok(report)
    }

    /// Discard the whole population and reseed it from the domain's
    /// generator. The observation buffer and surrogate are cleared too.
    pub fn request_reset(&self) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        let mut state = self.state();
        log::info!("resetting all bins");
        let SessionState {
            archive,
            buffer,
            estimator,
            rng,
            ..
        } = &mut *state;
        archive.reset(rng);
        buffer.clear();
        estimator.fit(buffer);
        Ok(())
    }

    /// Subdivide the identified bin's descriptor range.
    pub fn subdivide(&self, bin_idx: (usize, usize)) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        self.state().archive.subdivide_range(bin_idx)?;
        Ok(())
    }

    /// Swap the active behavior descriptors.
    pub fn set_descriptors(&self, pair: (usize, usize)) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        self.state().archive.update_behavior_descriptors(pair)?;
        Ok(())
    }

    /// Rewrite the per-objective fitness weights.
    pub fn set_fitness_weights(&self, weights: &[f64]) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        self.state().archive.update_fitness_weights(weights)?;
        log::info!("updated fitness function weights");
        Ok(())
    }

    /// Install a different emitter. Takes effect with the next step; the
    /// previous emitter's internal state is discarded. Installing a kernel
    /// emitter re-targets the surrogate to the named kernel.
    pub fn set_emitter(&self, kind: EmitterKind) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        let mut state = self.state();
        let emitter_config = state.archive.config().emitter.clone();
        state.emitter = build_emitter(kind, &emitter_config);
        match kind {
            EmitterKind::LinearKernel => state.estimator.set_kernel(KernelKind::Linear),
            EmitterKind::RbfKernel => state.estimator.set_kernel(KernelKind::Rbf),
            _ => {}
        }
        log::info!("emitter set to {}", kind.name());
        Ok(())
    }

    /// Toggle the single-bin selection constraint.
    pub fn set_enforce_quantity(&self, enforce: bool) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        self.state().archive.enforce_quantity = enforce;
        Ok(())
    }

    /// Set every candidate's display color.
    pub fn recolor(&self, color: [f32; 3]) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        self.state().archive.recolor(color);
        Ok(())
    }

    /// Install a replacement domain (e.g. an updated ruleset). The
    /// replacement is validated first; on rejection the prior domain is
    /// retained.
    pub fn replace_domain(&self, domain: Arc<D>) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        if let Err(e) = domain.validate() {
            log::warn!("replacement ruleset rejected: {e}");
            return Err(SessionError::RuleValidation(e.to_string()));
        }
        self.state()
            .archive
            .set_domain(domain)
            .map_err(|e| SessionError::RuleValidation(e.to_string()))?;
        log::info!("domain ruleset replaced");
        Ok(())
    }

    /// Serialize the full population to a byte payload.
    pub fn serialize_population(&self) -> Result<Vec<u8>, SessionError> {
        let _guard = self.acquire_process_lock()?;
        Ok(self.state().archive.to_snapshot().to_bytes()?)
    }

    /// Replace the population from a serialized payload. Fails atomically.
    pub fn load_population(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let _guard = self.acquire_process_lock()?;
        let snapshot = PopulationSnapshot::from_bytes(bytes)?;
        self.state().archive.load_snapshot(&snapshot)?;
        log::info!("population loaded from snapshot");
        Ok(())
    }

    /// Export the feasible elite of one bin through the domain's encoder.
    /// Guarded by the export lock, independent of the process lock, so a
    /// download never observes a half-mutated phenotype.
    pub fn export_elite(&self, coords: (usize, usize)) -> Result<Vec<u8>, SessionError> {
        let _guard =
            TryLockGuard::acquire(&self.export_lock).ok_or(SessionError::Busy)?;
        let state = self.state();
        let elite = state
            .archive
            .elite(coords, Population::Feasible)
            .ok_or(SessionError::NothingToExport(coords.0, coords.1))?;
        let domain = state.archive.domain();
        match elite.phenotype() {
            Some(p) => Ok(domain.export(p)),
            None => {
                let p = domain
                    .realize(elite.genotype(), elite.seed)
                    .map_err(|_| SessionError::NothingToExport(coords.0, coords.1))?;
                Ok(domain.export(&p))
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn acquire_process_lock(&self) -> Result<TryLockGuard<'_>, SessionError> {
        TryLockGuard::acquire(&self.process_lock).ok_or_else(|| {
            log::debug!("step request ignored: process lock held");
            SessionError::Busy
        })
    }

    fn validate_selection(
        archive: &MapElites<D>,
        selected: &[(usize, usize)],
    ) -> Result<(), SessionError> {
        let shape = archive.shape();
        for &(i, j) in selected {
            if i >= shape.0 || j >= shape.1 {
                let reason = format!("bin ({i}, {j}) outside the {shape:?} grid");
                log::warn!("step not applied: {reason}");
                return Err(SessionError::InvalidSelection(reason));
            }
        }
        if archive.enforce_quantity {
            if selected.len() > 1 {
                let reason = format!("{} bins selected, limit is 1", selected.len());
                log::warn!("step not applied: {reason}");
                return Err(SessionError::InvalidSelection(reason));
            }
            let valid = archive.valid_bins();
            for coords in selected {
                if !valid.contains(coords) {
                    let reason = format!("bin {coords:?} is empty");
                    log::warn!("step not applied: {reason}");
                    return Err(SessionError::InvalidSelection(reason));
                }
            }
        }
        Ok(())
    }

    /// Breed from each selected bin's elite; with multiple selections,
    /// consecutive pairs also produce one crossover offspring each.
    fn human_phase(state: &mut SessionState<D>, selected: &[(usize, usize)]) {
        let SessionState {
            archive,
            buffer,
            rng,
            ..
        } = state;
        let objectives = archive.objectives().to_vec();
        let domain = Arc::clone(archive.domain());
        let per_selection = archive.config().population.offspring_per_selection;

        let parent_of = |archive: &MapElites<D>, coords: (usize, usize)| {
            let bin = archive.bin(coords)?;
            bin.elite(Population::Feasible, &objectives)
                .or_else(|| bin.elite(Population::Infeasible, &objectives))
                .map(|e| e.genotype().to_string())
        };

        let mut genotypes: Vec<(String, u64)> = Vec::new();
        let mut parents: Vec<String> = Vec::new();
        for &coords in selected {
            let Some(parent) = parent_of(archive, coords) else {
                continue;
            };
            for _ in 0..per_selection {
                genotypes.push((domain.mutate(&parent, rng), rng.r#gen()));
            }
            parents.push(parent);
        }
        for pair in parents.windows(2) {
            genotypes.push((domain.crossover(&pair[0], &pair[1], rng), rng.r#gen()));
        }

        for candidate in archive.evaluate(&genotypes) {
            let features = archive.normalized_behavior(&candidate);
            buffer.insert(&features, candidate.weighted_fitness(&objectives));
            archive.insert(candidate);
        }
    }
}

/// RAII guard over a compare-exchange binary lock.
struct TryLockGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TryLockGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TryLockGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DescriptorId, DescriptorSpec, DomainError, ObjectiveSpec};
    use crate::testutil::{Tower, TowerDomain};

    fn session() -> Session<TowerDomain> {
        let mut config = EngineConfig::default();
        config.grid.resolution = (4, 4);
        config.population.initial_size = 40;
        config.rng_seed = Some(99);
        Session::new(Arc::new(TowerDomain::new()), config).unwrap()
    }

    fn seeded_session() -> Session<TowerDomain> {
        let s = session();
        s.request_reset().unwrap();
        s
    }

    #[test]
    fn test_try_lock_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = TryLockGuard::acquire(&flag).unwrap();
        assert!(TryLockGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(TryLockGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_step_advances_generation_and_reports() {
        let s = seeded_session();
        assert_eq!(s.generation(), 0);

        let selection = s.valid_bins()[0];
        let report = s.request_step(&[selection], 3).unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(s.generation(), 1);
        assert!(!s.is_busy());
    }

    #[test]
    fn test_quantity_enforcement_rejects_multi_selection() {
        let s = seeded_session();
        let bins = s.valid_bins();
        assert!(bins.len() >= 2);

        let before = s.generation();
        let result = s.request_step(&bins[..2], 2);
        assert!(matches!(result, Err(SessionError::InvalidSelection(_))));
        assert_eq!(s.generation(), before);
        assert!(!s.is_busy());
    }

    #[test]
    fn test_empty_bin_selection_rejected_under_enforcement() {
        let s = session(); // empty archive, everything is invalid
        let result = s.request_step(&[(0, 0)], 1);
        assert!(matches!(result, Err(SessionError::InvalidSelection(_))));
    }

    #[test]
    fn test_out_of_grid_selection_rejected() {
        let s = seeded_session();
        let result = s.request_step(&[(40, 40)], 1);
        assert!(matches!(result, Err(SessionError::InvalidSelection(_))));
    }

    #[test]
    fn test_automatic_step_needs_no_selection() {
        let s = seeded_session();
        let report = s.request_step(&[], 4).unwrap();
        assert_eq!(report.generation, 1);
    }

    #[test]
    fn test_multi_selection_allowed_when_enforcement_off() {
        let s = seeded_session();
        s.set_enforce_quantity(false).unwrap();
        let bins = s.valid_bins();
        let report = s.request_step(&bins[..2.min(bins.len())], 1).unwrap();
        assert_eq!(report.generation, 1);
    }

    #[test]
    fn test_set_emitter_switches_strategy_and_kernel() {
        let s = session();
        assert_eq!(s.current_emitter(), EmitterKind::Random);

        s.set_emitter(EmitterKind::Greedy).unwrap();
        assert_eq!(s.current_emitter(), EmitterKind::Greedy);

        s.set_emitter(EmitterKind::RbfKernel).unwrap();
        assert_eq!(s.current_emitter(), EmitterKind::RbfKernel);
        // Archive content survives the switch.
        s.set_emitter(EmitterKind::Human).unwrap();
        assert_eq!(s.current_emitter(), EmitterKind::Human);
    }

    #[test]
    fn test_population_round_trip_through_session() {
        let s = seeded_session();
        s.request_step(&[], 3).unwrap();
        let bytes = s.serialize_population().unwrap();
        let before = s.metric_values(BinMetric::Coverage, false, Population::Feasible);

        let other = session();
        other.load_population(&bytes).unwrap();
        let after = other.metric_values(BinMetric::Coverage, false, Population::Feasible);
        assert_eq!(before, after);
        assert_eq!(other.generation(), 0);
    }

    #[test]
    fn test_load_rejects_corrupt_payload() {
        let s = seeded_session();
        let coverage = s.metric_values(BinMetric::Coverage, false, Population::Feasible);
        assert!(s.load_population(b"{broken").is_err());
        assert_eq!(
            s.metric_values(BinMetric::Coverage, false, Population::Feasible),
            coverage
        );
    }

    #[test]
    fn test_export_elite_encodes_feasible_elite_only() {
        let s = seeded_session();
        let feasible_bin = s
            .valid_bins()
            .into_iter()
            .find(|&c| s.elite(c, Population::Feasible).is_some())
            .unwrap();
        let bytes = s.export_elite(feasible_bin).unwrap();
        assert!(!bytes.is_empty());
        assert!(!s.is_exporting());

        // A bin with no feasible elite has nothing to export.
        let empty = (0..4)
            .flat_map(|i| (0..4).map(move |j| (i, j)))
            .find(|&c| s.elite(c, Population::Feasible).is_none());
        if let Some(coords) = empty {
            assert!(matches!(
                s.export_elite(coords),
                Err(SessionError::NothingToExport(_, _))
            ));
        }
    }

    #[test]
    fn test_subdivide_through_session() {
        let s = seeded_session();
        s.subdivide((1, 1)).unwrap();
        assert_eq!(s.grid_shape(), (5, 5));
    }

    /// Tower domain whose ruleset can be marked invalid.
    struct GatedRules {
        inner: TowerDomain,
        broken: bool,
    }

    impl StructureDomain for GatedRules {
        type Phenotype = Tower;

        fn descriptors(&self) -> &[DescriptorSpec] {
            self.inner.descriptors()
        }
        fn objectives(&self) -> &[ObjectiveSpec] {
            self.inner.objectives()
        }
        fn generate(&self, rng: &mut StdRng) -> String {
            self.inner.generate(rng)
        }
        fn mutate(&self, genotype: &str, rng: &mut StdRng) -> String {
            self.inner.mutate(genotype, rng)
        }
        fn crossover(&self, a: &str, b: &str, rng: &mut StdRng) -> String {
            self.inner.crossover(a, b, rng)
        }
        fn realize(&self, genotype: &str, seed: u64) -> Result<Tower, DomainError> {
            self.inner.realize(genotype, seed)
        }
        fn is_feasible(&self, phenotype: &Tower) -> bool {
            self.inner.is_feasible(phenotype)
        }
        fn score_fitness(&self, phenotype: &Tower) -> Result<Vec<f64>, DomainError> {
            self.inner.score_fitness(phenotype)
        }
        fn score_behavior(&self, phenotype: &Tower, descriptor: DescriptorId) -> f64 {
            self.inner.score_behavior(phenotype, descriptor)
        }
        fn export(&self, phenotype: &Tower) -> Vec<u8> {
            self.inner.export(phenotype)
        }
        fn validate(&self) -> Result<(), DomainError> {
            if self.broken {
                Err(DomainError::RuleValidation("rule weights sum to 0".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_invalid_ruleset_is_rejected_and_prior_retained() {
        let config = EngineConfig {
            rng_seed: Some(5),
            ..EngineConfig::default()
        };
        let s = Session::new(
            Arc::new(GatedRules {
                inner: TowerDomain::new(),
                broken: false,
            }),
            config,
        )
        .unwrap();

        let result = s.replace_domain(Arc::new(GatedRules {
            inner: TowerDomain::new(),
            broken: true,
        }));
        assert!(matches!(result, Err(SessionError::RuleValidation(_))));

        // The session still works against the prior ruleset.
        s.request_reset().unwrap();
        assert!(!s.valid_bins().is_empty());

        s.replace_domain(Arc::new(GatedRules {
            inner: TowerDomain::new(),
            broken: false,
        }))
        .unwrap();
    }
}
