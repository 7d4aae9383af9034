//! Grid cells holding the two bounded FI-2Pop populations.

use serde::{Deserialize, Serialize};

use crate::domain::ObjectiveSpec;
use crate::search::candidate::{elite_cmp, Candidate, Population};

/// Per-population "elite changed" flags, cleared at the start of each
/// generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewEliteFlags {
    pub feasible: bool,
    pub infeasible: bool,
}

impl NewEliteFlags {
    /// Flag for one population.
    pub fn get(&self, pop: Population) -> bool {
        match pop {
            Population::Feasible => self.feasible,
            Population::Infeasible => self.infeasible,
        }
    }

    fn set(&mut self, pop: Population, value: bool) {
        match pop {
            Population::Feasible => self.feasible = value,
            Population::Infeasible => self.infeasible = value,
        }
    }
}

/// Outcome of inserting a candidate into a bin population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Accepted; the population was below capacity.
    Inserted,
    /// Accepted; the lowest-fitness member was evicted to make room.
    Evicted,
    /// Rejected; the population is full and the candidate is not strictly
    /// better than its worst member.
    Rejected,
}

impl InsertOutcome {
    /// Whether the candidate is now a member of the bin.
    pub fn accepted(self) -> bool {
        !matches!(self, InsertOutcome::Rejected)
    }
}

/// Per-bin metric selectable by collaborators for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinMetric {
    /// Combined weighted fitness.
    Fitness,
    /// Candidate age in generations.
    Age,
    /// Population occupancy.
    Coverage,
}

/// One cell of the archive grid.
///
/// Feasible and infeasible candidates are held in separate bounded
/// populations that never compete: an infeasible candidate can hold the
/// infeasible elite and keep breeding toward repair, while only feasible
/// elites are eligible for export.
#[derive(Debug, Clone)]
pub struct MapBin<P> {
    /// Grid coordinate (axis 0, axis 1).
    pub coords: (usize, usize),
    /// Descriptor-space width along each axis.
    pub size: (f64, f64),
    /// Transient per-population elite-change flags.
    pub new_elite: NewEliteFlags,
    capacity: usize,
    feasible: Vec<Candidate<P>>,
    infeasible: Vec<Candidate<P>>,
    // Elite ids recorded at the last scan, for change detection.
    scanned_elites: (Option<u64>, Option<u64>),
}

impl<P> MapBin<P> {
    /// Create an empty bin.
    pub fn new(coords: (usize, usize), size: (f64, f64), capacity: usize) -> Self {
        Self {
            coords,
            size,
            new_elite: NewEliteFlags::default(),
            capacity,
            feasible: Vec::new(),
            infeasible: Vec::new(),
            scanned_elites: (None, None),
        }
    }

    /// Maximum members per population.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Members of one population.
    pub fn members(&self, pop: Population) -> &[Candidate<P>] {
        match pop {
            Population::Feasible => &self.feasible,
            Population::Infeasible => &self.infeasible,
        }
    }

    /// Mutable iteration over one population. Genotype, phenotype, and
    /// feasibility stay encapsulated in [`Candidate`], so membership
    /// invariants cannot be broken from here.
    pub fn iter_mut(&mut self, pop: Population) -> impl Iterator<Item = &mut Candidate<P>> {
        match pop {
            Population::Feasible => self.feasible.iter_mut(),
            Population::Infeasible => self.infeasible.iter_mut(),
        }
    }

    /// Remove and return all members of one population.
    pub fn drain(&mut self, pop: Population) -> Vec<Candidate<P>> {
        match pop {
            Population::Feasible => std::mem::take(&mut self.feasible),
            Population::Infeasible => std::mem::take(&mut self.infeasible),
        }
    }

    /// Member count of one population.
    pub fn len(&self, pop: Population) -> usize {
        self.members(pop).len()
    }

    /// Whether one population has members.
    pub fn non_empty(&self, pop: Population) -> bool {
        !self.members(pop).is_empty()
    }

    /// Whether both populations are empty.
    pub fn is_empty(&self) -> bool {
        self.feasible.is_empty() && self.infeasible.is_empty()
    }

    /// Insert a candidate into the population matching its feasibility flag.
    ///
    /// Below capacity every candidate is accepted. At capacity, the member
    /// with the lowest weighted fitness is evicted only if the incoming
    /// candidate is strictly better; otherwise the insertion is rejected.
    pub fn insert(
        &mut self,
        candidate: Candidate<P>,
        objectives: &[ObjectiveSpec],
    ) -> InsertOutcome {
        let pop = candidate.population();
        let prior_elite = self.elite(pop, objectives).map(|e| e.id);

        let outcome = {
            let members = match pop {
                Population::Feasible => &mut self.feasible,
                Population::Infeasible => &mut self.infeasible,
            };
            if members.len() < self.capacity {
                members.push(candidate);
                InsertOutcome::Inserted
            } else {
                let worst = members
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| elite_cmp(a, b, objectives))
                    .map(|(i, c)| (i, c.weighted_fitness(objectives)));
                match worst {
                    Some((idx, worst_fitness))
                        if candidate.weighted_fitness(objectives) > worst_fitness =>
                    {
                        members.swap_remove(idx);
                        members.push(candidate);
                        InsertOutcome::Evicted
                    }
                    _ => InsertOutcome::Rejected,
                }
            }
        };

        if outcome.accepted() {
            let elite_now = self.elite(pop, objectives).map(|e| e.id);
            if elite_now != prior_elite {
                self.new_elite.set(pop, true);
            }
        }
        outcome
    }

    /// The elite of one population: maximum weighted fitness, deterministic
    /// tie-break (see [`elite_cmp`]).
    pub fn elite(&self, pop: Population, objectives: &[ObjectiveSpec]) -> Option<&Candidate<P>> {
        self.members(pop)
            .iter()
            .max_by(|a, b| elite_cmp(a, b, objectives))
    }

    /// Clear both `new_elite` flags for a new generation.
    pub fn clear_new_elite(&mut self) {
        self.new_elite = NewEliteFlags::default();
    }

    /// Rescan one population's elite, flagging it as new when it differs
    /// from the elite recorded at the previous scan.
    pub fn rescan_elite(&mut self, pop: Population, objectives: &[ObjectiveSpec]) {
        let current = self.elite(pop, objectives).map(|e| e.id);
        let recorded = match pop {
            Population::Feasible => &mut self.scanned_elites.0,
            Population::Infeasible => &mut self.scanned_elites.1,
        };
        if current != *recorded {
            *recorded = current;
            if current.is_some() {
                self.new_elite.set(pop, true);
            }
        }
    }

    /// Metric value for display.
    ///
    /// `Fitness` and `Age` report the elite's value, or the population mean
    /// when `use_mean` is set; an empty population reports zero. `Coverage`
    /// reports the member count, or the occupancy fraction when `use_mean`
    /// is set.
    pub fn metric(
        &self,
        metric: BinMetric,
        use_mean: bool,
        pop: Population,
        objectives: &[ObjectiveSpec],
    ) -> f64 {
        let members = self.members(pop);
        match metric {
            BinMetric::Fitness => {
                if use_mean {
                    mean(members.iter().map(|c| c.weighted_fitness(objectives)))
                } else {
                    self.elite(pop, objectives)
                        .map(|e| e.weighted_fitness(objectives))
                        .unwrap_or(0.0)
                }
            }
            BinMetric::Age => {
                if use_mean {
                    mean(members.iter().map(|c| f64::from(c.age)))
                } else {
                    self.elite(pop, objectives)
                        .map(|e| f64::from(e.age))
                        .unwrap_or(0.0)
                }
            }
            BinMetric::Coverage => {
                if use_mean {
                    members.len() as f64 / self.capacity as f64
                } else {
                    members.len() as f64
                }
            }
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count > 0 { sum / count as f64 } else { 0.0 }
}
