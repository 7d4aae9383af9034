//! Persisted population snapshots.
//!
//! A snapshot is a sequence of per-bin records carrying the grid geometry
//! and the full serialized state of every candidate in both populations.
//! Elites and novelty flags are never stored; loading reconstructs them as
//! derived quantities.

use serde::{Deserialize, Serialize};

/// Serialized archive population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    /// Catalog indices of the two active behavior descriptors.
    pub active_descriptors: (usize, usize),
    /// Grid shape along (axis 0, axis 1).
    pub shape: (usize, usize),
    /// Per-axis bin widths in descriptor space.
    pub widths: (Vec<f64>, Vec<f64>),
    /// Per-bin records, one per grid cell.
    pub bins: Vec<BinRecord>,
}

/// One grid cell's serialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinRecord {
    /// Grid coordinate (axis 0, axis 1).
    pub coords: (usize, usize),
    /// Descriptor-space width along each axis.
    pub size: (f64, f64),
    /// Feasible population.
    pub feasible: Vec<CandidateRecord>,
    /// Infeasible population.
    pub infeasible: Vec<CandidateRecord>,
}

/// One candidate's serialized state. The phenotype is not persisted; it is
/// re-realized on demand from the genotype and seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub genotype: String,
    pub fitness: Vec<f64>,
    pub behavior: (f64, f64),
    pub feasible: bool,
    pub age: u32,
    pub seed: u64,
    pub color: [f32; 3],
}

impl PopulationSnapshot {
    /// Encode to a JSON byte payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(SnapshotError::Malformed)
    }

    /// Decode and structurally validate a JSON byte payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_slice(bytes).map_err(SnapshotError::Malformed)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Structural consistency checks, independent of any archive.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let (nx, ny) = self.shape;
        if nx == 0 || ny == 0 {
            return Err(SnapshotError::Inconsistent("empty grid shape"));
        }
        if self.widths.0.len() != nx || self.widths.1.len() != ny {
            return Err(SnapshotError::Inconsistent(
                "bin width arrays do not match the grid shape",
            ));
        }
        if self.bins.len() != nx * ny {
            return Err(SnapshotError::Inconsistent(
                "bin record count does not match the grid shape",
            ));
        }
        for record in &self.bins {
            let (i, j) = record.coords;
            if i >= nx || j >= ny {
                return Err(SnapshotError::Inconsistent(
                    "bin record coordinate outside the grid",
                ));
            }
            if record.feasible.iter().any(|c| !c.feasible)
                || record.infeasible.iter().any(|c| c.feasible)
            {
                return Err(SnapshotError::Inconsistent(
                    "candidate feasibility flag disagrees with its population",
                ));
            }
        }
        Ok(())
    }
}

/// Snapshot encode/decode errors. A failed load is atomic: the archive it
/// was aimed at is left unmodified.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("snapshot inconsistent: {0}")]
    Inconsistent(&'static str),
    #[error("snapshot does not fit this archive: {0}")]
    Incompatible(&'static str),
}
