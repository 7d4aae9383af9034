//! Observation store feeding the surrogate estimator.
//!
//! Observations are (feature vector → scalar label) pairs. Colliding keys
//! are combined through the configured merge policy instead of overwritten,
//! so repeated observations of symmetric or near-duplicate candidates keep
//! contributing information. Entries are never deleted except on full reset.

use std::collections::BTreeMap;

use crate::schema::MergePolicy;

/// Bit-exact key for a feature vector.
///
/// Keys compare and order by the IEEE-754 bit patterns of their components,
/// which makes buffer iteration deterministic across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureKey(Vec<u64>);

impl FeatureKey {
    /// Build a key from a feature vector.
    pub fn new(features: &[f64]) -> Self {
        Self(features.iter().map(|f| f.to_bits()).collect())
    }
}

/// One merged observation.
#[derive(Debug, Clone)]
pub struct BufferEntry {
    /// The observed feature vector.
    pub features: Vec<f64>,
    /// Merged label value.
    pub value: f64,
    /// Number of observations merged into this entry.
    pub count: u32,
}

/// Key-value store of observed (feature vector → label) pairs.
#[derive(Debug, Clone)]
pub struct Buffer {
    entries: BTreeMap<FeatureKey, BufferEntry>,
    policy: MergePolicy,
}

impl Buffer {
    /// Create an empty buffer with the given merge policy.
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            policy,
        }
    }

    /// Record an observation, merging with any existing entry at the same
    /// key.
    pub fn insert(&mut self, features: &[f64], value: f64) {
        let key = FeatureKey::new(features);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.value = match self.policy {
                    MergePolicy::Mean => {
                        (entry.value * f64::from(entry.count) + value)
                            / f64::from(entry.count + 1)
                    }
                    MergePolicy::Max => entry.value.max(value),
                    MergePolicy::Newest => value,
                };
                entry.count += 1;
            }
            None => {
                self.entries.insert(
                    key,
                    BufferEntry {
                        features: features.to_vec(),
                        value,
                        count: 1,
                    },
                );
            }
        }
    }

    /// Look up the merged entry for a feature vector.
    pub fn get(&self, features: &[f64]) -> Option<&BufferEntry> {
        self.entries.get(&FeatureKey::new(features))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no observations.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in deterministic key order.
    pub fn entries(&self) -> impl Iterator<Item = &BufferEntry> {
        self.entries.values()
    }

    /// Full contents as a regression training set, in deterministic order.
    pub fn training_set(&self) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut inputs = Vec::with_capacity(self.entries.len());
        let mut targets = Vec::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            inputs.push(entry.features.clone());
            targets.push(entry.value);
        }
        (inputs, targets)
    }

    /// Discard all observations.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_insert_new_key_creates_entry() {
        let mut buffer = Buffer::new(MergePolicy::Mean);
        buffer.insert(&[0.5, 0.5], 0.8);

        let entry = buffer.get(&[0.5, 0.5]).unwrap();
        assert_eq!(entry.count, 1);
        assert!((entry.value - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_mean_merge_accumulates_running_mean() {
        let mut buffer = Buffer::new(MergePolicy::Mean);
        buffer.insert(&[0.1], 1.0);
        buffer.insert(&[0.1], 0.0);
        buffer.insert(&[0.1], 0.5);

        let entry = buffer.get(&[0.1]).unwrap();
        assert_eq!(entry.count, 3);
        assert!((entry.value - 0.5).abs() < 1e-12);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_max_and_newest_policies() {
        let mut max_buffer = Buffer::new(MergePolicy::Max);
        max_buffer.insert(&[0.1], 0.3);
        max_buffer.insert(&[0.1], 0.9);
        max_buffer.insert(&[0.1], 0.5);
        assert!((max_buffer.get(&[0.1]).unwrap().value - 0.9).abs() < 1e-12);

        let mut newest_buffer = Buffer::new(MergePolicy::Newest);
        newest_buffer.insert(&[0.1], 0.3);
        newest_buffer.insert(&[0.1], 0.5);
        assert!((newest_buffer.get(&[0.1]).unwrap().value - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_training_set_order_is_deterministic() {
        let mut a = Buffer::new(MergePolicy::Mean);
        a.insert(&[0.9], 1.0);
        a.insert(&[0.1], 2.0);
        a.insert(&[0.5], 3.0);

        let mut b = Buffer::new(MergePolicy::Mean);
        b.insert(&[0.5], 3.0);
        b.insert(&[0.9], 1.0);
        b.insert(&[0.1], 2.0);

        assert_eq!(a.training_set().0, b.training_set().0);
        assert_eq!(a.training_set().1, b.training_set().1);
    }

    proptest! {
        /// Mean-merge is order-independent: any permutation of the same
        /// observations yields the same merged value.
        #[test]
        fn prop_mean_merge_is_commutative(
            values in prop::collection::vec(-10.0f64..10.0, 1..12),
            swap_a in 0usize..12,
            swap_b in 0usize..12,
        ) {
            let mut permuted = values.clone();
            let a = swap_a % permuted.len();
            let b = swap_b % permuted.len();
            permuted.swap(a, b);

            let mut left = Buffer::new(MergePolicy::Mean);
            let mut right = Buffer::new(MergePolicy::Mean);
            for v in &values {
                left.insert(&[0.25, 0.75], *v);
            }
            for v in &permuted {
                right.insert(&[0.25, 0.75], *v);
            }

            let lv = left.get(&[0.25, 0.75]).unwrap().value;
            let rv = right.get(&[0.25, 0.75]).unwrap().value;
            prop_assert!((lv - rv).abs() < 1e-9);
        }
    }
}
