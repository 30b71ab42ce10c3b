//! Diff status classification.
//!
//! Turns a [`RepoDiff`] into [`DiffStatusCounts`]: per dataset, per part, the number of
//! inserts, updates and deletes. When a spatial filter is active, feature updates whose
//! *old* value falls outside the filter are counted as `primaryKeyConflicts` instead of
//! updates. The user could not see the original record, so editing "it" most likely
//! means they reused a primary key that already belongs to a hidden feature.
//!
//! Counts are sparse: a change type is only present when its count is positive. That
//! invariant is owned by [`ChangeTally::finish`], the only way to build [`ChangeCounts`].

use crate::core::diff::{DatasetPart, DeltaKind, RepoDiff};
use crate::core::spatial_filter::{SpatialFilter, SpatialFilterResolver};
use serde::Serialize;
use std::collections::BTreeMap;

/// Change types in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    Inserts,
    Updates,
    Deletes,
    PrimaryKeyConflicts,
}

impl ChangeType {
    pub const ALL: [ChangeType; 4] = [
        ChangeType::Inserts,
        ChangeType::Updates,
        ChangeType::Deletes,
        ChangeType::PrimaryKeyConflicts,
    ];

    /// Human readable label used in text output
    pub fn label(&self) -> &'static str {
        match self {
            ChangeType::Inserts => "inserts",
            ChangeType::Updates => "updates",
            ChangeType::Deletes => "deletes",
            ChangeType::PrimaryKeyConflicts => "primary key conflicts",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl From<DeltaKind> for ChangeType {
    fn from(kind: DeltaKind) -> Self {
        match kind {
            DeltaKind::Insert => ChangeType::Inserts,
            DeltaKind::Update => ChangeType::Updates,
            DeltaKind::Delete => ChangeType::Deletes,
        }
    }
}

/// Mutable accumulator for one dataset part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeTally {
    counts: [u64; 4],
}

impl ChangeTally {
    pub fn record(&mut self, kind: DeltaKind) {
        self.add(kind.into(), 1);
    }

    pub fn add(&mut self, change_type: ChangeType, n: u64) {
        self.counts[change_type.index()] += n;
    }

    /// Moves `n` updates into the primary key conflict bucket.
    ///
    /// `n` never exceeds the recorded updates: every conflict is itself an update delta.
    pub fn reclassify_updates_as_conflicts(&mut self, n: u64) {
        let updates = &mut self.counts[ChangeType::Updates.index()];
        debug_assert!(n <= *updates, "more conflicts ({n}) than updates ({updates})");
        *updates = updates.saturating_sub(n);
        self.add(ChangeType::PrimaryKeyConflicts, n);
    }

    /// Emits only positive counts
    pub fn finish(self) -> ChangeCounts {
        ChangeCounts(
            ChangeType::ALL
                .into_iter()
                .map(|t| (t, self.counts[t.index()]))
                .filter(|(_, n)| *n > 0)
                .collect(),
        )
    }
}

impl From<&ChangeCounts> for ChangeTally {
    fn from(counts: &ChangeCounts) -> Self {
        let mut tally = ChangeTally::default();
        for (change_type, n) in counts.iter() {
            tally.add(change_type, n);
        }
        tally
    }
}

/// Sparse change-type -> count mapping; never holds a zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeCounts(BTreeMap<ChangeType, u64>);

impl ChangeCounts {
    pub fn get(&self, change_type: ChangeType) -> Option<u64> {
        self.0.get(&change_type).copied()
    }

    /// Positive counts in display order
    pub fn iter(&self) -> impl Iterator<Item = (ChangeType, u64)> + '_ {
        self.0.iter().map(|(t, n)| (*t, *n))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// dataset path -> part name -> counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiffStatusCounts(BTreeMap<String, BTreeMap<String, ChangeCounts>>);

impl DiffStatusCounts {
    pub fn get(&self, dataset: &str, part: &str) -> Option<&ChangeCounts> {
        self.0.get(dataset)?.get(part)
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, ChangeCounts>)> {
        self.0.iter().map(|(path, parts)| (path.as_str(), parts))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stores `counts`, dropping the part (and then the dataset) when empty
    pub fn set(&mut self, dataset: &str, part: &str, counts: ChangeCounts) {
        if counts.is_empty() {
            if let Some(parts) = self.0.get_mut(dataset) {
                parts.remove(part);
                if parts.is_empty() {
                    self.0.remove(dataset);
                }
            }
            return;
        }
        self.0
            .entry(dataset.to_string())
            .or_default()
            .insert(part.to_string(), counts);
    }
}

/// Classifies a working copy diff against the repository's spatial filter
pub struct DiffStatusClassifier<'a> {
    spatial_filter: &'a SpatialFilter,
    resolver: &'a dyn SpatialFilterResolver,
}

impl<'a> DiffStatusClassifier<'a> {
    pub fn new(spatial_filter: &'a SpatialFilter, resolver: &'a dyn SpatialFilterResolver) -> Self {
        Self {
            spatial_filter,
            resolver,
        }
    }

    pub fn classify(&self, diff: &RepoDiff) -> DiffStatusCounts {
        let mut counts = diff.type_counts();

        // Without a restricting filter every old value was visible
        if self.spatial_filter.is_match_all() {
            return counts;
        }

        let feature = DatasetPart::Feature.as_str();
        for (ds_path, ds_diff) in diff.datasets() {
            let Some(feature_deltas) = ds_diff.part(feature) else {
                continue;
            };

            let (old_filter, _new_filter) = self.resolver.filters_for(ds_path, ds_diff);
            let conflicts = feature_deltas
                .values()
                .filter(|d| d.kind == DeltaKind::Update)
                .filter(|d| !old_filter.matches_delta_value(d.old.as_ref()))
                .count() as u64;

            if conflicts == 0 {
                continue;
            }
            log::debug!("{ds_path}: {conflicts} updates reclassified as primary key conflicts");

            let mut tally = counts
                .get(ds_path, feature)
                .map(ChangeTally::from)
                .unwrap_or_default();
            tally.reclassify_updates_as_conflicts(conflicts);
            counts.set(ds_path, feature, tally.finish());
        }

        counts
    }
}

/// Convenience wrapper around [`DiffStatusClassifier::classify`]
pub fn classify(
    diff: &RepoDiff,
    spatial_filter: &SpatialFilter,
    resolver: &dyn SpatialFilterResolver,
) -> DiffStatusCounts {
    DiffStatusClassifier::new(spatial_filter, resolver).classify(diff)
}
