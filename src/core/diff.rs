//! Working copy diff model.
//!
//! A [`RepoDiff`] is a snapshot of changes keyed by dataset path, then by dataset part
//! (`meta`, `feature`, `tile`), then by item key. Each item carries a [`Delta`] with the
//! old and/or new value of the item. Values are JSON; feature records are objects whose
//! geometry column holds WKT or hex WKB.
//!
//! Dataset items are stored in the repository tree below a hidden dataset directory:
//! `<dataset path>/.<kind>-dataset[.vN]/<part>/<item>`. [`DatasetItemPath`] decodes
//! those paths.

use crate::core::diff_status::{ChangeTally, DiffStatusCounts};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The dataset parts understood by status output, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetPart {
    Meta,
    Feature,
    Tile,
}

impl DatasetPart {
    pub const DISPLAY_ORDER: [DatasetPart; 3] =
        [DatasetPart::Meta, DatasetPart::Feature, DatasetPart::Tile];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetPart::Meta => "meta",
            DatasetPart::Feature => "feature",
            DatasetPart::Tile => "tile",
        }
    }
}

impl fmt::Display for DatasetPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Insert,
    Update,
    Delete,
}

/// A change to a single dataset item
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub kind: DeltaKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl Delta {
    pub fn insert(new: Value) -> Self {
        Self {
            kind: DeltaKind::Insert,
            old: None,
            new: Some(new),
        }
    }

    pub fn update(old: Value, new: Value) -> Self {
        Self {
            kind: DeltaKind::Update,
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn delete(old: Value) -> Self {
        Self {
            kind: DeltaKind::Delete,
            old: Some(old),
            new: None,
        }
    }
}

/// Deltas for one dataset: part name -> item key -> delta
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetDiff {
    parts: BTreeMap<String, BTreeMap<String, Delta>>,
}

impl DatasetDiff {
    pub fn add(&mut self, part: impl Into<String>, key: impl Into<String>, delta: Delta) {
        self.parts
            .entry(part.into())
            .or_default()
            .insert(key.into(), delta);
    }

    pub fn part(&self, part: &str) -> Option<&BTreeMap<String, Delta>> {
        self.parts.get(part)
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Delta>)> {
        self.parts.iter().map(|(name, deltas)| (name.as_str(), deltas))
    }

    pub fn is_empty(&self) -> bool {
        self.parts.values().all(BTreeMap::is_empty)
    }
}

/// A diff snapshot across every dataset in the repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoDiff {
    datasets: BTreeMap<String, DatasetDiff>,
}

impl RepoDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset_mut(&mut self, path: impl Into<String>) -> &mut DatasetDiff {
        self.datasets.entry(path.into()).or_default()
    }

    pub fn dataset(&self, path: &str) -> Option<&DatasetDiff> {
        self.datasets.get(path)
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &DatasetDiff)> {
        self.datasets.iter().map(|(path, diff)| (path.as_str(), diff))
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.values().all(DatasetDiff::is_empty)
    }

    /// Counts deltas by kind for every dataset part, one count per delta
    pub fn type_counts(&self) -> DiffStatusCounts {
        let mut counts = DiffStatusCounts::default();
        for (ds_path, ds_diff) in self.datasets() {
            for (part, deltas) in ds_diff.parts() {
                let mut tally = ChangeTally::default();
                for delta in deltas.values() {
                    tally.record(delta.kind);
                }
                counts.set(ds_path, part, tally.finish());
            }
        }
        counts
    }
}

/// A repository path decoded into dataset, part and item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetItemPath {
    pub dataset: String,
    pub part: String,
    pub item: String,
}

impl DatasetItemPath {
    /// Decodes `<dataset>/.<kind>-dataset[.vN]/<part>/<item...>`.
    ///
    /// Returns `None` for paths that are not inside a dataset, such as top-level
    /// repository files, or that name the dataset directory itself.
    pub fn parse(path: &str) -> Option<Self> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let marker = components.iter().position(|c| is_dataset_dir(c))?;
        if marker == 0 || components.len() < marker + 3 {
            return None;
        }
        Some(Self {
            dataset: components[..marker].join("/"),
            part: components[marker + 1].to_string(),
            item: components[marker + 2..].join("/"),
        })
    }
}

/// `.table-dataset`, `.sno-dataset`, `.point-cloud-dataset.v1`, ...
pub fn is_dataset_dir(component: &str) -> bool {
    let Some(name) = component.strip_prefix('.') else {
        return false;
    };
    let name = match name.rsplit_once(".v") {
        Some((base, version)) if version.chars().all(|c| c.is_ascii_digit()) => base,
        _ => name,
    };
    name.len() > "-dataset".len() && name.ends_with("-dataset")
}

/// Decodes a stored item value: JSON when possible, otherwise text
pub fn decode_value(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
