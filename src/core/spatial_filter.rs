//! Spatial filters: the stored repository configuration and the resolved predicate.
//!
//! [`SpatialFilterConfig`] is the filter exactly as stored in repository config. It is
//! attached to the status report verbatim and only interpreted when rendered, so a
//! malformed filter never prevents status from being shown. Interpretation returns
//! `Result<_, FilterDiagnostic>`; each renderer picks its own fallback.
//!
//! [`SpatialFilter`] is the resolved form used for classification. Each dataset gets
//! its own version of the repository filter, reprojected into the dataset's CRS, from
//! a [`SpatialFilterResolver`].

use crate::core::crs::{Crs, Reprojector};
use crate::core::diff::{DatasetDiff, DatasetPart};
use crate::core::geometry::{Coord, Envelope, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Feature columns searched for a geometry, in order
const GEOMETRY_COLUMNS: &[&str] = &["geom", "geometry"];

/// Why a stored spatial filter cannot be used
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDiagnostic {
    #[error("Repo config contains unparseable spatial filter")]
    UnparseableGeometry,

    #[error("Repo config contains spatial filter with invalid CRS")]
    InvalidCrs,

    #[error("Repo config contains unworkable spatial filter - can't reproject spatial filter into EPSG:4326")]
    Unworkable,
}

/// Spatial filter as stored in repository config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub geometry: String,
    pub crs: String,
}

impl SpatialFilterConfig {
    /// "spatial filter", or "spatial filter at reference <ref>"
    pub fn description(&self) -> String {
        match &self.reference {
            Some(reference) => format!("spatial filter at reference {reference}"),
            None => "spatial filter".to_string(),
        }
    }

    pub fn parse_geometry(&self) -> Result<Geometry, FilterDiagnostic> {
        let geometry = Geometry::from_string(&self.geometry, &self.description()).map_err(|e| {
            log::debug!("{e}");
            FilterDiagnostic::UnparseableGeometry
        })?;
        if geometry.is_empty() {
            return Err(FilterDiagnostic::UnparseableGeometry);
        }
        Ok(geometry)
    }

    pub fn parse_crs(&self) -> Result<Crs, FilterDiagnostic> {
        Crs::parse(&self.crs, &self.description()).map_err(|e| {
            log::debug!("{e}");
            FilterDiagnostic::InvalidCrs
        })
    }

    /// The same filter with its geometry re-encoded as hex WKB
    pub fn canonicalize(&self) -> Result<SpatialFilterConfig, FilterDiagnostic> {
        let geometry = self.parse_geometry()?;
        Ok(SpatialFilterConfig {
            geometry: geometry.to_hex_wkb(),
            ..self.clone()
        })
    }

    /// Bounding box of the filter in EPSG:4326
    pub fn wgs84_envelope(&self, reprojector: &dyn Reprojector) -> Result<Envelope, FilterDiagnostic> {
        let geometry = self.parse_geometry()?;
        let crs = self.parse_crs()?;
        let projected = reprojector.to_wgs84(&geometry, &crs).map_err(|e| {
            log::debug!("{e}");
            FilterDiagnostic::Unworkable
        })?;
        projected.envelope().ok_or(FilterDiagnostic::Unworkable)
    }

    pub fn resolve(&self) -> Result<SpatialFilter, FilterDiagnostic> {
        let geometry = self.parse_geometry()?;
        let crs = self.parse_crs()?;
        Ok(SpatialFilter::region(geometry, crs))
    }
}

/// The filter polygon plus its precomputed bounding box
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFilter {
    geometry: Geometry,
    envelope: Envelope,
    crs: Crs,
}

impl RegionFilter {
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpatialFilter {
    MatchAll,
    Region(RegionFilter),
}

impl SpatialFilter {
    /// An empty geometry cannot restrict anything and resolves to [`SpatialFilter::MatchAll`]
    pub fn region(geometry: Geometry, crs: Crs) -> Self {
        match geometry.envelope() {
            Some(envelope) => SpatialFilter::Region(RegionFilter {
                geometry,
                envelope,
                crs,
            }),
            None => SpatialFilter::MatchAll,
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, SpatialFilter::MatchAll)
    }

    /// Whether a feature value would be visible through this filter.
    ///
    /// Values without a (parseable) geometry are always visible.
    pub fn matches_delta_value(&self, value: Option<&Value>) -> bool {
        let SpatialFilter::Region(region) = self else {
            return true;
        };
        let Some(geometry) = value.and_then(feature_geometry) else {
            return true;
        };
        region.matches(&geometry)
    }
}

impl RegionFilter {
    fn matches(&self, geometry: &Geometry) -> bool {
        let Some(envelope) = geometry.envelope() else {
            return true;
        };
        if !self.envelope.intersects(&envelope) {
            return false;
        }
        // Envelope overlap is exact enough for everything but points, which are cheap
        // to test against the filter polygons directly.
        match geometry {
            Geometry::Point(Some(point)) => self.contains_point(*point),
            Geometry::MultiPoint(points) => points.iter().any(|p| self.contains_point(*p)),
            _ => true,
        }
    }

    fn contains_point(&self, point: Coord) -> bool {
        match &self.geometry {
            Geometry::Polygon(rings) => polygon_contains(rings, point),
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().any(|rings| polygon_contains(rings, point))
            }
            // Non-areal filters fall back to the envelope test already passed
            _ => true,
        }
    }
}

fn feature_geometry(value: &Value) -> Option<Geometry> {
    let object = value.as_object()?;
    let raw = GEOMETRY_COLUMNS
        .iter()
        .find_map(|column| object.get(*column))?
        .as_str()?;
    match Geometry::from_string(raw, "feature geometry") {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            log::debug!("Treating feature as visible: {e}");
            None
        }
    }
}

/// Even-odd rule over the exterior ring and holes; boundary points count as inside
fn polygon_contains(rings: &[Vec<Coord>], point: Coord) -> bool {
    let mut inside = false;
    for ring in rings {
        for (a, b) in ring.iter().zip(ring.iter().cycle().skip(1)) {
            if on_segment(*a, *b, point) {
                return true;
            }
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
    }
    inside
}

fn on_segment(a: Coord, b: Coord, p: Coord) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    cross.abs() < 1e-12
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Supplies the filters to use for a dataset before and after the diff
pub trait SpatialFilterResolver {
    fn filters_for(&self, ds_path: &str, ds_diff: &DatasetDiff) -> (SpatialFilter, SpatialFilter);
}

/// Item prefix of a dataset's CRS definitions inside its `meta` part
const CRS_ITEM_PREFIX: &str = "crs/";

/// Reprojects the repository filter into the CRS of each dataset.
///
/// A dataset without a known CRS gets the repository filter as is. A dataset whose
/// CRS cannot be parsed, or that the filter cannot be reprojected into, gets
/// [`SpatialFilter::MatchAll`].
pub struct RepoFilterResolver<'a> {
    filter: &'a SpatialFilter,
    reprojector: &'a dyn Reprojector,
    dataset_crs: BTreeMap<String, String>,
}

impl<'a> RepoFilterResolver<'a> {
    pub fn new(filter: &'a SpatialFilter, reprojector: &'a dyn Reprojector) -> Self {
        Self {
            filter,
            reprojector,
            dataset_crs: BTreeMap::new(),
        }
    }

    /// Records the CRS definition a dataset has at HEAD
    pub fn with_dataset_crs(mut self, ds_path: impl Into<String>, definition: impl Into<String>) -> Self {
        self.dataset_crs.insert(ds_path.into(), definition.into());
        self
    }

    fn filter_in_crs(&self, ds_path: &str, definition: Option<&str>) -> SpatialFilter {
        let SpatialFilter::Region(region) = self.filter else {
            return SpatialFilter::MatchAll;
        };
        let Some(definition) = definition else {
            return self.filter.clone();
        };

        let target = match Crs::parse(definition, &format!("dataset {ds_path}")) {
            Ok(crs) => crs,
            Err(e) => {
                log::warn!("Not applying spatial filter to {ds_path}: {e}");
                return SpatialFilter::MatchAll;
            }
        };
        if region.crs.is_equivalent(&target) {
            return self.filter.clone();
        }

        match self.reprojector.transform(&region.geometry, &region.crs, &target) {
            Ok(geometry) => {
                log::debug!("Reprojected spatial filter from {} to {target} for {ds_path}", region.crs);
                SpatialFilter::region(geometry, target)
            }
            Err(e) => {
                log::warn!("Not applying spatial filter to {ds_path}: {e}");
                SpatialFilter::MatchAll
            }
        }
    }
}

/// The CRS definition a diff writes to the dataset, if it changes it
fn changed_crs(ds_diff: &DatasetDiff) -> Option<Option<&str>> {
    let meta = ds_diff.part(DatasetPart::Meta.as_str())?;
    let (_, delta) = meta
        .iter()
        .find(|(item, _)| item.starts_with(CRS_ITEM_PREFIX))?;
    Some(delta.new.as_ref().and_then(Value::as_str))
}

impl SpatialFilterResolver for RepoFilterResolver<'_> {
    fn filters_for(&self, ds_path: &str, ds_diff: &DatasetDiff) -> (SpatialFilter, SpatialFilter) {
        let old_crs = self.dataset_crs.get(ds_path).map(String::as_str);
        let new_crs = changed_crs(ds_diff).unwrap_or(old_crs);

        let old_filter = self.filter_in_crs(ds_path, old_crs);
        let new_filter = if new_crs == old_crs {
            old_filter.clone()
        } else {
            self.filter_in_crs(ds_path, new_crs)
        };
        (old_filter, new_filter)
    }
}
