//! Coordinate reference system parsing and reprojection.
//!
//! Spatial filters are stored with a CRS definition, either an authority string
//! (`EPSG:2193`) or a WKT definition carrying an authority clause. Filters are
//! reprojected into each dataset's CRS for matching, and into WGS84 for the envelope
//! shown by `status`. [`ProjReprojector`] resolves EPSG codes through
//! `crs-definitions` and transforms with `proj4rs`.

use crate::core::error::CrsError;
use crate::core::geometry::{Coord, Geometry};
use proj4rs::proj::Proj;
use std::fmt;

const CRS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsIdentifier {
    Epsg(u32),
    Crs84,
    /// Valid definition without an authority code we can recognise
    Custom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    definition: String,
    identifier: CrsIdentifier,
}

impl Crs {
    pub fn wgs84() -> Self {
        Self {
            definition: "EPSG:4326".to_string(),
            identifier: CrsIdentifier::Epsg(4326),
        }
    }

    /// Parses an authority string or WKT definition.
    pub fn parse(definition: &str, context: &str) -> Result<Crs, CrsError> {
        let trimmed = definition.trim();
        let invalid = || CrsError::invalid(context, trimmed);

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let upper = trimmed.to_ascii_uppercase();
        let identifier = if let Some(code) = upper.strip_prefix("EPSG:") {
            CrsIdentifier::Epsg(code.trim().parse().map_err(|_| invalid())?)
        } else if matches!(upper.as_str(), "CRS84" | "OGC:CRS84" | "CRS:84") {
            CrsIdentifier::Crs84
        } else if is_wkt_crs(&upper) {
            if !balanced_brackets(&upper) {
                return Err(invalid());
            }
            wkt_authority_code(&upper)
                .map(CrsIdentifier::Epsg)
                .unwrap_or(CrsIdentifier::Custom)
        } else {
            return Err(invalid());
        };

        Ok(Crs {
            definition: trimmed.to_string(),
            identifier,
        })
    }

    pub fn identifier(&self) -> CrsIdentifier {
        self.identifier
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Whether coordinates in both systems can be compared without transforming
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        use CrsIdentifier::*;
        match (self.identifier, other.identifier) {
            (Custom, _) | (_, Custom) => self.definition == other.definition,
            (Crs84, Epsg(4326)) | (Epsg(4326), Crs84) => true,
            (a, b) => a == b,
        }
    }

    /// The proj4 definition of this system, when it is known
    fn proj_definition(&self) -> Option<&'static str> {
        match self.identifier {
            CrsIdentifier::Crs84 => Some(CRS84_PROJ),
            CrsIdentifier::Epsg(code) => u16::try_from(code)
                .ok()
                .and_then(crs_definitions::from_code)
                .map(|def| def.proj4),
            CrsIdentifier::Custom => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identifier {
            CrsIdentifier::Epsg(code) => write!(f, "EPSG:{code}"),
            CrsIdentifier::Crs84 => write!(f, "OGC:CRS84"),
            CrsIdentifier::Custom => write!(f, "custom CRS"),
        }
    }
}

fn is_wkt_crs(upper: &str) -> bool {
    const ROOTS: &[&str] = &[
        "GEOGCS[", "PROJCS[", "GEOCCS[", "COMPD_CS[", "GEOGCRS[", "PROJCRS[", "GEODCRS[",
        "BASEGEOGCRS[", "COMPOUNDCRS[",
    ];
    ROOTS.iter().any(|root| upper.starts_with(root))
}

fn balanced_brackets(s: &str) -> bool {
    let mut depth: i64 = 0;
    for ch in s.chars() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// The outermost authority clause is the last one in the string, e.g.
/// `AUTHORITY["EPSG","2193"]` (WKT1) or `ID["EPSG",2193]` (WKT2).
fn wkt_authority_code(upper: &str) -> Option<u32> {
    let candidates = [upper.rfind("AUTHORITY[\"EPSG\""), upper.rfind("ID[\"EPSG\"")];
    let start = candidates.into_iter().flatten().max()?;
    let rest = &upper[start..];
    let comma = rest.find(',')?;
    let close = rest.find(']')?;
    rest.get(comma + 1..close)?
        .trim()
        .trim_matches('"')
        .parse()
        .ok()
}

pub trait Reprojector {
    fn transform(&self, geometry: &Geometry, source: &Crs, target: &Crs)
        -> Result<Geometry, CrsError>;

    fn to_wgs84(&self, geometry: &Geometry, source: &Crs) -> Result<Geometry, CrsError> {
        self.transform(geometry, source, &Crs::wgs84())
    }
}

/// Reprojects between any systems `crs-definitions` knows a proj4 string for
#[derive(Debug, Default, Clone, Copy)]
pub struct ProjReprojector;

/// A projection plus whether it works in degrees, which proj4rs expects in radians
struct Projection {
    proj: Proj,
    geographic: bool,
}

impl Projection {
    fn for_crs(crs: &Crs, other: &Crs) -> Result<Projection, CrsError> {
        let definition = crs
            .proj_definition()
            .ok_or_else(|| CrsError::unsupported(crs.to_string(), other.to_string()))?;
        let proj = Proj::from_proj_string(definition).map_err(|e| {
            log::debug!("Cannot build projection for {crs}: {e}");
            CrsError::unsupported(crs.to_string(), other.to_string())
        })?;
        Ok(Projection {
            proj,
            geographic: is_geographic(definition),
        })
    }
}

fn is_geographic(proj_definition: &str) -> bool {
    proj_definition.contains("+proj=longlat") || proj_definition.contains("+proj=latlong")
}

impl Reprojector for ProjReprojector {
    fn transform(
        &self,
        geometry: &Geometry,
        source: &Crs,
        target: &Crs,
    ) -> Result<Geometry, CrsError> {
        let target_geographic = target.proj_definition().is_some_and(is_geographic);

        if source.is_equivalent(target) {
            return if target_geographic {
                geometry.try_map_coords(&mut |c| check_geographic(c, target))
            } else {
                Ok(geometry.clone())
            };
        }

        let from = Projection::for_crs(source, target)?;
        let to = Projection::for_crs(target, source)?;
        geometry.try_map_coords(&mut |c| {
            let mut point = if from.geographic {
                (c.x.to_radians(), c.y.to_radians(), 0.0)
            } else {
                (c.x, c.y, 0.0)
            };
            proj4rs::transform::transform(&from.proj, &to.proj, &mut point).map_err(|e| {
                log::debug!("Transforming ({}, {}) from {source} to {target} failed: {e}", c.x, c.y);
                CrsError::OutOfBounds {
                    crs: source.to_string(),
                    x: c.x,
                    y: c.y,
                }
            })?;
            let out = if to.geographic {
                Coord::new(point.0.to_degrees(), point.1.to_degrees())
            } else {
                Coord::new(point.0, point.1)
            };
            if to.geographic {
                check_geographic(out, target)
            } else if out.x.is_finite() && out.y.is_finite() {
                Ok(out)
            } else {
                Err(CrsError::OutOfBounds {
                    crs: target.to_string(),
                    x: out.x,
                    y: out.y,
                })
            }
        })
    }
}

fn check_geographic(coord: Coord, crs: &Crs) -> Result<Coord, CrsError> {
    if coord.x.is_finite()
        && coord.y.is_finite()
        && (-180.0..=180.0).contains(&coord.x)
        && (-90.0..=90.0).contains(&coord.y)
    {
        Ok(coord)
    } else {
        Err(CrsError::OutOfBounds {
            crs: crs.to_string(),
            x: coord.x,
            y: coord.y,
        })
    }
}
