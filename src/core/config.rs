use crate::core::error::Result;
use crate::core::spatial_filter::SpatialFilterConfig;
use git2::{Config, ErrorCode};

pub const SPATIAL_FILTER_GEOMETRY: &str = "kart.spatialfilter.geometry";
pub const SPATIAL_FILTER_CRS: &str = "kart.spatialfilter.crs";
pub const SPATIAL_FILTER_REFERENCE: &str = "kart.spatialfilter.reference";
pub const WORKING_COPY_LOCATION: &str = "kart.workingcopy.location";

/// Reads a string value, mapping a missing key to `None`
fn get_optional(config: &Config, key: &str) -> Result<Option<String>> {
    match config.get_string(key) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The stored spatial filter, or `None` when no geometry is configured.
///
/// Values are returned as stored; a filter with no CRS gets an empty one, which
/// fails to parse later and is reported as an invalid CRS.
pub fn load_spatial_filter_config(config: &Config) -> Result<Option<SpatialFilterConfig>> {
    let Some(geometry) = get_optional(config, SPATIAL_FILTER_GEOMETRY)? else {
        return Ok(None);
    };
    let crs = get_optional(config, SPATIAL_FILTER_CRS)?.unwrap_or_default();
    let reference = get_optional(config, SPATIAL_FILTER_REFERENCE)?;

    log::debug!("Loaded spatial filter config (reference: {reference:?}, crs: {crs})");
    Ok(Some(SpatialFilterConfig {
        reference,
        geometry,
        crs,
    }))
}

pub fn working_copy_location(config: &Config) -> Result<Option<String>> {
    get_optional(config, WORKING_COPY_LOCATION)
}
