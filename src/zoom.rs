use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use tracing::warn;

use crate::error::QueryError;
use crate::geom::BBox;

/// Rough estimate of earth's radius in km at latitude 0 for a perfect sphere.
pub(crate) const EARTH_RADIUS_KM: f64 = 6378.137;

/// Sentinel for "no zoom assigned".
pub(crate) const NO_ZOOM: u32 = 0;

/// The set of zoom buckets geometry exists at, discovered from the dataset
/// directory layout. A bucket of `9` looks good at consumer zoom 9 and below.
#[derive(Debug, Clone)]
pub(crate) struct ZoomBuckets(Vec<u32>);

impl ZoomBuckets {
    /// Scan `root` for integer-named subdirectories, one per bucket.
    pub(crate) fn discover(root: &Path) -> Result<Self> {
        let entries = fs::read_dir(root)
            .with_context(|| format!("Failed to read dataset directory {}", root.display()))?;
        let mut levels = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().to_string_lossy().parse::<u32>() {
                Ok(level) => levels.push(level),
                Err(_) => {
                    warn!(path = %entry.path().display(), "ignoring directory; it doesn't represent a zoom level");
                }
            }
        }
        Self::from_levels(levels, root)
    }

    fn from_levels(mut levels: Vec<u32>, root: &Path) -> Result<Self> {
        ensure!(!levels.is_empty(), "no zoom bucket directories under {}", root.display());
        levels.sort_unstable();
        levels.dedup();
        Ok(Self(levels))
    }

    /// The smallest bucket at least as detailed as `zoom`, or the highest
    /// bucket when the request outruns the data.
    pub(crate) fn bucket_for(&self, zoom: u32) -> u32 {
        self.0.iter().copied().find(|&level| zoom <= level).unwrap_or_else(|| self.highest())
    }

    pub(crate) fn highest(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    pub(crate) fn lowest(&self) -> u32 {
        self.0[0]
    }

    pub(crate) fn levels(&self) -> &[u32] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn of(levels: &[u32]) -> Self {
        Self::from_levels(levels.to_vec(), Path::new("test")).expect("non-empty levels")
    }
}

/// Parse a zoom path parameter, returning the matching bucket and the raw
/// requested zoom (the latter drives the polling place layer policy).
pub(crate) fn parse_zoom(s: &str, buckets: &ZoomBuckets) -> Result<(u32, u32), QueryError> {
    if s.is_empty() {
        return Err(QueryError::InvalidZoom);
    }
    let raw: u32 = s.parse().map_err(|_| QueryError::InvalidZoom)?;
    Ok((buckets.bucket_for(raw), raw))
}

fn sin_deg(degrees: f64) -> f64 {
    degrees.to_radians().sin()
}

fn cos_deg(degrees: f64) -> f64 {
    degrees.to_radians().cos()
}

/// Distance in km on the ground represented by one pixel of a web-mercator
/// map at the given latitude and zoom (256-pixel world at zoom 0).
pub(crate) fn ground_resolution(lat: f64, zoom: u32) -> f64 {
    let num_pixels = f64::powi(2.0, 8 + zoom as i32);
    cos_deg(lat) * 2.0 * PI * EARTH_RADIUS_KM / num_pixels
}

/// Rough km² area of the largest square-ish slab of `bbox`: the box is first
/// clipped so its width is at most twice its height. Only ever compared
/// against other outputs of the same estimate.
pub(crate) fn min_square_area_estimate(bbox: &BBox) -> f64 {
    let lng1 = bbox.min_x;
    let lat1 = bbox.min_y;
    let mut lng2 = lng1 + bbox.width();
    let mut lat2 = bbox.max_y;
    if lng2 - lng1 > (lat2 - lat1) * 2.0 {
        lng2 = lng1 + (lat2 - lat1) * 2.0;
    } else {
        lat2 = lat1 + (lng2 - lng1) / 2.0;
    }
    EARTH_RADIUS_KM * EARTH_RADIUS_KM * PI * (sin_deg(lat2) - sin_deg(lat1)) * (lng2 - lng1) / 180.0
}
