use geo::Rect;
use rstar::AABB;

use crate::error::QueryError;

/// Half-width of the search envelope used for point-like entries.
pub(crate) const POINT_ENVELOPE_HALF_WIDTH: f64 = 1e-6;

/// An axis-aligned bounding box in (lng, lat) coordinate order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub(crate) fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub(crate) fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Widen this box so that it also covers `other`.
    pub(crate) fn extend(&mut self, other: &BBox) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Widen this box so that it also covers the point `(lng, lat)`.
    pub(crate) fn extend_point(&mut self, lng: f64, lat: f64) {
        self.min_x = self.min_x.min(lng);
        self.min_y = self.min_y.min(lat);
        self.max_x = self.max_x.max(lng);
        self.max_y = self.max_y.max(lat);
    }

    /// Width of the box. A rightmost edge in negative coordinate space means
    /// the box wraps over the date line, so a negative raw width gains 360.
    pub(crate) fn width(&self) -> f64 {
        let width = self.max_x - self.min_x;
        if width < 0.0 {
            width + 360.0
        } else {
            width
        }
    }

    pub(crate) fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Convert to an R-tree envelope, unwrapping the date line if needed.
    pub(crate) fn to_aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners(
            [self.min_x, self.min_y],
            [self.min_x + self.width(), self.min_y + self.height()],
        )
    }

    pub(crate) fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// Search envelope around a single point.
pub(crate) fn point_envelope(lng: f64, lat: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [lng - POINT_ENVELOPE_HALF_WIDTH, lat - POINT_ENVELOPE_HALF_WIDTH],
        [lng + POINT_ENVELOPE_HALF_WIDTH, lat + POINT_ENVELOPE_HALF_WIDTH],
    )
}

/// Parse a viewport bbox parameter. The caller sends `minLat,minLng,maxLat,maxLng`
/// (lat first, unlike the stored lng-first order).
pub(crate) fn parse_bbox(s: &str) -> Result<BBox, QueryError> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err(QueryError::InvalidBbox(s.to_string()));
    }
    let mut values = [0.0f64; 4];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part.parse().map_err(|_| QueryError::InvalidBbox(s.to_string()))?;
    }
    let bbox = BBox::new(values[1], values[0], values[3], values[2]);
    if bbox.height() < 0.0 {
        return Err(QueryError::InvalidBbox(s.to_string()));
    }
    Ok(bbox)
}
