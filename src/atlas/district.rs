use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use geo::{BoundingRect, Polygon};

use super::polling::ClusterGroup;
use crate::geom::BBox;

/// One polygon of a district: a single outer ring plus holes, with the
/// per-polygon attributes carried by the source feature.
#[derive(Debug, Clone)]
pub(crate) struct DistrictPolygon {
    pub(crate) shape: Polygon<f64>,
    pub(crate) gis_id: String,
    pub(crate) cent_lon: f64,
    pub(crate) cent_lat: f64,
    /// Rough area in squared degrees; only ever compared against other
    /// squared-degree quantities, never shown to users (unlike `area_sqkm`).
    pub(crate) area: f64,
    /// Indices of the polling places contained in this polygon.
    pub(crate) polling_places: Vec<usize>,
}

impl DistrictPolygon {
    pub(crate) fn bbox(&self) -> Option<BBox> {
        self.shape.bounding_rect().map(BBox::from_rect)
    }
}

/// An electoral division with its per-bucket geometry and attributes.
#[derive(Debug, Clone)]
pub(crate) struct District {
    /// Lowercased display name; unique across the corpus.
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) state: String,
    pub(crate) area_sqkm: f64,
    /// Union of every polygon's bbox across all zoom buckets.
    pub(crate) bbox: BBox,
    pub(crate) polygons: BTreeMap<u32, Vec<DistrictPolygon>>,
    pub(crate) groups: Vec<ClusterGroup>,
}

impl District {
    pub(crate) fn new(
        id: String,
        name: String,
        state: String,
        area_sqkm: f64,
        bucket: u32,
        polygons: Vec<DistrictPolygon>,
    ) -> Result<Self> {
        let mut bbox: Option<BBox> = None;
        for polygon in &polygons {
            if let Some(polygon_bbox) = polygon.bbox() {
                match &mut bbox {
                    Some(bbox) => bbox.extend(&polygon_bbox),
                    None => bbox = Some(polygon_bbox),
                }
            }
        }
        let bbox = bbox.ok_or_else(|| anyhow!("district '{id}' has polygons with no extent"))?;
        Ok(Self {
            id,
            name,
            state,
            area_sqkm,
            bbox,
            polygons: BTreeMap::from([(bucket, polygons)]),
            groups: Vec::new(),
        })
    }

    /// Attach a polygon for `bucket`, widening the district bbox.
    pub(crate) fn add_polygon(&mut self, bucket: u32, polygon: DistrictPolygon) {
        if let Some(polygon_bbox) = polygon.bbox() {
            self.bbox.extend(&polygon_bbox);
        }
        self.polygons.entry(bucket).or_default().push(polygon);
    }
}
