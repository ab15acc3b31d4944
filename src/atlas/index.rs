use rstar::{RTreeObject, AABB};

use super::polling::ClusterGroup;
use crate::geom::{point_envelope, BBox};

/// A district's bounding box in the R-tree, associated by index.
#[derive(Debug, Clone)]
pub(crate) struct DistrictEntry {
    idx: usize,
    envelope: AABB<[f64; 2]>,
}

impl DistrictEntry {
    pub(crate) fn new(idx: usize, bbox: &BBox) -> Self {
        Self { idx, envelope: bbox.to_aabb() }
    }

    /// Index of the corresponding district.
    pub(crate) fn idx(&self) -> usize {
        self.idx
    }
}

impl RTreeObject for DistrictEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A per-zoom polling index entry: either a cluster marker or a polling place
/// too isolated to cluster at that zoom.
#[derive(Debug, Clone)]
pub(crate) enum PollingEntry {
    Group(ClusterGroup),
    Place { index: usize, lng: f64, lat: f64 },
}

impl PollingEntry {
    fn position(&self) -> (f64, f64) {
        match self {
            PollingEntry::Group(group) => (group.lng, group.lat),
            PollingEntry::Place { lng, lat, .. } => (*lng, *lat),
        }
    }
}

impl RTreeObject for PollingEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (lng, lat) = self.position();
        point_envelope(lng, lat)
    }
}
