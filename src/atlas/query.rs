use std::collections::BTreeSet;

use geo::Coord;

use super::index::{DistrictEntry, PollingEntry};
use super::pipeline::{MIN_POLLING_PLACE_ZOOM, UNGROUPED_POLLING_ZOOM};
use super::Atlas;
use crate::error::QueryError;
use crate::geom::{point_envelope, polygon_contains, BBox};
use crate::wire::{self, FeatureCollection};
use crate::zoom::{min_square_area_estimate, NO_ZOOM};

/// A polygon carries its district's label when its rough area is at least
/// this fraction (1/32) of the viewport's square-area estimate.
const LABEL_AREA_RATIO: f64 = 32.0;

/// Past this many intersecting districts a viewport response says `all`
/// instead of enumerating ids.
const MAX_ENUMERATED_IDS: usize = 100;

/// `ids=all` is rejected above this bucket; the payload would be too large.
const MAX_ZOOM_FOR_ALL: u32 = 8;

impl Atlas {
    /// Name of the district containing the point, if any. Containment is
    /// decided against the most detailed geometry.
    pub(crate) fn query_location(&self, lng: f64, lat: f64) -> Option<&str> {
        let envelope = point_envelope(lng, lat);
        let mut candidates: Vec<usize> = self
            .district_tree
            .locate_in_envelope_intersecting(&envelope)
            .map(DistrictEntry::idx)
            .collect();
        candidates.sort_unstable();

        let highest = self.buckets().highest();
        let point = Coord { x: lng, y: lat };
        for idx in candidates {
            let district = &self.districts[idx];
            let Some(polygons) = district.polygons.get(&highest) else { continue };
            if polygons.iter().any(|p| polygon_contains(point, &p.shape)) {
                return Some(&district.name);
            }
        }
        None
    }

    /// Everything a map viewport needs at once: the intersecting district
    /// ids, label anchors for districts large enough to carry one, and (past
    /// the polling cutoff zoom) polling markers.
    pub(crate) fn query_viewport(&self, rect: &BBox, raw_zoom: u32) -> Result<FeatureCollection, QueryError> {
        let mut fc = FeatureCollection::new();
        let envelope = rect.to_aabb();
        let mut hits: Vec<usize> = self
            .district_tree
            .locate_in_envelope_intersecting(&envelope)
            .map(DistrictEntry::idx)
            .collect();
        // Districts are stored in id order, so index order is id order.
        hits.sort_unstable();

        let ids: Vec<String> = if hits.len() > MAX_ENUMERATED_IDS {
            vec!["all".to_string()]
        } else {
            hits.iter().map(|&idx| self.districts[idx].id.clone()).collect()
        };
        fc.push(wire::electorate_ids_feature(&ids));

        // Labels always come from the least detailed bucket: they are
        // large-scale features, whatever detail the viewport renders at.
        let bbox_area = min_square_area_estimate(rect);
        let lowest = self.buckets().lowest();
        for &idx in &hits {
            let district = &self.districts[idx];
            let locations: Vec<[f64; 2]> = district
                .polygons
                .get(&lowest)
                .into_iter()
                .flatten()
                .filter(|polygon| polygon.area * LABEL_AREA_RATIO >= bbox_area)
                .map(|polygon| [polygon.cent_lon, polygon.cent_lat])
                .collect();
            if !locations.is_empty() {
                fc.push(wire::label_feature(&district.id, &district.name, &locations));
            }
        }

        if raw_zoom > MIN_POLLING_PLACE_ZOOM {
            self.push_viewport_polling_features(&mut fc, &envelope, raw_zoom)?;
        }

        Ok(fc)
    }

    fn push_viewport_polling_features(
        &self,
        fc: &mut FeatureCollection,
        envelope: &rstar::AABB<[f64; 2]>,
        raw_zoom: u32,
    ) -> Result<(), QueryError> {
        let key = raw_zoom.min(UNGROUPED_POLLING_ZOOM);
        let Some(tree) = self.polling_trees.get(&key) else { return Ok(()) };
        let mut entries: Vec<&PollingEntry> =
            tree.locate_in_envelope_intersecting(envelope).collect();
        entries.sort_by_key(|entry| entry_order(entry));

        for entry in entries {
            match entry {
                PollingEntry::Group(group) if raw_zoom >= UNGROUPED_POLLING_ZOOM => {
                    // Deep enough to show places individually; the group only
                    // stands for near-duplicate locations, show its first.
                    let index = group.members.first().copied().ok_or_else(|| {
                        QueryError::Internal("cluster group with no members".to_string())
                    })?;
                    fc.push(wire::place_feature(&self.places[index], NO_ZOOM)?);
                }
                PollingEntry::Group(group) => {
                    fc.push(wire::group_feature(group, &group.id(&self.places)));
                }
                PollingEntry::Place { index, .. } => {
                    fc.push(wire::place_feature(&self.places[*index], NO_ZOOM)?);
                }
            }
        }
        Ok(())
    }

    /// District geometry at the bucket's level of detail for an id list, or
    /// for the whole corpus with `ids=all` (shallow buckets only). Features
    /// come back in ascending id order.
    pub(crate) fn query_districts(&self, bucket: u32, ids_param: &str) -> Result<FeatureCollection, QueryError> {
        let ids: Vec<String> = if ids_param.eq_ignore_ascii_case("all") {
            if bucket > MAX_ZOOM_FOR_ALL {
                return Err(QueryError::ZoomTooHighForAll(bucket));
            }
            self.districts.iter().map(|d| d.id.clone()).collect()
        } else {
            let mut ids: Vec<String> = ids_param.split(',').map(str::to_string).collect();
            ids.sort_unstable();
            ids
        };

        let mut fc = FeatureCollection::new();
        for id in &ids {
            let district =
                self.district(id).ok_or_else(|| QueryError::UnknownElectorate(id.clone()))?;
            let polygons = district.polygons.get(&bucket).map(Vec::as_slice).unwrap_or_default();
            fc.push(wire::district_feature(district, polygons, cfg!(feature = "encoded-polylines")));
            fc.extend_bbox(&district.bbox);
        }
        Ok(fc)
    }

    /// Individual polling places (with their min visible zoom) and cluster
    /// markers for a list of district ids. Cluster groups shared between
    /// districts appear once per response.
    pub(crate) fn query_polling_places(&self, ids_param: &str) -> Result<FeatureCollection, QueryError> {
        let mut ids: Vec<&str> = ids_param.split(',').collect();
        ids.sort_unstable();

        let highest = self.buckets().highest();
        let mut fc = FeatureCollection::new();
        let mut seen_groups: BTreeSet<String> = BTreeSet::new();
        for id in ids {
            let district =
                self.district(id).ok_or_else(|| QueryError::UnknownElectorate(id.to_string()))?;
            for polygon in district.polygons.get(&highest).into_iter().flatten() {
                for &index in &polygon.polling_places {
                    let min_zoom = self.min_zoom.get(index).copied().ok_or_else(|| {
                        QueryError::Internal(format!("no min zoom entry for polling place {index}"))
                    })?;
                    let place = &self.places[index];
                    fc.push(wire::place_feature(place, min_zoom)?);
                    fc.extend_bbox_point(place.lng, place.lat);
                }
            }
            for group in &district.groups {
                let group_id = group.id(&self.places);
                if !seen_groups.insert(group_id.clone()) {
                    continue;
                }
                fc.push(wire::group_feature(group, &group_id));
                fc.extend_bbox_point(group.lng, group.lat);
            }
        }
        Ok(fc)
    }
}

fn entry_order(entry: &PollingEntry) -> (usize, u8) {
    match entry {
        PollingEntry::Place { index, .. } => (*index, 0),
        PollingEntry::Group(group) => (group.members.first().copied().unwrap_or(usize::MAX), 1),
    }
}
