mod cluster;
mod district;
mod index;
mod loader;
mod pipeline;
pub(crate) mod polling;
mod query;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use rstar::RTree;
use tracing::info;

use crate::zoom::{ZoomBuckets, NO_ZOOM};
use index::{DistrictEntry, PollingEntry};

pub(crate) use district::{District, DistrictPolygon};
pub(crate) use polling::{ClusterGroup, PollingPlace};

/// The immutable spatial model: districts with per-bucket geometry, polling
/// places with their cluster groups, and the R-trees over both. Built once at
/// startup; queries never mutate it, so it is shared freely across workers.
pub struct Atlas {
    districts: Vec<District>,
    by_id: BTreeMap<String, usize>,
    places: Vec<PollingPlace>,
    /// Per polling place: the zoom it first appears individually at.
    /// `NO_ZOOM` for dropped places and for places still clustered at the
    /// deepest grouping zoom.
    min_zoom: Vec<u32>,
    zoom_buckets: ZoomBuckets,
    district_tree: RTree<DistrictEntry>,
    polling_trees: BTreeMap<u32, RTree<PollingEntry>>,
}

impl Atlas {
    /// Load the dataset and run the polling place pipeline. Any malformed or
    /// inconsistent input is fatal; the service never runs on partial data.
    pub fn load(data_dir: &Path, places_path: &Path) -> Result<Self> {
        let zoom_buckets = ZoomBuckets::discover(data_dir)?;
        info!(buckets = ?zoom_buckets.levels(), "discovered zoom buckets");

        let mut districts = loader::load_districts(data_dir, &zoom_buckets)?;
        info!(districts = districts.len(), "district map loaded");

        let places = polling::load_polling_places(places_path)?;
        info!(places = places.len(), "polling places loaded");

        let polling_trees = pipeline::build_polling_indices(&places);

        let by_id: BTreeMap<String, usize> =
            districts.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();

        let highest = zoom_buckets.highest();
        let by_division = pipeline::group_places_by_division(&places, &by_id)?;
        pipeline::assign_places_to_polygons(&mut districts, &by_id, &by_division, &places, highest)?;

        let mut min_zoom: Vec<Option<u32>> = vec![None; places.len()];
        let merge_tree = polling_trees
            .get(&pipeline::UNGROUPED_POLLING_ZOOM)
            .ok_or_else(|| anyhow!("missing polling index for zoom {}", pipeline::UNGROUPED_POLLING_ZOOM))?;
        pipeline::cluster_polling_places(
            &mut districts,
            &by_id,
            &places,
            highest,
            merge_tree,
            &mut min_zoom,
        )?;
        pipeline::drop_duplicate_groups(&mut districts, &places, &mut min_zoom);
        info!(
            placed = min_zoom.iter().filter(|z| z.is_some()).count(),
            groups = districts.iter().map(|d| d.groups.len()).sum::<usize>(),
            "polling place pipeline finished"
        );

        let district_tree = RTree::bulk_load(
            districts.iter().enumerate().map(|(i, d)| DistrictEntry::new(i, &d.bbox)).collect(),
        );

        Ok(Self {
            districts,
            by_id,
            places,
            min_zoom: min_zoom.into_iter().map(|z| z.unwrap_or(NO_ZOOM)).collect(),
            zoom_buckets,
            district_tree,
            polling_trees,
        })
    }

    pub fn district_count(&self) -> usize {
        self.districts.len()
    }

    /// The discovered zoom buckets, ascending.
    pub fn zoom_levels(&self) -> &[u32] {
        self.zoom_buckets.levels()
    }

    pub(crate) fn buckets(&self) -> &ZoomBuckets {
        &self.zoom_buckets
    }

    pub(crate) fn district(&self, id: &str) -> Option<&District> {
        self.by_id.get(id).map(|&i| &self.districts[i])
    }

    /// Assemble an atlas from pre-built parts; callers supply districts
    /// sorted by id and are responsible for the pipeline invariants.
    #[cfg(test)]
    pub(crate) fn from_parts(
        districts: Vec<District>,
        places: Vec<PollingPlace>,
        min_zoom: Vec<u32>,
        zoom_buckets: ZoomBuckets,
        polling_trees: BTreeMap<u32, RTree<PollingEntry>>,
    ) -> Self {
        let by_id: BTreeMap<String, usize> =
            districts.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();
        let district_tree = RTree::bulk_load(
            districts.iter().enumerate().map(|(i, d)| DistrictEntry::new(i, &d.bbox)).collect(),
        );
        Self { districts, by_id, places, min_zoom, zoom_buckets, district_tree, polling_trees }
    }
}
