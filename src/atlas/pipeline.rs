use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, ensure, Result};
use geo::Coord;
use rstar::{RTree, AABB};
use tracing::debug;

use super::cluster::dbscan;
use super::district::District;
use super::index::PollingEntry;
use super::polling::{ClusterGroup, PollingPlace};
use crate::geom::polygon_contains;
use crate::zoom::ground_resolution;

/// Polling places are omitted entirely at and below this zoom.
pub(crate) const MIN_POLLING_PLACE_ZOOM: u32 = 8;

/// At and above this zoom polling places are shown individually.
pub(crate) const UNGROUPED_POLLING_ZOOM: u32 = 14;

/// Reference latitude for the clustering radius; mid-continent.
const ULURU_LAT: f64 = -25.353954;

/// Width in pixels of the polling place marker image.
const MARKER_WIDTH_PIXELS: f64 = 48.0;

/// Duplicate groups larger than this survive the dedup pass.
const MAX_DEDUP_GROUP_SIZE: usize = 9;

/// Clustering radius (degrees) and minimum cluster size for a zoom level.
/// At the deepest grouping zoom, only places ~10m apart collapse, in pairs.
pub(crate) fn clustering_params(zoom: u32) -> (f64, usize) {
    if zoom == UNGROUPED_POLLING_ZOOM {
        return (0.01, 2);
    }
    let radius = ground_resolution(ULURU_LAT, zoom) * MARKER_WIDTH_PIXELS * 1.5;
    (radius, 3)
}

/// Partition polling place indices by lowercased division name. The key set
/// must match the district id set exactly; anything else means the polling
/// place file and the shapefiles disagree and we refuse to serve.
pub(crate) fn group_places_by_division(
    places: &[PollingPlace],
    by_id: &BTreeMap<String, usize>,
) -> Result<BTreeMap<String, Vec<usize>>> {
    let mut by_division: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, place) in places.iter().enumerate() {
        by_division.entry(place.division_name.to_lowercase()).or_default().push(index);
    }
    ensure!(
        by_division.len() == by_id.len(),
        "polling places have {} division IDs, districts have {}",
        by_division.len(),
        by_id.len()
    );
    for division in by_division.keys() {
        ensure!(
            by_id.contains_key(division),
            "division '{division}' is present in polling places but not in districts"
        );
    }
    Ok(by_division)
}

/// Keep, per district polygon at the most detailed bucket, only the division's
/// polling places actually inside that polygon. Places outside every polygon
/// of their division are dropped (assumed appointment-only locations).
pub(crate) fn assign_places_to_polygons(
    districts: &mut [District],
    by_id: &BTreeMap<String, usize>,
    by_division: &BTreeMap<String, Vec<usize>>,
    places: &[PollingPlace],
    highest: u32,
) -> Result<()> {
    for (division, indices) in by_division {
        let &district_idx = by_id
            .get(division)
            .ok_or_else(|| anyhow!("division '{division}' has no district"))?;
        let district = &mut districts[district_idx];
        let Some(polygons) = district.polygons.get_mut(&highest) else { continue };
        for polygon in polygons.iter_mut() {
            polygon.polling_places = indices
                .iter()
                .copied()
                .filter(|&i| {
                    polygon_contains(Coord { x: places[i].lng, y: places[i].lat }, &polygon.shape)
                })
                .collect();
        }
    }
    Ok(())
}

/// Build the per-zoom viewport polling indices: the whole polling place list
/// clustered at each zoom's parameters, clusters and leftover individual
/// points inserted side by side.
pub(crate) fn build_polling_indices(
    places: &[PollingPlace],
) -> BTreeMap<u32, RTree<PollingEntry>> {
    let coords: Vec<[f64; 2]> = places.iter().map(|p| [p.lng, p.lat]).collect();
    let mut trees = BTreeMap::new();
    for zoom in (MIN_POLLING_PLACE_ZOOM + 1)..=UNGROUPED_POLLING_ZOOM {
        let (eps, min_size) = clustering_params(zoom);
        let mut entries: Vec<PollingEntry> = Vec::new();
        let mut clustered: BTreeSet<usize> = BTreeSet::new();
        for cluster in dbscan(&coords, eps, min_size) {
            clustered.extend(cluster.points.iter().copied());
            entries.push(PollingEntry::Group(ClusterGroup::new(
                cluster.points,
                crate::zoom::NO_ZOOM,
                String::new(),
                places,
            )));
        }
        entries.extend((0..places.len()).filter(|i| !clustered.contains(i)).map(|index| {
            PollingEntry::Place { index, lng: places[index].lng, lat: places[index].lat }
        }));
        debug!(zoom, entries = entries.len(), "built polling index");
        trees.insert(zoom, RTree::bulk_load(entries));
    }
    trees
}

/// Per-zoom, district-local clustering with the cross-district fallback for
/// polygons too small to cluster on their own, greedy nearby merging, and
/// per-point min-zoom assignment.
pub(crate) fn cluster_polling_places(
    districts: &mut [District],
    by_id: &BTreeMap<String, usize>,
    places: &[PollingPlace],
    highest: u32,
    merge_tree: &RTree<PollingEntry>,
    min_zoom: &mut [Option<u32>],
) -> Result<()> {
    for zoom in (MIN_POLLING_PLACE_ZOOM + 1)..=UNGROUPED_POLLING_ZOOM {
        let (eps, min_size) = clustering_params(zoom);
        let area_floor = 2.0 * eps * eps;
        let mut too_small: Vec<(usize, usize)> = Vec::new();

        for district_idx in 0..districts.len() {
            let mut new_groups: Vec<ClusterGroup> = Vec::new();
            {
                let district = &districts[district_idx];
                let Some(polygons) = district.polygons.get(&highest) else { continue };
                for (polygon_idx, polygon) in polygons.iter().enumerate() {
                    if polygon.area < area_floor {
                        too_small.push((district_idx, polygon_idx));
                        continue;
                    }
                    let mut pool: BTreeSet<usize> = polygon
                        .polling_places
                        .iter()
                        .copied()
                        .filter(|&i| min_zoom[i].is_none())
                        .collect();
                    cluster_pool(&mut pool, &mut new_groups, eps, min_size, zoom, district.id.clone(), places);
                    // Cluster centroids are artificial; fold stray unclustered
                    // places near a centroid into that group to reduce noise
                    // around it.
                    merge_nearby(&mut new_groups, &mut pool, eps, merge_tree);
                    // Whatever is left was never clustered at this zoom.
                    for &index in &pool {
                        min_zoom[index] = Some(zoom);
                    }
                }
            }
            districts[district_idx].groups.extend(new_groups);
        }

        // Pool the too-small polygons of all districts and cluster them
        // together; the resulting groups may span district lines.
        let mut pool: BTreeSet<usize> = BTreeSet::new();
        for &(district_idx, polygon_idx) in &too_small {
            if let Some(polygons) = districts[district_idx].polygons.get(&highest) {
                pool.extend(
                    polygons[polygon_idx]
                        .polling_places
                        .iter()
                        .copied()
                        .filter(|&i| min_zoom[i].is_none()),
                );
            }
        }
        let mut shared_groups: Vec<ClusterGroup> = Vec::new();
        cluster_pool(&mut pool, &mut shared_groups, eps, min_size, zoom, String::new(), places);
        merge_nearby(&mut shared_groups, &mut pool, eps, merge_tree);
        for mut group in shared_groups {
            let divisions: BTreeSet<String> = group
                .members
                .iter()
                .map(|&i| places[i].division_name.to_lowercase())
                .collect();
            // A division is recorded on the group only when it is the sole
            // contributor; the group is attached to every contributor.
            if divisions.len() == 1 {
                group.division = divisions.iter().next().cloned().unwrap_or_default();
            }
            for division in &divisions {
                let &district_idx = by_id
                    .get(division)
                    .ok_or_else(|| anyhow!("division '{division}' has no district"))?;
                districts[district_idx].groups.push(group.clone());
            }
        }
        for &index in &pool {
            min_zoom[index] = Some(zoom);
        }
    }
    Ok(())
}

/// Run DBSCAN over the pooled indices, emitting one group per cluster and
/// removing clustered members from the pool.
fn cluster_pool(
    pool: &mut BTreeSet<usize>,
    groups: &mut Vec<ClusterGroup>,
    eps: f64,
    min_size: usize,
    zoom: u32,
    division: String,
    places: &[PollingPlace],
) {
    let pool_vec: Vec<usize> = pool.iter().copied().collect();
    let coords: Vec<[f64; 2]> = pool_vec.iter().map(|&i| [places[i].lng, places[i].lat]).collect();
    for cluster in dbscan(&coords, eps, min_size) {
        let members: Vec<usize> = cluster.points.iter().map(|&local| pool_vec[local]).collect();
        for &member in &members {
            pool.remove(&member);
        }
        groups.push(ClusterGroup::new(members, zoom, division.clone(), places));
    }
}

/// Greedy absorption: for each group, pull still-unassigned pool members that
/// the deepest-zoom polling index finds near the group centroid. Centroids
/// are not recomputed.
fn merge_nearby(
    groups: &mut [ClusterGroup],
    pool: &mut BTreeSet<usize>,
    eps: f64,
    merge_tree: &RTree<PollingEntry>,
) {
    for group in groups.iter_mut() {
        // Some relation (km) between the clustering radius and the current
        // group size, then km to degrees via 111.2 km per degree of latitude.
        let tolerance = eps * group.members.len() as f64 / 20.0 / 111.2;
        let search = AABB::from_corners(
            [group.lng - tolerance, group.lat - tolerance],
            [group.lng + tolerance, group.lat + tolerance],
        );
        let mut nearby: Vec<usize> = Vec::new();
        for hit in merge_tree.locate_in_envelope_intersecting(&search) {
            match hit {
                PollingEntry::Group(other) => nearby.extend(other.members.iter().copied()),
                PollingEntry::Place { index, .. } => nearby.push(*index),
            }
        }
        let mut grew = false;
        for index in nearby {
            if pool.remove(&index) {
                group.members.push(index);
                grew = true;
            }
        }
        if grew {
            group.members.sort_unstable();
        }
    }
}

/// Remove a group whose membership recurs identically one zoom later, when
/// small enough and when every member unclusters at the very next zoom; the
/// members then become individually visible one zoom earlier.
pub(crate) fn drop_duplicate_groups(
    districts: &mut [District],
    places: &[PollingPlace],
    min_zoom: &mut [Option<u32>],
) {
    for district in districts.iter_mut() {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut remove: Vec<usize> = Vec::new();
        for (i, group) in district.groups.iter().enumerate() {
            if seen.insert(group.id_no_zoom(places)) {
                continue;
            }
            if group.members.len() > MAX_DEDUP_GROUP_SIZE {
                continue;
            }
            let unclusters_next_zoom = group
                .members
                .iter()
                .all(|&m| min_zoom[m] == Some(group.min_zoom + 1));
            if unclusters_next_zoom {
                remove.push(i);
            }
        }
        // Descending order keeps the earlier indices valid while removing.
        for &i in remove.iter().rev() {
            let group = district.groups.remove(i);
            for &member in &group.members {
                min_zoom[member] = Some(group.min_zoom);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::district::DistrictPolygon;
    use crate::atlas::polling::test_place;
    use geo::{Coord, LineString, Polygon};

    fn square(min_x: f64, min_y: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString(vec![
                Coord { x: min_x, y: min_y },
                Coord { x: min_x + size, y: min_y },
                Coord { x: min_x + size, y: min_y + size },
                Coord { x: min_x, y: min_y + size },
                Coord { x: min_x, y: min_y },
            ]),
            vec![],
        )
    }

    fn district_with_polygons(id: &str, polygons: Vec<DistrictPolygon>) -> District {
        District::new(id.into(), id.into(), "NSW".into(), 100.0, 14, polygons).unwrap()
    }

    fn polygon(shape: Polygon<f64>, area: f64) -> DistrictPolygon {
        DistrictPolygon {
            shape,
            gis_id: "g".into(),
            cent_lon: 0.0,
            cent_lat: 0.0,
            area,
            polling_places: Vec::new(),
        }
    }

    struct World {
        districts: Vec<District>,
        by_id: BTreeMap<String, usize>,
        places: Vec<PollingPlace>,
        min_zoom: Vec<Option<u32>>,
    }

    /// Run the full startup pipeline over hand-built districts and places.
    fn run_pipeline(mut districts: Vec<District>, places: Vec<PollingPlace>) -> World {
        let by_id: BTreeMap<String, usize> =
            districts.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();
        let by_division = group_places_by_division(&places, &by_id).unwrap();
        assign_places_to_polygons(&mut districts, &by_id, &by_division, &places, 14).unwrap();
        let trees = build_polling_indices(&places);
        let mut min_zoom = vec![None; places.len()];
        cluster_polling_places(&mut districts, &by_id, &places, 14, &trees[&14], &mut min_zoom)
            .unwrap();
        drop_duplicate_groups(&mut districts, &places, &mut min_zoom);
        World { districts, by_id, places, min_zoom }
    }

    /// Every polling place is in at most one distinct group per zoom, and
    /// never both grouped and individually visible at the same zoom.
    fn assert_group_invariants(world: &World) {
        for zoom in (MIN_POLLING_PLACE_ZOOM + 1)..=UNGROUPED_POLLING_ZOOM {
            let mut membership: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
            for district in &world.districts {
                for group in &district.groups {
                    if group.min_zoom != zoom {
                        continue;
                    }
                    for &member in &group.members {
                        membership
                            .entry(member)
                            .or_default()
                            .insert(group.id_no_zoom(&world.places));
                    }
                }
            }
            for (member, groups) in membership {
                assert_eq!(groups.len(), 1, "place {member} in several groups at zoom {zoom}");
                if let Some(mz) = world.min_zoom[member] {
                    assert!(mz > zoom, "place {member} grouped at zoom {zoom} but visible from {mz}");
                }
            }
        }
    }

    #[test]
    fn division_partition_must_match_district_ids() {
        let districts = vec![district_with_polygons("alpha", vec![polygon(square(0.0, 0.0, 10.0), 1e9)])];
        let by_id: BTreeMap<String, usize> =
            districts.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();

        let places = vec![test_place("Alpha", 1, 1.0, 1.0)];
        assert!(group_places_by_division(&places, &by_id).is_ok());

        let strays = vec![test_place("Omega", 1, 1.0, 1.0)];
        assert!(group_places_by_division(&strays, &by_id).is_err());
    }

    #[test]
    fn places_outside_every_polygon_are_dropped() {
        let districts = vec![district_with_polygons("alpha", vec![polygon(square(0.0, 0.0, 10.0), 1e9)])];
        let places = vec![
            test_place("alpha", 1, 1.0, 1.0),
            test_place("alpha", 2, 50.0, 50.0), // appointment-only, outside
        ];
        let world = run_pipeline(districts, places);

        let polygons = &world.districts[0].polygons[&14];
        assert_eq!(polygons[0].polling_places, vec![0]);
        // Dropped places never receive a min zoom and join no group.
        assert_eq!(world.min_zoom[1], None);
        assert!(world.districts[0].groups.iter().all(|g| !g.members.contains(&1)));
    }

    #[test]
    fn clusters_thin_out_as_zoom_deepens() {
        // Three places huddle together, a fourth sits ~10 degrees away: it
        // clusters along at shallow zooms and becomes noise once the radius
        // drops below the gap.
        let districts = vec![district_with_polygons("alpha", vec![polygon(square(0.0, 0.0, 10.0), 1e12)])];
        let places = vec![
            test_place("alpha", 1, 1.0, 1.0),
            test_place("alpha", 2, 1.0001, 1.0),
            test_place("alpha", 3, 1.0, 1.0001),
            test_place("alpha", 4, 8.0, 8.0),
        ];
        let world = run_pipeline(districts, places);

        let district = &world.districts[0];
        let wide: Vec<&ClusterGroup> =
            district.groups.iter().filter(|g| g.members.len() == 4).collect();
        assert!(!wide.is_empty(), "shallow zooms cluster all four places");
        assert!(wide.iter().all(|g| g.division == "alpha"));

        // eps at zoom 11 is ~5 degrees: the distant place drops out.
        let (eps11, _) = clustering_params(11);
        assert!(eps11 < 9.9 && clustering_params(10).0 > 9.9);
        assert_eq!(world.min_zoom[3], Some(11));

        // The close trio stays clustered through the deepest zoom.
        assert_eq!(world.min_zoom[0], None);
        assert!(district.groups.iter().any(|g| g.min_zoom == 14 && g.members == vec![0, 1, 2]));

        assert_group_invariants(&world);
    }

    #[test]
    fn merge_nearby_absorbs_across_polygons() {
        // A trio near the shared edge of two polygons of one district, and a
        // lone place just over the edge in the second polygon. DBSCAN never
        // sees them together (pools are per polygon), but the merge step pulls
        // the loner into the trio's group while the tolerance reaches it.
        let districts = vec![district_with_polygons(
            "alpha",
            vec![
                polygon(square(0.0, 0.0, 10.0), 1e12),
                polygon(square(10.0, 0.0, 10.0), 1e12),
            ],
        )];
        let places = vec![
            test_place("alpha", 1, 9.99, 5.0),
            test_place("alpha", 2, 9.999, 5.0),
            test_place("alpha", 3, 9.9995, 5.0),
            test_place("alpha", 4, 10.0001, 5.0),
        ];
        let world = run_pipeline(districts, places);

        let district = &world.districts[0];
        let with_loner: Vec<u32> = district
            .groups
            .iter()
            .filter(|g| g.members.contains(&3))
            .map(|g| g.min_zoom)
            .collect();
        assert!(!with_loner.is_empty(), "the loner is merged into trio groups");
        assert!(with_loner.contains(&9));
        // At zoom 14 the merge tolerance is microscopic; the loner is left
        // out there and finally becomes individually visible.
        assert!(!with_loner.contains(&14));
        assert_eq!(world.min_zoom[3], Some(14));
        assert_eq!(world.min_zoom[0], None);

        assert_group_invariants(&world);
    }

    #[test]
    fn too_small_polygons_cluster_across_districts() {
        // Two districts whose polygons are below the area floor at every
        // grouping zoom; their places cluster jointly. A third tiny district
        // far away gets a single-division cluster.
        let beta = district_with_polygons("beta", vec![polygon(square(19.0, 19.0, 1.0), 1e-4)]);
        let gamma = district_with_polygons("gamma", vec![polygon(square(20.0, 19.0, 1.0), 1e-4)]);
        let delta = district_with_polygons("delta", vec![polygon(square(39.0, 39.0, 2.0), 1e-4)]);

        let places = vec![
            test_place("beta", 1, 19.5, 19.5),
            test_place("beta", 2, 19.5005, 19.5),
            test_place("gamma", 3, 20.0005, 19.5),
            test_place("delta", 4, 39.5, 39.5),
            test_place("delta", 5, 39.5005, 39.5),
            test_place("delta", 6, 39.5, 39.5005),
        ];
        let world = run_pipeline(vec![beta, gamma, delta], places);

        let beta = &world.districts[world.by_id["beta"]];
        let gamma = &world.districts[world.by_id["gamma"]];
        let delta = &world.districts[world.by_id["delta"]];

        // The beta+gamma cluster spans divisions: empty division, attached to
        // both contributors.
        let shared = beta
            .groups
            .iter()
            .find(|g| g.members.contains(&2))
            .expect("beta holds the shared group");
        assert_eq!(shared.division, "");
        assert!(gamma
            .groups
            .iter()
            .any(|g| g.id_no_zoom(&world.places) == shared.id_no_zoom(&world.places)));

        // Delta's cluster has a single contributor and keeps its division.
        let local = delta.groups.iter().find(|g| g.members.contains(&3)).unwrap();
        assert_eq!(local.division, "delta");
        assert!(local.members.iter().all(|&m| world.places[m].division_name == "delta"));

        assert_group_invariants(&world);
    }

    #[test]
    fn duplicate_groups_collapse_into_the_earlier_zoom() {
        // A trio that clusters from zoom 9 through 13 and unclusters at 14:
        // the zoom-13 recurrence duplicates the zoom-12 membership with every
        // member unclustering right after, so it is removed and the members
        // become visible from zoom 13.
        let districts = vec![district_with_polygons("alpha", vec![polygon(square(0.0, 0.0, 10.0), 1e12)])];
        let places = vec![
            test_place("alpha", 1, 1.0, 1.0),
            test_place("alpha", 2, 1.5, 1.0),
            test_place("alpha", 3, 1.0, 1.5),
        ];
        let world = run_pipeline(districts, places);

        let district = &world.districts[0];
        let zooms: Vec<u32> = district.groups.iter().map(|g| g.min_zoom).collect();
        assert_eq!(zooms, vec![9, 10, 11, 12]);
        for place in 0..3 {
            assert_eq!(world.min_zoom[place], Some(13));
        }

        assert_group_invariants(&world);
    }

    #[test]
    fn params_follow_the_ground_resolution() {
        assert_eq!(clustering_params(14), (0.01, 2));
        let (eps, min_size) = clustering_params(9);
        let expected = ground_resolution(ULURU_LAT, 9) * 48.0 * 1.5;
        assert!((eps - expected).abs() < 1e-12);
        assert_eq!(min_size, 3);
        // Radius halves with every zoom step.
        assert!((clustering_params(10).0 - eps / 2.0).abs() < 1e-12);
    }

    #[test]
    fn viewport_indices_cover_every_place_exactly_once() {
        let places = vec![
            test_place("alpha", 1, 1.0, 1.0),
            test_place("alpha", 2, 1.0001, 1.0),
            test_place("alpha", 3, 1.0, 1.0001),
            test_place("alpha", 4, 120.0, 60.0),
        ];
        let trees = build_polling_indices(&places);
        assert_eq!(
            trees.keys().copied().collect::<Vec<u32>>(),
            ((MIN_POLLING_PLACE_ZOOM + 1)..=UNGROUPED_POLLING_ZOOM).collect::<Vec<u32>>()
        );
        for tree in trees.values() {
            let mut covered: Vec<usize> = Vec::new();
            for entry in tree.iter() {
                match entry {
                    PollingEntry::Group(group) => covered.extend(group.members.iter().copied()),
                    PollingEntry::Place { index, .. } => covered.push(*index),
                }
            }
            covered.sort_unstable();
            assert_eq!(covered, vec![0, 1, 2, 3]);
        }
        // The far-away place is an individual entry at the deepest zoom.
        assert!(trees[&UNGROUPED_POLLING_ZOOM]
            .iter()
            .any(|e| matches!(e, PollingEntry::Place { index: 3, .. })));
    }
}
