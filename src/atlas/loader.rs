use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use shapefile::dbase::{FieldValue, Record};
use shapefile::Shape;
use tracing::{info, warn};

use super::district::{District, DistrictPolygon};
use crate::geom::split_polygon_rings;
use crate::zoom::ZoomBuckets;

/// Load every district from `<root>/<bucket>/*.shp`, most detailed bucket
/// first. Returns districts sorted by id.
pub(crate) fn load_districts(root: &Path, buckets: &ZoomBuckets) -> Result<Vec<District>> {
    let mut districts: BTreeMap<String, District> = BTreeMap::new();
    for &bucket in buckets.levels().iter().rev() {
        let dir = root.join(bucket.to_string());
        info!(bucket, dir = %dir.display(), "loading zoom bucket");
        for path in shapefile_paths(&dir)? {
            load_district_file(&path, bucket, &mut districts)
                .with_context(|| format!("Failed loading {}", path.display()))?;
        }
    }
    ensure!(!districts.is_empty(), "no districts found under {}", root.display());

    // Containment walks the most detailed polygons and the viewport walks the
    // least detailed ones, so a bucket gap would silently skew answers.
    for district in districts.values() {
        for &bucket in buckets.levels() {
            ensure!(
                district.polygons.contains_key(&bucket),
                "district '{}' has no polygons at zoom bucket {}",
                district.id,
                bucket
            );
        }
    }

    Ok(districts.into_values().collect())
}

fn shapefile_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read bucket directory {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(OsStr::to_str) == Some("shp") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_district_file(
    path: &Path,
    bucket: u32,
    districts: &mut BTreeMap<String, District>,
) -> Result<()> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile {}", path.display()))?;

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.context("Error reading shape and record")?;
        let polygon = match shape {
            Shape::Polygon(polygon) => polygon,
            other => {
                // Null shapes (and anything else unexpected) are skipped.
                warn!(feature = index, shape_type = ?other.shapetype(), "expected polygon geometry");
                continue;
            }
        };

        let cent_lat = numeric_attr(&record, "cent_lat")
            .with_context(|| format!("feature {index}: expected float centroid latitude in field cent_lat"))?;
        let cent_lon = numeric_attr(&record, "cent_long")
            .with_context(|| format!("feature {index}: expected float centroid longitude in field cent_long"))?;
        let area = numeric_attr(&record, "area")
            .with_context(|| format!("feature {index}: expected area field of type float"))?;
        let gis_id = character_attr(&record, "gis_id")?;
        let name = corrected_name(&character_attr(&record, "sortname")?);
        // The (corrected) sortname, lowercased, is the district id.
        let id = name.to_lowercase();

        let polygons: Vec<DistrictPolygon> = split_polygon_rings(&polygon)
            .into_iter()
            .map(|shape| DistrictPolygon {
                shape,
                gis_id: gis_id.clone(),
                cent_lon,
                cent_lat,
                area,
                polling_places: Vec::new(),
            })
            .collect();
        if polygons.is_empty() {
            warn!(feature = index, "polygon record with no rings");
            continue;
        }

        match districts.get_mut(&id) {
            // Seen at a more detailed bucket already; only the geometry for
            // this bucket is new, the metadata is not.
            Some(district) => {
                for polygon in polygons {
                    district.add_polygon(bucket, polygon);
                }
            }
            None => {
                let area_sqkm = numeric_attr(&record, "area_sqkm")
                    .with_context(|| format!("feature {index}: expected area_sqkm field of type float"))?;
                let state = character_attr(&record, "state")?;
                let district = District::new(id.clone(), name, state, area_sqkm, bucket, polygons)?;
                districts.insert(id, district);
            }
        }
    }

    Ok(())
}

/// Get the value of a character field from a record.
fn character_attr(record: &Record, field: &str) -> Result<String> {
    match record.get(field) {
        Some(FieldValue::Character(Some(s))) => Ok(s.trim().to_string()),
        _ => bail!("missing or invalid character field: {}", field),
    }
}

/// Get the value of a numeric field from a record. Some exports store
/// numbers as padded text, so character fields are parsed too.
fn numeric_attr(record: &Record, field: &str) -> Result<f64> {
    match record.get(field) {
        Some(FieldValue::Numeric(Some(n))) => Ok(*n),
        Some(FieldValue::Float(Some(n))) => Ok(f64::from(*n)),
        Some(FieldValue::Character(Some(s))) => s
            .trim()
            .parse()
            .with_context(|| format!("field {field} is not a number: '{s}'")),
        _ => bail!("missing or invalid numeric field: {}", field),
    }
}

fn corrected_name(name: &str) -> String {
    // Two districts arrive miscased in the source attribute table.
    match name {
        "Mcpherson" => "McPherson".to_string(),
        "Mcmillan" => "McMillan".to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_corrections_apply_to_exact_matches_only() {
        assert_eq!(corrected_name("Mcpherson"), "McPherson");
        assert_eq!(corrected_name("Mcmillan"), "McMillan");
        assert_eq!(corrected_name("Macquarie"), "Macquarie");
        assert_eq!(corrected_name("mcpherson"), "mcpherson");
    }

    #[test]
    fn ids_are_lowercased_corrected_names() {
        assert_eq!(corrected_name("Mcpherson").to_lowercase(), "mcpherson");
        assert_eq!(corrected_name("Sydney").to_lowercase(), "sydney");
    }
}
