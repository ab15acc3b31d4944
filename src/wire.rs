use serde_json::{json, Map, Value};

use crate::atlas::{ClusterGroup, District, DistrictPolygon, PollingPlace};
use crate::geom::{polyline, BBox};

pub(crate) const TYPE_ELECTORATE_IDS: &str = "electorate_ids";
pub(crate) const TYPE_ELECTORATE_LABEL: &str = "electorate_label";
pub(crate) const TYPE_POLLING_PLACE: &str = "polling_place";
pub(crate) const TYPE_POLLING_PLACE_GROUP: &str = "polling_place_group";

/// A GeoJSON-shaped feature collection under assembly. Features are plain
/// JSON values so the plain and encoded-geometry kinds mix freely.
#[derive(Debug, Default)]
pub(crate) struct FeatureCollection {
    bbox: Option<BBox>,
    features: Vec<Value>,
}

impl FeatureCollection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, feature: Value) {
        self.features.push(feature);
    }

    pub(crate) fn extend_bbox(&mut self, bbox: &BBox) {
        match &mut self.bbox {
            Some(current) => current.extend(bbox),
            None => self.bbox = Some(*bbox),
        }
    }

    pub(crate) fn extend_bbox_point(&mut self, lng: f64, lat: f64) {
        match &mut self.bbox {
            Some(current) => current.extend_point(lng, lat),
            None => self.bbox = Some(BBox::new(lng, lat, lng, lat)),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        let mut collection = Map::new();
        collection.insert("type".to_string(), json!("FeatureCollection"));
        if let Some(bbox) = self.bbox {
            collection.insert("bbox".to_string(), json!(bbox.to_array()));
        }
        collection.insert("features".to_string(), Value::Array(self.features));
        Value::Object(collection)
    }
}

/// The geometry-less feature carrying the ids of every district a viewport
/// intersects (or the single pseudo-id `all`).
pub(crate) fn electorate_ids_feature(ids: &[String]) -> Value {
    json!({
        "id": TYPE_ELECTORATE_IDS,
        "type": "Feature",
        "geometry": null,
        "properties": {
            "type": TYPE_ELECTORATE_IDS,
            "electorates": ids,
        },
    })
}

/// One label anchor per polygon large enough to carry the district's name.
pub(crate) fn label_feature(id: &str, name: &str, locations: &[[f64; 2]]) -> Value {
    json!({
        "id": id,
        "type": "Feature",
        "geometry": {
            "type": "MultiPoint",
            "coordinates": locations,
        },
        "properties": {
            "type": TYPE_ELECTORATE_LABEL,
            "name": name,
        },
    })
}

/// A single polling place as a point feature; the whole record rides along in
/// the properties. `min_zoom` is zero except in the per-district polling
/// response, where the client needs the real value.
pub(crate) fn place_feature(place: &PollingPlace, min_zoom: u32) -> Result<Value, serde_json::Error> {
    let mut properties = match serde_json::to_value(place)? {
        Value::Object(map) => map,
        other => {
            return Err(serde::ser::Error::custom(format!(
                "polling place serialized to non-object: {other:?}"
            )))
        }
    };
    properties.insert("type".to_string(), json!(TYPE_POLLING_PLACE));
    properties.insert("minZoom".to_string(), json!(min_zoom));
    Ok(json!({
        "id": place.place_id.to_string(),
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [place.lng, place.lat],
        },
        "properties": properties,
    }))
}

/// A cluster marker standing in for its member polling places.
pub(crate) fn group_feature(group: &ClusterGroup, id: &str) -> Value {
    json!({
        "id": id,
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [group.lng, group.lat],
        },
        "properties": {
            "type": TYPE_POLLING_PLACE_GROUP,
            "count": group.members.len(),
            "minZoom": group.min_zoom,
            // Same casing as the individual polling place notation.
            "DivisionName": group.division,
        },
    })
}

/// A district's geometry at one bucket as a MultiPolygon feature, or with
/// every ring polyline-encoded when the encoded wire format is enabled.
pub(crate) fn district_feature(
    district: &District,
    polygons: &[DistrictPolygon],
    encoded: bool,
) -> Value {
    let centroids: Vec<[f64; 2]> =
        polygons.iter().map(|p| [p.cent_lon, p.cent_lat]).collect();

    let geometry = if encoded {
        let coordinates: Vec<Vec<String>> = polygons
            .iter()
            .map(|polygon| {
                std::iter::once(polygon.shape.exterior())
                    .chain(polygon.shape.interiors().iter())
                    .map(polyline::encode_ring)
                    .collect()
            })
            .collect();
        json!({ "type": "EncodedMultiPolygon", "coordinates": coordinates })
    } else {
        let coordinates: Vec<Vec<Vec<[f64; 2]>>> = polygons
            .iter()
            .map(|polygon| {
                std::iter::once(polygon.shape.exterior())
                    .chain(polygon.shape.interiors().iter())
                    .map(|ring| ring.0.iter().map(|c| [c.x, c.y]).collect())
                    .collect()
            })
            .collect();
        json!({ "type": "MultiPolygon", "coordinates": coordinates })
    };

    json!({
        "id": district.id,
        "type": "Feature",
        "bbox": district.bbox.to_array(),
        "geometry": geometry,
        "properties": {
            "name": district.name,
            "state": district.state,
            "area_sqkm": district.area_sqkm,
            "centroid": centroids,
        },
    })
}
