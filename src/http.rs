use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::atlas::Atlas;
use crate::error::QueryError;
use crate::geom::parse_bbox;
use crate::zoom::parse_zoom;

/// Register the API routes on an actix application.
pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/electorates/{zoom}", web::get().to(electorates))
        .route("/location", web::get().to(location))
        .route("/viewport/{zoom}", web::get().to(viewport))
        .route("/zoom_buckets", web::get().to(zoom_buckets))
        .route("/polling_places", web::get().to(polling_places));
}

#[derive(Debug, Deserialize)]
struct IdsQuery {
    ids: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BboxQuery {
    bbox: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationQuery {
    location: Option<String>,
}

/// Successful responses are cacheable JSON.
fn json_response(value: &Value) -> Result<HttpResponse, QueryError> {
    let body = serde_json::to_string(value)?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "public, max-age=120"))
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .body(body))
}

async fn electorates(
    atlas: web::Data<Atlas>,
    path: web::Path<String>,
    query: web::Query<IdsQuery>,
) -> Result<HttpResponse, QueryError> {
    let (bucket, _) = parse_zoom(&path.into_inner(), atlas.buckets())?;
    let ids = query.ids.as_deref().filter(|ids| !ids.is_empty()).ok_or(QueryError::MissingIds)?;
    let fc = atlas.query_districts(bucket, ids)?;
    json_response(&fc.into_value())
}

async fn location(
    atlas: web::Data<Atlas>,
    query: web::Query<LocationQuery>,
) -> Result<HttpResponse, QueryError> {
    let raw = query
        .location
        .as_deref()
        .filter(|location| !location.is_empty())
        .ok_or(QueryError::InvalidLocation)?;
    let (lat, lng) = parse_location(raw)?;
    match atlas.query_location(lng, lat) {
        Some(name) => json_response(&json!({ "Name": name })),
        None => Ok(HttpResponse::NotFound().body("not found")),
    }
}

async fn viewport(
    atlas: web::Data<Atlas>,
    path: web::Path<String>,
    query: web::Query<BboxQuery>,
) -> Result<HttpResponse, QueryError> {
    let (_bucket, raw_zoom) = parse_zoom(&path.into_inner(), atlas.buckets())?;
    let rect = parse_bbox(query.bbox.as_deref().unwrap_or_default())?;
    let fc = atlas.query_viewport(&rect, raw_zoom)?;
    json_response(&fc.into_value())
}

async fn zoom_buckets(atlas: web::Data<Atlas>) -> Result<HttpResponse, QueryError> {
    json_response(&json!(atlas.zoom_levels()))
}

async fn polling_places(
    atlas: web::Data<Atlas>,
    query: web::Query<IdsQuery>,
) -> Result<HttpResponse, QueryError> {
    let ids = query.ids.as_deref().filter(|ids| !ids.is_empty()).ok_or(QueryError::MissingIds)?;
    let fc = atlas.query_polling_places(ids)?;
    json_response(&fc.into_value())
}

/// The location parameter arrives as `lat,lng` (not GeoJSON order).
fn parse_location(s: &str) -> Result<(f64, f64), QueryError> {
    let mut parts = s.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lng), None) => Ok((
            lat.parse().map_err(|_| QueryError::InvalidLocation)?,
            lng.parse().map_err(|_| QueryError::InvalidLocation)?,
        )),
        _ => Err(QueryError::InvalidLocation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::polling::test_place;
    use crate::atlas::{District, DistrictPolygon};
    use crate::zoom::ZoomBuckets;
    use actix_web::{test, App};
    use geo::{Coord, LineString, Polygon};
    use std::collections::BTreeMap;

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

    fn test_atlas() -> Atlas {
        let polygon = |min_x: f64, min_y: f64, size: f64| DistrictPolygon {
            shape: square(min_x, min_y, size),
            gis_id: "g".into(),
            cent_lon: min_x + size / 2.0,
            cent_lat: min_y + size / 2.0,
            area: 1e6,
            polling_places: vec![],
        };
        let make = |id: &str, name: &str, min_x: f64| {
            let mut district = District::new(
                id.into(),
                name.into(),
                "NSW".into(),
                100.0,
                9,
                vec![polygon(min_x, -34.0, 0.5)],
            )
            .unwrap();
            district.add_polygon(6, polygon(min_x, -34.0, 0.5));
            district
        };
        Atlas::from_parts(
            vec![make("macquarie", "Macquarie", 150.0), make("sydney", "Sydney", 151.0)],
            vec![test_place("sydney", 1, 151.2, -33.85)],
            vec![0],
            ZoomBuckets::of(&[6, 9]),
            BTreeMap::new(),
        )
    }

    async fn get(path: &str) -> (u16, actix_web::http::header::HeaderMap, Vec<u8>) {
        let app = test::init_service(
            App::new().app_data(web::Data::new(test_atlas())).configure(configure),
        )
        .await;
        let req = test::TestRequest::get().uri(path).to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = test::read_body(resp).await.to_vec();
        (status, headers, body)
    }

    #[actix_web::test]
    async fn zoom_buckets_lists_the_discovered_levels() {
        let (status, headers, body) = get("/zoom_buckets").await;
        assert_eq!(status, 200);
        assert_eq!(headers.get("Cache-control").unwrap(), "public, max-age=120");
        assert_eq!(headers.get("Content-type").unwrap(), "application/json");
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!([6, 9]));
    }

    #[actix_web::test]
    async fn location_resolves_to_a_district_name() {
        let (status, _, body) = get("/location?location=-33.8567844,151.2152967").await;
        assert_eq!(status, 200);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"Name": "Sydney"}));
    }

    #[actix_web::test]
    async fn location_misses_are_404_not_500() {
        let (status, _, _) = get("/location?location=0,0").await;
        assert_eq!(status, 404);
    }

    #[actix_web::test]
    async fn malformed_location_is_rejected() {
        for path in [
            "/location",
            "/location?location=",
            "/location?location=abc,151.2",
            "/location?location=-33.85",
            "/location?location=1,2,3",
        ] {
            let (status, _, _) = get(path).await;
            assert_eq!(status, 400, "{path}");
        }
    }

    #[actix_web::test]
    async fn electorates_requires_ids_and_a_sane_zoom() {
        let (status, _, _) = get("/electorates/abc?ids=sydney").await;
        assert_eq!(status, 400);
        let (status, _, _) = get("/electorates/6").await;
        assert_eq!(status, 400);
        let (status, _, body) = get("/electorates/9?ids=all").await;
        assert_eq!(status, 400);
        assert_eq!(body, b"ids=all isn't allowed at zoom level 9");
    }

    #[actix_web::test]
    async fn electorates_returns_sorted_features() {
        let (status, _, body) = get("/electorates/6?ids=sydney,macquarie").await;
        assert_eq!(status, 200);
        let value: Value = serde_json::from_slice(&body).unwrap();
        let ids: Vec<&str> = value["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["macquarie", "sydney"]);
    }

    #[actix_web::test]
    async fn viewport_validates_zoom_and_bbox() {
        let (status, _, _) = get("/viewport/abc?bbox=-50,110,0,160").await;
        assert_eq!(status, 400);
        let (status, _, _) = get("/viewport/6?bbox=1,2,3").await;
        assert_eq!(status, 400);
        let (status, _, _) = get("/viewport/6").await;
        assert_eq!(status, 400);
        let (status, _, body) = get("/viewport/6?bbox=-50,110,0,160").await;
        assert_eq!(status, 200);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["features"][0]["id"], "electorate_ids");
    }

    #[actix_web::test]
    async fn polling_places_rejects_unknown_ids() {
        let (status, _, _) = get("/polling_places").await;
        assert_eq!(status, 400);
        let (status, _, body) = get("/polling_places?ids=atlantis").await;
        assert_eq!(status, 400);
        assert_eq!(body, b"Electorate not found for ID 'atlantis'");
    }
}
