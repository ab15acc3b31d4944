use geo::{Coord, LineString, Polygon};
use shapefile as shp;

/// Split a shapefile polygon record into single-outer-ring `geo::Polygon`s.
///
/// The shapefile polygon type is a multi-polygon container: a flat ring list
/// where each outer ring is followed by the holes it owns. The input data is
/// pre-split so a record normally carries exactly one outer ring, but the
/// grouping is done here regardless so the containment test never sees more
/// than one outer ring per polygon.
pub(crate) fn split_polygon_rings(polygon: &shp::Polygon) -> Vec<Polygon<f64>> {
    fn ensure_closed(coords: &mut Vec<Coord<f64>>) {
        if let Some(&first) = coords.first() {
            if coords.last() != Some(&first) {
                coords.push(first);
            }
        }
    }

    let mut polygons = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for ring in polygon.rings() {
        let mut coords: Vec<Coord<f64>> =
            ring.points().iter().map(|pt| Coord { x: pt.x, y: pt.y }).collect();
        ensure_closed(&mut coords);
        match ring {
            shp::PolygonRing::Outer(_) => {
                if let Some(ext) = exterior.take() {
                    polygons.push(Polygon::new(ext, std::mem::take(&mut holes)));
                }
                exterior = Some(LineString(coords));
            }
            shp::PolygonRing::Inner(_) => holes.push(LineString(coords)),
        }
    }
    if let Some(ext) = exterior {
        polygons.push(Polygon::new(ext, holes));
    }

    polygons
}
