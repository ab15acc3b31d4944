use geo::{Coord, LineString, Polygon};

// Ray-casting point-in-polygon, horizontal ray towards +x. A polygon here is
// one outer ring plus any number of holes; rings never overlap, so parity
// across rings (even-odd) decides containment.

/// Returns true when `pt` lies inside `polygon`. Any degenerate ring (open,
/// or fewer than three vertices) makes the whole polygon reject the point.
pub(crate) fn polygon_contains(pt: Coord<f64>, polygon: &Polygon<f64>) -> bool {
    let mut inside = false;
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors().iter()) {
        match ring_contains(pt, ring) {
            Some(true) => inside = !inside,
            Some(false) => {}
            None => return false,
        }
    }
    inside
}

/// Odd-crossing test for a single closed ring; `None` if the ring is degenerate.
fn ring_contains(pt: Coord<f64>, ring: &LineString<f64>) -> Option<bool> {
    let points = &ring.0;
    if points.len() < 3 || points.first() != points.last() {
        return None;
    }
    let mut inside = false;
    for segment in points.windows(2) {
        if ray_intersects_segment(pt, segment[0], segment[1]) {
            inside = !inside;
        }
    }
    Some(inside)
}

fn ray_intersects_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x
}
