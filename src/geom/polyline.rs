use geo::LineString;

// Variable-precision polyline encoding of linear rings: each coordinate is
// scaled by 1e5, delta-encoded against the previous point, zigzagged, split
// into 5-bit chunks and offset by 63 into printable ASCII.
//
// The wire order is (lat, lng) per point, which is the REVERSE of the
// GeoJSON (lng, lat) ring order; decoders must swap axes.

const PRECISION: f64 = 1e5;

/// Encode a ring's coordinates as a polyline string, emitting (lat, lng).
pub(crate) fn encode_ring(ring: &LineString<f64>) -> String {
    let mut out = String::new();
    let (mut prev_lat, mut prev_lng) = (0i64, 0i64);
    for coord in &ring.0 {
        let lat = (coord.y * PRECISION).round() as i64;
        let lng = (coord.x * PRECISION).round() as i64;
        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }
    out
}

fn encode_value(value: i64, out: &mut String) {
    // Zigzag so small negative deltas stay short.
    let mut v = value << 1;
    if value < 0 {
        v = !v;
    }
    while v >= 0x20 {
        out.push((((0x20 | (v & 0x1f)) + 63) as u8) as char);
        v >>= 5;
    }
    out.push(((v + 63) as u8) as char);
}

/// Decode a polyline back to (lat, lng) pairs; `None` on truncated input.
pub(crate) fn decode(encoded: &str) -> Option<Vec<(f64, f64)>> {
    let bytes = encoded.as_bytes();
    let mut coords = Vec::new();
    let (mut lat, mut lng) = (0i64, 0i64);
    let mut pos = 0;
    while pos < bytes.len() {
        let (delta, next) = decode_value(bytes, pos)?;
        lat += delta;
        let (delta, next) = decode_value(bytes, next)?;
        lng += delta;
        pos = next;
        coords.push((lat as f64 / PRECISION, lng as f64 / PRECISION));
    }
    Some(coords)
}

fn decode_value(bytes: &[u8], mut pos: usize) -> Option<(i64, usize)> {
    let mut result = 0i64;
    let mut shift = 0u32;
    loop {
        let chunk = i64::from(*bytes.get(pos)?) - 63;
        pos += 1;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    let delta = if result & 1 != 0 { !(result >> 1) } else { result >> 1 };
    Some((delta, pos))
}
