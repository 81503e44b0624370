//! Planar geometry on (longitude, latitude) coordinates.
//!
//! Contains helper functions for:
//! - Point-in-polygon tests (even-odd ray casting)
//! - Segment sampling with antimeridian-aware longitude interpolation
//! - Segment-segment intersection with collinear handling
//! - Segment-polygon intersection built on the above
//!
//! Longitude is treated as x and latitude as y throughout. Nothing here
//! models the sphere; region tests operate on the flat lat/lon chart.

/// Point on the lat/lon chart. `x` is longitude, `y` is latitude, both degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Point { x: lon, y: lat }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Number of intervals a segment is split into when sampling; yields 21 points.
pub const SEGMENT_SAMPLE_STEPS: usize = 20;

/// Even-odd ray casting test.
///
/// Casts a horizontal ray from `p` and counts boundary crossings. Polygons
/// with fewer than three vertices never contain anything, and neither do
/// non-finite points.
///
/// # Parameters
///
/// * `p` - The point to classify
/// * `polygon` - Vertices in order; the closing edge is implicit
///
/// # Returns
///
/// `true` if the point lies inside the polygon.
pub fn point_in_polygon(p: &Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 || !p.is_finite() {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = &polygon[i];
        let b = &polygon[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Wrap a longitude into [-180, 180].
pub fn normalize_lon(lon: f64) -> f64 {
    let mut l = (lon + 180.0) % 360.0;
    if l < 0.0 {
        l += 360.0;
    }
    l - 180.0
}

/// Longitude delta from `lon1` to `lon2` along the shorter arc.
fn short_arc_delta(lon1: f64, lon2: f64) -> f64 {
    let mut d = lon2 - lon1;
    if d > 180.0 {
        d -= 360.0;
    } else if d < -180.0 {
        d += 360.0;
    }
    d
}

/// Sample a segment at `SEGMENT_SAMPLE_STEPS + 1` equally spaced points,
/// endpoints included.
///
/// Latitude is interpolated linearly. Longitude follows the shorter arc and
/// is wrapped back into [-180, 180], so a segment from 170° to -170° passes
/// through 180° instead of sweeping across the whole chart.
pub fn sample_segment(a: &Point, b: &Point) -> impl Iterator<Item = Point> + use<> {
    let (ax, ay) = (a.x, a.y);
    let dx = short_arc_delta(a.x, b.x);
    let dy = b.y - a.y;
    (0..=SEGMENT_SAMPLE_STEPS).map(move |i| {
        let t = i as f64 / SEGMENT_SAMPLE_STEPS as f64;
        let x = ax + dx * t;
        Point {
            x: if dx == 0.0 { x } else { normalize_lon(x) },
            y: ay + dy * t,
        }
    })
}

/// Orientation of ordered triplet (a,b,c): returns 1 if clockwise, -1 if
/// counter-clockwise, and 0 if collinear.
fn orientation(a: &Point, b: &Point, c: &Point) -> i32 {
    let val = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if val > 0.0 {
        1
    } else if val < 0.0 {
        -1
    } else {
        0
    }
}

/// True if point b lies on segment a-c, assuming collinearity.
fn on_segment(a: &Point, b: &Point, c: &Point) -> bool {
    b.x >= a.x.min(c.x) && b.x <= a.x.max(c.x) && b.y >= a.y.min(c.y) && b.y <= a.y.max(c.y)
}

/// Segment-segment intersection including endpoint touching and collinear overlap.
pub fn segments_intersect(p1: &Point, q1: &Point, p2: &Point, q2: &Point) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(p1, p2, q1)) || (o2 == 0 && on_segment(p1, q2, q1)) || (o3 == 0 && on_segment(p2, p1, q2)) || (o4 == 0 && on_segment(p2, q1, q2))
}

/// Exact segment vs. polygon test: an endpoint inside, or any boundary edge crossed.
///
/// A segment whose longitude span exceeds 180° is split at the antimeridian
/// so each half is tested on the chart without wrapping.
pub fn segment_intersects_polygon(a: &Point, b: &Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 || !a.is_finite() || !b.is_finite() {
        return false;
    }

    let dx = b.x - a.x;
    if dx.abs() > 180.0 {
        // Crosses the antimeridian along the short arc
        let short = short_arc_delta(a.x, b.x);
        let edge_x = if short > 0.0 { 180.0 } else { -180.0 };
        let t = (edge_x - a.x) / short;
        let y_mid = a.y + (b.y - a.y) * t;
        let first_end = Point { x: edge_x, y: y_mid };
        let second_start = Point { x: -edge_x, y: y_mid };
        return segment_intersects_polygon(a, &first_end, polygon) || segment_intersects_polygon(&second_start, b, polygon);
    }

    if point_in_polygon(a, polygon) || point_in_polygon(b, polygon) {
        return true;
    }

    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        if segments_intersect(a, b, &polygon[j], &polygon[i]) {
            return true;
        }
        j = i;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> Point {
        Point::from_lat_lon(lat, lon)
    }

    fn square() -> Vec<Point> {
        vec![p(0.0, 0.0), p(0.0, 10.0), p(10.0, 10.0), p(10.0, 0.0)]
    }

    #[test]
    fn point_in_square_polygon() {
        let poly = square();
        assert!(point_in_polygon(&p(5.0, 5.0), &poly));
        assert!(!point_in_polygon(&p(50.0, 50.0), &poly));
        assert!(!point_in_polygon(&p(-1.0, 5.0), &poly));
    }

    #[test]
    fn degenerate_polygons_never_match() {
        assert!(!point_in_polygon(&p(0.0, 0.0), &[]));
        assert!(!point_in_polygon(&p(0.0, 0.0), &[p(0.0, 0.0), p(1.0, 1.0)]));
        assert!(!point_in_polygon(&p(f64::NAN, 5.0), &square()));
    }

    #[test]
    fn sampling_yields_21_points_with_endpoints() {
        let samples: Vec<Point> = sample_segment(&p(0.0, 0.0), &p(20.0, 40.0)).collect();
        assert_eq!(samples.len(), 21);
        assert_eq!(samples[0], p(0.0, 0.0));
        assert!((samples[20].x - 40.0).abs() < 1e-12);
        assert!((samples[20].y - 20.0).abs() < 1e-12);
        assert!((samples[1].x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sampling_takes_short_way_across_antimeridian() {
        let samples: Vec<Point> = sample_segment(&p(0.0, 170.0), &p(0.0, -170.0)).collect();
        // Every sample stays within 10 degrees of the antimeridian
        assert!(samples.iter().all(|s| s.x.abs() >= 170.0 - 1e-9));
    }

    #[test]
    fn segments_intersect_basic_cases() {
        assert!(segments_intersect(&p(0.0, 0.0), &p(10.0, 10.0), &p(10.0, 0.0), &p(0.0, 10.0)));
        // Collinear overlap
        assert!(segments_intersect(&p(0.0, 0.0), &p(0.0, 10.0), &p(0.0, 5.0), &p(0.0, 15.0)));
        // Disjoint
        assert!(!segments_intersect(&p(0.0, 0.0), &p(1.0, 1.0), &p(2.0, 2.0), &p(3.0, 3.0)));
    }

    #[test]
    fn exact_intersection_catches_thin_polygon() {
        // 0.1 degree wide sliver between samples of a 0..20 longitude segment
        let sliver = vec![p(-5.0, 10.02), p(5.0, 10.02), p(5.0, 10.08), p(-5.0, 10.08)];
        let a = p(0.0, 0.0);
        let b = p(0.0, 20.5);
        assert!(!sample_segment(&a, &b).any(|s| point_in_polygon(&s, &sliver)));
        assert!(segment_intersects_polygon(&a, &b, &sliver));
    }

    #[test]
    fn exact_intersection_splits_at_antimeridian() {
        let pacific = vec![p(-5.0, 175.0), p(5.0, 175.0), p(5.0, 180.0), p(-5.0, 180.0)];
        assert!(segment_intersects_polygon(&p(0.0, 170.0), &p(0.0, -170.0), &pacific));
        let atlantic = vec![p(-5.0, -30.0), p(5.0, -30.0), p(5.0, -20.0), p(-5.0, -20.0)];
        assert!(!segment_intersects_polygon(&p(0.0, 170.0), &p(0.0, -170.0), &atlantic));
    }

    #[test]
    fn normalize_lon_wraps() {
        assert!((normalize_lon(190.0) + 170.0).abs() < 1e-12);
        assert!((normalize_lon(-190.0) - 170.0).abs() < 1e-12);
        assert!((normalize_lon(45.0) - 45.0).abs() < 1e-12);
    }
}
