//! WKT polygon helpers (spec §4.7).
//!
//! Normalization here has no access to a true buffer(0)-style self-intersection
//! repair (the corpus carries no geometry-buffering crate); it instead
//! canonicalizes winding order and vertex rotation and rounds coordinates,
//! which is sufficient for the dedup-key invariant (`normalize` is idempotent)
//! without claiming polygon-repair semantics.

use geo::{Contains, HaversineDistance, Intersects, Point};
use geo_types::{Geometry, LineString, Polygon};
use sha2::{Digest, Sha256};
use wkt::{ToWkt, TryFromWkt};

use crate::error::{Result, TileidxError};

const COORD_PRECISION: f64 = 1e6; // 6 decimal places, matching the Python reference's rounding.

/// Parse a WKT `Polygon` or `MultiPolygon`, rejecting empty geometries.
pub fn polygon_from_wkt(wkt_str: &str) -> Result<Geometry<f64>> {
    let geom = Geometry::<f64>::try_from_wkt_str(wkt_str)
        .map_err(|e| TileidxError::poison(format!("invalid WKT: {e}")))?;

    match &geom {
        Geometry::Polygon(p) if !p.exterior().0.is_empty() => Ok(geom),
        Geometry::MultiPolygon(mp) if !mp.0.is_empty() => Ok(geom),
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
            Err(TileidxError::poison("WKT geometry is empty"))
        }
        other => Err(TileidxError::poison(format!(
            "expected Polygon or MultiPolygon WKT, got {other:?}"
        ))),
    }
}

/// Build a rectangular WKT polygon from a bounding box.
pub fn bbox_to_wkt(minx: f64, miny: f64, maxx: f64, maxy: f64) -> String {
    let poly = Polygon::new(
        LineString::from(vec![
            (minx, miny),
            (maxx, miny),
            (maxx, maxy),
            (minx, maxy),
            (minx, miny),
        ]),
        vec![],
    );
    poly.wkt_string()
}

fn round_coord(v: f64) -> f64 {
    (v * COORD_PRECISION).round() / COORD_PRECISION
}

/// Rotate a ring so it starts at its lexicographically smallest coordinate,
/// giving a canonical starting point regardless of how the source drew it.
fn canonicalize_ring(ring: &LineString<f64>) -> LineString<f64> {
    let coords: Vec<_> = ring.0.iter().map(|c| (round_coord(c.x), round_coord(c.y))).collect();
    if coords.len() < 2 {
        return LineString::from(coords);
    }
    // Exterior rings are closed (first == last); rotate the open part only.
    let open = &coords[..coords.len() - 1];
    let min_idx = open
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated: Vec<_> = open[min_idx..].iter().chain(open[..min_idx].iter()).copied().collect();
    rotated.push(rotated[0]);
    LineString::from(rotated)
}

fn canonicalize_polygon(poly: &Polygon<f64>) -> Polygon<f64> {
    use geo::algorithm::orient::{Direction, Orient};
    let oriented = poly.orient(Direction::Default);
    let exterior = canonicalize_ring(oriented.exterior());
    let interiors: Vec<_> = oriented.interiors().iter().map(canonicalize_ring).collect();
    Polygon::new(exterior, interiors)
}

/// Normalize a WKT polygon/multipolygon: canonical winding + canonical
/// starting vertex + rounded coordinates. Idempotent: `normalize(normalize(w)) == normalize(w)`.
pub fn normalize_polygon_wkt(wkt_str: &str) -> Result<String> {
    let geom = polygon_from_wkt(wkt_str)?;
    let normalized = match geom {
        Geometry::Polygon(p) => Geometry::Polygon(canonicalize_polygon(&p)),
        Geometry::MultiPolygon(mp) => {
            let mut polys: Vec<_> = mp.0.iter().map(canonicalize_polygon).collect();
            polys.sort_by(|a, b| {
                a.exterior().0[0]
                    .x
                    .partial_cmp(&b.exterior().0[0].x)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Geometry::MultiPolygon(geo_types::MultiPolygon(polys))
        }
        other => other,
    };
    Ok(normalized.wkt_string())
}

/// SHA-256 of the normalized WKT plus any extra discriminators, used to
/// deduplicate tiles that describe the same footprint.
pub fn dedup_key(pixel_polygon_wkt: &str, extras: &[&str]) -> Result<String> {
    let normalized = normalize_polygon_wkt(pixel_polygon_wkt)?;
    let extra = extras.join("|");
    let payload = if extra.is_empty() {
        normalized
    } else {
        format!("{normalized}|{extra}")
    };
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Great-circle distance between two `(lat, lon)` points, in meters.
/// Shared by the retriever's geo non-maximum suppression and by any future
/// caller needing spatial distance outside a polygon predicate.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2))
}

/// Predicate mode for `filter_rows_by_polygon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonPredicate {
    Intersects,
    Within,
}

/// Filter `(row_index, wkt)` pairs against a query polygon, returning the
/// indices of rows that satisfy the predicate.
pub fn filter_by_polygon<'a>(
    rows: impl Iterator<Item = (usize, &'a str)>,
    query_wkt: &str,
    mode: PolygonPredicate,
) -> Result<Vec<usize>> {
    let query_geom = polygon_from_wkt(query_wkt)?;
    let mut kept = Vec::new();
    for (idx, wkt_str) in rows {
        let geom = match polygon_from_wkt(wkt_str) {
            Ok(g) => g,
            Err(_) => continue,
        };
        let matches = match mode {
            PolygonPredicate::Intersects => geom.intersects(&query_geom),
            PolygonPredicate::Within => query_geom.contains(&geom),
        };
        if matches {
            kept.push(idx);
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "POLYGON((0 0, 0 1, 1 1, 1 0, 0 0))";

    #[test]
    fn rejects_empty_geometry() {
        assert!(polygon_from_wkt("POLYGON EMPTY").is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_polygon_wkt(SQUARE).unwrap();
        let twice = normalize_polygon_wkt(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_is_rotation_invariant() {
        let rotated = "POLYGON((1 1, 1 0, 0 0, 0 1, 1 1))";
        assert_eq!(
            normalize_polygon_wkt(SQUARE).unwrap(),
            normalize_polygon_wkt(rotated).unwrap()
        );
    }

    #[test]
    fn dedup_key_is_deterministic() {
        let a = dedup_key(SQUARE, &["orthophoto"]).unwrap();
        let b = dedup_key(SQUARE, &["orthophoto"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dedup_key_changes_with_extras() {
        let a = dedup_key(SQUARE, &["orthophoto"]).unwrap();
        let b = dedup_key(SQUARE, &["satellite"]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn bbox_round_trips_through_wkt() {
        let wkt_str = bbox_to_wkt(0.0, 0.0, 2.0, 2.0);
        let geom = polygon_from_wkt(&wkt_str).unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
    }

    #[test]
    fn haversine_is_zero_for_identical_points() {
        assert_eq!(haversine_m(40.0, -74.0, 40.0, -74.0), 0.0);
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = haversine_m(40.0, -74.0, 41.0, -75.0);
        let b = haversine_m(41.0, -75.0, 40.0, -74.0);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn filter_by_polygon_intersects() {
        let inside = "POLYGON((0.2 0.2, 0.2 0.5, 0.5 0.5, 0.5 0.2, 0.2 0.2))";
        let outside = "POLYGON((5 5, 5 6, 6 6, 6 5, 5 5))";
        let rows = vec![(0usize, inside), (1usize, outside)];
        let kept = filter_by_polygon(rows.into_iter(), SQUARE, PolygonPredicate::Intersects).unwrap();
        assert_eq!(kept, vec![0]);
    }
}
