//! Geographic and planar geometry utilities.
//!
//! All analysis runs in a local metric frame. Geographic input is projected
//! with a [`LocalProjection`] (equirectangular around the data's center), which
//! keeps distances within a fraction of a percent over regional extents.

use geo::{
    Closest, ClosestPoint, Coord, Distance, Euclidean, Intersects, Line, LineString, Point,
};
use serde::{Deserialize, Serialize};

use crate::{Bounds, GpsPoint};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Calculate the great-circle distance between two GPS points in meters.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Equirectangular projection around a fixed origin.
///
/// `x` grows east, `y` grows north, both in meters from the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalProjection {
    pub origin: GpsPoint,
    cos_lat: f64,
}

impl LocalProjection {
    pub fn new(origin: GpsPoint) -> Self {
        Self {
            origin,
            cos_lat: origin.latitude.to_radians().cos().max(1e-6),
        }
    }

    /// Projection centered on the bounds' center.
    pub fn from_bounds(bounds: &Bounds) -> Self {
        Self::new(bounds.center())
    }

    pub fn project(&self, point: &GpsPoint) -> Coord<f64> {
        Coord {
            x: (point.longitude - self.origin.longitude) * METERS_PER_DEGREE * self.cos_lat,
            y: (point.latitude - self.origin.latitude) * METERS_PER_DEGREE,
        }
    }

    pub fn unproject(&self, coord: Coord<f64>) -> GpsPoint {
        GpsPoint::new(
            self.origin.latitude + coord.y / METERS_PER_DEGREE,
            self.origin.longitude + coord.x / (METERS_PER_DEGREE * self.cos_lat),
        )
    }

    /// Project a coordinate stored as (x = longitude, y = latitude).
    pub fn project_lng_lat(&self, coord: Coord<f64>) -> Coord<f64> {
        self.project(&GpsPoint::new(coord.y, coord.x))
    }
}

/// Euclidean distance between two planar coordinates.
#[inline]
pub fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Euclidean::distance(Point::from(a), Point::from(b))
}

/// Planar length of a line string in meters.
pub fn line_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| coord_distance(l.start, l.end)).sum()
}

/// Shortest distance from a point to a line piece.
pub fn distance_to_line(point: Point<f64>, line: &Line<f64>) -> f64 {
    match line.closest_point(&point) {
        Closest::Intersection(_) => 0.0,
        Closest::SinglePoint(p) => Euclidean::distance(point, p),
        Closest::Indeterminate => coord_distance(point.0, line.start),
    }
}

/// Shortest distance between two line pieces (zero when they cross).
pub fn line_to_line_distance(a: &Line<f64>, b: &Line<f64>) -> f64 {
    if a.intersects(b) {
        return 0.0;
    }
    distance_to_line(a.start_point(), b)
        .min(distance_to_line(a.end_point(), b))
        .min(distance_to_line(b.start_point(), a))
        .min(distance_to_line(b.end_point(), a))
}

/// Resample a polyline so no two consecutive vertices are more than
/// `max_step` apart. Input vertices are kept.
pub fn densify(coords: &[Coord<f64>], max_step: f64) -> Vec<Coord<f64>> {
    if coords.len() < 2 || max_step <= 0.0 {
        return coords.to_vec();
    }

    let mut out = Vec::with_capacity(coords.len());
    out.push(coords[0]);
    for pair in coords.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let len = coord_distance(a, b);
        let steps = (len / max_step).ceil() as usize;
        for k in 1..steps {
            let t = k as f64 / steps as f64;
            out.push(Coord {
                x: a.x + (b.x - a.x) * t,
                y: a.y + (b.y - a.y) * t,
            });
        }
        out.push(b);
    }
    out
}

/// Remove consecutive duplicate vertices.
pub fn dedup_coords(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for &c in coords {
        if out.last().map_or(true, |last| coord_distance(*last, c) > 1e-9) {
            out.push(c);
        }
    }
    out
}

/// Arithmetic mean of coordinates.
pub fn mean_coord(coords: &[Coord<f64>]) -> Option<Coord<f64>> {
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let (sx, sy) = coords
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some(Coord { x: sx / n, y: sy / n })
}
