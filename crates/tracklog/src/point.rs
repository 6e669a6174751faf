//! Recorded GPS samples and the segments that group them.

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

pub const MAX_LATITUDE: f64 = 90.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Returned when a coordinate pair falls outside the WGS84 degree ranges.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("coordinate out of range: lat={lat}, lon={lon}")]
pub struct InvalidCoordinate {
    pub lat: f64,
    pub lon: f64,
}

/// One recorded sample.
///
/// Elevation and timestamp are optional in GPX, so they stay `None` when the
/// source omits them rather than defaulting to zero.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Point {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
    timestamp: Option<OffsetDateTime>,
}

impl Point {
    pub fn new(
        lat: f64,
        lon: f64,
        elevation: Option<f64>,
        timestamp: Option<OffsetDateTime>,
    ) -> Result<Self, InvalidCoordinate> {
        let lat_ok = lat.is_finite() && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat);
        let lon_ok = lon.is_finite() && (-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&lon);
        if !lat_ok || !lon_ok {
            return Err(InvalidCoordinate { lat, lon });
        }

        Ok(Self {
            lat,
            lon,
            elevation,
            timestamp,
        })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn elevation(&self) -> Option<f64> {
        self.elevation
    }

    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        self.timestamp
    }

    /// The point as a `geo` coordinate (x = longitude, y = latitude).
    pub fn geo_point(&self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }
}

/// One continuous recording: a GPX `<trkseg>`. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Segment {
    points: Vec<Point>,
}

impl Segment {
    /// Returns `None` for an empty point list.
    pub fn new(points: Vec<Point>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self { points })
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Consecutive point pairs in recording order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Point, &Point)> {
        self.points.windows(2).map(|w| (&w[0], &w[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_point_accepts_range_boundaries() {
        assert!(Point::new(90.0, 180.0, None, None).is_ok());
        assert!(Point::new(-90.0, -180.0, None, None).is_ok());
        assert!(Point::new(0.0, 0.0, Some(-12.5), None).is_ok());
    }

    #[test]
    fn test_point_rejects_out_of_range() {
        assert_eq!(
            Point::new(95.0, 10.0, None, None),
            Err(InvalidCoordinate { lat: 95.0, lon: 10.0 })
        );
        assert!(Point::new(-90.0001, 0.0, None, None).is_err());
        assert!(Point::new(0.0, 180.5, None, None).is_err());
        assert!(Point::new(0.0, -181.0, None, None).is_err());
    }

    #[test]
    fn test_point_rejects_non_finite() {
        assert!(Point::new(f64::NAN, 0.0, None, None).is_err());
        assert!(Point::new(0.0, f64::INFINITY, None, None).is_err());
    }

    #[test]
    fn test_point_equality_and_ordering_by_fields() {
        let t = datetime!(2024-05-01 10:00:00 UTC);
        let a = Point::new(40.0, -105.0, Some(1650.0), Some(t)).unwrap();
        let b = Point::new(40.0, -105.0, Some(1650.0), Some(t)).unwrap();
        let c = Point::new(40.1, -105.0, Some(1650.0), Some(t)).unwrap();
        assert_eq!(a, b);
        assert!(a < c);

        // Absent elevation is distinct from 0m.
        let zero = Point::new(40.0, -105.0, Some(0.0), None).unwrap();
        let unknown = Point::new(40.0, -105.0, None, None).unwrap();
        assert_ne!(zero, unknown);
    }

    #[test]
    fn test_segment_rejects_empty() {
        assert!(Segment::new(Vec::new()).is_none());
    }

    #[test]
    fn test_segment_pairs() {
        let points: Vec<Point> = (0..4)
            .map(|i| Point::new(40.0 + f64::from(i) * 0.001, -105.0, None, None).unwrap())
            .collect();
        let segment = Segment::new(points).unwrap();
        assert_eq!(segment.len(), 4);
        assert_eq!(segment.pairs().count(), 3);

        let single = Segment::new(vec![Point::new(0.0, 0.0, None, None).unwrap()]).unwrap();
        assert_eq!(single.pairs().count(), 0);
    }
}
