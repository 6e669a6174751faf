//! Summary statistics over a parsed track.
//!
//! Each statistic is a small accumulator fed every point in order, told when a
//! new segment begins, and asked for its result at the end. Nothing is chained
//! across a segment boundary: the gap between two recordings was not
//! travelled, so it contributes no distance, climb or moving time.

use geo::{BoundingRect as _, LineString};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::point::{Point, Segment};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

pub const DEFAULT_NOISE_THRESHOLD_METERS: f64 = 1.0;
pub const DEFAULT_STILLNESS_THRESHOLD_MPS: f64 = 0.5;

/// Tunable thresholds for the statistics engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Elevation changes smaller than this (in meters) are treated as jitter.
    pub noise_threshold_meters: f64,
    /// Pairs slower than this (in m/s) do not count towards moving time.
    pub stillness_threshold_mps: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            noise_threshold_meters: DEFAULT_NOISE_THRESHOLD_METERS,
            stillness_threshold_mps: DEFAULT_STILLNESS_THRESHOLD_MPS,
        }
    }
}

/// Geographic extent of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

/// Derived metrics for a whole track. `None` means the input had no data for
/// that metric, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackStatistics {
    pub total_distance_meters: f64,
    pub elevation_gain_meters: Option<f64>,
    pub elevation_loss_meters: Option<f64>,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub duration_seconds: Option<f64>,
    pub moving_duration_seconds: Option<f64>,
    pub max_speed_meters_per_second: Option<f64>,
    pub point_count: usize,
    pub segment_count: usize,
    pub bounds: Option<Bounds>,
}

/// Pairs left out of the time-based metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsDiagnostics {
    /// Timed pairs whose elapsed time was zero or negative.
    pub skipped_time_pairs: usize,
    /// Timed pairs slower than the stillness threshold.
    pub still_pairs: usize,
}

/// Great-circle distance in meters between two points.
pub fn haversine_distance(a: &Point, b: &Point) -> f64 {
    let lat1_rad = a.lat().to_radians();
    let lat2_rad = b.lat().to_radians();
    let delta_lat = (b.lat() - a.lat()).to_radians();
    let delta_lon = (b.lon() - a.lon()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

pub trait TrackMetric {
    type Output;
    /// Called before the first point of every segment.
    fn start_segment(&mut self) {}
    fn next_point(&mut self, point: &Point);
    fn finish(self) -> Self::Output;
}

/// Compute statistics for a segment sequence.
pub fn compute_statistics(
    segments: &[Segment],
    config: &StatisticsConfig,
) -> (TrackStatistics, StatisticsDiagnostics) {
    let mut metrics = Metrics::new(config);

    for segment in segments {
        metrics.start_segment();
        for point in segment.points() {
            metrics.next_point(point);
        }
    }

    let (mut statistics, diagnostics) = metrics.finish();
    statistics.segment_count = segments.len();
    statistics.bounds = bounds(segments);
    (statistics, diagnostics)
}

fn bounds(segments: &[Segment]) -> Option<Bounds> {
    let line: LineString<f64> = segments
        .iter()
        .flat_map(Segment::points)
        .map(|p| (p.lon(), p.lat()))
        .collect::<Vec<_>>()
        .into();

    line.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        min_lon: rect.min().x,
        max_lat: rect.max().y,
        max_lon: rect.max().x,
    })
}

struct Metrics {
    distance: DistanceMetric,
    elevation: ElevationMetric,
    time_span: TimeSpanMetric,
    motion: MotionMetric,
    point_count: usize,
}

impl Metrics {
    fn new(config: &StatisticsConfig) -> Self {
        Self {
            distance: DistanceMetric::default(),
            elevation: ElevationMetric::new(config.noise_threshold_meters),
            time_span: TimeSpanMetric::default(),
            motion: MotionMetric::new(config.stillness_threshold_mps),
            point_count: 0,
        }
    }
}

impl TrackMetric for Metrics {
    type Output = (TrackStatistics, StatisticsDiagnostics);

    fn start_segment(&mut self) {
        self.distance.start_segment();
        self.elevation.start_segment();
        self.time_span.start_segment();
        self.motion.start_segment();
    }

    fn next_point(&mut self, point: &Point) {
        self.distance.next_point(point);
        self.elevation.next_point(point);
        self.time_span.next_point(point);
        self.motion.next_point(point);
        self.point_count += 1;
    }

    fn finish(self) -> Self::Output {
        let total_distance_meters = self.distance.finish();
        let (elevation_gain_meters, elevation_loss_meters) = match self.elevation.finish() {
            Some((gain, loss)) => (Some(gain), Some(loss)),
            None => (None, None),
        };
        let (start_time, end_time) = self.time_span.finish().unzip();
        let duration_seconds = start_time
            .zip(end_time)
            .map(|(start, end)| (end - start).as_seconds_f64());

        // No timestamp anywhere means nothing time-based is known.
        let motion = self.motion.finish();
        let (moving_duration_seconds, max_speed_meters_per_second) = if start_time.is_some() {
            (Some(motion.moving_seconds), motion.max_speed)
        } else {
            (None, None)
        };

        let statistics = TrackStatistics {
            total_distance_meters,
            elevation_gain_meters,
            elevation_loss_meters,
            start_time,
            end_time,
            duration_seconds,
            moving_duration_seconds,
            max_speed_meters_per_second,
            point_count: self.point_count,
            segment_count: 0,
            bounds: None,
        };
        let diagnostics = StatisticsDiagnostics {
            skipped_time_pairs: motion.skipped_pairs,
            still_pairs: motion.still_pairs,
        };
        (statistics, diagnostics)
    }
}

#[derive(Debug, Clone, Default)]
struct DistanceMetric {
    total_distance: f64,
    last_point: Option<Point>,
}

impl TrackMetric for DistanceMetric {
    type Output = f64;

    fn start_segment(&mut self) {
        self.last_point = None;
    }

    fn next_point(&mut self, point: &Point) {
        self.total_distance += self
            .last_point
            .map_or(0.0, |prev| haversine_distance(&prev, point));
        self.last_point = Some(*point);
    }

    fn finish(self) -> f64 {
        self.total_distance
    }
}

/// Gain and loss with a dead band: a change is measured from the last
/// elevation that was accepted, and only accepted once it reaches the
/// threshold. Small wobbles therefore neither count nor move the reference.
#[derive(Debug, Clone)]
struct ElevationMetric {
    threshold: f64,
    gain: f64,
    loss: f64,
    reference: Option<f64>,
    has_pairs: bool,
}

impl ElevationMetric {
    fn new(threshold: f64) -> Self {
        Self {
            threshold,
            gain: 0.0,
            loss: 0.0,
            reference: None,
            has_pairs: false,
        }
    }
}

impl TrackMetric for ElevationMetric {
    type Output = Option<(f64, f64)>;

    fn start_segment(&mut self) {
        self.reference = None;
    }

    fn next_point(&mut self, point: &Point) {
        let Some(elevation) = point.elevation() else {
            return;
        };
        let Some(reference) = self.reference else {
            self.reference = Some(elevation);
            return;
        };

        self.has_pairs = true;
        let delta = elevation - reference;
        if delta.abs() < self.threshold {
            return;
        }
        if delta > 0.0 {
            self.gain += delta;
        } else {
            self.loss -= delta;
        }
        self.reference = Some(elevation);
    }

    fn finish(self) -> Option<(f64, f64)> {
        self.has_pairs.then_some((self.gain, self.loss))
    }
}

#[derive(Debug, Clone, Default)]
struct TimeSpanMetric {
    earliest: Option<OffsetDateTime>,
    latest: Option<OffsetDateTime>,
}

impl TrackMetric for TimeSpanMetric {
    type Output = Option<(OffsetDateTime, OffsetDateTime)>;

    fn next_point(&mut self, point: &Point) {
        if let Some(time) = point.timestamp() {
            self.earliest = Some(self.earliest.map_or(time, |t| t.min(time)));
            self.latest = Some(self.latest.map_or(time, |t| t.max(time)));
        }
    }

    fn finish(self) -> Option<(OffsetDateTime, OffsetDateTime)> {
        self.earliest.zip(self.latest)
    }
}

#[derive(Debug, Clone, Default)]
struct Motion {
    moving_seconds: f64,
    max_speed: Option<f64>,
    skipped_pairs: usize,
    still_pairs: usize,
}

/// Moving time and top speed over consecutive timed pairs.
#[derive(Debug, Clone)]
struct MotionMetric {
    stillness_threshold: f64,
    last_point: Option<Point>,
    motion: Motion,
}

impl MotionMetric {
    fn new(stillness_threshold: f64) -> Self {
        Self {
            stillness_threshold,
            last_point: None,
            motion: Motion::default(),
        }
    }
}

impl TrackMetric for MotionMetric {
    type Output = Motion;

    fn start_segment(&mut self) {
        self.last_point = None;
    }

    fn next_point(&mut self, point: &Point) {
        let prev = self.last_point.replace(*point);
        let (Some(prev), Some(current_time)) = (prev, point.timestamp()) else {
            return;
        };
        let Some(prev_time) = prev.timestamp() else {
            return;
        };

        let elapsed = (current_time - prev_time).as_seconds_f64();
        if elapsed <= 0.0 {
            self.motion.skipped_pairs += 1;
            return;
        }

        let speed = haversine_distance(&prev, point) / elapsed;
        if speed >= self.stillness_threshold {
            self.motion.moving_seconds += elapsed;
        } else {
            self.motion.still_pairs += 1;
        }
        // Strictly greater: ties keep the first occurrence.
        if self.motion.max_speed.is_none_or(|max| speed > max) {
            self.motion.max_speed = Some(speed);
        }
    }

    fn finish(self) -> Motion {
        self.motion
    }
}
