//! Procedural track generation.
//!
//! A random walk with heading momentum, per-fix GPS jitter and a drifting
//! elevation profile. The same seed always yields the same track.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use time::{Duration, OffsetDateTime, macros::datetime};

use crate::SamplePoint;
use crate::config::{BoundingBox, Region};

/// Configuration for procedural track generation.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Target distance in meters.
    pub distance_meters: f64,
    /// Starting point (lat, lon). If None, random within bounds.
    pub start_point: Option<(f64, f64)>,
    pub bounds: BoundingBox,
    /// GPS position jitter standard deviation in meters.
    pub gps_jitter_m: f64,
    /// Elevation jitter standard deviation in meters.
    pub elevation_jitter_m: f64,
    /// Approximate distance between track points in meters.
    pub point_spacing_m: f64,
    /// Mean travel speed in meters per second.
    pub speed_mps: f64,
    /// Probability of a pause after any point (0.0 - 1.0).
    pub pause_probability: f64,
    /// Duration range for pauses (min, max) in seconds.
    pub pause_duration_range: (f64, f64),
    /// Number of segments the track is split into.
    pub segments: usize,
    pub start_time: OffsetDateTime,
    pub base_elevation: f64,
    pub with_elevation: bool,
    pub with_timestamps: bool,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            distance_meters: 5000.0,
            start_point: None,
            bounds: Region::BOULDER,
            gps_jitter_m: 3.0,
            elevation_jitter_m: 2.0,
            point_spacing_m: 10.0,
            speed_mps: 3.0,
            pause_probability: 0.02,
            pause_duration_range: (30.0, 180.0),
            segments: 1,
            start_time: datetime!(2024-05-01 07:00 UTC),
            base_elevation: 1650.0,
            with_elevation: true,
            with_timestamps: true,
        }
    }
}

/// Generates synthetic GPS tracks.
#[derive(Debug, Clone, Default)]
pub struct ProceduralGenerator {
    config: TrackConfig,
}

impl ProceduralGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_region(bounds: BoundingBox) -> Self {
        Self {
            config: TrackConfig {
                bounds,
                ..Default::default()
            },
        }
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.config.distance_meters = meters;
        self
    }

    pub fn with_start(mut self, lat: f64, lon: f64) -> Self {
        self.config.start_point = Some((lat, lon));
        self
    }

    pub fn with_gps_jitter(mut self, meters: f64) -> Self {
        self.config.gps_jitter_m = meters;
        self
    }

    pub fn with_point_spacing(mut self, meters: f64) -> Self {
        self.config.point_spacing_m = meters;
        self
    }

    pub fn with_speed(mut self, mps: f64) -> Self {
        self.config.speed_mps = mps;
        self
    }

    pub fn with_pauses(mut self, probability: f64, min_sec: f64, max_sec: f64) -> Self {
        self.config.pause_probability = probability;
        self.config.pause_duration_range = (min_sec, max_sec);
        self
    }

    /// Splits the track into `count` segments of roughly equal length.
    pub fn with_segments(mut self, count: usize) -> Self {
        self.config.segments = count.max(1);
        self
    }

    pub fn without_elevation(mut self) -> Self {
        self.config.with_elevation = false;
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.config.with_timestamps = false;
        self
    }

    /// Generates a track, one vector per segment. Every segment holds at
    /// least one point.
    pub fn generate(&self, rng: &mut impl Rng) -> Vec<Vec<SamplePoint>> {
        let start = self
            .config
            .start_point
            .unwrap_or_else(|| self.config.bounds.random_point(rng));

        let path = self.generate_path(start, rng);
        let points = self.decorate(path, rng);
        split_evenly(points, self.config.segments)
    }

    /// Generates a path (coordinates only, no jitter or timing).
    pub fn generate_path(&self, start: (f64, f64), rng: &mut impl Rng) -> Vec<(f64, f64)> {
        let mut path = vec![start];
        let mut current = start;
        let mut total_distance = 0.0;

        let mut heading = rng.gen_range(0.0..std::f64::consts::TAU);

        while total_distance < self.config.distance_meters {
            heading += rng.gen_range(-0.3..0.3);
            let step = self.config.point_spacing_m * rng.gen_range(0.8..1.2);

            let (lat, lon) = offset(current, step * heading.cos(), step * heading.sin());
            let (lat, lon, bounced) = self.apply_bounds(lat, lon, heading);
            heading = bounced;

            current = (lat, lon);
            path.push(current);
            total_distance += step;
        }

        path
    }

    /// Reverses heading on leaving the bounds.
    fn apply_bounds(&self, lat: f64, lon: f64, heading: f64) -> (f64, f64, f64) {
        let b = &self.config.bounds;
        let mut new_heading = heading;

        let lat = if lat < b.min_lat || lat > b.max_lat {
            new_heading = std::f64::consts::PI - new_heading;
            lat.clamp(b.min_lat, b.max_lat)
        } else {
            lat
        };

        let lon = if lon < b.min_lon || lon > b.max_lon {
            new_heading = -new_heading;
            lon.clamp(b.min_lon, b.max_lon)
        } else {
            lon
        };

        (lat, lon, new_heading)
    }

    /// Adds jitter, elevation and timestamps.
    fn decorate(&self, path: Vec<(f64, f64)>, rng: &mut impl Rng) -> Vec<SamplePoint> {
        let jitter = normal(self.config.gps_jitter_m);
        let ele_jitter = normal(self.config.elevation_jitter_m);
        let speed_variance = normal(self.config.speed_mps * 0.1);

        let mut elevation = self.config.base_elevation;
        let mut climb: f64 = 0.0;
        let mut time = self.config.start_time;
        let mut previous: Option<(f64, f64)> = None;
        let mut points = Vec::with_capacity(path.len());

        for (lat, lon) in path {
            if let Some(prev) = previous {
                let step = approx_distance(prev, (lat, lon));
                let speed = (self.config.speed_mps + speed_variance.sample(rng)).max(0.3);
                time += Duration::seconds_f64((step / speed).max(0.5));

                if rng.gen_bool(self.config.pause_probability.clamp(0.0, 1.0)) {
                    let (min, max) = self.config.pause_duration_range;
                    let pause = if max > min { rng.gen_range(min..max) } else { min };
                    time += Duration::seconds_f64(pause);
                }

                // Slowly varying grade, roughly +-8%.
                climb = (climb + rng.gen_range(-0.01..0.01)).clamp(-0.08, 0.08);
                elevation += climb * step;
            }
            previous = Some((lat, lon));

            let (lat, lon) = offset((lat, lon), jitter.sample(rng), jitter.sample(rng));
            let lat = lat.clamp(-90.0, 90.0);
            let lon = wrap_longitude(lon);

            let mut point = SamplePoint::new(lat, lon);
            if self.config.with_elevation {
                point = point.with_elevation(elevation + ele_jitter.sample(rng));
            }
            if self.config.with_timestamps {
                point = point.with_timestamp(time);
            }
            points.push(point);
        }

        points
    }
}

fn normal(std_dev: f64) -> Normal<f64> {
    let std_dev = if std_dev.is_finite() { std_dev.max(0.0) } else { 0.0 };
    Normal::new(0.0, std_dev).unwrap()
}

/// Moves `from` by the given north and east offsets in meters.
fn offset(from: (f64, f64), north_m: f64, east_m: f64) -> (f64, f64) {
    let lat = from.0 + north_m / 111_000.0;
    let lon = from.1 + east_m / (111_000.0 * from.0.to_radians().cos().max(0.01));
    (lat, lon)
}

fn approx_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dlat = (b.0 - a.0) * 111_000.0;
    let dlon = (b.1 - a.1) * 111_000.0 * a.0.to_radians().cos();
    (dlat * dlat + dlon * dlon).sqrt()
}

fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

fn split_evenly(points: Vec<SamplePoint>, segments: usize) -> Vec<Vec<SamplePoint>> {
    let segments = segments.clamp(1, points.len().max(1));
    let size = points.len().div_ceil(segments).max(1);
    points.chunks(size).map(<[SamplePoint]>::to_vec).collect()
}
