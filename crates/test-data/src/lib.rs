//! Test data generation for tracklog.
//!
//! Provides GPX documents for parser and import tests, and seeded synthetic
//! tracks for property-style checks of the statistics engine.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_data::prelude::*;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let segments = ProceduralGenerator::new()
//!     .with_distance(3000.0)
//!     .with_segments(2)
//!     .generate(&mut rng);
//!
//! let mut builder = GpxBuilder::new().name("Evening loop");
//! for points in segments {
//!     builder = builder.segment(points);
//! }
//! let bytes = builder.build();
//! ```

pub mod config;
pub mod gpx;
pub mod procedural;

use time::OffsetDateTime;

/// One generated fix. Elevation and time are optional, as in real files.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    pub timestamp: Option<OffsetDateTime>,
}

impl SamplePoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            elevation: None,
            timestamp: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::SamplePoint;
    pub use crate::config::{BoundingBox, Region};
    pub use crate::gpx::{GpxBuilder, generate_gpx};
    pub use crate::procedural::{ProceduralGenerator, TrackConfig};
}
