//! Regenerates a GPX document from stored track points.
//!
//! Used for downloads when the original upload was not kept.

use gpx::{Gpx, GpxVersion, Track as GpxTrack, TrackSegment, Waypoint};
use thiserror::Error;

use crate::models::Track;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("GPX write error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
}

/// Write `track` as a GPX 1.1 document: one `<trk>` named after the title,
/// one `<trkseg>` per segment.
pub fn to_gpx(track: &Track) -> Result<Vec<u8>, ExportError> {
    let segments = track
        .segments
        .iter()
        .map(|segment| TrackSegment {
            points: segment
                .points()
                .iter()
                .map(|p| {
                    let mut wp = Waypoint::new(p.geo_point());
                    wp.elevation = p.elevation();
                    wp.time = p.timestamp().map(gpx::Time::from);
                    wp
                })
                .collect(),
        })
        .collect();

    let mut gpx_track = GpxTrack::new();
    gpx_track.name = Some(track.title.clone());
    gpx_track.segments = segments;

    let document = Gpx {
        version: GpxVersion::Gpx11,
        tracks: vec![gpx_track],
        ..Default::default()
    };

    let mut out = Vec::new();
    gpx::write(&document, &mut out)?;
    Ok(out)
}
