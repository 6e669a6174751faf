//! Builds the persistable [`Track`] from a parsed and summarized upload.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    errors::ValidationError, models::Track, point::Segment, statistics::TrackStatistics,
};

/// Caller-supplied metadata for a new track.
#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    pub owner_id: String,
    /// Falls back to `filename` when absent or blank.
    pub title: Option<String>,
    pub filename: String,
}

/// Assemble a track. Segments and statistics are passed through untouched;
/// the only thing filled in is the default title.
pub fn assemble_track(
    metadata: TrackMetadata,
    segments: Vec<Segment>,
    statistics: TrackStatistics,
) -> Result<Track, ValidationError> {
    if metadata.owner_id.trim().is_empty() {
        return Err(ValidationError::MissingOwner);
    }
    if segments.is_empty() || segments.iter().any(Segment::is_empty) {
        return Err(ValidationError::EmptyTrack);
    }

    let title = match metadata.title {
        Some(title) if !title.trim().is_empty() => title,
        _ => metadata.filename.clone(),
    };

    Ok(Track {
        id: Uuid::new_v4(),
        owner_id: metadata.owner_id,
        title,
        filename: metadata.filename,
        segments,
        statistics,
        raw_object_path: None,
        created_at: OffsetDateTime::now_utc(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        point::Point,
        statistics::{StatisticsConfig, compute_statistics},
    };

    fn segments() -> Vec<Segment> {
        let points = vec![
            Point::new(40.0, -105.0, Some(1600.0), None).unwrap(),
            Point::new(40.001, -105.0, Some(1605.0), None).unwrap(),
        ];
        vec![Segment::new(points).unwrap()]
    }

    fn metadata(title: Option<&str>) -> TrackMetadata {
        TrackMetadata {
            owner_id: "user-1".to_string(),
            title: title.map(String::from),
            filename: "ride.gpx".to_string(),
        }
    }

    #[test]
    fn test_assemble_passes_data_through() {
        let segments = segments();
        let (statistics, _) = compute_statistics(&segments, &StatisticsConfig::default());

        let track = assemble_track(
            metadata(Some("Lunch loop")),
            segments.clone(),
            statistics.clone(),
        )
        .unwrap();

        assert_eq!(track.owner_id, "user-1");
        assert_eq!(track.title, "Lunch loop");
        assert_eq!(track.filename, "ride.gpx");
        assert_eq!(track.segments, segments);
        assert_eq!(track.statistics, statistics);
        assert_eq!(track.raw_object_path, None);
    }

    #[test]
    fn test_title_defaults_to_filename() {
        let segments = segments();
        let (statistics, _) = compute_statistics(&segments, &StatisticsConfig::default());

        let untitled = assemble_track(metadata(None), segments.clone(), statistics.clone()).unwrap();
        assert_eq!(untitled.title, "ride.gpx");

        let blank = assemble_track(metadata(Some("   ")), segments, statistics).unwrap();
        assert_eq!(blank.title, "ride.gpx");
    }

    #[test]
    fn test_rejects_missing_owner() {
        let segments = segments();
        let (statistics, _) = compute_statistics(&segments, &StatisticsConfig::default());
        let mut meta = metadata(None);
        meta.owner_id = " ".to_string();

        assert_eq!(
            assemble_track(meta, segments, statistics),
            Err(ValidationError::MissingOwner)
        );
    }

    #[test]
    fn test_rejects_empty_segments() {
        let (statistics, _) = compute_statistics(&[], &StatisticsConfig::default());
        assert_eq!(
            assemble_track(metadata(None), Vec::new(), statistics),
            Err(ValidationError::EmptyTrack)
        );
    }

    #[test]
    fn test_statistics_rederive_identically_after_assembly() {
        let config = StatisticsConfig::default();
        let segments = segments();
        let (statistics, _) = compute_statistics(&segments, &config);

        let track = assemble_track(metadata(None), segments, statistics).unwrap();
        let (rederived, _) = compute_statistics(&track.segments, &config);
        assert_eq!(rederived, track.statistics);
    }

    #[test]
    fn test_each_track_gets_its_own_id() {
        let segments = segments();
        let (statistics, _) = compute_statistics(&segments, &StatisticsConfig::default());
        let a = assemble_track(metadata(None), segments.clone(), statistics.clone()).unwrap();
        let b = assemble_track(metadata(None), segments, statistics).unwrap();
        assert_ne!(a.id, b.id);
    }
}
