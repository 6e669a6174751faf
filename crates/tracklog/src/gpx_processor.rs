use tracing::debug;

use crate::{
    errors::{OrderingAnomaly, ParseError},
    gpx_parser::parse_gpx,
    point::Segment,
    statistics::{StatisticsConfig, StatisticsDiagnostics, TrackStatistics, compute_statistics},
};

/// A parsed document and everything derived from it.
#[derive(Debug, Clone)]
pub struct Summary {
    /// `<name>` of the first track in the document.
    pub name: Option<String>,
    pub segments: Vec<Segment>,
    pub statistics: TrackStatistics,
    pub diagnostics: StatisticsDiagnostics,
    pub anomalies: Vec<OrderingAnomaly>,
}

/// Parse raw GPX bytes and compute their statistics. Shared by the upload
/// path and the batch importer.
pub fn parse_and_summarize(content: &[u8], config: &StatisticsConfig) -> Result<Summary, ParseError> {
    let parsed = parse_gpx(content)?;
    let (statistics, diagnostics) = compute_statistics(&parsed.segments, config);

    debug!(
        "Summarized {} points: {:.1}m, {} ordering anomalies, {} skipped time pairs",
        statistics.point_count,
        statistics.total_distance_meters,
        parsed.anomalies.len(),
        diagnostics.skipped_time_pairs
    );

    Ok(Summary {
        name: parsed.name,
        segments: parsed.segments,
        statistics,
        diagnostics,
        anomalies: parsed.anomalies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIDE: &str = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test">
  <trk><name>Canyon</name><trkseg>
    <trkpt lat="40.0000" lon="-105.0"><ele>1600</ele><time>2024-05-01T10:00:00Z</time></trkpt>
    <trkpt lat="40.0010" lon="-105.0"><ele>1610</ele><time>2024-05-01T10:01:00Z</time></trkpt>
    <trkpt lat="40.0020" lon="-105.0"><ele>1605</ele><time>2024-05-01T10:00:30Z</time></trkpt>
    <trkpt lat="40.0030" lon="-105.0"><ele>1620</ele><time>2024-05-01T10:03:00Z</time></trkpt>
  </trkseg></trk>
</gpx>"#;

    #[test]
    fn test_parse_and_summarize() {
        let summary = parse_and_summarize(RIDE.as_bytes(), &StatisticsConfig::default()).unwrap();

        assert_eq!(summary.name.as_deref(), Some("Canyon"));
        assert_eq!(summary.statistics.point_count, 4);
        assert_eq!(summary.statistics.elevation_gain_meters, Some(25.0));
        assert_eq!(summary.statistics.elevation_loss_meters, Some(5.0));
        assert_eq!(summary.statistics.duration_seconds, Some(180.0));
        // The regressed pair is flagged by the parser and skipped by the engine.
        assert_eq!(summary.anomalies.len(), 1);
        assert_eq!(summary.diagnostics.skipped_time_pairs, 1);
        assert_eq!(summary.statistics.moving_duration_seconds, Some(210.0));
    }

    #[test]
    fn test_parse_errors_propagate() {
        let result = parse_and_summarize(b"<gpx><trk>", &StatisticsConfig::default());
        assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
    }
}
