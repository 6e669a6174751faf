use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{point::Segment, statistics::TrackStatistics};

/// A stored track log: the parsed recording plus what was derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub filename: String,
    pub segments: Vec<Segment>,
    pub statistics: TrackStatistics,
    /// Object store path of the original upload, when it was kept.
    pub raw_object_path: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Track {
    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            id: self.id,
            owner_id: self.owner_id.clone(),
            title: self.title.clone(),
            filename: self.filename.clone(),
            statistics: self.statistics.clone(),
            created_at: self.created_at,
        }
    }
}

/// List view of a track without its points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub filename: String,
    pub statistics: TrackStatistics,
    pub created_at: OffsetDateTime,
}
