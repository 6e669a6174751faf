//! The upload path and the track operations a display layer needs.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    assembler::{TrackMetadata, assemble_track},
    errors::{AppError, ValidationError},
    export,
    gpx_processor::parse_and_summarize,
    models::{Track, TrackSummary},
    object_store_service::{GPX_MIME, ObjectStoreService},
    statistics::StatisticsConfig,
    storage::TrackStore,
};

/// A file ready to hand back to a user.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

/// What the pipeline noticed in an accepted file without rejecting it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportNotes {
    /// Points timestamped before their predecessor.
    pub ordering_anomalies: usize,
    /// Timed pairs left out of moving time and max speed.
    pub skipped_time_pairs: usize,
}

/// Runs uploads through parse, summarize and assemble, then persists them.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn TrackStore>,
    files: Option<ObjectStoreService>,
    config: StatisticsConfig,
}

impl Ingestor {
    pub fn new(store: Arc<dyn TrackStore>, config: StatisticsConfig) -> Self {
        Self {
            store,
            files: None,
            config,
        }
    }

    /// Keep raw uploads in `files` so downloads return the original bytes.
    pub fn with_object_store(mut self, files: ObjectStoreService) -> Self {
        self.files = Some(files);
        self
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Parse, summarize and assemble without touching storage.
    pub fn prepare(
        &self,
        metadata: TrackMetadata,
        content: &[u8],
    ) -> Result<(Track, ImportNotes), AppError> {
        let summary = parse_and_summarize(content, &self.config)?;
        let notes = ImportNotes {
            ordering_anomalies: summary.anomalies.len(),
            skipped_time_pairs: summary.diagnostics.skipped_time_pairs,
        };
        if notes.ordering_anomalies > 0 {
            warn!(
                "{}: {} points are timestamped before their predecessor",
                metadata.filename, notes.ordering_anomalies
            );
        }
        let track = assemble_track(metadata, summary.segments, summary.statistics)?;
        Ok((track, notes))
    }

    /// Store the raw upload (if an object store is configured) and the track.
    pub async fn persist(&self, mut track: Track, raw: Bytes) -> Result<Track, AppError> {
        if let Some(files) = &self.files {
            let path = files.store_file(&track.owner_id, track.id, raw).await?;
            track.raw_object_path = Some(path);
        }

        if let Err(e) = self.store.save_track(&track).await {
            error!("Failed to store track {}: {e}", track.id);
            if let (Some(files), Some(path)) = (&self.files, &track.raw_object_path)
                && let Err(cleanup) = files.delete_file(path).await
            {
                warn!("Failed to remove orphaned upload {path}: {cleanup}");
            }
            return Err(e);
        }

        info!(
            "Stored track {} ({}) for {}: {:.1}m over {} points",
            track.id,
            track.filename,
            track.owner_id,
            track.statistics.total_distance_meters,
            track.statistics.point_count
        );
        Ok(track)
    }

    pub async fn upload(&self, metadata: TrackMetadata, content: Bytes) -> Result<Track, AppError> {
        let (track, _) = self.prepare(metadata, &content)?;
        self.persist(track, content).await
    }

    /// Fetch a track, hiding other owners' tracks as not found.
    pub async fn get(&self, owner_id: &str, id: Uuid) -> Result<Track, AppError> {
        match self.store.get_track(id).await? {
            Some(track) if track.owner_id == owner_id => Ok(track),
            _ => Err(AppError::NotFound),
        }
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<TrackSummary>, AppError> {
        self.store.list_tracks(owner_id).await
    }

    pub async fn rename(&self, owner_id: &str, id: Uuid, title: &str) -> Result<(), AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::BlankTitle.into());
        }
        self.get(owner_id, id).await?;

        if self.store.rename_track(id, title).await? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    /// Removes the raw upload before the record. A record left behind by a
    /// failed delete still downloads, from its stored points.
    pub async fn delete(&self, owner_id: &str, id: Uuid) -> Result<(), AppError> {
        let track = self.get(owner_id, id).await?;

        if let (Some(files), Some(path)) = (&self.files, &track.raw_object_path) {
            files.delete_file(path).await?;
        }
        if !self.store.delete_track(id).await? {
            return Err(AppError::NotFound);
        }
        info!("Deleted track {id} for {owner_id}");
        Ok(())
    }

    /// The original upload when it was kept, otherwise a GPX rebuilt from
    /// the stored points.
    pub async fn download(&self, owner_id: &str, id: Uuid) -> Result<Download, AppError> {
        let track = self.get(owner_id, id).await?;

        let stored = match (&self.files, &track.raw_object_path) {
            (Some(files), Some(path)) => match files.get_file(path).await {
                Ok(bytes) => Some(bytes),
                Err(AppError::NotFound) => {
                    warn!("Raw upload for track {id} is missing, regenerating GPX");
                    None
                }
                Err(e) => return Err(e),
            },
            _ => None,
        };

        let bytes = match stored {
            Some(bytes) => bytes,
            None => Bytes::from(export::to_gpx(&track)?),
        };

        Ok(Download {
            filename: track.filename,
            content_type: GPX_MIME,
            bytes,
        })
    }
}
