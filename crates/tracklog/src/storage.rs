//! Persistence seam for assembled tracks.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::{Track, TrackSummary},
};

/// Where tracks live once assembled. Implementations write one track per
/// call atomically; callers own any ordering between calls.
#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn save_track(&self, track: &Track) -> Result<(), AppError>;

    async fn get_track(&self, id: Uuid) -> Result<Option<Track>, AppError>;

    /// Newest first.
    async fn list_tracks(&self, owner_id: &str) -> Result<Vec<TrackSummary>, AppError>;

    /// Returns false if no such track exists.
    async fn rename_track(&self, id: Uuid, title: &str) -> Result<bool, AppError>;

    /// Returns false if no such track exists.
    async fn delete_track(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Process-local store, for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tracks: Arc<RwLock<HashMap<Uuid, Track>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tracks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tracks.read().await.is_empty()
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn save_track(&self, track: &Track) -> Result<(), AppError> {
        self.tracks.write().await.insert(track.id, track.clone());
        Ok(())
    }

    async fn get_track(&self, id: Uuid) -> Result<Option<Track>, AppError> {
        Ok(self.tracks.read().await.get(&id).cloned())
    }

    async fn list_tracks(&self, owner_id: &str) -> Result<Vec<TrackSummary>, AppError> {
        let tracks = self.tracks.read().await;
        let mut summaries: Vec<TrackSummary> = tracks
            .values()
            .filter(|t| t.owner_id == owner_id)
            .map(Track::summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn rename_track(&self, id: Uuid, title: &str) -> Result<bool, AppError> {
        let mut tracks = self.tracks.write().await;
        Ok(match tracks.get_mut(&id) {
            Some(track) => {
                track.title = title.to_string();
                true
            }
            None => false,
        })
    }

    async fn delete_track(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tracks.write().await.remove(&id).is_some())
    }
}
