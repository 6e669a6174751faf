use bytes::Bytes;
use object_store::{ObjectStore, PutOptions, local::LocalFileSystem, path::Path};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::AppError;

pub const GPX_MIME: &str = "application/gpx+xml";

/// Keeps the original upload bytes so downloads return exactly what was sent.
#[derive(Clone, Debug)]
pub struct ObjectStoreService {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreService {
    /// A store rooted at `base_path` on the local filesystem. The directory is
    /// created if missing.
    pub fn new_local(base_path: impl AsRef<std::path::Path>) -> Result<Self, AppError> {
        std::fs::create_dir_all(base_path.as_ref())?;
        let store = LocalFileSystem::new_with_prefix(base_path.as_ref())?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn store_file(
        &self,
        owner_id: &str,
        track_id: Uuid,
        content: Bytes,
    ) -> Result<String, AppError> {
        let object_path = object_path(owner_id, track_id);
        let path = Path::from(object_path.clone());

        self.store
            .put_opts(&path, content.into(), PutOptions::default())
            .await?;

        Ok(object_path)
    }

    pub async fn get_file(&self, object_path: &str) -> Result<Bytes, AppError> {
        let path = Path::from(object_path);

        let result = self.store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => AppError::NotFound,
            e => AppError::ObjectStore(e),
        })?;

        Ok(result.bytes().await?)
    }

    pub async fn delete_file(&self, object_path: &str) -> Result<(), AppError> {
        let path = Path::from(object_path);

        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Owner ids are opaque, so they are encoded as a single path segment.
fn object_path(owner_id: &str, track_id: Uuid) -> String {
    let owner: String = owner_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("tracks/{owner}/{track_id}.gpx")
}
