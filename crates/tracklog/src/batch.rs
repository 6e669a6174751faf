//! Non-interactive import of many files.
//!
//! Files are parsed and summarized in parallel on a rayon pool and streamed
//! to the store, one at a time in input order. A failing file becomes a line
//! in the report and never stops the rest of the batch; tracks stored before
//! a failure stay stored.

use std::{
    collections::BTreeMap,
    fmt,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use rayon::prelude::*;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    assembler::TrackMetadata,
    errors::{AppError, ErrorKind},
    ingest::{ImportNotes, Ingestor},
    models::Track,
};

/// One input to a batch.
#[derive(Debug, Clone)]
pub enum ImportSource {
    File(PathBuf),
    Memory { name: String, bytes: Bytes },
}

impl ImportSource {
    /// The identifier used in reports and as the stored filename.
    pub fn name(&self) -> String {
        match self {
            ImportSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ImportSource::Memory { name, .. } => name.clone(),
        }
    }

    fn read(&self) -> std::io::Result<Bytes> {
        match self {
            ImportSource::File(path) => std::fs::read(path).map(Bytes::from),
            ImportSource::Memory { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::File(path) => write!(f, "{}", path.display()),
            ImportSource::Memory { name, .. } => f.write_str(name),
        }
    }
}

/// Shared stop signal. Files already being processed finish; files not yet
/// started are reported as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Imported {
        track_id: Uuid,
        title: String,
        distance_meters: f64,
        #[serde(flatten)]
        notes: ImportNotes,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub source: String,
    pub outcome: FileOutcome,
}

/// Per-file outcomes, in the order the sources were given.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn imported_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Imported { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Cancelled))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

/// Result of the CPU-bound half of one file.
enum Prepared {
    Ready(Track, ImportNotes, Bytes),
    Failed(AppError),
    Cancelled,
}

pub struct BatchImporter {
    ingestor: Ingestor,
    workers: usize,
}

impl BatchImporter {
    pub fn new(ingestor: Ingestor, workers: usize) -> Self {
        Self {
            ingestor,
            workers: workers.max(1),
        }
    }

    pub async fn run(
        &self,
        owner_id: &str,
        sources: Vec<ImportSource>,
        cancel: &CancellationFlag,
    ) -> BatchReport {
        let names: Vec<String> = sources.iter().map(ImportSource::name).collect();
        info!("Importing {} files for {owner_id}", sources.len());

        let (tx, mut rx) = mpsc::channel(self.workers * 2);
        let workers = self.spawn_workers(owner_id, sources, cancel, tx);

        // Workers finish out of order; hold early results until their turn.
        let mut pending: BTreeMap<usize, Prepared> = BTreeMap::new();
        let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(names.len());
        while let Some((index, prepared)) = rx.recv().await {
            pending.insert(index, prepared);
            while let Some(prepared) = pending.remove(&outcomes.len()) {
                let source = &names[outcomes.len()];
                let outcome = self.complete(source, prepared, cancel).await;
                outcomes.push(outcome);
            }
        }

        if let Err(e) = workers.await {
            error!("Import workers failed: {e}");
        }
        // Anything a failed worker never sent.
        while outcomes.len() < names.len() {
            let source = &names[outcomes.len()];
            let outcome = match pending.remove(&outcomes.len()) {
                Some(prepared) => self.complete(source, prepared, cancel).await,
                None => failed(source, AppError::Internal("import worker failed".to_string())),
            };
            outcomes.push(outcome);
        }

        let report = BatchReport {
            entries: names
                .into_iter()
                .zip(outcomes)
                .map(|(source, outcome)| BatchEntry { source, outcome })
                .collect(),
        };

        info!(
            "Import finished: {} imported, {} failed, {} cancelled",
            report.imported_count(),
            report.failed_count(),
            report.cancelled_count()
        );
        report
    }

    /// Hand one prepared file to the store, unless the batch was cancelled
    /// before its turn came.
    async fn complete(
        &self,
        source: &str,
        prepared: Prepared,
        cancel: &CancellationFlag,
    ) -> FileOutcome {
        match prepared {
            Prepared::Ready(..) | Prepared::Cancelled if cancel.is_cancelled() => {
                FileOutcome::Cancelled
            }
            Prepared::Ready(track, notes, raw) => match self.ingestor.persist(track, raw).await {
                Ok(track) => FileOutcome::Imported {
                    track_id: track.id,
                    title: track.title,
                    distance_meters: track.statistics.total_distance_meters,
                    notes,
                },
                Err(e) => failed(source, e),
            },
            Prepared::Failed(e) => failed(source, e),
            Prepared::Cancelled => FileOutcome::Cancelled,
        }
    }

    /// Parse and assemble every source on the worker pool, sending each
    /// result tagged with its input position.
    fn spawn_workers(
        &self,
        owner_id: &str,
        sources: Vec<ImportSource>,
        cancel: &CancellationFlag,
        tx: mpsc::Sender<(usize, Prepared)>,
    ) -> JoinHandle<()> {
        let ingestor = self.ingestor.clone();
        let owner_id = owner_id.to_string();
        let cancel = cancel.clone();
        let workers = self.workers;

        tokio::task::spawn_blocking(move || {
            let run = || {
                sources.par_iter().enumerate().for_each(|(index, source)| {
                    let prepared = prepare_one(&ingestor, &owner_id, source, &cancel);
                    // The receiver only goes away if the batch itself was dropped.
                    let _ = tx.blocking_send((index, prepared));
                });
            };

            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    warn!("Failed to build import worker pool, running on the global pool: {e}");
                    run()
                }
            }
        })
    }
}

fn prepare_one(
    ingestor: &Ingestor,
    owner_id: &str,
    source: &ImportSource,
    cancel: &CancellationFlag,
) -> Prepared {
    if cancel.is_cancelled() {
        return Prepared::Cancelled;
    }

    let raw = match source.read() {
        Ok(raw) => raw,
        Err(e) => return Prepared::Failed(e.into()),
    };
    let metadata = TrackMetadata {
        owner_id: owner_id.to_string(),
        title: None,
        filename: source.name(),
    };

    match ingestor.prepare(metadata, &raw) {
        Ok((track, notes)) => Prepared::Ready(track, notes, raw),
        Err(e) => Prepared::Failed(e),
    }
}

fn failed(source: &str, e: AppError) -> FileOutcome {
    let kind = e.kind();
    if kind == ErrorKind::Storage {
        error!("Import of {source} failed ({kind:?}): {e}");
    } else {
        warn!("Import of {source} failed ({kind:?}): {e}");
    }
    FileOutcome::Failed {
        kind,
        message: e.to_string(),
    }
}
