//! Batch import over in-memory and on-disk sources.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use test_data::prelude::*;
use time::{Duration, macros::datetime};
use tracklog::{
    AppError, BatchImporter, CancellationFlag, ErrorKind, FileOutcome, ImportNotes, ImportSource,
    Ingestor, MemoryStore, StatisticsConfig, Track, TrackStore, TrackSummary,
};
use uuid::Uuid;

const OWNER: &str = "owner-batch";

fn sample_gpx(name: &str, start_lat: f64) -> Bytes {
    let start = datetime!(2024-06-01 08:00 UTC);
    let points: Vec<SamplePoint> = (0..20)
        .map(|i| {
            SamplePoint::new(start_lat + i as f64 * 0.0005, -105.27)
                .with_elevation(1650.0 + i as f64)
                .with_timestamp(start + Duration::seconds(i * 20))
        })
        .collect();
    Bytes::from(generate_gpx(&points, name))
}

fn malformed_gpx() -> Bytes {
    Bytes::from(
        GpxBuilder::new()
            .segment([SamplePoint::new(40.0, -105.0), SamplePoint::new(40.1, -105.1)])
            .truncated()
            .build(),
    )
}

fn memory(name: &str, bytes: Bytes) -> ImportSource {
    ImportSource::Memory {
        name: name.to_string(),
        bytes,
    }
}

fn importer(store: Arc<dyn TrackStore>, workers: usize) -> BatchImporter {
    BatchImporter::new(
        Ingestor::new(store, StatisticsConfig::default()),
        workers,
    )
}

#[tokio::test]
async fn test_malformed_file_does_not_stop_batch() {
    let store = MemoryStore::new();
    let batch = importer(Arc::new(store.clone()), 2);

    let report = batch
        .run(
            OWNER,
            vec![
                memory("first.gpx", sample_gpx("First", 40.00)),
                memory("broken.gpx", malformed_gpx()),
                memory("third.gpx", sample_gpx("Third", 40.10)),
            ],
            &CancellationFlag::new(),
        )
        .await;

    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.entries[0].source, "first.gpx");
    assert_eq!(report.entries[1].source, "broken.gpx");
    assert_eq!(report.entries[2].source, "third.gpx");

    assert!(matches!(report.entries[0].outcome, FileOutcome::Imported { .. }));
    match &report.entries[1].outcome {
        FileOutcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::MalformedDocument),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(report.entries[2].outcome, FileOutcome::Imported { .. }));

    assert!(report.has_failures());
    assert_eq!(report.imported_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(store.len().await, 2);

    let titles: Vec<String> = store
        .list_tracks(OWNER)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert!(titles.contains(&"first.gpx".to_string()));
    assert!(titles.contains(&"third.gpx".to_string()));
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    let store = MemoryStore::new();
    let batch = importer(Arc::new(store.clone()), 4);

    let sources: Vec<ImportSource> = (0..12)
        .map(|i| memory(&format!("track-{i:02}.gpx"), sample_gpx("t", 40.0 + i as f64 * 0.01)))
        .collect();
    let report = batch.run(OWNER, sources, &CancellationFlag::new()).await;

    let names: Vec<&str> = report.entries.iter().map(|e| e.source.as_str()).collect();
    let expected: Vec<String> = (0..12).map(|i| format!("track-{i:02}.gpx")).collect();
    assert_eq!(names, expected);
    assert_eq!(report.imported_count(), 12);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_single_worker_matches_parallel() {
    let sources = || {
        vec![
            memory("a.gpx", sample_gpx("a", 40.0)),
            memory("b.gpx", malformed_gpx()),
            memory("c.gpx", sample_gpx("c", 40.2)),
        ]
    };

    let serial = importer(Arc::new(MemoryStore::new()), 1)
        .run(OWNER, sources(), &CancellationFlag::new())
        .await;
    let parallel = importer(Arc::new(MemoryStore::new()), 3)
        .run(OWNER, sources(), &CancellationFlag::new())
        .await;

    let distances = |report: &tracklog::BatchReport| -> Vec<Option<f64>> {
        report
            .entries
            .iter()
            .map(|e| match e.outcome {
                FileOutcome::Imported {
                    distance_meters, ..
                } => Some(distance_meters),
                _ => None,
            })
            .collect()
    };
    assert_eq!(distances(&serial), distances(&parallel));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let store = MemoryStore::new();
    let batch = importer(Arc::new(store.clone()), 2);
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let report = batch
        .run(
            OWNER,
            vec![
                memory("a.gpx", sample_gpx("a", 40.0)),
                memory("b.gpx", sample_gpx("b", 40.1)),
            ],
            &cancel,
        )
        .await;

    assert_eq!(report.cancelled_count(), 2);
    assert!(!report.has_failures());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_empty_batch() {
    let report = importer(Arc::new(MemoryStore::new()), 2)
        .run(OWNER, Vec::new(), &CancellationFlag::new())
        .await;
    assert!(report.entries.is_empty());
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_files_on_disk() {
    let dir = std::env::temp_dir().join(format!("tracklog-batch-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let good = dir.join("ride.gpx");
    std::fs::write(&good, sample_gpx("Ride", 40.0)).unwrap();
    let missing: PathBuf = dir.join("missing.gpx");

    let store = MemoryStore::new();
    let report = importer(Arc::new(store.clone()), 2)
        .run(
            OWNER,
            vec![ImportSource::File(good), ImportSource::File(missing)],
            &CancellationFlag::new(),
        )
        .await;

    assert_eq!(report.entries[0].source, "ride.gpx");
    assert!(matches!(report.entries[0].outcome, FileOutcome::Imported { .. }));
    match &report.entries[1].outcome {
        FileOutcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::Io),
        other => panic!("expected io failure, got {other:?}"),
    }
    assert_eq!(store.len().await, 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_coordinate_and_empty_track_failures() {
    let bad_coordinate = Bytes::from(
        GpxBuilder::new()
            .raw_point(r#"<trkpt lat="95.0" lon="10.0"></trkpt>"#)
            .build(),
    );
    let empty = Bytes::from(GpxBuilder::new().empty_segment().build());

    let report = importer(Arc::new(MemoryStore::new()), 2)
        .run(
            OWNER,
            vec![memory("lat.gpx", bad_coordinate), memory("empty.gpx", empty)],
            &CancellationFlag::new(),
        )
        .await;

    let kinds: Vec<Option<ErrorKind>> = report
        .entries
        .iter()
        .map(|e| match e.outcome {
            FileOutcome::Failed { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![Some(ErrorKind::InvalidCoordinate), Some(ErrorKind::EmptyTrack)]
    );
}

/// Refuses every track whose filename starts with "reject".
struct PickyStore {
    inner: MemoryStore,
}

#[async_trait]
impl TrackStore for PickyStore {
    async fn save_track(&self, track: &Track) -> Result<(), AppError> {
        if track.filename.starts_with("reject") {
            return Err(AppError::Internal("store unavailable".to_string()));
        }
        self.inner.save_track(track).await
    }

    async fn get_track(&self, id: Uuid) -> Result<Option<Track>, AppError> {
        self.inner.get_track(id).await
    }

    async fn list_tracks(&self, owner_id: &str) -> Result<Vec<TrackSummary>, AppError> {
        self.inner.list_tracks(owner_id).await
    }

    async fn rename_track(&self, id: Uuid, title: &str) -> Result<bool, AppError> {
        self.inner.rename_track(id, title).await
    }

    async fn delete_track(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_track(id).await
    }
}

#[tokio::test]
async fn test_storage_failure_is_per_file() {
    let inner = MemoryStore::new();
    let store = Arc::new(PickyStore {
        inner: inner.clone(),
    });

    let report = importer(store, 2)
        .run(
            OWNER,
            vec![
                memory("keep-1.gpx", sample_gpx("k1", 40.0)),
                memory("reject.gpx", sample_gpx("r", 40.1)),
                memory("keep-2.gpx", sample_gpx("k2", 40.2)),
            ],
            &CancellationFlag::new(),
        )
        .await;

    assert_eq!(report.imported_count(), 2);
    match &report.entries[1].outcome {
        FileOutcome::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::Internal);
            assert!(message.contains("store unavailable"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(inner.len().await, 2);
}

/// Raises the cancellation flag while storing its first track.
struct CancelOnFirstSave {
    inner: MemoryStore,
    cancel: CancellationFlag,
}

#[async_trait]
impl TrackStore for CancelOnFirstSave {
    async fn save_track(&self, track: &Track) -> Result<(), AppError> {
        self.cancel.cancel();
        self.inner.save_track(track).await
    }

    async fn get_track(&self, id: Uuid) -> Result<Option<Track>, AppError> {
        self.inner.get_track(id).await
    }

    async fn list_tracks(&self, owner_id: &str) -> Result<Vec<TrackSummary>, AppError> {
        self.inner.list_tracks(owner_id).await
    }

    async fn rename_track(&self, id: Uuid, title: &str) -> Result<bool, AppError> {
        self.inner.rename_track(id, title).await
    }

    async fn delete_track(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_track(id).await
    }
}

#[tokio::test]
async fn test_cancel_during_batch_stops_later_files() {
    let inner = MemoryStore::new();
    let cancel = CancellationFlag::new();
    let store = Arc::new(CancelOnFirstSave {
        inner: inner.clone(),
        cancel: cancel.clone(),
    });

    let sources: Vec<ImportSource> = (0..5)
        .map(|i| memory(&format!("day-{i}.gpx"), sample_gpx("day", 40.0 + i as f64 * 0.01)))
        .collect();
    let report = importer(store, 2).run(OWNER, sources, &cancel).await;

    assert_eq!(report.entries.len(), 5);
    assert!(matches!(report.entries[0].outcome, FileOutcome::Imported { .. }));
    assert!(
        report.entries[1..]
            .iter()
            .all(|e| e.outcome == FileOutcome::Cancelled)
    );
    assert_eq!(report.imported_count(), 1);
    assert_eq!(report.cancelled_count(), 4);
    assert_eq!(inner.len().await, 1);
}

#[tokio::test]
async fn test_imported_outcome_reports_time_anomalies() {
    let start = datetime!(2024-06-01 08:00 UTC);
    let regressed = Bytes::from(
        GpxBuilder::new()
            .segment([
                SamplePoint::new(40.000, -105.27).with_timestamp(start),
                SamplePoint::new(40.001, -105.27).with_timestamp(start + Duration::seconds(60)),
                SamplePoint::new(40.002, -105.27).with_timestamp(start + Duration::seconds(30)),
            ])
            .build(),
    );

    let report = importer(Arc::new(MemoryStore::new()), 1)
        .run(
            OWNER,
            vec![
                memory("regressed.gpx", regressed),
                memory("clean.gpx", sample_gpx("clean", 40.0)),
            ],
            &CancellationFlag::new(),
        )
        .await;

    let notes: Vec<ImportNotes> = report
        .entries
        .iter()
        .map(|e| match e.outcome {
            FileOutcome::Imported { notes, .. } => notes,
            ref other => panic!("expected import, got {other:?}"),
        })
        .collect();
    assert_eq!(
        notes,
        vec![
            ImportNotes {
                ordering_anomalies: 1,
                skipped_time_pairs: 1,
            },
            ImportNotes::default(),
        ]
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["entries"][0]["outcome"]["status"], "imported");
    assert_eq!(json["entries"][0]["outcome"]["ordering_anomalies"], 1);
}
