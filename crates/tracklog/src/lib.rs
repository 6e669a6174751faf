//! GPS track log ingestion.
//!
//! Raw GPX bytes go through [`parse_and_summarize`] (parser plus statistics
//! engine) and [`assemble_track`] to become a [`Track`], which a
//! [`TrackStore`] persists. [`Ingestor`] wires those steps together for
//! single uploads and [`BatchImporter`] runs them over many files.

pub mod assembler;
pub mod batch;
pub mod config;
pub mod database;
pub mod errors;
pub mod export;
pub mod gpx_parser;
pub mod gpx_processor;
pub mod ingest;
pub mod models;
pub mod object_store_service;
pub mod point;
pub mod statistics;
pub mod storage;

pub use assembler::{TrackMetadata, assemble_track};
pub use batch::{BatchImporter, BatchReport, CancellationFlag, FileOutcome, ImportSource};
pub use errors::{AppError, ErrorKind, OrderingAnomaly, ParseError, ValidationError};
pub use gpx_processor::{Summary, parse_and_summarize};
pub use ingest::{ImportNotes, Ingestor};
pub use models::{Track, TrackSummary};
pub use point::{Point, Segment};
pub use statistics::{StatisticsConfig, TrackStatistics};
pub use storage::{MemoryStore, TrackStore};
