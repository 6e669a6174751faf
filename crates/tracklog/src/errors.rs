use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::{export::ExportError, point::InvalidCoordinate};

/// Fatal failures while reading a GPX document. The whole file is rejected.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed GPX document: {0}")]
    MalformedDocument(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(#[from] InvalidCoordinate),

    #[error("No track points found in GPX file")]
    EmptyTrack,
}

/// Assembly-time invariant violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Track has no segments")]
    EmptyTrack,

    #[error("Owner id is missing")]
    MissingOwner,

    #[error("Title must not be blank")]
    BlankTitle,
}

/// A timed point that is stamped earlier than its predecessor in the same
/// segment. Recorded and counted, never fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("point {point} of segment {segment} is timestamped {current} before its predecessor at {previous}")]
pub struct OrderingAnomaly {
    pub segment: usize,
    pub point: usize,
    pub previous: OffsetDateTime,
    pub current: OffsetDateTime,
}

/// Coarse classification callers branch on (surface to a user, record and
/// continue, retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedDocument,
    InvalidCoordinate,
    EmptyTrack,
    Validation,
    NotFound,
    Storage,
    Io,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Parse(ParseError::MalformedDocument(_)) => ErrorKind::MalformedDocument,
            AppError::Parse(ParseError::InvalidCoordinate(_)) => ErrorKind::InvalidCoordinate,
            AppError::Parse(ParseError::EmptyTrack) => ErrorKind::EmptyTrack,
            AppError::Validation(ValidationError::EmptyTrack) => ErrorKind::EmptyTrack,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound => ErrorKind::NotFound,
            AppError::Database(_) | AppError::ObjectStore(_) => ErrorKind::Storage,
            AppError::Io(_) => ErrorKind::Io,
            AppError::Export(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure is the caller's input rather than our infrastructure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedDocument
                | ErrorKind::InvalidCoordinate
                | ErrorKind::EmptyTrack
                | ErrorKind::Validation
                | ErrorKind::NotFound
        )
    }
}
