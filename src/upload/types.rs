//! Shared types for the upload queue crate.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use url::Url;
use uuid::Uuid;

// ─── Status text tokens ──────────────────────────────────────────────
//
// `status_text` carries a plain token; a host-side formatter turns it
// into a localised, human-readable string.

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_UPLOADING: &str = "uploading";
pub const STATUS_STALLED: &str = "stalled";
pub const STATUS_COMPLETE: &str = "complete";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_ABORTED: &str = "aborted";

// ─── Lifecycle ───────────────────────────────────────────────────────

/// Lifecycle state of a managed file. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UploadState {
    /// Accepted, awaiting an enqueue decision.
    Pending,
    /// Admission requested, parked until a slot frees.
    Queued,
    /// Transport in flight.
    Active,
    /// Terminal success.
    Complete,
    /// Terminal failure for this attempt; retryable.
    Errored,
    /// Cancelled by the host; retryable.
    Aborted,
}

impl UploadState {
    /// Whether the state admits a retry transition back to `Pending`.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Errored | Self::Aborted)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored | Self::Aborted)
    }
}

/// Why a candidate was rejected by the validator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    TooManyFiles,
    FileTooBig,
    IncorrectFileType,
}

/// Why an active transfer failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    /// Network-level failure, or the transport reported status code 0.
    ServerUnavailable,
    /// Server responded with 5xx.
    UnexpectedServerError,
    /// Server responded with 4xx.
    Forbidden,
    /// A response listener marked the upload as failed.
    ApplicationRejected,
}

/// Failure details kept on a record while it is `Errored`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl TransferFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

// ─── Candidates and records ──────────────────────────────────────────

/// A file the host offers for upload, before validation.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// Opaque binary payload handle.
    pub payload: Bytes,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, payload: Bytes) -> Self {
        let size_bytes = payload.len() as u64;
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
            payload,
        }
    }
}

/// Derived transfer metrics for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetrics {
    pub loaded_bytes: u64,
    pub total_bytes: u64,
    /// `round(loaded / total * 100)`; 0 while nothing is known.
    pub progress_percent: u8,
    pub speed_bytes_per_sec: u64,
    pub elapsed_seconds: f64,
    /// `ceil(elapsed * (total / loaded - 1))`; `None` before first progress.
    pub remaining_seconds: Option<u64>,
    pub status_text: String,
}

impl TransferMetrics {
    pub fn for_size(total_bytes: u64) -> Self {
        Self {
            loaded_bytes: 0,
            total_bytes,
            progress_percent: 0,
            speed_bytes_per_sec: 0,
            elapsed_seconds: 0.0,
            remaining_seconds: None,
            status_text: STATUS_PENDING.to_string(),
        }
    }
}

/// One file under management.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    #[serde(skip)]
    pub payload: Bytes,
    pub form_field_name: String,
    /// Destination address; may be set by the host any time before send.
    pub upload_target: Option<Url>,
    pub state: UploadState,
    pub metrics: TransferMetrics,
    /// Present only in `Errored` state.
    pub error: Option<TransferFailure>,
    /// Number of admissions so far (1 on first start, +1 per retry).
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Create a fresh `Pending` record from an accepted candidate.
    pub fn from_candidate(candidate: FileCandidate, form_field_name: &str) -> Self {
        let metrics = TransferMetrics::for_size(candidate.size_bytes);
        Self {
            id: Uuid::new_v4(),
            name: candidate.name,
            size_bytes: candidate.size_bytes,
            mime_type: candidate.mime_type,
            payload: candidate.payload,
            form_field_name: form_field_name.to_string(),
            upload_target: None,
            state: UploadState::Pending,
            metrics,
            error: None,
            attempt: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

// ─── Snapshots ───────────────────────────────────────────────────────

/// Host-facing progress snapshot for a single record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub id: Uuid,
    pub name: String,
    pub state: UploadState,
    pub loaded_bytes: u64,
    pub total_bytes: u64,
    pub progress_percent: u8,
    pub speed_bytes_per_sec: u64,
    pub remaining_seconds: Option<u64>,
    pub status_text: String,
    pub error: Option<TransferFailure>,
}

impl UploadProgress {
    pub fn of(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            state: record.state,
            loaded_bytes: record.metrics.loaded_bytes,
            total_bytes: record.metrics.total_bytes,
            progress_percent: record.metrics.progress_percent,
            speed_bytes_per_sec: record.metrics.speed_bytes_per_sec,
            remaining_seconds: record.metrics.remaining_seconds,
            status_text: record.metrics.status_text.clone(),
            error: record.error.clone(),
        }
    }
}

/// Summary of the queue state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub queued: usize,
    pub active: usize,
    pub complete: usize,
    pub errored: usize,
    pub aborted: usize,
    pub total_bytes: u64,
    pub loaded_bytes: u64,
}

// ─── Configuration ───────────────────────────────────────────────────

/// Constraints a candidate must satisfy to enter the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConstraints {
    /// Maximum number of managed files; `None` = unlimited.
    #[serde(default)]
    pub max_file_count: Option<usize>,
    /// Maximum size of a single file in bytes; `None` = unlimited.
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,
    /// Comma/space-separated list of MIME globs (`image/*`) and/or
    /// extension suffixes (`.pdf`). Empty = accept everything.
    #[serde(default)]
    pub accept: String,
}

/// Configuration for the upload queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Maximum concurrent transfers; `None` = unbounded.
    #[serde(default = "default_concurrent")]
    pub max_concurrent: Option<NonZeroUsize>,
    /// Start admission automatically when a candidate is accepted.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// No progress for this long marks an active upload as stalled.
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold_ms: u64,
    /// Form field name attached to outgoing payloads.
    #[serde(default = "default_form_field")]
    pub form_field_name: String,
}

fn default_concurrent() -> Option<NonZeroUsize> {
    NonZeroUsize::new(3)
}
fn default_stall_threshold() -> u64 {
    2000
}
fn default_form_field() -> String {
    "file".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_concurrent(),
            auto_start: default_true(),
            stall_threshold_ms: default_stall_threshold(),
            form_field_name: default_form_field(),
        }
    }
}
