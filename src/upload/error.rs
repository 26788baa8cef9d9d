//! Upload-queue error type.
//!
//! Expected conditions (validation rejects, transport failures, aborts)
//! never surface here; they are state transitions plus events. This type
//! covers contract violations only.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Categorised upload-queue error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadError {
    pub kind: UploadErrorKind,
    pub message: String,
    /// Record the operation targeted, if any.
    pub record_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// No managed record with the given id.
    NotFound,
    /// Operation not valid for the record's current state.
    InvalidState,
    /// Synchronous transport failure (open/send). The service converts
    /// these into an `Errored` transition; they never reach the host.
    Transport,
}

pub type UploadResult<T> = Result<T, UploadError>;

// ── Construction helpers ─────────────────────────────────────────────

impl UploadError {
    pub fn new(kind: UploadErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            record_id: None,
        }
    }

    pub fn with_record(mut self, id: Uuid) -> Self {
        self.record_id = Some(id);
        self
    }

    pub fn not_found(id: Uuid) -> Self {
        Self::new(UploadErrorKind::NotFound, format!("upload record {} not found", id)).with_record(id)
    }

    pub fn invalid_state(id: Uuid, msg: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::InvalidState, msg).with_record(id)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(UploadErrorKind::Transport, msg)
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[upload {:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for UploadError {}

impl From<UploadError> for String {
    fn from(e: UploadError) -> String {
        e.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_carries_record_id() {
        let id = Uuid::new_v4();
        let err = UploadError::not_found(id);
        assert_eq!(err.kind, UploadErrorKind::NotFound);
        assert_eq!(err.record_id, Some(id));
        assert!(err.message.contains(&id.to_string()));
    }

    #[test]
    fn test_display_includes_kind() {
        let err = UploadError::invalid_state(Uuid::new_v4(), "cannot retry an active upload");
        let text = err.to_string();
        assert!(text.contains("InvalidState"));
        assert!(text.contains("cannot retry"));
    }
}
