//! Transfer engine: drives exactly one record's active phase.
//!
//! Owns the transport for that phase, recomputes derived metrics on every
//! progress callback, and watches for stalls. The stall watchdog is
//! clock-polled: progress callbacks reset it, and the service asks
//! [`TransferEngine::is_stalled`] on its own tick.

use crate::upload::error::UploadResult;
use crate::upload::transport::{Transport, TransportOutcome, TransportPayload};
use crate::upload::types::{
    FailureReason, FileRecord, TransferFailure, TransferMetrics, STATUS_UPLOADING,
};
use std::time::{Duration, Instant};

pub struct TransferEngine {
    transport: Box<dyn Transport>,
    started: Instant,
    last_progress: Instant,
    stall_threshold: Duration,
}

impl TransferEngine {
    pub fn new(transport: Box<dyn Transport>, stall_threshold: Duration) -> Self {
        let now = Instant::now();
        Self {
            transport,
            started: now,
            last_progress: now,
            stall_threshold,
        }
    }

    // ─── Transport drive-through ─────────────────────────────────

    pub fn open(&mut self, record: &FileRecord) -> UploadResult<()> {
        self.transport.open(record.upload_target.as_ref())
    }

    pub fn send(&mut self, record: &FileRecord) -> UploadResult<()> {
        self.started = Instant::now();
        self.last_progress = self.started;
        self.transport.send(TransportPayload {
            field_name: &record.form_field_name,
            file_name: &record.name,
            mime_type: &record.mime_type,
            body: &record.payload,
        })
    }

    pub fn abort(&mut self) {
        self.transport.abort();
    }

    // ─── Metrics ─────────────────────────────────────────────────

    /// Apply one progress callback and recompute derived metrics.
    /// Resets the stall watchdog.
    pub fn record_progress(&mut self, metrics: &mut TransferMetrics, loaded: u64, total: u64) {
        self.last_progress = Instant::now();

        metrics.total_bytes = total;
        metrics.loaded_bytes = loaded.min(total);
        metrics.elapsed_seconds = self.started.elapsed().as_secs_f64().max(0.001);
        metrics.progress_percent = if total == 0 {
            0
        } else {
            (metrics.loaded_bytes as f64 / total as f64 * 100.0).round() as u8
        };
        metrics.speed_bytes_per_sec =
            (metrics.loaded_bytes as f64 / metrics.elapsed_seconds) as u64;
        metrics.remaining_seconds = if metrics.loaded_bytes == 0 {
            None
        } else {
            let ratio = total as f64 / metrics.loaded_bytes as f64 - 1.0;
            Some((metrics.elapsed_seconds * ratio).ceil() as u64)
        };
        metrics.status_text = STATUS_UPLOADING.to_string();
    }

    /// Whether the watchdog has fired: no progress callback within the
    /// stall threshold.
    pub fn is_stalled(&self, now: Instant) -> bool {
        now.duration_since(self.last_progress) >= self.stall_threshold
    }

    // ─── Response classification ─────────────────────────────────

    /// Classify a terminal transport outcome. Network failures and
    /// application-layer rejections map to distinct reasons so the host
    /// can tell them apart.
    pub fn classify(outcome: &TransportOutcome) -> Result<(), TransferFailure> {
        match outcome {
            TransportOutcome::NetworkFailure(msg) => Err(TransferFailure::new(
                FailureReason::ServerUnavailable,
                msg.clone(),
            )),
            TransportOutcome::Response(response) => match response.status_code {
                0 => Err(TransferFailure::new(
                    FailureReason::ServerUnavailable,
                    "transport reported status 0",
                )),
                500..=599 => Err(TransferFailure::new(
                    FailureReason::UnexpectedServerError,
                    format!("server responded {}", response.status_code),
                )),
                400..=499 => Err(TransferFailure::new(
                    FailureReason::Forbidden,
                    format!("server responded {}", response.status_code),
                )),
                _ => Ok(()),
            },
        }
    }
}
