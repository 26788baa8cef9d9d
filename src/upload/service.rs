//! High-level orchestrator: owns the queue, the per-record engines and
//! the event bus. Exposes the host-facing API.
//!
//! All operations are synchronous with respect to each other; concurrency
//! means "several transports have requests in flight", never "several
//! threads run this code". The host (or its transports) drives completion
//! by calling `transfer_progress` / `transfer_finished` back into the
//! service.

use crate::upload::engine::TransferEngine;
use crate::upload::error::{UploadError, UploadResult};
use crate::upload::events::{EventBus, EventHandler, UploadEvent};
use crate::upload::queue::{Admission, QueueManager};
use crate::upload::transport::{TransportFactory, TransportOutcome};
use crate::upload::types::*;
use crate::upload::validator;
use chrono::Utc;
use log::{info, warn};
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

pub struct UploadService {
    config: QueueConfig,
    constraints: UploadConstraints,
    queue: QueueManager,
    /// One engine per `Active` record; exclusively owns that record's
    /// transport. Cleared on every terminal transition.
    engines: HashMap<Uuid, TransferEngine>,
    bus: EventBus,
    factory: TransportFactory,
}

impl UploadService {
    pub fn new(config: QueueConfig, constraints: UploadConstraints, factory: TransportFactory) -> Self {
        let queue = QueueManager::new(config.max_concurrent);
        Self {
            config,
            constraints,
            queue,
            engines: HashMap::new(),
            bus: EventBus::new(),
            factory,
        }
    }

    /// Register a lifecycle event handler.
    pub fn subscribe(&mut self, handler: EventHandler) {
        self.bus.subscribe(handler);
    }

    // ─── Candidates ──────────────────────────────────────────────

    /// Validate and adopt a candidate. Returns the record id on accept;
    /// on reject emits `FileRejected` and leaves the collection untouched.
    pub fn add_candidate(&mut self, candidate: FileCandidate) -> Option<Uuid> {
        if let Err(reason) = validator::validate(&candidate, self.queue.len(), &self.constraints) {
            warn!("upload candidate '{}' rejected: {:?}", candidate.name, reason);
            self.bus.emit(&UploadEvent::FileRejected {
                name: candidate.name,
                reason,
            });
            return None;
        }

        let record = FileRecord::from_candidate(candidate, &self.config.form_field_name);
        let id = record.id;
        info!("upload {} accepted: '{}' ({} bytes)", id, record.name, record.size_bytes);
        self.queue.insert(record);

        if self.config.auto_start {
            // The record is freshly Pending, so this cannot fail.
            let _ = self.request_admission(id);
        }
        Some(id)
    }

    /// Set the destination address for a record before it is sent.
    pub fn set_upload_target(&mut self, id: Uuid, target: Url) -> UploadResult<()> {
        self.queue.require_mut(id)?.upload_target = Some(target);
        Ok(())
    }

    // ─── Admission ───────────────────────────────────────────────

    /// Admit a record to a free slot or park it in the pending queue.
    /// No-op for records already `Queued` or `Active`.
    pub fn request_admission(&mut self, id: Uuid) -> UploadResult<()> {
        if self.queue.request_admission(id)? == Admission::Started {
            self.start_transfers(vec![id]);
        }
        Ok(())
    }

    /// Request admission for every `Pending`/`Errored`/`Aborted` record
    /// among `ids` (default: all non-`Complete` managed records). At most
    /// the free-slot count starts immediately; the rest queue up.
    pub fn upload_all(&mut self, ids: Option<&[Uuid]>) {
        let targets: Vec<Uuid> = match ids {
            Some(list) => list.to_vec(),
            None => self
                .queue
                .iter()
                .filter(|r| r.state != UploadState::Complete)
                .map(|r| r.id)
                .collect(),
        };

        for id in targets {
            let Some(record) = self.queue.get(id) else {
                continue;
            };
            match record.state {
                UploadState::Pending => {
                    let _ = self.request_admission(id);
                }
                UploadState::Errored | UploadState::Aborted => {
                    self.reset_to_pending(id);
                    let _ = self.request_admission(id);
                }
                // Queued, Active and Complete records are left alone.
                _ => {}
            }
        }
    }

    /// Change the concurrency limit (`None` = unbounded). Raising it
    /// admits queued records immediately, in FIFO order; lowering it
    /// never preempts active transfers.
    pub fn set_concurrency_limit(&mut self, limit: Option<NonZeroUsize>) {
        info!("upload concurrency limit set to {:?}", limit.map(NonZeroUsize::get));
        self.config.max_concurrent = limit;
        let started = self.queue.set_limit(limit);
        self.start_transfers(started);
    }

    // ─── Host actions ────────────────────────────────────────────

    /// Cancel an upload. Effective immediately: a queued record never
    /// touches a transport, an active one gets a best-effort transport
    /// abort. Cancelable via `AbortRequested`.
    pub fn abort(&mut self, id: Uuid) -> UploadResult<()> {
        let state = self.queue.require(id)?.state;
        if state.is_terminal() {
            return Err(UploadError::invalid_state(
                id,
                format!("cannot abort an upload in {:?} state", state),
            ));
        }
        if !self.bus.emit(&UploadEvent::AbortRequested { id }) {
            return Ok(());
        }

        match state {
            UploadState::Active => {
                if let Some(mut engine) = self.engines.remove(&id) {
                    engine.abort();
                }
                self.mark_aborted(id);
                let started = self.queue.release_slot(id);
                self.start_transfers(started);
            }
            UploadState::Queued => {
                self.queue.unlink_pending(id);
                self.mark_aborted(id);
            }
            _ => self.mark_aborted(id),
        }
        info!("upload {} aborted", id);
        Ok(())
    }

    /// Re-enter admission after a failure or abort, exactly like a
    /// freshly accepted file. Cancelable via `RetryRequested`.
    pub fn retry(&mut self, id: Uuid) -> UploadResult<()> {
        let state = self.queue.require(id)?.state;
        if !state.is_retryable() {
            return Err(UploadError::invalid_state(
                id,
                format!("cannot retry an upload in {:?} state", state),
            ));
        }
        if !self.bus.emit(&UploadEvent::RetryRequested { id }) {
            return Ok(());
        }

        self.reset_to_pending(id);
        self.request_admission(id)
    }

    /// Drop a record from the managed collection. Active records are
    /// aborted first; queued ones leave without transport side effects.
    pub fn remove(&mut self, id: Uuid) -> UploadResult<()> {
        let state = self.queue.require(id)?.state;
        if state == UploadState::Active {
            if let Some(mut engine) = self.engines.remove(&id) {
                engine.abort();
            }
            let started = self.queue.release_slot(id);
            self.queue.remove(id);
            self.start_transfers(started);
        } else {
            self.queue.remove(id);
        }
        info!("upload {} removed from the collection", id);
        Ok(())
    }

    // ─── Transport callbacks ─────────────────────────────────────

    /// Progress callback from the transport driving `id`.
    pub fn transfer_progress(&mut self, id: Uuid, loaded: u64, total: u64) -> UploadResult<()> {
        let record = self.queue.require_mut(id)?;
        let engine = self.engines.get_mut(&id).ok_or_else(|| {
            UploadError::invalid_state(id, "progress callback for an upload that is not active")
        })?;

        engine.record_progress(&mut record.metrics, loaded, total);
        let (loaded_bytes, total_bytes) = (record.metrics.loaded_bytes, record.metrics.total_bytes);
        self.bus.emit(&UploadEvent::TransferProgress {
            id,
            loaded_bytes,
            total_bytes,
        });
        Ok(())
    }

    /// Terminal callback from the transport driving `id`. Classifies the
    /// outcome unless a `ResponseReceived` handler suppressed it, in which
    /// case the record stays `Active` until `mark_succeeded`/`mark_failed`.
    pub fn transfer_finished(&mut self, id: Uuid, outcome: TransportOutcome) -> UploadResult<()> {
        let state = self.queue.require(id)?.state;
        if state != UploadState::Active || !self.engines.contains_key(&id) {
            return Err(UploadError::invalid_state(
                id,
                format!("completion callback for an upload in {:?} state", state),
            ));
        }

        if let TransportOutcome::Response(response) = &outcome {
            let proceed = self.bus.emit(&UploadEvent::ResponseReceived {
                id,
                status_code: response.status_code,
            });
            if !proceed {
                // Holding pattern: the host resolves this record later.
                info!("upload {} response handling deferred to the host", id);
                return Ok(());
            }
        }

        let result = TransferEngine::classify(&outcome);
        let started = self.finish_active(id, result);
        self.start_transfers(started);
        Ok(())
    }

    /// Resolve a held record (suppressed classification) as succeeded.
    pub fn mark_succeeded(&mut self, id: Uuid) -> UploadResult<()> {
        self.resolve_active(id, Ok(()))
    }

    /// Mark an active record as failed on behalf of a response listener.
    pub fn mark_failed(&mut self, id: Uuid, message: impl Into<String>) -> UploadResult<()> {
        self.resolve_active(
            id,
            Err(TransferFailure::new(FailureReason::ApplicationRejected, message)),
        )
    }

    /// Apply the stalled status text to active records whose transports
    /// have gone quiet. Returns the affected ids.
    pub fn poll_stalled(&mut self) -> Vec<Uuid> {
        let now = Instant::now();
        let stalled: Vec<Uuid> = self
            .engines
            .iter()
            .filter(|(_, engine)| engine.is_stalled(now))
            .map(|(id, _)| *id)
            .collect();
        for id in &stalled {
            if let Some(record) = self.queue.get_mut(*id) {
                record.metrics.status_text = STATUS_STALLED.to_string();
            }
        }
        stalled
    }

    // ─── Observation ─────────────────────────────────────────────

    pub fn get(&self, id: Uuid) -> Option<&FileRecord> {
        self.queue.get(id)
    }

    pub fn snapshot(&self, id: Uuid) -> UploadResult<UploadProgress> {
        Ok(UploadProgress::of(self.queue.require(id)?))
    }

    /// Progress snapshots for all managed records, in collection order.
    pub fn list(&self) -> Vec<UploadProgress> {
        self.queue.iter().map(UploadProgress::of).collect()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.queue.len(),
            pending: 0,
            queued: 0,
            active: 0,
            complete: 0,
            errored: 0,
            aborted: 0,
            total_bytes: 0,
            loaded_bytes: 0,
        };
        for record in self.queue.iter() {
            match record.state {
                UploadState::Pending => stats.pending += 1,
                UploadState::Queued => stats.queued += 1,
                UploadState::Active => stats.active += 1,
                UploadState::Complete => stats.complete += 1,
                UploadState::Errored => stats.errored += 1,
                UploadState::Aborted => stats.aborted += 1,
            }
            stats.total_bytes += record.metrics.total_bytes;
            stats.loaded_bytes += record.metrics.loaded_bytes;
        }
        stats
    }

    pub fn active_count(&self) -> usize {
        self.queue.admitted()
    }

    // ─── Internals ───────────────────────────────────────────────

    /// Start engines for freshly admitted records. An unwound or failed
    /// start releases its slot, which can admit further queued records;
    /// the worklist keeps draining until everything settles.
    fn start_transfers(&mut self, admitted: Vec<Uuid>) {
        let mut worklist: VecDeque<Uuid> = admitted.into();
        while let Some(id) = worklist.pop_front() {
            worklist.extend(self.start_one(id));
        }
    }

    /// Drive one admitted record through BeforeSend → open →
    /// RequestPrepared → send. Returns ids admitted as a consequence of
    /// this record giving its slot back.
    fn start_one(&mut self, id: Uuid) -> Vec<Uuid> {
        if !self.bus.emit(&UploadEvent::BeforeSend { id }) {
            return self.unwind_admission(id);
        }

        let stall = Duration::from_millis(self.config.stall_threshold_ms);
        let mut engine = TransferEngine::new((self.factory)(), stall);

        let Some(record) = self.queue.get(id) else {
            return Vec::new();
        };
        if let Err(e) = engine.open(record) {
            return self.finish_active(
                id,
                Err(TransferFailure::new(FailureReason::ServerUnavailable, e.message)),
            );
        }

        if !self.bus.emit(&UploadEvent::RequestPrepared { id }) {
            engine.abort();
            return self.unwind_admission(id);
        }

        let Some(record) = self.queue.get(id) else {
            return Vec::new();
        };
        if let Err(e) = engine.send(record) {
            return self.finish_active(
                id,
                Err(TransferFailure::new(FailureReason::ServerUnavailable, e.message)),
            );
        }

        if let Some(record) = self.queue.get_mut(id) {
            record.started_at = Some(Utc::now());
            record.attempt += 1;
            record.error = None;
            record.metrics.status_text = STATUS_UPLOADING.to_string();
            info!(
                "upload {} started: '{}' attempt {}",
                id, record.name, record.attempt
            );
        }

        self.engines.insert(id, engine);
        self.bus.emit(&UploadEvent::TransferStarted { id });
        Vec::new()
    }

    /// A cancelable pre-send event was prevented: the record returns to
    /// `Pending` and gives its slot back.
    fn unwind_admission(&mut self, id: Uuid) -> Vec<Uuid> {
        if let Some(record) = self.queue.get_mut(id) {
            record.state = UploadState::Pending;
            record.metrics.status_text = STATUS_PENDING.to_string();
        }
        self.queue.release_slot(id)
    }

    /// Terminal transition for an `Active` record: clears the engine,
    /// applies the outcome, emits the terminal event and returns ids
    /// admitted from the freed slot.
    fn finish_active(&mut self, id: Uuid, result: Result<(), TransferFailure>) -> Vec<Uuid> {
        self.engines.remove(&id);
        let event = match self.queue.get_mut(id) {
            Some(record) => {
                record.completed_at = Some(Utc::now());
                match result {
                    Ok(()) => {
                        record.state = UploadState::Complete;
                        record.error = None;
                        record.metrics.loaded_bytes = record.metrics.total_bytes;
                        record.metrics.progress_percent =
                            if record.metrics.total_bytes == 0 { 0 } else { 100 };
                        record.metrics.remaining_seconds = Some(0);
                        record.metrics.status_text = STATUS_COMPLETE.to_string();
                        info!("upload {} complete: '{}'", id, record.name);
                        Some(UploadEvent::TransferSucceeded { id })
                    }
                    Err(failure) => {
                        record.state = UploadState::Errored;
                        record.metrics.status_text = STATUS_FAILED.to_string();
                        warn!(
                            "upload {} failed: '{}' {:?} ({})",
                            id, record.name, failure.reason, failure.message
                        );
                        let reason = failure.reason;
                        record.error = Some(failure);
                        Some(UploadEvent::TransferFailed { id, reason })
                    }
                }
            }
            None => None,
        };

        if let Some(event) = event {
            self.bus.emit(&event);
        }
        self.queue.release_slot(id)
    }

    fn resolve_active(&mut self, id: Uuid, result: Result<(), TransferFailure>) -> UploadResult<()> {
        let state = self.queue.require(id)?.state;
        if state != UploadState::Active {
            return Err(UploadError::invalid_state(
                id,
                format!("cannot resolve an upload in {:?} state", state),
            ));
        }
        let started = self.finish_active(id, result);
        self.start_transfers(started);
        Ok(())
    }

    fn mark_aborted(&mut self, id: Uuid) {
        if let Some(record) = self.queue.get_mut(id) {
            record.state = UploadState::Aborted;
            record.error = None;
            record.completed_at = Some(Utc::now());
            record.metrics.status_text = STATUS_ABORTED.to_string();
        }
    }

    fn reset_to_pending(&mut self, id: Uuid) {
        if let Some(record) = self.queue.get_mut(id) {
            record.state = UploadState::Pending;
            record.error = None;
            record.started_at = None;
            record.completed_at = None;
            record.metrics = TransferMetrics::for_size(record.size_bytes);
        }
    }
}
