//! Admission control: slots, FIFO pending queue, managed collection.
//!
//! The queue owns `admitted` and `pending` exclusively; every mutation
//! funnels through the named operations here. The pending queue is FIFO by
//! time-of-admission-request, independent of whatever display ordering the
//! host applies to the collection. The concurrency limit is enforced at
//! admission time only: lowering it never preempts active records.

use crate::upload::error::{UploadError, UploadResult};
use crate::upload::types::{FileRecord, UploadState, STATUS_QUEUED};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use uuid::Uuid;

/// What an admission request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free; the record is now `Active`.
    Started,
    /// No slot; the record is now `Queued` at the tail of the pending queue.
    Parked,
    /// The record was already `Queued` or `Active`; nothing changed.
    Unchanged,
}

pub struct QueueManager {
    records: HashMap<Uuid, FileRecord>,
    /// Insertion order of the managed collection (host-observable listing).
    order: Vec<Uuid>,
    /// FIFO queue of records awaiting a slot.
    pending: VecDeque<Uuid>,
    /// Number of records currently `Active`.
    admitted: usize,
    /// `None` = unbounded.
    limit: Option<NonZeroUsize>,
}

impl QueueManager {
    pub fn new(limit: Option<NonZeroUsize>) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            pending: VecDeque::new(),
            admitted: 0,
            limit,
        }
    }

    // ─── Collection access ───────────────────────────────────────

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn admitted(&self) -> usize {
        self.admitted
    }

    pub fn limit(&self) -> Option<NonZeroUsize> {
        self.limit
    }

    pub fn get(&self, id: Uuid) -> Option<&FileRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut FileRecord> {
        self.records.get_mut(&id)
    }

    /// Like `get`, but an unknown id is a contract violation.
    pub fn require(&self, id: Uuid) -> UploadResult<&FileRecord> {
        self.records.get(&id).ok_or_else(|| UploadError::not_found(id))
    }

    pub fn require_mut(&mut self, id: Uuid) -> UploadResult<&mut FileRecord> {
        self.records.get_mut(&id).ok_or_else(|| UploadError::not_found(id))
    }

    /// Record ids in collection (insertion) order.
    pub fn ids(&self) -> Vec<Uuid> {
        self.order.clone()
    }

    /// Records in collection order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Ids currently parked in the pending queue, head first.
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.pending.iter().copied().collect()
    }

    pub fn insert(&mut self, record: FileRecord) {
        self.order.push(record.id);
        self.records.insert(record.id, record);
    }

    /// Drop a record from the collection and the pending queue. Does not
    /// touch the slot count; the caller aborts active records first.
    pub fn remove(&mut self, id: Uuid) -> Option<FileRecord> {
        self.pending.retain(|x| *x != id);
        self.order.retain(|x| *x != id);
        self.records.remove(&id)
    }

    /// Unlink a record from the pending queue without removing it from
    /// the collection (abort of a queued record).
    pub fn unlink_pending(&mut self, id: Uuid) {
        self.pending.retain(|x| *x != id);
    }

    // ─── Admission ───────────────────────────────────────────────

    pub fn has_free_slot(&self) -> bool {
        self.limit.map_or(true, |l| self.admitted < l.get())
    }

    /// Admit a `Pending` record to a slot, or park it. Calling again on a
    /// `Queued` or `Active` record is a no-op.
    pub fn request_admission(&mut self, id: Uuid) -> UploadResult<Admission> {
        let free = self.has_free_slot();
        let record = self.require_mut(id)?;
        match record.state {
            UploadState::Pending => {
                if free {
                    record.state = UploadState::Active;
                    self.admitted += 1;
                    debug!("upload {} admitted ({} active)", id, self.admitted);
                    Ok(Admission::Started)
                } else {
                    record.state = UploadState::Queued;
                    record.metrics.status_text = STATUS_QUEUED.to_string();
                    self.pending.push_back(id);
                    debug!("upload {} parked at queue position {}", id, self.pending.len());
                    Ok(Admission::Parked)
                }
            }
            UploadState::Queued | UploadState::Active => Ok(Admission::Unchanged),
            state => Err(UploadError::invalid_state(
                id,
                format!("cannot request admission in {:?} state", state),
            )),
        }
    }

    /// Return a slot after a terminal transition, then admit queued
    /// records while slots remain. Returns the newly admitted ids in
    /// FIFO order.
    pub fn release_slot(&mut self, id: Uuid) -> Vec<Uuid> {
        self.admitted = self.admitted.saturating_sub(1);
        debug!("upload {} released its slot ({} active)", id, self.admitted);
        self.drain_pending()
    }

    /// Update the concurrency limit. Raising it drains the pending queue
    /// immediately; lowering it only takes effect at future admissions.
    pub fn set_limit(&mut self, limit: Option<NonZeroUsize>) -> Vec<Uuid> {
        self.limit = limit;
        self.drain_pending()
    }

    fn drain_pending(&mut self) -> Vec<Uuid> {
        let mut started = Vec::new();
        while self.has_free_slot() {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            // Entries can go stale if a queued record was aborted or
            // removed without unlinking; skip them.
            let Some(record) = self.records.get_mut(&id) else {
                continue;
            };
            if record.state != UploadState::Queued {
                continue;
            }
            record.state = UploadState::Active;
            self.admitted += 1;
            started.push(id);
        }
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::types::FileCandidate;
    use bytes::Bytes;

    fn manager(limit: usize) -> QueueManager {
        QueueManager::new(NonZeroUsize::new(limit))
    }

    fn add_record(q: &mut QueueManager, name: &str) -> Uuid {
        let candidate = FileCandidate::new(name, "text/plain", Bytes::from_static(b"data"));
        let record = FileRecord::from_candidate(candidate, "file");
        let id = record.id;
        q.insert(record);
        id
    }

    #[test]
    fn test_admits_up_to_limit_then_parks() {
        let mut q = manager(2);
        let a = add_record(&mut q, "a");
        let b = add_record(&mut q, "b");
        let c = add_record(&mut q, "c");

        assert_eq!(q.request_admission(a).unwrap(), Admission::Started);
        assert_eq!(q.request_admission(b).unwrap(), Admission::Started);
        assert_eq!(q.request_admission(c).unwrap(), Admission::Parked);

        assert_eq!(q.admitted(), 2);
        assert_eq!(q.get(c).unwrap().state, UploadState::Queued);
        assert_eq!(q.get(c).unwrap().metrics.status_text, STATUS_QUEUED);
    }

    #[test]
    fn test_request_admission_is_idempotent() {
        let mut q = manager(1);
        let a = add_record(&mut q, "a");
        let b = add_record(&mut q, "b");

        q.request_admission(a).unwrap();
        assert_eq!(q.request_admission(a).unwrap(), Admission::Unchanged);
        assert_eq!(q.admitted(), 1);

        q.request_admission(b).unwrap();
        assert_eq!(q.request_admission(b).unwrap(), Admission::Unchanged);
        assert_eq!(q.pending_ids(), vec![b]);
    }

    #[test]
    fn test_fifo_release() {
        let mut q = manager(1);
        let r1 = add_record(&mut q, "r1");
        let r2 = add_record(&mut q, "r2");
        let r3 = add_record(&mut q, "r3");
        q.request_admission(r1).unwrap();
        q.request_admission(r2).unwrap();
        q.request_admission(r3).unwrap();

        // r1 completes: r2 starts next, never r3.
        q.get_mut(r1).unwrap().state = UploadState::Complete;
        let started = q.release_slot(r1);
        assert_eq!(started, vec![r2]);
        assert_eq!(q.get(r2).unwrap().state, UploadState::Active);
        assert_eq!(q.get(r3).unwrap().state, UploadState::Queued);
    }

    #[test]
    fn test_raising_limit_drains_fifo() {
        let mut q = manager(1);
        let ids: Vec<Uuid> = (0..4).map(|i| add_record(&mut q, &format!("f{}", i))).collect();
        for id in &ids {
            q.request_admission(*id).unwrap();
        }
        assert_eq!(q.admitted(), 1);

        let started = q.set_limit(NonZeroUsize::new(3));
        assert_eq!(started, vec![ids[1], ids[2]]);
        assert_eq!(q.admitted(), 3);
        assert_eq!(q.pending_ids(), vec![ids[3]]);
    }

    #[test]
    fn test_lowering_limit_never_preempts() {
        let mut q = manager(3);
        let ids: Vec<Uuid> = (0..3).map(|i| add_record(&mut q, &format!("f{}", i))).collect();
        for id in &ids {
            q.request_admission(*id).unwrap();
        }

        let started = q.set_limit(NonZeroUsize::new(1));
        assert!(started.is_empty());
        // admitted transiently exceeds the new limit.
        assert_eq!(q.admitted(), 3);
        assert!(ids.iter().all(|id| q.get(*id).unwrap().state == UploadState::Active));

        // Natural completions bring it back down without new admissions.
        q.get_mut(ids[0]).unwrap().state = UploadState::Complete;
        assert!(q.release_slot(ids[0]).is_empty());
        assert_eq!(q.admitted(), 2);
    }

    #[test]
    fn test_unbounded_limit() {
        let mut q = QueueManager::new(None);
        for i in 0..10 {
            let id = add_record(&mut q, &format!("f{}", i));
            assert_eq!(q.request_admission(id).unwrap(), Admission::Started);
        }
        assert_eq!(q.admitted(), 10);
        assert!(q.pending_ids().is_empty());
    }

    #[test]
    fn test_admission_from_terminal_state_is_an_error() {
        let mut q = manager(1);
        let a = add_record(&mut q, "a");
        q.get_mut(a).unwrap().state = UploadState::Complete;
        assert!(q.request_admission(a).is_err());
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let mut q = manager(1);
        assert!(q.request_admission(Uuid::new_v4()).is_err());
        assert!(q.require(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_remove_unlinks_pending() {
        let mut q = manager(1);
        let a = add_record(&mut q, "a");
        let b = add_record(&mut q, "b");
        q.request_admission(a).unwrap();
        q.request_admission(b).unwrap();

        assert!(q.remove(b).is_some());
        assert!(q.pending_ids().is_empty());
        assert_eq!(q.len(), 1);

        // Releasing a's slot finds nothing to admit.
        q.get_mut(a).unwrap().state = UploadState::Complete;
        assert!(q.release_slot(a).is_empty());
    }

    #[test]
    fn test_collection_order_is_insertion_order() {
        let mut q = manager(1);
        let a = add_record(&mut q, "a");
        let b = add_record(&mut q, "b");
        let c = add_record(&mut q, "c");
        assert_eq!(q.ids(), vec![a, b, c]);
        q.remove(b);
        assert_eq!(q.ids(), vec![a, c]);
    }
}
