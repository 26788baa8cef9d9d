//! # upload-queue: bounded-concurrency upload queue
//!
//! In-memory upload scheduling core for a file-upload component:
//!   • Candidate validation (file count / size / accept-pattern rules)
//!   • Admission control with a configurable concurrency limit
//!   • Strict FIFO queueing of uploads waiting for a free slot
//!   • Per-file progress tracking with speed & ETA calculation
//!   • Stall detection on uploads with no recent progress
//!   • Explicit retry and cancellation, including abort-before-start
//!   • Cancelable lifecycle events for host-side customisation
//!
//! The byte transfer itself is pluggable: the host supplies a
//! [`Transport`](upload::Transport) factory and drives completion by
//! feeding progress and response callbacks into the
//! [`UploadService`](upload::UploadService).

pub mod upload;

pub use upload::{
    FileCandidate, QueueConfig, UploadConstraints, UploadError, UploadResult, UploadService,
};
