//! # upload: queue manager core
//!
//! Architecture:
//! - `types`: all data structures, enums, config
//! - `error`: categorised error type for contract violations
//! - `validator`: accept/reject a candidate against configured constraints
//! - `events`: cancelable lifecycle notifications
//! - `transport`: pluggable byte-transfer interface
//! - `engine`: drives one file's active phase (metrics, stall watchdog,
//!   response classification)
//! - `queue`: admission control with slots and a FIFO pending queue
//! - `service`: high-level orchestrator (owns queue, engines, event bus)
//!
//! Expected conditions (validation rejects, transport failures, aborts)
//! are state transitions plus events, never `Err`. Errors are reserved for
//! contract violations (unknown record id, operation invalid for the
//! record's current state).

pub mod engine;
pub mod error;
pub mod events;
pub mod queue;
pub mod service;
pub mod transport;
pub mod types;
pub mod validator;

pub use error::{UploadError, UploadErrorKind, UploadResult};
pub use events::{EventBus, EventFlow, UploadEvent};
pub use queue::{Admission, QueueManager};
pub use service::UploadService;
pub use transport::{Transport, TransportFactory, TransportOutcome, TransportPayload, TransportResponse};
pub use types::*;
pub use validator::validate;
