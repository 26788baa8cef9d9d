//! Pluggable byte-transfer interface.
//!
//! A transport instance is created per admission, exclusively owned by the
//! engine driving that record, and never reused. The core does not care
//! what carries the bytes (HTTP, a local simulation, anything). Completion
//! and progress flow back into the service as callbacks keyed by record id;
//! a transport that never calls back leaves its record active and its slot
//! occupied (inherited source behaviour, see DESIGN.md).

use crate::upload::error::UploadResult;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// The payload handed to a transport on send.
#[derive(Debug)]
pub struct TransportPayload<'a> {
    pub field_name: &'a str,
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub body: &'a Bytes,
}

/// Completed-response descriptor reported by a transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
}

/// What a finished transport reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    Response(TransportResponse),
    /// Connection-level failure with no usable response.
    NetworkFailure(String),
}

/// One byte-transfer mechanism for one record's one active phase.
pub trait Transport {
    /// Open the channel towards the destination.
    fn open(&mut self, target: Option<&Url>) -> UploadResult<()>;

    /// Hand over the payload. Returns once the transfer is underway.
    fn send(&mut self, payload: TransportPayload<'_>) -> UploadResult<()>;

    /// Best-effort cancellation. The record's state changes regardless.
    fn abort(&mut self);
}

/// Creates a fresh transport per admission.
pub type TransportFactory = Box<dyn Fn() -> Box<dyn Transport>>;
