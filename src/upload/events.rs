//! Lifecycle notifications with cancelable default actions.
//!
//! Handlers return [`EventFlow`]; `Prevent` suppresses the default action
//! the same way `preventDefault()` does on a cancelable DOM event. Every
//! handler in the chain sees the event regardless of earlier outcomes.
//! Preventing a non-cancelable event has no effect.

use crate::upload::types::{FailureReason, RejectReason};
use uuid::Uuid;

/// One lifecycle notification. Events own lightweight snapshots of their
/// data so handlers never borrow into the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A candidate failed validation and never entered the collection.
    FileRejected { name: String, reason: RejectReason },
    /// About to open a transport. Cancelable: prevents opening.
    BeforeSend { id: Uuid },
    /// Transport opened, payload assembled. Cancelable: prevents send.
    RequestPrepared { id: Uuid },
    TransferStarted { id: Uuid },
    TransferProgress {
        id: Uuid,
        loaded_bytes: u64,
        total_bytes: u64,
    },
    /// Transport produced a response. Cancelable: suppresses automatic
    /// success/error classification (holding pattern).
    ResponseReceived { id: Uuid, status_code: u16 },
    TransferSucceeded { id: Uuid },
    TransferFailed { id: Uuid, reason: FailureReason },
    /// Host asked for a retry. Cancelable.
    RetryRequested { id: Uuid },
    /// Host asked for an abort. Cancelable.
    AbortRequested { id: Uuid },
}

/// Handler verdict for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFlow {
    Continue,
    /// Suppress the default action (cancelable events only).
    Prevent,
}

pub type EventHandler = Box<dyn FnMut(&UploadEvent) -> EventFlow>;

/// Dispatches events to registered handlers, in registration order.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Emit to the whole chain. Returns `true` when the default action
    /// should proceed, `false` when any handler prevented it.
    pub fn emit(&mut self, event: &UploadEvent) -> bool {
        let mut proceed = true;
        for handler in &mut self.handlers {
            if handler(event) == EventFlow::Prevent {
                proceed = false;
            }
        }
        proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_with_no_handlers_proceeds() {
        let mut bus = EventBus::new();
        assert!(bus.emit(&UploadEvent::TransferStarted { id: Uuid::new_v4() }));
    }

    #[test]
    fn test_any_prevent_wins() {
        let mut bus = EventBus::new();
        bus.subscribe(Box::new(|_| EventFlow::Continue));
        bus.subscribe(Box::new(|_| EventFlow::Prevent));
        bus.subscribe(Box::new(|_| EventFlow::Continue));
        assert!(!bus.emit(&UploadEvent::RetryRequested { id: Uuid::new_v4() }));
    }

    #[test]
    fn test_all_handlers_see_the_event() {
        let seen = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        for _ in 0..3 {
            let seen = Rc::clone(&seen);
            bus.subscribe(Box::new(move |_| {
                *seen.borrow_mut() += 1;
                EventFlow::Prevent
            }));
        }
        bus.emit(&UploadEvent::AbortRequested { id: Uuid::new_v4() });
        assert_eq!(*seen.borrow(), 3);
    }
}
