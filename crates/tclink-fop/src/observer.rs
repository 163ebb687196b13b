//! Notifications back to the higher procedures.
//!
//! Observers are invoked on the engine worker and must not block. The
//! registry keeps its list behind a snapshot-on-write `Arc`, so notifying
//! never holds a lock while user code runs and registration from other
//! threads is always safe.

use std::sync::{Arc, RwLock};

use tclink_core::TcTransferFrame;

use crate::directive::{DirectiveTag, FopDirective};
use crate::machine::FopState;

/// Outcome of a transfer request or directive, as seen by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FopOperationStatus {
    /// The request entered the engine and will be processed.
    Accept,
    /// The request was refused; it never entered the engine.
    Reject,
    /// The operation completed successfully.
    PositiveConfirm,
    /// The operation was abandoned (alert, limit, termination).
    NegativeConfirm,
}

/// Reason codes for alerts raised by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FopAlertCode {
    /// CLCW with an N(R) outside the acknowledgement window.
    Synch,
    /// CLCW with an inconsistent flag combination, or adverse feedback
    /// while initialising.
    Clcw,
    /// Transmission limit exhausted on a retransmission request.
    Limit,
    /// CLCW with the lockout flag set.
    Lockout,
    /// Unexpected N(R) while initialising.
    NnR,
    /// The lower layer rejected a frame it was expected to accept.
    Llif,
    /// Explicit termination by the higher procedures.
    Term,
    /// Retransmission timer expired with the limit reached.
    T1,
}

/// Callbacks delivered by the engine. Implementations must be non-blocking.
pub trait FopObserver: Send + Sync {
    /// Progress of a frame transfer request.
    fn transfer_notification(&self, status: FopOperationStatus, frame: &TcTransferFrame);

    /// Progress of a directive.
    fn directive_notification(
        &self,
        status: FopOperationStatus,
        tag: DirectiveTag,
        directive: FopDirective,
        qualifier: u32,
    );

    /// An alert was raised; the engine has returned to the initial state.
    fn alert(&self, code: FopAlertCode);

    /// The state machine moved to a new state.
    fn state_changed(&self, previous: FopState, current: FopState);
}

/// Snapshot-on-write observer list.
pub struct ObserverRegistry {
    inner: RwLock<Arc<Vec<Arc<dyn FopObserver>>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn register(&self, observer: Arc<dyn FopObserver>) {
        let mut guard = self.inner.write().expect("observer list lock poisoned");
        let mut list = guard.as_ref().clone();
        list.push(observer);
        *guard = Arc::new(list);
    }

    /// Remove an observer by identity. Unknown observers are ignored.
    pub fn deregister(&self, observer: &Arc<dyn FopObserver>) {
        let mut guard = self.inner.write().expect("observer list lock poisoned");
        let mut list = guard.as_ref().clone();
        list.retain(|o| !Arc::ptr_eq(o, observer));
        *guard = Arc::new(list);
    }

    /// The current observer list. Iteration over the snapshot tolerates
    /// concurrent registration and deregistration.
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn FopObserver>>> {
        Arc::clone(&self.inner.read().expect("observer list lock poisoned"))
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
