//! The closed FOP-1 event alphabet and the event record.
//!
//! Event numbers follow CCSDS 232.1 section 5.4. E101..E104 are the
//! conventional identifiers for the table rows that split E8/E12/E16 on
//! `transmission_limit == 1` and `timeout_type == 1`.

use tclink_core::{Clcw, TcTransferFrame};

use crate::directive::{DirectiveTag, FopDirective};

/// One event in the FOP-1 alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    // -- CLCW arrival, lockout clear, N(R) = V(S) (all AD frames acknowledged)
    /// retransmit=0, wait=0, N(R) = NN(R): nothing new.
    E1,
    /// retransmit=0, wait=0, N(R) != NN(R): new frames acknowledged.
    E2,
    /// retransmit=0, wait=1: inconsistent report.
    E3,
    /// retransmit=1: retransmission requested with nothing outstanding.
    E4,

    // -- CLCW arrival, lockout clear, NN(R) <= N(R) < V(S) (some outstanding)
    /// retransmit=0, wait=0, N(R) = NN(R).
    E5,
    /// retransmit=0, wait=0, N(R) != NN(R).
    E6,
    /// retransmit=0, wait=1: inconsistent report.
    E7,
    /// retransmit=1, limit>1, N(R) != NN(R), wait=0.
    E8,
    /// retransmit=1, limit>1, N(R) != NN(R), wait=1.
    E9,
    /// retransmit=1, limit>1, N(R) = NN(R), count<limit, wait=0.
    E10,
    /// retransmit=1, limit>1, N(R) = NN(R), count<limit, wait=1.
    E11,
    /// retransmit=1, limit>1, N(R) = NN(R), count>=limit, wait=0.
    E12,

    /// CLCW with N(R) outside the window: synchronisation lost.
    E13,
    /// CLCW with the lockout flag set.
    E14,

    // -- Timer expiry
    /// count<limit, timeout_type=0.
    E16,
    /// count>=limit, timeout_type=0.
    E17,
    /// count>=limit, timeout_type=1.
    E18,

    // -- Requests to transfer a frame
    /// AD transfer request, wait queue empty.
    E19,
    /// AD transfer request, wait queue occupied.
    E20,
    /// BD transfer request, no BD transmission outstanding.
    E21,
    /// BD transfer request while one is outstanding.
    E22,

    // -- Directives
    /// Initiate AD service (without CLCW check).
    E23,
    /// Initiate AD service (with CLCW check).
    E24,
    /// Initiate AD service with Unlock, BC out ready.
    E25,
    /// Initiate AD service with Unlock, BC out not ready.
    E26,
    /// Initiate AD service with Set V(R), BC out ready.
    E27,
    /// Initiate AD service with Set V(R), BC out not ready.
    E28,
    /// Terminate AD service.
    E29,
    /// Resume, not suspended (SS=0).
    E30,
    /// Resume from suspend state 1.
    E31,
    /// Resume from suspend state 2.
    E32,
    /// Resume from suspend state 3.
    E33,
    /// Resume from suspend state 4.
    E34,
    /// Set V(S).
    E35,
    /// Set FOP sliding window.
    E36,
    /// Set T1 initial value.
    E37,
    /// Set transmission limit.
    E38,
    /// Set timeout type.
    E39,

    // -- Lower-layer responses
    /// AD frame accepted.
    E41,
    /// AD frame rejected.
    E42,
    /// BC frame accepted.
    E43,
    /// BC frame rejected.
    E44,
    /// BD frame accepted.
    E45,
    /// BD frame rejected.
    E46,

    // -- Split rows
    /// retransmit=1, limit=1, N(R) != NN(R).
    E101,
    /// retransmit=1, limit=1, N(R) = NN(R).
    E102,
    /// retransmit=1, limit>1, N(R) = NN(R), count>=limit, wait=1.
    E103,
    /// Timer expiry, count<limit, timeout_type=1.
    E104,
}

impl EventId {
    /// Every event, for exhaustiveness checks in tests and tools.
    pub const ALL: [EventId; 48] = [
        EventId::E1,
        EventId::E2,
        EventId::E3,
        EventId::E4,
        EventId::E5,
        EventId::E6,
        EventId::E7,
        EventId::E8,
        EventId::E9,
        EventId::E10,
        EventId::E11,
        EventId::E12,
        EventId::E13,
        EventId::E14,
        EventId::E16,
        EventId::E17,
        EventId::E18,
        EventId::E19,
        EventId::E20,
        EventId::E21,
        EventId::E22,
        EventId::E23,
        EventId::E24,
        EventId::E25,
        EventId::E26,
        EventId::E27,
        EventId::E28,
        EventId::E29,
        EventId::E30,
        EventId::E31,
        EventId::E32,
        EventId::E33,
        EventId::E34,
        EventId::E35,
        EventId::E36,
        EventId::E37,
        EventId::E38,
        EventId::E39,
        EventId::E41,
        EventId::E42,
        EventId::E43,
        EventId::E44,
        EventId::E45,
        EventId::E46,
        EventId::E101,
        EventId::E102,
        EventId::E103,
        EventId::E104,
    ];
}

/// A classified event together with the stimulus payload that produced it.
#[derive(Debug, Clone)]
pub struct FopEvent {
    pub id: EventId,
    pub clcw: Option<Clcw>,
    pub frame: Option<TcTransferFrame>,
    pub directive: Option<(DirectiveTag, FopDirective, u32)>,
}

impl FopEvent {
    pub fn from_clcw(id: EventId, clcw: Clcw) -> Self {
        Self {
            id,
            clcw: Some(clcw),
            frame: None,
            directive: None,
        }
    }

    pub fn from_frame(id: EventId, frame: TcTransferFrame) -> Self {
        Self {
            id,
            clcw: None,
            frame: Some(frame),
            directive: None,
        }
    }

    pub fn from_directive(
        id: EventId,
        tag: DirectiveTag,
        directive: FopDirective,
        qualifier: u32,
    ) -> Self {
        Self {
            id,
            clcw: None,
            frame: None,
            directive: Some((tag, directive, qualifier)),
        }
    }

    pub fn from_timer(id: EventId) -> Self {
        Self {
            id,
            clcw: None,
            frame: None,
            directive: None,
        }
    }
}
