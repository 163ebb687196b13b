//! Stimulus classification.
//!
//! Pure functions from a stimulus plus a snapshot of the engine scalars to
//! one event in the closed alphabet. The CLCW tree follows CCSDS 232.1
//! section 5.4; sequence comparisons use the modulo-256 window arithmetic
//! from `tclink_core::seqnum`.

use tclink_core::{seqnum, Clcw, FrameType};

use crate::directive::FopDirective;
use crate::event::EventId;

/// The engine scalars the classifier reads.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierSnapshot {
    /// V(S): next N(S) to be assigned.
    pub vs: u8,
    /// NN(R): oldest unacknowledged sequence number.
    pub nnr: u8,
    pub transmission_count: u32,
    pub transmission_limit: u32,
    pub timeout_type: u8,
}

/// Classify a CLCW arrival.
pub fn classify_clcw(clcw: &Clcw, s: &ClassifierSnapshot) -> EventId {
    if clcw.lockout {
        return EventId::E14;
    }
    let nr = clcw.report_value;
    if nr == s.vs {
        // All outstanding AD frames acknowledged.
        if !clcw.retransmit {
            if !clcw.wait {
                if nr == s.nnr {
                    EventId::E1
                } else {
                    EventId::E2
                }
            } else {
                EventId::E3
            }
        } else {
            EventId::E4
        }
    } else if seqnum::in_window(nr, s.nnr, s.vs) {
        // Some outstanding AD frames not yet acknowledged.
        if !clcw.retransmit {
            if !clcw.wait {
                if nr == s.nnr {
                    EventId::E5
                } else {
                    EventId::E6
                }
            } else {
                EventId::E7
            }
        } else if s.transmission_limit == 1 {
            if nr != s.nnr {
                EventId::E101
            } else {
                EventId::E102
            }
        } else if nr != s.nnr {
            if !clcw.wait {
                EventId::E8
            } else {
                EventId::E9
            }
        } else if s.transmission_count < s.transmission_limit {
            if !clcw.wait {
                EventId::E10
            } else {
                EventId::E11
            }
        } else if !clcw.wait {
            EventId::E12
        } else {
            EventId::E103
        }
    } else {
        EventId::E13
    }
}

/// Classify a retransmission timer expiry.
pub fn classify_timer_expiry(s: &ClassifierSnapshot) -> EventId {
    if s.transmission_count < s.transmission_limit {
        if s.timeout_type == 0 {
            EventId::E16
        } else {
            EventId::E104
        }
    } else if s.timeout_type == 0 {
        EventId::E17
    } else {
        EventId::E18
    }
}

/// Classify a request to transfer an AD frame.
pub fn classify_ad_request(wait_queue_occupied: bool) -> EventId {
    if wait_queue_occupied {
        EventId::E20
    } else {
        EventId::E19
    }
}

/// Classify a request to transfer a BD frame.
pub fn classify_bd_request(bd_out_ready: bool) -> EventId {
    if bd_out_ready {
        EventId::E21
    } else {
        EventId::E22
    }
}

/// Classify a lower-layer accept/reject response.
pub fn classify_lower_layer(frame_type: FrameType, accepted: bool) -> EventId {
    match (frame_type, accepted) {
        (FrameType::Ad, true) => EventId::E41,
        (FrameType::Ad, false) => EventId::E42,
        (FrameType::Bc, true) => EventId::E43,
        (FrameType::Bc, false) => EventId::E44,
        (FrameType::Bd, true) => EventId::E45,
        (FrameType::Bd, false) => EventId::E46,
    }
}

/// Classify a directive from the higher procedures.
///
/// `suspend_state` is the engine's SS variable (0..=4 by construction).
pub fn classify_directive(
    directive: FopDirective,
    bc_out_ready: bool,
    suspend_state: u8,
) -> EventId {
    match directive {
        FopDirective::InitAdWithoutClcw => EventId::E23,
        FopDirective::InitAdWithClcw => EventId::E24,
        FopDirective::InitAdWithUnlock => {
            if bc_out_ready {
                EventId::E25
            } else {
                EventId::E26
            }
        }
        FopDirective::InitAdWithSetVr => {
            if bc_out_ready {
                EventId::E27
            } else {
                EventId::E28
            }
        }
        FopDirective::Terminate => EventId::E29,
        FopDirective::Resume => match suspend_state {
            0 => EventId::E30,
            1 => EventId::E31,
            2 => EventId::E32,
            3 => EventId::E33,
            _ => EventId::E34,
        },
        FopDirective::SetVs => EventId::E35,
        FopDirective::SetFopSlidingWindow => EventId::E36,
        FopDirective::SetT1Initial => EventId::E37,
        FopDirective::SetTransmissionLimit => EventId::E38,
        FopDirective::SetTimeoutType => EventId::E39,
    }
}
