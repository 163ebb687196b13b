//! The FOP-1 state machine.
//!
//! Six states, one transition table. Each `(state, event)` cell names the
//! elementary actions to run and the state to install afterwards; the table
//! is a single total function over the closed alphabet, so the whole
//! CCSDS 232.1 Table 5-1 can be audited in one place. Cells the table marks
//! as not applicable are explicit `ignore` arms: the event is consumed, the
//! state does not change.
//!
//! Actions within a cell are listed in execution order: scalar updates and
//! queue mutations first, then timer control, then observer notifications,
//! then lower-layer emissions. A cell's next state is installed only after
//! its whole action list has run.

use crate::event::EventId;
use crate::observer::FopAlertCode;

/// The FOP-1 states, S1..S6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FopState {
    /// S1: AD service running, no retransmission pending.
    Active,
    /// S2: retransmission pending, receiver ready.
    RetransmitWithoutWait,
    /// S3: retransmission pending, receiver asked to wait.
    RetransmitWithWait,
    /// S4: initialising, waiting for a clean CLCW (no BC frame out).
    InitialisingWithoutBc,
    /// S5: initialising, a BC Unlock or Set V(R) frame is in flight.
    InitialisingWithBc,
    /// S6: initial; only directives are serviced.
    Initial,
}

impl FopState {
    pub const ALL: [FopState; 6] = [
        FopState::Active,
        FopState::RetransmitWithoutWait,
        FopState::RetransmitWithWait,
        FopState::InitialisingWithoutBc,
        FopState::InitialisingWithBc,
        FopState::Initial,
    ];

    /// The conventional S-number name.
    pub fn name(self) -> &'static str {
        match self {
            FopState::Active => "S1 Active",
            FopState::RetransmitWithoutWait => "S2 Retransmit without wait",
            FopState::RetransmitWithWait => "S3 Retransmit with wait",
            FopState::InitialisingWithoutBc => "S4 Initialising without BC",
            FopState::InitialisingWithBc => "S5 Initialising with BC",
            FopState::Initial => "S6 Initial",
        }
    }

    /// The suspend-state value recorded when the AD service is suspended
    /// from this state, if suspension applies here.
    pub fn suspend_code(self) -> Option<u8> {
        match self {
            FopState::Active => Some(1),
            FopState::RetransmitWithoutWait => Some(2),
            FopState::RetransmitWithWait => Some(3),
            FopState::InitialisingWithoutBc => Some(4),
            FopState::InitialisingWithBc | FopState::Initial => None,
        }
    }
}

/// The elementary actions a table cell can name.
///
/// Payload-dependent actions (the acknowledging N(R), the frame, the
/// directive tag and qualifier) read their inputs from the event record at
/// execution time, keeping the table itself free of runtime data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Remove acknowledged frames from the sent queue head, positively
    /// confirming each, and advance NN(R) to the report value.
    RemoveAcknowledged,
    /// Restart the timer if the sent queue is non-empty, cancel it otherwise.
    UpdateTimerFromQueue,
    /// Clear every to-be-retransmitted flag (receiver reports clean).
    ClearRetransmitFlags,
    /// Resume AD transmission: retransmit a flagged frame or pull the wait
    /// queue into the sliding window.
    LookForFrame,
    /// Resend the pending BC frame if it is flagged and the BC out is ready.
    LookForDirective,
    /// Bump the transmission count, restart the timer, flag every sent-queue
    /// entry for retransmission.
    InitiateRetransmission,
    /// Send the requested BD frame and accept the request.
    TransmitBd,
    /// Place the requested AD frame on the wait queue.
    AddToWaitQueue,
    /// Reject the requested frame.
    RejectFrame,
    /// Record the lower-layer response for the AD transmit request.
    SetAdOutReady,
    /// Record the lower-layer response for the BC transmit request.
    SetBcOutReady,
    /// Record the lower-layer response for the BD transmit request.
    SetBdOutReady,
    /// Reset V(S), NN(R), counters, queues, flags and timer.
    Initialise,
    /// V(S) := NN(R) := directive qualifier (Set V(R) initialisation).
    SetVsFromQualifier,
    /// Build the BC Unlock frame via the framer, queue and send it.
    TransmitBcUnlock,
    /// Build the BC Set V(R) frame via the framer, queue and send it.
    TransmitBcSetVr,
    /// Remove the completed BC frame from the sent queue.
    ConfirmBc,
    /// Accept the directive (recording pending initialisations).
    AcceptDirective,
    /// Reject the directive.
    RejectDirective,
    /// Positively confirm the directive carried by the event, or the
    /// pending initialisation directive if the event carries none.
    ConfirmDirective,
    /// SET_V_S: validate, apply to the engine and the framer, notify.
    ApplySetVs,
    /// SET_FOP_SLIDING_WINDOW: validate, apply, notify.
    ApplySetWindow,
    /// SET_T1_INITIAL: validate, apply, notify.
    ApplySetT1,
    /// SET_TRANSMISSION_LIMIT: validate, apply, notify.
    ApplySetLimit,
    /// SET_TIMEOUT_TYPE: validate, apply, notify.
    ApplySetTimeoutType,
    /// Raise an alert: notify, purge both queues, cancel the timer.
    Alert(FopAlertCode),
    /// Record the pre-suspension state and cancel the timer.
    Suspend,
    /// Clear the suspend state and restart the timer.
    Resume,
    RestartTimer,
    CancelTimer,
    /// Clear the suspend state without touching the timer.
    ClearSuspend,
}

/// Where the machine goes after a cell's actions complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Same,
    To(FopState),
}

/// One table cell.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub actions: &'static [Action],
    pub next: Next,
}

const IGNORE: Transition = Transition {
    actions: &[],
    next: Next::Same,
};

const fn cell(actions: &'static [Action], next: Next) -> Transition {
    Transition { actions, next }
}

const fn to(actions: &'static [Action], state: FopState) -> Transition {
    cell(actions, Next::To(state))
}

const fn stay(actions: &'static [Action]) -> Transition {
    cell(actions, Next::Same)
}

const ALERT_CLCW: Transition = to(
    &[Action::Alert(FopAlertCode::Clcw)],
    FopState::Initial,
);
const ALERT_LIMIT: Transition = to(
    &[Action::Alert(FopAlertCode::Limit)],
    FopState::Initial,
);
const ALERT_T1: Transition = to(&[Action::Alert(FopAlertCode::T1)], FopState::Initial);
const SUSPEND: Transition = to(&[Action::Suspend], FopState::Initial);
const REJECT_FRAME: Transition = stay(&[Action::RejectFrame]);
const REJECT_DIRECTIVE: Transition = stay(&[Action::RejectDirective]);

/// The FOP-1 transition table.
///
/// Total over `FopState::ALL` x `EventId::ALL`. States are referred to by
/// their S-numbers in the comments; `_` arms collect the states for which
/// the standard marks the cell not applicable or "ignore".
pub fn transition(state: FopState, event: EventId) -> Transition {
    use FopState::*;

    match event {
        // ------------------------------------------------------------------
        // CLCW: all acknowledged, N(R) = V(S)
        // ------------------------------------------------------------------

        // Nothing new: the report repeats what the engine already knows. In
        // S4 and S5 this is the clean report that completes initialisation.
        EventId::E1 => match state {
            InitialisingWithoutBc => to(
                &[Action::CancelTimer, Action::ConfirmDirective],
                Active,
            ),
            InitialisingWithBc => to(
                &[
                    Action::ConfirmBc,
                    Action::CancelTimer,
                    Action::ConfirmDirective,
                ],
                Active,
            ),
            _ => IGNORE,
        },

        // New acknowledgements that empty the window: the AD service is
        // clean again whatever recovery was in progress.
        EventId::E2 => match state {
            Active => stay(&[
                Action::RemoveAcknowledged,
                Action::UpdateTimerFromQueue,
                Action::LookForFrame,
            ]),
            RetransmitWithoutWait | RetransmitWithWait => to(
                &[
                    Action::RemoveAcknowledged,
                    Action::UpdateTimerFromQueue,
                    Action::LookForFrame,
                ],
                Active,
            ),
            _ => IGNORE,
        },

        // Wait flag with nothing outstanding: inconsistent report.
        EventId::E3 => match state {
            Initial => IGNORE,
            _ => ALERT_CLCW,
        },

        // Retransmit flag with nothing outstanding.
        EventId::E4 => match state {
            Active => to(
                &[Action::InitiateRetransmission, Action::LookForFrame],
                RetransmitWithoutWait,
            ),
            RetransmitWithoutWait | RetransmitWithWait => IGNORE,
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },

        // ------------------------------------------------------------------
        // CLCW: some outstanding, NN(R) <= N(R) < V(S)
        // ------------------------------------------------------------------

        // Clean flags, no progress: frames still in flight.
        EventId::E5 => match state {
            RetransmitWithWait => to(
                &[Action::ClearRetransmitFlags, Action::LookForFrame],
                RetransmitWithoutWait,
            ),
            _ => IGNORE,
        },

        // Clean flags, partial acknowledgement.
        EventId::E6 => match state {
            Active => stay(&[
                Action::RemoveAcknowledged,
                Action::UpdateTimerFromQueue,
                Action::LookForFrame,
            ]),
            RetransmitWithoutWait | RetransmitWithWait => to(
                &[
                    Action::RemoveAcknowledged,
                    Action::ClearRetransmitFlags,
                    Action::UpdateTimerFromQueue,
                    Action::LookForFrame,
                ],
                Active,
            ),
            _ => IGNORE,
        },

        // Wait without retransmit: inconsistent report.
        EventId::E7 => match state {
            Initial => IGNORE,
            _ => ALERT_CLCW,
        },

        // Retransmission requested, new acknowledgements, receiver ready.
        EventId::E8 => match state {
            Active | RetransmitWithWait => to(
                &[
                    Action::RemoveAcknowledged,
                    Action::InitiateRetransmission,
                    Action::LookForFrame,
                ],
                RetransmitWithoutWait,
            ),
            RetransmitWithoutWait => stay(&[
                Action::RemoveAcknowledged,
                Action::InitiateRetransmission,
                Action::LookForFrame,
            ]),
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },

        // Retransmission requested, new acknowledgements, receiver waiting.
        EventId::E9 => match state {
            Active | RetransmitWithoutWait => to(
                &[Action::RemoveAcknowledged, Action::InitiateRetransmission],
                RetransmitWithWait,
            ),
            RetransmitWithWait => stay(&[
                Action::RemoveAcknowledged,
                Action::InitiateRetransmission,
            ]),
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },

        // Retransmission requested, no progress, tries remain, ready.
        EventId::E10 => match state {
            Active | RetransmitWithWait => to(
                &[Action::InitiateRetransmission, Action::LookForFrame],
                RetransmitWithoutWait,
            ),
            RetransmitWithoutWait => stay(&[
                Action::InitiateRetransmission,
                Action::LookForFrame,
            ]),
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },

        // Retransmission requested, no progress, tries remain, waiting.
        EventId::E11 => match state {
            Active | RetransmitWithoutWait => {
                to(&[Action::InitiateRetransmission], RetransmitWithWait)
            }
            RetransmitWithWait => stay(&[Action::InitiateRetransmission]),
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },

        // Retransmission requested with the limit already reached.
        EventId::E12 | EventId::E103 => match state {
            Active | RetransmitWithoutWait | RetransmitWithWait => ALERT_LIMIT,
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },

        // Transmission limit of one: any retransmission request is final.
        // New acknowledgements are still taken before the alert purges.
        EventId::E101 => match state {
            Active | RetransmitWithoutWait | RetransmitWithWait => to(
                &[
                    Action::RemoveAcknowledged,
                    Action::Alert(FopAlertCode::Limit),
                ],
                Initial,
            ),
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },
        EventId::E102 => match state {
            Active | RetransmitWithoutWait | RetransmitWithWait => ALERT_LIMIT,
            InitialisingWithoutBc | InitialisingWithBc => ALERT_CLCW,
            Initial => IGNORE,
        },

        // ------------------------------------------------------------------
        // CLCW: invalid N(R), lockout
        // ------------------------------------------------------------------
        EventId::E13 => match state {
            Active | RetransmitWithoutWait | RetransmitWithWait => {
                to(&[Action::Alert(FopAlertCode::Synch)], Initial)
            }
            InitialisingWithoutBc | InitialisingWithBc => {
                to(&[Action::Alert(FopAlertCode::NnR)], Initial)
            }
            Initial => IGNORE,
        },

        EventId::E14 => match state {
            Initial => IGNORE,
            _ => to(&[Action::Alert(FopAlertCode::Lockout)], Initial),
        },

        // ------------------------------------------------------------------
        // Timer expiry
        // ------------------------------------------------------------------

        // Tries remain, timeout type 0: retransmit. In S4 there is nothing
        // to retransmit and no way for the count to grow, so the expiry is
        // itself the initialisation timeout. In S5 the BC frame is resent.
        EventId::E16 => match state {
            Active | RetransmitWithWait => to(
                &[Action::InitiateRetransmission, Action::LookForFrame],
                RetransmitWithoutWait,
            ),
            RetransmitWithoutWait => stay(&[
                Action::InitiateRetransmission,
                Action::LookForFrame,
            ]),
            InitialisingWithoutBc => ALERT_T1,
            InitialisingWithBc => stay(&[
                Action::InitiateRetransmission,
                Action::LookForDirective,
            ]),
            Initial => IGNORE,
        },

        // Limit reached, timeout type 0: give up loudly.
        EventId::E17 => match state {
            Initial => IGNORE,
            _ => ALERT_T1,
        },

        // Timeout type 1: suspend instead of alerting. The BC-initialising
        // state has no suspend code and alerts instead.
        EventId::E18 | EventId::E104 => match state {
            Active | RetransmitWithoutWait | RetransmitWithWait | InitialisingWithoutBc => SUSPEND,
            InitialisingWithBc => ALERT_T1,
            Initial => IGNORE,
        },

        // ------------------------------------------------------------------
        // Requests to transfer a frame
        // ------------------------------------------------------------------

        // AD request, wait queue free. Accepted onto the wait queue in the
        // operational states; the look-for-frame pass moves it into the
        // sliding window (and emits the accept) as soon as there is room.
        // While the wait flag is set nothing may be sent, so S3 only queues.
        EventId::E19 => match state {
            Active | RetransmitWithoutWait => {
                stay(&[Action::AddToWaitQueue, Action::LookForFrame])
            }
            RetransmitWithWait => stay(&[Action::AddToWaitQueue]),
            InitialisingWithoutBc | InitialisingWithBc | Initial => REJECT_FRAME,
        },

        // AD request with the wait queue already occupied.
        EventId::E20 => REJECT_FRAME,

        // BD requests bypass the AD service entirely and are honoured in
        // every state, one at a time.
        EventId::E21 => stay(&[Action::TransmitBd]),
        EventId::E22 => REJECT_FRAME,

        // ------------------------------------------------------------------
        // Directives
        // ------------------------------------------------------------------
        EventId::E23 => match state {
            Initial => to(
                &[
                    Action::AcceptDirective,
                    Action::Initialise,
                    Action::ConfirmDirective,
                ],
                Active,
            ),
            _ => REJECT_DIRECTIVE,
        },

        EventId::E24 => match state {
            Initial => to(
                &[
                    Action::AcceptDirective,
                    Action::Initialise,
                    Action::RestartTimer,
                ],
                InitialisingWithoutBc,
            ),
            _ => REJECT_DIRECTIVE,
        },

        EventId::E25 => match state {
            Initial => to(
                &[
                    Action::AcceptDirective,
                    Action::Initialise,
                    Action::TransmitBcUnlock,
                ],
                InitialisingWithBc,
            ),
            _ => REJECT_DIRECTIVE,
        },

        EventId::E27 => match state {
            Initial => to(
                &[
                    Action::AcceptDirective,
                    Action::Initialise,
                    Action::SetVsFromQualifier,
                    Action::TransmitBcSetVr,
                ],
                InitialisingWithBc,
            ),
            _ => REJECT_DIRECTIVE,
        },

        // Unlock / Set V(R) while a BC transmit request is outstanding.
        EventId::E26 | EventId::E28 => REJECT_DIRECTIVE,

        EventId::E29 => match state {
            Initial => stay(&[
                Action::AcceptDirective,
                Action::ClearSuspend,
                Action::ConfirmDirective,
            ]),
            _ => to(
                &[
                    Action::AcceptDirective,
                    Action::Alert(FopAlertCode::Term),
                    Action::ConfirmDirective,
                ],
                Initial,
            ),
        },

        // Resume while not suspended.
        EventId::E30 => REJECT_DIRECTIVE,

        // Resume into the recorded pre-suspension state. Suspension always
        // parks the machine in S6, so these only fire there.
        EventId::E31 => resume_cell(state, Active),
        EventId::E32 => resume_cell(state, RetransmitWithoutWait),
        EventId::E33 => resume_cell(state, RetransmitWithWait),
        EventId::E34 => resume_cell(state, InitialisingWithoutBc),

        EventId::E35 => match state {
            Initial => stay(&[Action::ApplySetVs]),
            _ => REJECT_DIRECTIVE,
        },

        // The remaining SET_* directives are honoured in every state.
        EventId::E36 => stay(&[Action::ApplySetWindow]),
        EventId::E37 => stay(&[Action::ApplySetT1]),
        EventId::E38 => stay(&[Action::ApplySetLimit]),
        EventId::E39 => stay(&[Action::ApplySetTimeoutType]),

        // ------------------------------------------------------------------
        // Lower-layer responses
        // ------------------------------------------------------------------

        // An accepted AD frees the out flag; in the sending states that
        // immediately triggers another look-for-frame pass. S3 must not
        // send, and the initialising states have nothing to send.
        EventId::E41 => match state {
            Active | RetransmitWithoutWait => {
                stay(&[Action::SetAdOutReady, Action::LookForFrame])
            }
            _ => stay(&[Action::SetAdOutReady]),
        },

        EventId::E42 => match state {
            Initial => stay(&[Action::SetAdOutReady]),
            _ => to(
                &[Action::SetAdOutReady, Action::Alert(FopAlertCode::Llif)],
                Initial,
            ),
        },

        EventId::E43 => match state {
            InitialisingWithBc => stay(&[Action::SetBcOutReady, Action::LookForDirective]),
            _ => stay(&[Action::SetBcOutReady]),
        },

        EventId::E44 => match state {
            Initial => stay(&[Action::SetBcOutReady]),
            _ => to(
                &[Action::SetBcOutReady, Action::Alert(FopAlertCode::Llif)],
                Initial,
            ),
        },

        EventId::E45 => stay(&[Action::SetBdOutReady]),

        EventId::E46 => match state {
            Initial => stay(&[Action::SetBdOutReady]),
            _ => to(
                &[Action::SetBdOutReady, Action::Alert(FopAlertCode::Llif)],
                Initial,
            ),
        },
    }
}

/// A RESUME cell: only meaningful in S6, rejected anywhere else.
fn resume_cell(state: FopState, target: FopState) -> Transition {
    match state {
        FopState::Initial => match target {
            FopState::Active => to(RESUME_ACTIONS, FopState::Active),
            FopState::RetransmitWithoutWait => {
                to(RESUME_ACTIONS, FopState::RetransmitWithoutWait)
            }
            FopState::RetransmitWithWait => to(RESUME_ACTIONS, FopState::RetransmitWithWait),
            _ => to(RESUME_ACTIONS, FopState::InitialisingWithoutBc),
        },
        _ => REJECT_DIRECTIVE,
    }
}

const RESUME_ACTIONS: &[Action] = &[
    Action::AcceptDirective,
    Action::Resume,
    Action::ConfirmDirective,
];
