//! Directives issued to the engine by the higher procedures.

/// Caller-chosen correlation tag echoed back in directive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectiveTag(pub u64);

impl std::fmt::Display for DirectiveTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The FOP-1 directive set.
///
/// The qualifier accompanying a directive is interpreted per kind: V(R) for
/// `InitAdWithSetVr`, V(S) for `SetVs`, the window size for
/// `SetFopSlidingWindow`, seconds for `SetT1Initial`, the limit for
/// `SetTransmissionLimit`, and 0/1 for `SetTimeoutType`. The remaining
/// directives ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FopDirective {
    /// Start the AD service without waiting for receiver feedback.
    InitAdWithoutClcw,
    /// Start the AD service once a clean CLCW confirms synchronisation.
    InitAdWithClcw,
    /// Start the AD service by sending a BC Unlock frame first.
    InitAdWithUnlock,
    /// Start the AD service by sending a BC Set V(R) frame first.
    InitAdWithSetVr,
    /// Stop the AD service and return to the initial state.
    Terminate,
    /// Resume a suspended AD service in its pre-suspension state.
    Resume,
    /// Set V(S) (and NN(R)) while in the initial state.
    SetVs,
    /// Set the FOP sliding window K.
    SetFopSlidingWindow,
    /// Set the retransmission timer initial value T1.
    SetT1Initial,
    /// Set the transmission limit.
    SetTransmissionLimit,
    /// Set the timeout type (0 = alert, 1 = suspend).
    SetTimeoutType,
}
