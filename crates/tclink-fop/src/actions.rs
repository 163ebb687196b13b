//! The elementary-action executor.
//!
//! [`FopCore`] owns every engine variable: the scalars, both queues, the
//! timer, the pending-initialisation record and the current state. It is
//! confined to the engine worker; actions mutate it, emit observer
//! notifications, and hand frames to the lower-layer worker. No action can
//! fail: protocol trouble is expressed as alerts and rejects, never as
//! errors that could escape a transition.

use std::sync::Arc;

use tclink_core::{seqnum, Clcw, TcSenderVirtualChannel, TcTransferFrame};
use tokio::sync::mpsc;

use crate::classifier::{self, ClassifierSnapshot};
use crate::config::FopConfig;
use crate::directive::{DirectiveTag, FopDirective};
use crate::engine::{ForwardItem, FopStatus, Stimulus};
use crate::event::FopEvent;
use crate::machine::{transition, Action, FopState, Next};
use crate::observer::{FopAlertCode, FopObserver, FopOperationStatus, ObserverRegistry};
use crate::queues::{SentQueue, WaitQueue};
use crate::timer::FopTimer;

pub(crate) struct FopCore {
    state: FopState,
    /// V(S): next N(S) to place in an outgoing AD frame.
    vs: u8,
    /// NN(R): N(S) of the oldest unacknowledged AD frame.
    nnr: u8,
    transmission_count: u32,
    transmission_limit: u32,
    timeout_type: u8,
    fop_sliding_window: u8,
    suspend_state: u8,
    ad_out_ready: bool,
    bc_out_ready: bool,
    bd_out_ready: bool,
    wait_queue: WaitQueue,
    sent_queue: SentQueue,
    timer: FopTimer,
    /// The accepted initialisation directive awaiting its confirm.
    pending_init: Option<(DirectiveTag, FopDirective, u32)>,
    /// CLCWs observed while in the initial state (counted, never acted on).
    clcws_in_initial: u64,
    observers: Arc<ObserverRegistry>,
    forward_tx: mpsc::UnboundedSender<ForwardItem>,
    framer: Arc<TcSenderVirtualChannel>,
}

impl FopCore {
    pub fn new(
        config: &FopConfig,
        observers: Arc<ObserverRegistry>,
        forward_tx: mpsc::UnboundedSender<ForwardItem>,
        stimulus_tx: mpsc::UnboundedSender<Stimulus>,
        framer: Arc<TcSenderVirtualChannel>,
    ) -> Self {
        Self {
            state: FopState::Initial,
            vs: 0,
            nnr: 0,
            transmission_count: 0,
            transmission_limit: config.transmission_limit,
            timeout_type: config.timeout_type,
            fop_sliding_window: config.fop_sliding_window,
            suspend_state: 0,
            // No transmit request is outstanding at construction.
            ad_out_ready: true,
            bc_out_ready: true,
            bd_out_ready: true,
            wait_queue: WaitQueue::new(),
            sent_queue: SentQueue::new(),
            timer: FopTimer::new(config.t1_initial(), stimulus_tx),
            pending_init: None,
            clcws_in_initial: 0,
            observers,
            forward_tx,
            framer,
        }
    }

    // ------------------------------------------------------------------
    // Stimulus handling
    // ------------------------------------------------------------------

    pub fn handle(&mut self, stimulus: Stimulus) {
        let event = match stimulus {
            Stimulus::Clcw(clcw) => {
                if self.state == FopState::Initial {
                    self.clcws_in_initial += 1;
                }
                let id = classifier::classify_clcw(&clcw, &self.snapshot());
                FopEvent::from_clcw(id, clcw)
            }
            Stimulus::TimerExpired { epoch } => {
                if !self.timer.accepts(epoch) {
                    tracing::trace!(?epoch, "discarding stale timer expiry");
                    return;
                }
                self.timer.disarm();
                FopEvent::from_timer(classifier::classify_timer_expiry(&self.snapshot()))
            }
            Stimulus::AdFrameRequest(frame) => FopEvent::from_frame(
                classifier::classify_ad_request(self.wait_queue.is_occupied()),
                frame,
            ),
            Stimulus::BdFrameRequest(frame) => {
                FopEvent::from_frame(classifier::classify_bd_request(self.bd_out_ready), frame)
            }
            Stimulus::LowerLayer { frame, accepted } => FopEvent::from_frame(
                classifier::classify_lower_layer(frame.frame_type, accepted),
                frame,
            ),
            Stimulus::Directive {
                tag,
                directive,
                qualifier,
            } => FopEvent::from_directive(
                classifier::classify_directive(directive, self.bc_out_ready, self.suspend_state),
                tag,
                directive,
                qualifier,
            ),
            Stimulus::Query(reply) => {
                let _ = reply.send(self.status());
                return;
            }
            Stimulus::Abort { .. } => unreachable!("abort is handled by the worker loop"),
        };
        self.dispatch(event);
    }

    fn dispatch(&mut self, event: FopEvent) {
        let cell = transition(self.state, event.id);
        tracing::trace!(state = self.state.name(), event = ?event.id, "dispatching");
        for action in cell.actions {
            self.apply(*action, &event);
        }
        if let Next::To(next) = cell.next {
            if next != self.state {
                let previous = self.state;
                self.state = next;
                tracing::debug!(
                    from = previous.name(),
                    to = next.name(),
                    event = ?event.id,
                    "state change"
                );
                for observer in self.observers.snapshot().iter() {
                    observer.state_changed(previous, next);
                }
            }
        }
    }

    /// Orderly shutdown: cancel the timer, purge both queues.
    pub fn shutdown(&mut self) {
        self.timer.cancel();
        self.purge_sent_queue();
        self.purge_wait_queue();
    }

    pub fn status(&self) -> FopStatus {
        FopStatus {
            state: self.state,
            vs: self.vs,
            nnr: self.nnr,
            transmission_count: self.transmission_count,
            transmission_limit: self.transmission_limit,
            timeout_type: self.timeout_type,
            fop_sliding_window: self.fop_sliding_window,
            suspend_state: self.suspend_state,
            sent_queue_len: self.sent_queue.len(),
            wait_queue_occupied: self.wait_queue.is_occupied(),
            timer_armed: self.timer.is_armed(),
            clcws_in_initial: self.clcws_in_initial,
        }
    }

    fn snapshot(&self) -> ClassifierSnapshot {
        ClassifierSnapshot {
            vs: self.vs,
            nnr: self.nnr,
            transmission_count: self.transmission_count,
            transmission_limit: self.transmission_limit,
            timeout_type: self.timeout_type,
        }
    }

    // ------------------------------------------------------------------
    // Action dispatch
    // ------------------------------------------------------------------

    fn apply(&mut self, action: Action, event: &FopEvent) {
        match action {
            Action::RemoveAcknowledged => self.remove_acknowledged(event.clcw.as_ref()),
            Action::UpdateTimerFromQueue => {
                if self.sent_queue.is_empty() {
                    self.timer.cancel();
                } else {
                    self.timer.restart();
                }
            }
            Action::ClearRetransmitFlags => self.sent_queue.clear_retransmission_flags(),
            Action::LookForFrame => self.look_for_frame(),
            Action::LookForDirective => self.look_for_directive(),
            Action::InitiateRetransmission => self.initiate_retransmission(),
            Action::TransmitBd => self.transmit_bd(event),
            Action::AddToWaitQueue => {
                if let Some(frame) = &event.frame {
                    self.wait_queue.put(frame.clone());
                }
            }
            Action::RejectFrame => {
                if let Some(frame) = &event.frame {
                    self.notify_transfer(FopOperationStatus::Reject, frame);
                }
            }
            Action::SetAdOutReady => self.ad_out_ready = true,
            Action::SetBcOutReady => self.bc_out_ready = true,
            Action::SetBdOutReady => self.bd_out_ready = true,
            Action::Initialise => self.initialise(),
            Action::SetVsFromQualifier => {
                if let Some((_, _, qualifier)) = event.directive {
                    self.vs = qualifier as u8;
                    self.nnr = qualifier as u8;
                }
            }
            Action::TransmitBcUnlock => {
                let frame = self.framer.dispatch_unlock();
                self.transmit_bc(frame);
            }
            Action::TransmitBcSetVr => {
                if let Some((_, _, qualifier)) = event.directive {
                    let frame = self.framer.dispatch_set_vr(qualifier as u8);
                    self.transmit_bc(frame);
                }
            }
            Action::ConfirmBc => {
                self.sent_queue.take_bc();
            }
            Action::AcceptDirective => self.accept_directive(event),
            Action::RejectDirective => {
                if let Some((tag, directive, qualifier)) = event.directive {
                    self.notify_directive(FopOperationStatus::Reject, tag, directive, qualifier);
                }
            }
            Action::ConfirmDirective => self.confirm_directive(event),
            Action::ApplySetVs => self.apply_set_vs(event),
            Action::ApplySetWindow => self.apply_set_window(event),
            Action::ApplySetT1 => self.apply_set_t1(event),
            Action::ApplySetLimit => self.apply_set_limit(event),
            Action::ApplySetTimeoutType => self.apply_set_timeout_type(event),
            Action::Alert(code) => self.alert(code),
            Action::Suspend => self.suspend(),
            Action::Resume => {
                self.suspend_state = 0;
                self.timer.restart();
            }
            Action::RestartTimer => self.timer.restart(),
            Action::CancelTimer => self.timer.cancel(),
            Action::ClearSuspend => self.suspend_state = 0,
        }
    }

    // ------------------------------------------------------------------
    // Elementary actions
    // ------------------------------------------------------------------

    fn remove_acknowledged(&mut self, clcw: Option<&Clcw>) {
        let Some(clcw) = clcw else { return };
        let nr = clcw.report_value;
        let removed = self.sent_queue.remove_acknowledged(self.nnr, nr);
        tracing::trace!(nr, acknowledged = removed.len(), "removing acknowledged frames");
        for frame in &removed {
            self.notify_transfer(FopOperationStatus::PositiveConfirm, frame);
        }
        self.nnr = nr;
    }

    /// Prepare and send a Type-AD frame: stamp V(S) forward, append the
    /// master copy to the sent queue, arm the timer, mark the AD out busy,
    /// hand a copy to the lower procedures.
    fn transmit_ad(&mut self, frame: TcTransferFrame) {
        self.vs = seqnum::next(frame.sequence_number);
        let was_empty = self.sent_queue.is_empty();
        self.sent_queue.push(frame.clone());
        if was_empty {
            self.transmission_count = 1;
        }
        self.timer.restart();
        self.ad_out_ready = false;
        self.forward(frame);
    }

    fn transmit_bc(&mut self, frame: TcTransferFrame) {
        self.sent_queue.push(frame.clone());
        self.transmission_count = 1;
        self.timer.restart();
        self.bc_out_ready = false;
        self.forward(frame);
    }

    fn transmit_bd(&mut self, event: &FopEvent) {
        let Some(frame) = &event.frame else { return };
        self.bd_out_ready = false;
        self.notify_transfer(FopOperationStatus::Accept, frame);
        self.forward(frame.clone());
    }

    fn initiate_retransmission(&mut self) {
        self.transmission_count += 1;
        self.timer.restart();
        self.sent_queue.mark_all_for_retransmission();
        tracing::debug!(
            transmission_count = self.transmission_count,
            "initiating retransmission"
        );
    }

    /// The look-for-FDU pass: retransmission first, then admission of the
    /// waiting frame into the sliding window.
    fn look_for_frame(&mut self) {
        if !self.ad_out_ready {
            return;
        }
        if let Some(frame) = self.sent_queue.next_ad_for_retransmission() {
            self.ad_out_ready = false;
            self.forward(frame);
            return;
        }
        if self.sent_queue.ad_count() < usize::from(self.fop_sliding_window)
            && self.wait_queue.is_occupied()
        {
            if let Some(frame) = self.wait_queue.take() {
                let accepted = frame.clone();
                self.transmit_ad(frame);
                self.notify_transfer(FopOperationStatus::Accept, &accepted);
            }
        }
    }

    fn look_for_directive(&mut self) {
        if !self.bc_out_ready {
            return;
        }
        if let Some(frame) = self.sent_queue.next_bc_for_retransmission() {
            self.bc_out_ready = false;
            self.forward(frame);
        }
    }

    fn initialise(&mut self) {
        self.purge_sent_queue();
        self.purge_wait_queue();
        self.vs = 0;
        self.nnr = 0;
        self.transmission_count = 0;
        self.suspend_state = 0;
        self.timer.cancel();
        self.ad_out_ready = true;
        self.bc_out_ready = true;
        self.bd_out_ready = true;
    }

    fn alert(&mut self, code: FopAlertCode) {
        tracing::warn!(?code, "alert");
        for observer in self.observers.snapshot().iter() {
            observer.alert(code);
        }
        self.purge_sent_queue();
        self.purge_wait_queue();
        self.timer.cancel();
        if let Some((tag, directive, qualifier)) = self.pending_init.take() {
            self.notify_directive(FopOperationStatus::NegativeConfirm, tag, directive, qualifier);
        }
    }

    fn suspend(&mut self) {
        match self.state.suspend_code() {
            Some(code) => {
                self.suspend_state = code;
                self.timer.cancel();
                tracing::debug!(suspend_state = code, "AD service suspended");
            }
            None => tracing::warn!(state = self.state.name(), "suspend in unsuspendable state"),
        }
    }

    fn purge_sent_queue(&mut self) {
        for frame in self.sent_queue.drain() {
            self.notify_transfer(FopOperationStatus::NegativeConfirm, &frame);
        }
    }

    fn purge_wait_queue(&mut self) {
        if let Some(frame) = self.wait_queue.take() {
            self.notify_transfer(FopOperationStatus::Reject, &frame);
        }
    }

    // ------------------------------------------------------------------
    // Directive actions
    // ------------------------------------------------------------------

    fn accept_directive(&mut self, event: &FopEvent) {
        let Some((tag, directive, qualifier)) = event.directive else {
            return;
        };
        if matches!(
            directive,
            FopDirective::InitAdWithClcw
                | FopDirective::InitAdWithUnlock
                | FopDirective::InitAdWithSetVr
        ) {
            self.pending_init = Some((tag, directive, qualifier));
        }
        self.notify_directive(FopOperationStatus::Accept, tag, directive, qualifier);
    }

    /// Confirm the directive carried by the event, or the pending
    /// initialisation directive for CLCW-completed initialisations.
    fn confirm_directive(&mut self, event: &FopEvent) {
        if let Some((tag, directive, qualifier)) = event.directive {
            self.pending_init = None;
            self.notify_directive(FopOperationStatus::PositiveConfirm, tag, directive, qualifier);
        } else if let Some((tag, directive, qualifier)) = self.pending_init.take() {
            self.notify_directive(FopOperationStatus::PositiveConfirm, tag, directive, qualifier);
        }
    }

    fn apply_set_vs(&mut self, event: &FopEvent) {
        let Some((tag, directive, qualifier)) = event.directive else {
            return;
        };
        if self.suspend_state != 0 || qualifier > 255 {
            self.notify_directive(FopOperationStatus::Reject, tag, directive, qualifier);
            return;
        }
        self.notify_directive(FopOperationStatus::Accept, tag, directive, qualifier);
        self.vs = qualifier as u8;
        self.nnr = qualifier as u8;
        // Align the framer's counter so the next AD frame carries the new V(S).
        let _ = self.framer.dispatch_set_vr(qualifier as u8);
        self.notify_directive(FopOperationStatus::PositiveConfirm, tag, directive, qualifier);
    }

    fn apply_set_window(&mut self, event: &FopEvent) {
        let Some((tag, directive, qualifier)) = event.directive else {
            return;
        };
        if !(1..=255).contains(&qualifier) {
            self.notify_directive(FopOperationStatus::Reject, tag, directive, qualifier);
            return;
        }
        self.notify_directive(FopOperationStatus::Accept, tag, directive, qualifier);
        self.fop_sliding_window = qualifier as u8;
        self.notify_directive(FopOperationStatus::PositiveConfirm, tag, directive, qualifier);
    }

    fn apply_set_t1(&mut self, event: &FopEvent) {
        let Some((tag, directive, qualifier)) = event.directive else {
            return;
        };
        self.notify_directive(FopOperationStatus::Accept, tag, directive, qualifier);
        self.timer
            .set_initial(std::time::Duration::from_secs(u64::from(qualifier)));
        self.notify_directive(FopOperationStatus::PositiveConfirm, tag, directive, qualifier);
    }

    fn apply_set_limit(&mut self, event: &FopEvent) {
        let Some((tag, directive, qualifier)) = event.directive else {
            return;
        };
        if qualifier < 1 {
            self.notify_directive(FopOperationStatus::Reject, tag, directive, qualifier);
            return;
        }
        self.notify_directive(FopOperationStatus::Accept, tag, directive, qualifier);
        self.transmission_limit = qualifier;
        self.notify_directive(FopOperationStatus::PositiveConfirm, tag, directive, qualifier);
    }

    fn apply_set_timeout_type(&mut self, event: &FopEvent) {
        let Some((tag, directive, qualifier)) = event.directive else {
            return;
        };
        if qualifier > 1 {
            self.notify_directive(FopOperationStatus::Reject, tag, directive, qualifier);
            return;
        }
        self.notify_directive(FopOperationStatus::Accept, tag, directive, qualifier);
        self.timeout_type = qualifier as u8;
        self.notify_directive(FopOperationStatus::PositiveConfirm, tag, directive, qualifier);
    }

    // ------------------------------------------------------------------
    // Notification and forwarding
    // ------------------------------------------------------------------

    fn notify_transfer(&self, status: FopOperationStatus, frame: &TcTransferFrame) {
        for observer in self.observers.snapshot().iter() {
            observer.transfer_notification(status, frame);
        }
    }

    fn notify_directive(
        &self,
        status: FopOperationStatus,
        tag: DirectiveTag,
        directive: FopDirective,
        qualifier: u32,
    ) {
        for observer in self.observers.snapshot().iter() {
            observer.directive_notification(status, tag, directive, qualifier);
        }
    }

    fn forward(&self, frame: TcTransferFrame) {
        if self.forward_tx.send(ForwardItem::Frame(frame)).is_err() {
            tracing::warn!("lower-layer worker gone; frame dropped");
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> FopState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Everything the observers saw, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Note {
        Transfer(FopOperationStatus, FrameType, u8),
        Directive(FopOperationStatus, FopDirective),
        Alert(FopAlertCode),
        State(FopState, FopState),
    }

    use tclink_core::FrameType;

    struct Recorder(Mutex<Vec<Note>>);

    impl FopObserver for Recorder {
        fn transfer_notification(&self, status: FopOperationStatus, frame: &TcTransferFrame) {
            self.0.lock().unwrap().push(Note::Transfer(
                status,
                frame.frame_type,
                frame.sequence_number,
            ));
        }
        fn directive_notification(
            &self,
            status: FopOperationStatus,
            _tag: DirectiveTag,
            directive: FopDirective,
            _qualifier: u32,
        ) {
            self.0.lock().unwrap().push(Note::Directive(status, directive));
        }
        fn alert(&self, code: FopAlertCode) {
            self.0.lock().unwrap().push(Note::Alert(code));
        }
        fn state_changed(&self, previous: FopState, current: FopState) {
            self.0.lock().unwrap().push(Note::State(previous, current));
        }
    }

    struct Harness {
        core: FopCore,
        forward_rx: mpsc::UnboundedReceiver<ForwardItem>,
        notes: Arc<Recorder>,
        framer: Arc<TcSenderVirtualChannel>,
    }

    impl Harness {
        fn new(config: FopConfig) -> Self {
            let (forward_tx, forward_rx) = mpsc::unbounded_channel();
            let (stimulus_tx, _stimulus_rx) = mpsc::unbounded_channel();
            let observers = Arc::new(ObserverRegistry::new());
            let notes = Arc::new(Recorder(Mutex::new(Vec::new())));
            observers.register(notes.clone());
            let framer = Arc::new(TcSenderVirtualChannel::new(0x2A, 1));
            let core = FopCore::new(
                &config,
                observers,
                forward_tx,
                stimulus_tx,
                Arc::clone(&framer),
            );
            Self {
                core,
                forward_rx,
                notes,
                framer,
            }
        }

        fn taken_notes(&self) -> Vec<Note> {
            std::mem::take(&mut *self.notes.0.lock().unwrap())
        }

        fn forwarded(&mut self) -> Vec<TcTransferFrame> {
            let mut frames = Vec::new();
            while let Ok(item) = self.forward_rx.try_recv() {
                if let ForwardItem::Frame(frame) = item {
                    frames.push(frame);
                }
            }
            frames
        }

        fn directive(&mut self, directive: FopDirective, qualifier: u32) {
            self.core.handle(Stimulus::Directive {
                tag: DirectiveTag(0),
                directive,
                qualifier,
            });
        }

        fn init_active(&mut self) {
            self.directive(FopDirective::InitAdWithoutClcw, 0);
            assert_eq!(self.core.state(), FopState::Active);
            self.taken_notes();
        }

        fn ad(&self, ns: u8) -> TcTransferFrame {
            TcTransferFrame::new_ad(0x2A, 1, ns, vec![ns])
        }

        fn transmit_ad(&mut self, ns: u8) {
            let frame = self.ad(ns);
            self.core.handle(Stimulus::AdFrameRequest(frame));
        }

        fn accept_ad(&mut self, ns: u8) {
            self.core.handle(Stimulus::LowerLayer {
                frame: self.ad(ns),
                accepted: true,
            });
        }

        fn clcw(&mut self, nr: u8, lockout: bool, wait: bool, retransmit: bool) {
            let mut clcw = Clcw::report(1, nr);
            clcw.lockout = lockout;
            clcw.wait = wait;
            clcw.retransmit = retransmit;
            self.core.handle(Stimulus::Clcw(clcw));
        }
    }

    // ------------------------------------------------------------------
    // Initialisation
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn init_without_clcw_goes_active_and_confirms() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::InitAdWithoutClcw, 0);
        assert_eq!(h.core.state(), FopState::Active);
        let notes = h.taken_notes();
        assert_eq!(
            notes,
            vec![
                Note::Directive(FopOperationStatus::Accept, FopDirective::InitAdWithoutClcw),
                Note::Directive(
                    FopOperationStatus::PositiveConfirm,
                    FopDirective::InitAdWithoutClcw
                ),
                Note::State(FopState::Initial, FopState::Active),
            ]
        );
        let status = h.core.status();
        assert_eq!(status.vs, 0);
        assert_eq!(status.nnr, 0);
        assert!(!status.timer_armed);
    }

    #[tokio::test]
    async fn init_with_clcw_waits_for_clean_report() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::InitAdWithClcw, 0);
        assert_eq!(h.core.state(), FopState::InitialisingWithoutBc);
        assert!(h.core.status().timer_armed);
        h.taken_notes();

        h.clcw(0, false, false, false);
        assert_eq!(h.core.state(), FopState::Active);
        let notes = h.taken_notes();
        assert!(notes.contains(&Note::Directive(
            FopOperationStatus::PositiveConfirm,
            FopDirective::InitAdWithClcw
        )));
        assert!(!h.core.status().timer_armed);
    }

    #[tokio::test]
    async fn init_with_clcw_lockout_aborts_initialisation() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::InitAdWithClcw, 0);
        h.taken_notes();
        h.clcw(0, true, false, false);
        assert_eq!(h.core.state(), FopState::Initial);
        let notes = h.taken_notes();
        assert!(notes.contains(&Note::Alert(FopAlertCode::Lockout)));
        assert!(notes.contains(&Note::Directive(
            FopOperationStatus::NegativeConfirm,
            FopDirective::InitAdWithClcw
        )));
    }

    #[tokio::test]
    async fn init_directives_rejected_while_active() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.directive(FopDirective::InitAdWithoutClcw, 0);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Directive(
                FopOperationStatus::Reject,
                FopDirective::InitAdWithoutClcw
            )]
        );
        assert_eq!(h.core.state(), FopState::Active);
    }

    // ------------------------------------------------------------------
    // Happy path
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn single_ad_frame_accept_transmit_confirm() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();

        h.transmit_ad(0);
        let sent = h.forwarded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sequence_number, 0);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Transfer(FopOperationStatus::Accept, FrameType::Ad, 0)]
        );
        let status = h.core.status();
        assert_eq!(status.vs, 1);
        assert_eq!(status.sent_queue_len, 1);
        assert!(status.timer_armed);

        h.accept_ad(0);
        h.clcw(1, false, false, false);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Transfer(
                FopOperationStatus::PositiveConfirm,
                FrameType::Ad,
                0
            )]
        );
        let status = h.core.status();
        assert_eq!(status.nnr, 1);
        assert_eq!(status.sent_queue_len, 0);
        assert!(!status.timer_armed);
        assert_eq!(status.state, FopState::Active);
    }

    // ------------------------------------------------------------------
    // Retransmission
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn retransmit_request_resends_until_limit_then_alerts() {
        let config = FopConfig {
            transmission_limit: 2,
            ..FopConfig::default()
        };
        let mut h = Harness::new(config);
        h.init_active();

        h.transmit_ad(0);
        h.accept_ad(0);
        h.forwarded();
        h.taken_notes();

        // First retransmission request: tries remain, frame goes out again.
        h.clcw(0, false, false, true);
        assert_eq!(h.core.state(), FopState::RetransmitWithoutWait);
        assert_eq!(h.core.status().transmission_count, 2);
        let resent = h.forwarded();
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].sequence_number, 0);

        // Second request: the limit of two is exhausted.
        h.accept_ad(0);
        h.taken_notes();
        h.clcw(0, false, false, true);
        assert_eq!(h.core.state(), FopState::Initial);
        let notes = h.taken_notes();
        assert_eq!(
            notes,
            vec![
                Note::Alert(FopAlertCode::Limit),
                Note::Transfer(FopOperationStatus::NegativeConfirm, FrameType::Ad, 0),
                Note::State(FopState::RetransmitWithoutWait, FopState::Initial),
            ]
        );
        assert_eq!(h.core.status().sent_queue_len, 0);
    }

    #[tokio::test]
    async fn wait_flag_holds_retransmission_until_cleared() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.accept_ad(0);
        h.forwarded();
        h.taken_notes();

        // Retransmit with wait: flag the queue but send nothing.
        h.clcw(0, false, true, true);
        assert_eq!(h.core.state(), FopState::RetransmitWithWait);
        assert!(h.forwarded().is_empty());

        // Wait clears with no other news: sending resumes.
        h.clcw(0, false, true, true);
        h.clcw(0, false, false, false);
        assert_eq!(h.core.state(), FopState::RetransmitWithoutWait);
    }

    #[tokio::test]
    async fn partial_ack_during_retransmission_recovers() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.accept_ad(0);
        h.transmit_ad(1);
        h.accept_ad(1);
        h.forwarded();
        h.taken_notes();

        // Clean partial acknowledgement of frame 0 while retransmitting.
        h.clcw(0, false, false, true);
        assert_eq!(h.core.state(), FopState::RetransmitWithoutWait);
        h.accept_ad(0);
        h.taken_notes();
        h.forwarded();

        h.clcw(2, false, false, false);
        assert_eq!(h.core.state(), FopState::Active);
        let notes = h.taken_notes();
        assert!(notes.contains(&Note::Transfer(
            FopOperationStatus::PositiveConfirm,
            FrameType::Ad,
            0
        )));
        assert!(notes.contains(&Note::Transfer(
            FopOperationStatus::PositiveConfirm,
            FrameType::Ad,
            1
        )));
        assert_eq!(h.core.status().sent_queue_len, 0);
    }

    // ------------------------------------------------------------------
    // Lockout and invalid N(R)
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn lockout_purges_and_returns_to_initial() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.forwarded();
        h.taken_notes();

        h.clcw(0, true, false, false);
        assert_eq!(h.core.state(), FopState::Initial);
        let notes = h.taken_notes();
        assert_eq!(
            notes,
            vec![
                Note::Alert(FopAlertCode::Lockout),
                Note::Transfer(FopOperationStatus::NegativeConfirm, FrameType::Ad, 0),
                Note::State(FopState::Active, FopState::Initial),
            ]
        );
        let status = h.core.status();
        assert_eq!(status.sent_queue_len, 0);
        assert!(!status.timer_armed);
    }

    #[tokio::test]
    async fn second_alert_still_leaves_queues_empty() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.clcw(0, true, false, false);
        h.taken_notes();
        // A second lockout lands in S6 and is ignored outright.
        h.clcw(0, true, false, false);
        assert!(h.taken_notes().is_empty());
        let status = h.core.status();
        assert_eq!(status.sent_queue_len, 0);
        assert!(!status.wait_queue_occupied);
        assert_eq!(status.clcws_in_initial, 1);
    }

    #[tokio::test]
    async fn invalid_nr_alerts_synch() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.taken_notes();
        // V(S)=1, NN(R)=0: N(R)=5 is outside the window.
        h.clcw(5, false, false, false);
        assert_eq!(h.core.state(), FopState::Initial);
        assert!(h.taken_notes().contains(&Note::Alert(FopAlertCode::Synch)));
    }

    // ------------------------------------------------------------------
    // Sliding window and wait queue
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn window_backpressure_parks_one_and_rejects_the_next() {
        let config = FopConfig {
            fop_sliding_window: 1,
            ..FopConfig::default()
        };
        let mut h = Harness::new(config);
        h.init_active();

        h.transmit_ad(0);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Transfer(FopOperationStatus::Accept, FrameType::Ad, 0)]
        );
        h.accept_ad(0);
        h.forwarded();

        // The window is full: the next frame parks on the wait queue.
        h.transmit_ad(1);
        assert!(h.taken_notes().is_empty());
        assert!(h.core.status().wait_queue_occupied);
        assert!(h.forwarded().is_empty());

        // And a third is rejected outright.
        h.transmit_ad(2);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Transfer(FopOperationStatus::Reject, FrameType::Ad, 2)]
        );

        // Acknowledging frame 0 admits the parked frame.
        h.clcw(1, false, false, false);
        let notes = h.taken_notes();
        assert_eq!(
            notes,
            vec![
                Note::Transfer(FopOperationStatus::PositiveConfirm, FrameType::Ad, 0),
                Note::Transfer(FopOperationStatus::Accept, FrameType::Ad, 1),
            ]
        );
        let sent = h.forwarded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sequence_number, 1);
        assert_eq!(h.core.status().vs, 2);
        assert!(!h.core.status().wait_queue_occupied);
    }

    #[tokio::test]
    async fn parked_frame_waits_for_ad_out_ready() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.forwarded();
        h.taken_notes();

        // No accept yet for frame 0: frame 1 parks even though the window
        // has room.
        h.transmit_ad(1);
        assert!(h.forwarded().is_empty());
        assert!(h.core.status().wait_queue_occupied);

        // The accept response frees the out flag and releases it.
        h.accept_ad(0);
        let sent = h.forwarded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sequence_number, 1);
    }

    // ------------------------------------------------------------------
    // BC initialisation
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn unlock_initialisation_completes_on_clean_report() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::InitAdWithUnlock, 0);
        assert_eq!(h.core.state(), FopState::InitialisingWithBc);
        let sent = h.forwarded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].frame_type, FrameType::Bc);
        assert_eq!(
            sent[0].control_command(),
            Some(tclink_core::ControlCommand::Unlock)
        );
        h.taken_notes();

        h.core.handle(Stimulus::LowerLayer {
            frame: sent[0].clone(),
            accepted: true,
        });
        h.clcw(0, false, false, false);
        assert_eq!(h.core.state(), FopState::Active);
        let notes = h.taken_notes();
        assert!(notes.contains(&Note::Directive(
            FopOperationStatus::PositiveConfirm,
            FopDirective::InitAdWithUnlock
        )));
        assert_eq!(h.core.status().sent_queue_len, 0);
        assert!(!h.core.status().timer_armed);
    }

    #[tokio::test]
    async fn set_vr_initialisation_adopts_the_qualifier() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::InitAdWithSetVr, 7);
        assert_eq!(h.core.state(), FopState::InitialisingWithBc);
        let sent = h.forwarded();
        assert_eq!(
            sent[0].control_command(),
            Some(tclink_core::ControlCommand::SetVr(7))
        );
        let status = h.core.status();
        assert_eq!(status.vs, 7);
        assert_eq!(status.nnr, 7);
        // The framer counter follows, so the next AD frame is numbered 7.
        assert_eq!(h.framer.frame_counter(), 7);
        h.taken_notes();

        h.core.handle(Stimulus::LowerLayer {
            frame: sent[0].clone(),
            accepted: true,
        });
        h.clcw(7, false, false, false);
        assert_eq!(h.core.state(), FopState::Active);
    }

    #[tokio::test]
    async fn bc_reject_aborts_initialisation_with_llif() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::InitAdWithUnlock, 0);
        let sent = h.forwarded();
        h.taken_notes();
        h.core.handle(Stimulus::LowerLayer {
            frame: sent[0].clone(),
            accepted: false,
        });
        assert_eq!(h.core.state(), FopState::Initial);
        let notes = h.taken_notes();
        assert!(notes.contains(&Note::Alert(FopAlertCode::Llif)));
        assert!(notes.contains(&Note::Directive(
            FopOperationStatus::NegativeConfirm,
            FopDirective::InitAdWithUnlock
        )));
    }

    #[tokio::test]
    async fn bc_timer_expiry_resends_the_control_frame() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::InitAdWithUnlock, 0);
        let first = h.forwarded();
        h.core.handle(Stimulus::LowerLayer {
            frame: first[0].clone(),
            accepted: true,
        });
        h.taken_notes();

        h.core.handle(Stimulus::TimerExpired { epoch: None });
        assert_eq!(h.core.state(), FopState::InitialisingWithBc);
        assert_eq!(h.core.status().transmission_count, 2);
        let resent = h.forwarded();
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].frame_type, FrameType::Bc);
    }

    // ------------------------------------------------------------------
    // Timer expiry, suspend, resume
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn timer_expiry_with_tries_left_retransmits() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.accept_ad(0);
        h.forwarded();
        h.taken_notes();

        h.core.handle(Stimulus::TimerExpired { epoch: None });
        assert_eq!(h.core.state(), FopState::RetransmitWithoutWait);
        assert_eq!(h.core.status().transmission_count, 2);
        let resent = h.forwarded();
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].sequence_number, 0);
    }

    #[tokio::test]
    async fn timer_expiry_at_limit_alerts_t1() {
        let config = FopConfig {
            transmission_limit: 1,
            ..FopConfig::default()
        };
        let mut h = Harness::new(config);
        h.init_active();
        h.transmit_ad(0);
        h.taken_notes();

        h.core.handle(Stimulus::TimerExpired { epoch: None });
        assert_eq!(h.core.state(), FopState::Initial);
        assert!(h.taken_notes().contains(&Note::Alert(FopAlertCode::T1)));
    }

    #[tokio::test]
    async fn timeout_type_one_suspends_and_resume_restores() {
        let config = FopConfig {
            timeout_type: 1,
            ..FopConfig::default()
        };
        let mut h = Harness::new(config);
        h.init_active();
        h.transmit_ad(0);
        h.forwarded();
        h.taken_notes();

        h.core.handle(Stimulus::TimerExpired { epoch: None });
        assert_eq!(h.core.state(), FopState::Initial);
        let status = h.core.status();
        assert_eq!(status.suspend_state, 1);
        assert!(!status.timer_armed);
        // Suspension keeps the queues intact.
        assert_eq!(status.sent_queue_len, 1);

        h.directive(FopDirective::Resume, 0);
        assert_eq!(h.core.state(), FopState::Active);
        let status = h.core.status();
        assert_eq!(status.suspend_state, 0);
        assert!(status.timer_armed);
        assert_eq!(status.sent_queue_len, 1);
    }

    #[tokio::test]
    async fn resume_without_suspension_is_rejected() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::Resume, 0);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Directive(
                FopOperationStatus::Reject,
                FopDirective::Resume
            )]
        );
        assert_eq!(h.core.state(), FopState::Initial);
    }

    #[tokio::test]
    async fn stale_timer_epoch_is_discarded() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.taken_notes();
        // The armed epoch is some value >= 1; a stale stamp must not fire.
        h.core.handle(Stimulus::TimerExpired { epoch: Some(0) });
        assert_eq!(h.core.state(), FopState::Active);
        assert!(h.core.status().timer_armed);
    }

    // ------------------------------------------------------------------
    // Terminate
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn terminate_purges_and_confirms() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.taken_notes();

        h.directive(FopDirective::Terminate, 0);
        assert_eq!(h.core.state(), FopState::Initial);
        let notes = h.taken_notes();
        assert_eq!(
            notes,
            vec![
                Note::Directive(FopOperationStatus::Accept, FopDirective::Terminate),
                Note::Alert(FopAlertCode::Term),
                Note::Transfer(FopOperationStatus::NegativeConfirm, FrameType::Ad, 0),
                Note::Directive(FopOperationStatus::PositiveConfirm, FopDirective::Terminate),
                Note::State(FopState::Active, FopState::Initial),
            ]
        );
    }

    #[tokio::test]
    async fn terminate_clears_a_suspension() {
        let config = FopConfig {
            timeout_type: 1,
            ..FopConfig::default()
        };
        let mut h = Harness::new(config);
        h.init_active();
        h.transmit_ad(0);
        h.core.handle(Stimulus::TimerExpired { epoch: None });
        assert_eq!(h.core.status().suspend_state, 1);
        h.taken_notes();

        h.directive(FopDirective::Terminate, 0);
        assert_eq!(h.core.status().suspend_state, 0);
        assert_eq!(h.core.state(), FopState::Initial);
    }

    // ------------------------------------------------------------------
    // BD service
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn bd_frames_flow_in_any_state() {
        let mut h = Harness::new(FopConfig::default());
        let bd = TcTransferFrame::new_bd(0x2A, 1, vec![9]);

        // Even in S6 the BD service works.
        h.core.handle(Stimulus::BdFrameRequest(bd.clone()));
        assert_eq!(
            h.taken_notes(),
            vec![Note::Transfer(FopOperationStatus::Accept, FrameType::Bd, 0)]
        );
        assert_eq!(h.forwarded().len(), 1);

        // A second request while the first is outstanding is rejected.
        h.core.handle(Stimulus::BdFrameRequest(bd.clone()));
        assert_eq!(
            h.taken_notes(),
            vec![Note::Transfer(FopOperationStatus::Reject, FrameType::Bd, 0)]
        );

        // The accept response frees the BD out flag again.
        h.core.handle(Stimulus::LowerLayer {
            frame: bd.clone(),
            accepted: true,
        });
        h.core.handle(Stimulus::BdFrameRequest(bd));
        assert_eq!(
            h.taken_notes(),
            vec![Note::Transfer(FopOperationStatus::Accept, FrameType::Bd, 0)]
        );
    }

    // ------------------------------------------------------------------
    // SET_* directives
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn set_window_validates_and_applies() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::SetFopSlidingWindow, 0);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Directive(
                FopOperationStatus::Reject,
                FopDirective::SetFopSlidingWindow
            )]
        );

        h.directive(FopDirective::SetFopSlidingWindow, 10);
        assert_eq!(
            h.taken_notes(),
            vec![
                Note::Directive(
                    FopOperationStatus::Accept,
                    FopDirective::SetFopSlidingWindow
                ),
                Note::Directive(
                    FopOperationStatus::PositiveConfirm,
                    FopDirective::SetFopSlidingWindow
                ),
            ]
        );
        assert_eq!(h.core.status().fop_sliding_window, 10);
    }

    #[tokio::test]
    async fn set_vs_aligns_engine_and_framer() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::SetVs, 42);
        let status = h.core.status();
        assert_eq!(status.vs, 42);
        assert_eq!(status.nnr, 42);
        assert_eq!(h.framer.frame_counter(), 42);
    }

    #[tokio::test]
    async fn set_vs_rejected_outside_initial_state() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.directive(FopDirective::SetVs, 42);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Directive(FopOperationStatus::Reject, FopDirective::SetVs)]
        );
        assert_eq!(h.core.status().vs, 0);
    }

    #[tokio::test]
    async fn set_limit_and_timeout_type_apply_anywhere() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.directive(FopDirective::SetTransmissionLimit, 5);
        h.directive(FopDirective::SetTimeoutType, 1);
        h.directive(FopDirective::SetT1Initial, 30);
        let status = h.core.status();
        assert_eq!(status.transmission_limit, 5);
        assert_eq!(status.timeout_type, 1);
        assert_eq!(h.core.state(), FopState::Active);
    }

    #[tokio::test]
    async fn set_timeout_type_rejects_out_of_range() {
        let mut h = Harness::new(FopConfig::default());
        h.directive(FopDirective::SetTimeoutType, 2);
        assert_eq!(
            h.taken_notes(),
            vec![Note::Directive(
                FopOperationStatus::Reject,
                FopDirective::SetTimeoutType
            )]
        );
    }

    // ------------------------------------------------------------------
    // Lower-layer rejection
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn ad_reject_from_lower_layer_alerts_llif() {
        let mut h = Harness::new(FopConfig::default());
        h.init_active();
        h.transmit_ad(0);
        h.taken_notes();
        h.core.handle(Stimulus::LowerLayer {
            frame: h.ad(0),
            accepted: false,
        });
        assert_eq!(h.core.state(), FopState::Initial);
        let notes = h.taken_notes();
        assert!(notes.contains(&Note::Alert(FopAlertCode::Llif)));
        assert!(notes.contains(&Note::Transfer(
            FopOperationStatus::NegativeConfirm,
            FrameType::Ad,
            0
        )));
    }
}
