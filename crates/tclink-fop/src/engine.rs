//! The FOP-1 engine: public entry points and worker plumbing.
//!
//! Every public call records a stimulus and returns immediately. Stimuli
//! are drained in order by a dedicated engine worker that owns all protocol
//! state; a second worker owns the (possibly blocking) handoff to the
//! lower-layer sink. Observer callbacks run on the engine worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tclink_core::{
    Clcw, CopInEffect, FrameType, TcSenderVirtualChannel, TcTransferFrame, VirtualChannelOutput,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::actions::FopCore;
use crate::config::FopConfig;
use crate::directive::{DirectiveTag, FopDirective};
use crate::error::FopError;
use crate::machine::FopState;
use crate::observer::{FopObserver, ObserverRegistry};
use crate::shim::{self, OutputSlot};

/// A stimulus queued for the engine worker.
#[derive(Debug)]
pub(crate) enum Stimulus {
    Directive {
        tag: DirectiveTag,
        directive: FopDirective,
        qualifier: u32,
    },
    AdFrameRequest(TcTransferFrame),
    BdFrameRequest(TcTransferFrame),
    LowerLayer {
        frame: TcTransferFrame,
        accepted: bool,
    },
    Clcw(Clcw),
    /// Timer expiry. `None` marks an externally injected expiry; spawned
    /// timer tasks always carry their arming epoch.
    TimerExpired {
        epoch: Option<u64>,
    },
    Query(oneshot::Sender<FopStatus>),
    Abort {
        done: oneshot::Sender<()>,
    },
}

/// Work for the lower-layer worker.
#[derive(Debug)]
pub(crate) enum ForwardItem {
    Frame(TcTransferFrame),
    Stop,
}

/// A point-in-time snapshot of the engine variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FopStatus {
    pub state: FopState,
    pub vs: u8,
    pub nnr: u8,
    pub transmission_count: u32,
    pub transmission_limit: u32,
    pub timeout_type: u8,
    pub fop_sliding_window: u8,
    pub suspend_state: u8,
    pub sent_queue_len: usize,
    pub wait_queue_occupied: bool,
    pub timer_armed: bool,
    pub clcws_in_initial: u64,
}

/// The FOP-1 engine for one telecommand virtual channel.
///
/// Construct inside a tokio runtime; both workers are spawned immediately.
/// The engine registers itself with the framer so that generated frames
/// arrive as transmit requests, and deregisters on [`dispose`](Self::dispose)
/// or [`abort`](Self::abort).
pub struct FopEngine {
    virtual_channel_id: u8,
    framer: Arc<TcSenderVirtualChannel>,
    framer_registration: u64,
    stimulus_tx: mpsc::UnboundedSender<Stimulus>,
    forward_tx: mpsc::UnboundedSender<ForwardItem>,
    observers: Arc<ObserverRegistry>,
    output: Arc<OutputSlot>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

/// Routes frames generated by the framer into the engine without holding a
/// reference to it, so the framer-to-engine edge is non-owning.
struct FramerListener {
    stimulus_tx: mpsc::UnboundedSender<Stimulus>,
    forward_tx: mpsc::UnboundedSender<ForwardItem>,
}

impl VirtualChannelOutput for FramerListener {
    fn transfer_frame_generated(&self, _vc: u8, frame: &TcTransferFrame, _buffered: usize) {
        route_transmit(frame.clone(), &self.stimulus_tx, &self.forward_tx);
    }
}

/// AD and BD requests go through the engine worker; BC frames are produced
/// by the engine itself and go straight to the lower-layer worker.
fn route_transmit(
    frame: TcTransferFrame,
    stimulus_tx: &mpsc::UnboundedSender<Stimulus>,
    forward_tx: &mpsc::UnboundedSender<ForwardItem>,
) {
    let result = match frame.frame_type {
        FrameType::Ad => stimulus_tx.send(Stimulus::AdFrameRequest(frame)).is_ok(),
        FrameType::Bd => stimulus_tx.send(Stimulus::BdFrameRequest(frame)).is_ok(),
        FrameType::Bc => forward_tx.send(ForwardItem::Frame(frame)).is_ok(),
    };
    if !result {
        tracing::warn!("engine workers gone; transmit request dropped");
    }
}

impl FopEngine {
    /// Build an engine bound to `framer`'s virtual channel.
    pub fn new(framer: Arc<TcSenderVirtualChannel>, config: FopConfig) -> Result<Self, FopError> {
        config.validate()?;

        let (stimulus_tx, stimulus_rx) = mpsc::unbounded_channel();
        let (forward_tx, forward_rx) = mpsc::unbounded_channel();
        let observers = Arc::new(ObserverRegistry::new());
        let output = Arc::new(OutputSlot::new());

        let core = FopCore::new(
            &config,
            Arc::clone(&observers),
            forward_tx.clone(),
            stimulus_tx.clone(),
            Arc::clone(&framer),
        );

        let engine_worker = tokio::spawn(run_engine(core, stimulus_rx));
        let shim_worker = shim::spawn(forward_rx, Arc::clone(&output), stimulus_tx.clone());

        let listener = Arc::new(FramerListener {
            stimulus_tx: stimulus_tx.clone(),
            forward_tx: forward_tx.clone(),
        });
        let framer_registration = framer.register(listener);

        tracing::debug!(
            vc = framer.virtual_channel_id(),
            "FOP engine started"
        );

        Ok(Self {
            virtual_channel_id: framer.virtual_channel_id(),
            framer,
            framer_registration,
            stimulus_tx,
            forward_tx,
            observers,
            output,
            workers: Mutex::new(vec![engine_worker, shim_worker]),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn virtual_channel_id(&self) -> u8 {
        self.virtual_channel_id
    }

    /// Configure the lower-layer sink. The sink may block; it runs on the
    /// lower-layer worker, never on the engine worker.
    pub fn set_output<F>(&self, sink: F)
    where
        F: Fn(&TcTransferFrame) -> bool + Send + Sync + 'static,
    {
        self.output.set(Arc::new(sink));
    }

    pub fn register_observer(&self, observer: Arc<dyn FopObserver>) {
        self.observers.register(observer);
    }

    pub fn deregister_observer(&self, observer: &Arc<dyn FopObserver>) {
        self.observers.deregister(observer);
    }

    /// Issue a directive from the higher procedures.
    pub fn directive(&self, tag: DirectiveTag, directive: FopDirective, qualifier: u32) {
        if self.is_disposed() {
            return;
        }
        let _ = self.stimulus_tx.send(Stimulus::Directive {
            tag,
            directive,
            qualifier,
        });
    }

    /// Request transmission of a frame.
    pub fn transmit(&self, frame: TcTransferFrame) {
        if self.is_disposed() {
            return;
        }
        route_transmit(frame, &self.stimulus_tx, &self.forward_tx);
    }

    /// Inject a lower-layer accept/reject response directly. Normally these
    /// are produced by the lower-layer worker.
    pub fn lower_layer(&self, frame: TcTransferFrame, accepted: bool) {
        if self.is_disposed() {
            return;
        }
        let _ = self.stimulus_tx.send(Stimulus::LowerLayer { frame, accepted });
    }

    /// Deliver a CLCW. Reports for another COP or another virtual channel
    /// are silently discarded.
    pub fn clcw(&self, clcw: Clcw) {
        if self.is_disposed() {
            return;
        }
        if clcw.cop_in_effect != CopInEffect::Cop1
            || clcw.virtual_channel_id != self.virtual_channel_id
        {
            tracing::trace!(
                vc = clcw.virtual_channel_id,
                cop = ?clcw.cop_in_effect,
                "discarding CLCW for another channel"
            );
            return;
        }
        let _ = self.stimulus_tx.send(Stimulus::Clcw(clcw));
    }

    /// Inject a timer expiry. Accepted only while the timer is armed.
    pub fn timer_expired(&self) {
        if self.is_disposed() {
            return;
        }
        let _ = self.stimulus_tx.send(Stimulus::TimerExpired { epoch: None });
    }

    /// Snapshot the engine variables. `None` once the engine is shut down.
    pub async fn status(&self) -> Option<FopStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.stimulus_tx.send(Stimulus::Query(reply_tx)).ok()?;
        reply_rx.await.ok()
    }

    /// Orderly shutdown: stop accepting stimuli, cancel the timer, purge
    /// both queues (emitting the usual reject/negative-confirm
    /// notifications), then join both workers. Idempotent.
    pub async fn abort(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.framer.deregister(self.framer_registration);
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self.stimulus_tx.send(Stimulus::Abort { done: done_tx });
        let _ = self.forward_tx.send(ForwardItem::Stop);
        let _ = done_rx.await;
        let workers: Vec<_> = {
            let mut guard = self.workers.lock().expect("worker list lock poisoned");
            guard.drain(..).collect()
        };
        for worker in workers {
            let _ = worker.await;
        }
        tracing::debug!(vc = self.virtual_channel_id, "FOP engine aborted");
    }

    /// Immediate shutdown-now: deregister from the framer and stop both
    /// workers without draining. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.framer.deregister(self.framer_registration);
        let _ = self.forward_tx.send(ForwardItem::Stop);
        let workers: Vec<_> = {
            let mut guard = self.workers.lock().expect("worker list lock poisoned");
            guard.drain(..).collect()
        };
        for worker in workers {
            worker.abort();
        }
        tracing::debug!(vc = self.virtual_channel_id, "FOP engine disposed");
    }

    fn is_disposed(&self) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::trace!("stimulus ignored: engine disposed");
            true
        } else {
            false
        }
    }
}

impl Drop for FopEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_engine(mut core: FopCore, mut rx: mpsc::UnboundedReceiver<Stimulus>) {
    while let Some(stimulus) = rx.recv().await {
        match stimulus {
            Stimulus::Abort { done } => {
                core.shutdown();
                let _ = done.send(());
                break;
            }
            other => core.handle(other),
        }
    }
    tracing::debug!("engine worker stopped");
}
