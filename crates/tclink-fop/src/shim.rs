//! The lower-layer forwarder.
//!
//! A single serialized worker, separate from the engine worker, that hands
//! frames to the configured output sink and posts the accept/reject result
//! back as a lower-layer stimulus. The sink call may block for the duration
//! of the I/O; keeping it here means the engine keeps classifying CLCW and
//! timer events while a frame is in flight to the link.

use std::sync::{Arc, RwLock};

use tclink_core::TcTransferFrame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::{ForwardItem, Stimulus};

/// The configured output sink: `frame -> accepted`.
pub(crate) type OutputFn = dyn Fn(&TcTransferFrame) -> bool + Send + Sync;

/// Shared slot for the sink. Written by `set_output`, read by the worker;
/// the write happens-before the first forward that sees it.
pub(crate) struct OutputSlot {
    sink: RwLock<Option<Arc<OutputFn>>>,
}

impl OutputSlot {
    pub fn new() -> Self {
        Self {
            sink: RwLock::new(None),
        }
    }

    pub fn set(&self, sink: Arc<OutputFn>) {
        *self.sink.write().expect("output slot lock poisoned") = Some(sink);
    }

    /// Offer a frame to the sink. No sink configured counts as a rejection.
    pub fn offer(&self, frame: &TcTransferFrame) -> bool {
        let sink = self
            .sink
            .read()
            .expect("output slot lock poisoned")
            .clone();
        match sink {
            Some(sink) => sink(frame),
            None => {
                tracing::warn!("frame offered with no output sink configured");
                false
            }
        }
    }
}

/// Spawn the forwarder worker on the blocking pool.
pub(crate) fn spawn(
    mut rx: mpsc::UnboundedReceiver<ForwardItem>,
    output: Arc<OutputSlot>,
    stimulus_tx: mpsc::UnboundedSender<Stimulus>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(item) = rx.blocking_recv() {
            match item {
                ForwardItem::Stop => break,
                ForwardItem::Frame(frame) => {
                    let accepted = output.offer(&frame);
                    tracing::trace!(
                        frame_type = ?frame.frame_type,
                        ns = frame.sequence_number,
                        accepted,
                        "forwarded frame to lower layer"
                    );
                    let _ = stimulus_tx.send(Stimulus::LowerLayer { frame, accepted });
                }
            }
        }
        tracing::debug!("lower-layer worker stopped");
    })
}
