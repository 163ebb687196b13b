//! Sender virtual channel: frames user data and stamps N(S).
//!
//! One `TcSenderVirtualChannel` owns the frame sequence counter of a single
//! telecommand virtual channel. Data handed to [`dispatch`] becomes a Type-AD
//! frame numbered from that counter; [`dispatch_bd`] builds unnumbered Type-BD
//! frames; [`dispatch_unlock`] and [`dispatch_set_vr`] build the Type-BC
//! control frames used by the FOP-1 initialisation directives.
//!
//! Generated AD and BD frames are pushed to every registered
//! [`VirtualChannelOutput`]. BC frames are returned to the caller instead:
//! the engine that requested them decides whether and when they go out.
//!
//! [`dispatch`]: TcSenderVirtualChannel::dispatch
//! [`dispatch_bd`]: TcSenderVirtualChannel::dispatch_bd
//! [`dispatch_unlock`]: TcSenderVirtualChannel::dispatch_unlock
//! [`dispatch_set_vr`]: TcSenderVirtualChannel::dispatch_set_vr

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use crate::frame::{ControlCommand, TcTransferFrame};

/// Listener for frames generated by a sender virtual channel.
pub trait VirtualChannelOutput: Send + Sync {
    /// Called for every generated AD/BD frame. `buffered_bytes` is the number
    /// of user-data bytes still buffered in the channel; this channel does
    /// not buffer, so it is always zero.
    fn transfer_frame_generated(
        &self,
        virtual_channel_id: u8,
        frame: &TcTransferFrame,
        buffered_bytes: usize,
    );
}

/// A telecommand sender virtual channel.
pub struct TcSenderVirtualChannel {
    spacecraft_id: u16,
    virtual_channel_id: u8,
    /// Frame sequence counter; the next N(S) to stamp on an AD frame.
    frame_counter: AtomicU8,
    /// Registered outputs, snapshot-on-write so notification never holds
    /// the lock while calling listeners.
    outputs: RwLock<Arc<Vec<(u64, Arc<dyn VirtualChannelOutput>)>>>,
    next_registration: AtomicU64,
}

impl TcSenderVirtualChannel {
    pub fn new(spacecraft_id: u16, virtual_channel_id: u8) -> Self {
        Self {
            spacecraft_id,
            virtual_channel_id,
            frame_counter: AtomicU8::new(0),
            outputs: RwLock::new(Arc::new(Vec::new())),
            next_registration: AtomicU64::new(1),
        }
    }

    pub fn virtual_channel_id(&self) -> u8 {
        self.virtual_channel_id
    }

    pub fn spacecraft_id(&self) -> u16 {
        self.spacecraft_id
    }

    /// The next N(S) the channel will stamp on an AD frame.
    pub fn frame_counter(&self) -> u8 {
        self.frame_counter.load(Ordering::SeqCst)
    }

    /// Register an output listener. Returns a handle for deregistration.
    pub fn register(&self, output: Arc<dyn VirtualChannelOutput>) -> u64 {
        let id = self.next_registration.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.outputs.write().expect("output list lock poisoned");
        let mut list = guard.as_ref().clone();
        list.push((id, output));
        *guard = Arc::new(list);
        id
    }

    /// Deregister a previously registered output. Unknown ids are ignored.
    pub fn deregister(&self, registration: u64) {
        let mut guard = self.outputs.write().expect("output list lock poisoned");
        let mut list = guard.as_ref().clone();
        list.retain(|(id, _)| *id != registration);
        *guard = Arc::new(list);
    }

    fn notify(&self, frame: &TcTransferFrame) {
        let snapshot = {
            let guard = self.outputs.read().expect("output list lock poisoned");
            Arc::clone(&guard)
        };
        for (_, output) in snapshot.iter() {
            output.transfer_frame_generated(self.virtual_channel_id, frame, 0);
        }
    }

    /// Frame user data as a Type-AD frame, stamping and advancing N(S).
    pub fn dispatch(&self, data: Vec<u8>) -> TcTransferFrame {
        let ns = self
            .frame_counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.wrapping_add(1))
            })
            .expect("fetch_update closure never returns None");
        let frame =
            TcTransferFrame::new_ad(self.spacecraft_id, self.virtual_channel_id, ns, data);
        tracing::trace!(vc = self.virtual_channel_id, ns, "generated AD frame");
        self.notify(&frame);
        frame
    }

    /// Frame user data as a Type-BD frame. Does not touch the counter.
    pub fn dispatch_bd(&self, data: Vec<u8>) -> TcTransferFrame {
        let frame = TcTransferFrame::new_bd(self.spacecraft_id, self.virtual_channel_id, data);
        tracing::trace!(vc = self.virtual_channel_id, "generated BD frame");
        self.notify(&frame);
        frame
    }

    /// Build a Type-BC Unlock frame and return it to the caller.
    pub fn dispatch_unlock(&self) -> TcTransferFrame {
        tracing::debug!(vc = self.virtual_channel_id, "built BC Unlock frame");
        TcTransferFrame::new_bc(
            self.spacecraft_id,
            self.virtual_channel_id,
            ControlCommand::Unlock,
        )
    }

    /// Build a Type-BC Set V(R) frame and return it to the caller.
    ///
    /// Also resets the channel frame counter to `vr`, so subsequent AD
    /// frames continue from the receiver's new V(R).
    pub fn dispatch_set_vr(&self, vr: u8) -> TcTransferFrame {
        self.frame_counter.store(vr, Ordering::SeqCst);
        tracing::debug!(vc = self.virtual_channel_id, vr, "built BC Set V(R) frame");
        TcTransferFrame::new_bc(
            self.spacecraft_id,
            self.virtual_channel_id,
            ControlCommand::SetVr(vr),
        )
    }
}

impl std::fmt::Debug for TcSenderVirtualChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcSenderVirtualChannel")
            .field("spacecraft_id", &self.spacecraft_id)
            .field("virtual_channel_id", &self.virtual_channel_id)
            .field("frame_counter", &self.frame_counter())
            .finish_non_exhaustive()
    }
}
