//! The wait queue and the sent queue.
//!
//! The wait queue holds at most one AD frame whose acceptance has not yet
//! been confirmed to the higher procedures; it is the flow-control valve
//! they see. The sent queue holds the master copy of every AD and BC frame
//! passed to the lower procedures and not yet fully processed, in
//! transmission order, each tagged with a retransmission flag. AD sequence
//! numbers on the sent queue are contiguous modulo 256 starting at NN(R).

use std::collections::VecDeque;

use tclink_core::{seqnum, FrameType, TcTransferFrame};

/// One sent-queue record.
#[derive(Debug, Clone)]
pub struct SentEntry {
    pub frame: TcTransferFrame,
    pub to_be_retransmitted: bool,
}

/// Ordered master-copy store for in-flight AD and BC frames.
#[derive(Debug, Default)]
pub struct SentQueue {
    entries: VecDeque<SentEntry>,
}

impl SentQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of AD entries (the sliding-window occupancy).
    pub fn ad_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.frame.frame_type == FrameType::Ad)
            .count()
    }

    /// N(S) of the oldest AD entry, if any.
    pub fn first_ad_sequence(&self) -> Option<u8> {
        self.entries
            .iter()
            .find(|e| e.frame.frame_type == FrameType::Ad)
            .map(|e| e.frame.sequence_number)
    }

    /// Append a frame as not-to-be-retransmitted.
    pub fn push(&mut self, frame: TcTransferFrame) {
        self.entries.push_back(SentEntry {
            frame,
            to_be_retransmitted: false,
        });
    }

    /// Remove the head AD entries acknowledged by a report value of `nr`,
    /// given the oldest outstanding number `nnr`. Returns them in order.
    pub fn remove_acknowledged(&mut self, nnr: u8, nr: u8) -> Vec<TcTransferFrame> {
        let mut removed = Vec::new();
        while let Some(head) = self.entries.front() {
            if head.frame.frame_type != FrameType::Ad {
                break;
            }
            if !seqnum::acknowledges(head.frame.sequence_number, nnr, nr) {
                break;
            }
            let entry = self.entries.pop_front().expect("front checked above");
            removed.push(entry.frame);
        }
        removed
    }

    /// Flag every entry for retransmission.
    pub fn mark_all_for_retransmission(&mut self) {
        for entry in &mut self.entries {
            entry.to_be_retransmitted = true;
        }
    }

    /// Clear every retransmission flag.
    pub fn clear_retransmission_flags(&mut self) {
        for entry in &mut self.entries {
            entry.to_be_retransmitted = false;
        }
    }

    /// Take the first AD entry flagged for retransmission: clears its flag
    /// and returns a copy of the frame to hand to the lower procedures.
    pub fn next_ad_for_retransmission(&mut self) -> Option<TcTransferFrame> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.frame.frame_type == FrameType::Ad && e.to_be_retransmitted)?;
        entry.to_be_retransmitted = false;
        Some(entry.frame.clone())
    }

    /// Same as [`next_ad_for_retransmission`](Self::next_ad_for_retransmission),
    /// for the single BC entry.
    pub fn next_bc_for_retransmission(&mut self) -> Option<TcTransferFrame> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.frame.frame_type == FrameType::Bc && e.to_be_retransmitted)?;
        entry.to_be_retransmitted = false;
        Some(entry.frame.clone())
    }

    /// Remove and return the BC entry, if present.
    pub fn take_bc(&mut self) -> Option<TcTransferFrame> {
        let index = self
            .entries
            .iter()
            .position(|e| e.frame.frame_type == FrameType::Bc)?;
        self.entries.remove(index).map(|e| e.frame)
    }

    /// Drain the whole queue in order (used by the purge action).
    pub fn drain(&mut self) -> Vec<TcTransferFrame> {
        self.entries.drain(..).map(|e| e.frame).collect()
    }
}

/// Capacity-one holding slot for the AD frame awaiting acceptance.
#[derive(Debug, Default)]
pub struct WaitQueue {
    slot: Option<TcTransferFrame>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn is_occupied(&self) -> bool {
        self.slot.is_some()
    }

    /// Place a frame in the queue. Precondition: the queue is empty; the
    /// classifier routes requests against an occupied queue to a reject.
    pub fn put(&mut self, frame: TcTransferFrame) {
        debug_assert!(self.slot.is_none(), "wait queue already occupied");
        self.slot = Some(frame);
    }

    pub fn take(&mut self) -> Option<TcTransferFrame> {
        self.slot.take()
    }
}
