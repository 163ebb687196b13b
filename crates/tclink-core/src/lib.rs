//! Wire-level data model for the CCSDS telecommand link layer.
//!
//! This crate holds the pieces shared between the FOP-1 engine and its
//! neighbours: TC transfer frames (CCSDS 232.0), the CLCW report word, the
//! modulo-256 sequence-number arithmetic used for acknowledgement windows,
//! and the sender virtual channel that frames user data and stamps N(S).

pub mod clcw;
pub mod error;
pub mod frame;
pub mod sender;
pub mod seqnum;

pub use clcw::{Clcw, CopInEffect};
pub use error::{ClcwError, FrameError};
pub use frame::{ControlCommand, FrameType, TcTransferFrame};
pub use sender::{TcSenderVirtualChannel, VirtualChannelOutput};
