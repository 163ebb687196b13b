//! FOP-1: the sending side of the COP-1 telecommand link-layer protocol.
//!
//! One [`FopEngine`] instance binds one telecommand virtual channel and turns
//! an unreliable downstream frame transport into a sliding-window,
//! acknowledged stream of Type-AD frames, interleaved with unacknowledged
//! Type-BD frames and Type-BC control frames. Feedback arrives from the
//! receiver as CLCW reports; progress is reported to the higher procedures
//! through the [`FopObserver`] callbacks.
//!
//! The implementation follows CCSDS 232.1: a closed event alphabet
//! ([`event`]), a pure stimulus classifier ([`classifier`]), a six-state
//! machine whose transition table is a single auditable data structure
//! ([`machine`]), and an elementary-action executor ([`actions`]). Stimuli
//! are serialized onto a dedicated engine worker; a second worker forwards
//! frames to the (possibly blocking) lower-layer sink.

pub mod actions;
pub mod classifier;
pub mod config;
pub mod directive;
pub mod engine;
pub mod error;
pub mod event;
pub mod machine;
pub mod observer;
pub mod queues;
pub mod shim;
pub mod timer;

pub use config::FopConfig;
pub use directive::{DirectiveTag, FopDirective};
pub use engine::{FopEngine, FopStatus};
pub use error::FopError;
pub use event::EventId;
pub use machine::FopState;
pub use observer::{FopAlertCode, FopObserver, FopOperationStatus};
