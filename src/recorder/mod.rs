//! Recording-session orchestration
//!
//! One `RecordingSession` exists per resource kind (telephony, radio). It
//! serializes control commands to the external recorder, keeps the session
//! state machine, and derives radio events from the frequency activity table.

mod frequency;
mod queue;
mod session;

pub use frequency::{BssSelection, FrequencyActivityTracker};
pub use session::{
    Error, RecorderWiring, RecordingSession, ResourceKind, SessionStats, SessionStatus,
};
