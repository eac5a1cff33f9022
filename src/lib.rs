pub mod bus;
pub mod call;
pub mod config;
pub mod gateway;
pub mod protocol;
pub mod recorder;
pub mod transport;

pub use bus::{ConferenceBus, PortKind, PortRef, PortRegistry};
pub use call::{CallDirectory, CallEvent, CallInfo, CallRegistry, CallSupervisor};
pub use config::Config;
pub use gateway::Gateway;
pub use protocol::{CallDirection, CallPriority, Command, PttType, Response};
pub use recorder::{
    FrequencyActivityTracker, RecordingSession, ResourceKind, SessionStats, SessionStatus,
};
pub use transport::{RecorderLink, UdpRecorderLink};
