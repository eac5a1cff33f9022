//! Wire protocol spoken with the external recording service
//!
//! The protocol is ASCII over UDP, comma-separated fields, no terminator.
//! `command` builds outgoing requests, `response` parses the recorder's
//! replies, `alaw` encodes media payloads.

pub mod alaw;
pub mod command;
pub mod response;

pub use command::{CallDirection, CallPriority, Command, CommandKind, PttType};
pub use response::{Response, RESTART_NOTICE};
