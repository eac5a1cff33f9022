//! Glue between the SIP call layer and the recording core: tracks call
//! state transitions and turns them into recording-session events and
//! bus wiring.

use crate::bus::{ConferenceBus, PortRef};
use crate::protocol::{CallDirection, CallPriority};
use crate::recorder::{Error, RecordingSession, ResourceKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Confirmed-call count, consumed by recorder admission rules and the
/// bus detach guard.
pub trait CallDirectory: Send + Sync {
    fn confirmed_calls(&self) -> usize;
}

/// What the call layer tells us about one call.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// The call's conference slot index.
    pub slot: usize,
    pub direction: CallDirection,
    pub priority: CallPriority,
    pub origin: String,
    pub destination: String,
}

impl CallInfo {
    /// The remote party's number, as reported on answer.
    fn remote(&self) -> &str {
        match self.direction {
            CallDirection::Outgoing => &self.destination,
            CallDirection::Incoming => &self.origin,
        }
    }
}

/// Call state transitions the core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Confirmed,
    Disconnected { cause: u32, disc_origin: u32 },
    HoldLocal,
    HoldRemote,
    MediaActive,
}

struct TrackedCall {
    info: CallInfo,
    confirmed: bool,
    held: bool,
}

/// Tracks live calls and their confirmed count. This is the only state
/// the recording core needs from the SIP layer, so it sits on the
/// construction path ahead of the bus and sessions.
#[derive(Default)]
pub struct CallRegistry {
    calls: Mutex<HashMap<usize, TrackedCall>>,
    confirmed: AtomicUsize,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CallDirectory for CallRegistry {
    fn confirmed_calls(&self) -> usize {
        self.confirmed.load(Ordering::SeqCst)
    }
}

/// Receives call-layer callbacks and drives the telephony recording
/// session and the conference bus. Recording failures are logged, never
/// propagated back into call handling.
pub struct CallSupervisor {
    registry: Arc<CallRegistry>,
    session: Arc<RecordingSession>,
    bus: Arc<ConferenceBus>,
}

impl CallSupervisor {
    pub fn new(
        registry: Arc<CallRegistry>,
        session: Arc<RecordingSession>,
        bus: Arc<ConferenceBus>,
    ) -> Self {
        Self {
            registry,
            session,
            bus,
        }
    }

    /// A new call exists: its conference slot becomes a valid bus port.
    pub fn call_created(&self, info: CallInfo) {
        info!(
            "Call on slot {}: {} -> {}",
            info.slot, info.origin, info.destination
        );
        self.bus.register_port(PortRef::call(info.slot));
        self.registry.calls.lock().unwrap().insert(
            info.slot,
            TrackedCall {
                info,
                confirmed: false,
                held: false,
            },
        );
    }

    pub fn on_call_event(&self, slot: usize, event: CallEvent) {
        match event {
            CallEvent::Confirmed => self.on_confirmed(slot),
            CallEvent::Disconnected { cause, disc_origin } => {
                self.on_disconnected(slot, cause, disc_origin)
            }
            CallEvent::HoldLocal => self.on_hold(slot, true),
            CallEvent::HoldRemote => self.on_hold(slot, false),
            CallEvent::MediaActive => self.on_media_active(slot),
        }
    }

    fn on_confirmed(&self, slot: usize) {
        let mut calls = self.registry.calls.lock().unwrap();
        let Some(call) = calls.get_mut(&slot) else {
            warn!("Confirmed event for unknown call slot {}", slot);
            return;
        };
        if call.confirmed {
            return;
        }
        call.confirmed = true;
        self.registry.confirmed.fetch_add(1, Ordering::SeqCst);
        let info = call.info.clone();
        drop(calls);

        log_recording_error(self.session.signal_call_start(
            info.direction,
            info.priority,
            &info.origin,
            &info.destination,
        ));
        log_recording_error(self.session.signal_call_connected(info.remote()));
        self.bus
            .attach_to_recorder(ResourceKind::Telephony, PortRef::call(slot));
    }

    fn on_disconnected(&self, slot: usize, cause: u32, disc_origin: u32) {
        let mut calls = self.registry.calls.lock().unwrap();
        let Some(call) = calls.remove(&slot) else {
            return;
        };
        let was_confirmed = call.confirmed;
        drop(calls);

        if was_confirmed {
            self.registry.confirmed.fetch_sub(1, Ordering::SeqCst);
            self.bus
                .detach_from_recorder(ResourceKind::Telephony, PortRef::call(slot));
            log_recording_error(self.session.signal_call_end(cause, disc_origin));
        }
        self.bus.unregister_port(PortRef::call(slot));
        info!("Call on slot {} ended (cause {})", slot, cause);
    }

    fn on_hold(&self, slot: usize, local: bool) {
        let mut calls = self.registry.calls.lock().unwrap();
        let Some(call) = calls.get_mut(&slot) else {
            return;
        };
        if !call.confirmed || call.held {
            return;
        }
        call.held = true;
        drop(calls);

        log_recording_error(self.session.signal_hold(true, local));
    }

    /// Media flowing again: if the call was on hold this is the retrieve.
    fn on_media_active(&self, slot: usize) {
        let mut calls = self.registry.calls.lock().unwrap();
        let Some(call) = calls.get_mut(&slot) else {
            return;
        };
        if !call.held {
            return;
        }
        call.held = false;
        drop(calls);

        log_recording_error(self.session.signal_hold(false, true));
    }
}

fn log_recording_error(result: Result<(), Error>) {
    if let Err(e) = result {
        warn!("Recording not updated for call event: {}", e);
    }
}
