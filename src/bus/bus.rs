use super::registry::{PortKind, PortRef, PortRegistry};
use crate::call::CallDirectory;
use crate::recorder::{RecorderWiring, ResourceKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Index of the telephony recorder slot within [`PortKind::Recorder`].
const REC_TEL: usize = 0;
/// Index of the radio recorder slot.
const REC_RAD: usize = 1;

struct BusState {
    registry: PortRegistry,
    /// Directed edges currently wired through the mixer.
    connections: HashSet<(PortRef, PortRef)>,
    /// Recorder source sets, refcounted by how many independent bridges
    /// currently justify each port's attachment.
    tel_sources: HashMap<PortRef, usize>,
    rad_sources: HashMap<PortRef, usize>,
    /// Whether each recorder lane currently accepts audio (Record acked).
    tel_recording: bool,
    rad_recording: bool,
}

/// The audio-port connection graph, plus the rules that keep the recorder
/// bridged to whichever sources must currently reach it. One bus-wide lock
/// serializes validity checks and edge edits.
pub struct ConferenceBus {
    state: Mutex<BusState>,
    calls: Arc<dyn CallDirectory>,
}

impl ConferenceBus {
    pub fn new(calls: Arc<dyn CallDirectory>) -> Self {
        let mut registry = PortRegistry::new();
        registry.register(PortRef::recorder(REC_TEL));
        registry.register(PortRef::recorder(REC_RAD));

        Self {
            state: Mutex::new(BusState {
                registry,
                connections: HashSet::new(),
                tel_sources: HashMap::new(),
                rad_sources: HashMap::new(),
                tel_recording: false,
                rad_recording: false,
            }),
            calls,
        }
    }

    pub fn register_port(&self, port: PortRef) {
        self.state.lock().unwrap().registry.register(port);
    }

    pub fn unregister_port(&self, port: PortRef) {
        self.state.lock().unwrap().registry.unregister(port);
    }

    pub fn is_port_valid(&self, port: &PortRef) -> bool {
        self.state.lock().unwrap().registry.is_valid(port)
    }

    /// Wire `src` into `dst`. Idempotent; invalid ports are skipped.
    pub fn connect(&self, src: PortRef, dst: PortRef) -> bool {
        self.state.lock().unwrap().connect(src, dst)
    }

    /// Remove the `src` -> `dst` edge if present.
    pub fn disconnect(&self, src: PortRef, dst: PortRef) -> bool {
        self.state.lock().unwrap().disconnect(src, dst)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().connections.len()
    }

    /// Generic cross-connect used by call setup/teardown and device
    /// routing. Beyond the plain edge edit, certain kind pairs carry
    /// recorder side effects: bridging audio toward a call or from a radio
    /// receiver keeps the matching recorder lane's source set in step.
    pub fn bridge_link(&self, src: PortRef, dst: PortRef, on: bool) {
        let mut state = self.state.lock().unwrap();

        if on {
            state.connect(src, dst);
        } else {
            state.disconnect(src, dst);
        }

        match (src.kind, dst.kind) {
            (PortKind::SoundDevice, PortKind::Call) => {
                // Device attachment is boolean, not counted: the guard
                // below may skip a detach, so a counted attach would leak
                // a reference across overlapping calls.
                if on {
                    state.attach_once(ResourceKind::Telephony, src);
                } else if self.calls.confirmed_calls() <= 1 {
                    // With a second confirmed call up, the device still
                    // feeds recorded audio and must stay attached.
                    state.detach(ResourceKind::Telephony, src);
                }
            }
            (PortKind::Call, PortKind::SoundDevice) => {
                if on {
                    state.attach(ResourceKind::Telephony, src);
                } else {
                    state.detach(ResourceKind::Telephony, src);
                }
            }
            (PortKind::RadioRx, PortKind::SoundDevice) => {
                if on {
                    state.attach(ResourceKind::Radio, src);
                } else {
                    state.detach(ResourceKind::Radio, src);
                }
            }
            _ => {}
        }
    }

    /// Add `port` to a recorder lane's source set. Reference-counted: the
    /// underlying connection is created on the first attach (and only while
    /// that lane is recording).
    pub fn attach_to_recorder(&self, kind: ResourceKind, port: PortRef) {
        self.state.lock().unwrap().attach(kind, port);
    }

    /// Drop one reference to `port` on a recorder lane; the underlying
    /// connection goes away when the count reaches zero.
    pub fn detach_from_recorder(&self, kind: ResourceKind, port: PortRef) {
        self.state.lock().unwrap().detach(kind, port);
    }

    #[cfg(test)]
    fn is_connected(&self, src: PortRef, dst: PortRef) -> bool {
        self.state.lock().unwrap().connections.contains(&(src, dst))
    }
}

impl RecorderWiring for ConferenceBus {
    /// Record acked / Pause admitted: connect or disconnect every tracked
    /// source of the lane to its recorder port. The source set itself is
    /// kept either way so a later Record resumes the same wiring.
    fn bridge_recorder_sources(&self, kind: ResourceKind, on: bool) {
        let mut state = self.state.lock().unwrap();
        state.sweep();

        let recorder = recorder_port(kind);
        match kind {
            ResourceKind::Telephony => state.tel_recording = on,
            ResourceKind::Radio => state.rad_recording = on,
        }

        let ports: Vec<PortRef> = state.sources(kind).keys().copied().collect();
        debug!(
            "{} {} recorder source(s) for {:?}",
            if on { "Connecting" } else { "Disconnecting" },
            ports.len(),
            kind
        );
        for port in ports {
            if on {
                state.connect(port, recorder);
            } else {
                state.disconnect(port, recorder);
            }
        }
    }
}

fn recorder_port(kind: ResourceKind) -> PortRef {
    match kind {
        ResourceKind::Telephony => PortRef::recorder(REC_TEL),
        ResourceKind::Radio => PortRef::recorder(REC_RAD),
    }
}

impl BusState {
    fn connect(&mut self, src: PortRef, dst: PortRef) -> bool {
        if !self.registry.is_valid(&src) || !self.registry.is_valid(&dst) {
            warn!("Skipping connect over stale port: {:?} -> {:?}", src, dst);
            return false;
        }
        self.connections.insert((src, dst))
    }

    fn disconnect(&mut self, src: PortRef, dst: PortRef) -> bool {
        self.connections.remove(&(src, dst))
    }

    fn sources(&mut self, kind: ResourceKind) -> &mut HashMap<PortRef, usize> {
        match kind {
            ResourceKind::Telephony => &mut self.tel_sources,
            ResourceKind::Radio => &mut self.rad_sources,
        }
    }

    fn recording(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Telephony => self.tel_recording,
            ResourceKind::Radio => self.rad_recording,
        }
    }

    fn attach(&mut self, kind: ResourceKind, port: PortRef) {
        self.sweep();
        if !self.registry.is_valid(&port) {
            warn!("Skipping recorder attach of stale port {:?}", port);
            return;
        }

        let count = self.sources(kind).entry(port).or_insert(0);
        *count += 1;
        let first = *count == 1;

        if first && self.recording(kind) {
            self.connect(port, recorder_port(kind));
        }
    }

    /// Like `attach`, but idempotent: the port is tracked with a count of
    /// one no matter how many bridges reference it, so a single `detach`
    /// always releases it.
    fn attach_once(&mut self, kind: ResourceKind, port: PortRef) {
        self.sweep();
        if !self.registry.is_valid(&port) {
            warn!("Skipping recorder attach of stale port {:?}", port);
            return;
        }

        let count = self.sources(kind).entry(port).or_insert(0);
        let first = *count == 0;
        *count = 1;

        if first && self.recording(kind) {
            self.connect(port, recorder_port(kind));
        }
    }

    fn detach(&mut self, kind: ResourceKind, port: PortRef) {
        self.sweep();

        let sources = self.sources(kind);
        let gone = match sources.get_mut(&port) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                sources.remove(&port);
                true
            }
            None => false,
        };

        if gone {
            self.disconnect(port, recorder_port(kind));
        }
    }

    /// Lazy validity sweep: drop edges and tracking entries whose ports
    /// are no longer registered.
    fn sweep(&mut self) {
        let registry = &self.registry;
        self.connections
            .retain(|(src, dst)| registry.is_valid(src) && registry.is_valid(dst));
        self.tel_sources.retain(|port, _| registry.is_valid(port));
        self.rad_sources.retain(|port, _| registry.is_valid(port));
    }
}
