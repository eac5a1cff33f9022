use std::collections::HashSet;

/// What kind of audio node a conference slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    SoundDevice,
    Call,
    WavPlayer,
    WavRecorder,
    RadioRx,
    SoundRx,
    Recorder,
}

/// Addressable node in the mixing bus: a kind plus its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub kind: PortKind,
    pub index: usize,
}

impl PortRef {
    pub fn sound_device(index: usize) -> Self {
        Self {
            kind: PortKind::SoundDevice,
            index,
        }
    }

    pub fn call(index: usize) -> Self {
        Self {
            kind: PortKind::Call,
            index,
        }
    }

    pub fn wav_player(index: usize) -> Self {
        Self {
            kind: PortKind::WavPlayer,
            index,
        }
    }

    pub fn wav_recorder(index: usize) -> Self {
        Self {
            kind: PortKind::WavRecorder,
            index,
        }
    }

    pub fn radio_rx(index: usize) -> Self {
        Self {
            kind: PortKind::RadioRx,
            index,
        }
    }

    pub fn sound_rx(index: usize) -> Self {
        Self {
            kind: PortKind::SoundRx,
            index,
        }
    }

    pub fn recorder(index: usize) -> Self {
        Self {
            kind: PortKind::Recorder,
            index,
        }
    }
}

/// Registry of currently live conference ports. A port is valid from
/// `register` until `unregister`; everything the bus tracks is checked
/// against it so stale slots never keep edges alive.
#[derive(Debug, Default)]
pub struct PortRegistry {
    live: HashSet<PortRef>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, port: PortRef) {
        self.live.insert(port);
    }

    pub fn unregister(&mut self, port: PortRef) {
        self.live.remove(&port);
    }

    pub fn is_valid(&self, port: &PortRef) -> bool {
        self.live.contains(port)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister() {
        let mut registry = PortRegistry::new();
        let call = PortRef::call(3);

        assert!(!registry.is_valid(&call));
        registry.register(call);
        assert!(registry.is_valid(&call));
        // Same kind, different slot
        assert!(!registry.is_valid(&PortRef::call(4)));

        registry.unregister(call);
        assert!(!registry.is_valid(&call));
        assert!(registry.is_empty());
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut registry = PortRegistry::new();
        registry.register(PortRef::call(0));
        assert!(!registry.is_valid(&PortRef::sound_device(0)));
        assert!(!registry.is_valid(&PortRef::radio_rx(0)));
    }
}
