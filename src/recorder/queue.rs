// Bounded two-lane command queue
//
// Record/Pause commands travel in a priority lane that is always drained
// before the normal lane. Both lanes are bounded; a full lane is reported to
// the caller, control commands are never dropped silently.

use crate::protocol::Command;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

const LANE_CAPACITY: usize = 32;

#[derive(Default)]
struct Lanes {
    priority: VecDeque<Command>,
    normal: VecDeque<Command>,
}

pub struct CommandQueues {
    lanes: Mutex<Lanes>,
    notify: Notify,
}

impl CommandQueues {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue into the Record/Pause lane. Returns false when the lane is full.
    pub fn push_priority(&self, cmd: Command) -> bool {
        let mut lanes = self.lanes.lock().unwrap();
        if lanes.priority.len() >= LANE_CAPACITY {
            return false;
        }
        lanes.priority.push_back(cmd);
        drop(lanes);
        self.notify.notify_one();
        true
    }

    /// Enqueue into the normal lane. Returns false when the lane is full.
    pub fn push_normal(&self, cmd: Command) -> bool {
        let mut lanes = self.lanes.lock().unwrap();
        if lanes.normal.len() >= LANE_CAPACITY {
            return false;
        }
        lanes.normal.push_back(cmd);
        drop(lanes);
        self.notify.notify_one();
        true
    }

    /// Pop the next command, priority lane first.
    pub fn pop(&self) -> Option<Command> {
        let mut lanes = self.lanes.lock().unwrap();
        lanes.priority.pop_front().or_else(|| lanes.normal.pop_front())
    }

    /// Wait until a push (or a wake) occurs. Callers re-check `pop` after.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Wake a blocked worker without enqueuing (used at shutdown).
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub fn drain(&self) {
        let mut lanes = self.lanes.lock().unwrap();
        lanes.priority.clear();
        lanes.normal.clear();
    }

    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock().unwrap();
        lanes.priority.len() + lanes.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CommandQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_lane_drains_first() {
        let queues = CommandQueues::new();
        queues.push_normal(Command::remove_object("T"));
        queues.push_priority(Command::record("T"));
        queues.push_normal(Command::hold_off("T"));

        use crate::protocol::CommandKind;
        assert_eq!(queues.pop().unwrap().kind, CommandKind::Record);
        assert_eq!(queues.pop().unwrap().kind, CommandKind::RemoveObject);
        assert_eq!(queues.pop().unwrap().kind, CommandKind::HoldOff);
        assert!(queues.pop().is_none());
    }

    #[test]
    fn test_lane_capacity() {
        let queues = CommandQueues::new();
        for _ in 0..LANE_CAPACITY {
            assert!(queues.push_normal(Command::record("T")));
        }
        assert!(!queues.push_normal(Command::record("T")));
        // The other lane is unaffected
        assert!(queues.push_priority(Command::pause("T")));
    }

    #[test]
    fn test_drain() {
        let queues = CommandQueues::new();
        queues.push_normal(Command::record("T"));
        queues.push_priority(Command::pause("T"));
        queues.drain();
        assert!(queues.is_empty());
    }
}
