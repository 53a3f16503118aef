use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Rooms the session currently sits in.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<BTreeSet<String>>>,
}

impl RoomRegistry {
    pub fn join(&self, room: &str) {
        if self.rooms.write().insert(room.to_owned()) {
            debug!(room, "room joined");
        }
    }

    pub fn leave(&self, room: &str) {
        if self.rooms.write().remove(room) {
            debug!(room, "room left");
        }
    }

    /// Joined rooms in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.rooms.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::RoomRegistry;

    #[test]
    fn join_and_leave_are_idempotent() {
        let rooms = RoomRegistry::default();
        rooms.join("lobby");
        rooms.join("battle-gen9ou-2");
        rooms.join("lobby");
        assert_eq!(rooms.list(), vec!["battle-gen9ou-2", "lobby"]);

        let shared = rooms.clone();
        shared.leave("lobby");
        shared.leave("never-joined");
        assert_eq!(rooms.list(), vec!["battle-gen9ou-2"]);
    }
}
