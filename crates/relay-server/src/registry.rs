//! Offerer/answerer slot bookkeeping, keyed by room.

use std::collections::HashMap;

use serde_json::Value;

/// Process-unique identifier of a signaling connection.
pub type ConnId = u64;

#[derive(Debug, Clone)]
struct Slot<H> {
    id: ConnId,
    handle: H,
}

#[derive(Debug)]
struct Room<H> {
    offerer: Option<Slot<H>>,
    answerer: Option<Slot<H>>,
    last_offer: Option<Value>,
}

impl<H> Default for Room<H> {
    fn default() -> Self {
        Self {
            offerer: None,
            answerer: None,
            last_offer: None,
        }
    }
}

impl<H> Room<H> {
    fn is_vacant(&self) -> bool {
        self.offerer.is_none() && self.answerer.is_none()
    }
}

/// Holds at most one offerer and one answerer handle per room.
///
/// Registering a role replaces whatever held that slot before
/// (last writer wins). Pure state: callers serialize access.
#[derive(Debug)]
pub struct Registry<H> {
    rooms: HashMap<String, Room<H>>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the answerer slot of `room`, returning the id it displaced.
    pub fn register_answerer(&mut self, room: &str, id: ConnId, handle: H) -> Option<ConnId> {
        let room = self.rooms.entry(room.to_string()).or_default();
        room.answerer
            .replace(Slot { id, handle })
            .map(|old| old.id)
            .filter(|old| *old != id)
    }

    /// Sets the offerer slot of `room`, returning the id it displaced.
    pub fn register_offerer(&mut self, room: &str, id: ConnId, handle: H) -> Option<ConnId> {
        let room = self.rooms.entry(room.to_string()).or_default();
        room.offerer
            .replace(Slot { id, handle })
            .map(|old| old.id)
            .filter(|old| *old != id)
    }

    /// Remembers the most recent offer body seen in `room`.
    ///
    /// The body is informational only; it is never replayed to a late
    /// answerer.
    pub fn record_offer(&mut self, room: &str, body: Option<Value>) {
        self.rooms.entry(room.to_string()).or_default().last_offer = body;
    }

    pub fn current_answerer(&self, room: &str) -> Option<&H> {
        self.rooms
            .get(room)
            .and_then(|r| r.answerer.as_ref())
            .map(|s| &s.handle)
    }

    pub fn current_offerer(&self, room: &str) -> Option<&H> {
        self.rooms
            .get(room)
            .and_then(|r| r.offerer.as_ref())
            .map(|s| &s.handle)
    }

    pub fn last_offer(&self, room: &str) -> Option<&Value> {
        self.rooms.get(room).and_then(|r| r.last_offer.as_ref())
    }

    /// Clears every slot held by `id`. Rooms left with no endpoint are
    /// dropped. Returns the number of slots cleared.
    pub fn unregister(&mut self, id: ConnId) -> usize {
        let mut cleared = 0;
        for room in self.rooms.values_mut() {
            if room.offerer.as_ref().is_some_and(|s| s.id == id) {
                room.offerer = None;
                cleared += 1;
            }
            if room.answerer.as_ref().is_some_and(|s| s.id == id) {
                room.answerer = None;
                cleared += 1;
            }
        }
        self.rooms.retain(|_, room| !room.is_vacant());
        cleared
    }

    /// Number of rooms with at least one registered endpoint.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
