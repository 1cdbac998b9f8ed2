use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use app_models::ChatWsMessage;

const ROOM_CAPACITY: usize = 64;

/// What a room member receives.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Message(ChatWsMessage),
    /// The chat was closed by an admin; members should disconnect.
    Closed,
}

struct Room {
    sender: broadcast::Sender<HubEvent>,
    connections: usize,
    // Distinguishes a room from a later one reopened under the same id.
    generation: u64,
}

/// In-memory registry of chat rooms, one broadcast channel per chat id.
#[derive(Default)]
pub struct ChatHub {
    rooms: Mutex<HashMap<String, Room>>,
    next_generation: AtomicU64,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a connection to the room, creating it on first join. The room
    /// forgets the connection when the returned guard is dropped.
    pub fn join(self: &Arc<Self>, chat_id: &str) -> Membership {
        let mut rooms = self.rooms();
        let room = rooms.entry(chat_id.to_string()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(ROOM_CAPACITY);
            Room {
                sender,
                connections: 0,
                generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            }
        });
        room.connections += 1;
        debug!(chat_id, connections = room.connections, "Joined chat room");

        Membership {
            hub: Arc::clone(self),
            chat_id: chat_id.to_string(),
            generation: room.generation,
            receiver: room.sender.subscribe(),
        }
    }

    fn leave(&self, chat_id: &str, generation: u64) {
        let mut rooms = self.rooms();
        let Some(room) = rooms.get_mut(chat_id) else {
            return;
        };
        if room.generation != generation {
            return;
        }

        room.connections = room.connections.saturating_sub(1);
        debug!(chat_id, connections = room.connections, "Left chat room");
        if room.connections == 0 {
            rooms.remove(chat_id);
        }
    }

    /// Sends to every member of the room; returns how many received it.
    pub fn publish(&self, message: ChatWsMessage) -> usize {
        let rooms = self.rooms();
        match rooms.get(&message.chat_id) {
            Some(room) => room.sender.send(HubEvent::Message(message)).unwrap_or(0),
            None => 0,
        }
    }

    /// Tells every member the chat is over and drops the room. Returns the
    /// number of connections that were attached.
    pub fn close(&self, chat_id: &str) -> usize {
        let Some(room) = self.rooms().remove(chat_id) else {
            return 0;
        };
        let _ = room.sender.send(HubEvent::Closed);
        info!(chat_id, connections = room.connections, "Closed chat room");
        room.connections
    }

    pub fn connections(&self, chat_id: &str) -> usize {
        self.rooms()
            .get(chat_id)
            .map(|room| room.connections)
            .unwrap_or(0)
    }

    /// `(chat_id, connections)` for every room with a live connection,
    /// ordered by chat id.
    pub fn active(&self) -> Vec<(String, usize)> {
        let mut active: Vec<_> = self
            .rooms()
            .iter()
            .filter(|(_, room)| room.connections > 0)
            .map(|(id, room)| (id.clone(), room.connections))
            .collect();
        active.sort();
        active
    }
}

/// One connection's place in a room.
pub struct Membership {
    hub: Arc<ChatHub>,
    chat_id: String,
    generation: u64,
    receiver: broadcast::Receiver<HubEvent>,
}

impl Membership {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Next event for this member; `None` once the room is gone.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(chat_id = %self.chat_id, skipped, "Chat member fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.hub.leave(&self.chat_id, self.generation);
    }
}
