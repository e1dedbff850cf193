//! Channel connections and room membership.
//!
//! Every open channel is a connection with an optional authenticated
//! participant. Pushes are addressed to rooms and fanned out to member
//! connections when they are queued, the way a socket server resolves
//! `to=room` at emit time.

use gambit_protocol::{ParticipantId, SessionId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Callback receiving `(event name, payload)` for one connection.
pub type EventSink = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Identifier of an open channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A push audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// Every channel of one participant (`user_{id}`).
    User(ParticipantId),
    /// Every channel following one session (`game_{id}`).
    Game(SessionId),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user_{id}"),
            Room::Game(id) => write!(f, "game_{id}"),
        }
    }
}

/// A push produced by a request, not yet addressed to connections.
#[derive(Debug, Clone)]
pub(crate) struct Emit {
    pub room: Room,
    pub event: &'static str,
    pub payload: Value,
}

impl Emit {
    pub fn new(room: Room, event: &'static str, payload: Value) -> Self {
        Self {
            room,
            event,
            payload,
        }
    }
}

/// A push addressed to one connection.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub conn: ConnectionId,
    pub event: &'static str,
    pub payload: Value,
}

struct Connection {
    participant: Option<ParticipantId>,
    rooms: HashSet<Room>,
    sink: EventSink,
}

#[derive(Default)]
pub(crate) struct Rooms {
    connections: HashMap<ConnectionId, Connection>,
    next_id: u64,
}

impl Rooms {
    pub fn open(&mut self, participant: Option<ParticipantId>, sink: EventSink) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.connections.insert(
            id,
            Connection {
                participant,
                rooms: HashSet::new(),
                sink,
            },
        );
        id
    }

    pub fn close(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// `None` if the connection is closed, `Some(None)` if unauthenticated.
    pub fn participant(&self, id: ConnectionId) -> Option<Option<ParticipantId>> {
        self.connections.get(&id).map(|c| c.participant)
    }

    pub fn join(&mut self, id: ConnectionId, room: Room) -> bool {
        self.connections
            .get_mut(&id)
            .map(|c| c.rooms.insert(room))
            .unwrap_or(false)
    }

    pub fn leave(&mut self, id: ConnectionId, room: Room) -> bool {
        self.connections
            .get_mut(&id)
            .map(|c| c.rooms.remove(&room))
            .unwrap_or(false)
    }

    pub fn members(&self, room: Room) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.rooms.contains(&room))
            .map(|(id, _)| *id)
            .collect();
        members.sort();
        members
    }

    pub fn sink(&self, id: ConnectionId) -> Option<EventSink> {
        self.connections.get(&id).map(|c| c.sink.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn address(&self, emit: Emit) -> Vec<Delivery> {
        self.members(emit.room)
            .into_iter()
            .map(|conn| Delivery {
                conn,
                event: emit.event,
                payload: emit.payload.clone(),
            })
            .collect()
    }
}
