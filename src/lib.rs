//! Collaborative mindmap session engine: room state, presence, and the
//! server-push event channel.
//!
//! ## Design
//! - SharedState: Arc<Mutex<SessionState>> — one container per active room
//!   membership, owned by the [`session::CollabSession`] orchestrator
//! - Inbound events fold into state through [`dispatch::apply_event`]; no
//!   other component writes to the container
//! - Node mutations are fire-and-forget requests; conflicting edits are
//!   resolved by a full-document refetch, not a merge
//!
//! ## Session lifecycle
//! 1. Caller builds a `CollabSession` with its local participant identity
//! 2. `create_room` / `join_room` performs the HTTP round trip
//! 3. On success the session opens one SSE connection for the room
//! 4. Events fold into `SessionState`; node events trigger a snapshot refetch
//! 5. `leave_room` notifies the server best-effort, closes the stream, and
//!    resets state to its initial shape

pub mod cli;
pub mod dispatch;
pub mod error;
pub mod presence;
pub mod session;
pub mod stream;
pub mod transport;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared session state container. Cloning the Arc shares the container;
/// the orchestrator is the only writer outside the dispatcher fold.
pub type SharedState = Arc<Mutex<SessionState>>;

/// Colors the room service assigns to participants in round-robin order.
/// Kept here so a client can render a plausible fallback before the
/// server-assigned color arrives.
pub const PARTICIPANT_COLORS: &[&str] = &[
    "#58a6ff", "#f0883e", "#a371f7", "#3fb950", "#e3b341", "#f85149",
];

/// One connected user identity within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    /// Assigned by the room service at join time; empty until then.
    #[serde(default)]
    pub color: String,
}

/// Last-known cursor position for a remote participant. Last-write-wins,
/// never persisted beyond the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorSample {
    pub x: f64,
    pub y: f64,
    pub name: String,
    pub color: String,
}

/// One node of the shared mindmap. The authoritative tree lives on the room
/// service; clients only ever hold read-only snapshots of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindmapNode {
    pub id: String,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub children: Vec<MindmapNode>,
}

/// One inbound room event as delivered by the server-push channel.
///
/// `data` stays a loose JSON value: the dispatcher parses it per event kind
/// and drops anything malformed rather than failing the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// In-memory state of one room membership.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub connected: bool,
    pub connecting: bool,
    pub room_id: Option<String>,
    /// Ordered roster, unique by participant id. Never contains self.
    pub participants: Vec<Participant>,
    /// participant id → last cursor sample. Never keyed by self.
    pub cursors: HashMap<String, CursorSample>,
    /// participant id → selected node id. Never keyed by self.
    pub selections: HashMap<String, String>,
    /// Monotonic document version stamped by the room service. Used only as
    /// a dirty signal, never for ordering.
    pub version: u64,
    pub error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            connected: false,
            connecting: false,
            room_id: None,
            participants: Vec::new(),
            cursors: HashMap::new(),
            selections: HashMap::new(),
            version: 0,
            error: None,
        }
    }

    /// Return to the initial idle shape, dropping roster and presence.
    pub fn reset(&mut self) {
        *self = SessionState::new();
    }

    /// Insert or replace a participant by id. Duplicate joins replace the
    /// existing entry so the roster never grows duplicates.
    pub fn upsert_participant(&mut self, participant: Participant) {
        if let Some(existing) = self.participants.iter_mut().find(|p| p.id == participant.id) {
            *existing = participant;
        } else {
            self.participants.push(participant);
        }
    }

    /// Remove a participant and purge its cursor and selection entries.
    pub fn remove_participant(&mut self, participant_id: &str) {
        self.participants.retain(|p| p.id != participant_id);
        self.cursors.remove(participant_id);
        self.selections.remove(participant_id);
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::new()
    }
}

/// Create a fresh shared state container.
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(SessionState::new()))
}
