//! Session orchestration: the façade tying the room transport, the event
//! stream, the dispatcher, and the presence broadcaster together.
//!
//! ## Lifecycle
//!
//! 1. `create_room` / `join_room` — enter a room, seed local state from the
//!    server's response, open the event stream
//! 2. steady state — the stream task folds remote events; cursor and
//!    selection broadcasts go out through the presence broadcaster
//! 3. `leave_room` — best-effort server notify, stream torn down, local
//!    state reset unconditionally
//!
//! At most one stream handle is live at a time: entering a room always
//! closes the previous handle before opening a new one.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::presence::{PresenceBroadcaster, CURSOR_THROTTLE};
use crate::stream::{open_stream, StreamConfig, StreamHandle};
use crate::transport::{NodeOp, TransportClient};
use crate::{MindmapNode, Participant, SessionState, SharedState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    pub stream: StreamConfig,
    pub cursor_throttle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            base_url: "http://127.0.0.1:8080".to_string(),
            stream: StreamConfig::default(),
            cursor_throttle: CURSOR_THROTTLE,
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Hooks the embedding application registers to observe the session. Only
/// document snapshots need a callback; everything else is readable from
/// [`SessionState`].
#[derive(Default)]
pub struct SessionCallbacks {
    on_document: Mutex<Option<Box<dyn Fn(MindmapNode) + Send + Sync>>>,
}

impl SessionCallbacks {
    pub fn set_on_document(&self, f: impl Fn(MindmapNode) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_document.lock() {
            *slot = Some(Box::new(f));
        }
    }

    pub fn document(&self, doc: MindmapNode) {
        if let Ok(slot) = self.on_document.lock() {
            if let Some(cb) = slot.as_ref() {
                cb(doc);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct CollabSession {
    transport: TransportClient,
    state: SharedState,
    user: Participant,
    presence: PresenceBroadcaster,
    callbacks: Arc<SessionCallbacks>,
    stream_config: StreamConfig,
    stream: Mutex<Option<StreamHandle>>,
}

impl CollabSession {
    pub fn new(user: Participant, config: SessionConfig) -> Self {
        let transport = TransportClient::new(&config.base_url);
        let state = crate::new_shared_state();
        let presence = PresenceBroadcaster::with_throttle(
            transport.clone(),
            Arc::clone(&state),
            user.id.clone(),
            config.cursor_throttle,
        );
        CollabSession {
            transport,
            state,
            user,
            presence,
            callbacks: Arc::new(SessionCallbacks::default()),
            stream_config: config.stream,
            stream: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Point-in-time copy of the session state.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().map(|st| st.clone()).unwrap_or_default()
    }

    pub fn callbacks(&self) -> Arc<SessionCallbacks> {
        Arc::clone(&self.callbacks)
    }

    pub fn user(&self) -> &Participant {
        &self.user
    }

    // -- room lifecycle ------------------------------------------------------

    /// Create a room seeded with `document` and start streaming from it.
    /// Returns the new room id, or `None` if the server declined.
    pub async fn create_room(&self, document: &MindmapNode) -> Option<String> {
        self.close_stream();
        match self.transport.create_room(document, &self.user).await {
            Some(response) => {
                let room_id = response.room.room_id;
                if let Ok(mut st) = self.state.lock() {
                    st.reset();
                    st.room_id = Some(room_id.clone());
                    st.participants = response
                        .participants
                        .into_iter()
                        .filter(|p| p.id != self.user.id)
                        .collect();
                }
                info!(room_id = %room_id, "room created");
                self.reopen_stream(&room_id);
                Some(room_id)
            }
            None => {
                if let Ok(mut st) = self.state.lock() {
                    st.error = Some("Failed to create room".to_string());
                }
                None
            }
        }
    }

    /// Join an existing room. `room_id` is recorded when the attempt starts,
    /// so state reflects the membership being negotiated even if the server
    /// turns us down.
    pub async fn join_room(&self, room_id: &str) -> bool {
        self.close_stream();
        if let Ok(mut st) = self.state.lock() {
            st.reset();
            st.room_id = Some(room_id.to_string());
        }

        match self.transport.join_room(room_id, &self.user).await {
            Some(response) => {
                if let Ok(mut st) = self.state.lock() {
                    st.participants = response
                        .participants
                        .into_iter()
                        .filter(|p| p.id != self.user.id)
                        .collect();
                    if let Some(version) = response.version {
                        st.version = version;
                    }
                }
                if let Some(doc) = response.mindmap {
                    self.callbacks.document(doc);
                }
                info!(room_id, user_id = %self.user.id, "joined room");
                self.reopen_stream(room_id);
                true
            }
            None => {
                if let Ok(mut st) = self.state.lock() {
                    st.error = Some("Failed to join room".to_string());
                }
                false
            }
        }
    }

    /// Leave the current room. The server notify is best-effort; the stream
    /// teardown and state reset happen regardless of its outcome.
    pub async fn leave_room(&self) {
        let room_id = self.state.lock().ok().and_then(|st| st.room_id.clone());

        self.close_stream();
        if let Some(room_id) = &room_id {
            self.transport.leave_room(room_id, &self.user.id).await;
            info!(room_id = %room_id, "left room");
        }
        if let Ok(mut st) = self.state.lock() {
            st.reset();
        }
    }

    // -- presence ------------------------------------------------------------

    /// Record a local cursor sample; throttled broadcast.
    pub fn update_cursor(&self, x: f64, y: f64) {
        self.presence.update_cursor(x, y);
    }

    /// Broadcast the local node selection, or clear it with `None`.
    pub async fn select_node(&self, node_id: Option<&str>) {
        self.presence.select_node(node_id).await;
    }

    // -- node mutations ------------------------------------------------------

    pub async fn add_node(&self, node: MindmapNode, parent_id: impl Into<String>) -> bool {
        self.mutate(NodeOp::Add { node, parent_id: parent_id.into() }).await
    }

    pub async fn update_node(&self, node_id: impl Into<String>, changes: serde_json::Value) -> bool {
        self.mutate(NodeOp::Update { node_id: node_id.into(), changes }).await
    }

    pub async fn delete_node(&self, node_id: impl Into<String>) -> bool {
        self.mutate(NodeOp::Delete { node_id: node_id.into() }).await
    }

    pub async fn move_node(
        &self,
        node_id: impl Into<String>,
        new_parent_id: impl Into<String>,
    ) -> bool {
        self.mutate(NodeOp::Move {
            node_id: node_id.into(),
            new_parent_id: new_parent_id.into(),
        })
        .await
    }

    async fn mutate(&self, op: NodeOp) -> bool {
        let Some(room_id) = self.state.lock().ok().and_then(|st| st.room_id.clone()) else {
            warn!(action = op.action(), "node mutation outside a room, ignored");
            return false;
        };
        self.transport.mutate_node(&room_id, &self.user.id, op).await
    }

    // -- stream plumbing -----------------------------------------------------

    fn reopen_stream(&self, room_id: &str) {
        let handle = open_stream(
            self.transport.clone(),
            room_id.to_string(),
            self.user.id.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.callbacks),
            self.stream_config.clone(),
        );
        if let Ok(mut slot) = self.stream.lock() {
            // Replacing the slot drops (and aborts) any previous handle.
            *slot = Some(handle);
        }
    }

    fn close_stream(&self) {
        if let Ok(mut slot) = self.stream.lock() {
            if let Some(handle) = slot.take() {
                handle.close();
            }
        }
    }
}

impl Drop for CollabSession {
    fn drop(&mut self) {
        self.close_stream();
    }
}
