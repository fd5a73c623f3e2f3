//! Presence fan-out: cursor and selection broadcasts to the room.
//!
//! Cursor samples arrive at pointer-move frequency, far faster than peers
//! need them. The broadcaster throttles them on the trailing edge: the first
//! sample in a quiet window arms a 50ms timer, later samples in the window
//! only overwrite the pending coordinates, and when the timer fires the
//! latest pair is sent. Selection changes are rare and discrete and go out
//! immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::transport::TransportClient;
use crate::SharedState;

/// Trailing-edge window for cursor broadcasts.
pub const CURSOR_THROTTLE: Duration = Duration::from_millis(50);

/// Broadcasts the local user's presence. Cheap to clone; clones share the
/// pending-cursor slot so the throttle holds across them.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    transport: TransportClient,
    state: SharedState,
    self_id: String,
    throttle: Duration,
    pending: Arc<Mutex<Option<(f64, f64)>>>,
}

impl PresenceBroadcaster {
    pub fn new(transport: TransportClient, state: SharedState, self_id: impl Into<String>) -> Self {
        Self::with_throttle(transport, state, self_id, CURSOR_THROTTLE)
    }

    pub fn with_throttle(
        transport: TransportClient,
        state: SharedState,
        self_id: impl Into<String>,
        throttle: Duration,
    ) -> Self {
        PresenceBroadcaster {
            transport,
            state,
            self_id: self_id.into(),
            throttle,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Record a cursor sample. At most one network call is made per throttle
    /// window, carrying whatever sample arrived last.
    pub fn update_cursor(&self, x: f64, y: f64) {
        let armed = match self.pending.lock() {
            Ok(mut slot) => {
                let was_empty = slot.is_none();
                *slot = Some((x, y));
                was_empty
            }
            Err(_) => return,
        };
        if !armed {
            // A timer is already running; it will pick up the new sample.
            return;
        }

        let broadcaster = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(broadcaster.throttle).await;
            broadcaster.flush_cursor().await;
        });
    }

    async fn flush_cursor(&self) {
        let sample = match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => return,
        };
        let Some((x, y)) = sample else { return };

        // Room membership is read at send time, not at sample time: a flush
        // that fires after leave has nowhere to go and is dropped.
        let Some(room_id) = self.current_room() else {
            debug!("cursor flush with no room, dropped");
            return;
        };
        self.transport.send_cursor(&room_id, &self.self_id, x, y).await;
    }

    /// Broadcast the local selection, or clear it with `None`. Not throttled.
    pub async fn select_node(&self, node_id: Option<&str>) {
        let Some(room_id) = self.current_room() else {
            debug!("selection update with no room, dropped");
            return;
        };
        self.transport.send_selection(&room_id, &self.self_id, node_id).await;
    }

    fn current_room(&self) -> Option<String> {
        self.state.lock().ok().and_then(|st| st.room_id.clone())
    }
}
