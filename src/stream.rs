//! Server-push event stream: one long-lived SSE connection per room
//! membership, with bounded automatic reconnection.
//!
//! State machine: connecting → connected → {error → connecting (retry) |
//! closed}. A transport failure surfaces "Connection lost" and schedules a
//! reconnect after `attempt × base_delay`; once the retry budget is spent
//! the session stays in error until the caller reconnects explicitly.

use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::dispatch::{apply_event, DispatchEffect};
use crate::session::SessionCallbacks;
use crate::transport::TransportClient;
use crate::{RoomEvent, SessionState, SharedState};

/// Error string surfaced for every stream failure mode.
pub const ERROR_CONNECTION_LOST: &str = "Connection lost";

/// Reconnection policy. Tests shrink the delay; production uses the default.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Backoff unit: the nth retry waits `n × base_delay`.
    pub base_delay: Duration,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig { base_delay: Duration::from_secs(2), max_attempts: 5 }
    }
}

/// Owner of the live stream task. Exactly one handle exists per room
/// membership; dropping or closing it aborts the connection, so a leaked
/// second connection cannot outlive its session.
pub struct StreamHandle {
    task: tokio::task::JoinHandle<()>,
}

impl StreamHandle {
    pub fn close(&self) {
        self.task.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Open the event stream for `room_id` and supervise it until the handle is
/// closed or the retry budget runs out.
pub fn open_stream(
    transport: TransportClient,
    room_id: String,
    self_id: String,
    state: SharedState,
    callbacks: Arc<SessionCallbacks>,
    config: StreamConfig,
) -> StreamHandle {
    let task = tokio::spawn(run_stream(transport, room_id, self_id, state, callbacks, config));
    StreamHandle { task }
}

async fn run_stream(
    transport: TransportClient,
    room_id: String,
    self_id: String,
    state: SharedState,
    callbacks: Arc<SessionCallbacks>,
    config: StreamConfig,
) {
    // A per-request total timeout would cut the long-lived stream, so this
    // client only bounds the connect phase.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(3))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let url = format!("{}/rooms/{}/events?userId={}", transport.base_url(), room_id, self_id);
    let mut attempt: u32 = 0;

    loop {
        with_state(&state, |st| {
            st.connecting = true;
            st.connected = false;
        });

        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(room_id = %room_id, "event stream connected");
                attempt = 0;
                with_state(&state, |st| {
                    st.connecting = false;
                    st.connected = true;
                    st.error = None;
                });

                read_events(&transport, &room_id, &self_id, &state, &callbacks, response).await;

                // Stream ended or errored while we were connected.
                with_state(&state, |st| {
                    st.connected = false;
                    st.error = Some(ERROR_CONNECTION_LOST.to_string());
                });
            }
            Ok(response) => {
                warn!(room_id = %room_id, status = response.status().as_u16(), "event stream rejected");
                with_state(&state, |st| {
                    st.connecting = false;
                    st.error = Some(ERROR_CONNECTION_LOST.to_string());
                });
            }
            Err(err) => {
                warn!(room_id = %room_id, error = %err, "event stream connect failed");
                with_state(&state, |st| {
                    st.connecting = false;
                    st.error = Some(ERROR_CONNECTION_LOST.to_string());
                });
            }
        }

        attempt += 1;
        if attempt >= config.max_attempts {
            warn!(room_id = %room_id, attempts = attempt, "stream retry budget exhausted");
            with_state(&state, |st| {
                st.connecting = false;
                st.connected = false;
            });
            return;
        }
        tokio::time::sleep(config.base_delay * attempt).await;
    }
}

/// Drain the SSE body, folding each event into state. Returns when the
/// stream ends or errors.
async fn read_events(
    transport: &TransportClient,
    room_id: &str,
    self_id: &str,
    state: &SharedState,
    callbacks: &Arc<SessionCallbacks>,
    response: reqwest::Response,
) {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].to_string();
                    buffer.drain(..=line_end);

                    if let Some(json_str) = sse_data(&line) {
                        match serde_json::from_str::<RoomEvent>(json_str) {
                            Ok(event) => {
                                handle_event(transport, room_id, self_id, state, callbacks, event)
                            }
                            Err(err) => {
                                warn!(error = %err, "dropping malformed event payload")
                            }
                        }
                    }
                }
            }
            Some(Err(err)) => {
                warn!(room_id = %room_id, error = %err, "event stream transport error");
                return;
            }
            None => {
                info!(room_id = %room_id, "event stream closed by server");
                return;
            }
        }
    }
}

/// Fold one event and carry out its effect outside the state lock.
fn handle_event(
    transport: &TransportClient,
    room_id: &str,
    self_id: &str,
    state: &SharedState,
    callbacks: &Arc<SessionCallbacks>,
    event: RoomEvent,
) {
    let effect = match state.lock() {
        Ok(mut guard) => apply_event(&mut guard, self_id, &event),
        Err(_) => return,
    };

    match effect {
        DispatchEffect::None => {}
        DispatchEffect::Refetch => {
            // Runs off the stream task: rapid mutations may race their
            // refetches, and the last snapshot to arrive wins.
            let transport = transport.clone();
            let room = room_id.to_string();
            let callbacks = Arc::clone(callbacks);
            tokio::spawn(async move {
                if let Some(doc) = transport.fetch_document(&room).await {
                    callbacks.document(doc);
                }
            });
        }
        DispatchEffect::Document(doc) => callbacks.document(doc),
    }
}

/// Extract the payload of an SSE `data:` line. Comment lines (`:heartbeat`)
/// and blank separators yield `None`.
fn sse_data(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
}

fn with_state<F: FnOnce(&mut SessionState)>(state: &SharedState, f: F) {
    if let Ok(mut guard) = state.lock() {
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_shared_state;

    // -- sse_data ------------------------------------------------------------

    #[test]
    fn test_sse_data_strips_prefix() {
        assert_eq!(sse_data("data: {\"type\":\"x\"}"), Some("{\"type\":\"x\"}"));
    }

    #[test]
    fn test_sse_data_accepts_no_space_variant() {
        assert_eq!(sse_data("data:{\"a\":1}"), Some("{\"a\":1}"));
    }

    #[test]
    fn test_sse_data_ignores_comment_lines() {
        assert_eq!(sse_data(": heartbeat"), None);
        assert_eq!(sse_data(":keepalive"), None);
    }

    #[test]
    fn test_sse_data_ignores_blank_lines() {
        assert_eq!(sse_data(""), None);
        assert_eq!(sse_data("   "), None);
    }

    #[test]
    fn test_sse_data_ignores_other_fields() {
        assert_eq!(sse_data("event: message"), None);
        assert_eq!(sse_data("id: 42"), None);
    }

    #[test]
    fn test_sse_data_trims_carriage_return() {
        assert_eq!(sse_data("data: {\"a\":1}\r"), Some("{\"a\":1}"));
    }

    // -- config --------------------------------------------------------------

    #[test]
    fn test_default_config_matches_policy() {
        let config = StreamConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(2));
        assert_eq!(config.max_attempts, 5);
    }

    // -- reconnect bound -----------------------------------------------------

    #[tokio::test]
    async fn test_unreachable_server_exhausts_retries_and_stays_in_error() {
        let state = new_shared_state();
        // Port 1 is never listening; each connect fails immediately.
        let transport = TransportClient::new("http://127.0.0.1:1");
        let handle = open_stream(
            transport,
            "room-x".to_string(),
            "self".to_string(),
            Arc::clone(&state),
            Arc::new(SessionCallbacks::default()),
            StreamConfig { base_delay: Duration::from_millis(5), max_attempts: 3 },
        );

        // 3 attempts with 5/10ms backoffs finish well within a second.
        for _ in 0..200 {
            if handle.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.is_closed(), "stream task should give up after the budget");

        let guard = state.lock().unwrap();
        assert!(!guard.connected);
        assert!(!guard.connecting);
        assert_eq!(guard.error.as_deref(), Some(ERROR_CONNECTION_LOST));
    }
}
