//! Event dispatch: a pure fold from `(event, state)` to the next state.
//!
//! The fold never performs I/O. Anything that requires the network — the
//! full-document refetch after a `node:*` event, or handing a `sync:full`
//! snapshot to the document callback — is returned as a [`DispatchEffect`]
//! for the stream connector to carry out.
//!
//! Hard rule: an event whose `userId` equals the local participant's id is
//! ignored, with one exception — `sync:full` always applies because it
//! carries authoritative truth and may legitimately list the local
//! participant in the roster.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::{CursorSample, MindmapNode, Participant, RoomEvent, SessionState};

/// Side effect requested by the fold. Carried out by the caller after the
/// state lock is released.
#[derive(Debug)]
pub enum DispatchEffect {
    /// Nothing beyond the state change.
    None,
    /// A node mutation was applied upstream: refetch the full document.
    Refetch,
    /// A `sync:full` event carried a snapshot: hand it to the document
    /// callback as-is.
    Document(MindmapNode),
}

#[derive(Deserialize)]
struct UserPayload {
    user: Participant,
}

#[derive(Deserialize)]
struct CursorPayload {
    cursor: CursorPoint,
}

#[derive(Deserialize)]
struct CursorPoint {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct SelectPayload {
    #[serde(rename = "nodeId", default)]
    node_id: Option<String>,
}

#[derive(Deserialize)]
struct SyncPayload {
    #[serde(default)]
    participants: Vec<Participant>,
    #[serde(default)]
    mindmap: Option<MindmapNode>,
    #[serde(default)]
    version: Option<u64>,
}

/// Fold one inbound event into session state.
///
/// Unknown event kinds and malformed payloads are no-ops: a bad event must
/// never take down the stream that delivered it.
pub fn apply_event(state: &mut SessionState, self_id: &str, event: &RoomEvent) -> DispatchEffect {
    // Self-originated events are echoes of our own actions; state for them
    // was already applied locally or will arrive via refetch.
    if event.user_id == self_id && event.kind != "sync:full" {
        return DispatchEffect::None;
    }

    match event.kind.as_str() {
        "user:online" | "user:join" => {
            match serde_json::from_value::<UserPayload>(event.data.clone()) {
                Ok(payload) => state.upsert_participant(payload.user),
                Err(err) => warn!(kind = %event.kind, error = %err, "dropping malformed event"),
            }
            DispatchEffect::None
        }

        "user:offline" | "user:leave" => {
            state.remove_participant(&event.user_id);
            DispatchEffect::None
        }

        "user:cursor" => {
            match serde_json::from_value::<CursorPayload>(event.data.clone()) {
                Ok(payload) => {
                    // Presence for a participant we have never seen join is
                    // not displayed.
                    if let Some(p) = state.participant(&event.user_id) {
                        let sample = CursorSample {
                            x: payload.cursor.x,
                            y: payload.cursor.y,
                            name: p.name.clone(),
                            color: p.color.clone(),
                        };
                        state.cursors.insert(event.user_id.clone(), sample);
                    } else {
                        debug!(user_id = %event.user_id, "cursor for unknown participant dropped");
                    }
                }
                Err(err) => warn!(kind = %event.kind, error = %err, "dropping malformed event"),
            }
            DispatchEffect::None
        }

        "user:select" => {
            match serde_json::from_value::<SelectPayload>(event.data.clone()) {
                Ok(payload) => match payload.node_id {
                    Some(node_id) => {
                        state.selections.insert(event.user_id.clone(), node_id);
                    }
                    None => {
                        state.selections.remove(&event.user_id);
                    }
                },
                Err(err) => warn!(kind = %event.kind, error = %err, "dropping malformed event"),
            }
            DispatchEffect::None
        }

        "node:add" | "node:update" | "node:delete" | "node:move" => {
            if let Some(version) = event.version {
                state.version = version;
            }
            DispatchEffect::Refetch
        }

        "sync:full" => {
            match serde_json::from_value::<SyncPayload>(event.data.clone()) {
                Ok(payload) => {
                    state.participants =
                        payload.participants.into_iter().filter(|p| p.id != self_id).collect();
                    // The sync roster is authoritative for presence too:
                    // cursors and selections for anyone it no longer lists
                    // (self included) are dropped.
                    let roster: HashSet<&str> =
                        state.participants.iter().map(|p| p.id.as_str()).collect();
                    state.cursors.retain(|id, _| roster.contains(id.as_str()));
                    state.selections.retain(|id, _| roster.contains(id.as_str()));
                    if let Some(version) = event.version.or(payload.version) {
                        state.version = version;
                    }
                    match payload.mindmap {
                        Some(doc) => DispatchEffect::Document(doc),
                        None => DispatchEffect::None,
                    }
                }
                Err(err) => {
                    warn!(kind = %event.kind, error = %err, "dropping malformed event");
                    DispatchEffect::None
                }
            }
        }

        other => {
            debug!(kind = %other, "ignoring unrecognized event");
            DispatchEffect::None
        }
    }
}


#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        // Self-originated events never touch roster or presence, whatever
        // their kind, version, or payload — except sync:full.
        #[test]
        fn self_filter_holds_for_any_event(
            kind in "[a-z]{1,8}:[a-z]{1,8}",
            version in proptest::option::of(0u64..1_000_000),
            x in -1e6f64..1e6,
            y in -1e6f64..1e6,
        ) {
            prop_assume!(kind != "sync:full");

            let mut state = SessionState::new();
            state.upsert_participant(Participant {
                id: "peer".to_string(),
                name: "Peer".to_string(),
                avatar: String::new(),
                color: "#58a6ff".to_string(),
            });
            let before_roster = state.participants.len();
            let before_version = state.version;

            let event = RoomEvent {
                kind,
                user_id: "self".to_string(),
                version,
                data: json!({ "cursor": { "x": x, "y": y }, "nodeId": "n1" }),
            };
            let effect = apply_event(&mut state, "self", &event);

            prop_assert!(matches!(effect, DispatchEffect::None));
            prop_assert_eq!(state.participants.len(), before_roster);
            prop_assert!(state.cursors.is_empty());
            prop_assert!(state.selections.is_empty());
            prop_assert_eq!(state.version, before_version);
        }
    }
}
