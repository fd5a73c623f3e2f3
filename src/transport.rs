//! HTTP client for the authoritative room service.
//!
//! Every operation is a single round trip: no retries live here (the event
//! stream connector owns the only retry policy in the crate). Failures are
//! logged and collapsed to `None`/`false` for the caller — a room operation
//! must never panic or throw past the session façade.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::{MindmapNode, Participant};

/// Default TCP connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default per-request read timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomRef {
    #[serde(rename = "roomId")]
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomResponse {
    pub room: RoomRef,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinRoomResponse {
    #[serde(default)]
    pub mindmap: Option<MindmapNode>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    mindmap: MindmapNode,
}

// ---------------------------------------------------------------------------
// Node mutations
// ---------------------------------------------------------------------------

/// One node mutation submitted to the room service. Mutations are
/// fire-and-forget: the authoritative result comes back as a `node:*` event
/// on the room stream, which triggers a full-document refetch.
#[derive(Debug, Clone)]
pub enum NodeOp {
    Add { node: MindmapNode, parent_id: String },
    Update { node_id: String, changes: serde_json::Value },
    Delete { node_id: String },
    Move { node_id: String, new_parent_id: String },
}

impl NodeOp {
    pub fn action(&self) -> &'static str {
        match self {
            NodeOp::Add { .. } => "add_node",
            NodeOp::Update { .. } => "update_node",
            NodeOp::Delete { .. } => "delete_node",
            NodeOp::Move { .. } => "move_node",
        }
    }

    /// Build the room-action request body for this mutation.
    pub fn body(&self, user_id: &str) -> serde_json::Value {
        let mut body = match self {
            NodeOp::Add { node, parent_id } => json!({
                "node": node,
                "parentId": parent_id,
            }),
            NodeOp::Update { node_id, changes } => json!({
                "nodeId": node_id,
                "changes": changes,
            }),
            NodeOp::Delete { node_id } => json!({
                "nodeId": node_id,
            }),
            NodeOp::Move { node_id, new_parent_id } => json!({
                "nodeId": node_id,
                "newParentId": new_parent_id,
            }),
        };
        body["action"] = json!(self.action());
        body["user"] = json!({ "id": user_id });
        body
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TransportClient {
    client: reqwest::Client,
    base_url: String,
}

impl TransportClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeouts(base_url, CONNECT_TIMEOUT, REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "failed to build HTTP client with timeouts, using defaults");
                reqwest::Client::new()
            });
        TransportClient { client, base_url: base_url.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- room lifecycle ------------------------------------------------------

    /// `POST /rooms` — create a room seeded with `document`.
    pub async fn create_room(
        &self,
        document: &MindmapNode,
        user: &Participant,
    ) -> Option<CreateRoomResponse> {
        let url = format!("{}/rooms", self.base_url);
        let body = json!({
            "document": document,
            "user": { "id": user.id, "name": user.name, "avatar": user.avatar },
        });
        match self.post_json(url, body).await.and_then(decode::<CreateRoomResponse>) {
            Ok(resp) => Some(resp),
            Err(err) => {
                warn!(error = %err, "create room failed");
                None
            }
        }
    }

    /// `POST /rooms/{id}` with `action: "join"`.
    pub async fn join_room(&self, room_id: &str, user: &Participant) -> Option<JoinRoomResponse> {
        let url = format!("{}/rooms/{}", self.base_url, room_id);
        let body = json!({
            "action": "join",
            "user": { "id": user.id, "name": user.name, "avatar": user.avatar },
        });
        match self.post_json(url, body).await.and_then(decode::<JoinRoomResponse>) {
            Ok(resp) => Some(resp),
            Err(err) => {
                warn!(room_id, error = %err, "join room failed");
                None
            }
        }
    }

    /// `POST /rooms/{id}` with `action: "leave"`. Best-effort: a failed leave
    /// notification must never block session teardown, so the outcome is
    /// logged and swallowed.
    pub async fn leave_room(&self, room_id: &str, participant_id: &str) {
        let url = format!("{}/rooms/{}", self.base_url, room_id);
        let body = json!({
            "action": "leave",
            "user": { "id": participant_id },
        });
        if let Err(err) = self.post_json(url, body).await {
            warn!(room_id, error = %err, "leave notification failed");
        }
    }

    /// Submit one node mutation. Returns whether the service accepted it; the
    /// document change itself arrives later as a `node:*` stream event.
    pub async fn mutate_node(&self, room_id: &str, participant_id: &str, op: NodeOp) -> bool {
        let url = format!("{}/rooms/{}", self.base_url, room_id);
        let action = op.action();
        match self.post_json(url, op.body(participant_id)).await {
            Ok(_) => true,
            Err(err) => {
                warn!(room_id, action, error = %err, "node mutation failed");
                false
            }
        }
    }

    /// `GET /rooms/{id}` — fetch the full mindmap snapshot. Used as the
    /// conflict-resolution mechanism after every `node:*` event.
    pub async fn fetch_document(&self, room_id: &str) -> Option<MindmapNode> {
        let url = format!("{}/rooms/{}", self.base_url, room_id);
        let result = async {
            let response = self.client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Http { status: status.as_u16(), url });
            }
            let snapshot = response.json::<SnapshotResponse>().await?;
            Ok::<_, TransportError>(snapshot.mindmap)
        }
        .await;
        match result {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(room_id, error = %err, "document refetch failed");
                None
            }
        }
    }

    // -- presence ------------------------------------------------------------

    /// `POST /rooms/{id}/cursor` — fire-and-forget cursor sample. Stale
    /// presence self-heals on the next throttled update, so failures are
    /// only logged at debug level.
    pub async fn send_cursor(&self, room_id: &str, user_id: &str, x: f64, y: f64) {
        let url = format!("{}/rooms/{}/cursor", self.base_url, room_id);
        let body = json!({ "userId": user_id, "cursor": { "x": x, "y": y } });
        if let Err(err) = self.post_json(url, body).await {
            debug!(room_id, error = %err, "cursor update dropped");
        }
    }

    /// `POST /rooms/{id}/select` — fire-and-forget selection change. A `None`
    /// node id clears the selection.
    pub async fn send_selection(&self, room_id: &str, user_id: &str, node_id: Option<&str>) {
        let url = format!("{}/rooms/{}/select", self.base_url, room_id);
        let body = json!({ "userId": user_id, "nodeId": node_id });
        if let Err(err) = self.post_json(url, body).await {
            debug!(room_id, error = %err, "selection update dropped");
        }
    }

    // -- internals -----------------------------------------------------------

    async fn post_json(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http { status: status.as_u16(), url });
        }
        // Accept empty ack bodies as an empty object.
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, TransportError> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> MindmapNode {
        MindmapNode {
            id: id.to_string(),
            parent_id: None,
            content: "content".to_string(),
            children: vec![],
        }
    }

    // -- NodeOp request bodies -----------------------------------------------

    #[test]
    fn test_add_body_carries_node_and_parent() {
        let op = NodeOp::Add { node: node("n1"), parent_id: "root".to_string() };
        let body = op.body("u1");
        assert_eq!(body["action"], "add_node");
        assert_eq!(body["user"]["id"], "u1");
        assert_eq!(body["node"]["id"], "n1");
        assert_eq!(body["parentId"], "root");
    }

    #[test]
    fn test_update_body_carries_changes() {
        let op = NodeOp::Update {
            node_id: "n2".to_string(),
            changes: json!({ "content": "revised" }),
        };
        let body = op.body("u1");
        assert_eq!(body["action"], "update_node");
        assert_eq!(body["nodeId"], "n2");
        assert_eq!(body["changes"]["content"], "revised");
    }

    #[test]
    fn test_delete_body_minimal() {
        let op = NodeOp::Delete { node_id: "n3".to_string() };
        let body = op.body("u9");
        assert_eq!(body["action"], "delete_node");
        assert_eq!(body["nodeId"], "n3");
        assert_eq!(body["user"]["id"], "u9");
        assert!(body.get("node").is_none());
    }

    #[test]
    fn test_move_body_uses_camel_case_target() {
        let op = NodeOp::Move { node_id: "n4".to_string(), new_parent_id: "n9".to_string() };
        let body = op.body("u1");
        assert_eq!(body["action"], "move_node");
        assert_eq!(body["newParentId"], "n9");
    }

    #[test]
    fn test_action_names_cover_all_ops() {
        assert_eq!(NodeOp::Add { node: node("a"), parent_id: "r".into() }.action(), "add_node");
        assert_eq!(
            NodeOp::Update { node_id: "a".into(), changes: json!({}) }.action(),
            "update_node"
        );
        assert_eq!(NodeOp::Delete { node_id: "a".into() }.action(), "delete_node");
        assert_eq!(
            NodeOp::Move { node_id: "a".into(), new_parent_id: "b".into() }.action(),
            "move_node"
        );
    }

    // -- response parsing ----------------------------------------------------

    #[test]
    fn test_create_room_response_parses() {
        let json = r##"{
            "room": { "roomId": "room-42" },
            "participants": [{ "id": "u1", "name": "Ada", "avatar": "", "color": "#58a6ff" }]
        }"##;
        let resp: CreateRoomResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.room.room_id, "room-42");
        assert_eq!(resp.participants.len(), 1);
    }

    #[test]
    fn test_join_room_response_fields_all_optional() {
        let resp: JoinRoomResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.mindmap.is_none());
        assert!(resp.participants.is_empty());
        assert!(resp.version.is_none());
    }

    #[test]
    fn test_join_room_response_with_snapshot() {
        let json = r#"{
            "mindmap": { "id": "root", "content": "Topic", "children": [] },
            "participants": [
                { "id": "u1", "name": "Ada" },
                { "id": "u2", "name": "Lin" }
            ],
            "version": 5
        }"#;
        let resp: JoinRoomResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.mindmap.unwrap().id, "root");
        assert_eq!(resp.participants.len(), 2);
        assert_eq!(resp.version, Some(5));
    }

    #[test]
    fn test_client_exposes_base_url() {
        let client = TransportClient::new("http://localhost:9999");
        assert_eq!(client.base_url(), "http://localhost:9999");
    }
}
