//! Presence and relay connectivity commands.

use serde::Serialize;
use tracing::info;

use varta_shared::{now_millis, Identity};

use crate::node::Node;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    pub id: String,
    pub display_name: String,
    pub avatar_ref: String,
    pub last_seen: i64,
    pub seen_secs_ago: i64,
}

impl NodeDto {
    fn at(identity: Identity, now_ms: i64) -> Self {
        Self {
            seen_secs_ago: (now_ms - identity.last_seen).max(0) / 1000,
            id: identity.id,
            display_name: identity.display_name,
            avatar_ref: identity.avatar_ref,
            last_seen: identity.last_seen,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDto {
    pub connected: bool,
    pub session_id: Option<String>,
    pub rooms: Vec<String>,
    pub live_nodes: usize,
}

/// Ask `target_id` to identify itself. The answer arrives as `NODE_FOUND`.
pub fn probe(node: &Node, target_id: &str) -> Result<(), String> {
    let target_id = target_id.trim();
    if target_id.is_empty() {
        return Err("Target id must not be empty".into());
    }
    if target_id == node.identity().id {
        return Err("Cannot probe yourself".into());
    }
    if !node.channel().is_connected() {
        return Err("Relay not connected".into());
    }

    info!(target = %target_id, "Probing node");
    node.presence().probe(target_id);
    Ok(())
}

/// Nodes heard from within the liveness window.
pub fn live_nodes(node: &Node) -> Vec<NodeDto> {
    let now = now_millis();
    node.presence()
        .live_nodes_at(now)
        .into_iter()
        .map(|identity| NodeDto::at(identity, now))
        .collect()
}

pub fn status(node: &Node) -> StatusDto {
    StatusDto {
        connected: node.channel().is_connected(),
        session_id: node.channel().session_id(),
        rooms: node.channel().known_rooms(),
        live_nodes: node.presence().live_nodes().len(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ClientConfig;
    use varta_store::MemoryStore;

    fn node() -> Node {
        Node::new(
            Identity::with_id("LIA-A", "ada"),
            &ClientConfig::default(),
            Arc::new(MemoryStore::new()),
            None,
        )
    }

    #[test]
    fn test_probe_requires_connection_and_target() {
        let node = node();
        assert!(probe(&node, "").is_err());
        assert!(probe(&node, "LIA-A").is_err());
        assert_eq!(probe(&node, "LIA-B"), Err("Relay not connected".to_string()));
    }

    #[test]
    fn test_live_nodes_reports_age() {
        let node = node();
        let now = now_millis();
        node.presence().observe(Identity::with_id("LIA-B", "bob"), now - 3_000);
        node.presence().observe(Identity::with_id("LIA-C", "cy"), now - 60_000);

        let live = live_nodes(&node);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "LIA-B");
        assert!(live[0].seen_secs_ago >= 3);

        let status = status(&node);
        assert!(!status.connected);
        assert_eq!(status.live_nodes, 1);
    }
}
