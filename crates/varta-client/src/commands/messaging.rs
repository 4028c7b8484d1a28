use serde::Serialize;

use varta_shared::{AssetKind, Pulse};

use crate::node::Node;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseDto {
    pub id: String,
    pub link_id: String,
    pub origin_id: String,
    pub origin_name: String,
    pub body: String,
    pub timestamp: String,
    pub asset_kind: AssetKind,
}

impl From<Pulse> for PulseDto {
    fn from(p: Pulse) -> Self {
        let timestamp = chrono::DateTime::from_timestamp_millis(p.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        Self {
            id: p.id,
            link_id: p.link_id,
            origin_id: p.origin_id,
            origin_name: p.origin_name,
            body: p.body,
            timestamp,
            asset_kind: p.asset_kind,
        }
    }
}

/// Send `content` to a link the node belongs to.
pub fn send_message(
    node: &Node,
    link_id: &str,
    content: &str,
    asset_kind: AssetKind,
) -> Result<PulseDto, String> {
    if content.trim().is_empty() {
        return Err("Message must not be empty".into());
    }
    if !node.registry().contains(link_id) {
        return Err(format!("Unknown link: {link_id}"));
    }

    let pulse = node
        .archive()
        .dispatch(node.identity(), link_id, content, asset_kind);
    Ok(pulse.into())
}

/// The last `limit` pulses of a link, oldest first.
pub fn get_messages(node: &Node, link_id: &str, limit: usize) -> Result<Vec<PulseDto>, String> {
    if !node.registry().contains(link_id) {
        return Err(format!("Unknown link: {link_id}"));
    }

    let history = node.archive().history(link_id);
    let skip = history.len().saturating_sub(limit);
    Ok(history.into_iter().skip(skip).map(PulseDto::from).collect())
}
