//! Link management commands.

use serde::Serialize;
use tracing::info;

use varta_shared::{Identity, Link, LinkKind};

use crate::node::Node;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkDto {
    pub id: String,
    pub name: String,
    pub kind: LinkKind,
    pub participants: Vec<String>,
    pub description: String,
    pub pulses: usize,
}

impl LinkDto {
    fn new(link: Link, pulses: usize) -> Self {
        Self {
            id: link.link_id,
            name: link.name,
            kind: link.kind,
            participants: link.participants.into_iter().collect(),
            description: link.description,
            pulses,
        }
    }
}

fn to_dto(node: &Node, link: Link) -> LinkDto {
    let pulses = node.archive().history(&link.link_id).len();
    LinkDto::new(link, pulses)
}

pub fn list_links(node: &Node) -> Vec<LinkDto> {
    node.registry()
        .list()
        .into_iter()
        .map(|link| to_dto(node, link))
        .collect()
}

/// Open a P2P link with `target_id` and invite them into it.
///
/// The remote display name comes from the directory when the node has been
/// heard from; otherwise the id stands in for it.
pub fn quick_handshake(node: &Node, target_id: &str) -> Result<LinkDto, String> {
    let target_id = target_id.trim();
    if target_id.is_empty() {
        return Err("Target id must not be empty".into());
    }

    let remote = node
        .presence()
        .directory()
        .get(target_id)
        .cloned()
        .unwrap_or_else(|| Identity::with_id(target_id, target_id));

    let link = node
        .registry()
        .quick_handshake(node.identity(), &remote, node.presence())
        .map_err(|e| e.to_string())?;
    Ok(to_dto(node, link))
}

/// Create a group link with the local identity plus `members`.
pub fn create_group(node: &Node, name: &str, members: &[String]) -> Result<LinkDto, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Group name must not be empty".into());
    }

    let link = node
        .registry()
        .create(LinkKind::Group, name, members.iter().cloned())
        .map_err(|e| e.to_string())?;

    // Members learn about the group through an invite, like P2P links.
    for member in link.participants.iter().filter(|m| **m != node.identity().id) {
        node.presence().invite(member, &link);
    }

    info!(link = %link.link_id, members = link.participants.len(), "Group created");
    Ok(to_dto(node, link))
}

pub fn join_link(node: &Node, link_id: &str, name: &str) -> Result<LinkDto, String> {
    let link = node
        .registry()
        .join_by_id(link_id, name)
        .map_err(|e| e.to_string())?;
    Ok(to_dto(node, link))
}

/// Accept a pending invite.
pub fn accept_invite(node: &Node, link_id: &str) -> Result<LinkDto, String> {
    let link = node
        .take_invite(link_id.trim())
        .ok_or_else(|| format!("No pending invite for {link_id}"))?;
    let link = node
        .registry()
        .accept_invite(link)
        .map_err(|e| e.to_string())?;
    Ok(to_dto(node, link))
}

pub fn pending_invites(node: &Node) -> Vec<LinkDto> {
    node.pending_invites()
        .into_iter()
        .map(|link| LinkDto::new(link, 0))
        .collect()
}

/// Forget a link, leave its room and drop its archive.
pub fn remove_link(node: &Node, link_id: &str) -> Result<usize, String> {
    node.registry().remove(link_id).map_err(|e| e.to_string())?;
    let dropped = node.archive().clear_link(link_id);
    info!(link = %link_id, pulses = dropped, "Link and archive removed");
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ClientConfig;
    use varta_shared::{now_millis, AssetKind};
    use varta_store::MemoryStore;

    fn node(auto_accept: bool) -> Node {
        let config = ClientConfig {
            auto_accept_invites: auto_accept,
            ..ClientConfig::default()
        };
        Node::new(
            Identity::with_id("LIA-A", "ada"),
            &config,
            Arc::new(MemoryStore::new()),
            None,
        )
    }

    #[test]
    fn test_quick_handshake_uses_directory_name() {
        let node = node(true);
        node.presence()
            .observe(Identity::with_id("LIA-B", "bob"), now_millis());

        let link = quick_handshake(&node, "LIA-B").unwrap();
        assert_eq!(link.id, "dm_LIA-A_LIA-B");
        assert_eq!(link.name, "bob");
        assert_eq!(link.kind, LinkKind::P2P);

        let unknown = quick_handshake(&node, "LIA-Z").unwrap();
        assert_eq!(unknown.name, "LIA-Z");
        assert!(quick_handshake(&node, "LIA-A").is_err());
    }

    #[test]
    fn test_group_lifecycle() {
        let node = node(true);
        let group = create_group(&node, "squad", &["LIA-B".to_string()]).unwrap();
        assert!(group.id.starts_with("gid_"));
        assert_eq!(group.participants, vec!["LIA-A".to_string(), "LIA-B".to_string()]);
        assert!(create_group(&node, " ", &[]).is_err());

        node.archive()
            .dispatch(node.identity(), &group.id, "hi", AssetKind::Text);
        assert_eq!(list_links(&node)[0].pulses, 1);

        assert_eq!(remove_link(&node, &group.id), Ok(1));
        assert!(list_links(&node).is_empty());
        assert!(remove_link(&node, &group.id).is_err());
    }

    #[test]
    fn test_accept_requires_pending_invite() {
        let node = node(false);
        assert!(accept_invite(&node, "dm_LIA-A_LIA-B").is_err());
        assert!(pending_invites(&node).is_empty());
    }

    #[test]
    fn test_join_link() {
        let node = node(true);
        let link = join_link(&node, "gid_deadbeef", "ops").unwrap();
        assert_eq!(link.name, "ops");
        assert!(join_link(&node, "", "ops").is_err());
    }
}
