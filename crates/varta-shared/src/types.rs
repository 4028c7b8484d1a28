use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LinkKind {
    #[serde(rename = "P2P", alias = "dm")]
    P2P,
    #[serde(rename = "GROUP", alias = "group")]
    Group,
}

/// A named communication channel with a fixed participant set.
///
/// The link id doubles as the relay room id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(alias = "id")]
    pub link_id: String,
    pub name: String,
    #[serde(alias = "type")]
    pub kind: LinkKind,
    #[serde(alias = "members")]
    pub participants: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AssetKind {
    #[default]
    #[serde(rename = "TEXT", alias = "text")]
    Text,
    #[serde(rename = "FILE", alias = "file", alias = "image", alias = "video")]
    File,
}

impl AssetKind {
    /// Interpret the relay's optional `assetType` field. Unknown values are
    /// treated as file references, absence as text.
    pub fn from_wire(asset_type: Option<&str>) -> Self {
        match asset_type {
            None => AssetKind::Text,
            Some(t) if t.eq_ignore_ascii_case("text") => AssetKind::Text,
            Some(_) => AssetKind::File,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            AssetKind::Text => "TEXT",
            AssetKind::File => "FILE",
        }
    }
}

/// An atomic message in a link's archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pulse {
    pub id: String,
    pub link_id: String,
    pub origin_id: String,
    pub origin_name: String,
    pub body: String,
    pub timestamp: i64,
    #[serde(default)]
    pub asset_kind: AssetKind,
}

impl Pulse {
    /// Allocate a pulse id of the form `P-<epoch_ms>-<3 digits>`.
    pub fn new_id(now_ms: i64) -> String {
        let salt: u16 = rand::thread_rng().gen_range(100..=999);
        format!("P-{now_ms}-{salt}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_id_format() {
        let id = Pulse::new_id(1_700_000_000_000);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "P");
        assert_eq!(parts[1], "1700000000000");
        assert_eq!(parts[2].len(), 3);
        assert!(parts[2].parse::<u16>().is_ok());
    }

    #[test]
    fn test_asset_kind_from_wire() {
        assert_eq!(AssetKind::from_wire(None), AssetKind::Text);
        assert_eq!(AssetKind::from_wire(Some("text")), AssetKind::Text);
        assert_eq!(AssetKind::from_wire(Some("TEXT")), AssetKind::Text);
        assert_eq!(AssetKind::from_wire(Some("image")), AssetKind::File);
        assert_eq!(AssetKind::from_wire(Some("FILE")), AssetKind::File);
    }

    #[test]
    fn test_link_accepts_legacy_room_shape() {
        let raw = r#"{"id":"dm_a_b","name":"b","description":"P2P Link","type":"dm","members":["a","b"]}"#;
        let link: Link = serde_json::from_str(raw).unwrap();
        assert_eq!(link.link_id, "dm_a_b");
        assert_eq!(link.kind, LinkKind::P2P);
        assert_eq!(link.participants.len(), 2);
    }
}
