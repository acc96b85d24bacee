//! Typed shapes of the bridge's REST payloads.
//!
//! The bridge answers with dict-shaped JSON keyed by object id. Only the
//! fields huevoice reads are modelled; everything else is ignored.

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::resolver::Catalog;

/// Error type reported when the API key is not (or no longer) whitelisted
pub const ERROR_UNAUTHORIZED_USER: u16 = 1;

/// Error type reported while the link button has not been pressed yet
pub const ERROR_LINK_BUTTON_NOT_PRESSED: u16 = 101;

/// Address and access key for one bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCredential {
    pub bridge_ip: String,
    pub api_key: String,
}

/// A room or zone as listed by `GET /groups`
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub name: String,
}

/// All groups known to the bridge, keyed by group id in the order reported
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct GroupSnapshot {
    pub groups: IndexMap<String, Group>,
}

impl GroupSnapshot {
    /// Room display name → group id. A repeated name keeps the last id the
    /// bridge reported.
    pub fn rooms(&self) -> Catalog {
        self.groups
            .iter()
            .map(|(id, group)| (group.name.clone(), id.clone()))
            .collect()
    }
}

/// A stored scene as listed by `GET /scenes`
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub name: String,

    /// Group the scene belongs to; absent for legacy light scenes
    #[serde(default)]
    pub group: Option<String>,
}

/// All scenes known to the bridge, keyed by scene id in the order reported
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SceneSnapshot {
    pub scenes: IndexMap<String, Scene>,
}

impl SceneSnapshot {
    /// Scene display name → scene id, restricted to scenes of one group
    pub fn scenes_for_room(&self, group_id: &str) -> Catalog {
        self.scenes
            .iter()
            .filter(|(_, scene)| scene.group.as_deref() == Some(group_id))
            .map(|(id, scene)| (scene.name.clone(), id.clone()))
            .collect()
    }
}

/// Body of `PUT /groups/<id>/action`. Unset fields are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
}

impl GroupState {
    pub fn power(on: bool) -> Self {
        Self {
            on: Some(on),
            ..Self::default()
        }
    }

    /// Switch on at the given bridge-scale brightness
    pub fn brightness(bri: u8) -> Self {
        Self {
            on: Some(true),
            bri: Some(bri),
            scene: None,
        }
    }

    pub fn scene(scene_id: impl Into<String>) -> Self {
        Self {
            scene: Some(scene_id.into()),
            ..Self::default()
        }
    }
}

/// Last action applied to a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupAction {
    #[serde(default)]
    pub on: Option<bool>,

    #[serde(default)]
    pub bri: Option<u8>,
}

/// Response of `GET /groups/<id>/`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupStatus {
    #[serde(default)]
    pub action: GroupAction,
}

/// Error detail carried in an `{"error": {...}}` reply entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: u16,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub description: String,
}

/// One entry of the array the bridge returns for writes and errors
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeReply {
    Success(serde_json::Value),
    Error(ApiError),
}

impl BridgeReply {
    /// The `username` handed out by a successful pairing request
    pub fn username(&self) -> Option<&str> {
        match self {
            BridgeReply::Success(value) => value.get("username").and_then(|v| v.as_str()),
            BridgeReply::Error(_) => None,
        }
    }
}

/// Entry of the discovery endpoint's bridge list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveredBridge {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(rename = "internalipaddress")]
    pub internal_ip_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUPS: &str = r#"{
        "1": {"name": "Living Room", "lights": ["1", "2"], "type": "Room"},
        "2": {"name": "Kitchen", "lights": ["3"], "type": "Room"},
        "3": {"name": "Kitchen", "lights": ["4"], "type": "Zone"}
    }"#;

    const SCENES: &str = r#"{
        "abc": {"name": "Relax", "group": "1", "type": "GroupScene"},
        "def": {"name": "Concentrate", "group": "1", "type": "GroupScene"},
        "ghi": {"name": "Relax", "group": "2", "type": "GroupScene"},
        "jkl": {"name": "Old scene", "type": "LightScene"}
    }"#;

    #[test]
    fn test_rooms_last_duplicate_wins() {
        let snapshot: GroupSnapshot = serde_json::from_str(GROUPS).unwrap();
        let rooms = snapshot.rooms();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms.id("Living Room"), Some("1"));
        assert_eq!(rooms.id("Kitchen"), Some("3"));
    }

    #[test]
    fn test_rooms_follow_reported_order() {
        let snapshot: GroupSnapshot = crate::bridge::client::decode(
            br#"{"2": {"name": "Kitchen"}, "10": {"name": "Kitchen"}, "3": {"name": "Office"}}"#,
        )
        .unwrap();

        let ids: Vec<&str> = snapshot.groups.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["2", "10", "3"]);
        assert_eq!(snapshot.rooms().id("Kitchen"), Some("10"));
    }

    #[test]
    fn test_scenes_filtered_by_room() {
        let snapshot: SceneSnapshot = serde_json::from_str(SCENES).unwrap();

        let living = snapshot.scenes_for_room("1");
        assert_eq!(living.len(), 2);
        assert_eq!(living.id("Relax"), Some("abc"));
        assert_eq!(living.id("Concentrate"), Some("def"));

        let kitchen = snapshot.scenes_for_room("2");
        assert_eq!(kitchen.id("Relax"), Some("ghi"));

        assert!(snapshot.scenes_for_room("9").is_empty());
    }

    #[test]
    fn test_group_state_payloads() {
        insta::assert_snapshot!(serde_json::to_string(&GroupState::power(true)).unwrap(), @r#"{"on":true}"#);
        insta::assert_snapshot!(serde_json::to_string(&GroupState::power(false)).unwrap(), @r#"{"on":false}"#);
        insta::assert_snapshot!(serde_json::to_string(&GroupState::brightness(127)).unwrap(), @r#"{"on":true,"bri":127}"#);
        insta::assert_snapshot!(serde_json::to_string(&GroupState::scene("abc")).unwrap(), @r#"{"scene":"abc"}"#);
    }

    #[test]
    fn test_group_status() {
        let status: GroupStatus = serde_json::from_str(
            r#"{"name": "Living Room", "action": {"on": true, "bri": 200, "hue": 8418}}"#,
        )
        .unwrap();
        assert_eq!(status.action.bri, Some(200));
        assert_eq!(status.action.on, Some(true));
    }

    #[test]
    fn test_bridge_replies() {
        let replies: Vec<BridgeReply> = serde_json::from_str(
            r#"[
                {"success": {"username": "83b7780291a6ceffbe0bd049104df"}},
                {"error": {"type": 101, "address": "", "description": "link button not pressed"}}
            ]"#,
        )
        .unwrap();

        assert_eq!(replies[0].username(), Some("83b7780291a6ceffbe0bd049104df"));
        match &replies[1] {
            BridgeReply::Error(e) => {
                assert_eq!(e.kind, ERROR_LINK_BUTTON_NOT_PRESSED);
                assert_eq!(e.description, "link button not pressed");
            }
            other => panic!("expected error reply, got {:?}", other),
        }
    }
}
