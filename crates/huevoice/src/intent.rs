//! Voice intents as delivered by the dialogue engine.
//!
//! The dialogue engine publishes one JSON document per recognised utterance
//! on `hermes/intent/<intentName>`, e.g.:
//!
//! ```json
//! {
//!   "sessionId": "7c1d…",
//!   "siteId": "default",
//!   "intent": {"intentName": "user:setBrightness", "confidenceScore": 0.93},
//!   "slots": [
//!     {"slotName": "house_room", "rawValue": "kitchen", "value": {"kind": "Custom", "value": "kitchen"}},
//!     {"slotName": "percent", "rawValue": "fifty percent", "value": {"kind": "Percentage", "value": 50.0}}
//!   ]
//! }
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use strum::AsRefStr;
use strum::Display;
use strum::EnumString;

/// Slot carrying the spoken room name
pub const ROOM_SLOT: &str = "house_room";

/// Slot carrying a numeric percentage
pub const PERCENT_SLOT: &str = "percent";

/// Slot carrying the spoken scene name
pub const SCENE_SLOT: &str = "scene";

/// The intents this skill reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "camelCase")]
pub enum IntentKind {
    TurnOn,
    TurnOff,
    SetBrightness,
    SetScene,
    ShiftUp,
    ShiftDown,
}

impl IntentKind {
    /// Match an intent name, ignoring a `namespace:` prefix
    pub fn from_intent_name(name: &str) -> Option<Self> {
        let name = if name.contains(':') {
            name.split(':').nth(1).unwrap_or_default()
        } else {
            name
        };
        name.parse().ok()
    }
}

/// A typed slot value
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Text(String),
    Number(f64),
}

/// A recognised intent with its slots
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,

    /// Dialogue session to terminate once the intent is handled
    pub session_id: String,

    pub site_id: Option<String>,

    slots: HashMap<String, Vec<SlotValue>>,
}

impl Intent {
    pub fn new(kind: IntentKind, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            site_id: None,
            slots: HashMap::new(),
        }
    }

    /// Append a value to a slot
    pub fn with_slot(mut self, name: &str, value: SlotValue) -> Self {
        self.slots.entry(name.to_string()).or_default().push(value);
        self
    }

    pub fn with_text(self, name: &str, value: impl Into<String>) -> Self {
        self.with_slot(name, SlotValue::Text(value.into()))
    }

    pub fn with_number(self, name: &str, value: f64) -> Self {
        self.with_slot(name, SlotValue::Number(value))
    }

    /// First value of a slot, if it was filled
    pub fn first(&self, name: &str) -> Option<&SlotValue> {
        self.slots.get(name).and_then(|values| values.first())
    }

    /// First value of a slot as text
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.first(name)? {
            SlotValue::Text(s) => Some(s),
            SlotValue::Number(_) => None,
        }
    }

    /// First value of a slot as a number
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.first(name)? {
            SlotValue::Number(n) => Some(*n),
            SlotValue::Text(_) => None,
        }
    }

    /// Parse a Hermes intent payload
    ///
    /// Returns `Ok(None)` for intents this skill does not handle.
    pub fn from_hermes(payload: &[u8]) -> Result<Option<Self>, IntentError> {
        let message: IntentMessage = serde_json::from_slice(payload)?;

        let Some(kind) = IntentKind::from_intent_name(&message.intent.intent_name) else {
            tracing::debug!("Ignoring intent {}", message.intent.intent_name);
            return Ok(None);
        };

        let mut intent = Intent::new(kind, message.session_id);
        intent.site_id = message.site_id;

        for slot in message.slots {
            match slot.value.into_slot_value() {
                Some(value) => intent = intent.with_slot(&slot.slot_name, value),
                None => tracing::debug!(
                    "Skipping slot {} of unsupported shape ({:?})",
                    slot.slot_name,
                    slot.raw_value
                ),
            }
        }

        Ok(Some(intent))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Malformed intent payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentMessage {
    session_id: String,

    #[serde(default)]
    site_id: Option<String>,

    intent: IntentClassifier,

    #[serde(default)]
    slots: Vec<SlotMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentClassifier {
    intent_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotMessage {
    slot_name: String,

    #[serde(default)]
    raw_value: Option<String>,

    value: RawSlotValue,
}

#[derive(Debug, Deserialize)]
struct RawSlotValue {
    #[allow(dead_code)]
    kind: String,

    #[serde(default)]
    value: serde_json::Value,
}

impl RawSlotValue {
    fn into_slot_value(self) -> Option<SlotValue> {
        // Custom slots carry strings; Number, Percentage and Ordinal carry floats
        match self.value {
            serde_json::Value::String(s) => Some(SlotValue::Text(s)),
            value => value.as_f64().map(SlotValue::Number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_names() {
        assert_eq!(IntentKind::from_intent_name("turnOn"), Some(IntentKind::TurnOn));
        assert_eq!(
            IntentKind::from_intent_name("snips-labs:shiftDown"),
            Some(IntentKind::ShiftDown)
        );
        assert_eq!(IntentKind::from_intent_name("user:setWeather"), None);
        assert_eq!(IntentKind::from_intent_name("TurnOn"), None);
        assert_eq!(IntentKind::SetBrightness.as_ref(), "setBrightness");
    }

    #[test]
    fn test_parse_hermes_payload() {
        let payload = br#"{
            "sessionId": "abc-123",
            "siteId": "kitchen-satellite",
            "input": "set the kitchen to fifty percent",
            "intent": {"intentName": "user:setBrightness", "confidenceScore": 0.93},
            "slots": [
                {"slotName": "house_room", "rawValue": "kitchen", "value": {"kind": "Custom", "value": "kitchen"}},
                {"slotName": "percent", "rawValue": "fifty percent", "value": {"kind": "Percentage", "value": 50.0}},
                {"slotName": "percent", "rawValue": "ten", "value": {"kind": "Number", "value": 10}}
            ]
        }"#;

        let intent = Intent::from_hermes(payload).unwrap().unwrap();
        assert_eq!(intent.kind, IntentKind::SetBrightness);
        assert_eq!(intent.session_id, "abc-123");
        assert_eq!(intent.site_id.as_deref(), Some("kitchen-satellite"));
        assert_eq!(intent.text(ROOM_SLOT), Some("kitchen"));
        assert_eq!(intent.number(PERCENT_SLOT), Some(50.0));
        assert_eq!(intent.text(SCENE_SLOT), None);
    }

    #[test]
    fn test_parse_skips_unsupported_slots() {
        let payload = br#"{
            "sessionId": "s",
            "intent": {"intentName": "turnOff"},
            "slots": [
                {"slotName": "duration", "value": {"kind": "Duration", "value": {"minutes": 5}}},
                {"slotName": "house_room", "value": {"kind": "Custom", "value": "office"}}
            ]
        }"#;

        let intent = Intent::from_hermes(payload).unwrap().unwrap();
        assert_eq!(intent.kind, IntentKind::TurnOff);
        assert!(intent.first("duration").is_none());
        assert_eq!(intent.text(ROOM_SLOT), Some("office"));
    }

    #[test]
    fn test_parse_ignores_other_intents() {
        let payload = br#"{"sessionId": "s", "intent": {"intentName": "user:playMusic"}, "slots": []}"#;
        assert!(Intent::from_hermes(payload).unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Intent::from_hermes(b"not json").is_err());
        assert!(Intent::from_hermes(br#"{"intent": {"intentName": "turnOn"}}"#).is_err());
    }
}
