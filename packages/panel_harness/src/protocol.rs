//! Control message codec.
//!
//! Every frame on the channel is one JSON object with a string `type` and an
//! optional object `data`. Anything else is rejected whole.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HarnessError, Result};
use crate::panel::PanelConfig;

pub const READY: &str = "ready";
pub const PANEL_BUTTON_CLICK: &str = "panel_button_click";
pub const PANEL: &str = "panel";
pub const QUIT: &str = "quit";
pub const ACTIVE: &str = "active";
pub const TOP: &str = "top";

/// The wire unit: `{ "type": ..., "data": {...}? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
    /// `null` and absent both read as `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl ControlMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
        }
    }

    pub fn with_data(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            data: Some(data),
        }
    }

    pub fn quit() -> Self {
        Self::new(QUIT)
    }

    pub fn active() -> Self {
        Self::new(ACTIVE)
    }

    pub fn top(enable: bool) -> Self {
        let mut data = Map::new();
        data.insert("enable".to_string(), Value::Bool(enable));
        Self::with_data(TOP, data)
    }

    pub fn panel(config: &PanelConfig) -> Result<Self> {
        match serde_json::to_value(config)? {
            Value::Object(data) => Ok(Self::with_data(PANEL, data)),
            other => Err(HarnessError::Config(format!(
                "panel layout serialized to {other}, expected an object"
            ))),
        }
    }

    /// Decode one channel frame.
    pub fn decode(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| HarnessError::protocol(e.to_string(), raw))?;
        // Derived struct impls also accept JSON arrays; frames must be objects.
        if !value.is_object() {
            return Err(HarnessError::protocol("message is not a JSON object", raw));
        }
        serde_json::from_value(value).map_err(|e| HarnessError::protocol(e.to_string(), raw))
    }

    /// Serialize for the channel.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Look up a string field inside `data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }
}

/// Inbound messages the dispatcher understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ready,
    PanelButtonClick { id: String },
    Other(String),
}

impl TryFrom<&ControlMessage> for Inbound {
    type Error = HarnessError;

    fn try_from(msg: &ControlMessage) -> Result<Self> {
        match msg.kind.as_str() {
            READY => Ok(Inbound::Ready),
            PANEL_BUTTON_CLICK => match msg.data_str("id") {
                Some(id) => Ok(Inbound::PanelButtonClick { id: id.to_string() }),
                None => Err(HarnessError::protocol(
                    "panel_button_click without string `data.id`",
                    msg.encode()?,
                )),
            },
            other => Ok(Inbound::Other(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::Button;
    use serde_json::json;

    #[test]
    fn decode_ready() {
        let msg = ControlMessage::decode(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(msg.kind, "ready");
        assert!(msg.data.is_none());
        assert_eq!(Inbound::try_from(&msg).unwrap(), Inbound::Ready);
    }

    #[test]
    fn decode_button_click() {
        let msg =
            ControlMessage::decode(r#"{"type":"panel_button_click","data":{"id":"quit"}}"#)
                .unwrap();
        assert_eq!(
            Inbound::try_from(&msg).unwrap(),
            Inbound::PanelButtonClick {
                id: "quit".to_string()
            }
        );
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = ControlMessage::decode("{not json").unwrap_err();
        match err {
            HarnessError::Protocol { raw, .. } => assert_eq!(raw, "{not json"),
            other => panic!("Expected Protocol, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_bad_shapes() {
        for raw in [
            "[1,2,3]",
            r#""ready""#,
            r#"{"data":{}}"#,
            r#"{"type":7}"#,
            r#"{"type":"key","data":[1]}"#,
            r#"["ready"]"#,
        ] {
            assert!(
                matches!(
                    ControlMessage::decode(raw),
                    Err(HarnessError::Protocol { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn null_data_is_absent() {
        let msg = ControlMessage::decode(r#"{"type":"ready","data":null}"#).unwrap();
        assert!(msg.data.is_none());
        assert_eq!(msg.encode().unwrap(), r#"{"type":"ready"}"#);
    }

    #[test]
    fn click_without_id_is_protocol_error() {
        let msg = ControlMessage::decode(r#"{"type":"panel_button_click","data":{}}"#).unwrap();
        assert!(matches!(
            Inbound::try_from(&msg),
            Err(HarnessError::Protocol { .. })
        ));
    }

    #[test]
    fn unknown_types_pass_through() {
        let msg = ControlMessage::decode(r#"{"type":"touch_down","data":{"x":1}}"#).unwrap();
        assert_eq!(
            Inbound::try_from(&msg).unwrap(),
            Inbound::Other("touch_down".to_string())
        );
    }

    fn wire(msg: &ControlMessage) -> Value {
        serde_json::from_str(&msg.encode().unwrap()).unwrap()
    }

    #[test]
    fn outbound_shapes() {
        assert_eq!(wire(&ControlMessage::quit()), json!({"type": "quit"}));
        assert_eq!(wire(&ControlMessage::active()), json!({"type": "active"}));
        assert_eq!(
            wire(&ControlMessage::top(true)),
            json!({"type": "top", "data": {"enable": true}})
        );
    }

    #[test]
    fn panel_buttons_carry_only_set_fields() {
        let config = PanelConfig {
            buttons: vec![
                Button::icon("home", "home"),
                Button::text("active", "激活窗口"),
                Button::icon("toggle_top", "top").toggled(true),
            ],
        };
        assert_eq!(
            wire(&ControlMessage::panel(&config).unwrap()),
            json!({"type": "panel", "data": {"buttons": [
                {"id": "home", "icon": "home"},
                {"id": "active", "text": "激活窗口"},
                {"id": "toggle_top", "icon": "top", "_enabled": true},
            ]}})
        );
    }

    #[test]
    fn extra_top_level_fields_are_ignored() {
        let msg = ControlMessage::decode(r#"{"type":"ready","seq":4}"#).unwrap();
        assert_eq!(msg, ControlMessage::new(READY));
    }

    #[test]
    fn replayed_payload_is_preserved() {
        let raw = r#"{"type":"touch_move","data":{"pointer_id":"18446744073709551615","x":461,"y":654}}"#;
        let msg = ControlMessage::decode(raw).unwrap();
        let reencoded = wire(&msg);
        let original: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(reencoded, original);
    }
}
