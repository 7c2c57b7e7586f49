use serde::{Deserialize, Serialize};

pub const DEFAULT_TOPIC: &str = "kp1/engine-ver-1/dcx_instance_1/epToken/json";

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1
    }
}

/// Delivery guarantee for telemetry messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Kept in flight and redelivered until acknowledged.
    AtLeastOnce,
}

impl QoS {
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub sequence: u64,
    pub message_id: u32,
    pub qos: u8,
    /// Set on redelivery of an unacknowledged message.
    pub dup: bool,
    pub topic: String,
    pub timestamp_us: u64,
    pub unix_us: u64,
    pub tick: u64,
    pub phase: &'static str,
    pub running: bool,
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct HelloMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AckMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default = "ProtocolVersion::v1")]
    pub protocol_version: ProtocolVersion,
    pub message_id: u32,
}

#[derive(Debug)]
pub enum IncomingMessage {
    Hello(HelloMsg),
    Ack(AckMsg),
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        let msg_type = value.get("type")?.as_str()?;
        match msg_type {
            "ack" => serde_json::from_value(value).ok().map(IncomingMessage::Ack),
            "hello" => serde_json::from_value(value)
                .ok()
                .map(IncomingMessage::Hello),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels() {
        assert_eq!(QoS::from_level(0), Some(QoS::AtMostOnce));
        assert_eq!(QoS::from_level(1), Some(QoS::AtLeastOnce));
        assert_eq!(QoS::from_level(2), None);
        assert_eq!(QoS::AtLeastOnce.level(), 1);
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert!(IncomingMessage::parse(r#"{"type":"subscribe"}"#).is_none());
        assert!(IncomingMessage::parse("not json").is_none());
    }
}
