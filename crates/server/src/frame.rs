//! Frames as the relay sees them: the type tag is read, the data is not.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a relayed envelope. `data` is forwarded exactly as received,
/// unknown fields and odd types included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl RelayFrame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_shared::WsEnvelope;

    #[test]
    fn test_data_survives_untouched() {
        let data = serde_json::json!({ "id": "m1", "text": null, "dp": "data:x", "n": [1, 2] });
        let text = serde_json::json!({ "type": "message.send", "data": data.clone() }).to_string();
        let envelope = WsEnvelope::<RelayFrame>::decode(&text).unwrap();
        assert_eq!(envelope.payload.kind, "message.send");

        let json: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();
        assert_eq!(json["data"], data);
    }

    #[test]
    fn test_missing_data_is_null() {
        let envelope = WsEnvelope::<RelayFrame>::decode(r#"{"type":"typing.stop"}"#).unwrap();
        assert_eq!(envelope.payload.data, Value::Null);
    }

    #[test]
    fn test_type_is_required() {
        assert!(WsEnvelope::<RelayFrame>::decode(r#"{"data":{}}"#).is_err());
        assert!(WsEnvelope::<RelayFrame>::decode("not json").is_err());
    }
}
