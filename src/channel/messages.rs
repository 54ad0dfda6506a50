use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound event carrying a finished recording
pub const EVENT_MESSAGE: &str = "message";
/// Inbound event carrying an inference reply
pub const EVENT_RESPONSE: &str = "response";
/// Connection lifecycle, observed for logging only
pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";

/// Body of a `message` event: one completed recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionEnvelope {
    /// Base64-encoded audio
    pub audio: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TransmissionEnvelope {
    pub const AUDIO_DATA: &'static str = "audio_data";

    pub fn audio(encoded: String) -> Self {
        Self {
            audio: encoded,
            kind: Self::AUDIO_DATA.to_string(),
        }
    }

    /// Serialize to the string payload handed to the channel
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Body of a `response` event
///
/// Decoding is lenient: wrong-typed or absent fields become `None` so the
/// parser can decide what the failure is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceReply {
    #[serde(default)]
    pub text: Option<String>,
    /// String-encoded JSON `{mood, probabilities}`; kept raw for the parser
    #[serde(default)]
    pub model_response: Option<Value>,
}

impl InferenceReply {
    /// Decode a raw payload; never fails
    pub fn from_slice(payload: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(payload) else {
            return Self::default();
        };

        Self {
            text: value
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            model_response: value.get("model_response").cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_format() -> Result<()> {
        let payload = TransmissionEnvelope::audio("AAEC".to_string()).to_payload()?;
        assert_eq!(payload, r#"{"audio":"AAEC","type":"audio_data"}"#);
        Ok(())
    }

    #[test]
    fn reply_keeps_model_response_raw() {
        let reply = InferenceReply::from_slice(
            br#"{"text":"ok","model_response":"{\"mood\":\"happy\"}"}"#,
        );
        assert_eq!(reply.text.as_deref(), Some("ok"));
        assert_eq!(
            reply.model_response,
            Some(Value::String(r#"{"mood":"happy"}"#.to_string()))
        );
    }

    #[test]
    fn garbage_reply_decodes_to_empty() {
        assert_eq!(InferenceReply::from_slice(b"\x00\xffnot json"), InferenceReply::default());

        let reply = InferenceReply::from_slice(br#"{"text":42,"model_response":null}"#);
        assert_eq!(reply.text, None);
        assert_eq!(reply.model_response, Some(Value::Null));
    }
}
