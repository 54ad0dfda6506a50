//! Failure taxonomy for a recording session
//!
//! Every variant is recovered locally: the controller records it, logs it and
//! moves on. Nothing here is ever allowed to take the process down.

use serde::Serialize;
use thiserror::Error;

/// Why an inference reply could not be turned into an emotion distribution
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseFailure {
    /// `model_response` absent, not a string, or not decodable JSON
    #[error("missing-or-malformed-model-response")]
    MissingOrMalformedModelResponse,

    /// `model_response` decoded but carries no `probabilities` mapping
    #[error("missing-probabilities")]
    MissingProbabilities,
}

impl ParseFailure {
    /// Stable tag used in logs and status payloads
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingOrMalformedModelResponse => "missing-or-malformed-model-response",
            Self::MissingProbabilities => "missing-probabilities",
        }
    }
}

/// Errors a recording session can run into
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionError {
    /// Microphone access refused
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// Captured audio could not be finalized
    #[error("failed to encode recording: {0}")]
    EncodingFailure(String),

    /// Send attempted while the channel is disconnected
    #[error("channel unavailable, dropped `{0}` event")]
    ChannelUnavailable(String),

    /// Reply received but could not be parsed
    #[error("malformed inference response: {0}")]
    MalformedResponse(ParseFailure),

    /// Durable history read or write failed
    #[error("history persistence failed: {0}")]
    PersistenceFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failure_codes_match_display() {
        for failure in [
            ParseFailure::MissingOrMalformedModelResponse,
            ParseFailure::MissingProbabilities,
        ] {
            assert_eq!(failure.code(), failure.to_string());
        }
    }

    #[test]
    fn session_error_serializes_with_kind_tag() {
        let err = SessionError::MalformedResponse(ParseFailure::MissingProbabilities);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"kind\":\"malformed_response\""));
        assert!(json.contains("missing-probabilities"));
    }
}
