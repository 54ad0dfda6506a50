//! Defensive decoding of inference replies
//!
//! The reply carries a nested, string-encoded JSON document:
//!
//! ```json
//! { "text": "...", "model_response": "{\"mood\":\"happy\",\"probabilities\":{\"happy\":80}}" }
//! ```
//!
//! Decoding is schema-driven and returns a tagged result; it never panics and
//! has no side effects. Logging and history updates belong to the caller.

use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use super::types::EmotionDistribution;
use crate::channel::InferenceReply;
use crate::error::ParseFailure;

/// Decoded contents of `model_response`
#[derive(Debug, Deserialize)]
struct ModelResponse {
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    probabilities: Option<Probabilities>,
}

/// Probability mapping kept as ordered pairs
///
/// A map type would lose source order or collapse repeated keys; both are
/// preserved here.
#[derive(Debug)]
struct Probabilities(Vec<(String, f64)>);

impl<'de> Deserialize<'de> for Probabilities {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Probabilities;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of emotion name to number")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, value)) = map.next_entry::<String, f64>()? {
                    pairs.push((name, value));
                }
                Ok(Probabilities(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

fn decode_model_response(reply: &InferenceReply) -> Option<ModelResponse> {
    let encoded = reply.model_response.as_ref()?.as_str()?;
    serde_json::from_str(encoded).ok()
}

/// Turn a reply into an emotion distribution
///
/// One sample per probability entry in source order, then the `{Neutral, 5}`
/// floor. Values pass through untouched.
pub fn parse(reply: &InferenceReply) -> Result<EmotionDistribution, ParseFailure> {
    let response =
        decode_model_response(reply).ok_or(ParseFailure::MissingOrMalformedModelResponse)?;
    let probabilities = response
        .probabilities
        .ok_or(ParseFailure::MissingProbabilities)?;

    Ok(EmotionDistribution::from_pairs(probabilities.0))
}

/// The `mood` the service detected, if the reply carries a decodable one
pub fn detect_mood(reply: &InferenceReply) -> Option<String> {
    decode_model_response(reply)?.mood
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionSample;
    use serde_json::json;

    fn reply(model_response: serde_json::Value) -> InferenceReply {
        InferenceReply {
            text: Some("ok".to_string()),
            model_response: Some(model_response),
        }
    }

    #[test]
    fn parses_probabilities_in_source_order() {
        let r = reply(json!(
            r#"{"mood":"happy","probabilities":{"sad":5,"happy":80,"angry":2.5}}"#
        ));
        let dist = parse(&r).unwrap();
        let names: Vec<_> = dist.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["sad", "happy", "angry", "Neutral"]);
        assert_eq!(dist.samples()[2].value, 2.5);
    }

    #[test]
    fn repeated_keys_are_kept() {
        let r = reply(json!(r#"{"probabilities":{"happy":10,"happy":20}}"#));
        let dist = parse(&r).unwrap();
        assert_eq!(
            dist.samples(),
            &[
                EmotionSample::new("happy", 10.0),
                EmotionSample::new("happy", 20.0),
                EmotionSample::neutral_floor(),
            ]
        );
    }

    #[test]
    fn values_are_not_clamped_or_normalized() {
        let r = reply(json!(r#"{"probabilities":{"happy":250,"sad":-3}}"#));
        let dist = parse(&r).unwrap();
        assert_eq!(dist.samples()[0].value, 250.0);
        assert_eq!(dist.samples()[1].value, -3.0);
    }

    #[test]
    fn empty_mapping_yields_only_floor() {
        let r = reply(json!(r#"{"mood":"neutral","probabilities":{}}"#));
        assert_eq!(parse(&r).unwrap().samples(), &[EmotionSample::neutral_floor()]);
    }

    #[test]
    fn missing_model_response() {
        let r = InferenceReply {
            text: Some("ok".to_string()),
            model_response: None,
        };
        assert_eq!(parse(&r), Err(ParseFailure::MissingOrMalformedModelResponse));
    }

    #[test]
    fn undecodable_model_response() {
        assert_eq!(
            parse(&reply(json!("{not json"))),
            Err(ParseFailure::MissingOrMalformedModelResponse)
        );
        // An embedded object instead of a string is not the contract
        assert_eq!(
            parse(&reply(json!({"probabilities": {"happy": 1}}))),
            Err(ParseFailure::MissingOrMalformedModelResponse)
        );
        assert_eq!(
            parse(&reply(json!(r#"{"probabilities":{"happy":"lots"}}"#))),
            Err(ParseFailure::MissingOrMalformedModelResponse)
        );
    }

    #[test]
    fn missing_or_null_probabilities() {
        assert_eq!(
            parse(&reply(json!(r#"{"mood":"sad"}"#))),
            Err(ParseFailure::MissingProbabilities)
        );
        assert_eq!(
            parse(&reply(json!(r#"{"mood":"sad","probabilities":null}"#))),
            Err(ParseFailure::MissingProbabilities)
        );
    }

    #[test]
    fn mood_is_read_independently() {
        let r = reply(json!(r#"{"mood":"angry"}"#));
        assert_eq!(detect_mood(&r).as_deref(), Some("angry"));
        assert_eq!(detect_mood(&reply(json!("garbage"))), None);
    }
}
