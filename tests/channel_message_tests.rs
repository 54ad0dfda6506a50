// Wire contract tests for the inference channel
//
// These tests pin down the outbound envelope and the inbound reply shapes.

use base64::Engine;
use emotion_vox::channel::messages::{InferenceReply, TransmissionEnvelope};
use emotion_vox::emotion::{self, EmotionSample};
use emotion_vox::ParseFailure;

#[test]
fn test_envelope_serialization() {
    let msg = TransmissionEnvelope::audio(base64::engine::general_purpose::STANDARD.encode([0u8; 100]));

    let json = msg.to_payload().unwrap();
    assert!(json.contains("\"type\":\"audio_data\""));
    assert!(json.contains("\"audio\":\"AAAA"));

    let deserialized: TransmissionEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.kind, "audio_data");
    assert_eq!(deserialized, msg);
}

#[test]
fn test_envelope_has_only_contract_fields() {
    let json = TransmissionEnvelope::audio("UklGRg==".to_string()).to_payload().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&"audio".to_string()));
    assert!(keys.contains(&"type".to_string()));
}

#[test]
fn test_audio_encoding_roundtrip() {
    let original: Vec<u8> = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();

    let msg = TransmissionEnvelope::audio(base64::engine::general_purpose::STANDARD.encode(&original));
    let json = msg.to_payload().unwrap();
    let deserialized: TransmissionEnvelope = serde_json::from_str(&json).unwrap();

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&deserialized.audio)
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_reply_scenario_happy() {
    let payload = r#"{
        "text": "ok",
        "model_response": "{\"mood\":\"happy\",\"probabilities\":{\"happy\":80,\"sad\":5}}"
    }"#;

    let reply = InferenceReply::from_slice(payload.as_bytes());
    let dist = emotion::parse(&reply).unwrap();

    assert_eq!(
        dist.samples(),
        &[
            EmotionSample::new("happy", 80.0),
            EmotionSample::new("sad", 5.0),
            EmotionSample::new("Neutral", 5.0),
        ]
    );
    assert_eq!(emotion::detect_mood(&reply).as_deref(), Some("happy"));
}

#[test]
fn test_reply_without_model_response() {
    let reply = InferenceReply::from_slice(br#"{"text":"ok"}"#);

    assert_eq!(reply.text.as_deref(), Some("ok"));
    assert_eq!(
        emotion::parse(&reply),
        Err(ParseFailure::MissingOrMalformedModelResponse)
    );
}

#[test]
fn test_reply_without_probabilities() {
    let reply = InferenceReply::from_slice(
        br#"{"text":"ok","model_response":"{\"mood\":\"sad\"}"}"#,
    );

    assert_eq!(emotion::parse(&reply), Err(ParseFailure::MissingProbabilities));
}

#[test]
fn test_distribution_length_is_keys_plus_one() {
    for n in 0..8 {
        let mapping: Vec<String> = (0..n).map(|i| format!("\\\"e{}\\\":{}", i, i * 10)).collect();
        let payload = format!(
            r#"{{"text":"t","model_response":"{{\"probabilities\":{{{}}}}}"}}"#,
            mapping.join(",")
        );

        let dist = emotion::parse(&InferenceReply::from_slice(payload.as_bytes())).unwrap();
        assert_eq!(dist.len(), n + 1);
        assert_eq!(dist.samples().last(), Some(&EmotionSample::new("Neutral", 5.0)));
    }
}

#[test]
fn test_empty_text_is_treated_as_missing() {
    let reply = InferenceReply::from_slice(br#"{"text":""}"#);
    assert_eq!(reply.text, None);
}
