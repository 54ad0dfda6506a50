use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::synth::{SpeechSynthesizer, Utterance};
use crate::config::VoiceConfig;
use crate::emotion::EmotionLabel;

/// Spoken when a reply arrives without text
pub const FALLBACK_REPLY: &str = "We are facing some issue right now.";

/// Said while the inference service is working on a recording
pub const WAITING_PROMPTS: &[&str] = &[
    "Thank you for your patience! We're almost there and truly appreciate your understanding.",
    "You're doing great! We're wrapping up and grateful for your patience.",
    "We appreciate your patience! We're giving this our full attention.",
    "Hang tight! We're finalizing things and appreciate your understanding.",
    "Thanks for waiting! We're making sure everything is just right.",
    "We're almost done! Your patience means a lot to us.",
    "Your patience is amazing! We'll be with you shortly.",
    "We're just about there! Thanks for sticking with us.",
    "Good things take time! We appreciate your patience.",
    "You've been wonderful! We'll be ready in no time.",
    "Thanks for waiting! We're taking extra care behind the scenes.",
    "Almost there! We truly appreciate your patience.",
    "Everything's coming together! Thanks for waiting.",
    "We're working hard to make this special. Thanks for your patience!",
    "Just a little longer! We appreciate you sticking with us.",
    "We're so close! Thanks for trusting the process.",
    "Your patience means the world to us! Almost ready.",
    "You've been so patient! We truly appreciate it.",
    "We're almost ready! Thanks for your understanding.",
    "Getting closer! Your patience makes all the difference.",
    "Thank you for waiting! We're finishing up now.",
    "You've been amazing! Just a few more moments.",
    "Thanks for trusting us! We'll be ready soon.",
    "We're wrapping things up! Your patience is truly appreciated.",
    "Almost there! Thanks for your understanding.",
    "So close! We appreciate your kindness and patience.",
    "Your patience is remarkable! We're nearly finished.",
    "Thank you for sticking with us! We're almost done.",
    "We appreciate your patience! It'll be worth the wait.",
];

/// Templated opener for an emotion tag
pub fn preamble_for(emotion: Option<&str>) -> &'static str {
    match emotion.map(EmotionLabel::from_name) {
        Some(EmotionLabel::Happy) => {
            "You seem to be in such a wonderful mood today! It's great to see you so positive \
             and cheerful. I hope the rest of your day is just as bright and uplifting!"
        }
        Some(EmotionLabel::Sad) => {
            "I'm truly sorry you're feeling this way. I know it can be tough, but remember \
             you're not alone. I'm here to assist you and support you through it. Together, \
             we'll get through this."
        }
        Some(EmotionLabel::Angry) => {
            "I can sense some frustration in your voice. I understand that things might feel a \
             bit overwhelming, but take a moment to breathe. I'll do my best to help you work \
             through it and ease the tension."
        }
        Some(EmotionLabel::Neutral) => {
            "It seems like you're in a calm and steady state today, which is wonderful. I'm \
             here if you need anything or just want to talk through something. Let me know how \
             I can assist you in any way."
        }
        _ => {
            "I'm here to help with anything you need, no matter the situation. Feel free to \
             share what's on your mind, and I'll do my best to assist you in the best way \
             possible."
        }
    }
}

/// Turns reply text into speech requests
pub struct VoiceFeedbackEngine {
    synth: Arc<dyn SpeechSynthesizer>,
    config: VoiceConfig,
}

impl VoiceFeedbackEngine {
    pub fn new(synth: Arc<dyn SpeechSynthesizer>, config: VoiceConfig) -> Self {
        Self { synth, config }
    }

    fn utterance(&self, text: String) -> Utterance {
        Utterance {
            text,
            lang: self.config.lang.clone(),
            rate: self.config.rate,
            pitch: self.config.pitch,
        }
    }

    /// Speak a reply, optionally tagged with the detected emotion
    ///
    /// Only the reply itself is spoken unless `speak_preamble` is set. Empty
    /// text is ignored.
    pub fn speak(&self, text: &str, emotion: Option<&str>) {
        if text.is_empty() {
            return;
        }

        let combined = format!("{}{}", preamble_for(emotion), text);
        debug!("Voice feedback for {:?}: {}", emotion, combined);

        let spoken = if self.config.speak_preamble {
            combined
        } else {
            text.to_string()
        };
        self.synth.enqueue(self.utterance(spoken));
    }

    /// Speak a random waiting statement after the configured delay
    ///
    /// Returns immediately; must be called from within a tokio runtime.
    pub fn speak_waiting_prompt(&self) {
        if !self.config.waiting_prompt {
            return;
        }

        let Some(statement) = WAITING_PROMPTS.choose(&mut rand::thread_rng()) else {
            return;
        };

        let utterance = self.utterance(statement.to_string());
        let synth = Arc::clone(&self.synth);
        let delay = Duration::from_millis(self.config.waiting_prompt_delay_ms);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            synth.enqueue(utterance);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::MemorySynthesizer;

    fn engine(config: VoiceConfig) -> (VoiceFeedbackEngine, Arc<MemorySynthesizer>) {
        let synth = Arc::new(MemorySynthesizer::new());
        let engine = VoiceFeedbackEngine::new(synth.clone(), config);
        (engine, synth)
    }

    #[test]
    fn speaks_raw_reply_with_fixed_voice_settings() {
        let (engine, synth) = engine(VoiceConfig::default());

        engine.speak("Hello there", Some("happy"));

        let spoken = synth.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "Hello there");
        assert_eq!(spoken[0].lang, "en-US");
        assert_eq!(spoken[0].rate, 1.0);
        assert_eq!(spoken[0].pitch, 1.0);
    }

    #[test]
    fn preamble_is_spoken_when_enabled() {
        let (engine, synth) = engine(VoiceConfig {
            speak_preamble: true,
            ..VoiceConfig::default()
        });

        engine.speak("Hello", Some("sad"));

        let text = &synth.spoken()[0].text;
        assert!(text.starts_with("I'm truly sorry"));
        assert!(text.ends_with("Hello"));
    }

    #[test]
    fn empty_text_is_silent() {
        let (engine, synth) = engine(VoiceConfig::default());
        engine.speak("", None);
        assert!(synth.spoken().is_empty());
    }

    #[test]
    fn unknown_emotions_use_default_preamble() {
        assert_eq!(preamble_for(Some("scared")), preamble_for(None));
        assert_ne!(preamble_for(Some("angry")), preamble_for(None));
        assert_ne!(preamble_for(Some("neutral")), preamble_for(None));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_prompt_is_delayed() {
        let (engine, synth) = engine(VoiceConfig::default());

        engine.speak_waiting_prompt();
        tokio::task::yield_now().await;
        assert!(synth.spoken().is_empty());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let spoken = synth.spoken();
        assert_eq!(spoken.len(), 1);
        assert!(WAITING_PROMPTS.contains(&spoken[0].text.as_str()));
    }

    #[tokio::test]
    async fn waiting_prompt_can_be_disabled() {
        let (engine, synth) = engine(VoiceConfig {
            waiting_prompt: false,
            waiting_prompt_delay_ms: 0,
            ..VoiceConfig::default()
        });

        engine.speak_waiting_prompt();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(synth.spoken().is_empty());
    }
}
