/// Known emotion names, used for chart colours and spoken preambles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Love,
    Scared,
    Neutral,
    /// Anything the inference service reports that we have no entry for
    Other,
}

impl EmotionLabel {
    /// Map a sample or mood name onto a label
    ///
    /// Matching is exact; `"Neutral"` (the synthetic floor) and `"neutral"`
    /// (a reported mood) both land on `Neutral`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "love" => Self::Love,
            "scared" => Self::Scared,
            "Neutral" | "neutral" => Self::Neutral,
            _ => Self::Other,
        }
    }

    /// Hex colour used when charting this emotion
    pub fn color(self) -> &'static str {
        match self {
            Self::Happy => "#10b981",
            Self::Sad => "#6366f1",
            Self::Angry => "#ef4444",
            Self::Love => "#f59e0b",
            Self::Scared => "#8b5cf6",
            Self::Neutral | Self::Other => "#64748b",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_fall_back_to_slate() {
        assert_eq!(EmotionLabel::from_name("bored"), EmotionLabel::Other);
        assert_eq!(EmotionLabel::from_name("Happy"), EmotionLabel::Other);
        assert_eq!(EmotionLabel::Other.color(), EmotionLabel::Neutral.color());
    }

    #[test]
    fn known_names_have_distinct_colours() {
        let colours: std::collections::HashSet<_> = ["happy", "sad", "angry", "love", "scared", "Neutral"]
            .iter()
            .map(|n| EmotionLabel::from_name(n).color())
            .collect();
        assert_eq!(colours.len(), 6);
    }
}
