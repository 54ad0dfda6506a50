use serde::{Deserialize, Serialize};

/// Name of the synthetic sample appended to every distribution
pub const NEUTRAL_FLOOR_NAME: &str = "Neutral";

/// Value of the synthetic sample, a fixed visualization floor
pub const NEUTRAL_FLOOR_VALUE: f64 = 5.0;

/// One named score, conventionally in [0, 100] but never clamped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub name: String,
    pub value: f64,
}

impl EmotionSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// The trailing `{Neutral, 5}` sample
    pub fn neutral_floor() -> Self {
        Self::new(NEUTRAL_FLOOR_NAME, NEUTRAL_FLOOR_VALUE)
    }
}

/// Ordered scores from one reply, in source key order, followed by the neutral floor
///
/// Serialized as a bare JSON array of samples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionDistribution(Vec<EmotionSample>);

impl EmotionDistribution {
    /// Build a distribution from source pairs, appending the neutral floor
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut samples: Vec<EmotionSample> = pairs
            .into_iter()
            .map(|(name, value)| EmotionSample { name, value })
            .collect();
        samples.push(EmotionSample::neutral_floor());
        Self(samples)
    }

    pub fn samples(&self) -> &[EmotionSample] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First sample, shown as the primary emotion of a recording
    pub fn primary(&self) -> Option<&EmotionSample> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EmotionSample> {
        self.0.iter()
    }
}

impl From<Vec<EmotionSample>> for EmotionDistribution {
    fn from(samples: Vec<EmotionSample>) -> Self {
        Self(samples)
    }
}

impl<'a> IntoIterator for &'a EmotionDistribution {
    type Item = &'a EmotionSample;
    type IntoIter = std::slice::Iter<'a, EmotionSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
