use serde::{Deserialize, Serialize};

pub const HARD_THRESHOLD: f64 = 90.0;
pub const MEDIUM_THRESHOLD: f64 = 70.0;

/// Difficulty hint handed to the word supplier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DifficultyTier {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// Accuracy of a single attempt in percent: (1 - mistakes / target length) * 100, clamped
pub fn per_word_accuracy(mistake_count: u32, target_len: usize) -> f64 {
    if target_len == 0 {
        return 0.0;
    }
    let raw = (1.0 - mistake_count as f64 / target_len as f64) * 100.0;
    raw.clamp(0.0, 100.0)
}

/// Tier for an accuracy value. The current tier does not matter, there is no hysteresis.
pub fn next_tier(_current: DifficultyTier, rolling_accuracy: f64) -> DifficultyTier {
    if rolling_accuracy >= HARD_THRESHOLD {
        DifficultyTier::Hard
    } else if rolling_accuracy >= MEDIUM_THRESHOLD {
        DifficultyTier::Medium
    } else {
        DifficultyTier::Easy
    }
}

/// Halving average of per-word accuracy; each new word weighs as much as all history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingAccuracy {
    value: f64,
}

impl RollingAccuracy {
    pub fn new(initial: f64) -> Self {
        Self {
            value: initial.clamp(0.0, 100.0),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn update(&mut self, per_word: f64) -> f64 {
        self.value = ((self.value + per_word.clamp(0.0, 100.0)) / 2.0).clamp(0.0, 100.0);
        self.value
    }
}

impl Default for RollingAccuracy {
    fn default() -> Self {
        Self::new(100.0)
    }
}
