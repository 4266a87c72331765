//! Offline letter-confusion analysis
//!
//! Compares each missed word with what was typed, position by position, and
//! reports which letters were swapped for which. Mirror-image reversals
//! (b/d, p/q, m/w, n/u) get their own recommendation.

use crate::gateway::{AnalysisClient, ConfusionPair, Diagnosis, GatewayError, SessionIdentity};
use crate::scoring::{normalize, Attempt};
use itertools::{EitherOrBoth, Itertools};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

const REVERSALS: [(char, char); 4] = [('b', 'd'), ('p', 'q'), ('m', 'w'), ('n', 'u')];

/// Tallies (expected, typed) letter pairs across attempts
#[derive(Debug, Clone, Default)]
pub struct ConfusionTally {
    pairs: BTreeMap<(char, char), u32>,
    omitted: BTreeMap<char, u32>,
}

impl ConfusionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attempt: &Attempt) {
        if attempt.correct {
            return;
        }
        let target = normalize(&attempt.word);
        let typed = normalize(&attempt.input);
        for pair in target.chars().zip_longest(typed.chars()) {
            match pair {
                EitherOrBoth::Both(expected, got) if expected != got => {
                    *self.pairs.entry((expected, got)).or_insert(0) += 1;
                }
                EitherOrBoth::Left(expected) => {
                    *self.omitted.entry(expected).or_insert(0) += 1;
                }
                _ => {}
            }
        }
    }

    /// Most frequent first, ties alphabetical
    pub fn top_pairs(&self) -> Vec<((char, char), u32)> {
        self.pairs
            .iter()
            .map(|(&pair, &count)| (pair, count))
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
            .collect()
    }

    pub fn problematic_letters(&self) -> BTreeSet<char> {
        self.pairs
            .keys()
            .map(|(expected, _)| *expected)
            .chain(self.omitted.keys().copied())
            .filter(|c| c.is_alphabetic())
            .collect()
    }

    pub fn total(&self) -> u32 {
        self.pairs.values().sum::<u32>() + self.omitted.values().sum::<u32>()
    }
}

fn is_reversal(a: char, b: char) -> bool {
    REVERSALS
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
}

fn recommendations(tally: &ConfusionTally) -> Vec<String> {
    let mut out = Vec::new();
    let mut covered = BTreeSet::new();
    for ((expected, got), _) in tally.top_pairs() {
        let key = if expected < got {
            (expected, got)
        } else {
            (got, expected)
        };
        if !covered.insert(key) {
            continue;
        }
        if is_reversal(expected, got) {
            out.push(format!(
                "Practice telling '{}' and '{}' apart; they are mirror images of each other",
                key.0, key.1
            ));
        } else {
            out.push(format!("Practice words that contain '{expected}'"));
        }
    }
    for letter in tally.omitted.keys() {
        out.push(format!("Watch for the letter '{letter}' being left out"));
    }
    if out.is_empty() {
        out.push("No consistent letter confusions found; keep practising at this level".to_string());
    }
    out
}

/// Build a diagnosis from a finished phase
pub fn diagnose(attempts: &[Attempt]) -> Diagnosis {
    let mut tally = ConfusionTally::new();
    for attempt in attempts {
        tally.record(attempt);
    }

    let confusion_pairs = tally
        .top_pairs()
        .into_iter()
        .map(|((expected, got), _)| ConfusionPair::new(expected.to_string(), got.to_string()))
        .collect();

    let counts: serde_json::Map<String, Value> = tally
        .top_pairs()
        .into_iter()
        .map(|((expected, got), count)| (format!("{expected}->{got}"), json!(count)))
        .collect();

    let mut extra = serde_json::Map::new();
    extra.insert("confusion_counts".to_string(), Value::Object(counts));
    extra.insert("letter_errors".to_string(), json!(tally.total()));
    extra.insert(
        "words_correct".to_string(),
        json!(attempts.iter().filter(|a| a.correct).count()),
    );

    Diagnosis {
        problematic_letters: tally
            .problematic_letters()
            .into_iter()
            .map(String::from)
            .collect(),
        confusion_pairs,
        recommendations: recommendations(&tally),
        extra,
    }
}

/// Analysis collaborator that runs in-process
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAnalyzer;

impl AnalysisClient for LocalAnalyzer {
    fn analyze(
        &mut self,
        _identity: &SessionIdentity,
        attempts: &[Attempt],
    ) -> Result<Diagnosis, GatewayError> {
        if attempts.is_empty() {
            return Err(GatewayError::Rejected("no attempts to analyze".into()));
        }
        Ok(diagnose(attempts))
    }
}
