use crate::difficulty::DifficultyTier;
use crate::gateway::{Diagnosis, GatewayError, SessionIdentity, WordRequest, WordSupplier};
use include_dir::{include_dir, Dir};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

static WORDLIST_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/wordlists");

/// Offline pool used when the word supplier cannot deliver
pub const FALLBACK_WORDS: [&str; 5] = ["cat", "dog", "sun", "book", "tree"];

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Hands out fallback words round-robin so substitutions are reproducible
#[derive(Debug, Clone, Default)]
pub struct FallbackPool {
    cursor: usize,
}

impl FallbackPool {
    pub fn next_word(&mut self) -> String {
        let word = FALLBACK_WORDS[self.cursor % FALLBACK_WORDS.len()];
        self.cursor += 1;
        word.to_string()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct WordList {
    pub name: String,
    pub easy: Vec<String>,
    pub medium: Vec<String>,
    pub hard: Vec<String>,
}

impl WordList {
    /// Load one of the embedded lists by name
    pub fn load(name: &str) -> Result<Self, GatewayError> {
        let file = WORDLIST_DIR
            .get_file(format!("{name}.json"))
            .ok_or_else(|| GatewayError::Rejected(format!("unknown word list '{name}'")))?;
        let text = file
            .contents_utf8()
            .ok_or_else(|| GatewayError::Serialization(format!("word list '{name}' is not utf-8")))?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn tier(&self, tier: DifficultyTier) -> &[String] {
        match tier {
            DifficultyTier::Easy => &self.easy,
            DifficultyTier::Medium => &self.medium,
            DifficultyTier::Hard => &self.hard,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.easy.iter().chain(&self.medium).chain(&self.hard)
    }
}

/// Word supplier backed by the embedded lists
pub struct LocalWordSupplier {
    list: WordList,
    batch_size: usize,
    rng: StdRng,
}

impl LocalWordSupplier {
    pub fn new(list: WordList) -> Self {
        Self {
            list,
            batch_size: DEFAULT_BATCH_SIZE,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(list: WordList, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(list)
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// A random candidate not in `seen`; only the chosen word is cloned
fn pick_fresh<'a>(
    rng: &mut StdRng,
    candidates: impl Iterator<Item = &'a String>,
    seen: &HashSet<String>,
) -> Option<String> {
    let fresh: Vec<&String> = candidates
        .filter(|w| !seen.contains(&w.to_lowercase()))
        .collect();
    fresh.choose(rng).map(|w| (*w).clone())
}

impl WordSupplier for LocalWordSupplier {
    fn next_word(&mut self, request: &WordRequest<'_>) -> Result<String, GatewayError> {
        let seen: HashSet<String> = request.history.iter().map(|w| w.to_lowercase()).collect();
        let list = &self.list;
        let tier = list.tier(request.difficulty);

        // Prefer an unseen word of the hinted tier, then any unseen word, then repeats.
        pick_fresh(&mut self.rng, tier.iter(), &seen)
            .or_else(|| pick_fresh(&mut self.rng, list.all(), &seen))
            .or_else(|| tier.choose(&mut self.rng).cloned())
            .ok_or_else(|| GatewayError::Unavailable(format!("word list '{}' is empty", list.name)))
    }

    fn targeted_batch(
        &mut self,
        _identity: &SessionIdentity,
        diagnosis: &Diagnosis,
    ) -> Result<Vec<String>, GatewayError> {
        let weights = focus_weights(diagnosis);
        if weights.is_empty() {
            let mut words: Vec<String> = self.list.medium.clone();
            words.shuffle(&mut self.rng);
            words.truncate(self.batch_size);
            return Ok(words);
        }

        let mut scored: Vec<(&String, f64)> = self
            .list
            .all()
            .map(|word| (word, focus_score(word, &weights)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        // Draw from the top 30% so repeated sessions do not see the same batch.
        let pool_size = ((scored.len() as f64 * 0.3) as usize)
            .max(self.batch_size)
            .min(scored.len());
        let pool: Vec<&String> = scored[..pool_size].iter().map(|(w, _)| *w).collect();

        Ok(pool
            .choose_multiple(&mut self.rng, self.batch_size)
            .map(|w| (*w).clone())
            .collect())
    }
}

/// Letters to practice: confused letters weigh double
fn focus_weights(diagnosis: &Diagnosis) -> HashMap<char, f64> {
    let mut weights = HashMap::new();
    for letter in &diagnosis.problematic_letters {
        for ch in letter.to_lowercase().chars() {
            weights.entry(ch).or_insert(1.0);
        }
    }
    for pair in &diagnosis.confusion_pairs {
        for ch in pair.confuses.to_lowercase().chars().chain(pair.with.to_lowercase().chars()) {
            weights.insert(ch, 2.0);
        }
    }
    weights
}

fn focus_score(word: &str, weights: &HashMap<char, f64>) -> f64 {
    let chars: Vec<char> = word.to_lowercase().chars().collect();
    if chars.is_empty() {
        return 0.0;
    }
    let total: f64 = chars.iter().filter_map(|c| weights.get(c)).sum();
    total / chars.len() as f64
}
