use crate::error::InputError;
use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Serialize};

/// One scored submission against one presented word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub word: String,
    pub input: String,
    pub correct: bool,
    pub time_spent_ms: u64,
    pub mistake_count: u32,
}

/// Trim surrounding whitespace and lower-case, the form both sides are compared in
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Position-wise mismatch count over the longer of the two strings.
/// A position past the end of either string counts as one mismatch.
pub fn mistake_count(target: &str, input: &str) -> u32 {
    target
        .chars()
        .zip_longest(input.chars())
        .filter(|pair| match pair {
            EitherOrBoth::Both(expected, typed) => expected != typed,
            EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => true,
        })
        .count() as u32
}

/// Score one submission. Pure; the only failures are malformed inputs.
pub fn score(target: &str, raw_input: &str, elapsed_ms: i64) -> Result<Attempt, InputError> {
    let normalized_target = normalize(target);
    if normalized_target.is_empty() {
        return Err(InputError::EmptyWord);
    }
    if elapsed_ms < 0 {
        return Err(InputError::NegativeElapsed(elapsed_ms));
    }

    let normalized_input = normalize(raw_input);
    Ok(Attempt {
        word: target.to_string(),
        input: raw_input.to_string(),
        correct: normalized_target == normalized_input,
        time_spent_ms: elapsed_ms as u64,
        mistake_count: mistake_count(&normalized_target, &normalized_input),
    })
}

/// Human readable comparison shown after each attempt
pub fn feedback_message(attempt: &Attempt) -> String {
    let target = attempt.word.trim();
    let typed = attempt.input.trim();
    if attempt.correct {
        return format!("Correct! \"{target}\"");
    }
    if typed.is_empty() {
        return format!("Nothing typed, the word was \"{target}\"");
    }
    let unit = if attempt.mistake_count == 1 {
        "letter"
    } else {
        "letters"
    };
    format!(
        "You typed \"{typed}\", the word was \"{target}\" ({} {unit} off)",
        attempt.mistake_count
    )
}
