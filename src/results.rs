use crate::scoring::Attempt;

/// Attempts of one phase, in the order they were submitted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultAggregator {
    attempts: Vec<Attempt>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    /// Frozen copy of the phase so far; later records do not show up in it
    pub fn snapshot_phase(&self) -> Vec<Attempt> {
        self.attempts.clone()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

/// Phase 1 followed by phase 2. No de-duplication and no re-sorting.
pub fn merge(phase1: &[Attempt], phase2: &[Attempt]) -> Vec<Attempt> {
    let mut merged = Vec::with_capacity(phase1.len() + phase2.len());
    merged.extend_from_slice(phase1);
    merged.extend_from_slice(phase2);
    merged
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultSummary {
    pub total: usize,
    pub correct: usize,
    pub total_mistakes: u32,
    pub mean_time_ms: Option<f64>,
}

impl ResultSummary {
    pub fn percent_correct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.correct as f64 / self.total as f64 * 100.0).round()
        }
    }
}

pub fn summary(attempts: &[Attempt]) -> ResultSummary {
    let times: Vec<f64> = attempts.iter().map(|a| a.time_spent_ms as f64).collect();
    let mean_time_ms = match times.len() {
        0 => None,
        count => Some(times.iter().sum::<f64>() / count as f64),
    };

    ResultSummary {
        total: attempts.len(),
        correct: attempts.iter().filter(|a| a.correct).count(),
        total_mistakes: attempts.iter().map(|a| a.mistake_count).sum(),
        mean_time_ms,
    }
}
