#![allow(dead_code)]

use chrono::Utc;
use letterwise::config::SessionConfig;
use letterwise::difficulty::DifficultyTier;
use letterwise::gateway::{
    AnalysisClient, Collaborators, ConfusionPair, Diagnosis, GatewayError, PersistenceClient,
    Phase, SaveAck, SaveRequest, SessionIdentity, WordRequest, WordSupplier,
};
use letterwise::policy::NoSleep;
use letterwise::scoring::Attempt;
use letterwise::session::AssessmentSession;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// What the mocks saw, shared with the test after the session takes ownership
#[derive(Debug, Default)]
pub struct Calls {
    pub word_requests: Vec<(Phase, DifficultyTier)>,
    pub analyze_calls: usize,
    pub batch_calls: usize,
    pub save_calls: usize,
    pub saves: Vec<SaveRequest>,
}

pub type Shared = Arc<Mutex<Calls>>;

pub struct MockWords {
    calls: Shared,
    words: VecDeque<String>,
    /// Requests made with this many words already shown always fail
    fail_at_history: Option<usize>,
    /// Fail this many calls before answering normally
    flaky: u32,
    /// How long each word request takes
    latency: Duration,
    batch: Result<Vec<String>, GatewayError>,
}

impl MockWords {
    pub fn new(calls: &Shared, words: &[&str]) -> Self {
        Self {
            calls: calls.clone(),
            words: words.iter().map(|w| w.to_string()).collect(),
            fail_at_history: None,
            flaky: 0,
            latency: Duration::ZERO,
            batch: Ok(Vec::new()),
        }
    }

    pub fn with_batch(mut self, batch: &[&str]) -> Self {
        self.batch = Ok(batch.iter().map(|w| w.to_string()).collect());
        self
    }

    pub fn failing_batch(mut self) -> Self {
        self.batch = Err(GatewayError::Unavailable("batch service down".into()));
        self
    }

    pub fn failing_at(mut self, history_len: usize) -> Self {
        self.fail_at_history = Some(history_len);
        self
    }

    pub fn flaky(mut self, failures: u32) -> Self {
        self.flaky = failures;
        self
    }

    pub fn slow(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl WordSupplier for MockWords {
    fn next_word(&mut self, request: &WordRequest<'_>) -> Result<String, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .word_requests
            .push((request.phase, request.difficulty));
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if self.flaky > 0 {
            self.flaky -= 1;
            return Err(GatewayError::Unavailable("timeout".into()));
        }
        if self.fail_at_history == Some(request.history.len()) {
            return Err(GatewayError::Unavailable("supplier crashed".into()));
        }
        self.words
            .pop_front()
            .ok_or_else(|| GatewayError::Unavailable("out of words".into()))
    }

    fn targeted_batch(
        &mut self,
        _identity: &SessionIdentity,
        _diagnosis: &Diagnosis,
    ) -> Result<Vec<String>, GatewayError> {
        self.calls.lock().unwrap().batch_calls += 1;
        self.batch.clone()
    }
}

pub struct MockAnalysis {
    calls: Shared,
    result: Result<Diagnosis, GatewayError>,
}

impl MockAnalysis {
    pub fn new(calls: &Shared) -> Self {
        Self {
            calls: calls.clone(),
            result: Ok(Diagnosis {
                problematic_letters: ["u".to_string()].into(),
                confusion_pairs: vec![ConfusionPair::new("u", "o")],
                recommendations: vec!["Practice words that contain 'u'".into()],
                ..Diagnosis::default()
            }),
        }
    }

    pub fn failing(calls: &Shared) -> Self {
        Self {
            calls: calls.clone(),
            result: Err(GatewayError::Unavailable("analysis service down".into())),
        }
    }
}

impl AnalysisClient for MockAnalysis {
    fn analyze(
        &mut self,
        _identity: &SessionIdentity,
        _attempts: &[Attempt],
    ) -> Result<Diagnosis, GatewayError> {
        self.calls.lock().unwrap().analyze_calls += 1;
        self.result.clone()
    }
}

pub struct MockStore {
    calls: Shared,
    /// Fail this many saves before accepting
    fail_first: usize,
}

impl MockStore {
    pub fn new(calls: &Shared) -> Self {
        Self {
            calls: calls.clone(),
            fail_first: 0,
        }
    }

    pub fn failing_first(calls: &Shared, failures: usize) -> Self {
        Self {
            calls: calls.clone(),
            fail_first: failures,
        }
    }
}

impl PersistenceClient for MockStore {
    fn save(&mut self, request: &SaveRequest) -> Result<SaveAck, GatewayError> {
        let mut calls = self.calls.lock().unwrap();
        calls.save_calls += 1;
        if calls.save_calls <= self.fail_first {
            return Err(GatewayError::Storage("disk full".into()));
        }
        calls.saves.push(request.clone());
        Ok(SaveAck {
            session_id: request.identity.session_id.clone(),
            attempts_saved: request.attempts.len(),
            saved_at: Utc::now(),
        })
    }
}

pub const PHASE1_WORDS: [&str; 5] = ["cat", "dog", "sun", "tree", "book"];
pub const TARGETED_WORDS: [&str; 5] = ["bun", "cup", "mud", "nut", "rug"];

pub fn identity() -> SessionIdentity {
    SessionIdentity::new("session-1", "mia", "T-42")
}

pub fn build(words: MockWords, analysis: MockAnalysis, store: MockStore) -> AssessmentSession {
    AssessmentSession::new(
        identity(),
        SessionConfig::immediate(),
        Collaborators::new(words, analysis, store),
    )
    .with_sleeper(NoSleep)
}

/// A session whose collaborators all behave
pub fn happy_session(calls: &Shared) -> AssessmentSession {
    build(
        MockWords::new(calls, &PHASE1_WORDS).with_batch(&TARGETED_WORDS),
        MockAnalysis::new(calls),
        MockStore::new(calls),
    )
}

/// Answer each word and move on, as a UI would after showing the feedback
pub fn submit_all(session: &mut AssessmentSession, inputs: &[&str]) {
    for input in inputs {
        session.submit(input, 1000).unwrap();
        session.advance().unwrap();
    }
}
