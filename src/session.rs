//! The assessment session controller.
//!
//! A session runs an `initial` phase of broad sampling, hands the results to
//! the analysis collaborator, then runs a `targeted` phase seeded with the
//! diagnosis and finally saves both phases as one ordered result set.
//!
//! Scoring and moving on are separate steps: `submit` scores and records an
//! attempt and returns its feedback straight away, `advance` then carries out
//! what that attempt left pending (the feedback pause and next word, the
//! analysis between phases, or the final save). A UI shows the feedback in
//! between.
//!
//! Everything runs on the caller's thread. Each entry point (`start`,
//! `submit`, `advance`, `retry_save`, `abort`) runs to completion,
//! collaborator calls included, before it returns, so state is never touched
//! by two events at once. Callers that receive UI events concurrently queue
//! them, see [`crate::runtime`].

use crate::config::SessionConfig;
use crate::difficulty::{next_tier, per_word_accuracy, DifficultyTier, RollingAccuracy};
use crate::error::SessionError;
use crate::gateway::{
    Collaborators, Diagnosis, GatewayError, Phase, SaveAck, SaveRequest, SessionIdentity,
    WordRequest,
};
use crate::policy::{Sleeper, ThreadSleeper};
use crate::results::{merge, ResultAggregator};
use crate::scoring::{self, feedback_message, Attempt};
use crate::words::FallbackPool;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where the word on screen came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSource {
    Supplier,
    /// Pre-fetched by the targeted batch, no live request made
    Queue,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct PresentedWord {
    pub text: String,
    pub source: WordSource,
    pub displayed_at: Instant,
}

#[derive(Debug, Clone)]
enum WordSlot {
    Pending,
    Presented(PresentedWord),
}

#[derive(Debug, Clone)]
struct TargetedPhase {
    phase1: Vec<Attempt>,
    diagnosis: Diagnosis,
    queue: Vec<String>,
    cursor: usize,
    results: ResultAggregator,
}

#[derive(Debug, Clone)]
enum PhaseState {
    Initial { results: ResultAggregator },
    Analyzing { phase1: Vec<Attempt> },
    Targeted(TargetedPhase),
}

impl PhaseState {
    fn kind(&self) -> Phase {
        match self {
            PhaseState::Initial { .. } => Phase::Initial,
            PhaseState::Analyzing { .. } => Phase::Analyzing,
            PhaseState::Targeted(_) => Phase::Targeted,
        }
    }

    fn results(&self) -> Option<&ResultAggregator> {
        match self {
            PhaseState::Initial { results } => Some(results),
            PhaseState::Targeted(targeted) => Some(&targeted.results),
            PhaseState::Analyzing { .. } => None,
        }
    }

    fn results_mut(&mut self) -> Option<&mut ResultAggregator> {
        match self {
            PhaseState::Initial { results } => Some(results),
            PhaseState::Targeted(targeted) => Some(&mut targeted.results),
            PhaseState::Analyzing { .. } => None,
        }
    }

    /// Next pre-fetched targeted word, advancing the cursor
    fn take_queued(&mut self) -> Option<String> {
        let PhaseState::Targeted(targeted) = self else {
            return None;
        };
        let word = targeted.queue.get(targeted.cursor).cloned()?;
        targeted.cursor += 1;
        Some(word)
    }

    /// All attempts made so far, phase 1 first
    fn collected_attempts(&self) -> Vec<Attempt> {
        match self {
            PhaseState::Initial { results } => results.snapshot_phase(),
            PhaseState::Analyzing { phase1 } => phase1.clone(),
            PhaseState::Targeted(targeted) => merge(&targeted.phase1, targeted.results.attempts()),
        }
    }
}

/// Both phases, ready for persistence
#[derive(Debug, Clone)]
struct FinalResults {
    phase1: Vec<Attempt>,
    phase2: Vec<Attempt>,
    merged: Vec<Attempt>,
    diagnosis: Diagnosis,
}

#[derive(Debug, Clone)]
enum Stage {
    Active {
        phase: PhaseState,
        word: WordSlot,
    },
    /// Merged results retained until a save succeeds
    Finishing(FinalResults),
    /// Phase 1 is kept; the targeted phase is never entered
    AnalysisFailed {
        phase1: Vec<Attempt>,
        error: SessionError,
    },
    Completed {
        results: FinalResults,
        ack: SaveAck,
    },
    Aborted {
        phase: Phase,
        attempts: Vec<Attempt>,
        /// What the phase accessors showed when the abort happened
        phase1: Option<Vec<Attempt>>,
        this_phase: Vec<Attempt>,
        diagnosis: Option<Diagnosis>,
    },
}

/// Controller state as seen from the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionStatus {
    AwaitingWord,
    AwaitingInput,
    /// Phase 1 is done; `advance` runs the analysis
    Analyzing,
    /// Both phases are merged; `advance` or `retry_save` saves them
    Finishing,
    AnalysisFailed,
    Completed,
    Aborted,
}

/// What the next `advance` will do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    NextWord,
    /// Phase 1 is complete, analysis comes next
    Analyze,
    /// Phase 2 is complete, the save comes next
    Save,
}

/// Outcome of `advance`
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    WordReady,
    EnteredTargeted,
    Completed(SaveAck),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub attempt: Attempt,
    pub message: String,
    pub rolling_accuracy: f64,
    pub difficulty: DifficultyTier,
    pub next: NextStep,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortOutcome {
    Saved(SaveAck),
    /// Logged only; the user is leaving anyway
    SaveFailed(GatewayError),
    AlreadyRequested,
    AlreadyFinished,
}

pub struct AssessmentSession {
    identity: SessionIdentity,
    config: SessionConfig,
    collaborators: Collaborators,
    sleeper: Box<dyn Sleeper>,
    stage: Stage,
    rolling: RollingAccuracy,
    tier: DifficultyTier,
    cumulative_mistakes: u32,
    last_feedback: Option<String>,
    history: Vec<String>,
    fallback: FallbackPool,
    phase_log: Vec<Phase>,
    abort_requested: bool,
}

impl AssessmentSession {
    pub fn new(
        identity: SessionIdentity,
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            identity,
            config,
            collaborators,
            sleeper: Box::new(ThreadSleeper),
            stage: Stage::Active {
                phase: PhaseState::Initial {
                    results: ResultAggregator::new(),
                },
                word: WordSlot::Pending,
            },
            rolling: RollingAccuracy::default(),
            tier: DifficultyTier::default(),
            cumulative_mistakes: 0,
            last_feedback: None,
            history: Vec::new(),
            fallback: FallbackPool::default(),
            phase_log: vec![Phase::Initial],
            abort_requested: false,
        }
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Fetch the first word. Calling it again once a word is shown does nothing.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match &self.stage {
            Stage::Active {
                word: WordSlot::Pending,
                ..
            } => {
                info!(
                    "session {} started for {}",
                    self.identity.session_id, self.identity.username
                );
                self.request_word();
                Ok(())
            }
            Stage::Active { .. } => Ok(()),
            Stage::Finishing(_) | Stage::AnalysisFailed { .. } => Err(SessionError::NotAwaitingInput),
            Stage::Completed { .. } | Stage::Aborted { .. } => Err(SessionError::Terminated),
        }
    }

    /// Score `input` against the word on screen and record it. The session
    /// moves on with `advance`.
    pub fn submit(&mut self, input: &str, elapsed_ms: i64) -> Result<Feedback, SessionError> {
        let target = match &self.stage {
            Stage::Active {
                word: WordSlot::Presented(word),
                phase,
            } if phase.results().is_some() => word.text.clone(),
            Stage::Completed { .. } | Stage::Aborted { .. } => return Err(SessionError::Terminated),
            _ => return Err(SessionError::NotAwaitingInput),
        };

        let attempt = scoring::score(&target, input, elapsed_ms)?;
        let target_len = scoring::normalize(&target).chars().count();
        self.rolling
            .update(per_word_accuracy(attempt.mistake_count, target_len));
        self.tier = next_tier(self.tier, self.rolling.value());
        self.cumulative_mistakes += attempt.mistake_count;
        let message = feedback_message(&attempt);
        self.last_feedback = Some(message.clone());
        debug!(
            "scored \"{}\" as \"{}\": correct={} mistakes={} accuracy={:.1} tier={}",
            attempt.word,
            attempt.input,
            attempt.correct,
            attempt.mistake_count,
            self.rolling.value(),
            self.tier
        );

        let (phase, recorded) = match &mut self.stage {
            Stage::Active { phase, word } => {
                let kind = phase.kind();
                let results = phase.results_mut().ok_or(SessionError::NotAwaitingInput)?;
                results.record(attempt.clone());
                *word = WordSlot::Pending;
                (kind, results.len())
            }
            _ => return Err(SessionError::NotAwaitingInput),
        };

        let next = if recorded < self.config.words_per_phase.max(1) {
            NextStep::NextWord
        } else if phase == Phase::Initial {
            self.close_initial();
            NextStep::Analyze
        } else {
            self.close_targeted();
            NextStep::Save
        };

        Ok(Feedback {
            attempt,
            message,
            rolling_accuracy: self.rolling.value(),
            difficulty: self.tier,
            next,
        })
    }

    /// Carry out what the last scored attempt left pending. Does nothing while
    /// a word is on screen.
    pub fn advance(&mut self) -> Result<Progress, SessionError> {
        match &self.stage {
            Stage::Active {
                word: WordSlot::Presented(_),
                ..
            } => Ok(Progress::WordReady),
            Stage::Active {
                phase: PhaseState::Analyzing { .. },
                ..
            } => {
                self.begin_targeted()?;
                Ok(Progress::EnteredTargeted)
            }
            Stage::Active { .. } => {
                self.sleeper.sleep(self.config.feedback_delay());
                self.request_word();
                Ok(Progress::WordReady)
            }
            Stage::Finishing(_) => self.save_final().map(Progress::Completed),
            Stage::AnalysisFailed { error, .. } => Err(error.clone()),
            Stage::Completed { .. } | Stage::Aborted { .. } => Err(SessionError::Terminated),
        }
    }

    /// Like `submit`, timing the attempt from when the word was presented
    pub fn submit_timed(&mut self, input: &str) -> Result<Feedback, SessionError> {
        let elapsed_ms = match &self.stage {
            Stage::Active {
                word: WordSlot::Presented(word),
                ..
            } => i64::try_from(word.displayed_at.elapsed().as_millis()).unwrap_or(i64::MAX),
            _ => 0,
        };
        self.submit(input, elapsed_ms)
    }

    /// Restart the per-word timer, for UIs that render some time after the word arrives
    pub fn mark_displayed(&mut self) {
        if let Stage::Active {
            word: WordSlot::Presented(word),
            ..
        } = &mut self.stage
        {
            word.displayed_at = Instant::now();
        }
    }

    /// Try the final save again; the merged results are still held in memory
    pub fn retry_save(&mut self) -> Result<SaveAck, SessionError> {
        self.save_final()
    }

    /// End the session early. Makes one best-effort save of whatever attempts
    /// exist; any later call is a no-op.
    pub fn abort(&mut self) -> AbortOutcome {
        if self.abort_requested {
            return AbortOutcome::AlreadyRequested;
        }
        let (phase, attempts, diagnosis, is_complete) = match &self.stage {
            Stage::Completed { .. } | Stage::Aborted { .. } => return AbortOutcome::AlreadyFinished,
            Stage::Active { phase, .. } => {
                let diagnosis = match phase {
                    PhaseState::Targeted(targeted) => Some(targeted.diagnosis.clone()),
                    _ => None,
                };
                (phase.kind(), phase.collected_attempts(), diagnosis, false)
            }
            Stage::Finishing(results) => (
                Phase::Targeted,
                results.merged.clone(),
                Some(results.diagnosis.clone()),
                true,
            ),
            Stage::AnalysisFailed { phase1, .. } => (Phase::Analyzing, phase1.clone(), None, false),
        };
        let phase1 = self.phase1_attempts().map(<[Attempt]>::to_vec);
        let this_phase = self.attempts_this_phase().to_vec();
        self.abort_requested = true;
        info!(
            "session {} aborted during {phase} with {} attempts",
            self.identity.session_id,
            attempts.len()
        );

        let request = SaveRequest {
            identity: self.identity.clone(),
            attempts: attempts.clone(),
            diagnosis: diagnosis.clone(),
            is_complete,
        };
        let outcome = match self.collaborators.persistence.save(&request) {
            Ok(ack) => AbortOutcome::Saved(ack),
            Err(err) => {
                warn!(
                    "could not save aborted session {}: {err}",
                    self.identity.session_id
                );
                AbortOutcome::SaveFailed(err)
            }
        };
        self.stage = Stage::Aborted {
            phase,
            attempts,
            phase1,
            this_phase,
            diagnosis,
        };
        outcome
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        match &self.stage {
            Stage::Active {
                word: WordSlot::Presented(_),
                ..
            } => SessionStatus::AwaitingInput,
            Stage::Active {
                phase: PhaseState::Analyzing { .. },
                ..
            } => SessionStatus::Analyzing,
            Stage::Active { .. } => SessionStatus::AwaitingWord,
            Stage::Finishing(_) => SessionStatus::Finishing,
            Stage::AnalysisFailed { .. } => SessionStatus::AnalysisFailed,
            Stage::Completed { .. } => SessionStatus::Completed,
            Stage::Aborted { .. } => SessionStatus::Aborted,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.stage {
            Stage::Active { phase, .. } => phase.kind(),
            Stage::Finishing(_) | Stage::Completed { .. } => Phase::Targeted,
            Stage::AnalysisFailed { .. } => Phase::Analyzing,
            Stage::Aborted { phase, .. } => *phase,
        }
    }

    /// `None` while a word is being fetched, i.e. the UI shows a loading state
    pub fn current_word(&self) -> Option<&PresentedWord> {
        match &self.stage {
            Stage::Active {
                word: WordSlot::Presented(word),
                ..
            } => Some(word),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.stage,
            Stage::Active {
                word: WordSlot::Pending,
                ..
            }
        )
    }

    pub fn last_feedback(&self) -> Option<&str> {
        self.last_feedback.as_deref()
    }

    pub fn rolling_accuracy(&self) -> f64 {
        self.rolling.value()
    }

    pub fn difficulty(&self) -> DifficultyTier {
        self.tier
    }

    pub fn cumulative_mistakes(&self) -> u32 {
        self.cumulative_mistakes
    }

    /// Attempts of the phase in progress. Phase 1 attempts stay here until the
    /// targeted phase starts. After an abort this and `phase1_attempts` keep
    /// what they showed at the time.
    pub fn attempts_this_phase(&self) -> &[Attempt] {
        match &self.stage {
            Stage::Active { phase, .. } => match phase {
                PhaseState::Initial { results } => results.attempts(),
                PhaseState::Analyzing { phase1 } => phase1,
                PhaseState::Targeted(targeted) => targeted.results.attempts(),
            },
            Stage::Finishing(results) | Stage::Completed { results, .. } => &results.phase2,
            Stage::AnalysisFailed { phase1, .. } => phase1,
            Stage::Aborted { this_phase, .. } => this_phase,
        }
    }

    /// Frozen phase 1 results, available once phase 1 has ended
    pub fn phase1_attempts(&self) -> Option<&[Attempt]> {
        match &self.stage {
            Stage::Active { phase, .. } => match phase {
                PhaseState::Initial { .. } => None,
                PhaseState::Analyzing { phase1 } => Some(phase1.as_slice()),
                PhaseState::Targeted(targeted) => Some(targeted.phase1.as_slice()),
            },
            Stage::Finishing(results) | Stage::Completed { results, .. } => {
                Some(results.phase1.as_slice())
            }
            Stage::AnalysisFailed { phase1, .. } => Some(phase1.as_slice()),
            Stage::Aborted { phase1, .. } => phase1.as_deref(),
        }
    }

    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        match &self.stage {
            Stage::Active {
                phase: PhaseState::Targeted(targeted),
                ..
            } => Some(&targeted.diagnosis),
            Stage::Finishing(results) | Stage::Completed { results, .. } => Some(&results.diagnosis),
            Stage::Aborted { diagnosis, .. } => diagnosis.as_ref(),
            _ => None,
        }
    }

    /// The combined phase 1 + phase 2 sequence, once both phases are done
    pub fn merged_results(&self) -> Option<&[Attempt]> {
        match &self.stage {
            Stage::Finishing(results) | Stage::Completed { results, .. } => {
                Some(results.merged.as_slice())
            }
            _ => None,
        }
    }

    /// Whatever an abort captured
    pub fn aborted_attempts(&self) -> Option<&[Attempt]> {
        match &self.stage {
            Stage::Aborted { attempts, .. } => Some(attempts.as_slice()),
            _ => None,
        }
    }

    pub fn analysis_error(&self) -> Option<&SessionError> {
        match &self.stage {
            Stage::AnalysisFailed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn save_ack(&self) -> Option<&SaveAck> {
        match &self.stage {
            Stage::Completed { ack, .. } => Some(ack),
            _ => None,
        }
    }

    /// Every phase entered, in order
    pub fn phase_log(&self) -> &[Phase] {
        &self.phase_log
    }

    /// Words presented so far, both phases
    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn request_word(&mut self) {
        let (phase, queued) = match &mut self.stage {
            Stage::Active {
                phase,
                word: WordSlot::Pending,
            } if !matches!(phase, PhaseState::Analyzing { .. }) => {
                (phase.kind(), phase.take_queued())
            }
            _ => return,
        };

        let (text, source) = match queued {
            Some(word) => (word, WordSource::Queue),
            None => self.fetch_live(phase),
        };
        self.history.push(text.clone());

        if let Stage::Active { word, .. } = &mut self.stage {
            *word = WordSlot::Presented(PresentedWord {
                text,
                source,
                displayed_at: Instant::now(),
            });
        }
    }

    fn fetch_live(&mut self, phase: Phase) -> (String, WordSource) {
        let fetched = {
            let request = WordRequest {
                identity: &self.identity,
                phase,
                difficulty: self.tier,
                history: &self.history,
            };
            let words = &mut self.collaborators.words;
            self.config
                .word_retry
                .run(self.sleeper.as_ref(), "word request", || {
                    words.next_word(&request)
                })
        };

        match fetched {
            Ok(word) if !word.trim().is_empty() => (word.trim().to_string(), WordSource::Supplier),
            Ok(_) => {
                let word = self.fallback.next_word();
                warn!("word supplier returned an empty word, using fallback \"{word}\"");
                (word, WordSource::Fallback)
            }
            Err(err) => {
                let word = self.fallback.next_word();
                warn!("word supplier failed ({err}), using fallback \"{word}\"");
                (word, WordSource::Fallback)
            }
        }
    }

    /// Freeze phase 1 and wait for `advance` to analyze it
    fn close_initial(&mut self) {
        let phase1 = match &self.stage {
            Stage::Active {
                phase: PhaseState::Initial { results },
                ..
            } => results.snapshot_phase(),
            _ => return,
        };
        info!(
            "phase 1 of session {} done ({} words)",
            self.identity.session_id,
            phase1.len()
        );
        self.stage = Stage::Active {
            phase: PhaseState::Analyzing { phase1 },
            word: WordSlot::Pending,
        };
        self.phase_log.push(Phase::Analyzing);
    }

    fn begin_targeted(&mut self) -> Result<(), SessionError> {
        let phase1 = match &self.stage {
            Stage::Active {
                phase: PhaseState::Analyzing { phase1 },
                ..
            } => phase1.clone(),
            _ => return Err(SessionError::NotAwaitingInput),
        };
        debug!("analyzing phase 1 of session {}", self.identity.session_id);
        self.sleeper.sleep(self.config.thinking_delay());

        let analyzed = {
            let analysis = &mut self.collaborators.analysis;
            let identity = &self.identity;
            self.config
                .analysis_retry
                .run(self.sleeper.as_ref(), "analysis", || {
                    analysis.analyze(identity, &phase1)
                })
        };
        let diagnosis = match analyzed {
            Ok(diagnosis) => diagnosis,
            Err(err) => return Err(self.fail_analysis(phase1, SessionError::Analysis(err))),
        };

        let batch = {
            let words = &mut self.collaborators.words;
            let identity = &self.identity;
            self.config
                .word_retry
                .run(self.sleeper.as_ref(), "targeted batch", || {
                    words.targeted_batch(identity, &diagnosis)
                })
        };
        let queue: Vec<String> = match batch {
            Ok(words) => words
                .into_iter()
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect(),
            Err(err) => return Err(self.fail_analysis(phase1, SessionError::TargetedBatch(err))),
        };

        info!(
            "entering targeted phase: {} problem letters, {} queued words",
            diagnosis.problematic_letters.len(),
            queue.len()
        );
        self.stage = Stage::Active {
            phase: PhaseState::Targeted(TargetedPhase {
                phase1,
                diagnosis,
                queue,
                cursor: 0,
                results: ResultAggregator::new(),
            }),
            word: WordSlot::Pending,
        };
        self.phase_log.push(Phase::Targeted);
        self.request_word();
        Ok(())
    }

    fn fail_analysis(&mut self, phase1: Vec<Attempt>, error: SessionError) -> SessionError {
        warn!(
            "session {} cannot enter the targeted phase: {error}",
            self.identity.session_id
        );
        self.stage = Stage::AnalysisFailed {
            phase1,
            error: error.clone(),
        };
        error
    }

    /// Merge both phases and hold them until a save succeeds
    fn close_targeted(&mut self) {
        let results = match &self.stage {
            Stage::Active {
                phase: PhaseState::Targeted(targeted),
                ..
            } => FinalResults {
                phase1: targeted.phase1.clone(),
                phase2: targeted.results.snapshot_phase(),
                merged: merge(&targeted.phase1, targeted.results.attempts()),
                diagnosis: targeted.diagnosis.clone(),
            },
            _ => return,
        };
        info!(
            "session {} finished both phases with {} attempts",
            self.identity.session_id,
            results.merged.len()
        );
        self.stage = Stage::Finishing(results);
    }

    fn save_final(&mut self) -> Result<SaveAck, SessionError> {
        let results = match &self.stage {
            Stage::Finishing(results) => results.clone(),
            _ => return Err(SessionError::NotFinishing),
        };
        let request = SaveRequest {
            identity: self.identity.clone(),
            attempts: results.merged.clone(),
            diagnosis: Some(results.diagnosis.clone()),
            is_complete: true,
        };

        let saved = {
            let persistence = &mut self.collaborators.persistence;
            self.config
                .save_retry
                .run(self.sleeper.as_ref(), "save", || persistence.save(&request))
        };
        match saved {
            Ok(ack) => {
                info!(
                    "session {} saved with {} attempts",
                    ack.session_id, ack.attempts_saved
                );
                self.stage = Stage::Completed {
                    results,
                    ack: ack.clone(),
                };
                Ok(ack)
            }
            Err(err) => {
                warn!(
                    "saving session {} failed, results kept for retry: {err}",
                    self.identity.session_id
                );
                Err(SessionError::Persistence(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::LocalAnalyzer;
    use crate::gateway::WordSupplier;
    use crate::policy::{NoSleep, RecordingSleeper};
    use crate::store::SqliteStore;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Hands out words in order, then the targeted batch
    struct ScriptedWords {
        words: VecDeque<String>,
        batch: Vec<String>,
    }

    impl ScriptedWords {
        fn new(words: &[&str], batch: &[&str]) -> Self {
            Self {
                words: words.iter().map(|w| w.to_string()).collect(),
                batch: batch.iter().map(|w| w.to_string()).collect(),
            }
        }
    }

    impl WordSupplier for ScriptedWords {
        fn next_word(&mut self, _request: &WordRequest<'_>) -> Result<String, GatewayError> {
            self.words
                .pop_front()
                .ok_or_else(|| GatewayError::Unavailable("script exhausted".into()))
        }

        fn targeted_batch(
            &mut self,
            _identity: &SessionIdentity,
            _diagnosis: &Diagnosis,
        ) -> Result<Vec<String>, GatewayError> {
            Ok(self.batch.clone())
        }
    }

    fn answer(s: &mut AssessmentSession, input: &str, elapsed_ms: i64) -> Feedback {
        let feedback = s.submit(input, elapsed_ms).unwrap();
        s.advance().unwrap();
        feedback
    }

    fn session(words: &[&str], batch: &[&str]) -> AssessmentSession {
        let collaborators = Collaborators::new(
            ScriptedWords::new(words, batch),
            LocalAnalyzer,
            SqliteStore::open_in_memory().unwrap(),
        );
        AssessmentSession::new(
            SessionIdentity::new("s-1", "mia", "T-42"),
            SessionConfig::immediate(),
            collaborators,
        )
        .with_sleeper(NoSleep)
    }

    #[test]
    fn new_session_is_loading() {
        let s = session(&["cat"], &[]);
        assert_eq!(s.status(), SessionStatus::AwaitingWord);
        assert!(s.is_loading());
        assert!(s.current_word().is_none());
        assert_eq!(s.phase(), Phase::Initial);
        assert_eq!(s.rolling_accuracy(), 100.0);
        assert_eq!(s.difficulty(), DifficultyTier::Easy);
    }

    #[test]
    fn start_presents_word() {
        let mut s = session(&["cat"], &[]);
        s.start().unwrap();
        assert_eq!(s.status(), SessionStatus::AwaitingInput);
        let word = s.current_word().unwrap();
        assert_eq!(word.text, "cat");
        assert_eq!(word.source, WordSource::Supplier);
        assert_eq!(s.history(), ["cat".to_string()]);
    }

    #[test]
    fn submit_before_start_is_rejected() {
        let mut s = session(&["cat"], &[]);
        assert_matches!(s.submit("cat", 10), Err(SessionError::NotAwaitingInput));
        assert!(s.attempts_this_phase().is_empty());
    }

    #[test]
    fn negative_elapsed_does_not_record() {
        let mut s = session(&["cat"], &[]);
        s.start().unwrap();
        assert_matches!(s.submit("cat", -3), Err(SessionError::Input(_)));
        assert!(s.attempts_this_phase().is_empty());
        assert_eq!(s.status(), SessionStatus::AwaitingInput);
        assert_eq!(s.rolling_accuracy(), 100.0);
    }

    #[test]
    fn submit_updates_accuracy_and_tier() {
        let mut s = session(&["book", "cat"], &[]);
        s.start().unwrap();
        let feedback = s.submit("boko", 800).unwrap();

        assert!(!feedback.attempt.correct);
        assert_eq!(feedback.attempt.mistake_count, 2);
        assert_eq!(feedback.rolling_accuracy, 75.0);
        assert_eq!(feedback.difficulty, DifficultyTier::Medium);
        assert_eq!(feedback.next, NextStep::NextWord);
        assert_eq!(s.cumulative_mistakes(), 2);
        assert_eq!(s.last_feedback(), Some(feedback.message.as_str()));
        assert!(s.is_loading());

        assert_eq!(s.advance().unwrap(), Progress::WordReady);
        assert_eq!(s.current_word().unwrap().text, "cat");
    }

    #[test]
    fn feedback_pause_runs_in_advance() {
        let sleeper = RecordingSleeper::new();
        let collaborators = Collaborators::new(
            ScriptedWords::new(&["cat", "dog"], &[]),
            LocalAnalyzer,
            SqliteStore::open_in_memory().unwrap(),
        );
        let mut s = AssessmentSession::new(
            SessionIdentity::new("s-1", "mia", "T-42"),
            SessionConfig::default(),
            collaborators,
        )
        .with_sleeper(sleeper.clone());
        s.start().unwrap();

        s.submit("cat", 400).unwrap();
        assert!(sleeper.pauses().is_empty());
        s.advance().unwrap();
        assert_eq!(sleeper.pauses(), vec![Duration::from_millis(1500)]);
        assert_eq!(s.current_word().unwrap().text, "dog");
    }

    #[test]
    fn advance_with_word_on_screen_does_nothing() {
        let mut s = session(&["cat", "dog"], &[]);
        s.start().unwrap();
        assert_eq!(s.advance().unwrap(), Progress::WordReady);
        assert_eq!(s.current_word().unwrap().text, "cat");
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn queued_words_are_used_in_targeted_phase() {
        let mut s = session(
            &["cat", "dog", "sun", "tree", "book"],
            &["bed", "bud", "dab", "bid", "dub"],
        );
        s.start().unwrap();
        for input in ["cat", "dog", "son", "tree"] {
            answer(&mut s, input, 500);
        }
        let feedback = s.submit("book", 500).unwrap();
        assert_eq!(feedback.next, NextStep::Analyze);
        assert_eq!(s.status(), SessionStatus::Analyzing);
        assert_eq!(s.phase(), Phase::Analyzing);

        assert_eq!(s.advance().unwrap(), Progress::EnteredTargeted);
        assert_eq!(s.phase(), Phase::Targeted);
        let word = s.current_word().unwrap();
        assert_eq!(word.text, "bed");
        assert_eq!(word.source, WordSource::Queue);
        assert!(s.attempts_this_phase().is_empty());
        assert_eq!(s.phase1_attempts().unwrap().len(), 5);
    }

    #[test]
    fn full_session_completes_and_saves() {
        let mut s = session(
            &["cat", "dog", "sun", "tree", "book"],
            &["bed", "bud", "dab", "bid", "dub"],
        );
        s.start().unwrap();
        for input in ["cat", "dog", "son", "tree", "book", "bed", "bub", "dab", "dib"] {
            answer(&mut s, input, 500);
        }
        let last = s.submit("dub", 700).unwrap();
        assert_eq!(last.next, NextStep::Save);
        assert_eq!(s.status(), SessionStatus::Finishing);
        assert_eq!(s.merged_results().unwrap().len(), 10);

        assert_matches!(s.advance(), Ok(Progress::Completed(ack)) if ack.attempts_saved == 10);
        assert_eq!(s.status(), SessionStatus::Completed);
        assert_eq!(s.merged_results().unwrap().len(), 10);
        assert_eq!(s.save_ack().unwrap().attempts_saved, 10);
        assert_eq!(
            s.phase_log(),
            [Phase::Initial, Phase::Analyzing, Phase::Targeted]
        );
        assert_matches!(s.submit("x", 1), Err(SessionError::Terminated));
    }

    #[test]
    fn abort_after_completion_is_noop() {
        let mut s = session(
            &["cat", "dog", "sun", "tree", "book"],
            &["bed", "bud", "dab", "bid", "dub"],
        );
        s.start().unwrap();
        for input in ["cat", "dog", "sun", "tree", "book", "bed", "bud", "dab", "bid", "dub"] {
            answer(&mut s, input, 100);
        }
        assert_eq!(s.abort(), AbortOutcome::AlreadyFinished);
        assert_eq!(s.status(), SessionStatus::Completed);
    }

    #[test]
    fn retry_save_outside_finishing() {
        let mut s = session(&["cat"], &[]);
        assert_matches!(s.retry_save(), Err(SessionError::NotFinishing));
    }

    #[test]
    fn aborted_session_keeps_phase_views() {
        let mut s = session(
            &["cat", "dog", "sun", "tree", "book"],
            &["bed", "bud", "dab", "bid", "dub"],
        );
        s.start().unwrap();
        for input in ["cat", "dog", "son", "tree", "book", "bed", "bub"] {
            answer(&mut s, input, 100);
        }
        s.abort();

        assert_eq!(s.status(), SessionStatus::Aborted);
        assert_eq!(s.phase1_attempts().unwrap().len(), 5);
        assert_eq!(s.attempts_this_phase().len(), 2);
        assert_eq!(s.attempts_this_phase()[1].input, "bub");
        assert_eq!(s.aborted_attempts().unwrap().len(), 7);
    }

    #[test]
    fn aborted_in_first_phase_has_no_phase_one() {
        let mut s = session(&["cat", "dog", "sun"], &[]);
        s.start().unwrap();
        answer(&mut s, "cat", 100);
        answer(&mut s, "dgo", 100);
        s.abort();

        assert!(s.phase1_attempts().is_none());
        assert_eq!(s.attempts_this_phase(), s.aborted_attempts().unwrap());
    }
}
