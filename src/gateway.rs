//! Contracts for the collaborators the session controller calls through.
//!
//! Word supply, pattern analysis and persistence live behind these traits.
//! The controller owns one of each and calls them synchronously from inside
//! its event handlers, so implementations may block.

use crate::difficulty::DifficultyTier;
use crate::scoring::Attempt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Opaque identity passed through to every collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub session_id: String,
    pub username: String,
    pub therapist_code: String,
}

impl SessionIdentity {
    pub fn new(
        session_id: impl Into<String>,
        username: impl Into<String>,
        therapist_code: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            username: username.into(),
            therapist_code: therapist_code.into(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Initial,
    Analyzing,
    Targeted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionPair {
    pub confuses: String,
    pub with: String,
}

impl ConfusionPair {
    pub fn new(confuses: impl Into<String>, with: impl Into<String>) -> Self {
        Self {
            confuses: confuses.into(),
            with: with.into(),
        }
    }
}

/// Output of the analysis collaborator. Fields the core does not know are kept
/// in `extra` and serialized back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub problematic_letters: BTreeSet<String>,
    #[serde(default)]
    pub confusion_pairs: Vec<ConfusionPair>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything a supplier gets when asked for the next word
#[derive(Debug, Clone, PartialEq)]
pub struct WordRequest<'a> {
    pub identity: &'a SessionIdentity,
    pub phase: Phase,
    pub difficulty: DifficultyTier,
    pub history: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub identity: SessionIdentity,
    pub attempts: Vec<Attempt>,
    pub diagnosis: Option<Diagnosis>,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveAck {
    pub session_id: String,
    pub attempts_saved: usize,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("malformed payload: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

pub trait WordSupplier {
    /// One word for the current phase and difficulty hint
    fn next_word(&mut self, request: &WordRequest<'_>) -> Result<String, GatewayError>;

    /// Words for the targeted phase, seeded with the phase 1 diagnosis
    fn targeted_batch(
        &mut self,
        identity: &SessionIdentity,
        diagnosis: &Diagnosis,
    ) -> Result<Vec<String>, GatewayError>;
}

pub trait AnalysisClient {
    fn analyze(
        &mut self,
        identity: &SessionIdentity,
        attempts: &[Attempt],
    ) -> Result<Diagnosis, GatewayError>;
}

pub trait PersistenceClient {
    fn save(&mut self, request: &SaveRequest) -> Result<SaveAck, GatewayError>;
}

/// The three collaborators a session is wired to
pub struct Collaborators {
    pub words: Box<dyn WordSupplier>,
    pub analysis: Box<dyn AnalysisClient>,
    pub persistence: Box<dyn PersistenceClient>,
}

impl Collaborators {
    pub fn new(
        words: impl WordSupplier + 'static,
        analysis: impl AnalysisClient + 'static,
        persistence: impl PersistenceClient + 'static,
    ) -> Self {
        Self {
            words: Box::new(words),
            analysis: Box::new(analysis),
            persistence: Box::new(persistence),
        }
    }
}
