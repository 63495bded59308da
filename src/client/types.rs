// Session API types and error taxonomy.

use crate::audio::AudioBuffer;
use crate::exam::{DebateSide, ExamDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Practice drills one part; mock runs a full scripted test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Practice,
    Mock,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Practice => "practice",
            SessionKind::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartSessionRequest {
    pub kind: SessionKind,
    /// Part id to drill in practice mode ("1.1", "1.2", "2", "3").
    pub part: String,
    /// Specific scripted test to run in mock mode; server picks otherwise.
    pub test_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session_id: String,
    pub definition: ExamDefinition,
}

#[derive(Debug, Clone)]
pub struct ResponseSubmission {
    pub session_id: String,
    pub part_id: String,
    pub prompt_text: String,
    pub debate_side: Option<DebateSide>,
    pub audio: AudioBuffer,
}

#[derive(Debug, Clone)]
pub struct SubmittedResponse {
    pub transcript: String,
    pub duration_secs: u32,
}

/// 0-75 integer scale per criterion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Scores {
    pub overall: u8,
    pub fluency: u8,
    pub lexical: u8,
    pub grammar: u8,
    pub pronunciation: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarCorrection {
    pub original: String,
    pub corrected: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PronunciationIssue {
    pub word: String,
    pub tip: String,
}

#[derive(Debug, Clone)]
pub struct ScoreReport {
    pub scores: Scores,
    pub feedback: String,
    pub cefr_level: Option<String>,
    pub grammar_corrections: Vec<GrammarCorrection>,
    pub pronunciation_issues: Vec<PronunciationIssue>,
}

/// Session API errors with retry classification.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session limit reached: {0}")]
    LimitExceeded(String),

    #[error("authentication failed")]
    Unauthorized,

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("scoring failed: {0}")]
    Scoring(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout")]
    Timeout,

    #[error("service error: {0}")]
    Service(String),

    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
}

impl ClientError {
    /// Transient failures that may be retried without losing collected
    /// responses. Quota and auth failures get their own UX instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transcription(_)
                | ClientError::Scoring(_)
                | ClientError::Network(_)
                | ClientError::Timeout
                | ClientError::Service(_)
        )
    }
}
