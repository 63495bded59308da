// Wire payloads and HTTP status mapping for the session backend.

use super::types::{
    ClientError, GrammarCorrection, PronunciationIssue, ScoreReport, Scores, StartedSession,
};
use crate::exam::{DebateSpec, ExamDefinition, PartKind, PartSpec, PromptSpec};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub(super) struct StartSessionPayload {
    pub session_id: i64,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub part_data: Option<PartPayload>,
    #[serde(default)]
    pub test: Option<TestPayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PartPayload {
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub for_points: Vec<String>,
    #[serde(default)]
    pub against_points: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TestPayload {
    #[serde(default)]
    pub parts: BTreeMap<String, PartPayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RespondPayload {
    pub transcription: String,
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct FollowUpPayload {
    pub follow_up_question: String,
}

#[derive(Debug, Deserialize, Default)]
pub(super) struct ScoresPayload {
    #[serde(default)]
    pub overall: u8,
    #[serde(default)]
    pub fluency: u8,
    #[serde(default)]
    pub lexical: u8,
    #[serde(default)]
    pub grammar: u8,
    #[serde(default)]
    pub pronunciation: u8,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompletePayload {
    #[serde(default)]
    pub scores: ScoresPayload,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub cefr_level: Option<String>,
    #[serde(default)]
    pub grammar_corrections: Vec<GrammarCorrection>,
    #[serde(default)]
    pub pronunciation_issues: Vec<PronunciationIssue>,
}

impl CompletePayload {
    pub(super) fn into_report(self) -> ScoreReport {
        ScoreReport {
            scores: Scores {
                overall: self.scores.overall,
                fluency: self.scores.fluency,
                lexical: self.scores.lexical,
                grammar: self.scores.grammar,
                pronunciation: self.scores.pronunciation,
            },
            feedback: self.feedback,
            cefr_level: self.cefr_level,
            grammar_corrections: self.grammar_corrections,
            pronunciation_issues: self.pronunciation_issues,
        }
    }
}

fn build_part(part_id: &str, payload: PartPayload) -> Result<PartSpec, ClientError> {
    let kind = PartKind::from_part_id(part_id)
        .ok_or_else(|| ClientError::InvalidPayload(format!("unknown part id '{}'", part_id)))?;

    let mut part = PartSpec::new(part_id, kind);
    part.images = payload.images;

    if kind == PartKind::Debate {
        part.debate = payload.topic.map(|topic| DebateSpec {
            topic,
            for_points: payload.for_points,
            against_points: payload.against_points,
        });
    } else {
        part.prompts = payload
            .questions
            .into_iter()
            .map(|q| PromptSpec::for_kind(q, kind))
            .collect();
    }

    Ok(part)
}

/// Assemble the immutable exam definition out of whichever shape the server
/// answered with: a full scripted test (mock), a debate/picture part_data
/// block, or a flat question list for the requested part.
pub(super) fn into_started_session(
    payload: StartSessionPayload,
    requested_part: &str,
) -> Result<StartedSession, ClientError> {
    let session_id = payload.session_id.to_string();

    let parts = if let Some(test) = payload.test {
        // BTreeMap ordering matches the exam order: 1.1, 1.2, 2, 3.
        test.parts
            .into_iter()
            .map(|(id, part)| build_part(&id, part))
            .collect::<Result<Vec<_>, _>>()?
    } else if let Some(part_data) = payload.part_data {
        vec![build_part(requested_part, part_data)?]
    } else {
        vec![build_part(
            requested_part,
            PartPayload {
                questions: payload.questions,
                images: payload.images,
                topic: None,
                for_points: Vec::new(),
                against_points: Vec::new(),
            },
        )?]
    };

    Ok(StartedSession {
        session_id,
        definition: ExamDefinition { parts },
    })
}

/// FastAPI-style error bodies carry a "detail" field; fall back to the raw
/// text when the body is not JSON.
fn error_detail(body: String) -> String {
    #[derive(Deserialize)]
    struct Detail {
        detail: String,
    }
    serde_json::from_str::<Detail>(&body)
        .map(|d| d.detail)
        .unwrap_or(body)
}

pub(super) fn start_session_error(status: u16, body: String) -> ClientError {
    match status {
        401 => ClientError::Unauthorized,
        402 | 403 | 429 => ClientError::LimitExceeded(error_detail(body)),
        _ => ClientError::Service(format!("HTTP {}: {}", status, error_detail(body))),
    }
}

pub(super) fn submit_error(status: u16, body: String) -> ClientError {
    match status {
        401 => ClientError::Unauthorized,
        400..=499 => ClientError::Transcription(error_detail(body)),
        _ => ClientError::Service(format!("HTTP {}: {}", status, error_detail(body))),
    }
}

pub(super) fn finalize_error(status: u16, body: String) -> ClientError {
    match status {
        401 => ClientError::Unauthorized,
        _ => ClientError::Scoring(format!("HTTP {}: {}", status, error_detail(body))),
    }
}
