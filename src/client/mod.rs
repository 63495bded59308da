// Session Client - the boundary to the remote transcribe-and-score service.

mod types;
mod wire;

pub use types::{
    ClientError, GrammarCorrection, PronunciationIssue, ResponseSubmission, ScoreReport, Scores,
    SessionKind, StartSessionRequest, StartedSession, SubmittedResponse,
};

use crate::audio::AudioBuffer;
use crate::exam::{Mood, Voice};
use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

const TIMEOUT_SECS: u64 = 30;

/// Remote session boundary. The engine only ever talks through this trait,
/// so tests can swap in a scripted fake.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Start a session; the response carries the part/question structure.
    async fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<StartedSession, ClientError>;

    /// Submit one recorded answer for transcription.
    async fn submit_response(
        &self,
        submission: ResponseSubmission,
    ) -> Result<SubmittedResponse, ClientError>;

    /// Convert the accumulated responses into a score report. Responses are
    /// already persisted server-side, so retrying never re-uploads audio.
    async fn finalize_session(
        &self,
        session_id: &str,
        mood: Mood,
    ) -> Result<ScoreReport, ClientError>;

    /// Synthesized speech for a prompt text. Advisory channel.
    async fn synthesize_speech(&self, text: &str, voice: Voice) -> Result<Vec<u8>, ClientError>;

    /// Best-effort follow-up question for a given answer.
    async fn request_follow_up(
        &self,
        question: &str,
        answer: &str,
        part_id: &str,
    ) -> Result<String, ClientError>;
}

pub struct HttpSessionClient {
    base_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpSessionClient {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_transport(e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl SessionApi for HttpSessionClient {
    async fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<StartedSession, ClientError> {
        let body = json!({
            "type": request.kind.as_str(),
            "part": request.part,
            "test_id": request.test_id,
        });

        let response = self
            .client
            .post(self.url("/api/sessions/start"))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(wire::start_session_error(status.as_u16(), detail));
        }

        let payload: wire::StartSessionPayload = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;

        let started = wire::into_started_session(payload, &request.part)?;
        info!(
            "Session {} started: {} part(s)",
            started.session_id,
            started.definition.parts.len()
        );
        Ok(started)
    }

    async fn submit_response(
        &self,
        submission: ResponseSubmission,
    ) -> Result<SubmittedResponse, ClientError> {
        let wav_bytes = encode_wav(&submission.audio)
            .ok_or_else(|| ClientError::Transcription("empty audio buffer".to_string()))?;

        info!(
            "Submitting {:.1}s answer for part {}",
            submission.audio.duration_secs, submission.part_id
        );

        let file_part = multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ClientError::Service(e.to_string()))?;

        let mut form = multipart::Form::new()
            .text("question", submission.prompt_text.clone())
            .text("part", submission.part_id.clone())
            .part("audio", file_part);
        if let Some(side) = submission.debate_side {
            form = form.text("debate_side", side.as_str());
        }

        let path = format!("/api/sessions/{}/respond", submission.session_id);
        let response = self
            .client
            .post(self.url(&path))
            .bearer_auth(&self.auth_token)
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(wire::submit_error(status.as_u16(), detail));
        }

        let payload: wire::RespondPayload = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;

        Ok(SubmittedResponse {
            transcript: clean_transcript(&payload.transcription),
            duration_secs: payload.duration.max(0) as u32,
        })
    }

    async fn finalize_session(
        &self,
        session_id: &str,
        mood: Mood,
    ) -> Result<ScoreReport, ClientError> {
        let path = format!("/api/sessions/{}/complete", session_id);
        let response = self
            .client
            .post(self.url(&path))
            .bearer_auth(&self.auth_token)
            .json(&json!({ "mood": mood.as_str() }))
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(wire::finalize_error(status.as_u16(), detail));
        }

        let payload: wire::CompletePayload = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;

        Ok(payload.into_report())
    }

    async fn synthesize_speech(&self, text: &str, voice: Voice) -> Result<Vec<u8>, ClientError> {
        let response = self
            .client
            .post(self.url("/api/tts"))
            .bearer_auth(&self.auth_token)
            .json(&json!({ "text": text, "voice": voice.as_str() }))
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Service(format!("TTS failed: HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn request_follow_up(
        &self,
        question: &str,
        answer: &str,
        part_id: &str,
    ) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/api/follow-up"))
            .bearer_auth(&self.auth_token)
            .json(&json!({
                "question": question,
                "answer": answer,
                "part": part_id,
            }))
            .send()
            .await
            .map_err(Self::map_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Service(format!(
                "follow-up failed: HTTP {}",
                status
            )));
        }

        let payload: wire::FollowUpPayload = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;
        Ok(payload.follow_up_question)
    }
}

/// Strip `[mm:ss]`-style timestamp tags some transcription backends leak
/// into the text, and collapse whitespace.
pub(crate) fn clean_transcript(text: &str) -> String {
    static TS_RE: OnceLock<Regex> = OnceLock::new();
    let re = TS_RE.get_or_init(|| {
        Regex::new(r"\[\d{2}:\d{2}.*?\]|\(\d{2}:\d{2}\)").expect("valid timestamp regex")
    });
    let stripped = re.replace_all(text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// PCM i16 -> RIFF/WAV bytes for the multipart upload. None for an empty
/// buffer.
pub(crate) fn encode_wav(audio: &AudioBuffer) -> Option<Vec<u8>> {
    if audio.samples.is_empty() {
        return None;
    }

    let sample_rate = audio.sample_rate;
    let channels = audio.channels.max(1);
    let samples = &audio.samples;

    let mut wav = Vec::with_capacity(44 + samples.len() * 2);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    let file_size = (36 + samples.len() * 2) as u32;
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * channels as u32 * 2;
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&(channels * 2).to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    // data chunk
    wav.extend_from_slice(b"data");
    let data_size = (samples.len() * 2) as u32;
    wav.extend_from_slice(&data_size.to_le_bytes());

    for &sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    Some(wav)
}
