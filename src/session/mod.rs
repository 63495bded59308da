// Exam flow engine: sequences parts and prompts, owns the exam-level
// recording rules (minimum duration, auto-stop, auto-advance) and drives
// the remote transcription and scoring steps.
//
// The engine is single-threaded: the host calls its methods from one task
// and feeds back every `EngineEvent` it reads from the channel returned by
// `ExamEngine::new`. Spawned work (timers, submissions) only ever talks to
// the engine through that channel, and every event carries the epoch it was
// scheduled under so stale events are dropped after a cancel or skip.

use crate::audio::{Recorder, RecorderError};
use crate::client::{
    ClientError, ResponseSubmission, ScoreReport, SessionApi, StartSessionRequest, SubmittedResponse,
};
use crate::config::AppConfig;
use crate::exam::{
    DebateSide, ExamDefinition, Mood, PartKind, PromptSpec, RecordingPhase, ResponseRecord, Voice,
    AUTO_ADVANCE_SECS, PREPARATION_SECS,
};
use crate::playback::{AudioSink, PromptPlayer};
use crate::timer::Countdown;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

pub use crate::client::SessionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamPhase {
    Intro,
    PartTransition,
    DebateSideChoice,
    Prompting,
    Preparing,
    RecordingReady,
    Recording,
    Submitting,
    AutoAdvancePending,
    ContentUnavailable,
    Finalizing,
    Results,
    Failed,
    Exited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Quota exhausted. Render an upgrade prompt, not a retry prompt.
    LimitExceeded(String),
    /// Identity could not be established; re-authentication is handled
    /// outside the engine.
    Unauthorized,
    /// Session could not be started; retrying returns to the intro.
    SessionStart(String),
    /// A submission failed. Nothing was appended; retry re-enters
    /// RecordingReady for the same prompt.
    Submission(String),
    /// Scoring failed. Responses are preserved server-side, so retry
    /// re-runs finalization without re-recording.
    Scoring(String),
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::SessionStart(_) | FailureKind::Submission(_) | FailureKind::Scoring(_)
        )
    }
}

/// Events produced by spawned work. The host forwards every one of these to
/// [`ExamEngine::handle_event`].
#[derive(Debug)]
pub enum EngineEvent {
    PreparationTick {
        remaining: u32,
        epoch: u64,
    },
    PreparationExpired {
        epoch: u64,
    },
    RecordingTick {
        elapsed: u32,
        epoch: u64,
    },
    RecordingLimitReached {
        epoch: u64,
    },
    AutoAdvanceTick {
        remaining: u32,
        epoch: u64,
    },
    AutoAdvanceExpired {
        epoch: u64,
    },
    SubmissionCompleted {
        epoch: u64,
        outcome: Result<SubmittedResponse, ClientError>,
    },
    FinalizationCompleted {
        epoch: u64,
        outcome: Result<ScoreReport, ClientError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Below the prompt minimum; recording continues. The hint carries the
    /// seconds still required.
    TooShort { remaining_secs: u32 },
    /// Recording accepted and handed to the session client.
    Submitted,
    /// A stop arrived after the auto-stop already fired; nothing to do.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// At least one response exists; the engine jumped to finalization.
    Finalizing,
    /// Zero responses; the session is abandoned with no remote call.
    Abandoned,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("action not allowed in phase {0:?}")]
    State(ExamPhase),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Mutable per-session state. Created on start, mutated only by the engine,
/// discarded when the user exits or the exam completes.
#[derive(Debug)]
pub struct SessionState {
    pub session_id: String,
    pub definition: ExamDefinition,
    pub part_index: usize,
    pub prompt_index: usize,
    pub responses: Vec<ResponseRecord>,
    pub recording_phase: RecordingPhase,
    pub debate_side: Option<DebateSide>,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub kind: SessionKind,
    pub part: String,
    pub test_id: Option<i64>,
    pub voice: Option<Voice>,
    pub mood: Mood,
    pub transcription_visible: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            kind: SessionKind::Practice,
            part: "1.1".to_string(),
            test_id: None,
            voice: None,
            mood: Mood::Normal,
            transcription_visible: true,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            voice: config.voice(),
            mood: config.mood(),
            transcription_visible: config.transcription_visible,
            ..Self::default()
        }
    }
}

pub struct ExamEngine {
    client: Arc<dyn SessionApi>,
    recorder: Recorder,
    player: PromptPlayer,
    events_tx: UnboundedSender<EngineEvent>,
    options: EngineOptions,

    phase: ExamPhase,
    failure: Option<FailureKind>,
    state: Option<SessionState>,
    report: Option<ScoreReport>,

    prep_timer: Option<Countdown>,
    advance_timer: Option<Countdown>,
    /// Bumped whenever a timer, capture or remote call is (re)scheduled;
    /// events carrying an older epoch are stale and ignored.
    epoch: u64,

    prep_remaining: u32,
    elapsed_secs: u32,
    advance_remaining: u32,
}

impl ExamEngine {
    pub fn new(
        client: Arc<dyn SessionApi>,
        recorder: Recorder,
        sink: Arc<dyn AudioSink>,
        options: EngineOptions,
    ) -> (Self, UnboundedReceiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let player = PromptPlayer::new(client.clone(), sink);
        let engine = Self {
            client,
            recorder,
            player,
            events_tx,
            options,
            phase: ExamPhase::Intro,
            failure: None,
            state: None,
            report: None,
            prep_timer: None,
            advance_timer: None,
            epoch: 0,
            prep_remaining: 0,
            elapsed_secs: 0,
            advance_remaining: 0,
        };
        (engine, events_rx)
    }

    // ----- read-only projections -----

    pub fn phase(&self) -> ExamPhase {
        self.phase
    }

    pub fn failure(&self) -> Option<&FailureKind> {
        self.failure.as_ref()
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        self.state.as_ref().map(|s| s.responses.as_slice()).unwrap_or(&[])
    }

    pub fn report(&self) -> Option<&ScoreReport> {
        self.report.as_ref()
    }

    pub fn transcription_visible(&self) -> bool {
        self.options.transcription_visible
    }

    pub fn is_capturing(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Elapsed seconds of the active recording, for the stop-hint display.
    pub fn recording_elapsed_secs(&self) -> u32 {
        self.elapsed_secs.max(self.recorder.elapsed_secs())
    }

    pub fn preparation_remaining_secs(&self) -> u32 {
        self.prep_remaining
    }

    pub fn auto_advance_remaining_secs(&self) -> u32 {
        self.advance_remaining
    }

    /// The prompt currently awaiting an answer. For a debate part the topic
    /// text stands in for the prompt.
    pub fn current_prompt(&self) -> Option<PromptSpec> {
        let state = self.state.as_ref()?;
        let part = state.definition.part(state.part_index)?;
        match part.kind {
            PartKind::Debate => part
                .debate
                .as_ref()
                .map(|d| PromptSpec::for_kind(d.topic.clone(), PartKind::Debate)),
            _ => part.prompts.get(state.prompt_index).cloned(),
        }
    }

    // ----- user actions -----

    /// Start the remote session and enter the first part.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.phase != ExamPhase::Intro {
            return Err(EngineError::State(self.phase));
        }

        let request = StartSessionRequest {
            kind: self.options.kind,
            part: self.options.part.clone(),
            test_id: self.options.test_id,
        };

        match self.client.start_session(request).await {
            Ok(started) => {
                info!("Exam session {} underway", started.session_id);
                self.state = Some(SessionState {
                    session_id: started.session_id,
                    definition: started.definition,
                    part_index: 0,
                    prompt_index: 0,
                    responses: Vec::new(),
                    recording_phase: RecordingPhase::Idle,
                    debate_side: None,
                });
                self.enter_part(0);
                Ok(())
            }
            Err(e) => {
                warn!("Session start failed: {}", e);
                self.fail(match e {
                    ClientError::LimitExceeded(msg) => FailureKind::LimitExceeded(msg),
                    ClientError::Unauthorized => FailureKind::Unauthorized,
                    other => FailureKind::SessionStart(other.to_string()),
                });
                Ok(())
            }
        }
    }

    /// Commit to a debate side. A side, once chosen, is immutable for the
    /// remainder of the session.
    pub fn choose_debate_side(&mut self, side: DebateSide) -> Result<(), EngineError> {
        if self.phase != ExamPhase::DebateSideChoice {
            return Err(EngineError::State(self.phase));
        }
        let state = self.state.as_mut().ok_or(EngineError::State(self.phase))?;
        if state.debate_side.is_none() {
            state.debate_side = Some(side);
            info!("Debate side chosen: {}", side.as_str());
        }
        self.show_prompt();
        Ok(())
    }

    /// Force the preparation countdown to expire early.
    pub fn skip_preparation(&mut self) -> Result<(), EngineError> {
        if self.phase != ExamPhase::Preparing {
            return Err(EngineError::State(self.phase));
        }
        if let Some(timer) = self.prep_timer.take() {
            timer.cancel();
        }
        self.epoch += 1;
        self.prep_remaining = 0;
        self.phase = ExamPhase::RecordingReady;
        Ok(())
    }

    /// Start capturing the answer. Cancels prompt playback first: the
    /// microphone and the speaker are never live together.
    pub fn begin_recording(&mut self) -> Result<(), EngineError> {
        if self.phase != ExamPhase::RecordingReady {
            return Err(EngineError::State(self.phase));
        }
        let prompt = self.current_prompt().ok_or(EngineError::State(self.phase))?;

        self.player.cancel();

        self.epoch += 1;
        let epoch = self.epoch;
        let tick_tx = self.events_tx.clone();
        let limit_tx = self.events_tx.clone();
        self.recorder.start(
            Some(prompt.max_duration_secs),
            move |elapsed| {
                let _ = tick_tx.send(EngineEvent::RecordingTick { elapsed, epoch });
            },
            move || {
                let _ = limit_tx.send(EngineEvent::RecordingLimitReached { epoch });
            },
        )?;

        self.elapsed_secs = 0;
        self.set_recording_phase(RecordingPhase::Recording);
        self.phase = ExamPhase::Recording;
        Ok(())
    }

    /// User tap on stop. Rejected with a hint while under the prompt's
    /// minimum duration; a no-op if the auto-stop already fired.
    pub fn request_stop(&mut self) -> Result<StopOutcome, EngineError> {
        match self.phase {
            ExamPhase::Recording => {}
            ExamPhase::Submitting => return Ok(StopOutcome::Ignored),
            other => return Err(EngineError::State(other)),
        }

        let prompt = self.current_prompt().ok_or(EngineError::State(self.phase))?;
        let elapsed = self.recording_elapsed_secs();
        if elapsed < prompt.min_duration_secs {
            let remaining_secs = prompt.min_duration_secs - elapsed;
            info!("Stop rejected: {}s still required", remaining_secs);
            return Ok(StopOutcome::TooShort { remaining_secs });
        }

        self.finish_recording();
        Ok(StopOutcome::Submitted)
    }

    /// Manual "Next" during the auto-advance grace period.
    pub fn next(&mut self) -> Result<(), EngineError> {
        if self.phase != ExamPhase::AutoAdvancePending {
            return Err(EngineError::State(self.phase));
        }
        if let Some(timer) = self.advance_timer.take() {
            timer.cancel();
        }
        self.epoch += 1;
        self.advance();
        Ok(())
    }

    /// Continue from the between-parts screen into the next part.
    pub fn continue_to_next_part(&mut self) -> Result<(), EngineError> {
        if self.phase != ExamPhase::PartTransition {
            return Err(EngineError::State(self.phase));
        }
        let next_index = self
            .state
            .as_ref()
            .map(|s| s.part_index + 1)
            .ok_or(EngineError::State(self.phase))?;
        self.enter_part(next_index);
        Ok(())
    }

    /// Finish with whatever has been collected so far. With zero responses
    /// this is equivalent to abandoning the session: no remote call is
    /// made.
    pub fn finish_early(&mut self) -> Result<FinishOutcome, EngineError> {
        match self.phase {
            ExamPhase::Finalizing | ExamPhase::Results | ExamPhase::Exited => {
                return Err(EngineError::State(self.phase))
            }
            _ => {}
        }

        self.teardown_controllers();
        self.set_recording_phase(RecordingPhase::Idle);

        if self.responses().is_empty() {
            info!("Finish early with no responses: abandoning session");
            self.phase = ExamPhase::Exited;
            return Ok(FinishOutcome::Abandoned);
        }

        info!(
            "Finish early with {} response(s): finalizing",
            self.responses().len()
        );
        self.begin_finalizing();
        Ok(FinishOutcome::Finalizing)
    }

    /// Retry after a retryable failure.
    pub fn retry(&mut self) -> Result<(), EngineError> {
        if self.phase != ExamPhase::Failed {
            return Err(EngineError::State(self.phase));
        }
        match self.failure.take() {
            Some(FailureKind::Submission(_)) => {
                // Same prompt; the question pointer never advanced.
                self.phase = ExamPhase::RecordingReady;
                Ok(())
            }
            Some(FailureKind::Scoring(_)) => {
                self.begin_finalizing();
                Ok(())
            }
            Some(FailureKind::SessionStart(_)) => {
                self.state = None;
                self.phase = ExamPhase::Intro;
                Ok(())
            }
            other => {
                self.failure = other;
                Err(EngineError::State(self.phase))
            }
        }
    }

    /// Navigation away. Cancels every timer, releases the microphone and
    /// stops playback; collected responses stay readable on the state.
    pub fn exit(&mut self) {
        self.teardown_controllers();
        self.set_recording_phase(RecordingPhase::Idle);
        self.phase = ExamPhase::Exited;
        info!("Exam exited");
    }

    /// Best-effort follow-up question for the most recent answer. Advisory:
    /// any failure degrades to `None` and never blocks progression.
    pub async fn follow_up_hint(&self) -> Option<String> {
        let state = self.state.as_ref()?;
        let last = state.responses.last()?;
        let part = state
            .definition
            .parts
            .iter()
            .find(|p| p.part_id == last.part_id)?;
        if !matches!(part.kind, PartKind::LongTurn | PartKind::Debate) {
            return None;
        }

        match self
            .client
            .request_follow_up(&last.prompt_text, &last.transcript, &last.part_id)
            .await
        {
            Ok(question) => Some(question),
            Err(e) => {
                warn!("Follow-up unavailable: {}", e);
                None
            }
        }
    }

    // ----- event intake -----

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PreparationTick { remaining, epoch } => {
                if epoch == self.epoch && self.phase == ExamPhase::Preparing {
                    self.prep_remaining = remaining;
                }
            }
            EngineEvent::PreparationExpired { epoch } => {
                if epoch == self.epoch && self.phase == ExamPhase::Preparing {
                    self.prep_timer = None;
                    self.prep_remaining = 0;
                    self.phase = ExamPhase::RecordingReady;
                }
            }
            EngineEvent::RecordingTick { elapsed, epoch } => {
                if epoch == self.epoch && self.phase == ExamPhase::Recording {
                    self.elapsed_secs = elapsed;
                }
            }
            EngineEvent::RecordingLimitReached { epoch } => {
                if epoch == self.epoch && self.phase == ExamPhase::Recording {
                    info!("Maximum duration reached, auto-stopping");
                    self.finish_recording();
                }
            }
            EngineEvent::AutoAdvanceTick { remaining, epoch } => {
                if epoch == self.epoch && self.phase == ExamPhase::AutoAdvancePending {
                    self.advance_remaining = remaining;
                }
            }
            EngineEvent::AutoAdvanceExpired { epoch } => {
                if epoch == self.epoch && self.phase == ExamPhase::AutoAdvancePending {
                    self.advance_timer = None;
                    self.advance();
                }
            }
            EngineEvent::SubmissionCompleted { epoch, outcome } => {
                if epoch == self.epoch && self.phase == ExamPhase::Submitting {
                    self.on_submission_completed(outcome);
                }
            }
            EngineEvent::FinalizationCompleted { epoch, outcome } => {
                if epoch == self.epoch && self.phase == ExamPhase::Finalizing {
                    self.on_finalization_completed(outcome);
                }
            }
        }
    }

    // ----- internals -----

    fn enter_part(&mut self, index: usize) {
        let (prompt_count, kind, side_chosen) = {
            let state = match self.state.as_mut() {
                Some(s) => s,
                None => return,
            };
            state.part_index = index;
            state.prompt_index = 0;
            match state.definition.part(index) {
                Some(part) => (part.prompt_count(), part.kind, state.debate_side.is_some()),
                None => (0, PartKind::Interview, false),
            }
        };

        if prompt_count == 0 {
            warn!("No content available for part {}", index);
            self.phase = ExamPhase::ContentUnavailable;
            return;
        }

        if kind == PartKind::Debate && !side_chosen {
            self.phase = ExamPhase::DebateSideChoice;
            return;
        }

        self.show_prompt();
    }

    fn show_prompt(&mut self) {
        let prompt = match self.current_prompt() {
            Some(p) => p,
            None => {
                self.phase = ExamPhase::ContentUnavailable;
                return;
            }
        };

        self.phase = ExamPhase::Prompting;
        self.player.play(&prompt.text, self.options.voice);

        if prompt.allows_preparation {
            self.epoch += 1;
            let epoch = self.epoch;
            let tick_tx = self.events_tx.clone();
            let expire_tx = self.events_tx.clone();
            self.prep_remaining = PREPARATION_SECS;
            self.prep_timer = Some(Countdown::start(
                PREPARATION_SECS,
                move |remaining| {
                    let _ = tick_tx.send(EngineEvent::PreparationTick { remaining, epoch });
                },
                move || {
                    let _ = expire_tx.send(EngineEvent::PreparationExpired { epoch });
                },
            ));
            self.phase = ExamPhase::Preparing;
        } else {
            self.phase = ExamPhase::RecordingReady;
        }
    }

    fn finish_recording(&mut self) {
        let buffer = match self.recorder.stop() {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("Could not finalize capture: {}", e);
                self.set_recording_phase(RecordingPhase::Idle);
                self.fail(FailureKind::Submission(e.to_string()));
                return;
            }
        };

        let (session_id, part_id, debate_side) = {
            let state = match self.state.as_ref() {
                Some(s) => s,
                None => return,
            };
            let part = match state.definition.part(state.part_index) {
                Some(p) => p,
                None => return,
            };
            let side = match part.kind {
                PartKind::Debate => state.debate_side,
                _ => None,
            };
            (state.session_id.clone(), part.part_id.clone(), side)
        };
        let prompt_text = self
            .current_prompt()
            .map(|p| p.text)
            .unwrap_or_default();

        self.set_recording_phase(RecordingPhase::Processing);
        self.phase = ExamPhase::Submitting;
        self.epoch += 1;
        let epoch = self.epoch;

        let client = self.client.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = client
                .submit_response(ResponseSubmission {
                    session_id,
                    part_id,
                    prompt_text,
                    debate_side,
                    audio: buffer,
                })
                .await;
            let _ = tx.send(EngineEvent::SubmissionCompleted { epoch, outcome });
        });
    }

    fn on_submission_completed(&mut self, outcome: Result<SubmittedResponse, ClientError>) {
        match outcome {
            Ok(response) => {
                let (part_id, debate_side) = {
                    let state = match self.state.as_ref() {
                        Some(s) => s,
                        None => return,
                    };
                    let part = match state.definition.part(state.part_index) {
                        Some(p) => p,
                        None => return,
                    };
                    let side = match part.kind {
                        PartKind::Debate => state.debate_side,
                        _ => None,
                    };
                    (part.part_id.clone(), side)
                };
                let prompt_text = self
                    .current_prompt()
                    .map(|p| p.text)
                    .unwrap_or_default();

                let record = ResponseRecord::new(
                    part_id,
                    prompt_text,
                    response.transcript,
                    response.duration_secs,
                    debate_side,
                );
                info!(
                    "Response {} recorded: {} words in {}s",
                    record.id,
                    record.word_count(),
                    record.duration_secs
                );
                if let Some(state) = self.state.as_mut() {
                    state.responses.push(record);
                }

                self.set_recording_phase(RecordingPhase::Idle);
                self.start_auto_advance();
            }
            Err(e) => {
                warn!("Submission failed: {}", e);
                self.set_recording_phase(RecordingPhase::Idle);
                self.fail(match e {
                    ClientError::Unauthorized => FailureKind::Unauthorized,
                    other => FailureKind::Submission(other.to_string()),
                });
            }
        }
    }

    fn start_auto_advance(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        let tick_tx = self.events_tx.clone();
        let expire_tx = self.events_tx.clone();
        self.advance_remaining = AUTO_ADVANCE_SECS;
        self.advance_timer = Some(Countdown::start(
            AUTO_ADVANCE_SECS,
            move |remaining| {
                let _ = tick_tx.send(EngineEvent::AutoAdvanceTick { remaining, epoch });
            },
            move || {
                let _ = expire_tx.send(EngineEvent::AutoAdvanceExpired { epoch });
            },
        ));
        self.phase = ExamPhase::AutoAdvancePending;
    }

    /// End-of-part check, shared by manual Next and the grace countdown.
    fn advance(&mut self) {
        self.advance_remaining = 0;

        let (kind, has_next_prompt, has_next_part) = {
            let state = match self.state.as_ref() {
                Some(s) => s,
                None => return,
            };
            let part = match state.definition.part(state.part_index) {
                Some(p) => p,
                None => return,
            };
            (
                part.kind,
                state.prompt_index + 1 < part.prompts.len(),
                state.part_index + 1 < state.definition.parts.len(),
            )
        };

        // A debate part completes with its single response; no prompt index
        // increment applies.
        if kind != PartKind::Debate && has_next_prompt {
            if let Some(state) = self.state.as_mut() {
                state.prompt_index += 1;
            }
            self.show_prompt();
            return;
        }

        if has_next_part {
            self.phase = ExamPhase::PartTransition;
        } else {
            self.begin_finalizing();
        }
    }

    fn begin_finalizing(&mut self) {
        let session_id = match self.state.as_ref() {
            Some(s) => s.session_id.clone(),
            None => return,
        };

        self.phase = ExamPhase::Finalizing;
        self.epoch += 1;
        let epoch = self.epoch;
        let mood = self.options.mood;
        let client = self.client.clone();
        let tx = self.events_tx.clone();
        info!("Finalizing session {}", session_id);
        tokio::spawn(async move {
            let outcome = client.finalize_session(&session_id, mood).await;
            let _ = tx.send(EngineEvent::FinalizationCompleted { epoch, outcome });
        });
    }

    fn on_finalization_completed(&mut self, outcome: Result<ScoreReport, ClientError>) {
        match outcome {
            Ok(report) => {
                info!(
                    "Session scored: overall {} ({})",
                    report.scores.overall,
                    report.cefr_level.as_deref().unwrap_or("-")
                );
                self.report = Some(report);
                self.phase = ExamPhase::Results;
            }
            Err(e) => {
                warn!("Scoring failed, responses preserved: {}", e);
                self.fail(match e {
                    ClientError::Unauthorized => FailureKind::Unauthorized,
                    other => FailureKind::Scoring(other.to_string()),
                });
            }
        }
    }

    fn fail(&mut self, kind: FailureKind) {
        self.failure = Some(kind);
        self.phase = ExamPhase::Failed;
    }

    fn set_recording_phase(&mut self, phase: RecordingPhase) {
        if let Some(state) = self.state.as_mut() {
            state.recording_phase = phase;
        }
    }

    /// Cancel timers, release the microphone, stop playback. Every exit
    /// path funnels through here so nothing stays alive after navigation.
    fn teardown_controllers(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.prep_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.advance_timer.take() {
            timer.cancel();
        }
        self.recorder.abort();
        self.player.cancel();
    }
}

impl Drop for ExamEngine {
    fn drop(&mut self) {
        self.teardown_controllers();
    }
}

#[cfg(test)]
mod tests;
