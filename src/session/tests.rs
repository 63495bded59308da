use super::*;
use crate::audio::testing::{DeniedBackend, FakeBackend};
use crate::client::testing::FakeApi;
use crate::client::{ClientError, StartedSession};
use crate::exam::{DebateSpec, ExamDefinition, PartSpec};
use crate::playback::NullSink;
use std::sync::Mutex;
use std::time::Duration;

fn interview(part_id: &str, questions: &[&str]) -> PartSpec {
    let kind = PartKind::from_part_id(part_id).unwrap();
    let mut part = PartSpec::new(part_id, kind);
    part.prompts = questions
        .iter()
        .map(|q| PromptSpec::for_kind(*q, kind))
        .collect();
    part
}

fn debate() -> PartSpec {
    let mut part = PartSpec::new("3", PartKind::Debate);
    part.debate = Some(DebateSpec {
        topic: "School uniforms should be mandatory".to_string(),
        for_points: vec!["equality".to_string()],
        against_points: vec!["self-expression".to_string()],
    });
    part
}

fn queue_started(api: &FakeApi, parts: Vec<PartSpec>) {
    api.queue_start(Ok(StartedSession {
        session_id: "42".to_string(),
        definition: ExamDefinition { parts },
    }));
}

fn new_engine(
    api: Arc<FakeApi>,
    options: EngineOptions,
) -> (ExamEngine, UnboundedReceiver<EngineEvent>) {
    let recorder = Recorder::new(Box::new(FakeBackend::new(10.0)));
    ExamEngine::new(api, recorder, Arc::new(NullSink), options)
}

/// Forward events to the engine until it reaches `target`. Panics after a
/// bounded number of events so a wrong transition fails loudly instead of
/// hanging the test.
async fn drive_until(
    engine: &mut ExamEngine,
    events: &mut UnboundedReceiver<EngineEvent>,
    target: ExamPhase,
) {
    for _ in 0..500 {
        if engine.phase() == target {
            return;
        }
        let event = events.recv().await.expect("event channel closed");
        engine.handle_event(event);
    }
    panic!("never reached {:?}, stuck in {:?}", target, engine.phase());
}

fn drain(engine: &mut ExamEngine, events: &mut UnboundedReceiver<EngineEvent>) {
    while let Ok(event) = events.try_recv() {
        engine.handle_event(event);
    }
}

/// Record for `secs` of (paused) clock time, stop, and ride the submission
/// through to the auto-advance grace period.
async fn answer_prompt(
    engine: &mut ExamEngine,
    events: &mut UnboundedReceiver<EngineEvent>,
    secs: u64,
) {
    engine.begin_recording().unwrap();
    tokio::time::sleep(Duration::from_secs(secs)).await;
    assert_eq!(engine.request_stop().unwrap(), StopOutcome::Submitted);
    drive_until(engine, events, ExamPhase::AutoAdvancePending).await;
}

#[tokio::test(start_paused = true)]
async fn full_exam_collects_every_response_and_scores() {
    let api = Arc::new(FakeApi::new());
    queue_started(
        &api,
        vec![
            interview("1.1", &["Where do you live?", "Do you work or study?", "What do you do on weekends?"]),
            debate(),
        ],
    );
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);

    for _ in 0..3 {
        answer_prompt(&mut engine, &mut events, 6).await;
        engine.next().unwrap();
    }
    assert_eq!(engine.phase(), ExamPhase::PartTransition);

    engine.continue_to_next_part().unwrap();
    assert_eq!(engine.phase(), ExamPhase::DebateSideChoice);
    engine.choose_debate_side(DebateSide::For).unwrap();
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);

    answer_prompt(&mut engine, &mut events, 16).await;
    engine.next().unwrap();
    assert_eq!(engine.phase(), ExamPhase::Finalizing);

    drive_until(&mut engine, &mut events, ExamPhase::Results).await;

    let responses = engine.responses();
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0].part_id, "1.1");
    assert_eq!(responses[0].prompt_text, "Where do you live?");
    assert!(responses[0].debate_side.is_none());
    assert_eq!(responses[3].part_id, "3");
    assert_eq!(responses[3].debate_side, Some(DebateSide::For));

    let report = engine.report().unwrap();
    assert_eq!(report.scores.overall, 51);
    assert_eq!(api.finalize_calls.lock().unwrap().len(), 1);

    let submits = api.submit_calls.lock().unwrap();
    assert_eq!(submits.len(), 4);
    assert_eq!(submits[3].debate_side, Some(DebateSide::For));
}

#[tokio::test(start_paused = true)]
async fn stop_below_minimum_keeps_recording() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &["Where do you live?"])]);
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    engine.begin_recording().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(
        engine.request_stop().unwrap(),
        StopOutcome::TooShort { remaining_secs: 3 }
    );
    assert_eq!(engine.phase(), ExamPhase::Recording);
    assert!(engine.is_capturing());
    assert!(engine.responses().is_empty());
    assert!(api.submit_calls.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(engine.request_stop().unwrap(), StopOutcome::Submitted);
    drive_until(&mut engine, &mut events, ExamPhase::AutoAdvancePending).await;
    assert_eq!(engine.responses().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_submission_retries_the_same_prompt() {
    let api = Arc::new(FakeApi::new());
    queue_started(
        &api,
        vec![interview("1.1", &["Where do you live?", "Do you work or study?"])],
    );
    api.queue_submit(Err(ClientError::Service("HTTP 502".to_string())));
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    engine.begin_recording().unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    engine.request_stop().unwrap();
    drive_until(&mut engine, &mut events, ExamPhase::Failed).await;

    assert!(matches!(engine.failure(), Some(FailureKind::Submission(_))));
    assert!(engine.responses().is_empty());
    assert_eq!(engine.state().unwrap().recording_phase, RecordingPhase::Idle);

    engine.retry().unwrap();
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);
    assert!(engine.failure().is_none());
    assert_eq!(engine.state().unwrap().prompt_index, 0);

    answer_prompt(&mut engine, &mut events, 6).await;
    assert_eq!(engine.responses().len(), 1);
    assert_eq!(engine.responses()[0].prompt_text, "Where do you live?");

    let submits = api.submit_calls.lock().unwrap();
    assert_eq!(submits.len(), 2);
    assert_eq!(submits[0].prompt_text, submits[1].prompt_text);
}

#[tokio::test]
async fn quota_exhausted_at_start_is_terminal() {
    let api = Arc::new(FakeApi::new());
    api.queue_start(Err(ClientError::LimitExceeded(
        "Daily practice limit reached".to_string(),
    )));
    let (mut engine, _events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();

    assert_eq!(engine.phase(), ExamPhase::Failed);
    assert!(matches!(
        engine.failure(),
        Some(FailureKind::LimitExceeded(msg)) if msg == "Daily practice limit reached"
    ));
    assert!(engine.state().is_none());
    assert!(engine.retry().is_err());
    assert_eq!(engine.phase(), ExamPhase::Failed);
}

#[tokio::test(start_paused = true)]
async fn finish_early_scores_what_was_collected() {
    let api = Arc::new(FakeApi::new());
    queue_started(
        &api,
        vec![
            interview("1.1", &["Where do you live?", "Do you work or study?"]),
            interview("1.2", &["Describe the picture"]),
            interview("2", &["Talk about a journey"]),
            debate(),
        ],
    );
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    answer_prompt(&mut engine, &mut events, 6).await;
    engine.next().unwrap();
    answer_prompt(&mut engine, &mut events, 6).await;
    engine.next().unwrap();
    engine.continue_to_next_part().unwrap();
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);

    assert_eq!(engine.finish_early().unwrap(), FinishOutcome::Finalizing);
    drive_until(&mut engine, &mut events, ExamPhase::Results).await;

    assert_eq!(engine.responses().len(), 2);
    assert_eq!(api.submit_calls.lock().unwrap().len(), 2);
    assert_eq!(api.finalize_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn finish_early_with_nothing_abandons_quietly() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &["Where do you live?"])]);
    let (mut engine, _events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    assert_eq!(engine.finish_early().unwrap(), FinishOutcome::Abandoned);

    assert_eq!(engine.phase(), ExamPhase::Exited);
    assert!(!engine.is_capturing());
    assert!(api.finalize_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn debate_side_is_immutable_once_chosen() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![debate()]);
    let (mut engine, _events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    assert_eq!(engine.phase(), ExamPhase::DebateSideChoice);

    engine.choose_debate_side(DebateSide::For).unwrap();
    assert!(engine.choose_debate_side(DebateSide::Against).is_err());
    assert_eq!(engine.state().unwrap().debate_side, Some(DebateSide::For));
}

#[tokio::test(start_paused = true)]
async fn auto_advance_expires_into_the_next_prompt() {
    let api = Arc::new(FakeApi::new());
    queue_started(
        &api,
        vec![interview("1.1", &["Where do you live?", "Do you work or study?"])],
    );
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    answer_prompt(&mut engine, &mut events, 6).await;

    // No user input: the grace countdown advances on its own.
    drive_until(&mut engine, &mut events, ExamPhase::RecordingReady).await;
    assert_eq!(engine.state().unwrap().prompt_index, 1);
    assert_eq!(
        engine.current_prompt().unwrap().text,
        "Do you work or study?"
    );
}

#[tokio::test(start_paused = true)]
async fn manual_next_beats_a_queued_expiry() {
    let api = Arc::new(FakeApi::new());
    queue_started(
        &api,
        vec![interview(
            "1.1",
            &["Where do you live?", "Do you work or study?", "What do you do on weekends?"],
        )],
    );
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    answer_prompt(&mut engine, &mut events, 6).await;

    // Let the countdown expire without processing its event, then tap Next.
    tokio::time::sleep(Duration::from_secs(6)).await;
    engine.next().unwrap();
    assert_eq!(engine.state().unwrap().prompt_index, 1);

    // The stale expiry must not advance a second time.
    drain(&mut engine, &mut events);
    assert_eq!(engine.state().unwrap().prompt_index, 1);
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);
}

#[tokio::test(start_paused = true)]
async fn long_turn_gets_a_preparation_window() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("2", &["Talk about a journey"])]);
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    assert_eq!(engine.phase(), ExamPhase::Preparing);
    assert_eq!(engine.preparation_remaining_secs(), PREPARATION_SECS);
    assert!(engine.begin_recording().is_err());

    drive_until(&mut engine, &mut events, ExamPhase::RecordingReady).await;
    assert_eq!(engine.state().unwrap().prompt_index, 0);
}

#[tokio::test(start_paused = true)]
async fn skipping_preparation_discards_the_countdown() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("2", &["Talk about a journey"])]);
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.skip_preparation().unwrap();
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);

    // Nothing left over from the cancelled timer may move the engine.
    tokio::time::sleep(Duration::from_secs(61)).await;
    drain(&mut engine, &mut events);
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);
}

#[tokio::test(start_paused = true)]
async fn maximum_duration_auto_stops_and_submits() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &["Where do you live?"])]);
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    engine.begin_recording().unwrap();

    // 30s cap for an interview prompt; no user stop ever arrives.
    drive_until(&mut engine, &mut events, ExamPhase::Submitting).await;
    assert!(!engine.is_capturing());

    // Manual stop after the auto-stop is a no-op.
    assert_eq!(engine.request_stop().unwrap(), StopOutcome::Ignored);

    drive_until(&mut engine, &mut events, ExamPhase::AutoAdvancePending).await;
    assert_eq!(engine.responses().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scoring_failure_keeps_responses_for_retry() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &["Where do you live?"])]);
    api.queue_finalize(Err(ClientError::Scoring("HTTP 500".to_string())));
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    answer_prompt(&mut engine, &mut events, 6).await;
    engine.next().unwrap();
    drive_until(&mut engine, &mut events, ExamPhase::Failed).await;

    assert!(matches!(engine.failure(), Some(FailureKind::Scoring(_))));
    assert_eq!(engine.responses().len(), 1);

    engine.retry().unwrap();
    assert_eq!(engine.phase(), ExamPhase::Finalizing);
    drive_until(&mut engine, &mut events, ExamPhase::Results).await;
    assert_eq!(api.finalize_calls.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn follow_up_hint_only_after_discussion_answers() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("2", &["Talk about a journey"])]);
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    assert!(engine.follow_up_hint().await.is_none());

    engine.skip_preparation().unwrap();
    answer_prompt(&mut engine, &mut events, 11).await;
    assert_eq!(
        engine.follow_up_hint().await.as_deref(),
        Some("And why is that?")
    );

    // Interview answers never get one.
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &["Where do you live?"])]);
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());
    engine.start().await.unwrap();
    answer_prompt(&mut engine, &mut events, 6).await;
    assert!(engine.follow_up_hint().await.is_none());
}

#[test]
fn engine_options_follow_config() {
    let mut config = AppConfig::default();
    config.selected_voice = Some("roger".to_string());
    config.mood = "happy".to_string();
    config.transcription_visible = false;

    let options = EngineOptions::from_config(&config);
    assert_eq!(options.voice, Some(Voice::Roger));
    assert_eq!(options.mood, Mood::Happy);
    assert!(!options.transcription_visible);
    assert_eq!(options.kind, SessionKind::Practice);
}

#[tokio::test]
async fn empty_part_is_content_unavailable() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &[])]);
    let (mut engine, _events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    assert_eq!(engine.phase(), ExamPhase::ContentUnavailable);
    assert!(engine.begin_recording().is_err());
}

#[tokio::test]
async fn device_failure_leaves_the_prompt_retryable() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &["Where do you live?"])]);
    let recorder = Recorder::new(Box::new(DeniedBackend));
    let (mut engine, _events) =
        ExamEngine::new(api.clone(), recorder, Arc::new(NullSink), EngineOptions::default());

    engine.start().await.unwrap();
    let err = engine.begin_recording().unwrap_err();
    assert!(matches!(err, EngineError::Recorder(RecorderError::Device(_))));

    // Still on the same prompt, ready for another attempt.
    assert_eq!(engine.phase(), ExamPhase::RecordingReady);
    assert!(!engine.is_capturing());
}

struct ProbeSink {
    played: Mutex<u32>,
    stops: Mutex<u32>,
}

impl AudioSink for ProbeSink {
    fn play(&self, _audio: Vec<u8>) -> Result<(), String> {
        *self.played.lock().unwrap() += 1;
        Ok(())
    }

    fn stop(&self) {
        *self.stops.lock().unwrap() += 1;
    }
}

#[tokio::test(start_paused = true)]
async fn recording_silences_prompt_playback() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("1.1", &["Where do you live?"])]);
    let sink = Arc::new(ProbeSink {
        played: Mutex::new(0),
        stops: Mutex::new(0),
    });
    let recorder = Recorder::new(Box::new(FakeBackend::new(10.0)));
    let options = EngineOptions {
        voice: Some(Voice::Sarah),
        ..EngineOptions::default()
    };
    let (mut engine, _events) = ExamEngine::new(api.clone(), recorder, sink.clone(), options);

    engine.start().await.unwrap();
    let stops_before = *sink.stops.lock().unwrap();
    engine.begin_recording().unwrap();

    // The sink is told to stop before the microphone opens.
    assert!(*sink.stops.lock().unwrap() > stops_before);
    assert!(engine.is_capturing());

    engine.exit();
    assert_eq!(engine.phase(), ExamPhase::Exited);
    assert!(!engine.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn exit_cancels_every_timer_and_releases_the_microphone() {
    let api = Arc::new(FakeApi::new());
    queue_started(&api, vec![interview("2", &["Talk about a journey"])]);
    let (mut engine, mut events) = new_engine(api.clone(), EngineOptions::default());

    engine.start().await.unwrap();
    assert_eq!(engine.phase(), ExamPhase::Preparing);

    engine.exit();
    assert_eq!(engine.phase(), ExamPhase::Exited);
    assert!(!engine.is_capturing());

    // A full preparation window later, nothing fires.
    tokio::time::sleep(Duration::from_secs(61)).await;
    drain(&mut engine, &mut events);
    assert_eq!(engine.phase(), ExamPhase::Exited);
}
