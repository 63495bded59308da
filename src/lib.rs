pub mod audio;
pub mod client;
pub mod config;
pub mod exam;
pub mod playback;
pub mod session;
pub mod timer;

pub use audio::{AudioBuffer, CaptureBackend, CpalBackend, Recorder, RecorderError};
pub use client::{
    ClientError, HttpSessionClient, ResponseSubmission, ScoreReport, SessionApi, SessionKind,
    StartSessionRequest, StartedSession, SubmittedResponse,
};
pub use config::AppConfig;
pub use exam::{
    DebateSide, ExamDefinition, Mood, PartKind, PartSpec, PromptSpec, ResponseRecord, Voice,
};
pub use playback::{AudioSink, NullSink, PromptPlayer};
pub use session::{
    EngineEvent, EngineOptions, ExamEngine, ExamPhase, FailureKind, FinishOutcome, SessionState,
    StopOutcome,
};
pub use timer::Countdown;
