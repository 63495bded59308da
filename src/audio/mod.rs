pub mod buffer;
pub mod capture;
pub mod recorder;

pub use buffer::AudioBuffer;
pub use capture::CpalBackend;
pub use recorder::Recorder;

use thiserror::Error;

/// Recording controller errors. `Device` is recoverable (the user can grant
/// permission or plug a microphone in); the other variants are usage
/// violations that should not surface in correct operation.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("microphone unavailable: {0}")]
    Device(String),

    #[error("a recording is already active")]
    AlreadyRecording,

    #[error("no recording is active")]
    NotRecording,
}

/// Seam between the recording controller and the capture device, so the
/// engine can be exercised without a microphone.
pub trait CaptureBackend {
    /// Acquire the device and begin capturing.
    fn open(&mut self) -> Result<(), RecorderError>;

    /// Stop capturing, release the device and hand back the buffer.
    fn close(&mut self) -> Result<AudioBuffer, RecorderError>;

    /// Release the device discarding any captured audio. Idempotent.
    fn release(&mut self);
}
