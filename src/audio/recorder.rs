// Recording controller: capture lifecycle plus elapsed-time ticking.
//
// Minimum-duration policy is deliberately NOT enforced here; the exam flow
// engine owns that rule and reads elapsed time from the tick callback.

use crate::audio::{AudioBuffer, CaptureBackend, RecorderError};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

struct ActiveCapture {
    elapsed: Arc<AtomicU32>,
    ticker: JoinHandle<()>,
}

pub struct Recorder {
    backend: Box<dyn CaptureBackend>,
    active: Option<ActiveCapture>,
}

impl Recorder {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Elapsed whole seconds of the active capture, 0 when idle.
    pub fn elapsed_secs(&self) -> u32 {
        self.active
            .as_ref()
            .map(|a| a.elapsed.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Acquire the microphone and start ticking. `on_tick` fires once per
    /// second with the elapsed seconds; `on_limit` fires at most once, when
    /// `max_duration_secs` is reached.
    pub fn start<T, L>(
        &mut self,
        max_duration_secs: Option<u32>,
        on_tick: T,
        on_limit: L,
    ) -> Result<(), RecorderError>
    where
        T: Fn(u32) + Send + 'static,
        L: FnOnce() + Send + 'static,
    {
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        self.backend.open()?;

        let elapsed = Arc::new(AtomicU32::new(0));
        let elapsed_clone = elapsed.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // first tick completes immediately
            let mut secs = 0u32;
            loop {
                interval.tick().await;
                secs += 1;
                elapsed_clone.store(secs, Ordering::Relaxed);
                on_tick(secs);
                if let Some(max) = max_duration_secs {
                    if secs >= max {
                        on_limit();
                        break;
                    }
                }
            }
        });

        self.active = Some(ActiveCapture { elapsed, ticker });
        info!("Recording started (max {:?}s)", max_duration_secs);
        Ok(())
    }

    /// Finalize capture and return the buffer. The device is released on
    /// every exit path, including errors.
    pub fn stop(&mut self) -> Result<AudioBuffer, RecorderError> {
        let active = self.active.take().ok_or(RecorderError::NotRecording)?;
        active.ticker.abort();
        let buffer = self.backend.close()?;
        info!("Recording stopped: {:.1}s captured", buffer.duration_secs);
        Ok(buffer)
    }

    /// Release the device discarding captured audio. No-op when idle.
    pub fn abort(&mut self) {
        if let Some(active) = self.active.take() {
            active.ticker.abort();
            self.backend.release();
            info!("Recording aborted");
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.abort();
    }
}
