// Prompt playback: fetch synthesized speech for the current prompt and hand
// it to an output sink. This channel is advisory; failures never block the
// exam.

use crate::client::SessionApi;
use crate::exam::Voice;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Audio output seam. The engine only needs "play these bytes" and "stop".
pub trait AudioSink: Send + Sync {
    fn play(&self, audio: Vec<u8>) -> Result<(), String>;
    fn stop(&self);
}

/// Sink for hosts without an audio output path (silent mode everywhere).
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&self, _audio: Vec<u8>) -> Result<(), String> {
        Ok(())
    }

    fn stop(&self) {}
}

pub struct PromptPlayer {
    client: Arc<dyn SessionApi>,
    sink: Arc<dyn AudioSink>,
    in_flight: Option<JoinHandle<()>>,
}

impl PromptPlayer {
    pub fn new(client: Arc<dyn SessionApi>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            client,
            sink,
            in_flight: None,
        }
    }

    /// Fetch and play `text` in `voice`. No voice selected means silent
    /// mode, a deliberate no-op. Cancels any playback already in flight.
    pub fn play(&mut self, text: &str, voice: Option<Voice>) {
        self.cancel();

        let Some(voice) = voice else {
            return;
        };

        let client = self.client.clone();
        let sink = self.sink.clone();
        let text = text.to_string();
        self.in_flight = Some(tokio::spawn(async move {
            match client.synthesize_speech(&text, voice).await {
                Ok(bytes) => {
                    if let Err(e) = sink.play(bytes) {
                        warn!("Prompt playback failed: {}", e);
                    }
                }
                Err(e) => warn!("Speech synthesis failed, continuing silently: {}", e),
            }
        }));
    }

    /// Stop any in-flight fetch and playback. Always safe to call.
    pub fn cancel(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.sink.stop();
    }
}

impl Drop for PromptPlayer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FakeApi;
    use std::sync::Mutex;

    struct RecordingSink {
        played: Mutex<Vec<Vec<u8>>>,
        stops: Mutex<u32>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                played: Mutex::new(Vec::new()),
                stops: Mutex::new(0),
            }
        }
    }

    impl AudioSink for RecordingSink {
        fn play(&self, audio: Vec<u8>) -> Result<(), String> {
            self.played.lock().unwrap().push(audio);
            Ok(())
        }

        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn plays_synthesized_prompt() {
        let api = Arc::new(FakeApi::new());
        let sink = Arc::new(RecordingSink::new());
        let mut player = PromptPlayer::new(api.clone(), sink.clone());

        player.play("Describe your home town", Some(Voice::Sarah));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(sink.played.lock().unwrap().len(), 1);
        let calls = api.tts_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, Voice::Sarah);
    }

    #[tokio::test]
    async fn no_voice_is_silent_mode() {
        let api = Arc::new(FakeApi::new());
        let sink = Arc::new(RecordingSink::new());
        let mut player = PromptPlayer::new(api.clone(), sink.clone());

        player.play("Describe your home town", None);
        tokio::task::yield_now().await;

        assert!(sink.played.lock().unwrap().is_empty());
        assert!(api.tts_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_stops_the_sink() {
        let api = Arc::new(FakeApi::new());
        let sink = Arc::new(RecordingSink::new());
        let mut player = PromptPlayer::new(api, sink.clone());

        player.play("text", Some(Voice::Roger));
        player.cancel();

        assert!(*sink.stops.lock().unwrap() >= 1);
        // Safe when nothing is playing.
        player.cancel();
    }
}
