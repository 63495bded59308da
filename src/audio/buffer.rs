use serde::{Deserialize, Serialize};

/// Raw captured audio, PCM i16.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Cached duration in seconds
    #[serde(skip)]
    pub duration_secs: f32,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
            duration_secs: 0.0,
        }
    }

    /// Recalculate and update duration_secs
    pub fn update_duration(&mut self) {
        if self.sample_rate == 0 {
            self.duration_secs = 0.0;
        } else {
            let channels = self.channels.max(1) as f32;
            self.duration_secs = self.samples.len() as f32 / (self.sample_rate as f32 * channels);
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.duration_secs = 0.0;
    }

    pub fn append(&mut self, data: &[i16]) {
        self.samples.extend_from_slice(data);
        self.update_duration();
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_tracks_appended_samples() {
        let mut buffer = AudioBuffer::new(16000, 1);
        buffer.append(&vec![0i16; 16000]);
        assert!((buffer.duration_secs - 1.0).abs() < 0.001);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration_secs, 0.0);
    }
}
