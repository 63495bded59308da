// Microphone capture via cpal.

use crate::audio::{AudioBuffer, CaptureBackend, RecorderError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

pub struct CpalBackend {
    stream: Option<cpal::Stream>,
    buffer: Arc<Mutex<AudioBuffer>>,
    preferred_device: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            stream: None,
            buffer: Arc::new(Mutex::new(AudioBuffer::new(16000, 1))),
            preferred_device: None,
        }
    }

    pub fn with_preferred_device(name: Option<String>) -> Self {
        let mut backend = Self::new();
        backend.preferred_device = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        backend
    }

    fn pick_input_device(host: &cpal::Host, preferred: Option<&str>) -> Option<cpal::Device> {
        if let Some(name) = preferred {
            if let Ok(mut devices) = host.input_devices() {
                if let Some(device) = devices.find(|d| Self::device_display_name(d) == name) {
                    return Some(device);
                }
            }
            warn!(
                "Preferred input device '{}' not found, falling back to default",
                name
            );
        }
        host.default_input_device()
    }

    fn device_display_name(device: &cpal::Device) -> String {
        device
            .name()
            .or_else(|_| device.description().map(|d| d.name().to_string()))
            .unwrap_or_else(|_| "Unknown input".to_string())
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&mut self) -> Result<(), RecorderError> {
        let host = cpal::default_host();
        let device = Self::pick_input_device(&host, self.preferred_device.as_deref())
            .ok_or_else(|| RecorderError::Device("no input device available".to_string()))?;

        info!("Input device: {}", Self::device_display_name(&device));

        let config = device
            .default_input_config()
            .map_err(|e| RecorderError::Device(e.to_string()))?;
        if let Ok(mut guard) = self.buffer.lock() {
            guard.sample_rate = config.sample_rate();
            guard.channels = config.channels();
            guard.clear();
        }

        let buffer_clone = self.buffer.clone();
        let err_fn = |err| error!("an error occurred on stream: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| append_i16(data, &buffer_clone),
                err_fn,
                None,
            ),
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| append_f32(data, &buffer_clone),
                err_fn,
                None,
            ),
            other => {
                return Err(RecorderError::Device(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| RecorderError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| RecorderError::Device(e.to_string()))?;
        self.stream = Some(stream);

        Ok(())
    }

    fn close(&mut self) -> Result<AudioBuffer, RecorderError> {
        // Dropping the stream stops capture and releases the device.
        self.stream.take();

        let mut guard = self
            .buffer
            .lock()
            .map_err(|e| RecorderError::Device(e.to_string()))?;
        let out = guard.clone();
        guard.clear();
        Ok(out)
    }

    fn release(&mut self) {
        self.stream.take();
        if let Ok(mut guard) = self.buffer.lock() {
            guard.clear();
        }
    }
}

fn append_i16(input: &[i16], buffer: &Arc<Mutex<AudioBuffer>>) {
    if let Ok(mut guard) = buffer.lock() {
        guard.append(input);
    }
}

fn append_f32(input: &[f32], buffer: &Arc<Mutex<AudioBuffer>>) {
    let samples: Vec<i16> = input
        .iter()
        .map(|&x| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    if let Ok(mut guard) = buffer.lock() {
        guard.append(&samples);
    }
}
