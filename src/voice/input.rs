//! Raw audio input

use std::any::Any;
use std::io::Cursor;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Capture sample rate (16kHz mono, fixed)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per frame handed to the recognizer (0.5 seconds)
pub const FRAME_SAMPLES: usize = 8000;

/// A block of captured samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub samples: Vec<i16>,
    /// When the last sample arrived
    pub captured_at: Instant,
}

impl Frame {
    /// Samples whose last one arrived just now
    #[must_use]
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            captured_at: Instant::now(),
        }
    }

    /// Audio time covered by the samples
    #[must_use]
    pub fn duration(&self) -> Duration {
        let len = u64::try_from(self.samples.len()).unwrap_or(u64::MAX);
        Duration::from_micros(len.saturating_mul(1_000_000) / u64::from(SAMPLE_RATE))
    }

    /// When the first sample arrived
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.captured_at
            .checked_sub(self.duration())
            .unwrap_or(self.captured_at)
    }
}

/// Source of 16 kHz mono frames
///
/// `open` is called on the capture thread; the returned guard stays there
/// and stops the stream when dropped.
pub trait AudioInput: Send + Sync {
    /// Start producing frames into `frames`
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the stream cannot be opened
    fn open(&self, frames: SyncSender<Frame>) -> Result<InputGuard>;
}

/// Keeps an input stream alive
pub struct InputGuard {
    _stream: Box<dyn Any>,
}

impl InputGuard {
    /// Wrap whatever owns the stream
    #[must_use]
    pub fn new<T: 'static>(stream: T) -> Self {
        Self {
            _stream: Box::new(stream),
        }
    }
}

/// Default input device via cpal
#[derive(Debug, Default, Clone)]
pub struct MicrophoneInput {
    device_name: Option<String>,
}

impl MicrophoneInput {
    /// Use the named input device, or the host default when `None`
    #[must_use]
    pub const fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| &n == name))
                .ok_or_else(|| Error::Audio(format!("input device not found: {name}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string())),
        }
    }

    fn config(device: &cpal::Device) -> Result<StreamConfig> {
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no 16kHz mono input config found".to_string()))?;

        Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
    }
}

impl AudioInput for MicrophoneInput {
    fn open(&self, frames: SyncSender<Frame>) -> Result<InputGuard> {
        let device = self.device()?;
        let config = Self::config(&device)?;

        let mut pending: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend(data.iter().map(|s| f32_to_i16(*s)));
                    while pending.len() >= FRAME_SAMPLES {
                        let frame = Frame::new(pending.drain(..FRAME_SAMPLES).collect());
                        match frames.try_send(frame) {
                            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                            Err(TrySendError::Full(_)) => {
                                tracing::trace!("capture queue full, frame dropped");
                            }
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture started"
        );

        Ok(InputGuard::new(stream))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

/// Encode 16 kHz mono samples as a WAV file
///
/// # Errors
///
/// Returns error if encoding fails
pub fn samples_to_wav(samples: &[i16]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Audio(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
