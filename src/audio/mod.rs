//! Audio device layer
//!
//! Enumerates input/output devices and bridges cpal's callback model to
//! channel-based streams. cpal::Stream is not Send, so each open stream is
//! owned by a dedicated thread; PCM flows through bounded channels and the
//! handle types guarantee the hardware is released on every exit path
//! (explicit close or drop).
//!
//! All PCM crossing this layer is 16-bit little-endian.

pub mod capture;
pub mod playback;

pub use capture::InputStream;
pub use playback::OutputStream;

use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait};

/// Description of one audio device, as enumerated by the host
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Position in the host's enumeration order; stable for one process run
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: f64,
}

impl DeviceInfo {
    /// Whether the device can capture audio
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }

    /// Whether the device can play audio
    pub fn is_output(&self) -> bool {
        self.max_output_channels > 0
    }
}

/// PCM stream format: 16-bit samples at a given rate and channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Sample width in bytes (i16 PCM)
    pub const SAMPLE_WIDTH: usize = 2;

    /// Byte length of a chunk of `frames` frames in this format
    pub fn chunk_bytes(&self, frames: usize) -> usize {
        frames * self.channels as usize * Self::SAMPLE_WIDTH
    }
}

/// How the user picked a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelection {
    /// The host's default device for the direction
    Default,
    /// Index into the enumeration order of `list_devices`
    Index(usize),
}

/// Enumerate all audio devices. Re-queries the host on every call.
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?;

    let mut out = Vec::new();
    for (index, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let input = device.default_input_config().ok();
        let output = device.default_output_config().ok();

        let default_sample_rate = input
            .as_ref()
            .map(|c| c.sample_rate().0)
            .or_else(|| output.as_ref().map(|c| c.sample_rate().0))
            .unwrap_or(0) as f64;

        out.push(DeviceInfo {
            index,
            name,
            max_input_channels: input.map(|c| c.channels()).unwrap_or(0),
            max_output_channels: output.map(|c| c.channels()).unwrap_or(0),
            default_sample_rate,
        });
    }

    Ok(out)
}

/// Resolve a selection to a capture-capable cpal device
pub(crate) fn select_input_device(
    selection: DeviceSelection,
) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match selection {
        DeviceSelection::Default => host
            .default_input_device()
            .ok_or_else(|| AudioError::InvalidDevice("no default input device".to_string())),
        DeviceSelection::Index(index) => {
            let device = device_at(&host, index)?;
            if device.default_input_config().is_err() {
                return Err(AudioError::InvalidDevice(format!(
                    "device {} has no input channels",
                    index
                )));
            }
            Ok(device)
        }
    }
}

/// Resolve a selection to a playback-capable cpal device
pub(crate) fn select_output_device(
    selection: DeviceSelection,
) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match selection {
        DeviceSelection::Default => host
            .default_output_device()
            .ok_or_else(|| AudioError::InvalidDevice("no default output device".to_string())),
        DeviceSelection::Index(index) => {
            let device = device_at(&host, index)?;
            if device.default_output_config().is_err() {
                return Err(AudioError::InvalidDevice(format!(
                    "device {} has no output channels",
                    index
                )));
            }
            Ok(device)
        }
    }
}

fn device_at(host: &cpal::Host, index: usize) -> Result<cpal::Device, AudioError> {
    host.devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .nth(index)
        .ok_or_else(|| {
            AudioError::InvalidDevice(format!("device index {} out of range", index))
        })
}

/// A source of PCM chunks (the microphone, or a fake in tests)
#[async_trait::async_trait]
pub trait PcmSource: Send {
    /// Format of the chunks this source yields
    fn format(&self) -> AudioFormat;

    /// Next chunk of PCM bytes; None at end of stream
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, AudioError>;

    /// Release the underlying resource. Idempotent.
    fn close(&mut self);
}

/// A sink for PCM chunks (the speakers, or a buffer in tests)
#[async_trait::async_trait]
pub trait PcmSink: Send {
    /// Write one PCM block; blocks (suspends) when the device is behind
    async fn write(&mut self, pcm: Vec<u8>) -> Result<(), AudioError>;

    /// Stop playback and release the device. Idempotent.
    fn close(&mut self);
}

/// Wraps a source and optionally keeps a copy of everything read through it,
/// for saving recordings after the session ends.
pub struct TeeSource<S: PcmSource> {
    inner: S,
    capture: bool,
    captured: Vec<u8>,
}

impl<S: PcmSource> TeeSource<S> {
    /// Tee that records every chunk
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            capture: true,
            captured: Vec::new(),
        }
    }

    /// Tee that only forwards; nothing is kept
    pub fn passthrough(inner: S) -> Self {
        Self {
            inner,
            capture: false,
            captured: Vec::new(),
        }
    }

    /// All bytes read so far
    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    pub fn into_inner(self) -> (S, Vec<u8>) {
        (self.inner, self.captured)
    }
}

#[async_trait::async_trait]
impl<S: PcmSource> PcmSource for TeeSource<S> {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, AudioError> {
        let chunk = self.inner.read_chunk().await?;
        if self.capture {
            if let Some(ref pcm) = chunk {
                self.captured.extend_from_slice(pcm);
            }
        }
        Ok(chunk)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
