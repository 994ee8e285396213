//! cpal-based audio playback
//!
//! Mirror of the capture side: a dedicated thread owns the cpal::Stream and
//! feeds the device callback from a sample queue. Writers push PCM blocks
//! through a bounded channel, so a fast producer (a TTS server streaming
//! faster than real time) is backpressured instead of buffering unboundedly.
//! Closing the stream drains whatever is queued, bounded by a fixed ceiling.

use super::{select_output_device, AudioFormat, PcmSink};
use crate::config::AudioOutputConfig;
use crate::error::AudioError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// PCM blocks buffered between writers and the playback thread
const CHANNEL_CAPACITY: usize = 8;

/// How long to wait for the playback thread to come up
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// Ceiling on the drain wait when closing
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Speaker output stream accepting PCM blocks in arrival order
pub struct OutputStream {
    format: AudioFormat,
    sample_tx: Option<mpsc::Sender<Vec<u8>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl OutputStream {
    /// Open the configured playback device for PCM in `format`.
    ///
    /// Fails with `AudioError::InvalidDevice` when the device index is out of
    /// range or the device cannot play audio.
    pub fn open(config: &AudioOutputConfig, format: AudioFormat) -> Result<Self, AudioError> {
        use cpal::traits::DeviceTrait;

        let selection = config
            .selection()
            .map_err(|_| AudioError::InvalidDevice(config.device.clone()))?;
        let device = select_output_device(selection)?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio output device: {}", device_name);

        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let device_rate = supported.sample_rate().0;
        let device_channels = supported.channels() as usize;
        let sample_format = supported.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            device_rate,
            device_channels,
            sample_format
        );

        let (sample_tx, mut sample_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), AudioError>>();

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let queue_cb = queue.clone();

        let thread = thread::spawn(move || {
            use cpal::traits::StreamTrait;

            let stream_config = cpal::StreamConfig {
                channels: supported.channels(),
                sample_rate: supported.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::error!("Audio output stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => {
                    build_output_stream::<f32>(&device, &stream_config, queue_cb, err_fn)
                }
                cpal::SampleFormat::I16 => {
                    build_output_stream::<i16>(&device, &stream_config, queue_cb, err_fn)
                }
                cpal::SampleFormat::U16 => {
                    build_output_stream::<u16>(&device, &stream_config, queue_cb, err_fn)
                }
                format => Err(AudioError::StreamError(format!(
                    "unsupported sample format: {:?}",
                    format
                ))),
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            tracing::debug!("Audio playback thread started");

            // Convert incoming PCM into the device's layout and queue it
            while let Some(pcm) = sample_rx.blocking_recv() {
                let converted =
                    convert_for_device(&pcm, format, device_rate, device_channels);
                if let Ok(mut guard) = queue.lock() {
                    guard.extend(converted);
                }
            }

            // Writers are done; let the callback drain the queue
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            loop {
                let remaining = queue.lock().map(|q| q.len()).unwrap_or(0);
                if remaining == 0 || Instant::now() >= deadline {
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }

            drop(stream);
            tracing::debug!("Audio playback thread stopped");
        });

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(AudioError::StreamError(
                    "playback thread did not start in time".to_string(),
                ));
            }
        }

        Ok(Self {
            format,
            sample_tx: Some(sample_tx),
            thread: Some(thread),
        })
    }

    /// Whether the playback thread is still holding the device
    pub fn is_active(&self) -> bool {
        self.thread.is_some()
    }

    fn close_inner(&mut self) {
        // Dropping the sender ends the thread's recv loop; it drains the
        // queue (bounded) and releases the device before exiting.
        self.sample_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

#[async_trait::async_trait]
impl PcmSink for OutputStream {
    async fn write(&mut self, pcm: Vec<u8>) -> Result<(), AudioError> {
        let tx = self
            .sample_tx
            .as_ref()
            .ok_or_else(|| AudioError::StreamError("playback stream is closed".to_string()))?;
        tx.send(pcm)
            .await
            .map_err(|_| AudioError::StreamError("playback thread exited".to_string()))
    }

    fn close(&mut self) {
        self.close_inner();
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.close_inner();
    }
}

/// Decode i16-LE PCM and adapt it to the device's rate and channel count
fn convert_for_device(
    pcm: &[u8],
    format: AudioFormat,
    device_rate: u32,
    device_channels: usize,
) -> Vec<f32> {
    // Mix incoming frames to mono f32
    let channels = format.channels.max(1) as usize;
    let mono: Vec<f32> = pcm
        .chunks_exact(2 * channels)
        .map(|frame| {
            let sum: f32 = frame
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
                .sum();
            sum / channels as f32
        })
        .collect();

    let resampled = if format.sample_rate != device_rate {
        super::capture::resample(&mono, format.sample_rate, device_rate)
    } else {
        mono
    };

    // Interleave the mono signal across the device's channels
    let mut out = Vec::with_capacity(resampled.len() * device_channels);
    for sample in resampled {
        for _ in 0..device_channels {
            out.push(sample);
        }
    }
    out
}

/// Build an output stream for a specific sample type
fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<Mutex<VecDeque<f32>>>,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    use cpal::traits::DeviceTrait;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut guard = match queue.lock() {
                    Ok(g) => g,
                    Err(_) => return,
                };
                for slot in data.iter_mut() {
                    let sample = guard.pop_front().unwrap_or(0.0);
                    *slot = T::from_sample(sample);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_from_i16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_convert_preserves_length_at_same_rate() {
        let format = AudioFormat {
            sample_rate: 22050,
            channels: 1,
        };
        let pcm = pcm_from_i16(&[0, i16::MAX / 2, i16::MIN / 2, 0]);
        let out = convert_for_device(&pcm, format, 22050, 1);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_convert_interleaves_device_channels() {
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };
        let pcm = pcm_from_i16(&[1000, 2000]);
        let out = convert_for_device(&pcm, format, 16000, 2);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[2], out[3]);
    }

    #[test]
    fn test_convert_mixes_stereo_input_to_mono() {
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 2,
        };
        // Two stereo frames
        let pcm = pcm_from_i16(&[1000, 3000, 2000, 4000]);
        let out = convert_for_device(&pcm, format, 16000, 1);
        assert_eq!(out.len(), 2);
        assert!(out[0] < out[1]);
    }
}
