//! cpal-based audio capture
//!
//! The capture thread owns the cpal::Stream (not Send) and converts whatever
//! the device produces into mono 16-bit PCM at the configured rate. Fixed-size
//! chunks flow to the reader through a bounded channel; when the reader falls
//! behind and the channel fills, the hardware buffer has effectively overrun
//! and the configured overflow policy decides whether the chunk is dropped or
//! the stream fails.

use super::{select_input_device, AudioFormat, PcmSource};
use crate::config::{AudioInputConfig, OverflowPolicy};
use crate::error::AudioError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

/// Chunks buffered between the capture thread and the reader
const CHANNEL_CAPACITY: usize = 64;

/// How long to wait for the capture thread to come up
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// Microphone input stream yielding fixed-size PCM chunks
pub struct InputStream {
    format: AudioFormat,
    chunk_rx: mpsc::Receiver<Vec<u8>>,
    policy: OverflowPolicy,
    overflowed: Arc<AtomicBool>,
    overflows: Arc<AtomicUsize>,
    shutdown_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// State shared with the capture callback
struct CallbackState {
    chunk_tx: mpsc::Sender<Vec<u8>>,
    pending: Vec<u8>,
    chunk_bytes: usize,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
    overflowed: Arc<AtomicBool>,
    overflows: Arc<AtomicUsize>,
}

impl InputStream {
    /// Open the configured capture device.
    ///
    /// Fails with `AudioError::InvalidDevice` when the device index is out of
    /// range or the device cannot capture.
    pub fn open(config: &AudioInputConfig) -> Result<Self, AudioError> {
        use cpal::traits::DeviceTrait;

        if config.channels != 1 {
            return Err(AudioError::StreamError(
                "capture supports 1 channel; device audio is mixed to mono".to_string(),
            ));
        }

        let selection = config
            .selection()
            .map_err(|_| AudioError::InvalidDevice(config.device.clone()))?;
        let device = select_input_device(selection)?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio input device: {}", device_name);

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let source_rate = supported.sample_rate().0;
        let source_channels = supported.channels() as usize;
        let sample_format = supported.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            source_rate,
            source_channels,
            sample_format
        );

        let format = AudioFormat {
            sample_rate: config.sample_rate,
            channels: config.channels,
        };
        let chunk_bytes = format.chunk_bytes(config.chunk_frames);

        let (chunk_tx, chunk_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), AudioError>>();

        let overflowed = Arc::new(AtomicBool::new(false));
        let overflows = Arc::new(AtomicUsize::new(0));

        let state = CallbackState {
            chunk_tx,
            pending: Vec::with_capacity(chunk_bytes * 2),
            chunk_bytes,
            source_rate,
            target_rate: format.sample_rate,
            source_channels,
            overflowed: overflowed.clone(),
            overflows: overflows.clone(),
        };

        let thread = thread::spawn(move || {
            use cpal::traits::StreamTrait;

            let stream_config = cpal::StreamConfig {
                channels: supported.channels(),
                sample_rate: supported.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::error!("Audio input stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => {
                    build_input_stream::<f32>(&device, &stream_config, state, err_fn)
                }
                cpal::SampleFormat::I16 => {
                    build_input_stream::<i16>(&device, &stream_config, state, err_fn)
                }
                cpal::SampleFormat::U16 => {
                    build_input_stream::<u16>(&device, &stream_config, state, err_fn)
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
            tracing::debug!("Audio capture thread started");

            // Block until close() or the handle is dropped
            let _ = shutdown_rx.recv();
            drop(stream);

            tracing::debug!("Audio capture thread stopped");
        });

        // Surface stream-build failures from the thread
        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(AudioError::StreamError(
                    "capture thread did not start in time".to_string(),
                ));
            }
        }

        Ok(Self {
            format,
            chunk_rx,
            policy: config.overflow,
            overflowed,
            overflows,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Whether the capture thread is still holding the device
    pub fn is_active(&self) -> bool {
        self.thread.is_some()
    }

    /// Number of chunks lost to buffer overruns so far
    pub fn overflow_count(&self) -> usize {
        self.overflows.load(Ordering::Relaxed)
    }

    fn close_inner(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            let lost = self.overflows.load(Ordering::Relaxed);
            if lost > 0 {
                tracing::warn!("Capture ended with {} chunk(s) lost to overruns", lost);
            }
        }
    }
}

#[async_trait::async_trait]
impl PcmSource for InputStream {
    fn format(&self) -> AudioFormat {
        self.format
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, AudioError> {
        if self.policy == OverflowPolicy::Abort && self.overflowed.load(Ordering::Relaxed) {
            return Err(AudioError::Overflow);
        }
        Ok(self.chunk_rx.recv().await)
    }

    fn close(&mut self) {
        self.close_inner();
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.close_inner();
    }
}

/// Build an input stream for a specific sample type
fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut state: CallbackState,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to f32 and mix to mono
                let mono: Vec<f32> = data
                    .chunks(state.source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / state.source_channels as f32
                    })
                    .collect();

                let resampled = if state.source_rate != state.target_rate {
                    resample(&mono, state.source_rate, state.target_rate)
                } else {
                    mono
                };

                for sample in resampled {
                    let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    state.pending.extend_from_slice(&value.to_le_bytes());
                }

                while state.pending.len() >= state.chunk_bytes {
                    let chunk: Vec<u8> = state.pending.drain(..state.chunk_bytes).collect();
                    match state.chunk_tx.try_send(chunk) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            let lost = state.overflows.fetch_add(1, Ordering::Relaxed);
                            state.overflowed.store(true, Ordering::Relaxed);
                            if lost == 0 {
                                tracing::warn!("Audio input buffer overrun, dropping chunk");
                            } else {
                                tracing::trace!("Audio input buffer overrun ({} lost)", lost + 1);
                            }
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            // Reader is gone; the stream is being torn down
                        }
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}

/// Linear interpolation resampling
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 48000 -> 16000 is 3:1, so 8 samples -> ~3 samples
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        let samples: Vec<f32> = vec![];
        let result = resample(&samples, 48000, 16000);
        assert!(result.is_empty());
    }

    #[test]
    fn test_open_rejects_multichannel_capture() {
        let config = AudioInputConfig {
            channels: 2,
            ..Default::default()
        };
        assert!(matches!(
            InputStream::open(&config),
            Err(AudioError::StreamError(_))
        ));
    }
}
