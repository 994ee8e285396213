//! Text-to-speech services
//!
//! Two backends, selected by `[providers] tts`:
//! - `wyoming`: streaming duplex session; PCM chunks are played while the
//!   server is still synthesizing
//! - `openai`: OpenAI-compatible `/v1/audio/speech`; the full WAV response is
//!   decoded and played through the same sink path

pub mod openai;
pub mod wyoming;

use crate::audio::PcmSink;
use crate::config::{Config, TtsProvider};
use crate::error::Result;
use crate::signals::StopSignal;

/// Human-readable label of the active TTS backend, for logging
pub fn model_label(config: &Config) -> String {
    match config.providers.tts {
        TtsProvider::Wyoming => format!(
            "wyoming:{}:{}",
            config.tts.wyoming.host, config.tts.wyoming.port
        ),
        TtsProvider::Openai => format!("openai:{}", config.tts.openai.model),
    }
}

/// Forward synthesis chunks to a sink in arrival order until the server
/// signals end-of-audio or the stop signal fires.
///
/// On cancellation the remaining chunks are abandoned; a truncated final
/// chunk is dropped rather than treated as an error. Returns the number of
/// PCM bytes delivered.
pub async fn stream_to_sink<K: PcmSink>(
    session: &mut wyoming::TtsSession,
    sink: &mut K,
    stop: &StopSignal,
) -> Result<usize> {
    let mut delivered = 0usize;
    loop {
        tokio::select! {
            chunk = session.next_chunk() => {
                match chunk? {
                    Some(pcm) => {
                        delivered += pcm.len();
                        sink.write(pcm).await?;
                    }
                    None => break,
                }
            }
            _ = stop.wait() => {
                tracing::debug!("Stop requested, abandoning remaining synthesis audio");
                break;
            }
        }
    }
    Ok(delivered)
}

/// Buffer all synthesis chunks, for saving to a file instead of playback
pub async fn collect_chunks(
    session: &mut wyoming::TtsSession,
    stop: &StopSignal,
) -> Result<Vec<u8>> {
    let mut pcm = Vec::new();
    loop {
        tokio::select! {
            chunk = session.next_chunk() => {
                match chunk? {
                    Some(bytes) => pcm.extend_from_slice(&bytes),
                    None => break,
                }
            }
            _ = stop.wait() => break,
        }
    }
    Ok(pcm)
}
