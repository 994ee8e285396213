//! Batch synthesis via an OpenAI-compatible API
//!
//! Posts to `/v1/audio/speech` requesting a WAV response, then decodes it to
//! raw PCM so playback goes through the same sink path as the streaming
//! backend. The HTTP client is blocking; callers wrap this in
//! `spawn_blocking`.

use crate::audio::AudioFormat;
use crate::config::OpenaiTtsConfig;
use crate::error::TtsError;
use serde_json::json;
use std::io::{Cursor, Read};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Response bodies larger than this are rejected rather than buffered
const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Synthesize `text` and return the decoded PCM with its format
pub fn synthesize(
    config: &OpenaiTtsConfig,
    text: &str,
) -> Result<(AudioFormat, Vec<u8>), TtsError> {
    let base = config
        .base_url
        .as_deref()
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/');
    let url = format!("{}/v1/audio/speech", base);

    let mut request = ureq::post(&url).timeout(REQUEST_TIMEOUT);

    let api_key = config
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    if let Some(ref key) = api_key {
        request = request.set("Authorization", &format!("Bearer {}", key));
    }

    let response = request
        .send_json(json!({
            "model": config.model,
            "voice": config.voice,
            "input": text,
            "response_format": "wav",
        }))
        .map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                TtsError::Backend(format!("server returned {}: {}", code, body))
            }
            ureq::Error::Transport(t) => TtsError::Unavailable(format!("{}: {}", url, t)),
        })?;

    let mut wav = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut wav)
        .map_err(|e| TtsError::Network(e.to_string()))?;

    decode_wav(&wav)
}

/// Decode a WAV container to i16-LE PCM
fn decode_wav(wav: &[u8]) -> Result<(AudioFormat, Vec<u8>), TtsError> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| TtsError::Backend(format!("invalid WAV response: {}", e)))?;
    let spec = reader.spec();

    let format = AudioFormat {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    };

    let mut pcm = Vec::new();
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample.saturating_sub(16);
            for sample in reader.into_samples::<i32>() {
                let sample =
                    sample.map_err(|e| TtsError::Backend(format!("bad WAV data: {}", e)))?;
                let value = (sample >> shift) as i16;
                pcm.extend_from_slice(&value.to_le_bytes());
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.into_samples::<f32>() {
                let sample =
                    sample.map_err(|e| TtsError::Backend(format!("bad WAV data: {}", e)))?;
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                pcm.extend_from_slice(&value.to_le_bytes());
            }
        }
    }

    Ok((format, pcm))
}
