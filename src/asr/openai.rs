//! Batch transcription via an OpenAI-compatible API
//!
//! Buffered PCM is encoded as WAV and posted to `/v1/audio/transcriptions`.
//! The HTTP client is blocking; callers wrap this in `spawn_blocking`.

use crate::audio::AudioFormat;
use crate::config::OpenaiAsrConfig;
use crate::error::AsrError;
use std::io::Cursor;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Transcribe one buffered recording
pub fn transcribe(
    config: &OpenaiAsrConfig,
    pcm: &[u8],
    format: AudioFormat,
) -> Result<String, AsrError> {
    let duration_secs =
        pcm.len() as f32 / (format.sample_rate as f32 * format.channels as f32 * 2.0);
    tracing::debug!(
        "Sending {:.2}s of audio to {} ({} bytes)",
        duration_secs,
        config.model,
        pcm.len()
    );

    let wav = encode_wav(pcm, format)?;
    let (boundary, body) = build_multipart_body(&config.model, &wav);

    let base = config
        .base_url
        .as_deref()
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/');
    let url = format!("{}/v1/audio/transcriptions", base);

    let mut request = ureq::post(&url).timeout(REQUEST_TIMEOUT).set(
        "Content-Type",
        &format!("multipart/form-data; boundary={}", boundary),
    );

    let api_key = config
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    if let Some(ref key) = api_key {
        request = request.set("Authorization", &format!("Bearer {}", key));
    }

    let response = request.send_bytes(&body).map_err(|e| match e {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            AsrError::Backend(format!("server returned {}: {}", code, body))
        }
        ureq::Error::Transport(t) => AsrError::Unavailable(format!("{}: {}", url, t)),
    })?;

    let json: serde_json::Value = response
        .into_json()
        .map_err(|e| AsrError::Backend(format!("failed to parse response: {}", e)))?;

    let text = json
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AsrError::Backend(format!("response missing 'text' field: {}", json)))?
        .trim()
        .to_string();

    Ok(text)
}

/// Wrap raw i16-LE PCM in a WAV container
fn encode_wav(pcm: &[u8], format: AudioFormat) -> Result<Vec<u8>, AsrError> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| AsrError::Backend(format!("failed to create WAV writer: {}", e)))?;

    for bytes in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([bytes[0], bytes[1]]);
        writer
            .write_sample(sample)
            .map_err(|e| AsrError::Backend(format!("failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| AsrError::Backend(format!("failed to finalize WAV: {}", e)))?;

    Ok(buffer.into_inner())
}

/// Build the multipart form body for the API request
fn build_multipart_body(model: &str, wav: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!(
        "----SottoBoundary{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );

    let mut body = Vec::new();

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
    body.extend_from_slice(wav);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"model\"\r\n\r\n");
    body.extend_from_slice(model.as_bytes());
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"response_format\"\r\n\r\n");
    body.extend_from_slice(b"json\r\n");

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (boundary, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_basic() {
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };
        // One second of silence
        let pcm = vec![0u8; 32000];

        let wav = encode_wav(&pcm, format).unwrap();

        // 44-byte header plus the samples
        assert_eq!(wav.len(), 44 + 32000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_multipart_body_structure() {
        let wav = vec![0u8; 100];
        let (boundary, body) = build_multipart_body("whisper-1", &wav);

        let body_str = String::from_utf8_lossy(&body);
        assert!(body_str.contains(&boundary));
        assert!(body_str.contains("name=\"file\""));
        assert!(body_str.contains("filename=\"audio.wav\""));
        assert!(body_str.contains("name=\"model\""));
        assert!(body_str.contains("whisper-1"));
        assert!(body_str.contains("name=\"response_format\""));
        assert!(body_str.ends_with(&format!("--{}--\r\n", boundary)));
    }
}
