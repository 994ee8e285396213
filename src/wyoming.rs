//! Wyoming protocol event framing
//!
//! Wyoming is the wire protocol spoken by local streaming speech servers
//! (ASR and TTS alike). Every event is a single JSON header line terminated
//! by `\n`, optionally followed by `payload_length` bytes of binary payload:
//!
//! ```text
//! {"type": "audio-chunk", "data": {"rate": 16000, "width": 2, "channels": 1}, "payload_length": 2048}\n
//! <2048 bytes of PCM>
//! ```
//!
//! This module only handles framing; session semantics live in the asr and
//! tts modules.

use crate::audio::AudioFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors at the framing layer
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed event header: {0}")]
    Malformed(String),
}

/// JSON header of a single wire event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_length: Option<usize>,
}

/// A decoded wire event: header plus payload bytes (empty when none)
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub data: Option<Value>,
    pub payload: Vec<u8>,
}

impl Event {
    /// Event with no data and no payload
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: None,
            payload: Vec::new(),
        }
    }

    /// Event with a JSON data object
    pub fn with_data(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data),
            payload: Vec::new(),
        }
    }

    /// Event with a JSON data object and a binary payload
    pub fn with_payload(event_type: impl Into<String>, data: Value, payload: Vec<u8>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data),
            payload,
        }
    }

    /// Fetch a string field from the data object
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }

    /// Fetch an integer field from the data object
    pub fn data_u64(&self, field: &str) -> Option<u64> {
        self.data.as_ref()?.get(field)?.as_u64()
    }
}

/// Write one event to the stream and flush it
pub async fn write_event<W>(writer: &mut W, event: &Event) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let header = EventHeader {
        event_type: event.event_type.clone(),
        data: event.data.clone(),
        payload_length: if event.payload.is_empty() {
            None
        } else {
            Some(event.payload.len())
        },
    };

    let mut line = serde_json::to_string(&header)
        .map_err(|e| WireError::Malformed(format!("unencodable header: {}", e)))?;
    line.push('\n');

    writer.write_all(line.as_bytes()).await?;
    if !event.payload.is_empty() {
        writer.write_all(&event.payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read one event from the stream.
///
/// Returns `Ok(None)` on a clean end of stream at a header boundary. An EOF
/// in the middle of a header or payload is an error.
pub async fn read_event<R>(reader: &mut R) -> Result<Option<Event>, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }

    let header: EventHeader = serde_json::from_str(line.trim_end())
        .map_err(|e| WireError::Malformed(format!("{}: {:?}", e, line.trim_end())))?;

    let mut payload = vec![0u8; header.payload_length.unwrap_or(0)];
    if !payload.is_empty() {
        reader.read_exact(&mut payload).await?;
    }

    Ok(Some(Event {
        event_type: header.event_type,
        data: header.data,
        payload,
    }))
}

/// `transcribe` session-start intent for an ASR server
pub fn transcribe() -> Event {
    Event::new("transcribe")
}

/// `audio-start` event carrying the PCM format descriptor
pub fn audio_start(format: AudioFormat) -> Event {
    Event::with_data("audio-start", format_data(format))
}

/// `audio-chunk` event carrying one PCM block
pub fn audio_chunk(format: AudioFormat, pcm: &[u8]) -> Event {
    Event::with_payload("audio-chunk", format_data(format), pcm.to_vec())
}

/// `audio-stop` end-of-stream marker
pub fn audio_stop() -> Event {
    Event::new("audio-stop")
}

/// `synthesize` request for a TTS server
pub fn synthesize(text: &str, voice: Option<&str>) -> Event {
    let mut data = json!({ "text": text });
    if let Some(voice) = voice {
        data["voice"] = json!({ "name": voice });
    }
    Event::with_data("synthesize", data)
}

fn format_data(format: AudioFormat) -> Value {
    json!({
        "rate": format.sample_rate,
        "width": AudioFormat::SAMPLE_WIDTH,
        "channels": format.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(event: Event) -> Event {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        write_event(&mut client, &event).await.unwrap();
        drop(client);
        let mut reader = tokio::io::BufReader::new(server);
        read_event(&mut reader).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_plain_event() {
        let decoded = round_trip(audio_stop()).await;
        assert_eq!(decoded.event_type, "audio-stop");
        assert!(decoded.data.is_none());
        assert!(decoded.payload.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_payload_event() {
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };
        let pcm = vec![0x01, 0x02, 0x03, 0x04];
        let decoded = round_trip(audio_chunk(format, &pcm)).await;
        assert_eq!(decoded.event_type, "audio-chunk");
        assert_eq!(decoded.payload, pcm);
        assert_eq!(decoded.data_u64("rate"), Some(16000));
        assert_eq!(decoded.data_u64("width"), Some(2));
        assert_eq!(decoded.data_u64("channels"), Some(1));
    }

    #[tokio::test]
    async fn test_synthesize_event_carries_voice() {
        let decoded = round_trip(synthesize("Hello, world!", Some("lessac"))).await;
        assert_eq!(decoded.event_type, "synthesize");
        assert_eq!(decoded.data_str("text"), Some("Hello, world!"));
        assert_eq!(
            decoded.data.unwrap()["voice"]["name"],
            serde_json::json!("lessac")
        );
    }

    #[tokio::test]
    async fn test_read_event_eof_is_none() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = tokio::io::BufReader::new(server);
        assert!(read_event(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_event_rejects_garbage() {
        let (mut client, server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, b"not json\n")
            .await
            .unwrap();
        drop(client);
        let mut reader = tokio::io::BufReader::new(server);
        assert!(matches!(
            read_event(&mut reader).await,
            Err(WireError::Malformed(_))
        ));
    }
}
