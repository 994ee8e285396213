//! Streaming synthesis session over the Wyoming protocol
//!
//! Session shape: the client sends one `synthesize` event; the server answers
//! with `audio-start` (declaring the PCM format it will stream), a run of
//! `audio-chunk` events, and `audio-stop`.

use crate::audio::AudioFormat;
use crate::error::TtsError;
use crate::wyoming::{self, WireError};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// One synthesis session
pub struct TtsSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    requested: bool,
    started: bool,
    finished: bool,
}

/// Open a session.
///
/// Fails with `TtsError::Unavailable` when the server cannot be reached.
pub async fn connect(host: &str, port: u16) -> Result<TtsSession, TtsError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| TtsError::Unavailable(format!("{}:{}: {}", host, port, e)))?;
    tracing::debug!("Connected to TTS server at {}:{}", host, port);

    let (read, write) = stream.into_split();
    Ok(TtsSession {
        reader: BufReader::new(read),
        writer: write,
        requested: false,
        started: false,
        finished: false,
    })
}

impl TtsSession {
    /// Send the text to synthesize. One request per session.
    pub async fn synthesize(&mut self, text: &str, voice: Option<&str>) -> Result<(), TtsError> {
        if self.requested {
            return Err(TtsError::Protocol(
                "synthesize called twice on one session".to_string(),
            ));
        }
        self.requested = true;
        wyoming::write_event(&mut self.writer, &wyoming::synthesize(text, voice))
            .await
            .map_err(wire_err)
    }

    /// Wait for the server's `audio-start` and return the PCM format it
    /// declares. Must be called after `synthesize`.
    pub async fn await_audio_start(&mut self) -> Result<AudioFormat, TtsError> {
        if !self.requested {
            return Err(TtsError::Protocol(
                "await_audio_start before synthesize".to_string(),
            ));
        }
        loop {
            let Some(event) = wyoming::read_event(&mut self.reader)
                .await
                .map_err(wire_err)?
            else {
                return Err(TtsError::Backend(
                    "server closed before audio started".to_string(),
                ));
            };

            match event.event_type.as_str() {
                "audio-start" => {
                    let format = AudioFormat {
                        sample_rate: event.data_u64("rate").unwrap_or(22050) as u32,
                        channels: event.data_u64("channels").unwrap_or(1) as u16,
                    };
                    self.started = true;
                    tracing::debug!(
                        "Synthesis stream: {} Hz, {} channel(s)",
                        format.sample_rate,
                        format.channels
                    );
                    return Ok(format);
                }
                other => {
                    tracing::trace!("Ignoring TTS event: {}", other);
                }
            }
        }
    }

    /// Next PCM chunk, in strict arrival order. `None` after `audio-stop`
    /// or when the server closes the connection.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TtsError> {
        if !self.started {
            return Err(TtsError::Protocol(
                "next_chunk before audio-start".to_string(),
            ));
        }
        if self.finished {
            return Ok(None);
        }
        loop {
            let Some(event) = wyoming::read_event(&mut self.reader)
                .await
                .map_err(wire_err)?
            else {
                // Connection close counts as end-of-audio
                self.finished = true;
                return Ok(None);
            };

            match event.event_type.as_str() {
                "audio-chunk" => return Ok(Some(event.payload)),
                "audio-stop" => {
                    self.finished = true;
                    return Ok(None);
                }
                other => {
                    tracing::trace!("Ignoring TTS event: {}", other);
                }
            }
        }
    }
}

fn wire_err(e: WireError) -> TtsError {
    match e {
        WireError::Io(e) => TtsError::Network(e.to_string()),
        WireError::Malformed(m) => TtsError::Protocol(m),
    }
}
