//! Streaming transcription session over the Wyoming protocol
//!
//! Session shape: the client sends `transcribe` and `audio-start`, then an
//! ordered run of `audio-chunk` events, then `audio-stop`; the server answers
//! with zero or more `transcript-chunk` events and one final `transcript`.
//! The socket is split so audio can be pushed while transcripts are read.

use super::TranscriptEvent;
use crate::audio::AudioFormat;
use crate::error::AsrError;
use crate::wyoming::{self, WireError};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Write half of an ASR session: pushes audio
pub struct AsrSender {
    writer: OwnedWriteHalf,
    format: AudioFormat,
    ended: bool,
}

/// Read half of an ASR session: yields transcript events
pub struct AsrReceiver {
    reader: BufReader<OwnedReadHalf>,
    finished: bool,
}

/// Open a session and perform the start handshake.
///
/// Fails with `AsrError::Unavailable` when the server cannot be reached.
pub async fn connect(
    host: &str,
    port: u16,
    format: AudioFormat,
) -> Result<(AsrSender, AsrReceiver), AsrError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| AsrError::Unavailable(format!("{}:{}: {}", host, port, e)))?;
    tracing::debug!("Connected to ASR server at {}:{}", host, port);

    let (read, write) = stream.into_split();
    let mut sender = AsrSender {
        writer: write,
        format,
        ended: false,
    };

    sender.write(&wyoming::transcribe()).await?;
    sender.write(&wyoming::audio_start(format)).await?;

    Ok((
        sender,
        AsrReceiver {
            reader: BufReader::new(read),
            finished: false,
        },
    ))
}

impl AsrSender {
    /// Push one PCM chunk. Chunks must be sent in capture order.
    pub async fn send_chunk(&mut self, pcm: &[u8]) -> Result<(), AsrError> {
        if self.ended {
            return Err(AsrError::Protocol(
                "audio chunk sent after end of stream".to_string(),
            ));
        }
        let event = wyoming::audio_chunk(self.format, pcm);
        self.write(&event).await
    }

    /// Signal that no more audio follows. Calling this twice is a protocol
    /// error.
    pub async fn end_stream(&mut self) -> Result<(), AsrError> {
        if self.ended {
            return Err(AsrError::Protocol("end_stream called twice".to_string()));
        }
        self.ended = true;
        self.write(&wyoming::audio_stop()).await
    }

    /// Whether end-of-stream has been sent
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    async fn write(&mut self, event: &wyoming::Event) -> Result<(), AsrError> {
        wyoming::write_event(&mut self.writer, event)
            .await
            .map_err(wire_err)
    }
}

impl AsrReceiver {
    /// Next transcript event. Returns `None` once the session is over: after
    /// the final transcript, or when the server closes without one (an empty
    /// utterance). Awaiting this is a suspension point.
    pub async fn next_event(&mut self) -> Result<Option<TranscriptEvent>, AsrError> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let Some(event) = wyoming::read_event(&mut self.reader)
                .await
                .map_err(wire_err)?
            else {
                self.finished = true;
                return Ok(None);
            };

            match event.event_type.as_str() {
                "transcript" => {
                    self.finished = true;
                    let text = event.data_str("text").unwrap_or("").to_string();
                    return Ok(Some(TranscriptEvent {
                        text,
                        is_final: true,
                    }));
                }
                "transcript-chunk" => {
                    let text = event.data_str("text").unwrap_or("").to_string();
                    return Ok(Some(TranscriptEvent {
                        text,
                        is_final: false,
                    }));
                }
                // Streaming servers bracket partials with these markers
                "transcript-start" | "transcript-stop" => continue,
                other => {
                    tracing::trace!("Ignoring ASR event: {}", other);
                }
            }
        }
    }
}

fn wire_err(e: WireError) -> AsrError {
    match e {
        WireError::Io(e) => AsrError::Network(e.to_string()),
        WireError::Malformed(m) => AsrError::Protocol(m),
    }
}
