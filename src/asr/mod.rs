//! Speech-to-text services
//!
//! Two backends, selected by `[providers] asr`:
//! - `wyoming`: streaming duplex session against a local Wyoming server;
//!   audio is transcribed while it is still being captured
//! - `openai`: OpenAI-compatible HTTP endpoint; audio is buffered for the
//!   whole recording and sent as one request

pub mod openai;
pub mod wyoming;

use crate::audio::PcmSource;
use crate::config::{AsrProvider, Config};
use crate::error::{AsrError, Result, SottoError};
use crate::signals::StopSignal;
use std::time::Duration;

/// One transcript update from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

/// Give up on a session whose server goes quiet after end-of-stream
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Human-readable label of the active ASR backend, for ledger entries
pub fn model_label(config: &Config) -> String {
    match config.providers.asr {
        AsrProvider::Wyoming => format!(
            "wyoming:{}:{}",
            config.asr.wyoming.host, config.asr.wyoming.port
        ),
        AsrProvider::Openai => format!("openai:{}", config.asr.openai.model),
    }
}

/// Capture audio from `source` until it ends or the stop signal fires, and
/// return the final transcript. `None` means the utterance was empty.
pub async fn transcribe_source<S: PcmSource>(
    config: &Config,
    source: &mut S,
    stop: &StopSignal,
) -> Result<Option<String>> {
    match config.providers.asr {
        AsrProvider::Wyoming => {
            let (sender, receiver) = wyoming::connect(
                &config.asr.wyoming.host,
                config.asr.wyoming.port,
                source.format(),
            )
            .await?;
            stream_transcript(sender, receiver, source, stop).await
        }
        AsrProvider::Openai => {
            let format = source.format();
            let pcm = collect_pcm(source, stop).await?;
            if pcm.is_empty() {
                return Ok(None);
            }
            let cfg = config.asr.openai.clone();
            let text = tokio::task::spawn_blocking(move || openai::transcribe(&cfg, &pcm, format))
                .await
                .map_err(|e| {
                    SottoError::Asr(AsrError::Backend(format!("transcription task failed: {}", e)))
                })??;
            Ok(Some(text).filter(|t| !t.is_empty()))
        }
    }
}

/// Run one streaming session: pump chunks from `source` into the session
/// while consuming transcript events, until the final transcript arrives.
///
/// When the stop signal fires (or the source ends) the audio stream is ended
/// gracefully and buffered events are drained, so a transcript already in
/// flight is never lost.
pub async fn stream_transcript<S: PcmSource>(
    mut sender: wyoming::AsrSender,
    receiver: wyoming::AsrReceiver,
    source: &mut S,
    stop: &StopSignal,
) -> Result<Option<String>> {
    // The receiver runs as its own task: reads stay cancel-safe no matter
    // which select arm wins below.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(16);
    let reader = tokio::spawn(async move {
        let mut receiver = receiver;
        loop {
            let item = receiver.next_event().await;
            let done = !matches!(item, Ok(Some(ref ev)) if !ev.is_final);
            if event_tx.send(item).await.is_err() || done {
                break;
            }
        }
    });

    let mut ended = false;
    let final_text = loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(Ok(Some(ev))) if ev.is_final => break Some(ev.text),
                    Some(Ok(Some(ev))) => {
                        tracing::debug!("Partial transcript: {:?}", ev.text);
                    }
                    // Server closed without a final transcript: empty utterance
                    Some(Ok(None)) | None => break None,
                    Some(Err(e)) => return Err(e.into()),
                }
            }

            chunk = source.read_chunk(), if !ended => {
                match chunk? {
                    Some(pcm) => sender.send_chunk(&pcm).await?,
                    None => {
                        sender.end_stream().await?;
                        ended = true;
                    }
                }
            }

            _ = stop.wait(), if !ended => {
                tracing::debug!("Stop requested, ending audio stream");
                sender.end_stream().await?;
                ended = true;
            }

            _ = tokio::time::sleep(DRAIN_TIMEOUT), if ended => {
                tracing::warn!("ASR server sent no final transcript after end of stream");
                break None;
            }
        }
    };

    // The reader may still be blocked on a quiet socket (timeout path)
    reader.abort();
    let _ = reader.await;

    Ok(final_text.filter(|t| !t.is_empty()))
}

/// Buffer the whole recording for batch backends
async fn collect_pcm<S: PcmSource>(source: &mut S, stop: &StopSignal) -> Result<Vec<u8>> {
    let mut pcm = Vec::new();
    loop {
        tokio::select! {
            chunk = source.read_chunk() => {
                match chunk? {
                    Some(c) => pcm.extend_from_slice(&c),
                    None => break,
                }
            }
            _ = stop.wait() => break,
        }
    }
    Ok(pcm)
}
