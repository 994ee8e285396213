//! Speak agent
//!
//! Sends text to the configured TTS backend and plays the synthesized PCM on
//! the output device, or saves it as a WAV file. With the streaming backend,
//! playback starts while the server is still synthesizing.

use crate::audio::{OutputStream, PcmSink};
use crate::config::{Config, TtsProvider};
use crate::error::{Result, SottoError, TtsError};
use crate::signals::StopSignal;
use crate::tts;
use tokio::io::AsyncReadExt;

/// Run one synthesis. Reads the text from stdin when none was given.
pub async fn run(config: &Config, text: Option<String>, stop: StopSignal) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let text = text.trim();
    if text.is_empty() {
        tracing::warn!("Nothing to speak");
        return Ok(());
    }

    tracing::info!("Synthesizing {} chars via {}", text.len(), tts::model_label(config));

    match config.providers.tts {
        TtsProvider::Wyoming => speak_streaming(config, text, &stop).await,
        TtsProvider::Openai => speak_batch(config, text, &stop).await,
    }
}

/// Streaming path: play chunks as they arrive
async fn speak_streaming(config: &Config, text: &str, stop: &StopSignal) -> Result<()> {
    let mut session =
        tts::wyoming::connect(&config.tts.wyoming.host, config.tts.wyoming.port).await?;
    session
        .synthesize(text, config.tts.wyoming.voice.as_deref())
        .await?;
    let format = session.await_audio_start().await?;

    if let Some(ref path) = config.general.save_file {
        let pcm = tts::collect_chunks(&mut session, stop).await?;
        super::save_wav(path, format, &pcm)?;
        return Ok(());
    }

    if !config.audio.output.enabled {
        tracing::warn!("Playback is disabled and no --save-file was given; nothing to do");
        return Ok(());
    }

    let mut sink = OutputStream::open(&config.audio.output, format)?;
    let delivered = tts::stream_to_sink(&mut session, &mut sink, stop).await;
    // Close drains what was queued; on cancellation the rest is dropped
    sink.close();
    let delivered = delivered?;

    let seconds = delivered as f32 / format.chunk_bytes(format.sample_rate as usize) as f32;
    tracing::info!("Played {:.1}s of synthesized audio", seconds);
    Ok(())
}

/// Batch path: fetch the whole WAV, then play it in chunks
async fn speak_batch(config: &Config, text: &str, stop: &StopSignal) -> Result<()> {
    let cfg = config.tts.openai.clone();
    let text_owned = text.to_string();
    let (format, pcm) =
        tokio::task::spawn_blocking(move || tts::openai::synthesize(&cfg, &text_owned))
            .await
            .map_err(|e| {
                SottoError::Tts(TtsError::Backend(format!("synthesis task failed: {}", e)))
            })??;

    if let Some(ref path) = config.general.save_file {
        super::save_wav(path, format, &pcm)?;
        return Ok(());
    }

    if !config.audio.output.enabled {
        tracing::warn!("Playback is disabled and no --save-file was given; nothing to do");
        return Ok(());
    }

    let mut sink = OutputStream::open(&config.audio.output, format)?;
    let chunk_bytes = format.chunk_bytes(1024);
    for chunk in pcm.chunks(chunk_bytes.max(2)) {
        if stop.is_set() {
            tracing::debug!("Stop requested, abandoning remaining playback");
            break;
        }
        sink.write(chunk.to_vec()).await?;
    }
    sink.close();

    Ok(())
}
