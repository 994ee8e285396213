//! Transcribe agent
//!
//! Captures microphone audio, streams it to the configured ASR backend,
//! optionally rewrites the transcript with the LLM, then delivers the result
//! (stdout, clipboard) and appends it to the ledger. Recording ends when the
//! stop signal fires (Ctrl+C, or `--stop` against a detached worker).

use crate::asr;
use crate::audio::{InputStream, PcmSource, TeeSource};
use crate::config::Config;
use crate::error::Result;
use crate::ledger::{Ledger, LedgerEntry, Role};
use crate::llm;
use crate::output::{self, clipboard::ClipboardOutput, TextOutput};
use crate::signals::StopSignal;

/// Cleanup instructions sent to the LLM when --llm is enabled
const CLEANUP_PROMPT: &str = "You clean up dictated text. Fix punctuation, \
capitalization, and obvious transcription mistakes without changing the \
meaning. Reply with the corrected text only.";

/// Per-invocation options not covered by the config file
#[derive(Debug, Default, Clone)]
pub struct TranscribeOptions {
    pub llm_enabled: bool,
    pub extra_instructions: Option<String>,
}

/// Run one transcription against the real microphone and clipboard
pub async fn run(config: &Config, opts: &TranscribeOptions, stop: StopSignal) -> Result<()> {
    let source = InputStream::open(&config.audio.input)?;

    let mut outputs: Vec<Box<dyn TextOutput>> = Vec::new();
    if config.general.clipboard {
        outputs.push(Box::new(ClipboardOutput::new()));
    }

    run_with(config, opts, stop, source, &outputs).await
}

/// The agent loop with its collaborators injected (tests use fakes here)
pub async fn run_with<S: PcmSource>(
    config: &Config,
    opts: &TranscribeOptions,
    stop: StopSignal,
    source: S,
    outputs: &[Box<dyn TextOutput>],
) -> Result<()> {
    tracing::info!("Listening... press Ctrl+C to finish");

    let mut source = if config.general.save_file.is_some() {
        TeeSource::new(source)
    } else {
        TeeSource::passthrough(source)
    };

    let result = asr::transcribe_source(config, &mut source, &stop).await;
    source.close();
    let format = source.format();
    let (_, captured) = source.into_inner();
    let raw = result?;

    if let Some(ref path) = config.general.save_file {
        if captured.is_empty() {
            tracing::warn!("No audio captured, skipping {:?}", path);
        } else {
            super::save_wav(path, format, &captured)?;
        }
    }

    let Some(raw) = raw else {
        tracing::info!("No speech detected");
        return Ok(());
    };
    tracing::info!("Transcript: {:?}", raw);

    let (delivered, entry) = if opts.llm_enabled {
        let mut system = CLEANUP_PROMPT.to_string();
        if let Some(ref extra) = opts.extra_instructions {
            system.push_str("\n\n");
            system.push_str(extra);
        }
        let processed = llm::rewrite(config, &system, &raw).await?;
        tracing::info!("Processed transcript: {:?}", processed);
        let entry = LedgerEntry::now(
            Role::Assistant,
            llm::model_label(config),
            raw,
            Some(processed.clone()),
        );
        (processed, entry)
    } else {
        let entry = LedgerEntry::now(Role::User, asr::model_label(config), raw.clone(), None);
        (raw, entry)
    };

    if !config.general.quiet {
        println!("{}", delivered);
    }
    output::deliver_all(outputs, &delivered).await;

    if let Some(ref path) = config.general.ledger_file {
        // Ledger trouble must not lose the transcript we just delivered
        if let Err(e) = Ledger::new(path).append(&entry) {
            tracing::warn!("Failed to append ledger entry: {}", e);
        }
    }

    Ok(())
}
