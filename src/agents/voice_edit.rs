//! Voice-edit agent
//!
//! Reads the current clipboard, records a spoken instruction, asks the LLM to
//! apply the instruction to the text, and writes the result back to the
//! clipboard. The whole exchange lands in the ledger as one entry.

use crate::asr;
use crate::audio::{InputStream, PcmSource};
use crate::config::Config;
use crate::error::Result;
use crate::ledger::{Ledger, LedgerEntry, Role};
use crate::llm;
use crate::output::clipboard;
use crate::signals::StopSignal;

/// Editing instructions sent to the LLM
const EDIT_PROMPT: &str = "You are a text editor. Apply the spoken instruction \
to the text between the <text> tags and reply with the edited text only, no \
commentary and no tags.";

/// Per-invocation options not covered by the config file
#[derive(Debug, Default, Clone)]
pub struct VoiceEditOptions {
    pub extra_instructions: Option<String>,
}

/// Run one voice-edit round trip
pub async fn run(config: &Config, opts: &VoiceEditOptions, stop: StopSignal) -> Result<()> {
    let original = clipboard::paste().await?;
    if original.trim().is_empty() {
        println!("Clipboard is empty; nothing to edit.");
        return Ok(());
    }
    tracing::info!("Editing {} chars from the clipboard", original.len());

    let mut source = InputStream::open(&config.audio.input)?;
    tracing::info!("Speak your instruction... press Ctrl+C to finish");
    let instruction = asr::transcribe_source(config, &mut source, &stop).await;
    source.close();

    let Some(instruction) = instruction? else {
        println!("No instruction heard.");
        return Ok(());
    };
    tracing::info!("Instruction: {:?}", instruction);

    let mut system = EDIT_PROMPT.to_string();
    if let Some(ref extra) = opts.extra_instructions {
        system.push_str("\n\n");
        system.push_str(extra);
    }
    let user = format!(
        "<text>\n{}\n</text>\n\nInstruction: {}",
        original, instruction
    );
    let edited = llm::rewrite(config, &system, &user).await?;

    clipboard::copy(&edited).await?;
    if !config.general.quiet {
        println!("{}", edited);
    }

    if let Some(ref path) = config.general.ledger_file {
        let entry = LedgerEntry::now(
            Role::Assistant,
            llm::model_label(config),
            instruction,
            Some(edited),
        );
        if let Err(e) = Ledger::new(path).append(&entry) {
            tracing::warn!("Failed to append ledger entry: {}", e);
        }
    }

    Ok(())
}
