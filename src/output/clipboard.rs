//! Clipboard delivery via wl-clipboard
//!
//! Uses wl-copy to set the Wayland clipboard and wl-paste to read it back
//! (voice-edit needs both directions).
//!
//! Requires: wl-clipboard package installed

use super::TextOutput;
use crate::error::OutputError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Clipboard-based text delivery
pub struct ClipboardOutput;

impl ClipboardOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClipboardOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TextOutput for ClipboardOutput {
    async fn output(&self, text: &str) -> Result<(), OutputError> {
        copy(text).await
    }

    async fn is_available(&self) -> bool {
        which("wl-copy").await
    }

    fn name(&self) -> &'static str {
        "clipboard (wl-copy)"
    }
}

/// Copy text to the clipboard
pub async fn copy(text: &str) -> Result<(), OutputError> {
    if text.is_empty() {
        return Ok(());
    }

    let mut child = Command::new("wl-copy")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OutputError::WlCopyNotFound
            } else {
                OutputError::CommandFailed(e.to_string())
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| OutputError::CommandFailed(e.to_string()))?;
        // Close stdin to signal EOF
        drop(stdin);
    }

    let status = child
        .wait()
        .await
        .map_err(|e| OutputError::CommandFailed(e.to_string()))?;

    if !status.success() {
        return Err(OutputError::CommandFailed(
            "wl-copy exited with error".to_string(),
        ));
    }

    tracing::info!("Copied transcript to clipboard ({} chars)", text.len());
    Ok(())
}

/// Read the current clipboard contents
pub async fn paste() -> Result<String, OutputError> {
    let output = Command::new("wl-paste")
        .arg("--no-newline")
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OutputError::WlPasteNotFound
            } else {
                OutputError::CommandFailed(e.to_string())
            }
        })?;

    if !output.status.success() {
        // wl-paste fails when the clipboard is empty; treat that as no text
        return Ok(String::new());
    }

    String::from_utf8(output.stdout)
        .map_err(|_| OutputError::CommandFailed("clipboard is not UTF-8 text".to_string()))
}

async fn which(binary: &str) -> bool {
    Command::new("which")
        .arg(binary)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
