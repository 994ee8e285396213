//! Result delivery
//!
//! Transcripts are printed to stdout (unless quiet) and optionally copied to
//! the clipboard. Delivery targets implement a small trait so agents can be
//! tested with a capturing fake.

pub mod clipboard;

use crate::error::OutputError;

/// Trait for text delivery implementations
#[async_trait::async_trait]
pub trait TextOutput: Send + Sync {
    /// Deliver the text
    async fn output(&self, text: &str) -> Result<(), OutputError>;

    /// Check if this delivery method is available
    async fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Deliver text through every target, logging failures without aborting.
/// Clipboard trouble should never lose a transcript that stdout already has.
pub async fn deliver_all(targets: &[Box<dyn TextOutput>], text: &str) {
    for target in targets {
        if !target.is_available().await {
            tracing::warn!("{} not available, skipping", target.name());
            continue;
        }
        match target.output(text).await {
            Ok(()) => tracing::debug!("Delivered via {}", target.name()),
            Err(e) => tracing::warn!("{} failed: {}", target.name(), e),
        }
    }
}
