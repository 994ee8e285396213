//! Append-only transcription ledger
//!
//! Every completed transcription or processing event is appended as one
//! newline-delimited JSON record. Each append is a single write on a file
//! opened with O_APPEND, so concurrent agents writing to the same ledger
//! never interleave partial records. Purely a sink: no reading, compaction,
//! or rotation.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Who produced the recorded output
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Raw transcript of the user's speech
    User,
    /// LLM-processed output
    Assistant,
}

/// One ledger record
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerEntry {
    /// RFC 3339 timestamp, computed at write time
    pub timestamp: String,
    /// Hostname, computed at write time
    pub hostname: String,
    pub role: Role,
    /// Which backend produced the output, e.g. "ollama:llama3.2"
    pub model: String,
    pub raw_output: String,
    pub processed_output: Option<String>,
}

impl LedgerEntry {
    /// Build an entry stamped with the current time and hostname
    pub fn now(
        role: Role,
        model: impl Into<String>,
        raw_output: impl Into<String>,
        processed_output: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            hostname: hostname(),
            role,
            model: model.into(),
            raw_output: raw_output.into(),
            processed_output,
        }
    }
}

/// Append-only writer bound to one ledger file
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Create a writer for the given path, expanding a leading `~`
    pub fn new(path: &Path) -> Self {
        Self {
            path: crate::config::expand_tilde(path),
        }
    }

    /// The resolved ledger path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file (and parent directory) if absent
    pub fn append(&self, entry: &LedgerEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        // One write_all per record: O_APPEND keeps concurrent writers from
        // interleaving
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    fn read_entries(path: &Path) -> Vec<serde_json::Value> {
        let file = std::fs::File::open(path).unwrap();
        std::io::BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = Ledger::new(&path);

        ledger
            .append(&LedgerEntry::now(
                Role::User,
                "wyoming:127.0.0.1:10300",
                "hello world",
                None,
            ))
            .unwrap();
        ledger
            .append(&LedgerEntry::now(
                Role::Assistant,
                "ollama:llama3.2",
                "hello world",
                Some("Hello, world!".to_string()),
            ))
            .unwrap();

        let entries = read_entries(&path);
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first["role"], "user");
        assert_eq!(first["model"], "wyoming:127.0.0.1:10300");
        assert_eq!(first["raw_output"], "hello world");
        assert!(first["processed_output"].is_null());
        assert!(first["timestamp"].is_string());
        assert!(first["hostname"].is_string());

        let second = &entries[1];
        assert_eq!(second["role"], "assistant");
        assert_eq!(second["model"], "ollama:llama3.2");
        assert_eq!(second["raw_output"], "hello world");
        assert_eq!(second["processed_output"], "Hello, world!");
        assert!(second["timestamp"].is_string());
        assert!(second["hostname"].is_string());
    }

    #[test]
    fn test_processed_output_does_not_overwrite_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = Ledger::new(&path);

        ledger
            .append(&LedgerEntry::now(
                Role::Assistant,
                "openai:gpt-4o-mini",
                "hello world",
                Some("Hello, world!".to_string()),
            ))
            .unwrap();

        let entries = read_entries(&path);
        assert_eq!(entries[0]["raw_output"], "hello world");
        assert_eq!(entries[0]["processed_output"], "Hello, world!");
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");
        let ledger = Ledger::new(&path);

        ledger
            .append(&LedgerEntry::now(Role::User, "m", "text", None))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip_through_struct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = Ledger::new(&path);

        let entry = LedgerEntry::now(Role::User, "wyoming:localhost:10300", "raw text", None);
        ledger.append(&entry).unwrap();

        let line = std::fs::read_to_string(&path).unwrap();
        let parsed: LedgerEntry = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed.role, Role::User);
        assert_eq!(parsed.model, entry.model);
        assert_eq!(parsed.raw_output, entry.raw_output);
        assert_eq!(parsed.processed_output, None);
        assert_eq!(parsed.timestamp, entry.timestamp);
        assert_eq!(parsed.hostname, entry.hostname);
    }
}
