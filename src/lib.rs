//! Sotto: voice agents for the terminal
//!
//! This library provides the core functionality for:
//! - Capturing and playing audio via cpal (PipeWire, PulseAudio, ALSA)
//! - Streaming speech recognition and synthesis over the Wyoming protocol,
//!   with OpenAI-compatible HTTP backends as the cloud alternative
//! - Cooperative cancellation of all long-running loops via a stop latch
//!   wired to SIGINT/SIGTERM
//! - Single-instance daemon lifecycle per agent (PID records, --stop/--status)
//! - An append-only JSONL ledger of transcription events
//!
//! # Architecture
//!
//! ```text
//!        ┌────────────┐   PCM chunks    ┌──────────────────┐
//!        │   Audio    │ ──────────────▶ │  ASR session     │
//!        │  capture   │                 │  (Wyoming/TCP)   │
//!        └────────────┘                 └──────────────────┘
//!              ▲                                │ transcript events
//!              │ StopSignal                     ▼
//!        ┌────────────┐                 ┌──────────────────┐
//!        │  Signals   │                 │   Agent loop     │
//!        │ SIGINT/TERM│ ──────────────▶ │ transcribe/speak │
//!        └────────────┘                 │   /voice-edit    │
//!                                       └──────────────────┘
//!                                         │        │      │
//!                              LLM rewrite│  ledger│      │clipboard/
//!                                         ▼        ▼      ▼  playback
//!                                   ┌────────┐ ┌───────┐ ┌────────┐
//!                                   │  llm   │ │ledger │ │ output │
//!                                   └────────┘ └───────┘ └────────┘
//! ```
//!
//! The process module enforces one live instance per agent name through PID
//! records in the runtime directory; `--detach` re-executes the binary as a
//! background worker controlled with `--stop` and `--status`.

pub mod agents;
pub mod asr;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod llm;
pub mod output;
pub mod process;
pub mod signals;
pub mod tts;
pub mod wyoming;

pub use cli::{Cli, Commands, DaemonFlags};
pub use config::Config;
pub use error::{Result, SottoError};
pub use signals::StopSignal;
