//! Error types for sotto
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the sotto application
#[derive(Error, Debug)]
pub enum SottoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription error: {0}")]
    Asr(#[from] AsrError),

    #[error("Synthesis error: {0}")]
    Tts(#[from] TtsError),

    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to audio capture and playback
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid audio device: {0}. List devices with: sotto list-devices")]
    InvalidDevice(String),

    #[error("Audio input buffer overflowed; captured audio was lost")]
    Overflow,

    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),

    #[error("No audio was captured. Check your microphone.")]
    EmptyRecording,
}

/// Errors related to speech-to-text sessions
#[derive(Error, Debug)]
pub enum AsrError {
    #[error("ASR backend unavailable: {0}")]
    Unavailable(String),

    #[error("ASR protocol error: {0}")]
    Protocol(String),

    #[error("ASR backend error: {0}")]
    Backend(String),

    #[error("ASR network error: {0}")]
    Network(String),
}

/// Errors related to text-to-speech sessions
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("TTS backend unavailable: {0}")]
    Unavailable(String),

    #[error("TTS protocol error: {0}")]
    Protocol(String),

    #[error("TTS backend error: {0}")]
    Backend(String),

    #[error("TTS network error: {0}")]
    Network(String),
}

/// Errors related to language-model post-processing
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM backend unavailable: {0}")]
    Unavailable(String),

    #[error("LLM backend error: {0}")]
    Backend(String),

    #[error("Unexpected LLM response: {0}")]
    InvalidResponse(String),
}

/// Errors related to result delivery
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("wl-copy not found in PATH. Install wl-clipboard via your package manager.")]
    WlCopyNotFound,

    #[error("wl-paste not found in PATH. Install wl-clipboard via your package manager.")]
    WlPasteNotFound,

    #[error("Clipboard command failed: {0}")]
    CommandFailed(String),
}

/// Errors related to daemon lifecycle management
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Agent '{agent}' is already running (PID: {pid})")]
    AlreadyRunning { agent: String, pid: u32 },

    #[error("Failed to write PID file: {0}")]
    WriteFailed(String),

    #[error("Failed to spawn detached worker: {0}")]
    SpawnFailed(String),

    #[error("Failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },

    #[error("Process {0} did not exit within the stop timeout")]
    StillRunning(u32),
}

/// Result type alias using SottoError
pub type Result<T> = std::result::Result<T, SottoError>;
