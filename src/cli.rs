// Command-line interface definitions for sotto
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "sotto")]
#[command(author, version, about = "Voice agents for the terminal")]
#[command(long_about = "
Sotto turns speech into text and back from the command line.

AGENTS:
  transcribe   Capture speech, transcribe it, deliver the transcript
  speak        Synthesize speech from text and play it
  voice-edit   Rewrite the clipboard with a spoken instruction

Each agent can run in the foreground (Ctrl+C finishes the recording) or as a
background worker via --detach, controlled with --stop and --status.

Local backends speak the Wyoming protocol (whisper/piper servers); cloud
backends use OpenAI-compatible APIs. Select them in
~/.config/sotto/config.toml or with provider flags.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only, no transcript printing)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture speech and deliver the transcript
    Transcribe {
        #[command(flatten)]
        daemon: DaemonFlags,

        /// Clean up the transcript with the configured LLM
        #[arg(long)]
        llm: bool,

        /// Extra instructions appended to the LLM prompt
        #[arg(long, value_name = "TEXT")]
        extra_instructions: Option<String>,

        /// Skip the clipboard even if enabled in config
        #[arg(long)]
        no_clipboard: bool,

        /// Save the captured audio as a WAV file
        #[arg(long, value_name = "FILE")]
        save_file: Option<std::path::PathBuf>,

        /// Append the result to a JSONL transcription ledger
        #[arg(long, value_name = "FILE")]
        ledger_file: Option<std::path::PathBuf>,

        /// Override the ASR provider
        #[arg(long, value_name = "PROVIDER")]
        asr_provider: Option<SpeechProviderArg>,

        /// Override the LLM provider
        #[arg(long, value_name = "PROVIDER")]
        llm_provider: Option<LlmProviderArg>,

        /// Input device index (see `sotto list-devices`)
        #[arg(long, value_name = "INDEX")]
        input_device: Option<usize>,
    },

    /// Synthesize speech from text and play it
    Speak {
        /// Text to speak; read from stdin when omitted
        text: Option<String>,

        #[command(flatten)]
        daemon: DaemonFlags,

        /// Override the TTS provider
        #[arg(long, value_name = "PROVIDER")]
        tts_provider: Option<SpeechProviderArg>,

        /// Voice name passed to the backend
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,

        /// Save the synthesized audio as a WAV file instead of playing it
        #[arg(long, value_name = "FILE")]
        save_file: Option<std::path::PathBuf>,

        /// Output device index (see `sotto list-devices`)
        #[arg(long, value_name = "INDEX")]
        output_device: Option<usize>,
    },

    /// Rewrite the clipboard with a spoken instruction
    VoiceEdit {
        #[command(flatten)]
        daemon: DaemonFlags,

        /// Extra instructions appended to the LLM prompt
        #[arg(long, value_name = "TEXT")]
        extra_instructions: Option<String>,

        /// Append the result to a JSONL transcription ledger
        #[arg(long, value_name = "FILE")]
        ledger_file: Option<std::path::PathBuf>,

        /// Override the ASR provider
        #[arg(long, value_name = "PROVIDER")]
        asr_provider: Option<SpeechProviderArg>,

        /// Override the LLM provider
        #[arg(long, value_name = "PROVIDER")]
        llm_provider: Option<LlmProviderArg>,

        /// Input device index (see `sotto list-devices`)
        #[arg(long, value_name = "INDEX")]
        input_device: Option<usize>,
    },

    /// List audio input/output devices
    ListDevices,

    /// Show the current configuration
    Config {
        /// Write the default config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

/// Background-worker control shared by all agents
#[derive(Args)]
pub struct DaemonFlags {
    /// Run detached in the background
    #[arg(long)]
    pub detach: bool,

    /// Stop the running agent
    #[arg(long)]
    pub stop: bool,

    /// Report whether the agent is running
    #[arg(long)]
    pub status: bool,

    /// Internal marker for the re-executed detached worker
    #[arg(long, hide = true)]
    pub detached_worker: bool,
}

/// Speech backend choices exposed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpeechProviderArg {
    /// Local Wyoming streaming server
    Wyoming,
    /// OpenAI-compatible HTTP endpoint
    Openai,
}

/// LLM backend choices exposed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmProviderArg {
    /// Local Ollama server
    Ollama,
    /// OpenAI-compatible HTTP endpoint
    Openai,
}
