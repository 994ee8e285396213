//! Configuration loading and types for sotto
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/sotto/config.toml)
//! 3. Environment variables (SOTTO_*)
//! 4. CLI arguments (highest priority)

use crate::audio::DeviceSelection;
use crate::error::SottoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Sotto Configuration
#
# Location: ~/.config/sotto/config.toml
# All settings can be overridden via CLI flags

[general]
# Log level: "error", "warn", "info", "debug", "trace"
log_level = "info"

# Optional log file (logs go to stderr when unset)
# log_file = "~/.local/state/sotto/sotto.log"

# Copy transcripts to the clipboard (requires wl-copy)
clipboard = true

# Append each transcription to a JSONL ledger file
# ledger_file = "~/.local/share/sotto/ledger.jsonl"

[providers]
# Speech recognition: "wyoming" (local streaming server) or "openai"
asr = "wyoming"

# Speech synthesis: "wyoming" or "openai"
tts = "wyoming"

# Transcript post-processing: "ollama" or "openai"
llm = "ollama"

[asr.wyoming]
host = "127.0.0.1"
port = 10300

[asr.openai]
model = "whisper-1"
# api_key falls back to the OPENAI_API_KEY environment variable
# base_url = "https://api.openai.com"

[tts.wyoming]
host = "127.0.0.1"
port = 10200
# voice = "en_US-lessac-medium"

[tts.openai]
model = "tts-1"
voice = "alloy"

[llm.ollama]
model = "llama3.2"
host = "http://127.0.0.1:11434"

[llm.openai]
model = "gpt-4o-mini"

[audio.input]
# Device index from `sotto list-devices`, or "default"
device = "default"

# Sample rate in Hz (most ASR backends expect 16000)
sample_rate = 16000
channels = 1

# Frames per chunk pushed to the ASR session
chunk_frames = 1024

# What to do when the capture buffer overruns: "drop" the chunk and keep
# going, or "abort" the session
overflow = "drop"

[audio.output]
device = "default"
enabled = true
"#;

/// Speech-recognition provider selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AsrProvider {
    /// Local Wyoming streaming server
    #[default]
    Wyoming,
    /// OpenAI-compatible HTTP endpoint
    Openai,
}

/// Speech-synthesis provider selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    Wyoming,
    Openai,
}

/// Language-model provider selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    Openai,
}

/// Policy for input buffer overruns
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Log the overrun and continue with a gap in the audio
    #[default]
    Drop,
    /// Fail the capture stream on the next read
    Abort,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub providers: ProviderConfig,

    #[serde(default)]
    pub asr: AsrConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

/// General behavior settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file; logs go to stderr when unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Suppress transcript printing (errors only)
    #[serde(default)]
    pub quiet: bool,

    /// Copy transcripts to the clipboard
    #[serde(default = "default_true")]
    pub clipboard: bool,

    /// Optional WAV file for captured or synthesized audio
    #[serde(default)]
    pub save_file: Option<PathBuf>,

    /// Optional JSONL transcription ledger
    #[serde(default)]
    pub ledger_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            quiet: false,
            clipboard: true,
            save_file: None,
            ledger_file: None,
        }
    }
}

/// Provider selection per service
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub asr: AsrProvider,

    #[serde(default)]
    pub tts: TtsProvider,

    #[serde(default)]
    pub llm: LlmProvider,
}

/// Speech-recognition backend settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AsrConfig {
    #[serde(default)]
    pub wyoming: WyomingAsrConfig,

    #[serde(default)]
    pub openai: OpenaiAsrConfig,
}

/// Wyoming ASR server connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WyomingAsrConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_asr_port")]
    pub port: u16,
}

impl Default for WyomingAsrConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_asr_port(),
        }
    }
}

/// OpenAI-compatible ASR settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenaiAsrConfig {
    #[serde(default = "default_openai_asr_model")]
    pub model: String,

    /// API key; falls back to the OPENAI_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for OpenaiAsrConfig {
    fn default() -> Self {
        Self {
            model: default_openai_asr_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Speech-synthesis backend settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub wyoming: WyomingTtsConfig,

    #[serde(default)]
    pub openai: OpenaiTtsConfig,
}

/// Wyoming TTS server connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WyomingTtsConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_tts_port")]
    pub port: u16,

    /// Voice name passed through to the server
    #[serde(default)]
    pub voice: Option<String>,
}

impl Default for WyomingTtsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_tts_port(),
            voice: None,
        }
    }
}

/// OpenAI-compatible TTS settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenaiTtsConfig {
    #[serde(default = "default_openai_tts_model")]
    pub model: String,

    #[serde(default = "default_openai_tts_voice")]
    pub voice: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for OpenaiTtsConfig {
    fn default() -> Self {
        Self {
            model: default_openai_tts_model(),
            voice: default_openai_tts_voice(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Language-model backend settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub openai: OpenaiLlmConfig,
}

/// Ollama connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_model")]
    pub model: String,

    #[serde(default = "default_ollama_host")]
    pub host: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: default_ollama_model(),
            host: default_ollama_host(),
        }
    }
}

/// OpenAI-compatible chat settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenaiLlmConfig {
    #[serde(default = "default_openai_llm_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for OpenaiLlmConfig {
    fn default() -> Self {
        Self {
            model: default_openai_llm_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Audio device settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub input: AudioInputConfig,

    #[serde(default)]
    pub output: AudioOutputConfig,
}

/// Audio capture settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioInputConfig {
    /// Device index from `sotto list-devices`, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz (most ASR backends expect 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Frames per chunk pushed to the ASR session
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: usize,

    /// What to do when the capture buffer overruns
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for AudioInputConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            chunk_frames: default_chunk_frames(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl AudioInputConfig {
    /// Parse the device field into a selection
    pub fn selection(&self) -> Result<DeviceSelection, SottoError> {
        parse_device(&self.device)
    }
}

/// Audio playback settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioOutputConfig {
    /// Device index from `sotto list-devices`, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Enable playback of synthesized speech
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            enabled: true,
        }
    }
}

impl AudioOutputConfig {
    /// Parse the device field into a selection
    pub fn selection(&self) -> Result<DeviceSelection, SottoError> {
        parse_device(&self.device)
    }
}

fn parse_device(device: &str) -> Result<DeviceSelection, SottoError> {
    if device.eq_ignore_ascii_case("default") {
        return Ok(DeviceSelection::Default);
    }
    device
        .parse::<usize>()
        .map(DeviceSelection::Index)
        .map_err(|_| {
            SottoError::Config(format!(
                "Invalid audio device {:?}: expected \"default\" or a device index",
                device
            ))
        })
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_asr_port() -> u16 {
    10300
}

fn default_tts_port() -> u16 {
    10200
}

fn default_openai_asr_model() -> String {
    "whisper-1".to_string()
}

fn default_openai_tts_model() -> String {
    "tts-1".to_string()
}

fn default_openai_tts_voice() -> String {
    "alloy".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_ollama_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_openai_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_chunk_frames() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "sotto")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "sotto")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the runtime directory for ephemeral files (PID records)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("sotto")
    }
}

/// Expand a leading `~` to the invoking user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, SottoError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| SottoError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| SottoError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(level) = std::env::var("SOTTO_LOG_LEVEL") {
        config.general.log_level = level;
    }
    if let Ok(provider) = std::env::var("SOTTO_ASR_PROVIDER") {
        config.providers.asr = parse_provider(&provider, "SOTTO_ASR_PROVIDER")?;
    }
    if let Ok(provider) = std::env::var("SOTTO_TTS_PROVIDER") {
        config.providers.tts = parse_provider(&provider, "SOTTO_TTS_PROVIDER")?;
    }
    if let Ok(provider) = std::env::var("SOTTO_LLM_PROVIDER") {
        config.providers.llm = parse_provider(&provider, "SOTTO_LLM_PROVIDER")?;
    }
    if let Ok(host) = std::env::var("SOTTO_ASR_HOST") {
        config.asr.wyoming.host = host;
    }
    if let Ok(host) = std::env::var("SOTTO_TTS_HOST") {
        config.tts.wyoming.host = host;
    }

    Ok(config)
}

fn parse_provider<P: serde::de::DeserializeOwned>(
    value: &str,
    var: &str,
) -> Result<P, SottoError> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
        .map_err(|_| SottoError::Config(format!("Invalid provider {:?} in {}", value, var)))
}

/// Save configuration to file
pub fn save_default_config(path: &Path) -> Result<(), SottoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SottoError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| SottoError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}
