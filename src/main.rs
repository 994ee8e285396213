//! Sotto CLI entry point
//!
//! Run `sotto transcribe` to dictate, `sotto speak <text>` to synthesize,
//! or `sotto voice-edit` to rewrite the clipboard by voice. Add `--detach`
//! to run an agent in the background and `--stop`/`--status` to control it.

use clap::Parser;
use sotto::agents::{self, transcribe::TranscribeOptions, voice_edit::VoiceEditOptions};
use sotto::cli::{Cli, Commands, LlmProviderArg, SpeechProviderArg};
use sotto::config::{self, AsrProvider, Config, LlmProvider, TtsProvider};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration, then let CLI flags win
    let mut config = config::load_config(cli.config.as_deref())?;
    if cli.quiet {
        config.general.quiet = true;
    }

    let log_level = if config.general.quiet && cli.verbose == 0 {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    init_logging(&log_level, config.general.log_file.as_deref())?;

    match cli.command {
        Commands::Transcribe {
            daemon,
            llm,
            extra_instructions,
            no_clipboard,
            save_file,
            ledger_file,
            asr_provider,
            llm_provider,
            input_device,
        } => {
            if no_clipboard {
                config.general.clipboard = false;
            }
            if let Some(path) = save_file {
                config.general.save_file = Some(path);
            }
            if let Some(path) = ledger_file {
                config.general.ledger_file = Some(path);
            }
            if let Some(provider) = asr_provider {
                config.providers.asr = to_asr_provider(provider);
            }
            if let Some(provider) = llm_provider {
                config.providers.llm = to_llm_provider(provider);
            }
            if let Some(index) = input_device {
                config.audio.input.device = index.to_string();
            }

            let opts = TranscribeOptions {
                llm_enabled: llm,
                extra_instructions,
            };
            agents::dispatch("transcribe", &daemon, |stop| {
                agents::transcribe::run(&config, &opts, stop)
            })
            .await?;
        }

        Commands::Speak {
            text,
            daemon,
            tts_provider,
            voice,
            save_file,
            output_device,
        } => {
            if let Some(provider) = tts_provider {
                config.providers.tts = to_tts_provider(provider);
            }
            if let Some(voice) = voice {
                config.tts.wyoming.voice = Some(voice.clone());
                config.tts.openai.voice = voice;
            }
            if let Some(path) = save_file {
                config.general.save_file = Some(path);
            }
            if let Some(index) = output_device {
                config.audio.output.device = index.to_string();
            }

            agents::dispatch("speak", &daemon, |stop| {
                agents::speak::run(&config, text, stop)
            })
            .await?;
        }

        Commands::VoiceEdit {
            daemon,
            extra_instructions,
            ledger_file,
            asr_provider,
            llm_provider,
            input_device,
        } => {
            if let Some(path) = ledger_file {
                config.general.ledger_file = Some(path);
            }
            if let Some(provider) = asr_provider {
                config.providers.asr = to_asr_provider(provider);
            }
            if let Some(provider) = llm_provider {
                config.providers.llm = to_llm_provider(provider);
            }
            if let Some(index) = input_device {
                config.audio.input.device = index.to_string();
            }

            let opts = VoiceEditOptions { extra_instructions };
            agents::dispatch("voice-edit", &daemon, |stop| {
                agents::voice_edit::run(&config, &opts, stop)
            })
            .await?;
        }

        Commands::ListDevices => {
            list_devices()?;
        }

        Commands::Config { init } => {
            show_config(&config, init)?;
        }
    }

    Ok(())
}

/// Initialize tracing to stderr, or to the configured log file
fn init_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sotto={},warn", level)));

    match log_file {
        Some(path) => {
            let path = config::expand_tilde(path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

/// Print the device table
fn list_devices() -> anyhow::Result<()> {
    let devices = sotto::audio::list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    println!("{:<5} {:<6} {:<7} {:<10} NAME", "INDEX", "IN", "OUT", "RATE");
    for device in devices {
        println!(
            "{:<5} {:<6} {:<7} {:<10} {}",
            device.index,
            device.max_input_channels,
            device.max_output_channels,
            format!("{:.0} Hz", device.default_sample_rate),
            device.name
        );
    }
    Ok(())
}

/// Show the merged configuration, optionally writing the default file first
fn show_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        match Config::default_path() {
            Some(path) if !path.exists() => {
                config::save_default_config(&path)?;
                println!("Wrote default config to {:?}", path);
            }
            Some(path) => println!("Config file already exists: {:?}", path),
            None => println!("Could not determine the config directory"),
        }
        return Ok(());
    }

    print!("{}", toml::to_string_pretty(config)?);
    println!();
    println!(
        "# Config file: {:?}",
        Config::default_path().unwrap_or_default()
    );
    println!("# Runtime dir: {:?}", Config::runtime_dir());
    Ok(())
}

fn to_asr_provider(arg: SpeechProviderArg) -> AsrProvider {
    match arg {
        SpeechProviderArg::Wyoming => AsrProvider::Wyoming,
        SpeechProviderArg::Openai => AsrProvider::Openai,
    }
}

fn to_tts_provider(arg: SpeechProviderArg) -> TtsProvider {
    match arg {
        SpeechProviderArg::Wyoming => TtsProvider::Wyoming,
        SpeechProviderArg::Openai => TtsProvider::Openai,
    }
}

fn to_llm_provider(arg: LlmProviderArg) -> LlmProvider {
    match arg {
        LlmProviderArg::Ollama => LlmProvider::Ollama,
        LlmProviderArg::Openai => LlmProvider::Openai,
    }
}
