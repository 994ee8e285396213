//! Top-level agent loops and shared daemon control
//!
//! Every agent runs through [`dispatch`], which handles the lifecycle flags
//! (--status, --stop, --detach) and otherwise runs the agent in the
//! foreground while holding its PID record. Lifecycle outcomes like "not
//! running" or "already running" are reported to the user and exit cleanly;
//! they are never errors.

pub mod speak;
pub mod transcribe;
pub mod voice_edit;

use crate::audio::AudioFormat;
use crate::cli::DaemonFlags;
use crate::error::{ProcessError, Result, SottoError};
use crate::process::{spawn_detached, AgentStatus, PidFile, StopOutcome};
use crate::signals::{install_handlers, StopSignal};
use std::future::Future;
use std::path::Path;

/// Run one agent invocation under lifecycle control.
///
/// The `run` closure receives the invocation's stop signal, already wired to
/// SIGINT/SIGTERM. The PID record is held for exactly as long as the closure
/// runs, on every exit path.
pub async fn dispatch<F, Fut>(agent: &str, flags: &DaemonFlags, run: F) -> Result<()>
where
    F: FnOnce(StopSignal) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let pid_file = PidFile::for_agent(agent);

    if flags.status {
        match pid_file.status() {
            AgentStatus::Running(pid) => println!("{} is running (PID: {})", agent, pid),
            AgentStatus::NotRunning => println!("{} is not running", agent),
        }
        return Ok(());
    }

    if flags.stop {
        match pid_file.stop().await? {
            StopOutcome::Stopped(pid) => println!("{} stopped (PID: {})", agent, pid),
            StopOutcome::NotRunning => println!("No {} agent is running", agent),
        }
        return Ok(());
    }

    if flags.detach && !flags.detached_worker {
        // Refuse before spawning so the user sees the conflict immediately;
        // the worker's own acquire below closes the startup race.
        if let AgentStatus::Running(pid) = pid_file.status() {
            println!("{} is already running (PID: {})", agent, pid);
            return Ok(());
        }

        let mut args: Vec<String> = std::env::args().skip(1).collect();
        args.push("--detached-worker".to_string());
        let pid = spawn_detached(&args)?;
        println!("{} started (PID: {})", agent, pid);
        return Ok(());
    }

    // Foreground run, or the detached worker itself
    let guard = match pid_file.acquire() {
        Ok(guard) => guard,
        Err(ProcessError::AlreadyRunning { agent, pid }) => {
            println!("{} is already running (PID: {})", agent, pid);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let stop = StopSignal::new();
    install_handlers(&stop)?;

    let result = run(stop).await;
    drop(guard);
    result
}

/// Write raw i16-LE PCM to a WAV file, expanding a leading `~`
pub(crate) fn save_wav(path: &Path, format: AudioFormat, pcm: &[u8]) -> Result<()> {
    let path = crate::config::expand_tilde(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)
        .map_err(|e| SottoError::Config(format!("Failed to create {:?}: {}", path, e)))?;
    for bytes in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))
            .map_err(|e| SottoError::Config(format!("Failed to write {:?}: {}", path, e)))?;
    }
    writer
        .finalize()
        .map_err(|e| SottoError::Config(format!("Failed to finalize {:?}: {}", path, e)))?;

    tracing::info!("Saved {} bytes of audio to {:?}", pcm.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };
        let pcm: Vec<u8> = [100i16, -100, 0, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        save_wav(&path, format, &pcm).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 0, i16::MAX]);
    }
}
