//! Audio devices backed by external commands.
//!
//! Capture runs a recorder that writes raw 16-bit 16 kHz mono PCM to stdout.
//! Playback runs a player that reads one clip from stdin.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use callbook_core::config::ClientConfig;
use callbook_core::error::{CallbookError, Result};
use callbook_media::stt::{pcm_from_le_bytes, pcm_to_wav};

const SAMPLE_RATE: u32 = 16_000;

/// Records one utterance. Returns a WAV clip once `stop` fires or the
/// device ends on its own. Failures are `CallbookError::CaptureDevice`.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn record(&self, stop: CancellationToken) -> Result<Vec<u8>>;
}

/// Plays one clip to completion, or until `stop` fires.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, audio: Vec<u8>, looped: bool, stop: CancellationToken) -> Result<()>;
}

fn split_command(command: &[String]) -> Option<(&str, &[String])> {
    command
        .split_first()
        .map(|(program, args)| (program.as_str(), args))
}

pub struct CommandCapture {
    command: Vec<String>,
}

impl CommandCapture {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.capture_command.clone())
    }

    fn spawn(&self) -> Result<Child> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| CallbookError::CaptureDevice("no capture command configured".into()))?;
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CallbookError::CaptureDevice(format!("failed to start {program}: {e}")))
    }
}

#[async_trait]
impl CaptureDevice for CommandCapture {
    async fn record(&self, stop: CancellationToken) -> Result<Vec<u8>> {
        let mut child = self.spawn()?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CallbookError::CaptureDevice("recorder has no stdout".into()))?;

        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                read = stdout.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => raw.extend_from_slice(&buf[..n]),
                    Err(e) => {
                        return Err(CallbookError::CaptureDevice(format!("reading recorder output: {e}")));
                    }
                },
            }
        }
        let _ = child.start_kill();
        let _ = child.wait().await;

        // Silence is not a device failure: an empty clip transcribes to nothing.
        let pcm = pcm_from_le_bytes(&raw);
        debug!(samples = pcm.len(), "Capture finished");
        Ok(pcm_to_wav(&pcm, SAMPLE_RATE, 1, 16))
    }
}

pub struct CommandPlayer {
    command: Vec<String>,
}

impl CommandPlayer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.player_command.clone())
    }

    async fn play_once(&self, audio: Arc<[u8]>, stop: &CancellationToken) -> Result<()> {
        let (program, args) = split_command(&self.command)
            .ok_or_else(|| CallbookError::Config("no player command configured".into()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CallbookError::Other(anyhow!("failed to start {program}: {e}")))?;

        // The player may exit before reading everything; write errors don't matter.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let _ = stdin.write_all(&audio).await;
            })
        });

        let finished = tokio::select! {
            _ = stop.cancelled() => None,
            status = child.wait() => Some(status),
        };
        if let Some(writer) = writer {
            writer.abort();
        }

        match finished {
            None => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(())
            }
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(CallbookError::Other(anyhow!("{program} exited with {status}"))),
            Some(Err(e)) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, audio: Vec<u8>, looped: bool, stop: CancellationToken) -> Result<()> {
        let audio: Arc<[u8]> = audio.into();
        loop {
            self.play_once(audio.clone(), &stop).await?;
            if !looped || stop.is_cancelled() {
                return Ok(());
            }
        }
    }
}
