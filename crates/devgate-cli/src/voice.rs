use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use console::style;
use devgate::providers::transcription::Transcriber;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

const RECORDING_NAME: &str = "recording.wav";

/// Voice input: record from the default microphone with sox, then transcribe
pub struct VoiceInput {
    transcriber: Arc<dyn Transcriber>,
}

impl VoiceInput {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }

    /// Record until the user presses Enter and return the audio
    pub async fn record(&self) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(RECORDING_NAME);
        record_until_enter(&path).await?;
        read_recording(&path).await
    }

    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let text = self.transcriber.transcribe(audio, RECORDING_NAME).await?;
        tracing::debug!(chars = text.len(), "transcribed voice input");
        Ok(text)
    }
}

async fn record_until_enter(path: &Path) -> Result<()> {
    let mut child = Command::new("rec")
        .args(["-q", "-r", "16000", "-c", "1"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to start `rec`; install sox to use voice input")?;

    println!("{}", style("Recording... press Enter to stop.").cyan());
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;

    interrupt(&mut child)?;
    // rec reports the interrupt as a failure exit, so only the recording itself is checked
    let status = child.wait().await?;
    tracing::debug!(%status, "recorder stopped");
    Ok(())
}

/// Ask the recorder to stop so it finishes writing the file
#[cfg(unix)]
fn interrupt(child: &mut Child) -> Result<()> {
    let Some(pid) = child.id() else {
        bail!("The recorder exited before recording anything");
    };
    // SAFETY: the pid belongs to a child we spawned and have not reaped yet
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to stop the recorder");
    }
    Ok(())
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> Result<()> {
    child.start_kill().context("Failed to stop the recorder")
}

async fn read_recording(path: &Path) -> Result<Vec<u8>> {
    let audio = tokio::fs::read(path)
        .await
        .with_context(|| format!("No recording found at {}", path.display()))?;
    if audio.is_empty() {
        bail!("The recording is empty");
    }
    Ok(audio)
}
