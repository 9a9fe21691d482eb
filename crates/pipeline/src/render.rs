use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use sonoscore_domain::PipelineError;

/// Invokes the external notation renderer as a subprocess:
/// `<executable> <midi-path> -o <output-path>`.
///
/// Exit code alone is not trusted: the tool has been observed to exit
/// cleanly while producing nothing, so success additionally requires a
/// non-empty output file. A failed invocation is deterministic for a given
/// MIDI input and is never retried.
pub struct RendererAdapter {
    executable: PathBuf,
    timeout: Duration,
}

impl RendererAdapter {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }

    pub async fn render(&self, midi_path: &Path, output_path: &Path) -> Result<(), PipelineError> {
        info!(
            executable = ?self.executable,
            input = ?midi_path,
            output = ?output_path,
            "invoking renderer"
        );
        let child = Command::new(&self.executable)
            .arg(midi_path)
            .arg("-o")
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the wait future on timeout kills the process
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                PipelineError::render(format!("failed to launch {:?}: {err}", self.executable))
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::RenderTimeout(self.timeout))?
            .map_err(|err| PipelineError::render(format!("renderer i/o error: {err}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("renderer stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("renderer stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            return Err(PipelineError::render(format!(
                "renderer exited with {}: {}",
                output.status,
                tail(&stderr)
            )));
        }
        match fs::metadata(output_path) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(PipelineError::render(
                "renderer exited successfully but wrote an empty output file",
            )),
            Err(_) => Err(PipelineError::render(
                "renderer exited successfully but produced no output file",
            )),
        }
    }
}

/// Last few lines of diagnostic output, enough for an error message.
fn tail(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(no stderr)".to_string();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    lines[lines.len().saturating_sub(3)..].join(" | ")
}
