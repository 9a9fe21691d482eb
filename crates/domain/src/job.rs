use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque job identifier, unique per submission within the process.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    pub fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Compute device handed to the transcription model.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for Device {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            other => Err(format!("unknown device {other:?}, expected cpu or cuda")),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Loading,
    Transcribing,
    Rendering,
    Completed,
    Failed,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Loading => 1,
            JobState::Transcribing => 2,
            JobState::Rendering => 3,
            JobState::Completed => 4,
            JobState::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether `next` is a legal successor of `self`. The happy path is
    /// strictly sequential; `Failed` is reachable from any non-terminal
    /// state; no state is ever revisited.
    pub fn precedes(self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobState::Failed => true,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Loading => "loading",
            JobState::Transcribing => "transcribing",
            JobState::Rendering => "rendering",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One transcription request and its progress record. The audio path is
/// owned by the caller and only ever read; artifact paths point into the
/// job's temp-file ledger once the producing stage succeeds.
#[derive(Clone, Debug)]
pub struct Job {
    id: JobId,
    audio_path: PathBuf,
    device: Device,
    state: JobState,
    midi_artifact: Option<PathBuf>,
    document_artifact: Option<PathBuf>,
    error: Option<PipelineError>,
}

impl Job {
    pub fn new(audio_path: impl Into<PathBuf>, device: Device) -> Self {
        Self {
            id: JobId::next(),
            audio_path: audio_path.into(),
            device,
            state: JobState::Pending,
            midi_artifact: None,
            document_artifact: None,
            error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn midi_artifact(&self) -> Option<&Path> {
        self.midi_artifact.as_deref()
    }

    pub fn document_artifact(&self) -> Option<&Path> {
        self.document_artifact.as_deref()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    /// Advance to the next state. The orchestrator is the only caller and
    /// only ever requests legal transitions; an illegal one is a logic bug.
    pub fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.precedes(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    pub fn fail(&mut self, error: PipelineError) {
        debug_assert!(!self.state.is_terminal(), "job already terminal");
        self.state = JobState::Failed;
        self.error = Some(error);
    }

    pub fn set_midi_artifact(&mut self, path: PathBuf) {
        self.midi_artifact = Some(path);
    }

    /// A document artifact can only exist downstream of a MIDI artifact.
    pub fn set_document_artifact(&mut self, path: PathBuf) {
        debug_assert!(self.midi_artifact.is_some(), "document before midi");
        self.document_artifact = Some(path);
    }
}
