use std::path::PathBuf;

use crate::artifact::ArtifactPurpose;
use crate::error::PipelineError;
use crate::job::{JobId, JobState};

/// Everything a job reports back over its result channel.
///
/// Progress events (`State`, `ArtifactProduced`) may occur several times;
/// exactly one terminal event (`Completed` or `Failed`) is emitted per job,
/// and `Finished` always follows it regardless of outcome so the caller can
/// release whatever is waiting on the job.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    State {
        id: JobId,
        state: JobState,
    },
    ArtifactProduced {
        id: JobId,
        purpose: ArtifactPurpose,
        path: PathBuf,
    },
    Completed {
        id: JobId,
        midi: PathBuf,
        document: PathBuf,
    },
    Failed {
        id: JobId,
        error: PipelineError,
    },
    Finished {
        id: JobId,
    },
}

impl PipelineEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            PipelineEvent::State { id, .. }
            | PipelineEvent::ArtifactProduced { id, .. }
            | PipelineEvent::Completed { id, .. }
            | PipelineEvent::Failed { id, .. }
            | PipelineEvent::Finished { id } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Completed { .. } | PipelineEvent::Failed { .. }
        )
    }
}
