use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::artifact::StageTag;

/// Fatal pipeline failures. Each variant is attributed to the stage that
/// produced it; none of these are retried within a job.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("audio input unreadable: {0}")]
    Input(String),
    #[error("transcription model failed: {0}")]
    Transcription(String),
    #[error("renderer failed: {0}")]
    Render(String),
    #[error("renderer did not finish within {0:?}")]
    RenderTimeout(Duration),
    #[error("a transcription job is already running")]
    Busy,
}

impl PipelineError {
    pub fn stage(&self) -> StageTag {
        match self {
            PipelineError::Input(_) => StageTag::Load,
            PipelineError::Transcription(_) => StageTag::Transcribe,
            PipelineError::Render(_) | PipelineError::RenderTimeout(_) => StageTag::Render,
            PipelineError::Busy => StageTag::Submit,
        }
    }

    pub fn input<T: Into<String>>(message: T) -> Self {
        Self::Input(message.into())
    }

    pub fn transcription<T: Into<String>>(message: T) -> Self {
        Self::Transcription(message.into())
    }

    pub fn render<T: Into<String>>(message: T) -> Self {
        Self::Render(message.into())
    }
}

/// A temp file that survived every deletion attempt. Housekeeping only:
/// reported and logged, never converted into a job failure.
#[derive(Clone, Debug, Error)]
#[error("could not remove {path:?} after {attempts} attempts: {reason}")]
pub struct DisposalError {
    pub path: PathBuf,
    pub attempts: u32,
    pub reason: String,
}
