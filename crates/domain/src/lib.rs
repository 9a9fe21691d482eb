pub mod artifact;
pub mod error;
pub mod event;
pub mod job;

pub use crate::artifact::{ArtifactPurpose, StageTag};
pub use crate::error::{DisposalError, PipelineError};
pub use crate::event::PipelineEvent;
pub use crate::job::{Device, Job, JobId, JobState};
