//! Transcription pipeline: decode audio, run the transcription model,
//! materialize a MIDI artifact, invoke the external notation renderer, and
//! hand the resulting document back to the caller.
//!
//! Every temporary file produced along the way is owned by a per-job
//! [`ledger::TempFileLedger`]; stages create artifacts through it and never
//! delete them themselves.

pub mod config;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod render;
pub mod retry;
pub mod runner;
pub mod transcribe;

pub use config::PipelineConfig;
pub use ledger::{TempArtifact, TempFileLedger};
pub use model::{EnergyOnsetModel, TranscriptionModel};
pub use orchestrator::PipelineOrchestrator;
pub use render::RendererAdapter;
pub use retry::RetryPolicy;
pub use runner::{JobHandle, JobRequest, JobRunner};
pub use transcribe::TranscriptionStage;
