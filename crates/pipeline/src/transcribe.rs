use std::fs;
use std::sync::Arc;

use tracing::info;

use sonoscore_audio::DecodedAudio;
use sonoscore_domain::{ArtifactPurpose, Device, PipelineError, StageTag};

use crate::ledger::{TempArtifact, TempFileLedger};
use crate::model::TranscriptionModel;

/// Wraps the transcription model call: audio in, one MIDI artifact out,
/// registered with the job's ledger. The stage never deletes the artifact.
#[derive(Clone)]
pub struct TranscriptionStage {
    model: Arc<dyn TranscriptionModel>,
}

impl TranscriptionStage {
    pub fn new(model: Arc<dyn TranscriptionModel>) -> Self {
        Self { model }
    }

    /// Model failures are fatal and never retried; they are not transient.
    pub fn run(
        &self,
        audio: &DecodedAudio,
        device: Device,
        ledger: &TempFileLedger,
    ) -> Result<TempArtifact, PipelineError> {
        info!(
            %device,
            sample_rate = audio.sample_rate,
            duration_secs = audio.duration_secs(),
            "transcribing audio"
        );
        let midi = self
            .model
            .transcribe(&audio.samples, audio.sample_rate, device)
            .map_err(|err| PipelineError::transcription(format!("{err:#}")))?;
        if midi.is_empty() {
            return Err(PipelineError::transcription("model produced no MIDI data"));
        }

        let artifact = ledger
            .create(ArtifactPurpose::Midi, StageTag::Transcribe)
            .map_err(|err| {
                PipelineError::transcription(format!("allocate midi artifact: {err}"))
            })?;
        fs::write(&artifact.path, &midi).map_err(|err| {
            PipelineError::transcription(format!("write midi artifact: {err}"))
        })?;
        info!(path = ?artifact.path, bytes = midi.len(), "midi artifact written");
        Ok(artifact)
    }
}
