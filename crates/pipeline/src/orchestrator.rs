use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task;
use tracing::{info, warn};

use sonoscore_audio::AudioDecoder;
use sonoscore_domain::{ArtifactPurpose, Job, JobState, PipelineError, PipelineEvent, StageTag};

use crate::ledger::TempFileLedger;
use crate::render::RendererAdapter;
use crate::transcribe::TranscriptionStage;

/// Owns one job's state machine and drives
/// `Pending → Loading → Transcribing → Rendering → Completed`, with
/// `Failed` reachable from any non-terminal state. Exactly one terminal
/// event is emitted per job, and `Finished` always follows it.
pub struct PipelineOrchestrator {
    stage: TranscriptionStage,
    renderer: RendererAdapter,
    ledger: Arc<TempFileLedger>,
    events: UnboundedSender<PipelineEvent>,
}

impl PipelineOrchestrator {
    pub fn new(
        stage: TranscriptionStage,
        renderer: RendererAdapter,
        ledger: Arc<TempFileLedger>,
        events: UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            stage,
            renderer,
            ledger,
            events,
        }
    }

    pub async fn run(self, mut job: Job) {
        let id = job.id();
        info!(%id, audio = ?job.audio_path(), "starting transcription job");
        self.emit(PipelineEvent::State {
            id,
            state: job.state(),
        });

        match self.execute(&mut job).await {
            Ok(()) => {
                if let (Some(midi), Some(document)) =
                    (job.midi_artifact(), job.document_artifact())
                {
                    info!(%id, midi = ?midi, document = ?document, "job completed");
                    self.emit(PipelineEvent::Completed {
                        id,
                        midi: midi.to_path_buf(),
                        document: document.to_path_buf(),
                    });
                }
            }
            Err(error) => {
                warn!(%id, stage = %error.stage(), %error, "job failed");
                job.fail(error.clone());
                self.emit(PipelineEvent::State {
                    id,
                    state: JobState::Failed,
                });
                self.emit(PipelineEvent::Failed { id, error });
                // A failed job is never retried automatically; tear the
                // ledger down right away. Failures here are housekeeping.
                let ledger = self.ledger.clone();
                let failures = task::spawn_blocking(move || ledger.dispose_all())
                    .await
                    .unwrap_or_default();
                for failure in &failures {
                    warn!(%id, %failure, "disposal incomplete");
                }
            }
        }
        self.emit(PipelineEvent::Finished { id });
    }

    async fn execute(&self, job: &mut Job) -> Result<(), PipelineError> {
        self.transition(job, JobState::Loading);
        let audio_path = job.audio_path().to_path_buf();
        let audio = task::spawn_blocking(move || AudioDecoder::open(&audio_path))
            .await
            .map_err(|err| PipelineError::input(format!("audio load task failed: {err}")))?
            .map_err(|err| PipelineError::input(format!("{err:#}")))?;

        self.transition(job, JobState::Transcribing);
        let stage = self.stage.clone();
        let ledger = self.ledger.clone();
        let device = job.device();
        let midi = task::spawn_blocking(move || stage.run(&audio, device, &ledger))
            .await
            .map_err(|err| {
                PipelineError::transcription(format!("transcription task failed: {err}"))
            })??;
        job.set_midi_artifact(midi.path.clone());
        self.emit(PipelineEvent::ArtifactProduced {
            id: job.id(),
            purpose: ArtifactPurpose::Midi,
            path: midi.path.clone(),
        });

        self.transition(job, JobState::Rendering);
        let document = self
            .ledger
            .create(ArtifactPurpose::Document, StageTag::Render)
            .map_err(|err| {
                PipelineError::render(format!("allocate document artifact: {err}"))
            })?;
        self.renderer.render(&midi.path, &document.path).await?;
        job.set_document_artifact(document.path.clone());
        self.emit(PipelineEvent::ArtifactProduced {
            id: job.id(),
            purpose: ArtifactPurpose::Document,
            path: document.path.clone(),
        });

        self.transition(job, JobState::Completed);
        Ok(())
    }

    fn transition(&self, job: &mut Job, state: JobState) {
        job.advance(state);
        self.emit(PipelineEvent::State {
            id: job.id(),
            state,
        });
    }

    // The receiver may already be gone; the job still runs to its terminal
    // state so the ledger is torn down either way.
    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}
