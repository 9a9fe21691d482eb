use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::warn;

use sonoscore_domain::{ArtifactPurpose, Device, Job, JobId, PipelineError, PipelineEvent};

use crate::config::PipelineConfig;
use crate::ledger::TempFileLedger;
use crate::model::TranscriptionModel;
use crate::orchestrator::PipelineOrchestrator;
use crate::render::RendererAdapter;
use crate::transcribe::TranscriptionStage;

/// One transcription request as submitted by the caller.
#[derive(Clone, Debug)]
pub struct JobRequest {
    pub audio_path: PathBuf,
    pub device: Device,
}

impl JobRequest {
    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: audio_path.into(),
            device: Device::default(),
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

/// Executes one orchestrator run per submission on the supplied runtime.
/// Single-job by design: a second `submit` while one is active is rejected
/// with [`PipelineError::Busy`]. Mid-job cancellation is not supported; a
/// submitted job runs to `Completed` or `Failed`.
pub struct JobRunner {
    config: PipelineConfig,
    model: Arc<dyn TranscriptionModel>,
    runtime: Handle,
    busy: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        config: PipelineConfig,
        model: Arc<dyn TranscriptionModel>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            model,
            runtime,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start a job on the background runtime and return immediately. The
    /// submitting context never blocks on I/O or subprocess waits.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, PipelineError> {
        // compare_exchange closes the race between a submit call and the
        // background job clearing the flag at completion.
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PipelineError::Busy);
        }

        let job = Job::new(request.audio_path, request.device);
        let id = job.id();
        let ledger = Arc::new(TempFileLedger::new(self.config.disposal.clone()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator = PipelineOrchestrator::new(
            TranscriptionStage::new(self.model.clone()),
            RendererAdapter::new(
                self.config.renderer_executable.clone(),
                self.config.render_timeout(),
            ),
            ledger.clone(),
            events_tx,
        );

        let busy = self.busy.clone();
        self.runtime.spawn(async move {
            orchestrator.run(job).await;
            // Cleared only after the terminal result and Finished went out.
            busy.store(false, Ordering::Release);
        });

        Ok(JobHandle {
            id,
            events: events_rx,
            ledger,
        })
    }
}

/// Caller's side of a submitted job: the event stream plus access to the
/// job's artifacts for copying them out before disposal. Dropping the
/// handle disposes of all non-retained artifacts; keep it alive until
/// `Finished` has been received.
pub struct JobHandle {
    id: JobId,
    events: UnboundedReceiver<PipelineEvent>,
    ledger: Arc<TempFileLedger>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Next pipeline event; `None` once `Finished` has been consumed and
    /// the job's sender is gone.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Blocking variant for callers outside the runtime. Must not be called
    /// from an async context.
    pub fn blocking_recv(&mut self) -> Option<PipelineEvent> {
        self.events.blocking_recv()
    }

    /// Path of the newest artifact of the given purpose, if one was ever
    /// produced. The file itself may already be disposed for failed jobs.
    pub fn artifact_path(&self, purpose: ArtifactPurpose) -> Option<PathBuf> {
        self.ledger.artifact_path(purpose)
    }

    /// Copy an artifact to a permanent location and mark it retained so
    /// automatic disposal skips it.
    pub fn save_artifact(&self, purpose: ArtifactPurpose, dest: &Path) -> io::Result<PathBuf> {
        self.ledger.retain_to(purpose, dest)
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        for failure in self.ledger.dispose_all() {
            warn!(id = %self.id, %failure, "disposal incomplete on handle drop");
        }
    }
}
