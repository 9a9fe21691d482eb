use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sonoscore_domain::{ArtifactPurpose, Device, PipelineEvent};
use sonoscore_pipeline::{EnergyOnsetModel, JobRequest, JobRunner, PipelineConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Transcribe an audio recording into a notated score", long_about = None)]
struct Cli {
    /// Path to the audio file to transcribe
    input: PathBuf,
    /// Notation renderer executable (e.g. the MuseScore binary)
    #[arg(short, long)]
    renderer: Option<PathBuf>,
    /// JSON pipeline configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Renderer timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Compute device for the transcription model
    #[arg(long)]
    device: Option<Device>,
    /// Copy the MIDI artifact here after a successful run
    #[arg(long)]
    save_midi: Option<PathBuf>,
    /// Copy the rendered document here after a successful run
    #[arg(long)]
    save_pdf: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => {
            let renderer = cli
                .renderer
                .clone()
                .context("either --config or --renderer is required")?;
            PipelineConfig::new(renderer)
        }
    };
    if let Some(renderer) = cli.renderer {
        config.renderer_executable = renderer;
    }
    if let Some(timeout) = cli.timeout_secs {
        config.render_timeout_secs = timeout;
    }
    let device = cli.device.unwrap_or(config.device);

    let runtime = tokio::runtime::Runtime::new()?;
    let runner = JobRunner::new(
        config,
        Arc::new(EnergyOnsetModel::default()),
        runtime.handle().clone(),
    );
    let mut handle = runner
        .submit(JobRequest::new(cli.input).with_device(device))
        .map_err(anyhow::Error::from)?;

    let mut outcome = None;
    while let Some(event) = handle.blocking_recv() {
        match event {
            PipelineEvent::State { state, .. } => println!("state: {state}"),
            PipelineEvent::ArtifactProduced { purpose, path, .. } => {
                println!("{purpose} artifact: {}", path.display());
            }
            PipelineEvent::Completed { .. } => outcome = Some(Ok(())),
            PipelineEvent::Failed { error, .. } => outcome = Some(Err(error)),
            PipelineEvent::Finished { .. } => break,
        }
    }

    match outcome {
        Some(Ok(())) => {
            if let Some(dest) = cli.save_midi {
                let saved = handle.save_artifact(ArtifactPurpose::Midi, &dest)?;
                println!("midi saved to {}", saved.display());
            }
            if let Some(dest) = cli.save_pdf {
                let saved = handle.save_artifact(ArtifactPurpose::Document, &dest)?;
                println!("document saved to {}", saved.display());
            }
            Ok(())
        }
        Some(Err(error)) => Err(anyhow::Error::from(error)),
        None => anyhow::bail!("job ended without a terminal result"),
    }
}
