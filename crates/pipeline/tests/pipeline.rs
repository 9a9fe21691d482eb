//! End-to-end pipeline scenarios: a submitted job runs off the caller's
//! context, walks the state machine in order, and always ends with a
//! terminal event followed by `Finished`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sonoscore_domain::{ArtifactPurpose, JobState, PipelineError, PipelineEvent};
use sonoscore_pipeline::{
    EnergyOnsetModel, JobHandle, JobRequest, JobRunner, PipelineConfig, RetryPolicy,
};

/// Minimal 16-bit PCM mono WAV with periodic tone bursts.
fn write_test_wav(path: &Path, seconds: u32) {
    let sample_rate = 8000u32;
    let total = (sample_rate * seconds) as usize;
    let mut samples = Vec::with_capacity(total);
    for i in 0..total {
        // one 50ms burst at the start of every second
        let in_burst = (i % sample_rate as usize) < (sample_rate as usize / 20);
        let value = if in_burst {
            ((i as f32 * 0.4).sin() * 16_000.0) as i16
        } else {
            0
        };
        samples.push(value);
    }

    let mut data = Vec::new();
    let data_len = (samples.len() * 2) as u32;
    data.extend_from_slice(b"RIFF");
    data.extend_from_slice(&(36 + data_len).to_le_bytes());
    data.extend_from_slice(b"WAVEfmt ");
    data.extend_from_slice(&16u32.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&sample_rate.to_le_bytes());
    data.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&16u16.to_le_bytes());
    data.extend_from_slice(b"data");
    data.extend_from_slice(&data_len.to_le_bytes());
    for sample in &samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    fs::write(path, data).unwrap();
}

#[cfg(unix)]
fn write_renderer_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("renderer.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn test_config(renderer: impl Into<PathBuf>) -> PipelineConfig {
    let mut config = PipelineConfig::new(renderer);
    config.render_timeout_secs = 10;
    config.disposal = RetryPolicy::immediate(3);
    config
}

fn runner(config: PipelineConfig) -> JobRunner {
    JobRunner::new(
        config,
        Arc::new(EnergyOnsetModel::default()),
        tokio::runtime::Handle::current(),
    )
}

async fn collect_events(handle: &mut JobHandle) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.recv().await {
        let finished = matches!(event, PipelineEvent::Finished { .. });
        events.push(event);
        if finished {
            break;
        }
    }
    events
}

fn observed_states(events: &[PipelineEvent]) -> Vec<JobState> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::State { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

async fn wait_until_idle(runner: &JobRunner) {
    while runner.is_busy() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn successful_job_walks_the_state_machine_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("take.wav");
    write_test_wav(&audio, 10);
    let renderer = write_renderer_script(dir.path(), r#"printf 'fake pdf' > "$3""#);

    let runner = runner(test_config(renderer));
    let mut handle = runner.submit(JobRequest::new(&audio)).unwrap();
    let events = collect_events(&mut handle).await;

    assert_eq!(
        observed_states(&events),
        vec![
            JobState::Pending,
            JobState::Loading,
            JobState::Transcribing,
            JobState::Rendering,
            JobState::Completed,
        ]
    );

    let (midi, document) = events
        .iter()
        .find_map(|event| match event {
            PipelineEvent::Completed { midi, document, .. } => {
                Some((midi.clone(), document.clone()))
            }
            _ => None,
        })
        .expect("terminal success event");
    assert!(fs::metadata(&midi).unwrap().len() > 0);
    assert!(fs::metadata(&document).unwrap().len() > 0);
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));

    // The MIDI artifact precedes the document artifact, never the reverse.
    let produced: Vec<ArtifactPurpose> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::ArtifactProduced { purpose, .. } => Some(*purpose),
            _ => None,
        })
        .collect();
    assert_eq!(produced, vec![ArtifactPurpose::Midi, ArtifactPurpose::Document]);

    // Copy the MIDI out, then let the handle dispose of the rest.
    wait_until_idle(&runner).await;
    let saved = dir.path().join("saved.mid");
    handle.save_artifact(ArtifactPurpose::Midi, &saved).unwrap();
    drop(handle);
    assert!(saved.exists());
    assert!(!midi.exists(), "temp midi should be gone after teardown");
    assert!(!document.exists(), "temp document should be disposed");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_audio_fails_with_input_error_and_still_finishes() {
    let runner = runner(test_config("/usr/bin/musescore"));
    let mut handle = runner
        .submit(JobRequest::new("/no/such/recording.wav"))
        .unwrap();
    let events = collect_events(&mut handle).await;

    let error = events
        .iter()
        .find_map(|event| match event {
            PipelineEvent::Failed { error, .. } => Some(error.clone()),
            _ => None,
        })
        .expect("terminal failure event");
    assert!(matches!(error, PipelineError::Input(_)));
    assert_eq!(*observed_states(&events).last().unwrap(), JobState::Failed);
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_renderer_fails_after_the_midi_artifact_exists() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("take.wav");
    write_test_wav(&audio, 2);

    let runner = runner(test_config("/nonexistent/musescore"));
    let mut handle = runner.submit(JobRequest::new(&audio)).unwrap();
    let events = collect_events(&mut handle).await;

    let error = events
        .iter()
        .find_map(|event| match event {
            PipelineEvent::Failed { error, .. } => Some(error.clone()),
            _ => None,
        })
        .expect("terminal failure event");
    assert!(matches!(error, PipelineError::Render(_)));

    // Transcription ran before the renderer, so the MIDI artifact was
    // produced; no document was ever validated.
    let produced: Vec<ArtifactPurpose> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::ArtifactProduced { purpose, .. } => Some(*purpose),
            _ => None,
        })
        .collect();
    assert_eq!(produced, vec![ArtifactPurpose::Midi]);
    assert!(handle.artifact_path(ArtifactPurpose::Midi).is_some());
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn second_submit_while_busy_is_rejected_without_disturbing_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("take.wav");
    write_test_wav(&audio, 2);
    let renderer = write_renderer_script(dir.path(), "sleep 1\nprintf 'fake pdf' > \"$3\"");

    let runner = runner(test_config(renderer));
    let mut handle = runner.submit(JobRequest::new(&audio)).unwrap();

    let rejected = runner.submit(JobRequest::new(&audio));
    assert!(matches!(rejected, Err(PipelineError::Busy)));

    // The in-flight job still completes normally.
    let events = collect_events(&mut handle).await;
    assert_eq!(*observed_states(&events).last().unwrap(), JobState::Completed);

    // Once idle, a new submission is accepted again.
    wait_until_idle(&runner).await;
    assert!(!runner.is_busy());
    let mut second = runner.submit(JobRequest::new(&audio)).unwrap();
    let events = collect_events(&mut second).await;
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));
}
