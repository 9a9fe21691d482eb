use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use sonoscore_domain::{ArtifactPurpose, DisposalError, StageTag};

use crate::retry::{with_retries, RetryPolicy};

/// Handle into the ledger for one registered artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactId(usize);

/// One disposable file produced mid-pipeline. Ownership of the file belongs
/// to the ledger from the moment of creation; the producing stage only
/// writes to it.
#[derive(Clone, Debug)]
pub struct TempArtifact {
    pub id: ArtifactId,
    pub path: PathBuf,
    pub purpose: ArtifactPurpose,
    pub stage: StageTag,
}

struct Entry {
    artifact: TempArtifact,
    retained: bool,
    disposed: bool,
}

/// Per-job registry of temporary files. The only component allowed to
/// delete them. Torn down exactly once (on drop), even when disposal of
/// individual files fails.
pub struct TempFileLedger {
    policy: RetryPolicy,
    entries: Mutex<Vec<Entry>>,
}

impl TempFileLedger {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a uniquely named temp path with the purpose's suffix and
    /// register it. The path exists (empty) before any writer touches it.
    pub fn create(&self, purpose: ArtifactPurpose, stage: StageTag) -> io::Result<TempArtifact> {
        let file = tempfile::Builder::new()
            .prefix("sonoscore-")
            .suffix(purpose.suffix())
            .tempfile()?;
        let (_file, path) = file.keep().map_err(|err| err.error)?;

        let mut entries = self.entries();
        let artifact = TempArtifact {
            id: ArtifactId(entries.len()),
            path,
            purpose,
            stage,
        };
        debug!(%purpose, %stage, path = ?artifact.path, "registered temp artifact");
        entries.push(Entry {
            artifact: artifact.clone(),
            retained: false,
            disposed: false,
        });
        Ok(artifact)
    }

    /// Exclude an artifact from `dispose_all`. It stays tracked and is
    /// still removed at final teardown.
    pub fn mark_retained(&self, id: ArtifactId) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(id.0) {
            Some(entry) => {
                entry.retained = true;
                true
            }
            None => false,
        }
    }

    /// Newest registered path for a purpose, regardless of disposal state.
    pub fn artifact_path(&self, purpose: ArtifactPurpose) -> Option<PathBuf> {
        self.entries()
            .iter()
            .rev()
            .find(|entry| entry.artifact.purpose == purpose)
            .map(|entry| entry.artifact.path.clone())
    }

    /// Copy the newest live artifact of `purpose` to a caller-chosen
    /// destination and mark it retained.
    pub fn retain_to(&self, purpose: ArtifactPurpose, dest: &Path) -> io::Result<PathBuf> {
        let mut entries = self.entries();
        let entry = entries
            .iter_mut()
            .rev()
            .find(|entry| entry.artifact.purpose == purpose && !entry.disposed)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no live {purpose} artifact to retain"),
                )
            })?;
        fs::copy(&entry.artifact.path, dest)?;
        entry.retained = true;
        debug!(%purpose, from = ?entry.artifact.path, to = ?dest, "artifact retained");
        Ok(dest.to_path_buf())
    }

    /// Best-effort deletion of every non-retained artifact. Each deletion is
    /// retried under the ledger's policy; a final failure is reported and
    /// logged but never aborts disposal of the remaining artifacts. Safe to
    /// call repeatedly.
    pub fn dispose_all(&self) -> Vec<DisposalError> {
        self.dispose(false)
    }

    fn dispose(&self, include_retained: bool) -> Vec<DisposalError> {
        let mut entries = self.entries();
        let mut failures = Vec::new();
        for entry in entries.iter_mut() {
            if entry.disposed || (entry.retained && !include_retained) {
                continue;
            }
            match remove_with_retries(&self.policy, &entry.artifact.path) {
                Ok(()) => {
                    entry.disposed = true;
                    debug!(path = ?entry.artifact.path, "temp artifact removed");
                }
                Err(err) => {
                    let failure = DisposalError {
                        path: entry.artifact.path.clone(),
                        attempts: self.policy.max_attempts.max(1),
                        reason: err.to_string(),
                    };
                    warn!(%failure, "temp artifact left behind");
                    failures.push(failure);
                }
            }
        }
        failures
    }
}

impl Drop for TempFileLedger {
    fn drop(&mut self) {
        // Final teardown removes retained artifacts too; the caller has had
        // its chance to copy them out by now.
        let _ = self.dispose(true);
    }
}

fn remove_with_retries(policy: &RetryPolicy, path: &Path) -> io::Result<()> {
    with_retries(policy, || match fs::remove_file(path) {
        // Already gone counts as disposed.
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    })
}
