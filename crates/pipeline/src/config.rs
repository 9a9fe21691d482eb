use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use sonoscore_domain::Device;

use crate::retry::RetryPolicy;

/// Pipeline configuration, resolved once at startup. The renderer
/// executable location lives here rather than in the adapter so the adapter
/// stays platform-agnostic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Notation renderer executable, e.g. the MuseScore binary.
    pub renderer_executable: PathBuf,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    #[serde(default)]
    pub device: Device,
    /// Retry policy for temp-file disposal.
    #[serde(default)]
    pub disposal: RetryPolicy,
}

fn default_render_timeout_secs() -> u64 {
    120
}

impl PipelineConfig {
    pub fn new(renderer_executable: impl Into<PathBuf>) -> Self {
        Self {
            renderer_executable: renderer_executable.into(),
            render_timeout_secs: default_render_timeout_secs(),
            device: Device::default(),
            disposal: RetryPolicy::default(),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file =
            File::open(path_ref).with_context(|| format!("open config file {:?}", path_ref))?;
        let config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse config file {:?}", path_ref))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"renderer_executable": "/usr/bin/musescore"}"#).unwrap();
        assert_eq!(config.render_timeout_secs, 120);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.disposal, RetryPolicy::default());
    }

    #[test]
    fn loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut file = File::create(&path).unwrap();
        file.write_all(
            br#"{"renderer_executable": "/opt/mscore", "render_timeout_secs": 30, "device": "cuda"}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.renderer_executable, PathBuf::from("/opt/mscore"));
        assert_eq!(config.render_timeout(), Duration::from_secs(30));
        assert_eq!(config.device, Device::Cuda);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(PipelineConfig::from_json_file("/nope/pipeline.json").is_err());
    }
}
