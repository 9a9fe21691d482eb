use std::fmt;

use serde::{Deserialize, Serialize};

/// What a temporary artifact is for. Each purpose maps to a fixed file
/// suffix so external tools (the renderer in particular) recognize the file.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArtifactPurpose {
    Midi,
    Document,
}

impl ArtifactPurpose {
    pub fn suffix(self) -> &'static str {
        match self {
            ArtifactPurpose::Midi => ".mid",
            ArtifactPurpose::Document => ".pdf",
        }
    }
}

impl fmt::Display for ArtifactPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactPurpose::Midi => f.write_str("midi"),
            ArtifactPurpose::Document => f.write_str("document"),
        }
    }
}

/// Pipeline stage tag used for error attribution and artifact diagnostics.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageTag {
    Submit,
    Load,
    Transcribe,
    Render,
    Dispose,
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageTag::Submit => f.write_str("submit"),
            StageTag::Load => f.write_str("load"),
            StageTag::Transcribe => f.write_str("transcribe"),
            StageTag::Render => f.write_str("render"),
            StageTag::Dispose => f.write_str("dispose"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_suffixes() {
        assert_eq!(ArtifactPurpose::Midi.suffix(), ".mid");
        assert_eq!(ArtifactPurpose::Document.suffix(), ".pdf");
    }
}
