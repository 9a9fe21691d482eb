use anyhow::Result;
use tracing::debug;

use sonoscore_domain::Device;

/// Boundary to the transcription model. Implementations take mono samples
/// and return Standard MIDI File bytes; any error is treated as opaque and
/// fatal to the job.
pub trait TranscriptionModel: Send + Sync {
    fn transcribe(&self, samples: &[f32], sample_rate: u32, device: Device) -> Result<Vec<u8>>;
}

/// Built-in fallback model: frame-energy onset detection mapped to
/// fixed-pitch note events. Good enough to exercise the whole pipeline
/// without a real model checkpoint.
#[derive(Clone, Debug)]
pub struct EnergyOnsetModel {
    pub frame_size: usize,
    pub onset_threshold: f32,
    pub pitch: u8,
}

impl Default for EnergyOnsetModel {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            onset_threshold: 0.08,
            pitch: 60,
        }
    }
}

impl EnergyOnsetModel {
    fn onsets(&self, samples: &[f32]) -> Vec<(f64, f32)> {
        let mut onsets = Vec::new();
        let mut previous_rms = 0.0f32;
        for (index, frame) in samples.chunks(self.frame_size).enumerate() {
            let energy: f32 = frame.iter().map(|s| s * s).sum();
            let rms = (energy / frame.len() as f32).sqrt();
            if rms > self.onset_threshold && previous_rms <= self.onset_threshold {
                let time = (index * self.frame_size) as f64;
                onsets.push((time, rms));
            }
            previous_rms = rms;
        }
        onsets
    }
}

impl TranscriptionModel for EnergyOnsetModel {
    fn transcribe(&self, samples: &[f32], sample_rate: u32, device: Device) -> Result<Vec<u8>> {
        anyhow::ensure!(sample_rate > 0, "sample rate must be positive");
        debug!(%device, sample_count = samples.len(), "running energy-onset model");

        let mut notes = Vec::new();
        for (sample_index, rms) in self.onsets(samples) {
            let seconds = sample_index / sample_rate as f64;
            let velocity = ((rms * 4.0 * 127.0) as u8).clamp(1, 127);
            notes.push(NoteEvent {
                onset_secs: seconds,
                duration_secs: 0.25,
                pitch: self.pitch,
                velocity,
            });
        }
        Ok(smf::encode(&notes))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NoteEvent {
    pub onset_secs: f64,
    pub duration_secs: f64,
    pub pitch: u8,
    pub velocity: u8,
}

/// Minimal type-0 Standard MIDI File encoding.
pub mod smf {
    use super::NoteEvent;

    const TICKS_PER_QUARTER: u16 = 480;
    /// Fixed 120 bpm grid: one quarter note per half second.
    const TICKS_PER_SECOND: f64 = TICKS_PER_QUARTER as f64 * 2.0;

    pub fn encode(notes: &[NoteEvent]) -> Vec<u8> {
        // (tick, channel message), note-offs interleaved with note-ons.
        let mut messages: Vec<(u64, [u8; 3])> = Vec::with_capacity(notes.len() * 2);
        for note in notes {
            let on_tick = (note.onset_secs * TICKS_PER_SECOND).round() as u64;
            let off_tick =
                ((note.onset_secs + note.duration_secs) * TICKS_PER_SECOND).round() as u64;
            messages.push((on_tick, [0x90, note.pitch & 0x7F, note.velocity & 0x7F]));
            messages.push((off_tick.max(on_tick + 1), [0x80, note.pitch & 0x7F, 0]));
        }
        messages.sort_by_key(|(tick, message)| (*tick, message[0]));

        let mut track = Vec::new();
        let mut cursor = 0u64;
        for (tick, message) in messages {
            write_varlen(&mut track, tick - cursor);
            track.extend_from_slice(&message);
            cursor = tick;
        }
        // end of track
        write_varlen(&mut track, 0);
        track.extend_from_slice(&[0xFF, 0x2F, 0x00]);

        let mut bytes = Vec::with_capacity(14 + 8 + track.len());
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&TICKS_PER_QUARTER.to_be_bytes());
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);
        bytes
    }

    pub(super) fn write_varlen(out: &mut Vec<u8>, mut value: u64) {
        let mut stack = [0u8; 10];
        let mut len = 0;
        loop {
            stack[len] = (value & 0x7F) as u8;
            value >>= 7;
            len += 1;
            if value == 0 {
                break;
            }
        }
        for i in (0..len).rev() {
            let continuation = if i == 0 { 0 } else { 0x80 };
            out.push(stack[i] | continuation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varlen(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        smf::write_varlen(&mut out, value);
        out
    }

    #[test]
    fn varlen_known_vectors() {
        assert_eq!(varlen(0), vec![0x00]);
        assert_eq!(varlen(0x40), vec![0x40]);
        assert_eq!(varlen(0x7F), vec![0x7F]);
        assert_eq!(varlen(0x80), vec![0x81, 0x00]);
        assert_eq!(varlen(0x2000), vec![0xC0, 0x00]);
        assert_eq!(varlen(0x3FFF), vec![0xFF, 0x7F]);
        assert_eq!(varlen(0x4000), vec![0x81, 0x80, 0x00]);
    }

    #[test]
    fn silence_encodes_to_an_empty_but_valid_file() {
        let model = EnergyOnsetModel::default();
        let samples = vec![0.0f32; 16_000];
        let bytes = model.transcribe(&samples, 16_000, Device::Cpu).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        assert!(bytes.windows(4).any(|w| w == b"MTrk"));
        // header + empty track with end-of-track only
        assert_eq!(bytes.len(), 14 + 8 + 4);
    }

    #[test]
    fn bursts_become_note_events() {
        let model = EnergyOnsetModel::default();
        let mut samples = vec![0.0f32; 32_000];
        // two loud bursts, one frame wide each
        for i in 4096..5120 {
            samples[i] = 0.9;
        }
        for i in 16_384..17_408 {
            samples[i] = 0.5;
        }
        let bytes = model.transcribe(&samples, 16_000, Device::Cpu).unwrap();
        let note_ons = bytes.iter().filter(|&&b| b == 0x90).count();
        assert!(note_ons >= 2, "expected two note-ons, got {note_ons}");
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let model = EnergyOnsetModel::default();
        assert!(model.transcribe(&[0.0], 0, Device::Cpu).is_err());
    }
}
