use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decoded audio, downmixed to a single channel. The transcription model
/// boundary takes mono samples, so downmixing happens here at load time.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

pub struct AudioDecoder;

impl AudioDecoder {
    /// Open and fully decode an audio file into mono `f32` samples.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DecodedAudio> {
        let path_ref = path.as_ref();
        let file =
            File::open(path_ref).with_context(|| format!("open audio file {:?}", path_ref))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow::anyhow!("no default track found in {:?}", path_ref))?;
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);

        let mut samples = Vec::new();
        let mut interleaved: Option<SampleBuffer<f32>> = None;
        loop {
            match format.next_packet() {
                Ok(packet) => {
                    let decoded = match decoder.decode(&packet) {
                        Ok(decoded) => decoded,
                        // skip undecodable packets
                        Err(SymphoniaError::DecodeError(_)) => continue,
                        Err(err) => return Err(err.into()),
                    };
                    let spec = *decoded.spec();
                    let channels = spec.channels.count().max(1);
                    let frames = decoded.frames() as u64;
                    let buffer = interleaved
                        .get_or_insert_with(|| SampleBuffer::<f32>::new(frames, spec));
                    if buffer.capacity() < (frames as usize) * channels {
                        *buffer = SampleBuffer::<f32>::new(frames, spec);
                    }
                    buffer.copy_interleaved_ref(decoded);
                    for frame in buffer.samples().chunks_exact(channels) {
                        samples.push(frame.iter().sum::<f32>() / channels as f32);
                    }
                }
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if samples.is_empty() {
            anyhow::bail!("no audio samples decoded from {:?}", path_ref);
        }
        debug!(
            sample_rate,
            sample_count = samples.len(),
            "decoded audio file"
        );
        Ok(DecodedAudio {
            sample_rate,
            samples,
        })
    }
}
