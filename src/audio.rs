//! Audio I/O, per-chunk state and sample-level processing

use crate::analysis::{DecodedChunk, Note, SegmentSummary};
use crate::config::{CompressorConfig, Config};
use crate::error::{Result as TranscribeResult, TranscribeError};
use crate::model::FrameActivations;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Guards the dB conversion against log(0)
const LEVEL_EPSILON: f64 = 1e-10;

/// One slice of the recording as handed over by the slicer
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Start time in seconds within the full recording
    pub offset_sec: f64,
    pub samples: Vec<f32>,
}

/// Decoding state of a single chunk, filled in pass by pass
#[derive(Debug, Clone)]
pub struct ChunkState {
    /// Position of the chunk in the recording
    pub index: usize,
    pub offset_sec: f64,
    /// Chunk waveform, needed only for volume extraction
    pub waveform: Option<Vec<f32>>,
    /// Raw model outputs
    pub activations: FrameActivations,

    // Pass 1: Boundary decoding
    /// Segment id per frame, 0 outside any segment
    pub segment_ids: Vec<usize>,

    // Pass 2: Value decoding
    /// Continuous pitch per frame
    pub frame_values: Vec<f32>,
    /// Low-confidence flag per frame
    pub frame_rests: Vec<bool>,

    // Pass 3: Segment aggregation
    pub segments: Vec<SegmentSummary>,

    // Pass 4: Volume extraction
    /// Normalized loudness per segment, `None` for rests
    pub volumes: Vec<Option<f32>>,
}

impl ChunkState {
    pub fn new(
        index: usize,
        offset_sec: f64,
        activations: FrameActivations,
        waveform: Option<Vec<f32>>,
    ) -> Self {
        ChunkState {
            index,
            offset_sec,
            waveform,
            activations,
            segment_ids: Vec::new(),
            frame_values: Vec::new(),
            frame_rests: Vec::new(),
            segments: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Number of model frames in the chunk
    pub fn n_frames(&self) -> usize {
        self.activations.n_frames()
    }

    /// Turn aggregated segments into notes, dropping segments that received no frame
    pub fn into_decoded(self, config: &Config) -> DecodedChunk {
        let timestep = config.audio.timestep();
        let notes = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, seg)| seg.frames > 0)
            .map(|(i, seg)| {
                let duration_sec = seg.frames as f64 * timestep;
                let note = if seg.valid {
                    Note::sounding(seg.value, duration_sec)
                } else {
                    Note::rest(duration_sec)
                };
                match self.volumes.get(i).copied().flatten() {
                    Some(volume) if !note.is_rest => note.with_volume(volume),
                    _ => note,
                }
            })
            .collect();
        DecodedChunk::new(self.offset_sec, notes)
    }
}

/// Load a WAV file as mono samples in [-1, 1] with its sample rate
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> TranscribeResult<(Vec<f32>, u32)> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "wav" {
        return Err(TranscribeError::InvalidAudioFormat(format!(
            "Unsupported audio format: {}",
            extension
        )));
    }

    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels > 2 {
        return Err(TranscribeError::InvalidAudioFormat(format!(
            "Unsupported channel count: {}",
            spec.channels
        )));
    }
    if spec.bits_per_sample > 32 {
        return Err(TranscribeError::InvalidAudioFormat(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut samples: Vec<f32> = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                samples.push(sample? as f32 / max_value);
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample?);
            }
        }
    }

    let samples = if spec.channels == 2 {
        samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) / 2.0)
            .collect()
    } else {
        samples
    };

    log::debug!(
        "Loaded {} samples at {} Hz from {}",
        samples.len(),
        spec.sample_rate,
        path.display()
    );
    Ok((samples, spec.sample_rate))
}

/// Write mono 32-bit float WAV
pub fn write_wav_file<P: AsRef<Path>>(path: P, samples: &[f32], sr: u32) -> TranscribeResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Validate an input recording before processing
pub fn validate_audio_file<P: AsRef<Path>>(path: P) -> TranscribeResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TranscribeError::InputValidationError(format!(
            "Audio file does not exist: {}",
            path.display()
        )));
    }

    let (samples, sr) = load_audio_file(path)?;

    if samples.is_empty() {
        return Err(TranscribeError::InputValidationError(
            "Audio file contains no samples".to_string(),
        ));
    }
    if !(8000..=192000).contains(&sr) {
        return Err(TranscribeError::UnsupportedSampleRate(sr));
    }

    let peak = peak_abs(&samples);
    if peak > 0.99 {
        log::warn!("Audio file may be clipped (peak = {:.3})", peak);
    }

    Ok(())
}

/// Largest absolute sample value, 0 for empty input
pub fn peak_abs(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, &x| peak.max(x.abs()))
}

/// Convert a gain in dB to a linear factor
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Envelope-following dynamics compressor.
///
/// The envelope is a single-pole follower with asymmetric attack and release, never
/// dropping below the instantaneous level. Gain reduction above the threshold follows
/// `excess * (1 - 1/ratio)`. When makeup gain pushes the peak above full scale, the whole
/// output is rescaled once; there is no per-sample limiting.
pub fn compress(samples: &[f32], sr: u32, params: &CompressorConfig) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let sr = sr as f64;
    let threshold = params.threshold_db as f64;
    let slope = 1.0 - 1.0 / params.ratio as f64;
    let attack_coef = (-1.0 / (params.attack_sec as f64 * sr)).exp();
    let release_coef = (-1.0 / (params.release_sec as f64 * sr)).exp();
    let makeup = db_to_gain(params.makeup_gain_db as f64);

    let mut output = Vec::with_capacity(samples.len());
    // Sample 0 has a zero envelope and only receives makeup gain.
    output.push((samples[0] as f64 * makeup) as f32);

    let mut env = 0.0f64;
    for &x in &samples[1..] {
        let level = 20.0 * ((x as f64).abs() + LEVEL_EPSILON).log10();
        env = level.max(release_coef * env + (1.0 - attack_coef) * level);

        let reduction = if env > threshold {
            (env - threshold) * slope
        } else {
            0.0
        };
        let gain = db_to_gain(-reduction) * makeup;
        output.push((x as f64 * gain) as f32);
    }

    let peak = peak_abs(&output);
    if peak > 1.0 {
        for sample in output.iter_mut() {
            *sample /= peak;
        }
    }

    output
}

/// Frame-wise RMS energy over centered, zero-padded frames.
///
/// Produces `1 + len / hop` frames, aligned with the model frames of the same hop size.
pub fn frame_rms(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    if samples.is_empty() || frame_length == 0 || hop_length == 0 {
        return Vec::new();
    }

    let pad = frame_length / 2;
    let padded_len = samples.len() + 2 * pad;
    if padded_len < frame_length {
        return Vec::new();
    }
    let n_frames = 1 + (padded_len - frame_length) / hop_length;

    (0..n_frames)
        .map(|frame| {
            // Frame bounds in padded coordinates, mapped back onto the signal.
            let start = frame * hop_length;
            let end = start + frame_length;
            let lo = start.saturating_sub(pad).min(samples.len());
            let hi = end.saturating_sub(pad).min(samples.len());
            let energy: f64 = samples[lo..hi].iter().map(|&x| (x as f64) * (x as f64)).sum();
            (energy / frame_length as f64).sqrt() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_gain(20.0) - 10.0).abs() < 1e-9);
        assert!((db_to_gain(-6.0) - 0.501_187).abs() < 1e-5);
    }

    #[test]
    fn test_frame_rms_count_matches_model_frames() {
        let samples = vec![0.5f32; 1000];
        let rms = frame_rms(&samples, 8, 4);
        assert_eq!(rms.len(), 1 + 1000 / 4);
        // Interior frames see a constant signal.
        assert!((rms[10] - 0.5).abs() < 1e-6);
        // The first frame is half padding.
        assert!((rms[0] - (0.125f32).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_frame_rms_empty() {
        assert!(frame_rms(&[], 2048, 512).is_empty());
    }

    #[test]
    fn test_single_sample_only_gets_makeup() {
        let mut params = CompressorConfig::default();
        params.makeup_gain_db = 6.0;
        let out = compress(&[0.1], 44100, &params);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.1 * db_to_gain(6.0) as f32).abs() < 1e-6);
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..441).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();

        write_wav_file(&path, &samples, 44100).unwrap();
        let (loaded, sr) = load_audio_file(&path).unwrap();

        assert_eq!(sr, 44100);
        assert_eq!(loaded, samples);
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let err = load_audio_file("take.mp3").unwrap_err();
        assert!(matches!(err, TranscribeError::InvalidAudioFormat(_)));
    }
}
