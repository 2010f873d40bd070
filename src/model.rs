//! Acoustic model boundary: frame activations and their on-disk dump format

use crate::error::{Result as TranscribeResult, TranscribeError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Frame-synchronous outputs of the acoustic model for one chunk
#[derive(Debug, Clone)]
pub struct FrameActivations {
    /// Pitch probabilities, `[frames, bins]`
    pub probs: Array2<f32>,
    /// Boundary activation per frame
    pub bounds: Vec<f32>,
    /// Validity mask per frame
    pub masks: Vec<bool>,
}

impl FrameActivations {
    /// Build activations and check that every array covers the same frames
    pub fn new(probs: Array2<f32>, bounds: Vec<f32>, masks: Vec<bool>) -> TranscribeResult<Self> {
        let n_frames = probs.nrows();
        if bounds.len() != n_frames || masks.len() != n_frames {
            return Err(TranscribeError::InputValidationError(format!(
                "frame arrays disagree: {} probability rows, {} bounds, {} masks",
                n_frames,
                bounds.len(),
                masks.len()
            )));
        }
        Ok(Self {
            probs,
            bounds,
            masks,
        })
    }

    /// Activations with every frame marked valid
    pub fn unmasked(probs: Array2<f32>, bounds: Vec<f32>) -> TranscribeResult<Self> {
        let masks = vec![true; probs.nrows()];
        Self::new(probs, bounds, masks)
    }

    pub fn n_frames(&self) -> usize {
        self.probs.nrows()
    }

    pub fn n_bins(&self) -> usize {
        self.probs.ncols()
    }
}

/// Anything that can turn a chunk waveform into frame activations
pub trait AcousticModel {
    fn infer(&self, waveform: &[f32]) -> TranscribeResult<FrameActivations>;
}

/// Everything the decoder needs for one chunk
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub offset_sec: f64,
    pub activations: FrameActivations,
    /// Chunk waveform for volume extraction
    pub waveform: Option<Vec<f32>>,
}

/// One chunk of a serialized model run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub offset: f64,
    pub probs: Vec<Vec<f32>>,
    pub bounds: Vec<f32>,
    #[serde(default)]
    pub masks: Option<Vec<bool>>,
}

impl ChunkRecord {
    /// Convert to dense activations, treating missing masks as all-valid
    pub fn to_activations(&self) -> TranscribeResult<FrameActivations> {
        let n_frames = self.probs.len();
        let n_bins = self.probs.first().map_or(0, |row| row.len());
        if let Some(row) = self.probs.iter().position(|row| row.len() != n_bins) {
            return Err(TranscribeError::InputValidationError(format!(
                "probability row {} has {} bins, expected {}",
                row,
                self.probs[row].len(),
                n_bins
            )));
        }

        let flat: Vec<f32> = self.probs.iter().flatten().copied().collect();
        let probs = Array2::from_shape_vec((n_frames, n_bins), flat)
            .map_err(|e| TranscribeError::InputValidationError(e.to_string()))?;
        let masks = self
            .masks
            .clone()
            .unwrap_or_else(|| vec![true; n_frames]);
        FrameActivations::new(probs, self.bounds.clone(), masks)
    }
}

/// Serialized outputs of an external model run over a sliced recording
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivationDump {
    pub chunks: Vec<ChunkRecord>,
}

impl ActivationDump {
    pub fn load<P: AsRef<Path>>(path: P) -> TranscribeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let dump: ActivationDump = serde_json::from_str(&content).map_err(|e| {
            TranscribeError::InputValidationError(format!("invalid activation dump: {}", e))
        })?;
        Ok(dump)
    }

    /// Build decoder inputs, cutting each chunk's waveform out of the recording when given.
    ///
    /// A chunk spans `frames * hop_size` samples starting at `offset * sample_rate`.
    pub fn into_chunk_inputs(
        self,
        recording: Option<&[f32]>,
        sample_rate: u32,
        hop_size: usize,
    ) -> TranscribeResult<Vec<ChunkInput>> {
        self.chunks
            .iter()
            .map(|record| {
                let activations = record.to_activations()?;
                let waveform = recording.map(|samples| {
                    let start = ((record.offset * sample_rate as f64).round().max(0.0) as usize)
                        .min(samples.len());
                    let end = (start + activations.n_frames() * hop_size).min(samples.len());
                    samples[start..end].to_vec()
                });
                Ok(ChunkInput {
                    offset_sec: record.offset,
                    activations,
                    waveform,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_frames_rejected() {
        let probs = Array2::<f32>::zeros((4, 8));
        let err = FrameActivations::unmasked(probs, vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, TranscribeError::InputValidationError(_)));
    }

    #[test]
    fn test_dump_defaults_masks() {
        let json = r#"{ "chunks": [ { "offset": 0.5, "probs": [[0.1, 0.9], [0.8, 0.2]], "bounds": [1.0, 0.0] } ] }"#;
        let dump: ActivationDump = serde_json::from_str(json).unwrap();
        let activations = dump.chunks[0].to_activations().unwrap();
        assert_eq!(activations.n_frames(), 2);
        assert_eq!(activations.n_bins(), 2);
        assert_eq!(activations.masks, vec![true, true]);
        assert_eq!(activations.probs[[1, 0]], 0.8);
    }

    #[test]
    fn test_ragged_probs_rejected() {
        let record = ChunkRecord {
            offset: 0.0,
            probs: vec![vec![0.5, 0.5], vec![1.0]],
            bounds: vec![1.0, 0.0],
            masks: None,
        };
        assert!(record.to_activations().is_err());
    }

    #[test]
    fn test_waveform_cut_from_recording() {
        let dump = ActivationDump {
            chunks: vec![ChunkRecord {
                offset: 1.0,
                probs: vec![vec![1.0, 0.0]; 3],
                bounds: vec![1.0, 0.0, 0.0],
                masks: None,
            }],
        };
        let recording: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let inputs = dump.into_chunk_inputs(Some(&recording), 10, 4).unwrap();
        let waveform = inputs[0].waveform.as_ref().unwrap();
        assert_eq!(waveform.len(), 12);
        assert_eq!(waveform[0], 10.0);
    }
}
