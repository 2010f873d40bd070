//! Pass 0: Preflight checks on a chunk's model outputs

use crate::audio::ChunkState;
use crate::config::Config;
use crate::error::{Result as TranscribeResult, TranscribeError};

/// Reject chunk inputs the decoders cannot interpret
pub fn run(state: &mut ChunkState, config: &Config) -> TranscribeResult<()> {
    let activations = &state.activations;
    let n_frames = activations.n_frames();

    if activations.bounds.len() != n_frames || activations.masks.len() != n_frames {
        return Err(TranscribeError::InputValidationError(format!(
            "chunk {}: {} frames of probabilities but {} bounds and {} masks",
            state.index,
            n_frames,
            activations.bounds.len(),
            activations.masks.len()
        )));
    }

    if n_frames > 0 && activations.n_bins() < 2 {
        return Err(TranscribeError::InvalidConfigParameter(format!(
            "chunk {}: pitch distribution needs at least 2 bins, got {}",
            state.index,
            activations.n_bins()
        )));
    }

    if !state.offset_sec.is_finite() || state.offset_sec < 0.0 {
        return Err(TranscribeError::ConfigValidationFailed(format!(
            "chunk {}: invalid offset {}",
            state.index, state.offset_sec
        )));
    }

    if let Some(waveform) = &state.waveform {
        let expected = n_frames * config.audio.hop_size;
        if waveform.len() + config.audio.hop_size < expected {
            log::warn!(
                "chunk {}: waveform has {} samples, model frames cover {}",
                state.index,
                waveform.len(),
                expected
            );
        }
    }

    log::debug!(
        "chunk {}: {} frames x {} bins at offset {:.3}s",
        state.index,
        n_frames,
        activations.n_bins(),
        state.offset_sec
    );
    Ok(())
}
