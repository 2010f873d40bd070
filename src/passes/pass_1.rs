//! Pass 1: Boundary-to-Segment Decoding

use crate::audio::ChunkState;
use crate::config::Config;
use crate::error::Result as TranscribeResult;

/// Assign a segment id to every frame from a boundary activation curve.
///
/// Activations are accumulated and rounded into a step function; each frame where the
/// step rises opens a new segment. Fractional activations therefore add up, and several
/// weak boundaries can together trigger one transition. The step before frame 0 is -1,
/// so frame 0 opens segment 1 unless its own activation rounds below zero.
pub fn decode_segment_ids(bounds: &[f32]) -> Vec<usize> {
    let mut segment_ids = Vec::with_capacity(bounds.len());
    let mut cumulative = 0.0f32;
    let mut prev_step = -1i64;
    let mut segment = 0usize;

    for &activation in bounds {
        cumulative += activation;
        let step = cumulative.round_ties_even() as i64;
        if step > prev_step {
            segment += 1;
        }
        prev_step = step;
        segment_ids.push(segment);
    }

    segment_ids
}

/// Decode segment ids for a chunk, with masked frames kept out of every segment
pub fn run(state: &mut ChunkState, _config: &Config) -> TranscribeResult<()> {
    let activations = &state.activations;
    let masked_bounds: Vec<f32> = activations
        .bounds
        .iter()
        .zip(&activations.masks)
        .map(|(&b, &valid)| if valid { b } else { 0.0 })
        .collect();

    let mut segment_ids = decode_segment_ids(&masked_bounds);
    for (id, &valid) in segment_ids.iter_mut().zip(&activations.masks) {
        if !valid {
            *id = 0;
        }
    }

    log::debug!(
        "chunk {}: {} segments",
        state.index,
        segment_ids.iter().max().copied().unwrap_or(0)
    );
    state.segment_ids = segment_ids;
    Ok(())
}
