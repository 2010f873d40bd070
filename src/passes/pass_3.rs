//! Pass 3: Segment Aggregation

use crate::analysis::SegmentSummary;
use crate::audio::ChunkState;
use crate::config::Config;
use crate::error::{Result as TranscribeResult, TranscribeError};

/// Number of integer pitch buckets in the per-segment histogram
pub const HISTOGRAM_BUCKETS: usize = 128;

/// Collapse per-frame values into one value, duration and validity flag per segment.
///
/// `mask` marks the frames that carry a usable value. A segment is valid when at least
/// `threshold` of its frames are masked in. Its value is found in two steps: the mode of
/// the rounded masked values picks a center robust to stray edge frames, then the raw
/// values within half a unit of that center are averaged for sub-unit precision.
/// Returns one entry for every id in `1..=max(segment_ids)`.
pub fn aggregate_segments(
    segment_ids: &[usize],
    values: &[f32],
    mask: &[bool],
    threshold: f32,
) -> TranscribeResult<Vec<SegmentSummary>> {
    if values.len() != segment_ids.len() || mask.len() != segment_ids.len() {
        return Err(TranscribeError::InputValidationError(format!(
            "segment aggregation over {} frames got {} values and {} mask bits",
            segment_ids.len(),
            values.len(),
            mask.len()
        )));
    }

    let n_segments = segment_ids.iter().max().copied().unwrap_or(0);
    if n_segments == 0 {
        return Ok(Vec::new());
    }

    let mut frames = vec![0usize; n_segments];
    let mut unmasked = vec![0usize; n_segments];
    let mut histogram = vec![[0usize; HISTOGRAM_BUCKETS]; n_segments];
    for ((&id, &value), &valid) in segment_ids.iter().zip(values).zip(mask) {
        if id == 0 {
            continue;
        }
        let seg = id - 1;
        frames[seg] += 1;
        if valid {
            unmasked[seg] += 1;
            histogram[seg][bucket_of(value)] += 1;
        }
    }

    let centers: Vec<f32> = histogram.iter().map(|h| argmax(h) as f32).collect();

    let mut near_sum = vec![0.0f32; n_segments];
    let mut near_count = vec![0usize; n_segments];
    for ((&id, &value), &valid) in segment_ids.iter().zip(values).zip(mask) {
        if id == 0 || !valid {
            continue;
        }
        let seg = id - 1;
        let center = centers[seg];
        if value >= center - 0.5 && value <= center + 0.5 {
            near_sum[seg] += value;
            near_count[seg] += 1;
        }
    }

    let summaries = (0..n_segments)
        .map(|seg| {
            let valid = frames[seg] > 0
                && unmasked[seg] as f32 / frames[seg] as f32 >= threshold;
            let value = if near_count[seg] == 0 {
                0.0
            } else {
                near_sum[seg] / near_count[seg] as f32
            };
            SegmentSummary {
                value,
                frames: frames[seg],
                valid,
            }
        })
        .collect();

    Ok(summaries)
}

fn bucket_of(value: f32) -> usize {
    let rounded = value.round_ties_even();
    if rounded.is_nan() || rounded <= 0.0 {
        0
    } else {
        (rounded as usize).min(HISTOGRAM_BUCKETS - 1)
    }
}

/// Index of the largest count, first one on ties
fn argmax(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

/// Aggregate a chunk's frames into segments using the voiced, unmasked frames
pub fn run(state: &mut ChunkState, config: &Config) -> TranscribeResult<()> {
    let voiced: Vec<bool> = state
        .frame_rests
        .iter()
        .zip(&state.activations.masks)
        .map(|(&rest, &valid)| !rest && valid)
        .collect();

    let segments = aggregate_segments(
        &state.segment_ids,
        &state.frame_values,
        &voiced,
        config.decode.note_threshold,
    )?;

    log::debug!(
        "chunk {}: {} segments, {} sounding",
        state.index,
        segments.len(),
        segments.iter().filter(|s| s.valid).count()
    );
    state.segments = segments;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_of_clamps() {
        assert_eq!(bucket_of(-3.0), 0);
        assert_eq!(bucket_of(60.4), 60);
        assert_eq!(bucket_of(60.5), 60);
        assert_eq!(bucket_of(61.5), 62);
        assert_eq!(bucket_of(400.0), 127);
    }

    #[test]
    fn test_argmax_prefers_first() {
        assert_eq!(argmax(&[1, 3, 3, 0]), 1);
        assert_eq!(argmax(&[0, 0]), 0);
    }

    #[test]
    fn test_reference_sequence() {
        let ids = [1, 1, 1, 1, 2, 2, 3, 3, 3, 0, 0];
        let values = [60.0, 61.0, 60.5, 63.0, 57.0, 57.0, 50.0, 55.0, 54.0, 0.0, 0.0];
        let mask: Vec<bool> = ids.iter().map(|&id| id > 0).collect();

        let segments = aggregate_segments(&ids, &values, &mask, 0.5).unwrap();

        assert_eq!(segments.len(), 3);
        // Histogram {60: 2, 61: 1, 63: 1} puts the center at 60; 60 and 60.5 are near it.
        assert!((segments[0].value - 60.25).abs() < 1e-6);
        assert_eq!(segments[0].frames, 4);
        assert!((segments[1].value - 57.0).abs() < 1e-6);
        // Three singleton buckets: the lowest (50) wins.
        assert!((segments[2].value - 50.0).abs() < 1e-6);
        assert!(segments.iter().all(|s| s.valid));
    }
}
