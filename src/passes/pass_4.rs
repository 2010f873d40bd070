//! Pass 4: Note Volume Extraction

use crate::audio::{frame_rms, ChunkState};
use crate::config::Config;
use crate::error::Result as TranscribeResult;

/// Average frame RMS of every sounding segment.
///
/// Frames are walked while they stay inside the RMS curve. Every frame whose id names a
/// non-rest segment adds its energy to that segment, so a segment split by masked frames
/// is still averaged over all of its frames. Returns one entry per segment, `None` for
/// rests and for segments that received no frame.
pub fn extract_note_volumes(
    rms: &[f32],
    segment_ids: &[usize],
    segment_is_rest: &[bool],
) -> Vec<Option<f32>> {
    let mut totals = vec![(0.0f32, 0usize); segment_is_rest.len()];

    for (&id, &energy) in segment_ids.iter().zip(rms) {
        if id == 0 || id > segment_is_rest.len() || segment_is_rest[id - 1] {
            continue;
        }
        let (sum, count) = &mut totals[id - 1];
        *sum += energy;
        *count += 1;
    }

    totals
        .into_iter()
        .map(|(sum, count)| (count > 0).then(|| sum / count as f32))
        .collect()
}

/// Min-max normalize to [0, 1]; a constant sequence maps to 0.5
pub fn normalize_volumes(volumes: &mut [f32]) {
    if volumes.is_empty() {
        return;
    }

    let min = volumes.iter().copied().fold(f32::INFINITY, f32::min);
    let max = volumes.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > min {
        let span = max - min;
        for v in volumes.iter_mut() {
            *v = (*v - min) / span;
        }
    } else {
        volumes.fill(0.5);
    }
}

/// Attach normalized loudness to a chunk's sounding segments when enabled
pub fn run(state: &mut ChunkState, config: &Config) -> TranscribeResult<()> {
    if !config.velocity.enabled {
        return Ok(());
    }
    let Some(waveform) = state.waveform.as_deref() else {
        log::warn!(
            "chunk {}: velocity enabled but no waveform available, using default velocity",
            state.index
        );
        return Ok(());
    };

    let rms = frame_rms(waveform, config.audio.win_size, config.audio.hop_size);
    let segment_is_rest: Vec<bool> = state.segments.iter().map(|s| !s.valid).collect();
    let mut volumes = extract_note_volumes(&rms, &state.segment_ids, &segment_is_rest);

    let mut measured: Vec<f32> = volumes.iter().flatten().copied().collect();
    normalize_volumes(&mut measured);
    let mut normalized = measured.into_iter();
    for volume in volumes.iter_mut().filter(|v| v.is_some()) {
        *volume = normalized.next();
    }

    log::debug!(
        "chunk {}: volumes for {} notes",
        state.index,
        volumes.iter().flatten().count()
    );
    state.volumes = volumes;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_are_averaged_per_segment() {
        let rms = [0.2, 0.4, 0.1, 0.1, 0.9, 0.5];
        let ids = [1, 1, 2, 2, 3, 3];
        let rests = [false, true, false];
        let volumes = extract_note_volumes(&rms, &ids, &rests);
        assert_eq!(volumes.len(), 3);
        assert!((volumes[0].unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(volumes[1], None);
        assert!((volumes[2].unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_frames_past_rms_are_ignored() {
        let volumes = extract_note_volumes(&[0.5], &[1, 2, 2], &[false, false]);
        assert_eq!(volumes, vec![Some(0.5), None]);
    }

    #[test]
    fn test_masked_gap_keeps_both_runs() {
        let volumes = extract_note_volumes(&[1.0, 1.0, 0.0, 0.2], &[1, 1, 0, 1], &[false]);
        assert!((volumes[0].unwrap() - 2.2 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_constant() {
        let mut volumes = vec![0.3, 0.3, 0.3];
        normalize_volumes(&mut volumes);
        assert_eq!(volumes, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_normalize_range() {
        let mut volumes = vec![0.2, 0.6, 1.0];
        normalize_volumes(&mut volumes);
        assert_eq!(volumes[0], 0.0);
        assert!((volumes[1] - 0.5).abs() < 1e-6);
        assert_eq!(volumes[2], 1.0);
    }
}
