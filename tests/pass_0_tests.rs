//! Validation tests for input conditioning and Pass 0: Preflight

use ndarray::Array2;
use vocal2midi::audio::{compress, db_to_gain, peak_abs, ChunkState};
use vocal2midi::config::{CompressorConfig, Config};
use vocal2midi::error::TranscribeError;
use vocal2midi::model::FrameActivations;
use vocal2midi::passes::pass_0;

const SR: u32 = 44100;

/// Generate a steady test tone
fn generate_tone(n_samples: usize, amplitude: f32) -> Vec<f32> {
    (0..n_samples)
        .map(|i| (i as f32 * 0.05).sin() * amplitude)
        .collect()
}

fn chunk_with_bins(n_frames: usize, n_bins: usize, offset_sec: f64) -> ChunkState {
    let activations = FrameActivations::unmasked(
        Array2::from_elem((n_frames, n_bins), 0.5),
        vec![0.0; n_frames],
    )
    .unwrap();
    ChunkState::new(0, offset_sec, activations, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_stays_silent() {
        let silence = vec![0.0f32; 4096];
        for params in [CompressorConfig::default(), CompressorConfig::vocal()] {
            let out = compress(&silence, SR, &params);
            assert_eq!(out.len(), silence.len());
            assert!(out.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(compress(&[], SR, &CompressorConfig::default()).is_empty());
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let params = CompressorConfig::default();
        let input = vec![0.9f32; 2048];
        let out = compress(&input, SR, &params);

        // The envelope never drops below the instantaneous level, so every sample after
        // the first is reduced by at least (level - threshold) * (1 - 1/ratio).
        let level = 20.0 * 0.9f64.log10();
        let min_reduction = (level - params.threshold_db as f64) * (1.0 - 1.0 / params.ratio as f64);
        let ceiling = 0.9 * db_to_gain(-min_reduction) as f32;
        for &x in &out[1..] {
            assert!(x <= ceiling * 1.0001, "{} exceeds {}", x, ceiling);
        }
        assert!((out[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_quiet_signal_passes_once_envelope_settles() {
        let params = CompressorConfig::default();
        let input = generate_tone(8192, 0.001);
        let out = compress(&input, SR, &params);
        for i in 4096..input.len() {
            assert!((out[i] - input[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_makeup_overshoot_is_normalized_once() {
        let params = CompressorConfig {
            enabled: true,
            threshold_db: -20.0,
            ratio: 1.0,
            attack_sec: 0.005,
            release_sec: 0.05,
            makeup_gain_db: 6.0,
        };
        let input = vec![0.9f32; 512];
        let out = compress(&input, SR, &params);
        assert!((peak_abs(&out) - 1.0).abs() < 1e-6);
        assert!(out.iter().all(|&x| (x - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_preflight_rejects_single_bin() {
        let mut state = chunk_with_bins(4, 1, 0.0);
        let err = pass_0::run(&mut state, &Config::default()).unwrap_err();
        assert!(matches!(err, TranscribeError::InvalidConfigParameter(_)));
    }

    #[test]
    fn test_preflight_rejects_negative_offset() {
        let mut state = chunk_with_bins(4, 8, -1.0);
        assert!(pass_0::run(&mut state, &Config::default()).is_err());
    }

    #[test]
    fn test_preflight_accepts_empty_chunk() {
        let mut state = chunk_with_bins(0, 0, 0.0);
        assert!(pass_0::run(&mut state, &Config::default()).is_ok());
    }
}
