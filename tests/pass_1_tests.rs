//! Tests for Pass 1: Boundary-to-Segment Decoding

use ndarray::Array2;
use vocal2midi::audio::ChunkState;
use vocal2midi::config::Config;
use vocal2midi::model::FrameActivations;
use vocal2midi::passes::pass_1;

fn chunk(bounds: Vec<f32>, masks: Vec<bool>) -> ChunkState {
    let n = bounds.len();
    let activations = FrameActivations::new(Array2::zeros((n, 8)), bounds, masks).unwrap();
    ChunkState::new(0, 0.0, activations, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_non_decreasing_for_noisy_input() {
        for _ in 0..50 {
            let len = 1 + rand::random::<usize>() % 200;
            let bounds: Vec<f32> = (0..len).map(|_| rand::random::<f32>()).collect();
            let ids = pass_1::decode_segment_ids(&bounds);

            assert_eq!(ids.len(), bounds.len());
            assert!(ids[0] == 0 || ids[0] == 1);
            for w in ids.windows(2) {
                assert!(w[1] >= w[0]);
                assert!(w[1] - w[0] <= 1);
            }
        }
    }

    #[test]
    fn test_soft_boundaries_split_like_hard_ones() {
        let hard = pass_1::decode_segment_ids(&[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let soft = pass_1::decode_segment_ids(&[0.9, 0.05, 0.0, 0.8, 0.1, 0.05]);
        assert_eq!(hard, soft);
    }

    #[test]
    fn test_masked_frames_leave_segments() {
        let mut state = chunk(
            vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            vec![true, true, true, true, false, false],
        );
        pass_1::run(&mut state, &Config::default()).unwrap();
        assert_eq!(state.segment_ids, vec![1, 1, 1, 2, 0, 0]);
    }

    #[test]
    fn test_masked_boundary_does_not_count() {
        // The boundary at frame 2 is masked out, so frame 3 stays in segment 1.
        let mut state = chunk(
            vec![1.0, 0.0, 1.0, 0.0],
            vec![true, true, false, true],
        );
        pass_1::run(&mut state, &Config::default()).unwrap();
        assert_eq!(state.segment_ids, vec![1, 1, 0, 1]);
    }

    #[test]
    fn test_empty_chunk() {
        let mut state = chunk(vec![], vec![]);
        pass_1::run(&mut state, &Config::default()).unwrap();
        assert!(state.segment_ids.is_empty());
    }
}
