//! Pass 2: Blurred-Probability Value Decoding

use crate::audio::ChunkState;
use crate::config::{Config, DecodeConfig};
use crate::error::{Result as TranscribeResult, TranscribeError};
use ndarray::{ArrayView1, ArrayView2};

/// Value range and confidence settings of a quantized distribution
#[derive(Debug, Clone, Copy)]
pub struct ValueRange {
    pub vmin: f32,
    pub vmax: f32,
    /// Blur deviation in value units
    pub deviation: f32,
    /// Peak probability below which a frame is a rest
    pub threshold: f32,
}

impl ValueRange {
    /// Reject ranges that would make the bin geometry meaningless
    pub fn validate(&self) -> TranscribeResult<()> {
        if !(self.deviation > 0.0) || !self.deviation.is_finite() {
            return Err(TranscribeError::InvalidConfigParameter(format!(
                "value decoding needs a positive finite deviation, got {}",
                self.deviation
            )));
        }
        if !(self.vmax > self.vmin) || !(self.vmax - self.vmin).is_finite() {
            return Err(TranscribeError::InvalidConfigParameter(format!(
                "value range [{}, {}] must be finite and non-empty",
                self.vmin, self.vmax
            )));
        }
        Ok(())
    }
}

impl From<&DecodeConfig> for ValueRange {
    fn from(decode: &DecodeConfig) -> Self {
        Self {
            vmin: decode.midi_min,
            vmax: decode.midi_max,
            deviation: decode.deviation,
            threshold: decode.rest_threshold,
        }
    }
}

/// Bin geometry derived from a `ValueRange` and a bin count
#[derive(Debug, Clone, Copy)]
struct BinLayout {
    vmin: f32,
    interval: f32,
    width: usize,
    n_bins: usize,
}

impl BinLayout {
    fn new(range: &ValueRange, n_bins: usize) -> TranscribeResult<Self> {
        if n_bins < 2 {
            return Err(TranscribeError::InvalidConfigParameter(format!(
                "value decoding needs at least 2 bins, got {}",
                n_bins
            )));
        }

        let interval = (range.vmax - range.vmin) / (n_bins - 1) as f32;
        // A window wider than the distribution covers every bin.
        let width = (3.0 * range.deviation / interval)
            .round_ties_even()
            .min(n_bins as f32) as usize;
        Ok(Self {
            vmin: range.vmin,
            interval,
            width,
            n_bins,
        })
    }

    fn value_of(&self, bin: usize) -> f32 {
        bin as f32 * self.interval + self.vmin
    }

    /// Probability-weighted value inside +-3 deviations of the peak bin
    fn decode_frame(&self, probs: ArrayView1<f32>) -> (f32, f32) {
        let mut center = 0;
        let mut peak = f32::NEG_INFINITY;
        for (bin, &p) in probs.iter().enumerate() {
            if p > peak {
                peak = p;
                center = bin;
            }
        }

        let start = center.saturating_sub(self.width);
        let end = center.saturating_add(self.width + 1).min(self.n_bins);
        let mut product_sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        for bin in start..end {
            let p = probs[bin];
            product_sum += p * self.value_of(bin);
            weight_sum += p;
        }

        let divisor = if weight_sum == 0.0 { 1.0 } else { weight_sum };
        (product_sum / divisor, peak)
    }
}

/// Decode a continuous value and a rest flag for every frame of `probs` (`[frames, bins]`).
///
/// Only bins near the most probable one contribute to the average, so secondary modes
/// far from the peak do not drag the estimate. A window with no probability mass decodes
/// to 0.
pub fn decode_blurred_probs(
    probs: ArrayView2<f32>,
    range: &ValueRange,
) -> TranscribeResult<(Vec<f32>, Vec<bool>)> {
    range.validate()?;
    let n_frames = probs.nrows();
    if n_frames == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let layout = BinLayout::new(range, probs.ncols())?;
    let mut values = Vec::with_capacity(n_frames);
    let mut rests = Vec::with_capacity(n_frames);
    for row in probs.rows() {
        let (value, peak) = layout.decode_frame(row);
        values.push(value);
        rests.push(peak < range.threshold);
    }

    Ok((values, rests))
}

/// Decode per-frame pitch and rest flags for a chunk
pub fn run(state: &mut ChunkState, config: &Config) -> TranscribeResult<()> {
    let activations = &state.activations;
    let mut probs = activations.probs.clone();
    for (mut row, &valid) in probs.rows_mut().into_iter().zip(&activations.masks) {
        if !valid {
            row.fill(0.0);
        }
    }

    let range = ValueRange::from(&config.decode);
    let (values, rests) = decode_blurred_probs(probs.view(), &range)?;

    log::debug!(
        "chunk {}: {} of {} frames below rest threshold",
        state.index,
        rests.iter().filter(|&&r| r).count(),
        rests.len()
    );
    state.frame_values = values;
    state.frame_rests = rests;
    Ok(())
}
