//! Vocal-to-MIDI Note Decoding
//!
//! Turns frame-level acoustic model outputs (pitch probabilities and boundary
//! activations) into quantized notes and assembles independently decoded chunks
//! into a single MIDI timeline.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod model;
pub mod passes;

pub use analysis::{DecodedChunk, Note};
pub use audio::{AudioChunk, ChunkState};
pub use config::Config;
pub use error::{Result as TranscribeResult, TranscribeError};
pub use model::{AcousticModel, ChunkInput, FrameActivations};

use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Main decode pipeline from model activations to MIDI
pub struct Transcriber {
    config: Config,
}

impl Transcriber {
    /// Create a new transcriber, rejecting invalid configurations
    pub fn new(config: Config) -> TranscribeResult<Self> {
        config::validate_config(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply the input compressor when enabled, otherwise return the samples unchanged
    pub fn condition_input(&self, samples: &[f32]) -> Vec<f32> {
        if !self.config.compressor.enabled {
            return samples.to_vec();
        }
        log::info!(
            "Compressing input: threshold {} dB, ratio {}:1",
            self.config.compressor.threshold_db,
            self.config.compressor.ratio
        );
        audio::compress(samples, self.config.audio.sample_rate, &self.config.compressor)
    }

    /// Decode one chunk's activations into notes
    pub fn decode_chunk(&self, index: usize, input: ChunkInput) -> TranscribeResult<DecodedChunk> {
        let mut state = ChunkState::new(index, input.offset_sec, input.activations, input.waveform);
        self.run_pipeline(&mut state)?;
        Ok(state.into_decoded(&self.config))
    }

    /// Decode chunks independently, preserving their order
    pub fn decode_chunks(&self, inputs: Vec<ChunkInput>) -> TranscribeResult<Vec<DecodedChunk>> {
        log::info!("Decoding {} chunks", inputs.len());

        #[cfg(feature = "parallel")]
        let decoded = inputs
            .into_par_iter()
            .enumerate()
            .map(|(index, input)| self.decode_chunk(index, input))
            .collect::<TranscribeResult<Vec<_>>>();

        #[cfg(not(feature = "parallel"))]
        let decoded = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| self.decode_chunk(index, input))
            .collect::<TranscribeResult<Vec<_>>>();

        decoded
    }

    /// Run the acoustic model over every chunk, then decode the results
    pub fn infer_chunks<M: AcousticModel + ?Sized>(
        &self,
        chunks: Vec<AudioChunk>,
        model: &M,
    ) -> TranscribeResult<Vec<DecodedChunk>> {
        let keep_waveform = self.config.velocity.enabled;
        let inputs = chunks
            .into_iter()
            .map(|chunk| {
                let activations = model.infer(&chunk.samples)?;
                Ok(ChunkInput {
                    offset_sec: chunk.offset_sec,
                    activations,
                    waveform: keep_waveform.then_some(chunk.samples),
                })
            })
            .collect::<TranscribeResult<Vec<_>>>()?;
        self.decode_chunks(inputs)
    }

    /// Synthesize decoded chunks into MIDI file bytes
    pub fn render_midi(&self, chunks: &[DecodedChunk]) -> TranscribeResult<Vec<u8>> {
        midi::render_midi(chunks, &self.config)
    }

    /// Synthesize decoded chunks and write them to a MIDI file
    pub fn export_midi<P: AsRef<Path>>(
        &self,
        chunks: &[DecodedChunk],
        output_path: P,
    ) -> TranscribeResult<()> {
        midi::export_midi(chunks, output_path.as_ref(), &self.config)
    }

    /// Execute the per-chunk decoding passes
    fn run_pipeline(&self, state: &mut ChunkState) -> TranscribeResult<()> {
        // Pass 0: Preflight checks
        passes::pass_0::run(state, &self.config)?;

        // Pass 1: Boundary-to-segment decoding
        passes::pass_1::run(state, &self.config)?;

        // Pass 2: Blurred-probability value decoding
        passes::pass_2::run(state, &self.config)?;

        // Pass 3: Segment aggregation
        passes::pass_3::run(state, &self.config)?;

        // Pass 4: Note volume extraction
        passes::pass_4::run(state, &self.config)?;

        Ok(())
    }
}

/// Validate configuration and an optional input recording
pub fn validate_input<P: AsRef<Path>>(
    input_path: Option<P>,
    config: &Config,
) -> TranscribeResult<()> {
    if let Some(path) = input_path {
        audio::validate_audio_file(path)?;
    }
    config::validate_config(config)?;
    Ok(())
}
