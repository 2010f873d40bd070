//! Decoded note types and analysis export

use crate::error::Result as TranscribeResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Aggregated statistics for one decoded segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// Local average of the frame values around the histogram mode
    pub value: f32,
    /// Number of frames assigned to the segment
    pub frames: usize,
    /// Enough voiced frames to count as a sounding note
    pub valid: bool,
}

/// One decoded musical event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Continuous MIDI pitch, meaningless for rests
    pub pitch: f32,
    pub duration_sec: f64,
    pub is_rest: bool,
    /// Normalized loudness in [0, 1], when velocity extraction ran
    pub volume: Option<f32>,
}

impl Note {
    pub fn sounding(pitch: f32, duration_sec: f64) -> Self {
        Self {
            pitch,
            duration_sec,
            is_rest: false,
            volume: None,
        }
    }

    pub fn rest(duration_sec: f64) -> Self {
        Self {
            pitch: 0.0,
            duration_sec,
            is_rest: true,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Notes of one independently decoded chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedChunk {
    /// Start of the chunk within the full recording
    pub offset_sec: f64,
    pub notes: Vec<Note>,
}

impl DecodedChunk {
    pub fn new(offset_sec: f64, notes: Vec<Note>) -> Self {
        Self { offset_sec, notes }
    }

    /// Total duration covered by the chunk's notes
    pub fn duration_sec(&self) -> f64 {
        self.notes.iter().map(|n| n.duration_sec).sum()
    }

    pub fn sounding_notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| !n.is_rest)
    }
}

#[derive(Serialize)]
struct AnalysisReport<'a> {
    chunk_count: usize,
    note_count: usize,
    rest_count: usize,
    /// End of the last chunk's notes, in seconds
    duration_sec: f64,
    chunks: &'a [DecodedChunk],
}

/// Export decoded chunks as a JSON report
pub fn export_analysis(chunks: &[DecodedChunk], output_path: &Path) -> TranscribeResult<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let note_count = chunks.iter().map(|c| c.sounding_notes().count()).sum();
    let rest_count = chunks
        .iter()
        .map(|c| c.notes.iter().filter(|n| n.is_rest).count())
        .sum();
    let duration_sec = chunks
        .iter()
        .map(|c| c.offset_sec + c.duration_sec())
        .fold(0.0, f64::max);
    let report = AnalysisReport {
        chunk_count: chunks.len(),
        note_count,
        rest_count,
        duration_sec,
        chunks,
    };

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(output_path, json)?;

    log::info!(
        "Exported analysis of {} notes to {}",
        note_count,
        output_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_duration_includes_rests() {
        let chunk = DecodedChunk::new(
            1.0,
            vec![Note::sounding(60.0, 0.5), Note::rest(0.25), Note::sounding(62.0, 0.25)],
        );
        assert!((chunk.duration_sec() - 1.0).abs() < 1e-12);
        assert_eq!(chunk.sounding_notes().count(), 2);
    }

    #[test]
    fn test_export_analysis_writes_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        let chunks = vec![DecodedChunk::new(
            0.0,
            vec![Note::sounding(60.0, 0.5).with_volume(1.0), Note::rest(0.5)],
        )];

        export_analysis(&chunks, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["note_count"], 1);
        assert_eq!(value["rest_count"], 1);
        assert_eq!(value["duration_sec"], 1.0);
        assert_eq!(value["chunks"][0]["notes"][0]["volume"], 1.0);
    }
}
