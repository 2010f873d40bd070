//! MIDI timeline synthesis and export

use crate::analysis::DecodedChunk;
use crate::config::{Config, ExportConfig, VelocityConfig};
use crate::error::{Result as TranscribeResult, TranscribeError};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;

/// Largest delta time a MIDI variable-length quantity can hold
const MAX_DELTA: u64 = (1 << 28) - 1;

/// A sounding note placed on the merged timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub start_tick: u64,
    pub end_tick: u64,
    pub key: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn duration_ticks(&self) -> u64 {
        self.end_tick - self.start_tick
    }
}

/// Convert seconds to ticks at the configured tempo
pub fn seconds_to_ticks(seconds: f64, export: &ExportConfig) -> u64 {
    (seconds * export.ticks_per_second()).round_ties_even().max(0.0) as u64
}

/// Map a normalized volume to a raw MIDI velocity
pub fn volume_to_velocity(volume: f32) -> u8 {
    (volume as f64 * 127.0).round_ties_even().clamp(1.0, 127.0) as u8
}

/// Pull a velocity toward `center`; `strength` 0 keeps it, 1 replaces it
pub fn adjust_velocity_to_center(velocity: u8, center: u8, strength: f32) -> u8 {
    let strength = strength as f64;
    let adjusted = velocity as f64 * (1.0 - strength) + center as f64 * strength;
    adjusted.round_ties_even().clamp(1.0, 127.0) as u8
}

fn check_offsets(chunks: &[DecodedChunk]) -> TranscribeResult<()> {
    for (i, chunk) in chunks.iter().enumerate() {
        if !chunk.offset_sec.is_finite() || chunk.offset_sec < 0.0 {
            return Err(TranscribeError::ConfigValidationFailed(format!(
                "chunk {} has invalid offset {}",
                i, chunk.offset_sec
            )));
        }
        if i > 0 && chunk.offset_sec < chunks[i - 1].offset_sec {
            return Err(TranscribeError::ConfigValidationFailed(format!(
                "chunk offsets must be non-decreasing: chunk {} starts at {}s before chunk {} at {}s",
                i,
                chunk.offset_sec,
                i - 1,
                chunks[i - 1].offset_sec
            )));
        }
    }
    Ok(())
}

/// Lay out the notes of every chunk on one monophonic tick timeline.
///
/// Each chunk starts exactly at its own offset. A note running past the next chunk's
/// offset is cut at that offset, and notes left with no length are dropped. Rests emit
/// nothing but still move the cursor.
pub fn synthesize(
    chunks: &[DecodedChunk],
    export: &ExportConfig,
    velocity: &VelocityConfig,
) -> TranscribeResult<Vec<NoteEvent>> {
    check_offsets(chunks)?;

    let offsets: Vec<u64> = chunks
        .iter()
        .map(|c| seconds_to_ticks(c.offset_sec, export))
        .collect();

    let mut events = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let next_offset = offsets.get(i + 1).copied();
        let mut start = offsets[i];
        let mut elapsed_sec = 0.0f64;
        let mut elapsed_ticks = 0u64;

        for (j, note) in chunk.notes.iter().enumerate() {
            if !note.duration_sec.is_finite() || note.duration_sec < 0.0 {
                return Err(TranscribeError::InputValidationError(format!(
                    "chunk {} note {} has invalid duration {}",
                    i, j, note.duration_sec
                )));
            }

            // Tick lengths come from the rounded cumulative time, so rounding never drifts.
            elapsed_sec += note.duration_sec;
            let cumulative = seconds_to_ticks(elapsed_sec, export);
            let length = cumulative.saturating_sub(elapsed_ticks);
            elapsed_ticks = cumulative;

            let mut end = start + length;
            if let Some(next) = next_offset {
                end = end.min(next);
            }

            if start < end && !note.is_rest {
                let raw = note
                    .volume
                    .map(volume_to_velocity)
                    .unwrap_or(velocity.default_velocity);
                events.push(NoteEvent {
                    start_tick: start,
                    end_tick: end,
                    key: note.pitch.round_ties_even().clamp(0.0, 127.0) as u8,
                    velocity: adjust_velocity_to_center(raw, velocity.center, velocity.strength),
                });
            }
            start = end;
        }
    }

    log::debug!("Synthesized {} note events from {} chunks", events.len(), chunks.len());
    Ok(events)
}

fn delta(ticks: u64) -> TranscribeResult<u28> {
    if ticks > MAX_DELTA {
        return Err(TranscribeError::MidiExportError(format!(
            "delta of {} ticks exceeds the MIDI limit",
            ticks
        )));
    }
    Ok(u28::from(ticks as u32))
}

/// Build a single-track MIDI file from timeline events
pub fn build_smf(events: &[NoteEvent], export: &ExportConfig) -> TranscribeResult<Smf<'static>> {
    let tempo_uspq = (60_000_000.0 / export.tempo_bpm).round();
    if !(1.0..=16_777_215.0).contains(&tempo_uspq) {
        return Err(TranscribeError::MidiExportError(format!(
            "tempo {} BPM cannot be encoded",
            export.tempo_bpm
        )));
    }

    let channel = u4::from(export.channel);
    let mut track_events = Vec::with_capacity(events.len() * 2 + 2);
    track_events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo_uspq as u32))),
    });

    let mut last_tick = 0u64;
    for event in events {
        if event.start_tick < last_tick || event.end_tick < event.start_tick {
            return Err(TranscribeError::MidiExportError(format!(
                "overlapping note at tick {}",
                event.start_tick
            )));
        }
        let key = u7::from(event.key.min(127));

        track_events.push(TrackEvent {
            delta: delta(event.start_tick - last_tick)?,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::from(event.velocity.clamp(1, 127)),
                },
            },
        });
        track_events.push(TrackEvent {
            delta: delta(event.duration_ticks())?,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::from(0),
                },
            },
        });
        last_tick = event.end_tick;
    }

    track_events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    Ok(Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::from(export.ticks_per_beat)),
        },
        tracks: vec![track_events],
    })
}

/// Synthesize decoded chunks into MIDI file bytes
pub fn render_midi(chunks: &[DecodedChunk], config: &Config) -> TranscribeResult<Vec<u8>> {
    let events = synthesize(chunks, &config.export, &config.velocity)?;
    let smf = build_smf(&events, &config.export)?;

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| TranscribeError::MidiExportError(format!("Failed to write MIDI data: {:?}", e)))?;
    Ok(bytes)
}

/// Write decoded chunks to a MIDI file
pub fn export_midi(chunks: &[DecodedChunk], path: &Path, config: &Config) -> TranscribeResult<()> {
    if chunks.iter().all(|c| c.sounding_notes().next().is_none()) {
        log::warn!("No sounding notes to export, writing an empty track");
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let bytes = render_midi(chunks, config)?;
    std::fs::write(path, bytes)?;

    log::info!("Exported MIDI to {}", path.display());
    Ok(())
}
