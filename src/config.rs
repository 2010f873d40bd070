//! Configuration system for the vocal-to-MIDI transcriber

use crate::error::{Result as TranscribeResult, TranscribeError};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub audio: AudioConfig,
    pub compressor: CompressorConfig,
    pub decode: DecodeConfig,
    pub velocity: VelocityConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            audio: AudioConfig::default(),
            compressor: CompressorConfig::default(),
            decode: DecodeConfig::default(),
            velocity: VelocityConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Frame layout of the acoustic model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub hop_size: usize,
    pub win_size: usize,
}

impl AudioConfig {
    /// Duration of one model frame in seconds
    pub fn timestep(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            hop_size: 512,
            win_size: 2048,
        }
    }
}

/// Envelope-following compressor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    pub enabled: bool,
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_sec: f32,
    pub release_sec: f32,
    pub makeup_gain_db: f32,
}

impl CompressorConfig {
    /// Gentler preset tuned for sung vocals
    pub fn vocal() -> Self {
        Self {
            enabled: true,
            threshold_db: -28.0,
            ratio: 2.0,
            attack_sec: 0.015,
            release_sec: 0.15,
            makeup_gain_db: 4.0,
        }
    }
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_db: -20.0,
            ratio: 4.0,
            attack_sec: 0.005,
            release_sec: 0.05,
            makeup_gain_db: 0.0,
        }
    }
}

/// Pitch decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// MIDI value of the first probability bin
    pub midi_min: f32,
    /// MIDI value of the last probability bin
    pub midi_max: f32,
    /// Standard deviation of the gaussian blur the model was trained with, in semitones
    pub deviation: f32,
    /// Peak probability below which a frame is a rest
    pub rest_threshold: f32,
    /// Minimum ratio of voiced frames for a segment to become a sounding note
    pub note_threshold: f32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            midi_min: 0.0,
            midi_max: 127.0,
            deviation: 1.0,
            rest_threshold: 0.1,
            note_threshold: 0.5,
        }
    }
}

/// Volume-to-velocity shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub enabled: bool,
    pub center: u8,
    pub strength: f32,
    pub default_velocity: u8,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            center: 64,
            strength: 0.35,
            default_velocity: 64,
        }
    }
}

/// MIDI export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub tempo_bpm: f64,
    pub ticks_per_beat: u16,
    pub channel: u8,
}

impl ExportConfig {
    /// Ticks per second of audio, `tempo * 8` at the default resolution
    pub fn ticks_per_second(&self) -> f64 {
        self.tempo_bpm * (self.ticks_per_beat as f64 / 60.0)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: 120.0,
            ticks_per_beat: 480,
            channel: 0,
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> TranscribeResult<()> {
    let audio = &config.audio;
    if !(8000..=192000).contains(&audio.sample_rate) {
        return Err(TranscribeError::UnsupportedSampleRate(audio.sample_rate));
    }
    if audio.hop_size == 0 {
        return Err(invalid("audio.hop_size must be > 0"));
    }
    if audio.win_size == 0 {
        return Err(invalid("audio.win_size must be > 0"));
    }

    validate_compressor(&config.compressor)?;

    let decode = &config.decode;
    if !(decode.midi_max - decode.midi_min).is_finite() {
        return Err(invalid(format!(
            "decode.midi_min ({}) and decode.midi_max ({}) must span a finite range",
            decode.midi_min, decode.midi_max
        )));
    }
    if !(decode.midi_max > decode.midi_min) {
        return Err(invalid(format!(
            "decode.midi_max ({}) must be > decode.midi_min ({})",
            decode.midi_max, decode.midi_min
        )));
    }
    if !(decode.deviation > 0.0) || !decode.deviation.is_finite() {
        return Err(invalid(format!(
            "decode.deviation must be finite and > 0, got {}",
            decode.deviation
        )));
    }
    if !(0.0..=1.0).contains(&decode.rest_threshold) {
        return Err(invalid("decode.rest_threshold must be within [0, 1]"));
    }
    if !(0.0..=1.0).contains(&decode.note_threshold) {
        return Err(invalid("decode.note_threshold must be within [0, 1]"));
    }

    let velocity = &config.velocity;
    if !(0.0..=1.0).contains(&velocity.strength) {
        return Err(invalid("velocity.strength must be within [0, 1]"));
    }
    if !(1..=127).contains(&velocity.center) || !(1..=127).contains(&velocity.default_velocity) {
        return Err(invalid("velocity.center and velocity.default_velocity must be within [1, 127]"));
    }

    let export = &config.export;
    if !(export.tempo_bpm > 0.0) || !export.tempo_bpm.is_finite() {
        return Err(invalid(format!(
            "export.tempo_bpm must be > 0, got {}",
            export.tempo_bpm
        )));
    }
    if export.ticks_per_beat == 0 || export.ticks_per_beat > 0x7fff {
        return Err(invalid("export.ticks_per_beat must be within [1, 32767]"));
    }
    if export.channel > 15 {
        return Err(invalid("export.channel must be within [0, 15]"));
    }

    Ok(())
}

/// Validate compressor parameters on their own, used by the `compress` command
pub fn validate_compressor(compressor: &CompressorConfig) -> TranscribeResult<()> {
    if !(compressor.ratio >= 1.0) {
        return Err(invalid(format!(
            "compressor.ratio must be >= 1, got {}",
            compressor.ratio
        )));
    }
    if !(compressor.attack_sec > 0.0) || !(compressor.release_sec > 0.0) {
        return Err(invalid("compressor attack and release must be > 0 seconds"));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> TranscribeError {
    TranscribeError::InvalidConfigParameter(msg.into())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_default_tick_scale() {
        let export = ExportConfig::default();
        assert_eq!(export.ticks_per_second(), 960.0);
    }

    #[test]
    fn test_zero_deviation_rejected() {
        let mut config = Config::default();
        config.decode.deviation = 0.0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, TranscribeError::InvalidConfigParameter(_)));
    }

    #[test]
    fn test_non_finite_decode_parameters_rejected() {
        for deviation in [f32::INFINITY, f32::NAN] {
            let mut config = Config::default();
            config.decode.deviation = deviation;
            assert!(validate_config(&config).is_err());
        }

        let mut config = Config::default();
        config.decode.midi_min = f32::NEG_INFINITY;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.decode.midi_max = f32::INFINITY;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.decode.midi_min = -3e38;
        config.decode.midi_max = 3e38;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = Config::default();
        config.decode.midi_min = 80.0;
        config.decode.midi_max = 40.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "export": { "tempo_bpm": 90.0 } }"#).unwrap();
        assert_eq!(config.export.tempo_bpm, 90.0);
        assert_eq!(config.export.ticks_per_beat, 480);
        assert_eq!(config.audio.hop_size, 512);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocal2midi.json");
        let mut config = Config::default();
        config.velocity.enabled = true;
        config.export.tempo_bpm = 96.0;

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        assert!(loaded.velocity.enabled);
        assert_eq!(loaded.export.tempo_bpm, 96.0);
    }

    #[test]
    fn test_vocal_preset() {
        let vocal = CompressorConfig::vocal();
        assert_eq!(vocal.threshold_db, -28.0);
        assert_eq!(vocal.makeup_gain_db, 4.0);
        assert!(validate_compressor(&vocal).is_ok());
    }
}
