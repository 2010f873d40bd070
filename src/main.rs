use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use std::path::PathBuf;
use vocal2midi::audio::{compress, load_audio_file, write_wav_file};
use vocal2midi::config::{self, CompressorConfig};
use vocal2midi::model::ActivationDump;
use vocal2midi::{analysis, validate_input, Config, Transcriber};

/// Vocal-to-MIDI note decoder
#[derive(Parser)]
#[command(name = "vocal2midi")]
#[command(about = "Decode acoustic model activations into a MIDI note sequence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Standard,
    Vocal,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a JSON dump of model activations into a MIDI file
    Transcribe {
        /// Activation dump (JSON)
        activations: PathBuf,

        /// Output MIDI file
        #[arg(short, long, default_value = "./output.mid")]
        output: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Source recording, used for note velocities
        #[arg(long)]
        wav: Option<PathBuf>,

        /// Tempo of the output MIDI in BPM
        #[arg(long)]
        tempo: Option<f64>,

        /// Derive velocities from note loudness
        #[arg(long)]
        velocity: bool,

        /// Also write the decoded notes as JSON
        #[arg(long)]
        notes_json: Option<PathBuf>,
    },
    /// Run the dynamics compressor over a WAV file
    Compress {
        input: PathBuf,
        output: PathBuf,

        /// Parameter preset, ignored when --config is given
        #[arg(long, value_enum, default_value = "vocal")]
        preset: Preset,

        /// Take compressor parameters from a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig {
        /// Write the defaults to a file instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }

    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Transcribe {
            activations,
            output,
            config,
            wav,
            tempo,
            velocity,
            notes_json,
        } => {
            let mut config = if let Some(config_path) = config {
                config::load_config(config_path)?
            } else {
                Config::default()
            };
            if let Some(tempo) = tempo {
                config.export.tempo_bpm = tempo;
            }
            if velocity {
                config.velocity.enabled = true;
            }

            validate_input(wav.as_ref(), &config)?;
            let transcriber = Transcriber::new(config)?;

            let recording = match &wav {
                Some(path) => {
                    let (samples, sr) = load_audio_file(path)?;
                    if sr != transcriber.config().audio.sample_rate {
                        anyhow::bail!(
                            "{} is sampled at {} Hz, model frames expect {} Hz",
                            path.display(),
                            sr,
                            transcriber.config().audio.sample_rate
                        );
                    }
                    Some(transcriber.condition_input(&samples))
                }
                None => None,
            };

            info!("Reading activations from {}...", activations.display());
            let dump = ActivationDump::load(&activations)?;
            let audio = &transcriber.config().audio;
            let inputs =
                dump.into_chunk_inputs(recording.as_deref(), audio.sample_rate, audio.hop_size)?;

            let chunks = transcriber.decode_chunks(inputs)?;
            transcriber.export_midi(&chunks, &output)?;

            if let Some(path) = notes_json {
                analysis::export_analysis(&chunks, &path)?;
            }
        }
        Commands::Compress {
            input,
            output,
            preset,
            config,
        } => {
            let params = match config {
                Some(path) => config::load_config(path)?.compressor,
                None => match preset {
                    Preset::Standard => CompressorConfig::default(),
                    Preset::Vocal => CompressorConfig::vocal(),
                },
            };
            config::validate_compressor(&params)?;

            let (samples, sr) = load_audio_file(&input)?;
            let compressed = compress(&samples, sr, &params);
            write_wav_file(&output, &compressed, sr)?;
            info!("Compressed audio saved to {}", output.display());
        }
        Commands::ValidateConfig { config } => {
            let config = config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig { output } => {
            let config = Config::default();
            match output {
                Some(path) => {
                    config::save_config(&config, &path)?;
                    info!("Default configuration saved to {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&config)?),
            }
        }
    }

    Ok(())
}
