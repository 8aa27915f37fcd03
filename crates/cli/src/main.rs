//! Stretchband command line.
//!
//! Decodes an audio file, streams it through the time-stretch stage in fixed
//! size chunks and writes the result as raw little-endian f32 interleaved
//! samples.
//!
//! Usage:
//!   stretchband <input> <output.f32> [--time-ratio R] [--pitch-scale P]
//!               [--chunk-frames N] [--config F] [--verbose]

mod decode;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use stretchband_core::{
    AudioChunk, FlowError, FnSink, StageSettings, StageStats, StreamFormat, StreamStage,
};
use stretchband_stretch::{DelayFactory, EngineFactory, SoundTouchFactory, StreamProcessor};

use crate::decode::DecodedAudio;

/// Stream an audio file through a real-time time-stretch / pitch-shift stage.
#[derive(Parser, Debug)]
#[command(name = "stretchband")]
#[command(about = "Streaming time-stretch and pitch-shift")]
struct Args {
    /// Audio file to read (mp3, wav, aiff, flac)
    input: PathBuf,

    /// Raw little-endian f32 interleaved output file
    output: PathBuf,

    /// Output duration / input duration (2.0 = half speed)
    #[arg(long)]
    time_ratio: Option<f64>,

    /// Pitch multiplier (2.0 = up one octave)
    #[arg(long)]
    pitch_scale: Option<f64>,

    /// Frames per chunk pushed into the stage
    #[arg(long, default_value = "1024")]
    chunk_frames: usize,

    /// JSON settings file, overridden by explicit flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to this file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Time-stretch engine
    #[arg(long, value_enum, default_value_t = EngineKind::SoundTouch)]
    engine: EngineKind,

    /// Log per-chunk diagnostics at info level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// SoundTouch WSOLA
    #[value(name = "soundtouch")]
    SoundTouch,
    /// Unity delay line, no stretching
    Bypass,
}

/// Defaults, then the config file, then explicit flags.
fn layered_settings(args: &Args) -> anyhow::Result<StageSettings> {
    let mut settings = match &args.config {
        Some(path) => StageSettings::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StageSettings::default(),
    };

    if let Some(ratio) = args.time_ratio {
        settings.time_ratio = ratio;
    }
    if let Some(scale) = args.pitch_scale {
        settings.pitch_scale = scale;
    }
    if args.verbose {
        settings.verbose = true;
    }

    settings.validate()?;
    Ok(settings)
}

fn write_chunk<W: Write>(writer: &mut W, chunk: &AudioChunk) -> std::io::Result<()> {
    for sample in chunk.samples() {
        writer.write_all(&sample.to_le_bytes())?;
    }
    Ok(())
}

fn run<F: EngineFactory>(
    factory: F,
    settings: &StageSettings,
    audio: &DecodedAudio,
    args: &Args,
) -> anyhow::Result<StageStats> {
    let format = StreamFormat::interleaved(audio.sample_rate, audio.channels);
    let mut stage = StreamProcessor::new(factory, settings);
    stage
        .on_format_change(format)
        .with_context(|| format!("Failed to negotiate {}", format))?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut sink = FnSink(|chunk: AudioChunk| {
        write_chunk(&mut writer, &chunk).map_err(|e| FlowError::Rejected(e.to_string()))
    });

    let chunk_samples = args.chunk_frames.max(1) * audio.channels;
    for samples in audio.samples.chunks(chunk_samples) {
        stage.on_chunk(AudioChunk::new(samples.to_vec(), audio.channels), &mut sink)?;
    }
    stage.on_end_of_stream(&mut sink)?;
    drop(sink);

    writer.flush().context("Failed to flush output")?;
    Ok(stage.stats().clone())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = layered_settings(&args)?;

    if let Some(path) = &args.save_config {
        settings
            .save(path)
            .with_context(|| format!("Failed to save config {}", path.display()))?;
        log::info!("Saved settings to {}", path.display());
    }

    let audio = decode::load_interleaved(&args.input)
        .with_context(|| format!("Failed to decode {}", args.input.display()))?;
    log::info!(
        "Decoded {}: {} Hz, {} ch, {:.2} s",
        args.input.display(),
        audio.sample_rate,
        audio.channels,
        audio.duration_secs()
    );

    let stats = match args.engine {
        EngineKind::SoundTouch => run(SoundTouchFactory::default(), &settings, &audio, &args)?,
        EngineKind::Bypass => run(DelayFactory::default(), &settings, &audio, &args)?,
    };

    let out_secs = stats.frames_out as f64 / audio.sample_rate as f64;
    println!(
        "Wrote {} ({:.2} s -> {:.2} s, time ratio {}, pitch scale {})",
        args.output.display(),
        audio.duration_secs(),
        out_secs,
        settings.time_ratio,
        settings.pitch_scale
    );
    println!("{}", stats);
    Ok(())
}
