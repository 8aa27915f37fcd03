//! Audio file decoding into interleaved f32.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// A fully decoded file.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples in -1.0..1.0.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedAudio {
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Decode the first audio track of `path` into interleaved f32 samples.
pub fn load_interleaved<P: AsRef<Path>>(path: P) -> anyhow::Result<DecodedAudio> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("No audio track found"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.filter(|rate| *rate > 0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                match sample_rate {
                    None => sample_rate = Some(spec.rate),
                    Some(rate) if rate != spec.rate => log::warn!(
                        "Packet decoded at {} Hz in a {} Hz stream",
                        spec.rate,
                        rate
                    ),
                    Some(_) => {}
                }
                let decoded_channels = spec.channels.count();
                if channels == 0 {
                    channels = decoded_channels;
                }
                if decoded_channels != channels {
                    log::warn!(
                        "Skipping packet with {} channels in a {} channel stream",
                        decoded_channels,
                        channels
                    );
                    continue;
                }
                append_interleaved(&mut samples, &decoded);
            }
            Err(e) => {
                log::warn!("Error decoding: {}", e);
            }
        }
    }

    if channels == 0 {
        anyhow::bail!("Could not determine channel count of {}", path.display());
    }
    let sample_rate = sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| anyhow::anyhow!("Could not determine sample rate of {}", path.display()))?;

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Append a decoded buffer to `samples`, interleaving and normalising to f32.
fn append_interleaved(samples: &mut Vec<f32>, decoded: &AudioBufferRef) {
    match decoded {
        AudioBufferRef::F32(buf) => {
            push_frames(samples, buf.frames(), buf.spec().channels.count(), |ch, i| {
                buf.chan(ch)[i]
            })
        }
        AudioBufferRef::S16(buf) => {
            push_frames(samples, buf.frames(), buf.spec().channels.count(), |ch, i| {
                buf.chan(ch)[i] as f32 / 32768.0
            })
        }
        AudioBufferRef::S32(buf) => {
            push_frames(samples, buf.frames(), buf.spec().channels.count(), |ch, i| {
                buf.chan(ch)[i] as f32 / 2147483648.0
            })
        }
        AudioBufferRef::U8(buf) => {
            push_frames(samples, buf.frames(), buf.spec().channels.count(), |ch, i| {
                (buf.chan(ch)[i] as f32 - 128.0) / 128.0
            })
        }
        _ => log::warn!("Unsupported sample format, packet skipped"),
    }
}

fn push_frames<S>(samples: &mut Vec<f32>, frames: usize, channels: usize, sample: S)
where
    S: Fn(usize, usize) -> f32,
{
    samples.reserve(frames * channels);
    for frame in 0..frames {
        for ch in 0..channels {
            samples.push(sample(ch, frame));
        }
    }
}
