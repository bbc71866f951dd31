//! File decoding into a mono [`AudioBuffer`].
//!
//! Symphonia probes the container first (WAV, FLAC, MP3, Ogg/Vorbis, AAC/MP4,
//! …). If it cannot parse the file, hound gets a second attempt as a plain
//! WAV reader. Multi-channel audio is averaged down to mono while decoding,
//! then the result is resampled to the requested rate.

use std::fs::File;
use std::path::Path;

use tracing::{debug, warn};

use super::{resample::resample, AudioBuffer};
use crate::error::{Result, VocalisError};

/// Raw decoder output before validation and resampling.
struct Decoded {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

/// Decode `path` into a mono buffer at `target_rate`.
///
/// # Errors
/// - `VocalisError::Decode` when the file is missing or no backend can parse it.
/// - `VocalisError::UnsupportedFormat` when the stream has no samples, no
///   channels or no sample rate.
pub fn load(path: impl AsRef<Path>, target_rate: u32) -> Result<AudioBuffer> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(VocalisError::decode(path, "file not found"));
    }

    let decoded = match decode_with_symphonia(path) {
        Ok(decoded) => decoded,
        Err(symphonia_err) => {
            debug!(?path, "symphonia failed ({symphonia_err}), trying WAV reader");
            decode_with_hound(path).map_err(|wav_err| {
                VocalisError::decode(
                    path,
                    format!("symphonia: {symphonia_err}; WAV fallback: {wav_err}"),
                )
            })?
        }
    };

    if decoded.channels == 0 {
        return Err(VocalisError::unsupported(path, "stream reports zero channels"));
    }
    if decoded.sample_rate == 0 {
        return Err(VocalisError::unsupported(path, "stream is missing a sample rate"));
    }
    if decoded.samples.is_empty() {
        return Err(VocalisError::unsupported(path, "decoded stream has zero samples"));
    }

    debug!(
        ?path,
        native_rate = decoded.sample_rate,
        channels = decoded.channels,
        frames = decoded.samples.len(),
        "decoded"
    );

    let native = AudioBuffer::new(decoded.samples, decoded.sample_rate);
    if native.sample_rate == target_rate {
        return Ok(native);
    }
    resample(&native, target_rate)
}

fn decode_with_symphonia(path: &Path) -> std::result::Result<Decoded, String> {
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;
    use symphonia::default::{get_codecs, get_probe};

    let file = File::open(path).map_err(|e| e.to_string())?;
    let media_source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            media_source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("probe failed: {e}"))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "no decodable audio track".to_string())?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("decoder init failed: {e}"))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err("stream format reset is not supported".into());
            }
            Err(err) => return Err(format!("reading packets: {err}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(?path, "skipping corrupt packet: {e}");
                continue;
            }
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(format!("decoding packet: {err}")),
        };

        if sample_rate == 0 {
            sample_rate = decoded.spec().rate;
        }
        let packet_channels = decoded.spec().channels.count();
        if channels == 0 {
            channels = packet_channels;
        }
        append_mono(decoded, packet_channels.max(1), &mut samples);
    }

    Ok(Decoded {
        samples,
        sample_rate,
        channels,
    })
}

/// Interleave a decoded packet and append its per-frame channel mean.
fn append_mono(
    decoded: symphonia::core::audio::AudioBufferRef<'_>,
    channels: usize,
    out: &mut Vec<f32>,
) {
    use symphonia::core::audio::SampleBuffer;

    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
    sample_buffer.copy_interleaved_ref(decoded);
    let data = sample_buffer.samples();

    if channels == 1 {
        out.extend_from_slice(data);
        return;
    }
    downmix_into(data, channels, out);
}

fn decode_with_hound(path: &Path) -> std::result::Result<Decoded, String> {
    let reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let bits = u32::from(spec.bits_per_sample.clamp(1, 32));
            let full_scale = (1u64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?
        }
    };

    let samples = if channels > 1 {
        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        downmix_into(&interleaved, channels, &mut mono);
        mono
    } else {
        interleaved
    };

    Ok(Decoded {
        samples,
        sample_rate: spec.sample_rate,
        channels,
    })
}

/// Average each interleaved frame of `channels` samples into one mono sample.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    for frame in interleaved.chunks(channels) {
        let sum: f32 = frame.iter().sum();
        out.push(sum / frame.len() as f32);
    }
}
