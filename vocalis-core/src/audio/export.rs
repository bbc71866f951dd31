//! Mono WAV export.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;

use super::AudioBuffer;
use crate::error::{Result, VocalisError};

/// Write `buffer` as a mono 32-bit float WAV file at its own sample rate.
///
/// Parent directories are created as needed. Float samples keep a
/// `load` → `export` → `load` round trip lossless at the same rate.
pub fn export(buffer: &AudioBuffer, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| VocalisError::Export(format!("create {}: {e}", path.display())))?;
    for &sample in &buffer.samples {
        writer
            .write_sample(sample)
            .map_err(|e| VocalisError::Export(format!("write {}: {e}", path.display())))?;
    }
    writer
        .finalize()
        .map_err(|e| VocalisError::Export(format!("finalize {}: {e}", path.display())))?;

    info!(
        path = %path.display(),
        sample_rate = buffer.sample_rate,
        seconds = buffer.duration_secs(),
        "wrote clip"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::load;
    use approx::assert_relative_eq;

    #[test]
    fn export_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clip.wav");
        let samples: Vec<f32> = (0..24_001)
            .map(|i| 0.3 * (i as f32 * 0.0731).sin())
            .collect();
        let original = AudioBuffer::new(samples, 24_000);

        export(&original, &path).unwrap();
        let loaded = load(&path, 24_000).unwrap();

        assert!((loaded.len() as isize - original.len() as isize).abs() <= 1);
        assert_relative_eq!(loaded.rms(), original.rms(), max_relative = 0.01);
    }
}
