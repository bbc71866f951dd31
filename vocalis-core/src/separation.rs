//! Vocal isolation behind the [`VocalSeparator`] trait.
//!
//! The core never looks inside a separator; it only needs a decodable file
//! back. [`Passthrough`] skips separation entirely, [`CommandSeparator`] runs
//! an external tool such as Demucs.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, VocalisError};

pub trait VocalSeparator: Send + Sync {
    /// Produce an isolated-vocal file for `input`, writing any scratch files
    /// under `work_dir`. Returns the path of the vocal track.
    fn isolate_vocals(&self, input: &Path, work_dir: &Path) -> Result<PathBuf>;

    fn name(&self) -> &'static str;
}

/// Returns the input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl VocalSeparator for Passthrough {
    fn isolate_vocals(&self, input: &Path, _work_dir: &Path) -> Result<PathBuf> {
        Ok(input.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// External separation command.
///
/// `args` and `output` may contain `{input}`, `{output_dir}` and `{stem}`
/// (the input file name without extension). `output` names the file the
/// command is expected to leave behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSeparator {
    pub program: String,
    pub args: Vec<String>,
    pub output: String,
}

impl CommandSeparator {
    /// `python -m demucs --two-stems vocals`, reading
    /// `{output_dir}/htdemucs/{stem}/vocals.wav`.
    pub fn demucs() -> Self {
        Self {
            program: "python".into(),
            args: ["-m", "demucs", "--two-stems", "vocals", "-o", "{output_dir}", "{input}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output: "{output_dir}/htdemucs/{stem}/vocals.wav".into(),
        }
    }

    fn expand(template: &str, input: &Path, work_dir: &Path) -> String {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        template
            .replace("{input}", &input.to_string_lossy())
            .replace("{output_dir}", &work_dir.to_string_lossy())
            .replace("{stem}", &stem)
    }
}

impl VocalSeparator for CommandSeparator {
    fn isolate_vocals(&self, input: &Path, work_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(work_dir)?;
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| Self::expand(a, input, work_dir))
            .collect();
        debug!(program = %self.program, ?args, "running separator");

        let started = Instant::now();
        let out = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| VocalisError::Separation(format!("spawn {}: {e}", self.program)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(VocalisError::Separation(format!(
                "{} exited with {}: {tail}",
                self.program, out.status
            )));
        }

        let vocals = PathBuf::from(Self::expand(&self.output, input, work_dir));
        if !vocals.is_file() {
            return Err(VocalisError::Separation(format!(
                "expected output not found: {}",
                vocals.display()
            )));
        }
        info!(
            input = %input.display(),
            vocals = %vocals.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "vocals isolated"
        );
        Ok(vocals)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_input() {
        let p = Passthrough
            .isolate_vocals(Path::new("a/b.wav"), Path::new("/tmp"))
            .unwrap();
        assert_eq!(p, PathBuf::from("a/b.wav"));
    }

    #[test]
    fn placeholders_expand() {
        let s = CommandSeparator::expand(
            "{output_dir}/htdemucs/{stem}/vocals.wav",
            Path::new("/in/take 1.mp3"),
            Path::new("/work"),
        );
        assert_eq!(s, "/work/htdemucs/take 1/vocals.wav");
    }

    #[test]
    fn missing_program_is_a_separation_error() {
        let dir = tempfile::tempdir().unwrap();
        let sep = CommandSeparator {
            program: "vocalis-no-such-separator".into(),
            args: vec![],
            output: "{output_dir}/x.wav".into(),
        };
        let err = sep
            .isolate_vocals(Path::new("in.wav"), dir.path())
            .unwrap_err();
        assert!(matches!(err, VocalisError::Separation(_)), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn command_output_is_located() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("voice.wav");
        std::fs::write(&input, b"RIFF").unwrap();
        let sep = CommandSeparator {
            program: "cp".into(),
            args: vec!["{input}".into(), "{output_dir}/{stem}.vocals.wav".into()],
            output: "{output_dir}/{stem}.vocals.wav".into(),
        };
        let work = dir.path().join("work");
        let vocals = sep.isolate_vocals(&input, &work).unwrap();
        assert_eq!(vocals, work.join("voice.vocals.wav"));
        assert!(vocals.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn missing_output_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sep = CommandSeparator {
            program: "true".into(),
            args: vec![],
            output: "{output_dir}/never.wav".into(),
        };
        let err = sep
            .isolate_vocals(Path::new("in.wav"), dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("never.wav"), "{err}");
    }
}
