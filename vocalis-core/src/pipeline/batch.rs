//! Fixed-size worker pool over a list of source clips.
//!
//! Jobs go out over a crossbeam channel to `std::thread::scope` workers that
//! share one [`ClipPipeline`]. Each worker builds its own detector, since
//! detectors carry per-call state. One failing clip never stops the batch,
//! including a clip whose decoder or detector panics.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded};
use serde::Serialize;
use tracing::{error, info, info_span, warn};

use super::ClipPipeline;
use crate::error::Result;
use crate::record::{source_voice_id, VoiceProfile};
use crate::vad::SpeechDetector;

/// Outcome for one input file.
#[derive(Debug, Clone, Serialize)]
pub struct ClipReport {
    pub input: PathBuf,
    pub profile: Option<VoiceProfile>,
    pub error: Option<String>,
}

impl ClipReport {
    fn from_result(input: &Path, result: Result<VoiceProfile>) -> Self {
        match result {
            Ok(profile) => Self {
                input: input.to_path_buf(),
                profile: Some(profile),
                error: None,
            },
            Err(e) => Self {
                input: input.to_path_buf(),
                profile: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn failed(input: &Path, error: String) -> Self {
        Self {
            input: input.to_path_buf(),
            profile: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.profile.is_some()
    }
}

/// Every clip's outcome, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub clips: Vec<ClipReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.clips.iter().filter(|c| c.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.clips.len() - self.succeeded()
    }

    pub fn profiles(&self) -> Vec<VoiceProfile> {
        self.clips
            .iter()
            .filter_map(|c| c.profile.clone())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.clips
            .iter()
            .filter_map(|c| Some((c.input.as_path(), c.error.as_deref()?)))
    }
}

/// Process `inputs` into `out_dir` on up to `workers` threads.
///
/// `make_detector` runs once per worker. If it fails, every clip that worker
/// picks up is reported as failed with that error.
///
/// Output files are named by voice id, so an input whose id repeats an
/// earlier input's (`a/x.wav`, `b/x.mp3`) is reported as failed and never
/// processed.
pub fn run_batch<F>(
    pipeline: &ClipPipeline,
    inputs: &[PathBuf],
    out_dir: &Path,
    workers: usize,
    make_detector: F,
) -> BatchReport
where
    F: Fn() -> Result<Box<dyn SpeechDetector>> + Sync,
{
    if inputs.is_empty() {
        return BatchReport::default();
    }
    let mut slots: Vec<Option<ClipReport>> = vec![None; inputs.len()];
    let mut jobs: Vec<(usize, &Path)> = Vec::with_capacity(inputs.len());
    let mut claimed: HashMap<String, &Path> = HashMap::new();
    for (i, input) in inputs.iter().enumerate() {
        let id = source_voice_id(input);
        match claimed.get(&id) {
            Some(first) => {
                let err = format!("voice id {id:?} already produced by {}", first.display());
                warn!(input = %input.display(), "{err}");
                slots[i] = Some(ClipReport::failed(input, err));
            }
            None => {
                claimed.insert(id, input.as_path());
                jobs.push((i, input.as_path()));
            }
        }
    }

    let workers = workers.clamp(1, jobs.len().max(1));
    let started = Instant::now();
    info!(clips = inputs.len(), workers, "batch started");

    let (job_tx, job_rx) = bounded::<(usize, &Path)>(jobs.len().max(1));
    let (result_tx, result_rx) = unbounded::<(usize, ClipReport)>();
    for job in jobs {
        // Capacity covers every job and the receiver is alive.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let make_detector = &make_detector;
            scope.spawn(move || {
                let mut detector = match panic::catch_unwind(AssertUnwindSafe(make_detector)) {
                    Ok(built) => built.map_err(|e| e.to_string()),
                    Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
                };
                for (i, input) in job_rx.iter() {
                    let _span = info_span!("clip", worker, input = %input.display()).entered();
                    let report = match detector.as_mut() {
                        Ok(det) => {
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                                pipeline.process(input, det.as_mut(), out_dir)
                            }));
                            match outcome {
                                Ok(result) => ClipReport::from_result(input, result),
                                Err(payload) => ClipReport::failed(
                                    input,
                                    format!(
                                        "clip processing panicked: {}",
                                        panic_message(payload.as_ref())
                                    ),
                                ),
                            }
                        }
                        Err(e) => {
                            ClipReport::failed(input, format!("speech detector unavailable: {e}"))
                        }
                    };
                    if let Some(err) = &report.error {
                        error!("clip failed: {err}");
                    }
                    if result_tx.send((i, report)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    for (i, report) in result_rx.iter() {
        slots[i] = Some(report);
    }
    let clips: Vec<ClipReport> = slots
        .into_iter()
        .zip(inputs)
        .map(|(slot, input)| {
            slot.unwrap_or_else(|| {
                ClipReport::failed(input, "worker exited before processing this clip".into())
            })
        })
        .collect();

    let report = BatchReport { clips };
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch finished"
    );
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
