//! Silero VAD neural speech detector.
//!
//! Wraps the official Silero VAD ONNX model published at
//! <https://github.com/snakers4/silero-vad>.
//!
//! Supports both the v3/v4 LSTM interface (separate `h`/`c` tensors) and the
//! v5 GRU interface (single `state` tensor).
//!
//! ## Model I/O (v4 LSTM)
//!
//! | Name     | Shape      | DType | Direction |
//! |----------|------------|-------|-----------|
//! | `input`  | `[1, 512]` | f32   | in        |
//! | `sr`     | `[1]`      | i64   | in        |
//! | `h`      | `[2,1,64]` | f32   | in/out    |
//! | `c`      | `[2,1,64]` | f32   | in/out    |
//! | `output` | `[1, 1]`   | f32   | out       |
//! | `hn`     | `[2,1,64]` | f32   | out       |
//! | `cn`     | `[2,1,64]` | f32   | out       |
//!
//! ## Model I/O (v5 GRU)
//!
//! | Name     | Shape       | DType | Direction |
//! |----------|-------------|-------|-----------|
//! | `input`  | `[1, 512]`  | f32   | in        |
//! | `sr`     | `[1]`       | i64   | in        |
//! | `state`  | `[2,1,128]` | f32   | in/out    |
//! | `output` | `[1, 1]`    | f32   | out       |
//! | `stateN` | `[2,1,128]` | f32   | out       |

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3};
use ort::session::builder::SessionBuilder;
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tracing::{debug, info, warn};

use super::{
    collapse_to_intervals, SpeechDetector, SpeechTimestampOptions, VoicedInterval,
    DETECTION_SAMPLE_RATE,
};
use crate::audio::AudioBuffer;
use crate::config::default_models_dir;
use crate::error::{Result, VocalisError};

/// Window size expected by Silero VAD (samples at 16 kHz = 32 ms).
const WINDOW: usize = 512;
/// v3/v4 LSTM state size: 2 layers × 1 batch × 64 units (each of h and c).
const LSTM_SIZE: usize = 128;
/// v5 GRU state size: 2 layers × 1 batch × 128 units.
const GRU_STATE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SileroIoMode {
    /// v3/v4 LSTM: separate `h` and `c` state tensors.
    StatefulLstm,
    /// v5 GRU: single `state` tensor, output `stateN`.
    StatefulGru,
    /// No state passing.
    Stateless,
}

fn onnx_err(e: impl ToString) -> VocalisError {
    VocalisError::OnnxSession(e.to_string())
}

/// Neural speech detector using the Silero VAD ONNX model.
///
/// Owns its session and recurrent state, so each worker thread builds its
/// own instance.
pub struct SileroDetector {
    session: Session,
    io_mode: SileroIoMode,
    input_name: String,
    sr_name: Option<String>,
    output_name: String,
    h_name: Option<String>,
    c_name: Option<String>,
    hn_name: Option<String>,
    cn_name: Option<String>,
    state_name: Option<String>,
    state_out_name: Option<String>,
    h: Vec<f32>,
    c: Vec<f32>,
    state: Vec<f32>,
    options: SpeechTimestampOptions,
}

impl SileroDetector {
    /// Load the Silero VAD ONNX model from `path`.
    pub fn new(path: impl AsRef<Path>, options: SpeechTimestampOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(VocalisError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let session = SessionBuilder::new()
            .map_err(onnx_err)?
            .commit_from_file(path)
            .map_err(onnx_err)?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        let input_name = resolve_name(&input_names, &["input", "audio", "x"])
            .or_else(|| input_names.first().cloned())
            .ok_or_else(|| onnx_err("Silero model has no inputs"))?;
        let sr_name = resolve_name(&input_names, &["sr", "sample_rate"]);
        let h_name = resolve_name(&input_names, &["h", "state_h"]);
        let c_name = resolve_name(&input_names, &["c", "state_c"]);
        let state_name = resolve_name(&input_names, &["state", "h_0", "hidden"]);

        let output_name = resolve_name(&output_names, &["output", "speech_prob", "prob"])
            .or_else(|| output_names.first().cloned())
            .ok_or_else(|| onnx_err("Silero model has no outputs"))?;
        let hn_name = resolve_name(&output_names, &["hn", "state_hn", "h_out"]);
        let cn_name = resolve_name(&output_names, &["cn", "state_cn", "c_out"]);
        let state_out_name =
            resolve_name(&output_names, &["stateN", "state_out", "h_0_out", "hn_out"]);

        let io_mode =
            if h_name.is_some() && c_name.is_some() && hn_name.is_some() && cn_name.is_some() {
                SileroIoMode::StatefulLstm
            } else if state_name.is_some() {
                SileroIoMode::StatefulGru
            } else {
                SileroIoMode::Stateless
            };

        info!(
            path = %path.display(),
            inputs = ?input_names,
            outputs = ?output_names,
            io_mode = ?io_mode,
            threshold = options.threshold,
            "silero detector ready"
        );

        Ok(Self {
            session,
            io_mode,
            input_name,
            sr_name,
            output_name,
            h_name,
            c_name,
            hn_name,
            cn_name,
            state_name,
            state_out_name,
            h: vec![0.0; LSTM_SIZE],
            c: vec![0.0; LSTM_SIZE],
            state: vec![0.0; GRU_STATE_SIZE],
            options,
        })
    }

    /// Default path for the Silero VAD model file.
    pub fn default_model_path() -> PathBuf {
        default_models_dir().join("silero_vad.onnx")
    }

    fn reset(&mut self) {
        self.h.iter_mut().for_each(|v| *v = 0.0);
        self.c.iter_mut().for_each(|v| *v = 0.0);
        self.state.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Run one 512-sample window through the model, update the recurrent
    /// state, and return the speech probability.
    fn run_window(&mut self, window: &[f32]) -> Result<f32> {
        let input_arr =
            Array2::<f32>::from_shape_vec((1, WINDOW), window.to_vec()).map_err(onnx_err)?;
        let input_val = Value::from_array(input_arr).map_err(onnx_err)?;

        let mut input_values: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), input_val.into())];

        if let Some(sr_name) = &self.sr_name {
            let sr_arr = Array1::<i64>::from_elem(1, DETECTION_SAMPLE_RATE as i64);
            let sr_val = Value::from_array(sr_arr).map_err(onnx_err)?;
            input_values.push((sr_name.clone(), sr_val.into()));
        }

        match self.io_mode {
            SileroIoMode::StatefulLstm => {
                if let (Some(h_name), Some(c_name)) = (&self.h_name, &self.c_name) {
                    let h_arr = Array3::<f32>::from_shape_vec((2, 1, 64), self.h.clone())
                        .map_err(onnx_err)?;
                    let c_arr = Array3::<f32>::from_shape_vec((2, 1, 64), self.c.clone())
                        .map_err(onnx_err)?;
                    let h_val = Value::from_array(h_arr).map_err(onnx_err)?;
                    let c_val = Value::from_array(c_arr).map_err(onnx_err)?;
                    input_values.push((h_name.clone(), h_val.into()));
                    input_values.push((c_name.clone(), c_val.into()));
                }
            }
            SileroIoMode::StatefulGru => {
                if let Some(state_name) = &self.state_name {
                    let state_arr = Array3::<f32>::from_shape_vec((2, 1, 128), self.state.clone())
                        .map_err(onnx_err)?;
                    let state_val = Value::from_array(state_arr).map_err(onnx_err)?;
                    input_values.push((state_name.clone(), state_val.into()));
                }
            }
            SileroIoMode::Stateless => {}
        }

        let outputs = self.session.run(input_values).map_err(onnx_err)?;

        let prob_output = outputs
            .get(self.output_name.as_str())
            .unwrap_or(&outputs[0]);
        let (_, prob_data) = prob_output
            .try_extract_tensor::<f32>()
            .map_err(onnx_err)?;
        let prob = prob_data.first().copied().unwrap_or(0.0);

        match self.io_mode {
            SileroIoMode::StatefulLstm => {
                let hn = self.hn_name.as_deref().and_then(|n| outputs.get(n));
                let cn = self.cn_name.as_deref().and_then(|n| outputs.get(n));
                if let (Some(hn_out), Some(cn_out)) = (hn, cn) {
                    let (_, hn_data) = hn_out.try_extract_tensor::<f32>().map_err(onnx_err)?;
                    let (_, cn_data) = cn_out.try_extract_tensor::<f32>().map_err(onnx_err)?;
                    self.h = hn_data.to_vec();
                    self.c = cn_data.to_vec();
                } else {
                    warn!("silero LSTM state outputs missing; switching to stateless");
                    self.io_mode = SileroIoMode::Stateless;
                }
            }
            SileroIoMode::StatefulGru => {
                let state_out = self.state_out_name.as_deref().and_then(|n| outputs.get(n));
                if let Some(state_out) = state_out {
                    let (_, state_data) =
                        state_out.try_extract_tensor::<f32>().map_err(onnx_err)?;
                    self.state = state_data.to_vec();
                } else {
                    warn!("silero GRU state output missing; switching to stateless");
                    self.io_mode = SileroIoMode::Stateless;
                }
            }
            SileroIoMode::Stateless => {}
        }

        Ok(prob)
    }
}

fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

impl SpeechDetector for SileroDetector {
    fn detect_speech(&mut self, buffer: &AudioBuffer) -> Result<Vec<VoicedInterval>> {
        if buffer.sample_rate != DETECTION_SAMPLE_RATE {
            return Err(VocalisError::SpeechDetection(format!(
                "silero expects {DETECTION_SAMPLE_RATE} Hz input, got {} Hz",
                buffer.sample_rate
            )));
        }
        self.reset();

        let mut probs = Vec::with_capacity(buffer.len() / WINDOW + 1);
        let mut window = [0.0f32; WINDOW];
        for chunk in buffer.samples.chunks(WINDOW) {
            // The final partial window is zero-padded.
            window.fill(0.0);
            window[..chunk.len()].copy_from_slice(chunk);
            probs.push(self.run_window(&window)?);
        }

        let intervals = collapse_to_intervals(
            &probs,
            WINDOW,
            buffer.sample_rate,
            buffer.len(),
            &self.options,
        );
        debug!(
            windows = probs.len(),
            intervals = intervals.len(),
            "silero speech detection"
        );
        Ok(intervals)
    }

    fn name(&self) -> &'static str {
        "silero"
    }
}
