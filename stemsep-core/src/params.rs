use serde::Deserialize;

use crate::error::{Result, SeparateError};

/// Fixed by contract; input at any other rate is resampled before it
/// reaches the pipeline.
pub const SAMPLE_RATE: u32 = 44100;

/// Leading spectrogram axis: stereo channel x real/imaginary.
pub const DIM_C: usize = 4;

/// Per-model constants, supplied by the caller (typically from the model's
/// model-data JSON), never computed here.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelParams {
  /// Frequency bins kept for inference.
  pub dim_f: usize,
  /// Time frames per inference window.
  pub dim_t: usize,
  pub n_fft: usize,
  #[serde(default = "default_hop")]
  pub hop: usize,
  /// Gain correction applied to the prediction when deriving the residual.
  #[serde(default = "default_one")]
  pub compensate: f64,
  #[serde(default = "default_one")]
  pub adjust: f64,
  /// Context samples around each chunk boundary.
  #[serde(default = "default_margin")]
  pub margin: usize,
  /// Chunk length in seconds; 0 processes the waveform as one chunk.
  #[serde(default)]
  pub chunk_size: usize,
}

fn default_hop() -> usize {
  1024
}

fn default_one() -> f64 {
  1.0
}

fn default_margin() -> usize {
  SAMPLE_RATE as usize
}

impl ModelParams {
  pub fn n_bins(&self) -> usize {
    self.n_fft / 2 + 1
  }

  /// Samples discarded from both ends of every inverse-transformed window.
  pub fn trim(&self) -> usize {
    self.n_fft / 2
  }

  /// Samples per inference window, sized so the window yields exactly
  /// `dim_t` centered frames.
  pub fn window_size(&self) -> usize {
    self.hop * (self.dim_t - 1)
  }

  /// Net samples each window contributes after edge trimming.
  pub fn gen_size(&self) -> usize {
    self.window_size() - 2 * self.trim()
  }

  pub fn validate(&self) -> Result<()> {
    if self.n_fft == 0 || self.hop == 0 || self.dim_t < 2 {
      return Err(SeparateError::Configuration(format!(
        "degenerate transform parameters (n_fft={}, hop={}, dim_t={})",
        self.n_fft, self.hop, self.dim_t
      )));
    }

    if self.dim_f > self.n_bins() {
      return Err(SeparateError::Configuration(format!(
        "dim_f ({}) exceeds the transform's {} frequency bins",
        self.dim_f,
        self.n_bins()
      )));
    }

    if self.window_size() <= 2 * self.trim() {
      return Err(SeparateError::Configuration(format!(
        "window of {} samples is swallowed by 2x{} edge trimming",
        self.window_size(),
        self.trim()
      )));
    }

    Ok(())
  }
}
