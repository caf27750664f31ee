use ndarray::{concatenate, s, Array2, Array3, ArrayView2, Axis};

use crate::{
  error::{CancelToken, Result, SeparateError},
  frame::Chunk,
  model::{InferenceAdapter, InferenceModel},
  params::ModelParams,
  stft::Stft,
};

/// Zero-padding layout used to fit a chunk into an integer number of
/// inference windows. Both layouts feed the same window loop; they only
/// differ in where the padding goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReassemblyMode {
  /// Pad the tail to a window multiple, plus transform-edge headroom on
  /// both sides.
  #[default]
  Streaming,
  /// Fold the trailing headroom into the tail padding.
  Checkpoint,
}

/// Runs chunks through forward transform, inference and inverse transform,
/// then stitches the margin-trimmed results back into one waveform.
pub struct ChunkDemixer<'a, M> {
  params: &'a ModelParams,
  adapter: &'a InferenceAdapter<M>,
  stft: Stft,
  mode: ReassemblyMode,
}

impl<'a, M: InferenceModel> ChunkDemixer<'a, M> {
  pub fn new(params: &'a ModelParams, adapter: &'a InferenceAdapter<M>) -> Self {
    Self {
      params,
      adapter,
      stft: Stft::new(params.n_fft, params.hop, params.dim_f),
      mode: ReassemblyMode::default(),
    }
  }

  pub fn with_mode(mut self, mode: ReassemblyMode) -> Self {
    self.mode = mode;
    self
  }

  /// Demixes every chunk in order and concatenates the trimmed results.
  /// In passthrough mode inference is skipped and the forward-transformed
  /// spectrogram is resynthesized unmodified; this is the "match mix"
  /// stream the residual derivation subtracts against.
  pub fn demix(
    &self,
    chunks: &[Chunk],
    passthrough: bool,
    cancel: &CancelToken,
  ) -> Result<Array2<f64>> {
    let expected: usize = chunks.iter().map(Chunk::trimmed_len).sum();
    let total = chunks.len();

    let mut stitched = Vec::with_capacity(total);

    for (index, chunk) in chunks.iter().enumerate() {
      cancel.check()?;

      let cur = index + 1;
      tracing::info!(
        "{:.2}% Processing... ({cur}/{total})",
        cur as f64 * 100.0 / total as f64
      );

      let demixed = self.demix_chunk(chunk, passthrough)?;

      let trimmed = demixed
        .slice(s![.., chunk.margin_left..chunk.len() - chunk.margin_right])
        .mapv(|v| v * (1.0 / self.params.adjust));

      stitched.push(trimmed);
    }

    let views: Vec<_> = stitched.iter().map(Array2::view).collect();
    let res = concatenate(Axis(1), &views).expect("trimmed chunks should stitch");

    let got = res.len_of(Axis(1));
    if got != expected {
      return Err(SeparateError::Inference(format!(
        "stitched waveform has {got} samples, expected {expected}"
      )));
    }

    Ok(res)
  }

  fn demix_chunk(&self, chunk: &Chunk, passthrough: bool) -> Result<Array2<f64>> {
    let n = chunk.len();
    let trim = self.params.trim();
    let window_size = self.params.window_size();
    let gen_size = self.params.gen_size();

    let padded = self.pad(chunk.samples.view());
    let windows = (padded.len_of(Axis(1)) - window_size) / gen_size + 1;

    let mut parts = Vec::with_capacity(windows);

    for w in 0..windows {
      let start = w * gen_size;
      let wave = padded.slice(s![.., start..start + window_size]);

      let tar = self.run_window(wave, passthrough)?;
      parts.push(tar.slice(s![0, .., trim..window_size - trim]).to_owned());
    }

    let views: Vec<_> = parts.iter().map(Array2::view).collect();
    let full = concatenate(Axis(1), &views).expect("window outputs should stitch");

    Ok(full.slice(s![.., ..n]).to_owned())
  }

  /// Pads the chunk so windows stepped at `gen_size` cover it exactly.
  fn pad(&self, chunk: ArrayView2<f64>) -> Array2<f64> {
    let n = chunk.len_of(Axis(1));
    let trim = self.params.trim();
    let gen_size = self.params.gen_size();

    let lead = Array2::zeros((2, trim));

    match self.mode {
      ReassemblyMode::Streaming => {
        let tail = Array2::zeros((2, gen_size - n % gen_size));
        let edge = Array2::zeros((2, trim));
        concatenate(
          Axis(1),
          &[lead.view(), chunk.view(), tail.view(), edge.view()],
        )
      }
      ReassemblyMode::Checkpoint => {
        let tail = Array2::zeros((2, gen_size + trim - n % gen_size));
        concatenate(Axis(1), &[lead.view(), chunk.view(), tail.view()])
      }
    }
    .expect("chunk padding should stack")
  }

  fn run_window(&self, wave: ArrayView2<f64>, passthrough: bool) -> Result<Array3<f64>> {
    let mut spek = self.stft.apply(wave);

    if self.params.adjust != 1.0 {
      spek *= self.params.adjust;
    }

    // fixed model contract: the lowest bins are silenced before inference
    let cut = self.params.dim_f.min(3);
    spek.slice_mut(s![.., .., ..cut, ..]).fill(0.0);

    let pred = if passthrough {
      spek
    } else {
      self.adapter.run(spek.view())?
    };

    Ok(self.stft.inverse(pred.view()))
  }
}
