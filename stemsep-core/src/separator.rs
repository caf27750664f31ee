use ndarray::{Array2, ArrayView2, Axis};

use crate::{
  demix::{ChunkDemixer, ReassemblyMode},
  error::{CancelToken, Result, SeparateError},
  frame::segment,
  model::{InferenceAdapter, InferenceModel},
  params::ModelParams,
};

/// Output level policy. The exact rescaling applied when a stem clips is a
/// strategy choice, so it lives here instead of being baked into the
/// residual formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
  /// Leave levels untouched.
  #[default]
  Off,
  /// Divide by the absolute peak when it exceeds 1.0.
  Peak,
}

impl Normalization {
  fn apply(&self, mut wave: Array2<f64>) -> Array2<f64> {
    match self {
      Self::Off => wave,
      Self::Peak => {
        let peak = peak_of(&wave);
        if peak > 1.0 {
          wave /= peak;
        }
        wave
      }
    }
  }

  /// Rescales `wave` and `against` by the same factor (driven by `wave`'s
  /// peak) so their relative levels survive the residual subtraction.
  fn apply_joint(
    &self,
    mut wave: Array2<f64>,
    mut against: Array2<f64>,
  ) -> (Array2<f64>, Array2<f64>) {
    match self {
      Self::Off => (wave, against),
      Self::Peak => {
        let peak = peak_of(&wave);
        if peak > 1.0 {
          wave /= peak;
          against /= peak;
        }
        (wave, against)
      }
    }
  }
}

fn peak_of(wave: &Array2<f64>) -> f64 {
  wave.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// The two derived waveforms, each [2, N] for a mix of N samples.
pub struct Stems {
  /// The model's direct prediction (instrumental for a karaoke model).
  pub primary: Array2<f64>,
  /// The residual of the mix after removing the compensated prediction
  /// (vocals for a karaoke model).
  pub secondary: Array2<f64>,
}

/// Drives the whole pipeline: segment, demix with inference, demix the
/// match mix, derive both stems.
pub struct Separator<M> {
  params: ModelParams,
  adapter: InferenceAdapter<M>,
  normalization: Normalization,
  mode: ReassemblyMode,
}

impl<M: InferenceModel> Separator<M> {
  pub fn new(params: ModelParams, model: M) -> Result<Self> {
    params.validate()?;

    Ok(Self {
      params,
      adapter: InferenceAdapter::new(model),
      normalization: Normalization::default(),
      mode: ReassemblyMode::default(),
    })
  }

  pub fn with_denoise(mut self, denoise: bool) -> Self {
    self.adapter = self.adapter.with_denoise(denoise);
    self
  }

  pub fn with_normalization(mut self, normalization: Normalization) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn with_mode(mut self, mode: ReassemblyMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn params(&self) -> &ModelParams {
    &self.params
  }

  pub fn separate(&self, mix: ArrayView2<f64>, cancel: &CancelToken) -> Result<Stems> {
    let mix = to_stereo(mix)?;

    tracing::info!("Start separating...");

    let demixer = ChunkDemixer::new(&self.params, &self.adapter).with_mode(self.mode);

    let chunks = segment(mix.view(), self.params.chunk_size, self.params.margin)?;
    let source = demixer.demix(&chunks, false, cancel)?;

    tracing::info!("Reconstructing the match mix...");

    // the residual is taken against the mix run through the identical
    // transform round trip, not against the untouched samples
    let raw_chunks = segment(mix.view(), 0, self.params.margin)?;
    let raw = demixer.demix(&raw_chunks, true, cancel)?;

    tracing::info!("Deriving stems...");

    let primary = self.normalization.apply(source.clone());

    let (scaled, raw) = self
      .normalization
      .apply_joint(source * self.params.compensate, raw);
    let secondary = raw - scaled;

    Ok(Stems { primary, secondary })
  }
}

fn to_stereo(mix: ArrayView2<f64>) -> Result<Array2<f64>> {
  match mix.len_of(Axis(0)) {
    1 => {
      let row = mix.index_axis(Axis(0), 0);
      Ok(ndarray::stack(Axis(0), &[row, row]).expect("mono rows should stack"))
    }
    2 => Ok(mix.to_owned()),
    channels => Err(SeparateError::Configuration(format!(
      "expected mono or stereo input, got {channels} channels"
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::SAMPLE_RATE;
  use ndarray::{Array2, Array4, ArrayView4};

  const SR: usize = SAMPLE_RATE as usize;

  fn tiny_params() -> ModelParams {
    ModelParams {
      dim_f: 17,
      dim_t: 9,
      n_fft: 32,
      hop: 8,
      compensate: 1.0,
      adjust: 1.0,
      margin: 1000,
      chunk_size: 0,
    }
  }

  fn identity(spek: ArrayView4<f32>) -> anyhow::Result<Array4<f32>> {
    Ok(spek.to_owned())
  }

  fn tones(samples: usize) -> Array2<f64> {
    Array2::from_shape_fn((2, samples), |(ch, t)| {
      let t = t as f64;
      if ch == 0 {
        (std::f64::consts::TAU * t * 8.0 / 32.0).sin()
      } else {
        0.7 * (std::f64::consts::TAU * t * 10.0 / 32.0).cos()
      }
    })
  }

  #[test]
  fn identity_model_attributes_everything_to_primary() {
    let separator = Separator::new(tiny_params(), identity).expect("separator should build");
    let mix = tones(2000);

    let stems = separator
      .separate(mix.view(), &CancelToken::new())
      .expect("separation should succeed");

    assert_eq!(stems.primary.dim(), (2, 2000));
    assert_eq!(stems.secondary.dim(), (2, 2000));

    // same windows on both passes, so the residual cancels to float noise
    for v in stems.secondary.iter() {
      assert!(v.abs() < 1e-5, "secondary not silent: {v}");
    }

    for ch in 0..2 {
      for t in 64..2000 - 64 {
        let err = (stems.primary[[ch, t]] - mix[[ch, t]]).abs();
        assert!(err < 1e-2, "primary off at ch {ch} sample {t}: {err}");
      }
    }
  }

  #[test]
  fn chunked_run_keeps_length_and_near_silent_residual() {
    let params = ModelParams {
      chunk_size: 1,
      ..tiny_params()
    };
    let separator = Separator::new(params, identity).expect("separator should build");

    let n = 2 * SR + 777;
    let stems = separator
      .separate(tones(n).view(), &CancelToken::new())
      .expect("separation should succeed");

    assert_eq!(stems.primary.dim(), (2, n));
    assert_eq!(stems.secondary.dim(), (2, n));

    // chunk and match-mix passes window the signal differently, so the
    // residual only cancels down to transform leakage
    for v in stems.secondary.iter() {
      assert!(v.abs() < 2e-2, "secondary too loud: {v}");
    }
  }

  #[test]
  fn compensation_scales_the_subtracted_prediction() {
    let params = ModelParams {
      compensate: 2.0,
      ..tiny_params()
    };
    let separator = Separator::new(params, identity).expect("separator should build");

    let mix = tones(2000);
    let stems = separator
      .separate(mix.view(), &CancelToken::new())
      .expect("separation should succeed");

    // raw - 2 * prediction lands at -mix when the model is the identity
    for ch in 0..2 {
      for t in 64..2000 - 64 {
        let err = (stems.secondary[[ch, t]] + mix[[ch, t]]).abs();
        assert!(err < 2e-2, "residual off at ch {ch} sample {t}: {err}");
      }
    }
  }

  #[test]
  fn mono_input_is_duplicated_to_stereo() {
    let separator = Separator::new(tiny_params(), identity).expect("separator should build");

    let mono =
      Array2::from_shape_fn((1, 1500), |(_, t)| (std::f64::consts::TAU * t as f64 / 4.0).sin());

    let stems = separator
      .separate(mono.view(), &CancelToken::new())
      .expect("separation should succeed");

    assert_eq!(stems.primary.dim(), (2, 1500));
    for t in 0..1500 {
      assert_eq!(stems.primary[[0, t]], stems.primary[[1, t]]);
    }
  }

  #[test]
  fn more_than_two_channels_is_rejected() {
    let separator = Separator::new(tiny_params(), identity).expect("separator should build");
    let surround = Array2::zeros((6, 1000));

    assert!(matches!(
      separator.separate(surround.view(), &CancelToken::new()),
      Err(SeparateError::Configuration(_))
    ));
  }

  #[test]
  fn zero_margin_multi_chunk_fails_before_inference() {
    let params = ModelParams {
      margin: 0,
      chunk_size: 1,
      ..tiny_params()
    };
    let separator = Separator::new(params, |_: ArrayView4<f32>| -> anyhow::Result<Array4<f32>> {
      unreachable!("configuration errors must surface before the model runs")
    })
    .expect("separator should build");

    assert!(matches!(
      separator.separate(tones(2 * SR).view(), &CancelToken::new()),
      Err(SeparateError::Configuration(_))
    ));
  }

  #[test]
  fn invalid_params_fail_at_construction() {
    let params = ModelParams {
      dim_f: 40,
      ..tiny_params()
    };
    assert!(matches!(
      Separator::new(params, identity),
      Err(SeparateError::Configuration(_))
    ));
  }

  #[test]
  fn peak_normalization_rescales_jointly() {
    let wave = Array2::from_elem((2, 4), 2.0);
    let against = Array2::from_elem((2, 4), 0.5);

    let (wave, against) = Normalization::Peak.apply_joint(wave, against);
    assert_eq!(wave[[0, 0]], 1.0);
    assert_eq!(against[[0, 0]], 0.25);

    let untouched = Normalization::Off.apply(Array2::from_elem((2, 4), 2.0));
    assert_eq!(untouched[[0, 0]], 2.0);

    let quiet = Normalization::Peak.apply(Array2::from_elem((2, 4), 0.5));
    assert_eq!(quiet[[0, 0]], 0.5);
  }
}
