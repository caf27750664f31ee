use ndarray::{Array4, ArrayView4};

use crate::error::{Result, SeparateError};

/// The caller-supplied batched tensor function: [B, 4, dim_f, dim_t] in,
/// identical shape out. The model architecture and runtime live behind it.
pub trait InferenceModel {
  fn run(&self, spek: ArrayView4<f32>) -> anyhow::Result<Array4<f32>>;
}

impl<F> InferenceModel for F
where
  F: Fn(ArrayView4<f32>) -> anyhow::Result<Array4<f32>>,
{
  fn run(&self, spek: ArrayView4<f32>) -> anyhow::Result<Array4<f32>> {
    self(spek)
  }
}

/// Feeds prepared spectrogram batches through the model. With `denoise`
/// enabled the signal and its negation are inferred separately and
/// averaged: 0.5 * (-f(-x)) + 0.5 * f(x).
pub struct InferenceAdapter<M> {
  model: M,
  denoise: bool,
}

impl<M: InferenceModel> InferenceAdapter<M> {
  pub fn new(model: M) -> Self {
    Self {
      model,
      denoise: false,
    }
  }

  pub fn with_denoise(mut self, denoise: bool) -> Self {
    self.denoise = denoise;
    self
  }

  pub fn run(&self, spek: ArrayView4<f64>) -> Result<Array4<f64>> {
    let input = spek.mapv(|v| v as f32);
    let expected = input.dim();

    let pred = if self.denoise {
      let negated = self.model.run((-&input).view()).map_err(fatal)?;
      check_shape(expected, &negated)?;

      let direct = self.model.run(input.view()).map_err(fatal)?;
      check_shape(expected, &direct)?;

      direct * 0.5 - negated * 0.5
    } else {
      let direct = self.model.run(input.view()).map_err(fatal)?;
      check_shape(expected, &direct)?;
      direct
    };

    Ok(pred.mapv(f64::from))
  }
}

fn fatal(err: anyhow::Error) -> SeparateError {
  SeparateError::Inference(format!("{err:#}"))
}

fn check_shape(expected: (usize, usize, usize, usize), got: &Array4<f32>) -> Result<()> {
  if got.dim() != expected {
    return Err(SeparateError::InferenceShape {
      expected: [expected.0, expected.1, expected.2, expected.3],
      got: got.shape().to_vec(),
    });
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use anyhow::anyhow;
  use ndarray::Array4;

  fn spek() -> Array4<f64> {
    Array4::from_shape_fn((1, 4, 5, 3), |(_, c, f, t)| {
      (c * 15 + f * 3 + t) as f64 / 10.0
    })
  }

  #[test]
  fn passes_the_batch_through_unchanged() {
    let adapter = InferenceAdapter::new(|s: ArrayView4<f32>| Ok(s.to_owned()));
    let input = spek();
    let out = adapter.run(input.view()).expect("identity model should run");

    for (a, b) in out.iter().zip(input.iter()) {
      assert!((a - b).abs() < 1e-6);
    }
  }

  #[test]
  fn denoise_cancels_even_model_components() {
    // f(x) = x + 1, so plain inference is off by 1 but the averaged
    // double pass recovers x exactly
    let adapter =
      InferenceAdapter::new(|s: ArrayView4<f32>| Ok(s.mapv(|v| v + 1.0))).with_denoise(true);

    let input = spek();
    let out = adapter.run(input.view()).expect("denoise run should succeed");

    for (a, b) in out.iter().zip(input.iter()) {
      assert!((a - b).abs() < 1e-6);
    }
  }

  #[test]
  fn wrong_output_shape_aborts() {
    let adapter = InferenceAdapter::new(|_: ArrayView4<f32>| Ok(Array4::zeros((1, 4, 5, 2))));
    assert!(matches!(
      adapter.run(spek().view()),
      Err(SeparateError::InferenceShape { .. })
    ));
  }

  #[test]
  fn model_failure_is_fatal() {
    let adapter = InferenceAdapter::new(|_: ArrayView4<f32>| Err(anyhow!("runtime exploded")));
    match adapter.run(spek().view()) {
      Err(SeparateError::Inference(msg)) => assert!(msg.contains("runtime exploded")),
      other => panic!("expected inference error, got {other:?}"),
    }
  }
}
