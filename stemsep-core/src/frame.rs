use ndarray::{s, Array2, ArrayView2, Axis};

use crate::{
  error::{Result, SeparateError},
  params::SAMPLE_RATE,
};

/// One margin-padded slice of the mix. The margins are context only; they
/// are discarded again when the demixed chunks are stitched back together.
#[derive(Debug, Clone)]
pub struct Chunk {
  /// Sample index of the chunk's nominal start in the original mix.
  pub offset: usize,
  pub margin_left: usize,
  pub margin_right: usize,
  /// [2, margin_left + nominal + margin_right] samples.
  pub samples: Array2<f64>,
}

impl Chunk {
  pub fn len(&self) -> usize {
    self.samples.len_of(Axis(1))
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Samples this chunk contributes to the stitched output.
  pub fn trimmed_len(&self) -> usize {
    self.len() - self.margin_left - self.margin_right
  }
}

/// Splits `mix` into an ordered sequence of overlapping chunks.
///
/// Offsets sweep `0, C, 2C, ...` for a chunk length of `chunk_size` seconds,
/// so a mix of N samples always yields exactly ceil(N / C) chunks. A
/// `chunk_size` of 0, or a mix shorter than one chunk, produces a single
/// margin-free chunk spanning the whole waveform.
pub fn segment(mix: ArrayView2<f64>, chunk_size: usize, margin: usize) -> Result<Vec<Chunk>> {
  let samples = mix.len_of(Axis(1));

  if samples == 0 {
    return Err(SeparateError::Configuration(
      "cannot segment an empty waveform".to_owned(),
    ));
  }

  let mut chunk_len = chunk_size * SAMPLE_RATE as usize;
  if chunk_size == 0 || samples < chunk_len {
    chunk_len = samples;
  }

  let margin = margin.min(chunk_len);

  if margin == 0 && chunk_len < samples {
    return Err(SeparateError::Configuration(
      "margin cannot be zero when the mix spans multiple chunks".to_owned(),
    ));
  }

  let mut chunks = Vec::with_capacity(samples.div_ceil(chunk_len));

  for (counter, skip) in (0..samples).step_by(chunk_len).enumerate() {
    let margin_left = if counter == 0 { 0 } else { margin };
    let start = skip - margin_left;
    let end = (skip + chunk_len + margin).min(samples);
    // the final chunk keeps everything up to the waveform end
    let margin_right = end - (skip + chunk_len).min(samples);

    chunks.push(Chunk {
      offset: skip,
      margin_left,
      margin_right,
      samples: mix.slice(s![.., start..end]).to_owned(),
    });
  }

  Ok(chunks)
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array2;

  const SR: usize = SAMPLE_RATE as usize;

  fn ramp(samples: usize) -> Array2<f64> {
    Array2::from_shape_fn((2, samples), |(ch, t)| {
      let v = t as f64;
      if ch == 0 {
        v
      } else {
        -v
      }
    })
  }

  fn stitch(chunks: &[Chunk]) -> Array2<f64> {
    let trimmed: Vec<_> = chunks
      .iter()
      .map(|c| {
        c.samples
          .slice(s![.., c.margin_left..c.len() - c.margin_right])
      })
      .collect();
    ndarray::concatenate(Axis(1), &trimmed).expect("chunks should stitch")
  }

  #[test]
  fn ninety_seconds_at_fifteen_yields_six_chunks() {
    let mix = Array2::zeros((2, 90 * SR));
    let chunks = segment(mix.view(), 15, SR).expect("segmentation should succeed");

    assert_eq!(chunks.len(), 6);
    for (i, chunk) in chunks.iter().enumerate() {
      assert_eq!(chunk.offset, i * 15 * SR);
      assert_eq!(chunk.margin_left, if i == 0 { 0 } else { SR });
      assert_eq!(chunk.margin_right, if i == 5 { 0 } else { SR });
    }

    let total: usize = chunks.iter().map(Chunk::trimmed_len).sum();
    assert_eq!(total, 90 * SR);
  }

  #[test]
  fn chunk_count_is_ceil_for_partial_tail() {
    let mix = Array2::zeros((2, 31 * SR + 7));
    let chunks = segment(mix.view(), 15, SR).expect("segmentation should succeed");
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[2].trimmed_len(), SR + 7);
  }

  #[test]
  fn trimmed_chunks_reconstruct_the_ramp_exactly() {
    let mix = ramp(3 * SR + 123);
    let chunks = segment(mix.view(), 1, 1000).expect("segmentation should succeed");
    assert_eq!(chunks.len(), 4);
    assert_eq!(stitch(&chunks), mix);
  }

  #[test]
  fn zero_chunk_size_gives_one_margin_free_chunk() {
    let mix = ramp(12345);
    let chunks = segment(mix.view(), 0, SR).expect("segmentation should succeed");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].margin_left, 0);
    assert_eq!(chunks[0].margin_right, 0);
    assert_eq!(stitch(&chunks), mix);
  }

  #[test]
  fn short_mix_collapses_to_one_chunk() {
    let mix = ramp(SR / 2);
    let chunks = segment(mix.view(), 15, SR).expect("segmentation should succeed");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].trimmed_len(), SR / 2);
  }

  #[test]
  fn zero_margin_with_multiple_chunks_fails_fast() {
    let mix = Array2::zeros((2, 3 * SR));
    assert!(matches!(
      segment(mix.view(), 1, 0),
      Err(SeparateError::Configuration(_))
    ));
  }

  #[test]
  fn oversized_margin_is_clamped_to_chunk_length() {
    let mix = ramp(2 * SR);
    let chunks = segment(mix.view(), 1, 3 * SR).expect("segmentation should succeed");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].margin_left, SR);
    assert_eq!(stitch(&chunks), mix);
  }

  #[test]
  fn empty_waveform_is_rejected() {
    let mix = Array2::zeros((2, 0));
    assert!(matches!(
      segment(mix.view(), 1, SR),
      Err(SeparateError::Configuration(_))
    ));
  }
}
