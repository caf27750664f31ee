use ndarray::{concatenate, Array1, Array2, Array3, Array4, ArrayView2, ArrayView4, Axis, Slice};
use realfft::{num_complex::Complex, RealFftPlanner};

use crate::params::DIM_C;

// torch.hann_window(n_fft, periodic=False)
fn hann_window(window_length: usize) -> Array1<f64> {
  if window_length == 0 {
    return Array1::zeros(0);
  }

  if window_length == 1 {
    return Array1::ones(1);
  }

  let half_length = (window_length + 1) / 2;
  let scaling = (std::f64::consts::PI * 2.0) / (window_length - 1) as f64;

  let mut res = Array1::zeros(window_length);

  for i in 0..half_length {
    let cur = 0.5 - 0.5 * (scaling * i as f64).cos();
    res[i] = cur;
    res[window_length - i - 1] = cur;
  }

  res
}

// center = True, pad_mode = 'reflect', onesided = True
fn stft(input: ArrayView2<f64>, n_fft: usize, hop_length: usize) -> Array4<f64> {
  let (batch_num, length) = input.dim();
  let freq_num = n_fft / 2 + 1;
  let frame_num = length / hop_length + 1;

  let window = hann_window(n_fft);

  let mut planner = RealFftPlanner::<f64>::new();
  let fft = planner.plan_fft_forward(n_fft);
  let mut scratch = fft.make_scratch_vec();

  let left_num = n_fft / 2;
  let right_num = n_fft - left_num;

  let left_num: isize = left_num.try_into().expect("n_fft out of range");
  let right_num: isize = right_num.try_into().expect("n_fft out of range");

  let mut res = Array4::zeros((batch_num, 2, freq_num, frame_num));

  for batch in 0..batch_num {
    // reflect padding around both edges
    let at = |pos: isize| {
      if pos < 0 {
        let pos: usize = (-pos).try_into().expect("position out of range");
        return input[[batch, pos]];
      }

      let pos: usize = pos.try_into().expect("position out of range");

      if pos >= length {
        let pos = length * 2 - pos - 2;
        return input[[batch, pos]];
      }

      input[[batch, pos]]
    };

    for (frame_id, frame_center) in (0..=length).step_by(hop_length).enumerate() {
      let frame_center: isize = frame_center.try_into().expect("position out of range");

      let mut frame: Vec<f64> = ((frame_center - left_num)..(frame_center + right_num))
        .map(at)
        .zip(&window)
        .map(|(a, b)| a * b)
        .collect();

      let mut cur = fft.make_output_vec();

      fft
        .process_with_scratch(&mut frame, &mut cur, &mut scratch)
        .expect("forward fft should process");
      drop(frame);

      debug_assert_eq!(cur.len(), freq_num);

      for i in 0..freq_num {
        res[[batch, 0, i, frame_id]] = cur[i].re;
        res[[batch, 1, i, frame_id]] = cur[i].im;
      }
    }
  }

  res
}

fn istft(input: ArrayView4<f64>, n_fft: usize, hop_length: usize) -> Array2<f64> {
  let (batch_num, _, freq_num, frame_num) = input.dim();

  // may be shorter than the pre-transform length
  let length = (frame_num - 1) * hop_length;

  let window = hann_window(n_fft);

  let mut planner = RealFftPlanner::<f64>::new();
  let fft = planner.plan_fft_inverse(n_fft);
  let mut scratch = fft.make_scratch_vec();

  let left_num = n_fft / 2;

  let mut res = Array2::zeros((batch_num, length));
  let mut divider = Array2::<f64>::zeros((batch_num, length));

  for batch in 0..batch_num {
    for frame_id in 0..frame_num {
      let mut cur = Vec::with_capacity(freq_num);

      for i in 0..freq_num {
        cur.push(Complex::new(
          input[[batch, 0, i, frame_id]],
          input[[batch, 1, i, frame_id]],
        ));
      }

      // a real signal has purely real DC and Nyquist bins
      cur[0].im = 0.0;
      cur[freq_num - 1].im = 0.0;

      let mut frame = fft.make_output_vec();

      fft
        .process_with_scratch(&mut cur, &mut frame, &mut scratch)
        .expect("inverse fft should process");
      drop(cur);

      let frame_center = frame_id * hop_length;

      let left = if frame_center < left_num {
        left_num - frame_center
      } else {
        0
      };

      let right = if frame_center + n_fft >= length + left_num + 1 {
        length + left_num - frame_center
      } else {
        n_fft
      };

      for i in left..right {
        let pos = frame_center + i - left_num;
        res[[batch, pos]] += frame[i] * window[i] / n_fft as f64;
        divider[[batch, pos]] += window[i] * window[i];
      }
    }
  }

  res / divider
}

/// Short-time transform between [batch, 2, samples] waveforms and
/// model-ready [batch, 4, dim_f, frames] real tensors. The 4-row leading
/// axis packs stereo channel x real/imaginary; bins above `dim_f` are
/// cropped by `apply` and zero-padded back by `inverse`.
pub struct Stft {
  n_fft: usize,
  hop_length: usize,
  dim_f: usize,
}

impl Stft {
  pub fn new(n_fft: usize, hop_length: usize, dim_f: usize) -> Self {
    Self {
      n_fft,
      hop_length,
      dim_f,
    }
  }

  pub fn apply(&self, x: ArrayView2<f64>) -> Array4<f64> {
    let (c, _) = x.dim();
    debug_assert_eq!(c * 2, DIM_C);

    let x = stft(x, self.n_fft, self.hop_length);
    let (_, _, bins, frame_num) = x.dim();
    let mut x = x
      .into_shape((1, c * 2, bins, frame_num))
      .expect("spectrogram should regroup by channel");
    if bins > self.dim_f {
      x.slice_axis_inplace(Axis(2), Slice::from(0..self.dim_f));
    }
    x
  }

  pub fn inverse(&self, x: ArrayView4<f64>) -> Array3<f64> {
    let (b, c, f, t) = x.dim();
    let n = self.n_fft / 2 + 1;
    debug_assert!(f <= n);

    let freq_pad = Array4::zeros((b, c, n - f, t));
    let x = concatenate(Axis(2), &[x.view(), freq_pad.view()]).expect("frequency pad should stack");

    // the concatenated array is not contiguous, so reshape through a buffer
    let x = Array4::from_shape_vec((b * c / 2, 2, n, t), x.iter().copied().collect())
      .expect("spectrogram should split into re/im pairs");
    let res = istft(x.view(), self.n_fft, self.hop_length);

    let len = res.len_of(Axis(1));
    res
      .into_shape((b, c / 2, len))
      .expect("waveform should regroup by batch")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array2;

  const N_FFT: usize = 32;
  const HOP: usize = 8;
  const BINS: usize = N_FFT / 2 + 1;

  fn two_tone(samples: usize) -> Array2<f64> {
    Array2::from_shape_fn((2, samples), |(ch, t)| {
      let phase = t as f64 / samples as f64 * std::f64::consts::TAU;
      if ch == 0 {
        (phase * 8.0).sin()
      } else {
        0.5 * (phase * 12.0).cos()
      }
    })
  }

  #[test]
  fn window_is_symmetric_with_zero_endpoints() {
    let w = hann_window(N_FFT);
    assert_eq!(w[0], 0.0);
    assert_eq!(w[N_FFT - 1], 0.0);
    for i in 0..N_FFT {
      assert!((w[i] - w[N_FFT - 1 - i]).abs() < 1e-15);
    }
  }

  #[test]
  fn forward_shape_and_crop() {
    let transform = Stft::new(N_FFT, HOP, 10);
    let spek = transform.apply(two_tone(64).view());
    assert_eq!(spek.dim(), (1, 4, 10, 64 / HOP + 1));
  }

  #[test]
  fn round_trip_is_near_identity_without_cropping() {
    let transform = Stft::new(N_FFT, HOP, BINS);
    let x = two_tone(64);

    let spek = transform.apply(x.view());
    assert_eq!(spek.dim(), (1, 4, BINS, 9));

    let back = transform.inverse(spek.view());
    assert_eq!(back.dim(), (1, 2, 64));

    for ch in 0..2 {
      for t in 0..64 {
        let err = (back[[0, ch, t]] - x[[ch, t]]).abs();
        assert!(err < 1e-9, "ch {ch} sample {t} off by {err}");
      }
    }
  }

  #[test]
  fn inverse_pads_cropped_bins_back() {
    let transform = Stft::new(N_FFT, HOP, 10);
    let spek = transform.apply(two_tone(64).view());
    let back = transform.inverse(spek.view());
    // low-pass reconstruction keeps the shape even though content differs
    assert_eq!(back.dim(), (1, 2, 64));
  }
}
