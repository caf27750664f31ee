use std::{fs::File, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::{Array2, ArrayView2};
use rubato::{
  Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use stemsep_core::SAMPLE_RATE;
use symphonia::core::{
  audio::SampleBuffer, codecs::CODEC_TYPE_NULL, errors::Error as SymphoniaError,
  io::MediaSourceStream, probe::Hint,
};

#[tracing::instrument(skip_all)]
fn resample(channels: Vec<Vec<f64>>, from: u32) -> Result<Vec<Vec<f64>>> {
  const CHUNK: usize = 1024;

  let channel_num = channels.len();
  let length = channels.first().map_or(0, Vec::len);

  let params = SincInterpolationParameters {
    sinc_len: 256,
    f_cutoff: 0.95,
    interpolation: SincInterpolationType::Linear,
    oversampling_factor: 256,
    window: WindowFunction::BlackmanHarris2,
  };

  let mut resampler = SincFixedIn::<f64>::new(
    f64::from(SAMPLE_RATE) / f64::from(from),
    2.0,
    params,
    CHUNK,
    channel_num,
  )
  .context("Failed to build resampler")?;

  let mut res: Vec<Vec<f64>> = vec![Vec::new(); channel_num];

  let mut pos = 0;
  while pos + CHUNK <= length {
    let input: Vec<&[f64]> = channels.iter().map(|c| &c[pos..pos + CHUNK]).collect();
    let output = resampler.process(&input, None)?;

    for (dst, src) in res.iter_mut().zip(output) {
      dst.extend(src);
    }

    pos += CHUNK;
  }

  if pos < length {
    let input: Vec<&[f64]> = channels.iter().map(|c| &c[pos..]).collect();
    let output = resampler.process_partial(Some(input.as_slice()), None)?;

    for (dst, src) in res.iter_mut().zip(output) {
      dst.extend(src);
    }
  }

  let output = resampler.process_partial::<&[f64]>(None, None)?;
  for (dst, src) in res.iter_mut().zip(output) {
    dst.extend(src);
  }

  Ok(res)
}

#[tracing::instrument(skip_all)]
pub fn read_audio(path: impl AsRef<Path>) -> Result<Array2<f64>> {
  let path = path.as_ref();
  let src = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
  let mss = MediaSourceStream::new(Box::new(src), Default::default());

  let probed = symphonia::default::get_probe().format(
    &Hint::new(),
    mss,
    &Default::default(),
    &Default::default(),
  )?;

  let mut format = probed.format;
  let track = format
    .tracks()
    .iter()
    .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
    .ok_or_else(|| anyhow!("No supported audio tracks"))?;

  let mut decoder =
    symphonia::default::get_codecs().make(&track.codec_params, &Default::default())?;

  let track_id = track.id;
  let mut sample_rate = track.codec_params.sample_rate;
  let mut channel_num = track.codec_params.channels.map(|c| c.count());
  let mut interleaved: Vec<f64> = Vec::new();

  tracing::info!("Start decoding...");

  loop {
    let packet = match format.next_packet() {
      Ok(packet) => packet,
      Err(SymphoniaError::ResetRequired) => {
        unimplemented!();
      }
      Err(SymphoniaError::IoError(err))
        if err.kind() == std::io::ErrorKind::UnexpectedEof
          && err.to_string() == "end of stream" =>
      {
        break;
      }
      Err(err) => {
        bail!(err);
      }
    };

    if packet.track_id() != track_id {
      tracing::warn!(
        timestamp = packet.ts,
        "The packet does not belong to the selected track, skip..."
      );
      continue;
    }

    match decoder.decode(&packet) {
      Ok(decoded) => {
        let spec = *decoded.spec();

        if sample_rate.is_none() {
          sample_rate = Some(spec.rate);
        }
        if channel_num.is_none() {
          channel_num = Some(spec.channels.count());
        }

        let duration = u64::try_from(decoded.capacity()).expect("capacity out of range");
        let mut buf = SampleBuffer::<f32>::new(duration, spec);
        buf.copy_interleaved_ref(decoded);
        interleaved.extend(buf.samples().iter().map(|&v| f64::from(v)));
      }
      Err(SymphoniaError::IoError(_)) => {
        tracing::error!(
          timestamp = packet.ts,
          "The packet failed to decode due to an IO error, skip..."
        );
        continue;
      }
      Err(SymphoniaError::DecodeError(_)) => {
        tracing::warn!(
          timestamp = packet.ts,
          "The packet failed to decode due to invalid data, skip..."
        );
        continue;
      }
      Err(err) => {
        bail!(err);
      }
    }
  }

  tracing::info!("Audio decoded");

  let sample_rate = sample_rate.ok_or_else(|| anyhow!("Can not get sample rate"))?;
  let channel_num = channel_num.ok_or_else(|| anyhow!("Can not get channel count"))?;

  if channel_num == 0 || interleaved.len() % channel_num != 0 {
    bail!("Decoded stream is not aligned to {channel_num} channels");
  }

  let length = interleaved.len() / channel_num;
  let mut channels: Vec<Vec<f64>> = vec![Vec::with_capacity(length); channel_num];
  for (i, sample) in interleaved.into_iter().enumerate() {
    channels[i % channel_num].push(sample);
  }

  let channels = if sample_rate != SAMPLE_RATE {
    tracing::info!(sample_rate, "Start resampling...");
    resample(channels, sample_rate)?
  } else {
    channels
  };

  let length = channels
    .iter()
    .map(Vec::len)
    .min()
    .ok_or_else(|| anyhow!("No channel found"))?;

  let mut res = Array2::zeros((channel_num, length));
  for (ch, samples) in channels.iter().enumerate() {
    for (t, &v) in samples.iter().take(length).enumerate() {
      res[[ch, t]] = v;
    }
  }

  Ok(res)
}

/// Writes a stem as 16-bit PCM at the pipeline's fixed sample rate.
#[tracing::instrument(skip_all)]
pub fn write_audio(path: impl AsRef<Path>, stem: ArrayView2<f64>) -> Result<()> {
  let path = path.as_ref();
  let (channel_num, length) = stem.dim();

  let spec = WavSpec {
    channels: channel_num as u16,
    sample_rate: SAMPLE_RATE,
    bits_per_sample: 16,
    sample_format: SampleFormat::Int,
  };

  let mut writer =
    WavWriter::create(path, spec).with_context(|| format!("Failed to create {}", path.display()))?;

  for t in 0..length {
    for ch in 0..channel_num {
      let v = stem[[ch, t]].clamp(-1.0, 1.0);
      writer.write_sample((v * f64::from(i16::MAX)).round() as i16)?;
    }
  }

  writer
    .finalize()
    .with_context(|| format!("Failed to finalize {}", path.display()))?;

  Ok(())
}
