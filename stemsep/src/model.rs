use std::{
  env,
  fs::File,
  path::{Path, PathBuf},
  sync::Mutex,
};

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array4, ArrayView4};
use ort::{
  execution_providers::{ExecutionProviderDispatch, CPU, CUDA},
  session::{builder::GraphOptimizationLevel, Session},
  value::Tensor,
};
use stemsep_core::{InferenceModel, ModelParams};

use crate::cli::Cli;

pub enum Backend {
  Cuda,
  Cpu,
}

impl Backend {
  fn to_ep(&self) -> ExecutionProviderDispatch {
    match self {
      Self::Cuda => CUDA::default().build(),
      Self::Cpu => CPU::default().build(),
    }
  }
}

pub fn setup_backends(backends: impl AsRef<[Backend]>) -> Result<()> {
  let backends: Vec<_> = backends.as_ref().iter().map(|b| b.to_ep()).collect();
  ort::init().with_execution_providers(backends).commit();
  Ok(())
}

/// Known model cards; `params` come from UVR's model-data records.
pub struct ModelPreset {
  pub name: &'static str,
  filename: &'static str,
  pub params: ModelParams,
}

pub const MDX_PRESETS: &[ModelPreset] = &[
  ModelPreset {
    name: "UVR_MDXNET_KARA_2",
    filename: "UVR_MDXNET_KARA_2.onnx",
    params: ModelParams {
      dim_f: 2048,
      dim_t: 256,
      n_fft: 5120,
      hop: 1024,
      compensate: 1.035,
      adjust: 1.0,
      margin: 44100,
      chunk_size: 0,
    },
  },
  ModelPreset {
    name: "UVR-MDX-NET-Inst_HQ_3",
    filename: "UVR-MDX-NET-Inst_HQ_3.onnx",
    params: ModelParams {
      dim_f: 3072,
      dim_t: 256,
      n_fft: 6144,
      hop: 1024,
      compensate: 1.022,
      adjust: 1.0,
      margin: 44100,
      chunk_size: 0,
    },
  },
];

impl ModelPreset {
  pub fn model_path(&self) -> PathBuf {
    env::var("STEMSEP_MODELS")
      .map(PathBuf::from)
      .unwrap_or_else(|_| {
        env::current_exe()
          .expect("Failed to get exe path")
          .parent()
          .expect("Failed to get the parent path of exe")
          .join("models")
      })
      .join(self.filename)
  }

  pub fn exists(&self) -> bool {
    self.model_path().exists()
  }
}

/// Picks the model parameters and model file from the command line: an
/// explicit params JSON wins over the preset table.
pub fn resolve_model(args: &Cli) -> Result<(ModelParams, PathBuf)> {
  if let Some(path) = &args.params {
    let file =
      File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let params: ModelParams =
      serde_json::from_reader(file).context("Failed to parse model parameters")?;

    let model = args
      .model
      .clone()
      .ok_or_else(|| anyhow!("--model is required when --params is given"))?;

    return Ok((params, model));
  }

  let id = args
    .preset
    .ok_or_else(|| anyhow!("no preset or params given"))?;
  let preset = MDX_PRESETS
    .get(id)
    .ok_or_else(|| anyhow!("unknown preset {id}"))?;

  let model = args.model.clone().unwrap_or_else(|| preset.model_path());

  Ok((preset.params.clone(), model))
}

/// The ONNX session behind the core's inference boundary. `Session::run`
/// needs a mutable session, so it sits behind a mutex.
pub struct OrtModel {
  session: Mutex<Session>,
}

impl OrtModel {
  pub fn load(path: &Path) -> Result<Self> {
    tracing::info!(model = %path.display(), "Loading model...");

    let session = Session::builder()
      .context("Failed to get ort session builder")?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| anyhow!("Failed to optimize ort session: {e}"))?
      .commit_from_file(path)
      .context("Failed to load onnx model")?;

    Ok(Self {
      session: Mutex::new(session),
    })
  }
}

impl InferenceModel for OrtModel {
  fn run(&self, spek: ArrayView4<f32>) -> Result<Array4<f32>> {
    let input = Tensor::from_array((spek.shape().to_vec(), spek.to_owned().into_raw_vec()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| anyhow!("Inference session lock poisoned"))?;
    let outputs = session.run(ort::inputs!["input" => input])?;

    let (shape, data) = outputs["output"].try_extract_tensor::<f32>()?;
    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

    let [b, c, f, t] = dims[..] else {
      bail!("Expected a rank-4 output tensor, got shape {dims:?}");
    };

    Ok(Array4::from_shape_vec((b, c, f, t), data.to_vec())?)
  }
}
