use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(version, author)]
#[command(about = "MDX-Net two-stem audio source separation", long_about = None)]
pub struct Cli {
  #[arg(short, long, help = "Input audio file path")]
  #[arg(value_name = "INPUT")]
  pub input_path: PathBuf,

  #[arg(short, long, help = "Directory to save output stems")]
  #[arg(value_name = "OUTPUT", default_value = ".")]
  pub output_path: PathBuf,

  #[arg(
    short,
    long,
    help = "The model preset used, leave blank to see all available presets"
  )]
  #[arg(value_name = "PRESET")]
  pub preset: Option<usize>,

  #[arg(long, help = "Model parameters JSON, replaces the preset table")]
  #[arg(value_name = "PARAMS")]
  pub params: Option<PathBuf>,

  #[arg(short, long, help = "ONNX model file, overrides the preset lookup")]
  #[arg(value_name = "MODEL")]
  pub model: Option<PathBuf>,

  #[arg(long, help = "Run inference twice (signal and negation) and average")]
  pub denoise: bool,

  #[arg(long, help = "Peak-normalize the stems before writing")]
  pub normalize: bool,

  #[arg(short, long, help = "Use CUDA backend for inference")]
  pub cuda_backend: bool,
}
