mod cli;
mod model;
mod setup;
mod util;

use clap::Parser;
use stemsep_core::{CancelToken, Normalization, Separator};

use cli::Cli;
use model::{resolve_model, OrtModel, MDX_PRESETS};
use setup::{setup_ort, setup_tracing};
use util::{read_audio, write_audio};

fn main() {
  let args = Cli::parse();

  if args.preset.is_none() && args.params.is_none() {
    println!("Please specify the model you wish to use");
    println!("All available presets:");
    for (id, preset) in MDX_PRESETS.iter().enumerate() {
      if preset.exists() {
        println!("{id}. {}", preset.name);
      }
    }
    return;
  }

  setup_tracing();
  setup_ort(&args);

  if !args.input_path.is_file() {
    tracing::error!(input = ?args.input_path, "Input path is not regular file");
    return;
  }

  if !args.output_path.is_dir() {
    tracing::error!(output = ?args.output_path, "Output path is not directory");
    return;
  }

  let (params, model_path) = match resolve_model(&args) {
    Ok(resolved) => resolved,
    Err(err) => {
      tracing::error!(%err, "Failed to resolve the model configuration");
      return;
    }
  };

  let model = match OrtModel::load(&model_path) {
    Ok(model) => model,
    Err(err) => {
      tracing::error!(%err, "Failed to load the model");
      return;
    }
  };

  let separator = match Separator::new(params, model) {
    Ok(separator) => separator,
    Err(err) => {
      tracing::error!(%err, "Failed to build the separator");
      return;
    }
  };
  let separator = separator.with_denoise(args.denoise).with_normalization(
    if args.normalize {
      Normalization::Peak
    } else {
      Normalization::Off
    },
  );

  let mix = match read_audio(&args.input_path) {
    Ok(mix) => mix,
    Err(err) => {
      tracing::error!(%err, "Failed to read audio");
      return;
    }
  };

  let stems = match separator.separate(mix.view(), &CancelToken::new()) {
    Ok(stems) => stems,
    Err(err) => {
      tracing::error!(%err, "Failed to separate the mix");
      return;
    }
  };

  let origin_filename = args
    .input_path
    .file_stem()
    .expect("Failed to get input file stem")
    .to_string_lossy();

  let primary_path = args
    .output_path
    .join(format!("{origin_filename}_(Instrumental).wav"));
  let secondary_path = args
    .output_path
    .join(format!("{origin_filename}_(Vocals).wav"));

  tracing::info!("Saving Instrumental stem...");
  if let Err(err) = write_audio(&primary_path, stems.primary.view()) {
    tracing::error!(%err, "Failed to write the primary stem");
    return;
  }

  tracing::info!("Saving Vocals stem...");
  if let Err(err) = write_audio(&secondary_path, stems.secondary.view()) {
    tracing::error!(%err, "Failed to write the secondary stem");
    return;
  }

  tracing::info!("Separation complete!");
}
