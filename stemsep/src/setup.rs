use smallvec::SmallVec;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::{
  cli::Cli,
  model::{setup_backends, Backend},
};

pub fn setup_tracing() {
  let subscriber = FmtSubscriber::builder()
    .with_max_level(Level::INFO)
    .with_target(false)
    .finish();

  tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");
}

pub fn setup_ort(args: &Cli) {
  let mut backends: SmallVec<[_; 2]> = SmallVec::new();

  if args.cuda_backend {
    backends.push(Backend::Cuda);
  }

  if backends.is_empty() {
    tracing::warn!("No backend is specified, use CPU for inference...");
    backends.push(Backend::Cpu);
  }

  setup_backends(backends).expect("Init ort execution providers failed");
}
