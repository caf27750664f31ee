use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use thiserror::Error;

/// Everything here is fatal: a failed invocation writes no partial stems
/// and is simply re-run wholesale.
#[derive(Debug, Error)]
pub enum SeparateError {
  #[error("invalid configuration: {0}")]
  Configuration(String),

  #[error("inference failed: {0}")]
  Inference(String),

  #[error("inference returned shape {got:?}, expected {expected:?}")]
  InferenceShape { expected: [usize; 4], got: Vec<usize> },

  #[error("separation cancelled")]
  Cancelled,
}

pub type Result<T> = std::result::Result<T, SeparateError>;

/// Cooperative cancellation, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }

  pub(crate) fn check(&self) -> Result<()> {
    if self.is_cancelled() {
      Err(SeparateError::Cancelled)
    } else {
      Ok(())
    }
  }
}
