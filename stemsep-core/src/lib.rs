mod demix;
mod error;
mod frame;
mod model;
mod params;
mod separator;
mod stft;

pub use demix::{ChunkDemixer, ReassemblyMode};
pub use error::{CancelToken, Result, SeparateError};
pub use frame::{segment, Chunk};
pub use model::{InferenceAdapter, InferenceModel};
pub use params::{ModelParams, DIM_C, SAMPLE_RATE};
pub use separator::{Normalization, Separator, Stems};
pub use stft::Stft;
