pub mod model;

pub use model::{Phase, DEFAULT_PHASE_NAME};
