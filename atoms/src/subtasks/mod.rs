pub mod model;

pub use model::Subtask;
