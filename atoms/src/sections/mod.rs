pub mod model;

pub use model::PhaseSection;
