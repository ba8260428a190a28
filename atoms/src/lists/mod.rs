pub mod model;

pub use model::{ListColor, ListParent, ListSettings, TaskList};
