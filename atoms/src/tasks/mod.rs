pub mod model;

pub use model::{Priority, Task};
