pub mod scheduler;

pub use scheduler::{RunState, Scheduler};
