//! Infrastructure services

mod step_options;

pub use step_options::{load_step_options, StepOptions};
