//! Schema module - Configuration and per-frame input types.

mod config;
mod input;

pub use config::*;
pub use input::*;
