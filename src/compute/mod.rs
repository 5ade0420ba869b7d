//! Compute module - Buffers, kernels and the per-frame diffusion pipeline.

mod backend;
pub mod buffers;
mod cpu;
mod effect;
mod solver;
mod source;
mod texture;
mod threads;

pub mod gpu;

pub use backend::*;
pub use buffers::BufferError;
pub use cpu::*;
pub use effect::*;
pub use solver::*;
pub use source::*;
pub use texture::*;
pub use threads::*;
