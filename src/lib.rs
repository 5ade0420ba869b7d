//! Thermal Diffusion - Interactive GPU heat diffusion with post-effect compositing.
//!
//! This crate simulates 2D heat diffusion driven by a pointer: while the
//! primary button is held, a circular heat source is injected under the
//! pointer and spread by an explicit finite-difference scheme. Rendered frames
//! can be run through an ordered chain of full-screen post-effect passes.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Configuration and per-frame input types
//! - `compute`: Buffers, kernels, the diffusion solver, the compositor and the
//!   CPU and wgpu backends
//! - `simulation`: The per-frame loop tying them together
//!
//! # Example
//!
//! ```rust,no_run
//! use thermal_diffusion::{
//!     compute::CpuBackend,
//!     schema::{FrameInput, SessionConfig, Viewport},
//!     simulation::{FieldStats, Simulation},
//! };
//!
//! let viewport = Viewport::new(800, 600);
//! let mut sim = Simulation::new(CpuBackend::new(), SessionConfig::default(), viewport)?;
//!
//! // Hold the pointer at the centre for 30 frames
//! let input = FrameInput::new(viewport).with_pointer_down([400.0, 300.0]);
//! for _ in 0..30 {
//!     sim.step(&input, 1.0 / 60.0)?;
//! }
//!
//! let stats = FieldStats::of(&sim.read_field()?);
//! println!("Total heat after 30 frames: {}", stats.total);
//! sim.shutdown();
//! # Ok::<(), thermal_diffusion::simulation::SimulationError>(())
//! ```

pub mod compute;
pub mod schema;
pub mod simulation;

// Re-export commonly used types
pub use compute::{Backend, CpuBackend, DiffusionSolver, RenderEffect, SourceProvider};
pub use schema::{FrameInput, SessionConfig, Viewport};
pub use simulation::{Simulation, SimulationError, SimulationOutput};
