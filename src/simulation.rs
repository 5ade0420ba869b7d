//! Per-frame driver tying the source, the solver and the compositor together.

use crate::compute::{
    Backend, BackendError, BufferError, DiffusionSolver, EffectError, RenderEffect, SolverError,
    SourceProvider, TextureHandle,
};
use crate::schema::{ConfigError, FrameInput, SessionConfig, Viewport};

/// Errors raised by the frame loop.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Source(#[from] BufferError),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("No heat field has been computed yet")]
    NoField,
}

/// What one frame published for renderers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationOutput<'a> {
    pub heat: &'a TextureHandle,
    pub heat_intensity: f32,
    pub resolution: (u32, u32),
    /// Whether the source was updated this frame (heat was injected).
    pub source_active: bool,
    /// Index of this frame, starting at 0.
    pub frame: u64,
    /// Accumulated frame time in seconds.
    pub time: f64,
}

/// Summary statistics of a read-back field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldStats {
    pub total: f64,
    pub max: f32,
    pub mean: f64,
}

impl FieldStats {
    pub fn of(field: &[f32]) -> Self {
        if field.is_empty() {
            return Self::default();
        }
        let total: f64 = field.iter().map(|&v| v as f64).sum();
        let max = field.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Self {
            total,
            max,
            mean: total / field.len() as f64,
        }
    }
}

/// Interactive heat diffusion session over one backend.
pub struct Simulation<B: Backend> {
    backend: B,
    source: SourceProvider,
    solver: DiffusionSolver,
    effect: RenderEffect,
    frame: u64,
    time: f64,
}

impl<B: Backend> Simulation<B> {
    /// Validate `config` and allocate the field for `viewport`.
    pub fn new(
        mut backend: B,
        config: SessionConfig,
        viewport: Viewport,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let solver = DiffusionSolver::new(&mut backend, config.solver, viewport)?;
        Ok(Self {
            backend,
            source: SourceProvider::new(config.source),
            solver,
            effect: RenderEffect::new(config.effect),
            frame: 0,
            time: 0.0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn solver(&self) -> &DiffusionSolver {
        &self.solver
    }

    pub fn source(&self) -> &SourceProvider {
        &self.source
    }

    pub fn effect(&self) -> &RenderEffect {
        &self.effect
    }

    pub fn effect_mut(&mut self) -> &mut RenderEffect {
        &mut self.effect
    }

    /// Frames advanced so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Run one frame: source update, then the solver step.
    ///
    /// Returns `None` when the viewport is empty; nothing advances and the
    /// next frame retries.
    pub fn step(
        &mut self,
        input: &FrameInput,
        dt: f32,
    ) -> Result<Option<SimulationOutput<'_>>, SimulationError> {
        let lod = self.solver.lod();
        let event = self.source.update(&mut self.backend, input, lod)?;
        let source_active = event.texture().is_some();
        let published = self
            .solver
            .step(&mut self.backend, input.viewport, event.texture())?;
        let Some(field) = published else {
            return Ok(None);
        };

        let frame = self.frame;
        self.frame += 1;
        self.time += dt as f64;
        Ok(Some(SimulationOutput {
            heat: field.heat,
            heat_intensity: field.heat_intensity,
            resolution: field.resolution(),
            source_active,
            frame,
            time: self.time,
        }))
    }

    /// Composite a rendered `frame` into `display`, honouring the toggle key.
    pub fn composite(
        &mut self,
        input: &FrameInput,
        frame: &TextureHandle,
        display: &TextureHandle,
    ) -> Result<(), SimulationError> {
        self.effect.handle_input(input);
        self.effect.render(&mut self.backend, frame, display)?;
        Ok(())
    }

    /// Read the current heat field back to the host.
    pub fn read_field(&mut self) -> Result<Vec<f32>, SimulationError> {
        let heat = self.solver.heat().ok_or(SimulationError::NoField)?;
        Ok(self.backend.read_back(heat)?)
    }

    /// Release every buffer the session owns and hand the backend back.
    pub fn shutdown(mut self) -> B {
        self.source.release(&mut self.backend);
        self.solver.release(&mut self.backend);
        self.effect.release(&mut self.backend);
        log::info!("Simulation shut down after {} frames", self.frame);
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{
        CpuBackend, FilterMode, Kernel, TextureFormat, TextureId, WrapMode, buffers,
    };
    use crate::schema::{EffectPass, SolverConfig};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session() -> Simulation<CpuBackend> {
        let config = SessionConfig {
            solver: SolverConfig {
                thermal_diffuse_coef: 1.0,
                iteration: 2,
                lod: 2,
                ..SolverConfig::default()
            },
            ..SessionConfig::default()
        };
        Simulation::new(CpuBackend::new(), config, Viewport::new(800, 600)).unwrap()
    }

    fn color(sim: &mut Simulation<CpuBackend>, width: u32, height: u32) -> TextureHandle {
        buffers::acquire(
            sim.backend_mut(),
            width,
            height,
            0,
            TextureFormat::ARGBFloat,
            WrapMode::Clamp,
            FilterMode::Point,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_held_pointer_heats_center() {
        let mut sim = session();
        let viewport = Viewport::new(800, 600);
        let input = FrameInput::new(viewport).with_pointer_down([400.0, 300.0]);

        for frame in 0..3 {
            let output = sim.step(&input, 1.0 / 60.0).unwrap().unwrap();
            assert_eq!(output.frame, frame);
            assert_eq!(output.resolution, (200, 150));
            assert!(output.source_active);
        }

        let field = sim.read_field().unwrap();
        let peak = field
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let (px, py) = (peak % 200, peak / 200);
        assert!((99..=100).contains(&px), "peak x {px}");
        assert!((74..=75).contains(&py), "peak y {py}");
        assert!(field[peak] > 0.0);
        assert_eq!(field[0], 0.0);
    }

    #[test]
    fn test_release_stops_injection() {
        let mut sim = session();
        let viewport = Viewport::new(800, 600);
        let held = FrameInput::new(viewport).with_pointer_down([400.0, 300.0]);
        for _ in 0..3 {
            sim.step(&held, 0.1).unwrap();
        }
        let injected = sim.backend().stats().dispatches_of(Kernel::AddSourceHeat);
        let before = FieldStats::of(&sim.read_field().unwrap());

        let output = sim.step(&FrameInput::new(viewport), 0.1).unwrap().unwrap();
        assert!(!output.source_active);

        let stats = sim.backend().stats();
        assert_eq!(stats.dispatches_of(Kernel::AddSourceHeat), injected);
        let after = FieldStats::of(&sim.read_field().unwrap());
        // Dirichlet edges only remove heat.
        assert!(after.total <= before.total + 1e-4);
        assert!(after.max <= before.max + 1e-6);
    }

    #[test]
    fn test_time_accumulates() {
        let mut sim = session();
        let input = FrameInput::new(Viewport::new(800, 600));
        sim.step(&input, 0.25).unwrap();
        let output = sim.step(&input, 0.25).unwrap().unwrap();
        assert_eq!(output.frame, 1);
        assert!((output.time - 0.5).abs() < 1e-9);
        assert_eq!(sim.frame(), 2);
    }

    #[test]
    fn test_empty_viewport_skips_frame() {
        let mut sim = session();
        let input = FrameInput::new(Viewport::new(0, 0)).with_pointer_down([0.0, 0.0]);

        assert!(sim.step(&input, 0.1).unwrap().is_none());
        assert_eq!(sim.frame(), 0);
        // The field from construction survives the empty frame.
        assert!(sim.solver().heat().is_some());
    }

    #[test]
    fn test_resize_reallocates_everything() {
        let mut sim = session();
        let created = Rc::new(RefCell::new(Vec::<TextureId>::new()));
        let sink = Rc::clone(&created);
        sim.effect_mut()
            .on_output_created(move |t| sink.borrow_mut().push(t.id()));

        let small = Viewport::new(800, 600);
        let input = FrameInput::new(small).with_pointer_down([10.0, 10.0]);
        sim.step(&input, 0.1).unwrap();
        let frame = color(&mut sim, 800, 600);
        let display = color(&mut sim, 800, 600);
        sim.composite(&input, &frame, &display).unwrap();
        let heat_before = sim.solver().heat().unwrap().id();
        let source_before = sim.source().texture().unwrap().id();

        let large = Viewport::new(1024, 768);
        let input = FrameInput::new(large).with_pointer_down([10.0, 10.0]);
        let output = sim.step(&input, 0.1).unwrap().unwrap();
        assert_eq!(output.resolution, (256, 192));
        let large_frame = color(&mut sim, 1024, 768);
        let large_display = color(&mut sim, 1024, 768);
        sim.composite(&input, &large_frame, &large_display).unwrap();

        assert_ne!(sim.solver().heat().unwrap().id(), heat_before);
        assert_ne!(sim.source().texture().unwrap().id(), source_before);
        let source = sim.source().texture().unwrap();
        assert_eq!((source.width(), source.height()), (256, 192));
        let output = sim.effect().output().unwrap();
        assert_eq!((output.width(), output.height()), (1024, 768));
        assert_eq!(created.borrow().len(), 2);
    }

    #[test]
    fn test_composite_toggle_key() {
        let mut sim = session();
        let viewport = Viewport::new(8, 8);
        let frame = color(&mut sim, 8, 8);
        let display = color(&mut sim, 8, 8);
        sim.effect_mut().set_show(true);
        let toggle = sim.effect().config().toggle_key;

        sim.composite(&FrameInput::new(viewport).with_key(toggle), &frame, &display)
            .unwrap();

        assert!(!sim.effect().is_showing());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SessionConfig::default();
        config.effect.passes = vec![EffectPass::BoxBlur { radius: 1000 }];
        let result = Simulation::new(CpuBackend::new(), config, Viewport::new(8, 8));
        assert!(matches!(result, Err(SimulationError::Config(_))));
    }

    #[test]
    fn test_shutdown_releases_all_buffers() {
        let mut sim = session();
        let viewport = Viewport::new(800, 600);
        let input = FrameInput::new(viewport).with_pointer_down([400.0, 300.0]);
        sim.step(&input, 0.1).unwrap();
        let frame = color(&mut sim, 800, 600);
        let display = color(&mut sim, 800, 600);
        sim.composite(&input, &frame, &display).unwrap();

        let mut backend = sim.shutdown();

        // Only the caller's frame and display remain.
        assert_eq!(backend.live_textures(), 2);
        backend.release_texture(&frame);
        backend.release_texture(&display);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_field_stats() {
        let stats = FieldStats::of(&[1.0, 3.0, 2.0, 2.0]);
        assert_eq!(stats.total, 8.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(FieldStats::of(&[]), FieldStats::default());
    }
}
