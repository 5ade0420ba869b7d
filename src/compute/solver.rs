//! Diffusion solver - advances the heat field once per frame.
//!
//! Each frame pushes the kernel parameters and runs `iteration` sub-steps of
//! inject -> diffuse -> boundary -> commit over a double-buffered field.

use super::{
    Backend, BackendError, BufferError, DeviceLimits, FilterMode, GpuThreads, Kernel,
    KernelBindings, KernelParams, TextureFormat, TextureHandle, ThreadGroupError, WrapMode,
    buffers,
};
use crate::schema::{ConfigError, SolverConfig, Viewport};

/// Field state published after a frame for downstream renderers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishedField<'a> {
    /// Current heat field.
    pub heat: &'a TextureHandle,
    /// Source intensity, used by renderers to normalize the field.
    pub heat_intensity: f32,
}

impl PublishedField<'_> {
    #[inline]
    pub fn resolution(&self) -> (u32, u32) {
        (self.heat.width(), self.heat.height())
    }
}

/// Errors raised by the diffusion solver.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Invalid solver configuration: {0}")]
    Config(#[from] ConfigError),

    /// The device cannot run the kernels. Fatal.
    #[error("Unsupported compute device: {0}")]
    ThreadGroup(#[from] ThreadGroupError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// GPU heat diffusion solver over a double-buffered field.
pub struct DiffusionSolver {
    config: SolverConfig,
    params: KernelParams,
    threads: GpuThreads,
    limits: DeviceLimits,
    /// Viewport the field buffers were sized for.
    viewport: Viewport,
    heat: Option<TextureHandle>,
    prev_heat: Option<TextureHandle>,
}

impl DiffusionSolver {
    /// Validate the configuration and the device, then allocate the field for `viewport`.
    ///
    /// Fails if the kernels' work-group shape exceeds the device limits; there
    /// is no degraded mode for that.
    pub fn new<B: Backend + ?Sized>(
        backend: &mut B,
        config: SolverConfig,
        viewport: Viewport,
    ) -> Result<Self, SolverError> {
        config.validate()?;

        let threads = backend.kernel_threads(Kernel::AddSourceHeat);
        let limits = backend.limits();
        threads.validate(&limits)?;

        let stability = config.stability_number();
        if stability > 0.5 {
            log::warn!(
                "Diffusion stability number {:.3} exceeds 0.5; the field may oscillate",
                stability
            );
        }
        log::info!(
            "Diffusion solver on {} backend, thread group {}x{}x{}",
            backend.name(),
            threads.x,
            threads.y,
            threads.z
        );

        let mut solver = Self {
            params: config.kernel_params(),
            config,
            threads,
            limits,
            viewport: Viewport::default(),
            heat: None,
            prev_heat: None,
        };
        solver.resize(backend, viewport)?;
        Ok(solver)
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Level-of-detail shift; the source buffer uses the same resolution.
    #[inline]
    pub fn lod(&self) -> u32 {
        self.config.lod
    }

    pub fn threads(&self) -> GpuThreads {
        self.threads
    }

    /// Current heat field, if allocated.
    pub fn heat(&self) -> Option<&TextureHandle> {
        self.heat.as_ref()
    }

    /// Field snapshot the next sub-step reads.
    pub fn prev_heat(&self) -> Option<&TextureHandle> {
        self.prev_heat.as_ref()
    }

    /// (Re)allocate both field buffers for `viewport`.
    ///
    /// Returns `false` when the field would be zero-sized; the frame is
    /// skipped and the resize retried next frame.
    fn resize<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        viewport: Viewport,
    ) -> Result<bool, SolverError> {
        let (width, height) = viewport.scaled(self.config.lod);
        if width == 0 || height == 0 {
            log::debug!(
                "Skipping frame: viewport {}x{} gives an empty field",
                viewport.width,
                viewport.height
            );
            return Ok(false);
        }

        for slot in [&mut self.heat, &mut self.prev_heat] {
            let texture = buffers::acquire(
                backend,
                width,
                height,
                0,
                TextureFormat::RHalf,
                WrapMode::Clamp,
                FilterMode::Point,
                slot.take(),
            )?;
            *slot = Some(texture);
        }

        if self.viewport != viewport {
            log::debug!(
                "Heat field resized to {}x{} for viewport {}x{}",
                width,
                height,
                viewport.width,
                viewport.height
            );
        }
        self.viewport = viewport;
        Ok(true)
    }

    /// Advance the field by one frame.
    ///
    /// `source` is the buffer from this frame's source update; with `None`
    /// the inject kernel is not dispatched at all. Returns `None` when the
    /// frame was skipped because the viewport is empty.
    pub fn step<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        viewport: Viewport,
        source: Option<&TextureHandle>,
    ) -> Result<Option<PublishedField<'_>>, SolverError> {
        let needs_resize = self.heat.is_none() || self.viewport != viewport;
        if needs_resize && !self.resize(backend, viewport)? {
            return Ok(None);
        }

        let (Some(heat), Some(prev_heat)) = (self.heat.as_ref(), self.prev_heat.as_ref()) else {
            return Ok(None);
        };

        let groups =
            self.threads
                .dispatch_grid_checked(heat.width(), heat.height(), &self.limits)?;

        backend.set_params(&self.params);

        let inject = KernelBindings {
            source,
            heat,
            prev_heat: Some(prev_heat),
        };
        let diffuse = KernelBindings {
            source: None,
            heat,
            prev_heat: Some(prev_heat),
        };
        let boundary = KernelBindings {
            source: None,
            heat,
            prev_heat: None,
        };

        for _ in 0..self.config.iteration {
            if source.is_some() {
                backend.dispatch(Kernel::AddSourceHeat, &inject, groups)?;
            }
            backend.dispatch(Kernel::DiffuseHeat, &diffuse, groups)?;
            backend.dispatch(Kernel::SetBoundaryHeat, &boundary, groups)?;
            backend.copy_texture(heat, prev_heat)?;
        }
        backend.submit();

        Ok(Some(PublishedField {
            heat,
            heat_intensity: self.params.adding_heat_intensity,
        }))
    }

    /// Overwrite both field buffers with host data, e.g. an initial condition.
    pub fn upload_field<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        data: &[f32],
    ) -> Result<(), SolverError> {
        for texture in [&self.heat, &self.prev_heat].into_iter().flatten() {
            backend.upload(texture, data)?;
        }
        Ok(())
    }

    /// Free both field buffers.
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        buffers::release(backend, self.heat.take());
        buffers::release(backend, self.prev_heat.take());
        self.viewport = Viewport::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{CPU_THREADS, CpuBackend};

    fn small_config() -> SolverConfig {
        SolverConfig {
            iteration: 4,
            ..SolverConfig::default()
        }
    }

    fn max_abs(data: &[f32]) -> f32 {
        data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    #[test]
    fn test_rejects_oversized_thread_group() {
        let mut backend =
            CpuBackend::with_threads(GpuThreads::new(64, 32, 1), DeviceLimits::default());
        let result = DiffusionSolver::new(&mut backend, small_config(), Viewport::new(8, 8));
        assert!(matches!(result, Err(SolverError::ThreadGroup(_))));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut backend = CpuBackend::new();
        let config = SolverConfig {
            delta_x: 0.0,
            ..small_config()
        };
        let result = DiffusionSolver::new(&mut backend, config, Viewport::new(8, 8));
        assert!(matches!(result, Err(SolverError::Config(_))));
    }

    #[test]
    fn test_field_resolution_follows_lod() {
        let mut backend = CpuBackend::new();
        let config = SolverConfig {
            lod: 1,
            ..small_config()
        };
        let solver = DiffusionSolver::new(&mut backend, config, Viewport::new(64, 32)).unwrap();
        let heat = solver.heat().unwrap();
        assert_eq!((heat.width(), heat.height()), (32, 16));
        assert_eq!(heat.format(), TextureFormat::RHalf);
        assert_eq!(backend.live_textures(), 2);
    }

    #[test]
    fn test_step_uses_backend_threads_and_config_params() {
        let mut backend = CpuBackend::new();
        let viewport = Viewport::new(16, 16);
        let config = SolverConfig {
            thermal_diffuse_coef: 2.0,
            boundary_value: 0.5,
            ..small_config()
        };
        let mut solver = DiffusionSolver::new(&mut backend, config.clone(), viewport).unwrap();
        assert_eq!(solver.threads(), CPU_THREADS);

        solver.step(&mut backend, viewport, None).unwrap();

        assert_eq!(backend.params(), &config.kernel_params());
        assert_eq!(backend.params().boundary_value, 0.5);
    }

    #[test]
    fn test_no_source_skips_injection() {
        let mut backend = CpuBackend::new();
        let viewport = Viewport::new(16, 16);
        let mut solver = DiffusionSolver::new(&mut backend, small_config(), viewport).unwrap();

        let published = solver.step(&mut backend, viewport, None).unwrap().unwrap();
        let heat = published.heat.clone();

        let stats = backend.stats();
        assert_eq!(stats.dispatches_of(Kernel::AddSourceHeat), 0);
        assert_eq!(stats.dispatches_of(Kernel::DiffuseHeat), 4);
        assert_eq!(stats.dispatches_of(Kernel::SetBoundaryHeat), 4);
        assert_eq!(stats.copies, 4);
        assert_eq!(max_abs(&backend.read_back(&heat).unwrap()), 0.0);
    }

    #[test]
    fn test_source_injects_heat() {
        let mut backend = CpuBackend::new();
        let viewport = Viewport::new(16, 16);
        let mut solver = DiffusionSolver::new(&mut backend, small_config(), viewport).unwrap();
        let source = buffers::acquire(
            &mut backend,
            16,
            16,
            0,
            TextureFormat::RHalf,
            WrapMode::Clamp,
            FilterMode::Bilinear,
            None,
        )
        .unwrap();
        backend.draw_source(&source, [0.5, 0.5], 0.2).unwrap();

        let published = solver
            .step(&mut backend, viewport, Some(&source))
            .unwrap()
            .unwrap();
        assert_eq!(published.heat_intensity, 10.0);
        let heat = published.heat.clone();

        assert_eq!(backend.stats().dispatches_of(Kernel::AddSourceHeat), 4);
        let field = backend.read_back(&heat).unwrap();
        assert!(field[8 * 16 + 8] > 0.0);
        // Boundary enforced after injection.
        assert_eq!(field[0], 0.0);
        assert_eq!(field[15 * 16 + 15], 0.0);
    }

    #[test]
    fn test_commit_copies_heat_into_prev() {
        let mut backend = CpuBackend::new();
        let viewport = Viewport::new(8, 8);
        let mut solver = DiffusionSolver::new(&mut backend, small_config(), viewport).unwrap();
        solver.upload_field(&mut backend, &[1.0; 64]).unwrap();

        solver.step(&mut backend, viewport, None).unwrap();

        let heat = backend.read_back(solver.heat().unwrap()).unwrap();
        let prev = backend.read_back(solver.prev_heat().unwrap()).unwrap();
        assert_eq!(heat, prev);
    }

    #[test]
    fn test_dispatch_grid_matches_field() {
        let mut backend = CpuBackend::new();
        let viewport = Viewport::new(50, 17);
        let mut solver = DiffusionSolver::new(&mut backend, small_config(), viewport).unwrap();
        solver.step(&mut backend, viewport, None).unwrap();
        assert_eq!(backend.stats().last_groups, Some([7, 3, 1]));
    }

    #[test]
    fn test_uniform_field_converges_to_boundary() {
        let mut backend = CpuBackend::new();
        let viewport = Viewport::new(8, 8);
        let mut solver = DiffusionSolver::new(&mut backend, small_config(), viewport).unwrap();
        solver.upload_field(&mut backend, &[1.0; 64]).unwrap();

        for _ in 0..300 {
            solver.step(&mut backend, viewport, None).unwrap();
        }
        let settled = backend.read_back(solver.heat().unwrap()).unwrap();
        assert!(max_abs(&settled) < 1e-4);

        solver.step(&mut backend, viewport, None).unwrap();
        let again = backend.read_back(solver.heat().unwrap()).unwrap();
        for (a, b) in settled.iter().zip(again.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_field_at_boundary_value_is_fixed_point() {
        let mut backend = CpuBackend::new();
        let viewport = Viewport::new(8, 8);
        let config = SolverConfig {
            boundary_value: 1.0,
            ..small_config()
        };
        let mut solver = DiffusionSolver::new(&mut backend, config, viewport).unwrap();
        solver.upload_field(&mut backend, &[1.0; 64]).unwrap();

        for _ in 0..10 {
            solver.step(&mut backend, viewport, None).unwrap();
        }
        let field = backend.read_back(solver.heat().unwrap()).unwrap();
        assert!(field.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_resize_reallocates_both_buffers() {
        let mut backend = CpuBackend::new();
        let mut solver =
            DiffusionSolver::new(&mut backend, small_config(), Viewport::new(16, 16)).unwrap();
        let old = solver.heat().unwrap().id();

        let published = solver
            .step(&mut backend, Viewport::new(32, 16), None)
            .unwrap()
            .unwrap();

        assert_eq!(published.resolution(), (32, 16));
        assert_ne!(published.heat.id(), old);
        assert_eq!(backend.stats().textures_released, 2);
        assert_eq!(backend.live_textures(), 2);
    }

    #[test]
    fn test_empty_viewport_skips_frame() {
        let mut backend = CpuBackend::new();
        let mut solver =
            DiffusionSolver::new(&mut backend, small_config(), Viewport::new(16, 16)).unwrap();

        let published = solver.step(&mut backend, Viewport::new(0, 16), None).unwrap();

        assert!(published.is_none());
        assert_eq!(backend.stats().dispatches_of(Kernel::DiffuseHeat), 0);
        // Buffers kept for the retry.
        assert_eq!(backend.live_textures(), 2);

        let published = solver.step(&mut backend, Viewport::new(16, 16), None).unwrap();
        assert!(published.is_some());
    }

    #[test]
    fn test_release() {
        let mut backend = CpuBackend::new();
        let mut solver =
            DiffusionSolver::new(&mut backend, small_config(), Viewport::new(8, 8)).unwrap();
        solver.release(&mut backend);
        assert!(solver.heat().is_none());
        assert_eq!(backend.live_textures(), 0);
    }
}
