//! Compute backend abstraction.
//!
//! Both the host reference backend ([`CpuBackend`](super::CpuBackend)) and the
//! wgpu backend ([`WgpuBackend`](super::gpu::WgpuBackend)) implement [`Backend`].
//! Every operation is recorded into a single ordered stream, so a dispatch that
//! reads a buffer observes all earlier writes to it.

use super::{DeviceLimits, GpuThreads, TextureDesc, TextureHandle, TextureId};
use crate::schema::EffectPass;

/// Diffusion kernels, in the order they run within one sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// `heat = prev_heat + dt * intensity * source`
    AddSourceHeat,
    /// `heat += dt * coef * laplacian(prev_heat)`
    DiffuseHeat,
    /// Edge cells of `heat` are set to the boundary value.
    SetBoundaryHeat,
}

impl Kernel {
    pub const ALL: [Kernel; 3] = [
        Kernel::AddSourceHeat,
        Kernel::DiffuseHeat,
        Kernel::SetBoundaryHeat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kernel::AddSourceHeat => "AddSourceHeat",
            Kernel::DiffuseHeat => "DiffuseHeat",
            Kernel::SetBoundaryHeat => "SetBoundaryHeat",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Kernel::AddSourceHeat => 0,
            Kernel::DiffuseHeat => 1,
            Kernel::SetBoundaryHeat => 2,
        }
    }
}

/// Scalar parameters shared by the diffusion kernels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    pub thermal_diffuse_coef: f32,
    pub delta_time: f32,
    pub adding_heat_intensity: f32,
    pub delta_x: f32,
    pub delta_y: f32,
    pub boundary_value: f32,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            thermal_diffuse_coef: 500.0,
            delta_time: 0.01,
            adding_heat_intensity: 10.0,
            delta_x: 5.0,
            delta_y: 5.0,
            boundary_value: 0.0,
        }
    }
}

/// Buffers bound for one kernel dispatch.
#[derive(Debug, Clone, Copy)]
pub struct KernelBindings<'a> {
    pub source: Option<&'a TextureHandle>,
    pub heat: &'a TextureHandle,
    pub prev_heat: Option<&'a TextureHandle>,
}

/// Errors raised by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Texture {0:?} is not live on this backend")]
    UnknownTexture(TextureId),

    #[error("Cannot create a {width}x{height} texture")]
    InvalidSize { width: u32, height: u32 },

    #[error("Kernel {kernel} requires binding `{binding}`")]
    MissingBinding {
        kernel: &'static str,
        binding: &'static str,
    },

    #[error("Texture size mismatch: {src:?} vs {dst:?}")]
    SizeMismatch { src: (u32, u32), dst: (u32, u32) },

    #[error("Upload of {got} values into a texture holding {expected}")]
    UploadSize { expected: usize, got: usize },

    #[error("A dispatch cannot read and write the same texture {0:?}")]
    Aliased(TextureId),

    #[error(transparent)]
    Gpu(#[from] super::gpu::GpuError),
}

/// Ordered command stream over backend-owned 2D buffers.
pub trait Backend {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    /// Compute limits of the underlying device.
    fn limits(&self) -> DeviceLimits;

    /// Work-group shape `kernel` was compiled with.
    fn kernel_threads(&self, kernel: Kernel) -> GpuThreads;

    /// Allocate a new buffer. Contents are unspecified until cleared.
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError>;

    /// Free a buffer. Releasing a stale handle is a no-op.
    fn release_texture(&mut self, texture: &TextureHandle);

    /// Fill every channel of every texel with zero.
    fn clear_texture(&mut self, texture: &TextureHandle) -> Result<(), BackendError>;

    /// Replace the contents of `texture` with host data (row-major, interleaved channels).
    fn upload(&mut self, texture: &TextureHandle, data: &[f32]) -> Result<(), BackendError>;

    /// Read `texture` back to the host, completing all pending work first.
    fn read_back(&mut self, texture: &TextureHandle) -> Result<Vec<f32>, BackendError>;

    /// Set the scalar parameters used by subsequent dispatches.
    fn set_params(&mut self, params: &KernelParams);

    /// Launch `groups` work-groups of `kernel`.
    fn dispatch(
        &mut self,
        kernel: Kernel,
        bindings: &KernelBindings<'_>,
        groups: [u32; 3],
    ) -> Result<(), BackendError>;

    /// Full copy between two buffers of equal size.
    fn copy_texture(&mut self, src: &TextureHandle, dst: &TextureHandle)
    -> Result<(), BackendError>;

    /// Resampling copy into a buffer of any size, using the source's filter and wrap.
    fn blit(&mut self, src: &TextureHandle, dst: &TextureHandle) -> Result<(), BackendError>;

    /// Render a circular impulse `max(0, 1 - d / radius)` around the uv `center`
    /// into every texel of `target`.
    fn draw_source(
        &mut self,
        target: &TextureHandle,
        center: [f32; 2],
        radius: f32,
    ) -> Result<(), BackendError>;

    /// Apply one post-effect pass, reading `src` and writing `dst`.
    fn apply_effect(
        &mut self,
        effect: &EffectPass,
        src: &TextureHandle,
        dst: &TextureHandle,
    ) -> Result<(), BackendError>;

    /// Flush recorded work to the device.
    fn submit(&mut self);

    /// Number of buffers currently allocated.
    fn live_textures(&self) -> usize;
}

pub(crate) fn ensure_distinct(
    src: &TextureHandle,
    dst: &TextureHandle,
) -> Result<(), BackendError> {
    if src.id() == dst.id() {
        return Err(BackendError::Aliased(src.id()));
    }
    Ok(())
}

pub(crate) fn require_binding<'a>(
    kernel: Kernel,
    binding: &'static str,
    texture: Option<&'a TextureHandle>,
) -> Result<&'a TextureHandle, BackendError> {
    texture.ok_or(BackendError::MissingBinding {
        kernel: kernel.name(),
        binding,
    })
}
