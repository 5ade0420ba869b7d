//! GPU compute backend
//!
//! Runs the diffusion kernels and compositor passes on the GPU through wgpu.

mod backend;

pub use backend::{WORKGROUP, WgpuBackend};

/// Error type for GPU operations.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Buffer mapping callback was dropped before completing")]
    MapCallbackDropped,

    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
}
