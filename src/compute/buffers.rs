//! Buffer allocation with clear-on-create semantics.
//!
//! Every 2D buffer in the crate is created through [`acquire`], so a freshly
//! allocated buffer always starts at zero.

use super::{Backend, BackendError, FilterMode, TextureDesc, TextureFormat, TextureHandle, WrapMode};

/// Errors raised while acquiring a buffer.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The requested size has a zero axis, e.g. a minimised viewport.
    /// Transient: skip the frame and retry on the next one. The buffer passed
    /// in as `existing` is handed back untouched.
    #[error("Requested buffer size {width}x{height} has a zero dimension")]
    ZeroSized {
        width: u32,
        height: u32,
        existing: Option<TextureHandle>,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl BufferError {
    /// Whether the caller should skip this frame rather than fail.
    pub fn is_transient(&self) -> bool {
        matches!(self, BufferError::ZeroSized { .. })
    }
}

/// Return a buffer of `width` x `height`.
///
/// If `existing` already has that size it is handed back untouched. Otherwise
/// `existing` is released and a new random-write buffer with the requested
/// format, wrap and filter is created and cleared to zero.
///
/// On a zero-sized request nothing is released or allocated and `existing`
/// comes back inside [`BufferError::ZeroSized`].
#[allow(clippy::too_many_arguments)]
pub fn acquire<B: Backend + ?Sized>(
    backend: &mut B,
    width: u32,
    height: u32,
    depth: u32,
    format: TextureFormat,
    wrap: WrapMode,
    filter: FilterMode,
    existing: Option<TextureHandle>,
) -> Result<TextureHandle, BufferError> {
    let existing = match existing {
        Some(texture) if texture.desc().same_size(width, height) => return Ok(texture),
        other => other,
    };

    if width == 0 || height == 0 {
        return Err(BufferError::ZeroSized {
            width,
            height,
            existing,
        });
    }

    release(backend, existing);

    let desc = TextureDesc {
        width,
        height,
        depth,
        format,
        wrap,
        filter,
        random_write: true,
    };
    let texture = backend.create_texture(&desc)?;
    if let Err(e) = backend.clear_texture(&texture) {
        backend.release_texture(&texture);
        return Err(e.into());
    }

    log::debug!(
        "{}: allocated {:?} {}x{} {:?}",
        backend.name(),
        texture.id(),
        width,
        height,
        format
    );
    Ok(texture)
}

/// Free `texture` if present.
pub fn release<B: Backend + ?Sized>(backend: &mut B, texture: Option<TextureHandle>) {
    if let Some(texture) = texture {
        log::debug!("{}: released {:?}", backend.name(), texture.id());
        backend.release_texture(&texture);
    }
}
