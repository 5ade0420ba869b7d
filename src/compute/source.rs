//! Pointer source provider.
//!
//! Turns the pointer state of each frame into a heat impulse buffer that the
//! diffusion solver injects.

use super::{Backend, BufferError, FilterMode, TextureFormat, TextureHandle, WrapMode, buffers};
use crate::schema::{FrameInput, SourceConfig};

/// Result of one source update, consumed by the solver in the same frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEvent<'a> {
    /// The impulse was drawn into this buffer.
    Updated(&'a TextureHandle),
    /// No active source this frame; injection is skipped.
    Cleared,
}

impl<'a> SourceEvent<'a> {
    /// The source buffer, if any.
    pub fn texture(&self) -> Option<&'a TextureHandle> {
        match *self {
            SourceEvent::Updated(texture) => Some(texture),
            SourceEvent::Cleared => None,
        }
    }
}

/// Produces the per-frame source buffer from pointer input.
pub struct SourceProvider {
    config: SourceConfig,
    texture: Option<TextureHandle>,
    last_position: Option<[f32; 2]>,
    delta: [f32; 2],
}

impl SourceProvider {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            texture: None,
            last_position: None,
            delta: [0.0, 0.0],
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Current source buffer, if allocated.
    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture.as_ref()
    }

    /// Pointer movement in pixels since the previous frame.
    pub fn pointer_delta(&self) -> [f32; 2] {
        self.delta
    }

    /// Run one frame: resize the buffer to `viewport >> lod`, then draw the
    /// impulse if the primary button is held.
    ///
    /// A zero-sized target yields [`SourceEvent::Cleared`] without drawing.
    pub fn update<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        input: &FrameInput,
        lod: u32,
    ) -> Result<SourceEvent<'_>, BufferError> {
        self.track_pointer(input.pointer.position);

        let (width, height) = input.viewport.scaled(lod);
        let texture = match buffers::acquire(
            backend,
            width,
            height,
            0,
            TextureFormat::RHalf,
            WrapMode::Clamp,
            FilterMode::Bilinear,
            self.texture.take(),
        ) {
            Ok(texture) => texture,
            Err(BufferError::ZeroSized { existing, .. }) => {
                log::warn!("Source buffer skipped: target is {}x{}", width, height);
                self.texture = existing;
                return Ok(SourceEvent::Cleared);
            }
            Err(e) => return Err(e),
        };
        let texture = self.texture.insert(texture);

        if !input.pointer.primary_down {
            return Ok(SourceEvent::Cleared);
        }

        let center = input.viewport.normalize(input.pointer.position);
        backend.draw_source(texture, center, self.config.radius)?;
        Ok(SourceEvent::Updated(texture))
    }

    fn track_pointer(&mut self, position: [f32; 2]) {
        self.delta = match self.last_position {
            Some(last) => [position[0] - last[0], position[1] - last[1]],
            None => [0.0, 0.0],
        };
        self.last_position = Some(position);
    }

    /// Free the source buffer.
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        buffers::release(backend, self.texture.take());
    }
}
