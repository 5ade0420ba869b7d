//! Multi-pass post-effect compositor.
//!
//! Runs an ordered chain of full-screen passes over each rendered frame using
//! a ping-pong buffer pair, and keeps the final image in an output buffer that
//! observers can sample.

use super::{Backend, BackendError, BufferError, FilterMode, TextureHandle, buffers};
use crate::schema::{EffectConfig, FrameInput};

/// Depth bits requested for compositor buffers.
const EFFECT_DEPTH: u32 = 16;

/// Callback fired with the new output buffer whenever it is (re)created.
pub type OutputListener = Box<dyn FnMut(&TextureHandle)>;

/// Errors raised while compositing a frame.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Effect buffers are not allocated")]
    MissingBuffers,
}

/// Ordered post-effect chain with ping-pong buffers.
pub struct RenderEffect {
    config: EffectConfig,
    show: bool,
    ping_pong: [Option<TextureHandle>; 2],
    output: Option<TextureHandle>,
    listeners: Vec<OutputListener>,
}

impl RenderEffect {
    pub fn new(config: EffectConfig) -> Self {
        Self {
            show: config.show,
            config,
            ping_pong: [None, None],
            output: None,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Whether the pass output (rather than the raw input) reaches the display.
    #[inline]
    pub fn is_showing(&self) -> bool {
        self.show
    }

    pub fn set_show(&mut self, show: bool) {
        self.show = show;
    }

    /// Final image of the last composited frame.
    pub fn output(&self) -> Option<&TextureHandle> {
        self.output.as_ref()
    }

    /// Register an observer of output buffer (re)creation.
    ///
    /// The previous output handle is invalid as soon as the callback runs.
    pub fn on_output_created(&mut self, listener: impl FnMut(&TextureHandle) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Flip the visibility toggle if its key went down this frame.
    pub fn handle_input(&mut self, input: &FrameInput) {
        if input.key_pressed(self.config.toggle_key) {
            self.show = !self.show;
            log::info!("Post effects {}", if self.show { "shown" } else { "hidden" });
        }
    }

    /// Composite one frame from `src` into `dst`.
    pub fn render<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        src: &TextureHandle,
        dst: &TextureHandle,
    ) -> Result<(), EffectError> {
        let shift = self.config.down_sample;
        let width = src.width().checked_shr(shift).unwrap_or(0);
        let height = src.height().checked_shr(shift).unwrap_or(0);
        if width == 0 || height == 0 {
            log::debug!("Effect target is empty; passing the frame through");
            backend.blit(src, dst)?;
            backend.submit();
            return Ok(());
        }

        self.check_buffers(backend, width, height)?;
        let [Some(first), Some(second)] = &self.ping_pong else {
            return Err(EffectError::MissingBuffers);
        };
        let Some(output) = self.output.as_ref() else {
            return Err(EffectError::MissingBuffers);
        };

        let (mut read, mut write) = (first, second);
        backend.blit(src, read)?;
        for pass in &self.config.passes {
            backend.apply_effect(pass, read, write)?;
            std::mem::swap(&mut read, &mut write);
        }
        backend.copy_texture(read, output)?;

        if self.show {
            backend.blit(output, dst)?;
        } else {
            backend.blit(src, dst)?;
        }
        backend.submit();
        Ok(())
    }

    /// Reallocate the ping-pong pair and the output when the target size changes.
    fn check_buffers<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<(), EffectError> {
        // A failed allocation can leave any slot empty.
        let current = self
            .ping_pong
            .iter()
            .chain(std::iter::once(&self.output))
            .all(|slot| slot.as_ref().is_some_and(|t| t.desc().same_size(width, height)));
        if current {
            return Ok(());
        }

        let (format, wrap) = (self.config.format, self.config.wrap);
        for slot in self.ping_pong.iter_mut().chain(std::iter::once(&mut self.output)) {
            let texture = buffers::acquire(
                backend,
                width,
                height,
                EFFECT_DEPTH,
                format,
                wrap,
                FilterMode::Bilinear,
                slot.take(),
            )?;
            *slot = Some(texture);
        }
        log::debug!("Effect buffers resized to {}x{}", width, height);

        if let Some(output) = self.output.as_ref() {
            for listener in &mut self.listeners {
                listener(output);
            }
        }
        Ok(())
    }

    /// Free the ping-pong pair and the output buffer.
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        for slot in self.ping_pong.iter_mut().chain(std::iter::once(&mut self.output)) {
            buffers::release(backend, slot.take());
        }
    }
}
