//! Per-frame input sampled from the host: viewport, pointer and keys.

use serde::{Deserialize, Serialize};

/// Viewport size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size after a level-of-detail right shift.
    #[inline]
    pub fn scaled(&self, shift: u32) -> (u32, u32) {
        (
            self.width.checked_shr(shift).unwrap_or(0),
            self.height.checked_shr(shift).unwrap_or(0),
        )
    }

    /// True when either axis is zero, e.g. a minimised window.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel position to normalized viewport coordinates in `[0, 1]`.
    ///
    /// Row 0 of every buffer maps to `v = 0`, so the pointer and the buffers
    /// share one origin.
    pub fn normalize(&self, position: [f32; 2]) -> [f32; 2] {
        if self.is_empty() {
            return [0.0, 0.0];
        }
        [
            position[0] / self.width as f32,
            position[1] / self.height as f32,
        ]
    }
}

/// Pointer device state for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointerState {
    /// Position in viewport pixels.
    pub position: [f32; 2],
    /// Whether the primary button is held.
    pub primary_down: bool,
}

/// Everything sampled from the host once per frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameInput {
    pub viewport: Viewport,
    pub pointer: PointerState,
    /// Keys that went down this frame.
    pub keys_pressed: Vec<char>,
}

impl FrameInput {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Default::default()
        }
    }

    /// Builder-style: primary button held at `position`.
    pub fn with_pointer_down(mut self, position: [f32; 2]) -> Self {
        self.pointer = PointerState {
            position,
            primary_down: true,
        };
        self
    }

    /// Builder-style: `key` pressed this frame.
    pub fn with_key(mut self, key: char) -> Self {
        self.keys_pressed.push(key);
        self
    }

    #[inline]
    pub fn key_pressed(&self, key: char) -> bool {
        self.keys_pressed.contains(&key)
    }
}
