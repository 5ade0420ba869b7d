//! GPU 2D buffer descriptors and handles.
//!
//! A buffer is a width x height grid of texels with 1 or 4 float channels.
//! Backends own the storage; the rest of the crate only holds [`TextureHandle`]s.

use serde::{Deserialize, Serialize};

/// Texel format of a 2D buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TextureFormat {
    /// Single 16-bit float channel (scalar fields).
    #[default]
    RHalf,
    /// Single 32-bit float channel.
    RFloat,
    /// Four 16-bit float channels.
    ARGBHalf,
    /// Four 32-bit float channels (wide colour).
    ARGBFloat,
}

impl TextureFormat {
    /// Number of channels per texel.
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            TextureFormat::RHalf | TextureFormat::RFloat => 1,
            TextureFormat::ARGBHalf | TextureFormat::ARGBFloat => 4,
        }
    }
}

/// Addressing mode for reads outside `[0, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
    Mirror,
}

impl WrapMode {
    /// Map a possibly out-of-range texel coordinate into `[0, size)`.
    pub fn apply(self, coord: i64, size: u32) -> u32 {
        let size = size.max(1) as i64;
        let mapped = match self {
            WrapMode::Repeat => coord.rem_euclid(size),
            WrapMode::Clamp => coord.clamp(0, size - 1),
            WrapMode::Mirror => {
                let period = 2 * size;
                let m = coord.rem_euclid(period);
                if m < size { m } else { period - 1 - m }
            }
        };
        mapped as u32
    }

    pub(crate) fn as_u32(self) -> u32 {
        match self {
            WrapMode::Repeat => 0,
            WrapMode::Clamp => 1,
            WrapMode::Mirror => 2,
        }
    }
}

/// Sampling filter used when a buffer is resampled into another size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FilterMode {
    Point,
    #[default]
    Bilinear,
}

impl FilterMode {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            FilterMode::Point => 0,
            FilterMode::Bilinear => 1,
        }
    }
}

/// Full description of a 2D buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Depth-buffer bits requested by the caller. Recorded, unused by 2D kernels.
    pub depth: u32,
    pub format: TextureFormat,
    pub wrap: WrapMode,
    pub filter: FilterMode,
    /// Whether compute kernels may write the buffer.
    pub random_write: bool,
}

impl TextureDesc {
    /// Number of texels.
    #[inline]
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of f32 values needed to store the buffer.
    #[inline]
    pub fn value_count(&self) -> usize {
        self.texel_count() * self.format.channels()
    }

    #[inline]
    pub fn same_size(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

/// Backend-assigned identity of a live buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Handle to a backend-owned 2D buffer.
///
/// Cloning a handle does not duplicate the buffer. Once released through its
/// backend, every clone is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureHandle {
    id: TextureId,
    desc: TextureDesc,
}

impl TextureHandle {
    pub(crate) fn new(id: TextureId, desc: TextureDesc) -> Self {
        Self { id, desc }
    }

    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }
}
