//! CPU reference backend.
//!
//! Runs every kernel on the host with the same semantics as the WGSL shaders.
//! Used by tests, benches, and as a fallback when no GPU adapter is available.

use std::collections::HashMap;

use rayon::prelude::*;

use super::backend::{ensure_distinct, require_binding};
use super::{
    Backend, BackendError, DeviceLimits, FilterMode, GpuThreads, Kernel, KernelBindings,
    KernelParams, TextureDesc, TextureHandle, TextureId,
};
use crate::schema::EffectPass;

/// Work-group shape the CPU backend reports for every kernel.
pub const CPU_THREADS: GpuThreads = GpuThreads::new(8, 8, 1);

/// Counters of work performed by a [`CpuBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub textures_created: u64,
    pub textures_released: u64,
    /// Dispatch count per kernel, indexed like [`Kernel::ALL`].
    pub dispatches: [u64; 3],
    pub last_groups: Option<[u32; 3]>,
    pub copies: u64,
    pub blits: u64,
    pub source_draws: u64,
    pub effect_passes: u64,
    pub submits: u64,
}

impl BackendStats {
    pub fn dispatches_of(&self, kernel: Kernel) -> u64 {
        self.dispatches[kernel.index()]
    }
}

struct CpuTexture {
    desc: TextureDesc,
    data: Vec<f32>,
}

/// Host-side implementation of [`Backend`].
pub struct CpuBackend {
    textures: HashMap<TextureId, CpuTexture>,
    next_id: u64,
    params: KernelParams,
    threads: GpuThreads,
    limits: DeviceLimits,
    stats: BackendStats,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_threads(CPU_THREADS, DeviceLimits::DIRECT_COMPUTE_5_0)
    }

    /// Backend reporting a custom work-group shape and device limits.
    pub fn with_threads(threads: GpuThreads, limits: DeviceLimits) -> Self {
        Self {
            textures: HashMap::new(),
            next_id: 1,
            params: KernelParams::default(),
            threads,
            limits,
            stats: BackendStats::default(),
        }
    }

    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Parameters most recently passed to [`Backend::set_params`].
    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    fn texture(&self, handle: &TextureHandle) -> Result<&CpuTexture, BackendError> {
        self.textures
            .get(&handle.id())
            .ok_or(BackendError::UnknownTexture(handle.id()))
    }

    fn texture_mut(&mut self, handle: &TextureHandle) -> Result<&mut CpuTexture, BackendError> {
        self.textures
            .get_mut(&handle.id())
            .ok_or(BackendError::UnknownTexture(handle.id()))
    }

    /// Temporarily move a texture's data out so other textures can be borrowed.
    fn take_data(&mut self, handle: &TextureHandle) -> Result<Vec<f32>, BackendError> {
        Ok(std::mem::take(&mut self.texture_mut(handle)?.data))
    }

    fn restore_data(&mut self, handle: &TextureHandle, data: Vec<f32>) {
        if let Some(texture) = self.textures.get_mut(&handle.id()) {
            texture.data = data;
        }
    }

    fn run_kernel(
        &mut self,
        kernel: Kernel,
        bindings: &KernelBindings<'_>,
        groups: [u32; 3],
    ) -> Result<(), BackendError> {
        let heat = bindings.heat;
        let (width, height) = (heat.width() as usize, heat.height() as usize);
        let covered_x = (groups[0] as usize * self.threads.x as usize).min(width);
        let covered_y = (groups[1] as usize * self.threads.y as usize).min(height);
        let params = self.params;

        match kernel {
            Kernel::AddSourceHeat => {
                let source = require_binding(kernel, "source", bindings.source)?;
                let prev = require_binding(kernel, "prev_heat", bindings.prev_heat)?;
                ensure_distinct(source, heat)?;
                ensure_distinct(prev, heat)?;
                self.check_same_size(prev, heat)?;

                let mut out = self.take_data(heat)?;
                let result = (|| -> Result<(), BackendError> {
                    let src = self.texture(source)?;
                    let prev = self.texture(prev)?;
                    let scale = params.delta_time * params.adding_heat_intensity;
                    out.par_chunks_mut(width)
                        .enumerate()
                        .take(covered_y)
                        .for_each(|(y, row)| {
                            for (x, cell) in row.iter_mut().enumerate().take(covered_x) {
                                let s = sample_nearest(src, x, y, width, height);
                                *cell = prev.data[y * width + x] + scale * s;
                            }
                        });
                    Ok(())
                })();
                self.restore_data(heat, out);
                result
            }
            Kernel::DiffuseHeat => {
                let prev = require_binding(kernel, "prev_heat", bindings.prev_heat)?;
                ensure_distinct(prev, heat)?;
                self.check_same_size(prev, heat)?;

                let mut out = self.take_data(heat)?;
                let result = (|| -> Result<(), BackendError> {
                    let prev = &self.texture(prev)?.data;
                    let inv_dx2 = 1.0 / (params.delta_x * params.delta_x);
                    let inv_dy2 = 1.0 / (params.delta_y * params.delta_y);
                    let rate = params.delta_time * params.thermal_diffuse_coef;
                    out.par_chunks_mut(width)
                        .enumerate()
                        .take(covered_y)
                        .for_each(|(y, row)| {
                            let up = y.saturating_sub(1);
                            let down = (y + 1).min(height - 1);
                            for (x, cell) in row.iter_mut().enumerate().take(covered_x) {
                                let left = x.saturating_sub(1);
                                let right = (x + 1).min(width - 1);
                                let c = prev[y * width + x];
                                let lap = (prev[y * width + left] + prev[y * width + right]
                                    - 2.0 * c)
                                    * inv_dx2
                                    + (prev[up * width + x] + prev[down * width + x] - 2.0 * c)
                                        * inv_dy2;
                                *cell += rate * lap;
                            }
                        });
                    Ok(())
                })();
                self.restore_data(heat, out);
                result
            }
            Kernel::SetBoundaryHeat => {
                let texture = self.texture_mut(heat)?;
                let value = params.boundary_value;
                for y in 0..covered_y {
                    for x in 0..covered_x {
                        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                            texture.data[y * width + x] = value;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn check_same_size(&self, a: &TextureHandle, b: &TextureHandle) -> Result<(), BackendError> {
        let a = self.texture(a)?;
        let b = self.texture(b)?;
        if a.desc.width != b.desc.width
            || a.desc.height != b.desc.height
            || a.desc.format.channels() != b.desc.format.channels()
        {
            return Err(BackendError::SizeMismatch {
                src: (a.desc.width, a.desc.height),
                dst: (b.desc.width, b.desc.height),
            });
        }
        Ok(())
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn kernel_threads(&self, _kernel: Kernel) -> GpuThreads {
        self.threads
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        // Poisoned with NaN so a missing clear is visible in tests.
        let data = vec![f32::NAN; desc.value_count()];
        self.textures.insert(id, CpuTexture { desc: *desc, data });
        self.stats.textures_created += 1;
        Ok(TextureHandle::new(id, *desc))
    }

    fn release_texture(&mut self, texture: &TextureHandle) {
        if self.textures.remove(&texture.id()).is_some() {
            self.stats.textures_released += 1;
        }
    }

    fn clear_texture(&mut self, texture: &TextureHandle) -> Result<(), BackendError> {
        self.texture_mut(texture)?.data.fill(0.0);
        Ok(())
    }

    fn upload(&mut self, texture: &TextureHandle, data: &[f32]) -> Result<(), BackendError> {
        let target = self.texture_mut(texture)?;
        if target.data.len() != data.len() {
            return Err(BackendError::UploadSize {
                expected: target.data.len(),
                got: data.len(),
            });
        }
        target.data.copy_from_slice(data);
        Ok(())
    }

    fn read_back(&mut self, texture: &TextureHandle) -> Result<Vec<f32>, BackendError> {
        Ok(self.texture(texture)?.data.clone())
    }

    fn set_params(&mut self, params: &KernelParams) {
        self.params = *params;
    }

    fn dispatch(
        &mut self,
        kernel: Kernel,
        bindings: &KernelBindings<'_>,
        groups: [u32; 3],
    ) -> Result<(), BackendError> {
        self.run_kernel(kernel, bindings, groups)?;
        self.stats.dispatches[kernel.index()] += 1;
        self.stats.last_groups = Some(groups);
        Ok(())
    }

    fn copy_texture(
        &mut self,
        src: &TextureHandle,
        dst: &TextureHandle,
    ) -> Result<(), BackendError> {
        ensure_distinct(src, dst)?;
        self.check_same_size(src, dst)?;
        let data = self.texture(src)?.data.clone();
        self.texture_mut(dst)?.data.copy_from_slice(&data);
        self.stats.copies += 1;
        Ok(())
    }

    fn blit(&mut self, src: &TextureHandle, dst: &TextureHandle) -> Result<(), BackendError> {
        ensure_distinct(src, dst)?;
        let mut out = self.take_data(dst)?;
        let dst_desc = self.texture(dst)?.desc;
        let result = self.texture(src).map(|src| {
            let (dw, dh) = (dst_desc.width as usize, dst_desc.height as usize);
            let channels = dst_desc.format.channels();
            out.par_chunks_mut(dw * channels)
                .enumerate()
                .for_each(|(y, row)| {
                    let v = (y as f32 + 0.5) / dh as f32;
                    for x in 0..dw {
                        let u = (x as f32 + 0.5) / dw as f32;
                        for c in 0..channels {
                            row[x * channels + c] = sample(src, u, v, c);
                        }
                    }
                });
        });
        self.restore_data(dst, out);
        result?;
        self.stats.blits += 1;
        Ok(())
    }

    fn draw_source(
        &mut self,
        target: &TextureHandle,
        center: [f32; 2],
        radius: f32,
    ) -> Result<(), BackendError> {
        let texture = self.texture_mut(target)?;
        let (w, h) = (texture.desc.width as usize, texture.desc.height as usize);
        let channels = texture.desc.format.channels();
        texture
            .data
            .par_chunks_mut(w * channels)
            .enumerate()
            .for_each(|(y, row)| {
                let v = (y as f32 + 0.5) / h as f32;
                for x in 0..w {
                    let u = (x as f32 + 0.5) / w as f32;
                    let value = impulse([u, v], center, radius);
                    row[x * channels..(x + 1) * channels].fill(value);
                }
            });
        self.stats.source_draws += 1;
        Ok(())
    }

    fn apply_effect(
        &mut self,
        effect: &EffectPass,
        src: &TextureHandle,
        dst: &TextureHandle,
    ) -> Result<(), BackendError> {
        ensure_distinct(src, dst)?;
        self.check_same_size(src, dst)?;
        let mut out = self.take_data(dst)?;
        let result = self.texture(src).map(|src| {
            let w = src.desc.width as usize;
            let channels = src.desc.format.channels();
            out.par_chunks_mut(w * channels)
                .enumerate()
                .for_each(|(y, row)| {
                    for x in 0..w {
                        let texel = effect_texel(effect, src, x, y);
                        row[x * channels..(x + 1) * channels]
                            .copy_from_slice(&texel[..channels]);
                    }
                });
        });
        self.restore_data(dst, out);
        result?;
        self.stats.effect_passes += 1;
        Ok(())
    }

    fn submit(&mut self) {
        self.stats.submits += 1;
    }

    fn live_textures(&self) -> usize {
        self.textures.len()
    }
}

/// Impulse intensity at `uv` for a source at `center`.
#[inline]
pub fn impulse(uv: [f32; 2], center: [f32; 2], radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let dx = uv[0] - center[0];
    let dy = uv[1] - center[1];
    (1.0 - (dx * dx + dy * dy).sqrt() / radius).max(0.0)
}

/// Nearest source texel for a cell of a `width` x `height` grid.
fn sample_nearest(src: &CpuTexture, x: usize, y: usize, width: usize, height: usize) -> f32 {
    let sx = x * src.desc.width as usize / width;
    let sy = y * src.desc.height as usize / height;
    let channels = src.desc.format.channels();
    src.data[(sy * src.desc.width as usize + sx) * channels]
}

fn fetch(src: &CpuTexture, x: i64, y: i64, channel: usize) -> f32 {
    let desc = &src.desc;
    let x = desc.wrap.apply(x, desc.width) as usize;
    let y = desc.wrap.apply(y, desc.height) as usize;
    let channels = desc.format.channels();
    src.data[(y * desc.width as usize + x) * channels + channel.min(channels - 1)]
}

/// Sample `src` at uv with its own filter and wrap modes.
fn sample(src: &CpuTexture, u: f32, v: f32, channel: usize) -> f32 {
    let fx = u * src.desc.width as f32;
    let fy = v * src.desc.height as f32;
    match src.desc.filter {
        FilterMode::Point => fetch(src, fx.floor() as i64, fy.floor() as i64, channel),
        FilterMode::Bilinear => {
            let (px, py) = (fx - 0.5, fy - 0.5);
            let (x0, y0) = (px.floor(), py.floor());
            let (tx, ty) = (px - x0, py - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            let top = lerp(fetch(src, x0, y0, channel), fetch(src, x0 + 1, y0, channel), tx);
            let bottom = lerp(
                fetch(src, x0, y0 + 1, channel),
                fetch(src, x0 + 1, y0 + 1, channel),
                tx,
            );
            lerp(top, bottom, ty)
        }
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn texel(src: &CpuTexture, x: i64, y: i64) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (c, value) in out.iter_mut().enumerate() {
        *value = fetch(src, x, y, c);
    }
    if src.desc.format.channels() == 1 {
        out[3] = 1.0;
    }
    out
}

#[inline]
fn luma(t: &[f32; 4]) -> f32 {
    0.2126 * t[0] + 0.7152 * t[1] + 0.0722 * t[2]
}

/// Output texel of `effect` at `(x, y)`. Alpha passes through.
fn effect_texel(effect: &EffectPass, src: &CpuTexture, x: usize, y: usize) -> [f32; 4] {
    let (x, y) = (x as i64, y as i64);
    let t = texel(src, x, y);
    match *effect {
        EffectPass::Invert => [1.0 - t[0], 1.0 - t[1], 1.0 - t[2], t[3]],
        EffectPass::Grayscale => {
            let l = luma(&t);
            [l, l, l, t[3]]
        }
        EffectPass::Gain { factor } => [t[0] * factor, t[1] * factor, t[2] * factor, t[3]],
        EffectPass::Threshold { level } => {
            let l = if luma(&t) >= level { 1.0 } else { 0.0 };
            [l, l, l, t[3]]
        }
        EffectPass::BoxBlur { radius } => {
            let r = radius as i64;
            let mut sum = [0.0f32; 3];
            for oy in -r..=r {
                for ox in -r..=r {
                    let n = texel(src, x + ox, y + oy);
                    sum[0] += n[0];
                    sum[1] += n[1];
                    sum[2] += n[2];
                }
            }
            let count = ((2 * r + 1) * (2 * r + 1)) as f32;
            [sum[0] / count, sum[1] / count, sum[2] / count, t[3]]
        }
    }
}
