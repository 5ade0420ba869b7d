//! wgpu backend - storage-buffer textures driven by WGSL compute kernels.

use std::collections::HashMap;

use super::GpuError;
use crate::compute::backend::{ensure_distinct, require_binding};
use crate::compute::{
    Backend, BackendError, DeviceLimits, GpuThreads, Kernel, KernelBindings, KernelParams,
    TextureDesc, TextureHandle, TextureId,
};
use crate::schema::EffectPass;

const COMMON_SHADER: &str = include_str!("shaders/common.wgsl");
const ADD_SOURCE_SHADER: &str = include_str!("shaders/add_source.wgsl");
const DIFFUSE_SHADER: &str = include_str!("shaders/diffuse.wgsl");
const BOUNDARY_SHADER: &str = include_str!("shaders/boundary.wgsl");
const DRAW_SOURCE_SHADER: &str = include_str!("shaders/draw_source.wgsl");
const BLIT_SHADER: &str = include_str!("shaders/blit.wgsl");
const EFFECT_SHADER: &str = include_str!("shaders/effect.wgsl");

/// `@workgroup_size` of every kernel in `shaders/`.
pub const WORKGROUP: GpuThreads = GpuThreads::new(8, 8, 1);

/// Uniform block shared by all kernels. Layout matches `Params` in common.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct ShaderParams {
    width: u32,
    height: u32,
    channels: u32,
    src_width: u32,
    src_height: u32,
    src_channels: u32,
    wrap_mode: u32,
    filter_mode: u32,
    diffuse_coef: f32,
    delta_time: f32,
    intensity: f32,
    delta_x: f32,
    delta_y: f32,
    boundary: f32,
    center_x: f32,
    center_y: f32,
    radius: f32,
    effect: u32,
    effect_param: f32,
    _pad: f32,
}

impl ShaderParams {
    fn target(desc: &TextureDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            channels: desc.format.channels() as u32,
            ..Default::default()
        }
    }

    fn with_source(mut self, desc: &TextureDesc) -> Self {
        self.src_width = desc.width;
        self.src_height = desc.height;
        self.src_channels = desc.format.channels() as u32;
        self.wrap_mode = desc.wrap.as_u32();
        self.filter_mode = desc.filter.as_u32();
        self
    }

    fn with_kernel(mut self, params: &KernelParams) -> Self {
        self.diffuse_coef = params.thermal_diffuse_coef;
        self.delta_time = params.delta_time;
        self.intensity = params.adding_heat_intensity;
        self.delta_x = params.delta_x;
        self.delta_y = params.delta_y;
        self.boundary = params.boundary_value;
        self
    }
}

/// Effect selector and scalar for effect.wgsl.
fn effect_code(effect: &EffectPass) -> (u32, f32) {
    match *effect {
        EffectPass::Invert => (0, 0.0),
        EffectPass::Grayscale => (1, 0.0),
        EffectPass::Gain { factor } => (2, factor),
        EffectPass::BoxBlur { radius } => (3, radius as f32),
        EffectPass::Threshold { level } => (4, level),
    }
}

struct GpuTexture {
    desc: TextureDesc,
    buffer: wgpu::Buffer,
}

struct Pipelines {
    add_source: wgpu::ComputePipeline,
    diffuse: wgpu::ComputePipeline,
    boundary: wgpu::ComputePipeline,
    draw_source: wgpu::ComputePipeline,
    blit: wgpu::ComputePipeline,
    effect: wgpu::ComputePipeline,
}

/// GPU backend. Each texture is one `f32` storage buffer, row-major with
/// interleaved channels; half formats are stored at full precision.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: DeviceLimits,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Pipelines,
    // Bound to unused read slots so no dispatch aliases its output.
    placeholder: wgpu::Buffer,
    textures: HashMap<TextureId, GpuTexture>,
    next_id: u64,
    params: KernelParams,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    /// Open the default adapter and compile all kernels.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        // Full-resolution RGBA f32 buffers outgrow the default binding size.
        let adapter_limits = adapter.limits();
        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Thermal Diffusion GPU"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_storage_buffer_binding_size: adapter_limits
                        .max_storage_buffer_binding_size,
                    max_buffer_size: adapter_limits.max_buffer_size,
                    ..wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {} ({:?})", info.name, info.backend);

        let bind_group_layout = create_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Thermal Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            ..Default::default()
        });
        let pipelines = Pipelines {
            add_source: create_pipeline(&device, &pipeline_layout, "Add Source", ADD_SOURCE_SHADER),
            diffuse: create_pipeline(&device, &pipeline_layout, "Diffuse", DIFFUSE_SHADER),
            boundary: create_pipeline(&device, &pipeline_layout, "Boundary", BOUNDARY_SHADER),
            draw_source: create_pipeline(
                &device,
                &pipeline_layout,
                "Draw Source",
                DRAW_SOURCE_SHADER,
            ),
            blit: create_pipeline(&device, &pipeline_layout, "Blit", BLIT_SHADER),
            effect: create_pipeline(&device, &pipeline_layout, "Effect", EFFECT_SHADER),
        };

        let placeholder = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Placeholder Buffer"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let limits = DeviceLimits::from_wgpu(&device.limits());

        Ok(Self {
            device,
            queue,
            limits,
            bind_group_layout,
            pipelines,
            placeholder,
            textures: HashMap::new(),
            next_id: 1,
            params: KernelParams::default(),
            encoder: None,
        })
    }

    fn texture(&self, handle: &TextureHandle) -> Result<&GpuTexture, BackendError> {
        self.textures
            .get(&handle.id())
            .ok_or(BackendError::UnknownTexture(handle.id()))
    }

    fn check_same_size(&self, a: &TextureHandle, b: &TextureHandle) -> Result<(), BackendError> {
        let a = &self.texture(a)?.desc;
        let b = &self.texture(b)?.desc;
        if a.width != b.width || a.height != b.height || a.format.channels() != b.format.channels()
        {
            return Err(BackendError::SizeMismatch {
                src: (a.width, a.height),
                dst: (b.width, b.height),
            });
        }
        Ok(())
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Thermal Encoder"),
            })
        })
    }

    /// Record one kernel launch with a fresh uniform block.
    fn record(
        &mut self,
        label: &'static str,
        pipeline: fn(&Pipelines) -> &wgpu::ComputePipeline,
        params: ShaderParams,
        inputs: [Option<wgpu::Buffer>; 2],
        output: wgpu::Buffer,
        groups: [u32; 3],
    ) {
        let params_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Params"),
            size: std::mem::size_of::<ShaderParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&params_buffer, 0, bytemuck::bytes_of(&params));

        let [input_a, input_b] = inputs;
        let input_a = input_a.unwrap_or_else(|| self.placeholder.clone());
        let input_b = input_b.unwrap_or_else(|| self.placeholder.clone());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input_a.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: input_b.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: output.as_entire_binding(),
                },
            ],
        });

        let pipeline = pipeline(&self.pipelines).clone();
        let encoder = self.encoder();
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
    }

    /// Grid covering every texel of `desc`.
    fn full_grid(desc: &TextureDesc) -> [u32; 3] {
        WORKGROUP.dispatch_grid(desc.width, desc.height)
    }
}

impl Backend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn kernel_threads(&self, _kernel: Kernel) -> GpuThreads {
        WORKGROUP
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Buffer"),
            size: (desc.value_count() * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, GpuTexture { desc: *desc, buffer });
        Ok(TextureHandle::new(id, *desc))
    }

    fn release_texture(&mut self, texture: &TextureHandle) {
        // Recorded work keeps its own reference; memory goes once that retires.
        self.textures.remove(&texture.id());
    }

    fn clear_texture(&mut self, texture: &TextureHandle) -> Result<(), BackendError> {
        let buffer = self.texture(texture)?.buffer.clone();
        self.encoder().clear_buffer(&buffer, 0, None);
        Ok(())
    }

    fn upload(&mut self, texture: &TextureHandle, data: &[f32]) -> Result<(), BackendError> {
        let expected = self.texture(texture)?.desc.value_count();
        if data.len() != expected {
            return Err(BackendError::UploadSize {
                expected,
                got: data.len(),
            });
        }
        // Queue writes land before the next submission, so earlier commands go first.
        self.submit();
        let buffer = &self.texture(texture)?.buffer;
        self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
        Ok(())
    }

    fn read_back(&mut self, texture: &TextureHandle) -> Result<Vec<f32>, BackendError> {
        let source = self.texture(texture)?.buffer.clone();
        let size = source.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.encoder()
            .copy_buffer_to_buffer(&source, 0, &staging, 0, size);
        self.submit();

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(GpuError::from)?;
        rx.recv()
            .map_err(|_| GpuError::MapCallbackDropped)?
            .map_err(GpuError::from)?;

        let result = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&data).to_vec()
        };
        staging.unmap();
        Ok(result)
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
        let heat = bindings.heat;
        let target = self.texture(heat)?;
        let params = ShaderParams::target(&target.desc).with_kernel(&self.params);
        let output = target.buffer.clone();

        match kernel {
            Kernel::AddSourceHeat => {
                let source = require_binding(kernel, "source", bindings.source)?;
                let prev = require_binding(kernel, "prev_heat", bindings.prev_heat)?;
                ensure_distinct(source, heat)?;
                ensure_distinct(prev, heat)?;
                self.check_same_size(prev, heat)?;
                let source = self.texture(source)?;
                let params = params.with_source(&source.desc);
                let inputs = [
                    Some(source.buffer.clone()),
                    Some(self.texture(prev)?.buffer.clone()),
                ];
                self.record(kernel.name(), |p| &p.add_source, params, inputs, output, groups);
            }
            Kernel::DiffuseHeat => {
                let prev = require_binding(kernel, "prev_heat", bindings.prev_heat)?;
                ensure_distinct(prev, heat)?;
                self.check_same_size(prev, heat)?;
                let inputs = [Some(self.texture(prev)?.buffer.clone()), None];
                self.record(kernel.name(), |p| &p.diffuse, params, inputs, output, groups);
            }
            Kernel::SetBoundaryHeat => {
                self.record(kernel.name(), |p| &p.boundary, params, [None, None], output, groups);
            }
        }
        Ok(())
    }

    fn copy_texture(
        &mut self,
        src: &TextureHandle,
        dst: &TextureHandle,
    ) -> Result<(), BackendError> {
        ensure_distinct(src, dst)?;
        self.check_same_size(src, dst)?;
        let source = self.texture(src)?.buffer.clone();
        let target = self.texture(dst)?.buffer.clone();
        let size = source.size();
        self.encoder()
            .copy_buffer_to_buffer(&source, 0, &target, 0, size);
        Ok(())
    }

    fn blit(&mut self, src: &TextureHandle, dst: &TextureHandle) -> Result<(), BackendError> {
        ensure_distinct(src, dst)?;
        let source = self.texture(src)?;
        let target = self.texture(dst)?;
        let params = ShaderParams::target(&target.desc).with_source(&source.desc);
        let groups = Self::full_grid(&target.desc);
        let inputs = [Some(source.buffer.clone()), None];
        let output = target.buffer.clone();
        self.record("Blit", |p| &p.blit, params, inputs, output, groups);
        Ok(())
    }

    fn draw_source(
        &mut self,
        target: &TextureHandle,
        center: [f32; 2],
        radius: f32,
    ) -> Result<(), BackendError> {
        let target = self.texture(target)?;
        let params = ShaderParams {
            center_x: center[0],
            center_y: center[1],
            radius,
            ..ShaderParams::target(&target.desc)
        };
        let groups = Self::full_grid(&target.desc);
        let output = target.buffer.clone();
        self.record("Draw Source", |p| &p.draw_source, params, [None, None], output, groups);
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
        let source = self.texture(src)?;
        let target = self.texture(dst)?;
        let (code, value) = effect_code(effect);
        let params = ShaderParams {
            effect: code,
            effect_param: value,
            ..ShaderParams::target(&target.desc).with_source(&source.desc)
        };
        let groups = Self::full_grid(&target.desc);
        let inputs = [Some(source.buffer.clone()), None];
        let output = target.buffer.clone();
        self.record("Effect", |p| &p.effect, params, inputs, output, groups);
        Ok(())
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn live_textures(&self) -> usize {
        self.textures.len()
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &str,
    kernel: &str,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(format!("{COMMON_SHADER}\n{kernel}").into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Uniform params, two read-only inputs and one read-write output.
fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Thermal Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage(1, true),
            storage(2, true),
            storage(3, false),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{CpuBackend, FilterMode, TextureFormat, WrapMode};

    fn gpu() -> Option<WgpuBackend> {
        match pollster::block_on(WgpuBackend::new()) {
            Ok(backend) => Some(backend),
            Err(GpuError::NoAdapter) => {
                eprintln!("Skipping GPU test: no adapter available");
                None
            }
            Err(e) => panic!("Failed to create GPU backend: {:?}", e),
        }
    }

    fn desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            width,
            height,
            depth: 0,
            format: TextureFormat::RFloat,
            wrap: WrapMode::Clamp,
            filter: FilterMode::Point,
            random_write: true,
        }
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() < 1e-4, "value {i}: {x} vs {y}");
        }
    }

    #[test]
    fn test_shader_params_layout() {
        assert_eq!(std::mem::size_of::<ShaderParams>() % 16, 0);
    }

    #[test]
    fn test_upload_clear_read_back() {
        let Some(mut backend) = gpu() else { return };
        let texture = backend.create_texture(&desc(4, 4)).unwrap();
        let data: Vec<f32> = (0..16).map(|i| i as f32).collect();

        backend.upload(&texture, &data).unwrap();
        assert_eq!(backend.read_back(&texture).unwrap(), data);

        backend.clear_texture(&texture).unwrap();
        assert!(backend.read_back(&texture).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_diffusion_matches_cpu() {
        let Some(mut gpu) = gpu() else { return };
        let mut cpu = CpuBackend::new();
        let (w, h) = (19, 13);
        let mut initial = vec![0.0; (w * h) as usize];
        initial[(6 * w + 9) as usize] = 1.0;
        let params = KernelParams {
            thermal_diffuse_coef: 1.0,
            delta_time: 0.1,
            ..KernelParams::default()
        };

        let mut results = Vec::new();
        for backend in [&mut gpu as &mut dyn Backend, &mut cpu] {
            let heat = backend.create_texture(&desc(w, h)).unwrap();
            let prev = backend.create_texture(&desc(w, h)).unwrap();
            backend.upload(&heat, &initial).unwrap();
            backend.upload(&prev, &initial).unwrap();
            backend.set_params(&params);
            let groups = WORKGROUP.dispatch_grid(w, h);
            let bindings = KernelBindings {
                source: None,
                heat: &heat,
                prev_heat: Some(&prev),
            };
            backend.dispatch(Kernel::DiffuseHeat, &bindings, groups).unwrap();
            backend.dispatch(Kernel::SetBoundaryHeat, &bindings, groups).unwrap();
            backend.submit();
            results.push(backend.read_back(&heat).unwrap());
        }

        assert_close(&results[0], &results[1]);
    }

    #[test]
    fn test_inject_matches_cpu() {
        let Some(mut gpu) = gpu() else { return };
        let mut cpu = CpuBackend::new();
        let (w, h) = (16, 12);
        let initial: Vec<f32> = (0..w * h).map(|i| (i % 5) as f32 * 0.1).collect();
        let params = KernelParams {
            delta_time: 0.1,
            adding_heat_intensity: 2.0,
            ..KernelParams::default()
        };

        let mut results = Vec::new();
        for backend in [&mut gpu as &mut dyn Backend, &mut cpu] {
            let source = backend.create_texture(&desc(w, h)).unwrap();
            let heat = backend.create_texture(&desc(w, h)).unwrap();
            let prev = backend.create_texture(&desc(w, h)).unwrap();
            backend.upload(&heat, &initial).unwrap();
            backend.upload(&prev, &initial).unwrap();
            backend.set_params(&params);
            backend.draw_source(&source, [0.4, 0.6], 0.3).unwrap();
            let bindings = KernelBindings {
                source: Some(&source),
                heat: &heat,
                prev_heat: Some(&prev),
            };
            backend
                .dispatch(Kernel::AddSourceHeat, &bindings, WORKGROUP.dispatch_grid(w, h))
                .unwrap();
            backend.copy_texture(&heat, &prev).unwrap();
            backend.submit();
            let source_values = backend.read_back(&source).unwrap();
            let heat_values = backend.read_back(&heat).unwrap();
            let prev_values = backend.read_back(&prev).unwrap();
            assert_eq!(heat_values, prev_values);
            results.push((source_values, heat_values));
        }

        assert_close(&results[0].0, &results[1].0);
        assert_close(&results[0].1, &results[1].1);
        // The impulse actually raised the field somewhere.
        assert!(results[1].1.iter().zip(&initial).any(|(v, i)| v > i));
    }

    #[test]
    fn test_poll_error_surfaces_as_backend_error() {
        let err = BackendError::from(GpuError::from(wgpu::PollError::Timeout));
        assert!(matches!(err, BackendError::Gpu(GpuError::Poll(_))));
        assert!(err.to_string().starts_with("Device poll failed"));
    }

    #[test]
    fn test_blit_and_effect_match_cpu() {
        let Some(mut gpu) = gpu() else { return };
        let mut cpu = CpuBackend::new();
        let src_desc = TextureDesc {
            format: TextureFormat::ARGBFloat,
            filter: FilterMode::Bilinear,
            ..desc(8, 6)
        };
        let dst_desc = TextureDesc {
            format: TextureFormat::ARGBFloat,
            ..desc(5, 4)
        };
        let data: Vec<f32> = (0..src_desc.value_count())
            .map(|i| (i % 11) as f32 / 11.0)
            .collect();

        let mut results = Vec::new();
        for backend in [&mut gpu as &mut dyn Backend, &mut cpu] {
            let src = backend.create_texture(&src_desc).unwrap();
            let small = backend.create_texture(&dst_desc).unwrap();
            let out = backend.create_texture(&dst_desc).unwrap();
            backend.upload(&src, &data).unwrap();
            backend.blit(&src, &small).unwrap();
            backend
                .apply_effect(&EffectPass::BoxBlur { radius: 1 }, &small, &out)
                .unwrap();
            backend.submit();
            results.push(backend.read_back(&out).unwrap());
        }

        assert_close(&results[0], &results[1]);
    }

    #[test]
    fn test_release_drops_texture() {
        let Some(mut backend) = gpu() else { return };
        let texture = backend.create_texture(&desc(2, 2)).unwrap();
        assert_eq!(backend.live_textures(), 1);

        backend.release_texture(&texture);

        assert_eq!(backend.live_textures(), 0);
        assert!(matches!(
            backend.read_back(&texture),
            Err(BackendError::UnknownTexture(_))
        ));
    }
}
