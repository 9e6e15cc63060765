// ============================================================================
// GPU RENDERER: base image + overlay blend, explicit lifecycle
// ============================================================================
//
//   Uninitialized ──initialize──▶ Ready ──destroy──▶ Destroyed (terminal)
//                                  │  ▲
//                                  └──┘ update_overlay
//
// Every operation other than `initialize` is only meaningful in `Ready`;
// the state enum owns the GPU resources so they cannot outlive it.  A new
// base image means a new renderer instance.

use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::context::{self, GpuContext};
use super::shaders::{BlendUniforms, BLEND_SHADER};
use super::texture::{aligned_bytes_per_row, texture_bind_group_layout, unpad_rows, SampledTexture};
use crate::error::RenderError;
use crate::{log_info, log_warn};

/// Offscreen render target size (the display canvas).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSurface {
    pub width: u32,
    pub height: u32,
}

/// Counters for the debug line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// In-place overlay uploads (texture reused).
    pub overlay_uploads: u64,
    /// Overlay texture + bind group replacements.
    pub overlay_reallocations: u64,
    pub draws: u64,
    pub readbacks: u64,
}

/// What the session needs from a renderer.  `GpuRenderer` is the real one;
/// the session builds instances through a factory so a new base image always
/// gets a fresh renderer.
pub trait FrameRenderer {
    fn initialize(&mut self, surface: RenderSurface, base: &RgbaImage, overlay: Option<&RgbaImage>)
        -> Result<(), RenderError>;
    fn update_overlay(&mut self, overlay: Option<&RgbaImage>) -> Result<bool, RenderError>;
    fn read_frame(&mut self) -> Result<RgbaImage, RenderError>;
    fn destroy(&mut self);
    fn is_ready(&self) -> bool;
    fn stats(&self) -> RendererStats;
    fn adapter_name(&self) -> Option<&str>;
}

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct ReadyState {
    ctx: GpuContext,
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    _uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    /// Uploaded once, never touched again.
    base: SampledTexture,
    overlay: SampledTexture,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    surface: RenderSurface,
    /// Readback staging buffer, reused while large enough.
    staging: Option<(wgpu::Buffer, u64)>,
}

enum RendererState {
    Uninitialized,
    Ready(Box<ReadyState>),
    Destroyed,
}

pub struct GpuRenderer {
    state: RendererState,
    preferred_gpu: String,
    stats: RendererStats,
}

/// 1×1 fully transparent overlay used until a composite exists.
const PLACEHOLDER: [u8; 4] = [0, 0, 0, 0];

impl GpuRenderer {
    pub fn new(preferred_gpu: &str) -> Self {
        Self {
            state: RendererState::Uninitialized,
            preferred_gpu: preferred_gpu.to_string(),
            stats: RendererStats::default(),
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self.state {
            RendererState::Uninitialized => "uninitialized",
            RendererState::Ready(_) => "ready",
            RendererState::Destroyed => "destroyed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, RendererState::Ready(_))
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    pub fn adapter_name(&self) -> Option<&str> {
        match &self.state {
            RendererState::Ready(ready) => Some(&ready.ctx.adapter_name),
            _ => None,
        }
    }

    /// Acquire a device, upload the base image and the (optional) overlay,
    /// build the pipeline and draw once.
    ///
    /// `Unsupported` comes from the capability probe before any allocation;
    /// `Device` from adapter/device negotiation.  Both are final for the
    /// session.
    pub fn initialize(
        &mut self,
        surface: RenderSurface,
        base: &RgbaImage,
        overlay: Option<&RgbaImage>,
    ) -> Result<(), RenderError> {
        match self.state {
            RendererState::Uninitialized => {}
            RendererState::Ready(_) => return Err(RenderError::NotReady("already initialized")),
            RendererState::Destroyed => return Err(RenderError::NotReady("destroyed")),
        }
        if surface.width == 0 || surface.height == 0 {
            return Err(RenderError::Resource("empty render surface".into()));
        }

        context::probe()?;
        let ctx = GpuContext::new(&self.preferred_gpu)?;
        if !ctx.supports_size(surface.width, surface.height) {
            return Err(RenderError::Resource(format!(
                "surface {}x{} exceeds device limit {}",
                surface.width, surface.height, ctx.max_texture_dim
            )));
        }

        let ready = build_ready_state(ctx, surface, base, overlay)?;
        log_info!(
            "Renderer ready on {} ({}x{})",
            ready.ctx.adapter_name,
            surface.width,
            surface.height
        );
        self.state = RendererState::Ready(Box::new(ready));
        self.render()
    }

    /// Swap in a new overlay and redraw.  Only the overlay texture (and its
    /// bind group, when the size changes) is touched.
    ///
    /// Returns `Ok(false)` without doing anything when not `Ready`.
    pub fn update_overlay(&mut self, overlay: Option<&RgbaImage>) -> Result<bool, RenderError> {
        let name = self.state_name();
        let RendererState::Ready(ready) = &mut self.state else {
            log_warn!("Overlay update ignored: renderer is {}", name);
            return Ok(false);
        };

        let (w, h, data): (u32, u32, &[u8]) = match overlay {
            Some(img) => (img.width(), img.height(), img.as_raw()),
            None => (1, 1, &PLACEHOLDER),
        };

        if ready.overlay.matches(w, h) {
            let overlay_tex = &ready.overlay;
            ready
                .ctx
                .scoped("overlay upload", |ctx| overlay_tex.upload_full(&ctx.queue, data))??;
            self.stats.overlay_uploads += 1;
        } else {
            let layout = &ready.texture_layout;
            let sampler = &ready.sampler;
            let replacement = ready.ctx.scoped("overlay reallocation", |ctx| {
                SampledTexture::new(&ctx.device, &ctx.queue, layout, sampler, w, h, data, "overlay_texture")
            })??;
            ready.overlay = replacement;
            self.stats.overlay_reallocations += 1;
        }

        self.render()?;
        Ok(true)
    }

    /// Issue the blend draw into the offscreen target.
    pub fn render(&mut self) -> Result<(), RenderError> {
        let name = self.state_name();
        let RendererState::Ready(ready) = &self.state else {
            return Err(RenderError::NotReady(name));
        };

        ready.ctx.scoped("blend draw", |ctx| {
            let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blend_encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("blend_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &ready.target_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&ready.pipeline);
                pass.set_bind_group(0, &ready.uniform_bind_group, &[]);
                pass.set_bind_group(1, &ready.base.bind_group, &[]);
                pass.set_bind_group(2, &ready.overlay.bind_group, &[]);
                pass.draw(0..6, 0..1);
            }
            ctx.submit_one(encoder);
        })?;

        self.stats.draws += 1;
        Ok(())
    }

    /// Read the last rendered frame back to the CPU.
    pub fn read_frame(&mut self) -> Result<RgbaImage, RenderError> {
        let name = self.state_name();
        let RendererState::Ready(ready) = &mut self.state else {
            return Err(RenderError::NotReady(name));
        };
        let frame = readback(ready)?;
        self.stats.readbacks += 1;
        Ok(frame)
    }

    /// Release every GPU resource.  Terminal.
    pub fn destroy(&mut self) {
        if let RendererState::Ready(_) = self.state {
            log_info!("Renderer destroyed");
        }
        // Dropping the ready state releases textures, pipeline and device.
        self.state = RendererState::Destroyed;
    }
}

impl FrameRenderer for GpuRenderer {
    fn initialize(
        &mut self,
        surface: RenderSurface,
        base: &RgbaImage,
        overlay: Option<&RgbaImage>,
    ) -> Result<(), RenderError> {
        GpuRenderer::initialize(self, surface, base, overlay)
    }

    fn update_overlay(&mut self, overlay: Option<&RgbaImage>) -> Result<bool, RenderError> {
        GpuRenderer::update_overlay(self, overlay)
    }

    fn read_frame(&mut self) -> Result<RgbaImage, RenderError> {
        GpuRenderer::read_frame(self)
    }

    fn destroy(&mut self) {
        GpuRenderer::destroy(self)
    }

    fn is_ready(&self) -> bool {
        GpuRenderer::is_ready(self)
    }

    fn stats(&self) -> RendererStats {
        GpuRenderer::stats(self)
    }

    fn adapter_name(&self) -> Option<&str> {
        GpuRenderer::adapter_name(self)
    }
}

fn build_ready_state(
    ctx: GpuContext,
    surface: RenderSurface,
    base: &RgbaImage,
    overlay: Option<&RgbaImage>,
) -> Result<ReadyState, RenderError> {
    // Oversized bases are scaled into the device limit; the target is only
    // display-sized anyway.
    let resized;
    let base = if ctx.supports_size(base.width(), base.height()) {
        base
    } else {
        let max = ctx.max_texture_dim.min(surface.width.max(surface.height).max(1));
        log_warn!(
            "Base image {}x{} exceeds device limit, downscaling to fit {}",
            base.width(),
            base.height(),
            max
        );
        resized = image::imageops::resize(
            base,
            surface.width.min(max),
            surface.height.min(max),
            image::imageops::FilterType::Triangle,
        );
        &resized
    };

    let built = ctx.scoped("renderer resources", |ctx| -> Result<_, RenderError> {
        let device = &ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blend_shader"),
            source: wgpu::ShaderSource::Wgsl(BLEND_SHADER.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blend_uniform_bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = texture_bind_group_layout(device);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("blend_uniforms"),
            contents: bytemuck::bytes_of(&BlendUniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blend_uniform_bg"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler_linear"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blend_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blend_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        let base_tex = SampledTexture::new(
            device,
            &ctx.queue,
            &texture_layout,
            &sampler,
            base.width(),
            base.height(),
            base.as_raw(),
            "base_texture",
        )?;

        let overlay_tex = match overlay {
            Some(img) => SampledTexture::new(
                device,
                &ctx.queue,
                &texture_layout,
                &sampler,
                img.width(),
                img.height(),
                img.as_raw(),
                "overlay_texture",
            )?,
            None => SampledTexture::new(device, &ctx.queue, &texture_layout, &sampler, 1, 1, &PLACEHOLDER, "overlay_texture")?,
        };

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("blend_target"),
            size: wgpu::Extent3d {
                width: surface.width,
                height: surface.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        Ok((
            pipeline,
            texture_layout,
            sampler,
            uniform_buffer,
            uniform_bind_group,
            base_tex,
            overlay_tex,
            target,
            target_view,
        ))
    })??;

    let (pipeline, texture_layout, sampler, uniform_buffer, uniform_bind_group, base, overlay, target, target_view) =
        built;

    Ok(ReadyState {
        ctx,
        pipeline,
        texture_layout,
        sampler,
        _uniform_buffer: uniform_buffer,
        uniform_bind_group,
        base,
        overlay,
        target,
        target_view,
        surface,
        staging: None,
    })
}

/// Copy the target into a staging buffer and map it (blocking).
fn readback(ready: &mut ReadyState) -> Result<RgbaImage, RenderError> {
    let RenderSurface { width, height } = ready.surface;
    let bytes_per_row = aligned_bytes_per_row(width);
    let buffer_size = bytes_per_row as u64 * height as u64;

    let need_new = !matches!(&ready.staging, Some((_, sz)) if *sz >= buffer_size);
    if need_new {
        let buffer = ready.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ready.staging = Some((buffer, buffer_size));
    }
    let Some((staging, _)) = &ready.staging else {
        return Err(RenderError::Resource("readback buffer missing".into()));
    };

    let target = &ready.target;
    ready.ctx.scoped("frame readback copy", |ctx| {
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        ctx.submit_one(encoder);
    })?;

    let slice = staging.slice(..buffer_size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = ready.ctx.device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(RenderError::Resource(format!("readback map failed: {}", e))),
        Err(e) => return Err(RenderError::Resource(format!("readback channel closed: {}", e))),
    }

    let pixels = {
        let mapped = slice.get_mapped_range();
        unpad_rows(&mapped, width, height, bytes_per_row)
    };
    staging.unmap();

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| RenderError::Resource("readback size mismatch".into()))
}
