//! # GPU — Device, Surface and the Quad Renderer
//!
//! Everything a [`DrawList`] turns into on screen is a textured quad:
//!
//! ```text
//!  DrawCommand::Rect     ──► quad, white 1x1 texture, color as tint
//!  DrawCommand::Texture  ──► quad, uploaded texture, src rect as UVs
//! ```
//!
//! Commands are walked in list order and consecutive quads that share a
//! texture are merged into one draw call, so the painter's order the render
//! pulse produced is preserved exactly.
//!
//! Textures live CPU-side in the [`TextureCache`](crate::services::TextureCache).
//! They are uploaded the first time a frame references them and again
//! whenever their revision changes.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::{EngineError, Result};
use crate::math::{Color, Mat4, Rect};
use crate::render::{DrawCommand, DrawList};
use crate::services::{TextureCache, TextureHandle};

/// Wraps the wgpu device, queue, surface, and surface configuration.
pub(crate) struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub fn new(window: Arc<winit::window::Window>) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance
            .create_surface(window)
            .map_err(|e| EngineError::Backend(format!("surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| EngineError::Backend(format!("no suitable GPU adapter: {e}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("arbor device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e| EngineError::Backend(format!("device: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| EngineError::Backend("surface reports no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        log::info!(
            "gpu ready: {} ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            surface_config.width,
            surface_config.height,
            format
        );

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
        })
    }

    /// Reconfigure the surface. Zero sizes (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }
}

// ── Vertex layout ──────────────────────────────────────────────────────

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
    color: [f32; 4],
}

impl QuadVertex {
    const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x4,
            },
        ],
    };
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

/// Pixel coordinates, origin top-left, y down.
fn pixel_projection(width: u32, height: u32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width as f32, height as f32, 0.0, -1.0, 1.0)
}

// ── Renderer ───────────────────────────────────────────────────────────

struct GpuTexture {
    bind_group: wgpu::BindGroup,
    revision: u64,
}

/// Run of quads drawn with one texture.
struct Batch {
    texture: Option<TextureHandle>,
    indices: std::ops::Range<u32>,
}

pub(crate) struct QuadRenderer {
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    white: wgpu::BindGroup,
    textures: HashMap<TextureHandle, GpuTexture>,
}

impl QuadRenderer {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("quad.wgsl").into()),
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad texture bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad pipeline layout"),
            bind_group_layouts: &[&camera_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quad pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.surface_format(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let (w, h) = gpu.surface_size();
        let camera = CameraUniform {
            view_proj: pixel_projection(w, h).to_cols_array_2d(),
        };
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera uniform buffer"),
            contents: bytemuck::cast_slice(&[camera]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera bind group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        // Pixel art stays crisp.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = upload(gpu, &texture_layout, &sampler, "white 1x1", 1, 1, &[255; 4]);

        Self {
            pipeline,
            texture_layout,
            camera_buffer,
            camera_bind_group,
            sampler,
            white,
            textures: HashMap::new(),
        }
    }

    /// Draw `frame` onto the surface and present it.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        frame: &DrawList,
        textures: Option<&TextureCache>,
    ) -> std::result::Result<(), wgpu::SurfaceError> {
        let (w, h) = gpu.surface_size();
        let camera = CameraUniform {
            view_proj: pixel_projection(w, h).to_cols_array_2d(),
        };
        gpu.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[camera]));

        self.sync_textures(gpu, frame, textures);
        let (vertices, indices, batches) = build_batches(frame, textures);

        let output = gpu.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        let buffers = (!indices.is_empty()).then(|| {
            let vb = gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("quad vertices"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });
            let ib = gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("quad indices"),
                    contents: bytemuck::cast_slice(&indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
            (vb, ib)
        });

        {
            let clear = frame.clear_color();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.r as f64,
                            g: clear.g as f64,
                            b: clear.b as f64,
                            a: clear.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some((vb, ib)) = &buffers {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.camera_bind_group, &[]);
                pass.set_vertex_buffer(0, vb.slice(..));
                pass.set_index_buffer(ib.slice(..), wgpu::IndexFormat::Uint32);
                for batch in &batches {
                    let group = batch
                        .texture
                        .and_then(|t| self.textures.get(&t))
                        .map_or(&self.white, |t| &t.bind_group);
                    pass.set_bind_group(1, group, &[]);
                    pass.draw_indexed(batch.indices.clone(), 0, 0..1);
                }
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Upload textures the frame uses that are missing or stale.
    fn sync_textures(&mut self, gpu: &GpuContext, frame: &DrawList, cache: Option<&TextureCache>) {
        let Some(cache) = cache else { return };
        for cmd in frame.commands() {
            let DrawCommand::Texture { texture, .. } = cmd else {
                continue;
            };
            let Some(tex) = cache.get(*texture) else {
                continue;
            };
            if self
                .textures
                .get(texture)
                .is_some_and(|t| t.revision == tex.revision)
            {
                continue;
            }
            let bind_group = upload(
                gpu,
                &self.texture_layout,
                &self.sampler,
                "quad texture",
                tex.width,
                tex.height,
                &tex.rgba,
            );
            self.textures.insert(
                *texture,
                GpuTexture {
                    bind_group,
                    revision: tex.revision,
                },
            );
            log::trace!("uploaded texture {} ({}x{})", texture.index(), tex.width, tex.height);
        }
    }
}

fn upload(
    gpu: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::BindGroup {
    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

/// Turn draw commands into quads, merging neighbours that share a texture.
fn build_batches(
    frame: &DrawList,
    textures: Option<&TextureCache>,
) -> (Vec<QuadVertex>, Vec<u32>, Vec<Batch>) {
    let mut vertices = Vec::with_capacity(frame.len() * 4);
    let mut indices = Vec::with_capacity(frame.len() * 6);
    let mut batches: Vec<Batch> = Vec::new();

    for cmd in frame.commands() {
        let (texture, dst, uv, color) = match *cmd {
            DrawCommand::Rect { dst, color } => (None, dst, Rect::new(0.0, 0.0, 1.0, 1.0), color),
            DrawCommand::Texture {
                texture,
                src,
                dst,
                tint,
            } => {
                let Some((w, h)) = textures.and_then(|c| c.size(texture)) else {
                    log::trace!("skipping draw of unknown texture {}", texture.index());
                    continue;
                };
                let size = crate::math::Vec2::new(w as f32, h as f32);
                let uv = match src {
                    Some(src) => Rect {
                        min: src.min / size,
                        max: src.max / size,
                    },
                    None => Rect::new(0.0, 0.0, 1.0, 1.0),
                };
                (Some(texture), dst, uv, tint)
            }
        };

        let base = vertices.len() as u32;
        push_quad(&mut vertices, dst, uv, color);
        let start = indices.len() as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        let end = indices.len() as u32;

        match batches.last_mut() {
            Some(last) if last.texture == texture => last.indices.end = end,
            _ => batches.push(Batch {
                texture,
                indices: start..end,
            }),
        }
    }

    (vertices, indices, batches)
}

fn push_quad(out: &mut Vec<QuadVertex>, dst: Rect, uv: Rect, color: Color) {
    let color = color.to_array();
    let corners = [
        ([dst.min.x, dst.min.y], [uv.min.x, uv.min.y]),
        ([dst.max.x, dst.min.y], [uv.max.x, uv.min.y]),
        ([dst.max.x, dst.max.y], [uv.max.x, uv.max.y]),
        ([dst.min.x, dst.max.y], [uv.min.x, uv.max.y]),
    ];
    out.extend(corners.iter().map(|&(position, uv)| QuadVertex {
        position,
        uv,
        color,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;
    use crate::render::Canvas;

    #[test]
    fn neighbours_sharing_a_texture_merge_into_one_batch() {
        let mut cache = TextureCache::new();
        let sheet = cache.insert_rgba(4, 2, vec![0; 32]);
        let mut list = DrawList::new(Vec2::new(100.0, 100.0), Color::BLACK);
        list.fill_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        list.fill_rect(Rect::new(10.0, 0.0, 10.0, 10.0), Color::WHITE);
        list.draw_texture(sheet, Some(Rect::new(2.0, 0.0, 2.0, 2.0)), Rect::new(0.0, 0.0, 8.0, 8.0), Color::WHITE);
        list.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::BLACK);

        let (vertices, indices, batches) = build_batches(&list, Some(&cache));
        assert_eq!(vertices.len(), 16);
        assert_eq!(indices.len(), 24);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].indices, 0..12);
        assert_eq!(batches[1].texture, Some(sheet));
        // src (2,0)-(4,2) on a 4x2 texture is the right half.
        assert_eq!(vertices[8].uv, [0.5, 0.0]);
        assert_eq!(vertices[10].uv, [1.0, 1.0]);
    }

    #[test]
    fn unknown_textures_are_skipped() {
        let mut other = TextureCache::new();
        let handle = other.insert_rgba(1, 1, vec![0; 4]);
        let mut list = DrawList::new(Vec2::new(10.0, 10.0), Color::BLACK);
        list.draw_texture(handle, None, Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);
        let (vertices, _, batches) = build_batches(&list, None);
        assert!(vertices.is_empty());
        assert!(batches.is_empty());
    }
}
