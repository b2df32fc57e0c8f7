use wgpu::util::DeviceExt as _;

use crate::foundation::core::Canvas;
use crate::foundation::error::{ScrubError, ScrubResult};
use crate::render::backend::{
    BackendKind, BlendProgram, CompositeBackend, FrameRGBA, Texels, TextureSlot,
};
use crate::render::shader::{QUAD_POSITIONS, QUAD_TEX_COORDS};

const VEC2_STRIDE: wgpu::BufferAddress = 2 * std::mem::size_of::<f32>() as wgpu::BufferAddress;

struct GpuState {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    positions: wgpu::Buffer,
    tex_coords: wgpu::Buffer,
    textures: [wgpu::Texture; 3],
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    readback_bytes_per_row: u32,
}

/// `wgpu` rendering context: three sampled textures, one uniform block, one strip quad.
pub struct GpuBackend {
    viewport: Canvas,
    state: Option<GpuState>,
}

impl GpuBackend {
    pub fn new(viewport: Canvas, program: BlendProgram, wgsl: &str) -> ScrubResult<Self> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(ScrubError::evaluation("gpu viewport must be non-empty"));
        }
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                ScrubError::environment("no gpu adapter available")
            }
            other => ScrubError::environment(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("logoscrub_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| ScrubError::environment(format!("wgpu request_device failed: {e:?}")))?;

        let (pipeline, bind_group_layout) = build_pipeline(&device, wgsl)?;

        let extent = extent_of(viewport);
        let textures = TextureSlot::ALL.map(|slot| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(match slot {
                    TextureSlot::Video => "logoscrub_video",
                    TextureSlot::Mask => "logoscrub_mask",
                    TextureSlot::Overlay => "logoscrub_overlay",
                }),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        });
        let views = textures
            .each_ref()
            .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("logoscrub_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let p = program.params();
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("logoscrub_blend_params"),
            contents: bytemuck::cast_slice(&[
                p.lighten_opacity,
                p.overlay_opacity,
                p.alpha_edge0,
                p.alpha_edge1,
            ]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("logoscrub_quad_positions"),
            contents: bytemuck::cast_slice(&QUAD_POSITIONS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let tex_coords = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("logoscrub_quad_tex_coords"),
            contents: bytemuck::cast_slice(&QUAD_TEX_COORDS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("logoscrub_bg"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&views[1]),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&views[2]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("logoscrub_target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let readback_bytes_per_row =
            align_to(viewport.width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("logoscrub_readback"),
            size: u64::from(readback_bytes_per_row) * u64::from(viewport.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::debug!(
            adapter = ?adapter.get_info().name,
            width = viewport.width,
            height = viewport.height,
            "gpu backend ready"
        );

        Ok(Self {
            viewport,
            state: Some(GpuState {
                device,
                queue,
                pipeline,
                bind_group,
                positions,
                tex_coords,
                textures,
                target,
                target_view,
                readback,
                readback_bytes_per_row,
            }),
        })
    }

    fn state(&self) -> ScrubResult<&GpuState> {
        self.state
            .as_ref()
            .ok_or_else(|| ScrubError::evaluation("gpu backend was released"))
    }
}

/// Compile the WGSL module and link the render pipeline. Validation failures become
/// [`ScrubError::Shader`].
fn build_pipeline(
    device: &wgpu::Device,
    wgsl: &str,
) -> ScrubResult<(wgpu::RenderPipeline, wgpu::BindGroupLayout)> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    };
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("logoscrub_bgl"),
        entries: &[
            texture_entry(0),
            texture_entry(1),
            texture_entry(2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("logoscrub_blend"),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("logoscrub_pl"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("logoscrub_pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[
                wgpu::VertexBufferLayout {
                    array_stride: VEC2_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                },
                wgpu::VertexBufferLayout {
                    array_stride: VEC2_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![1 => Float32x2],
                },
            ],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        tracing::error!(error = %err, "blend program failed to build");
        return Err(ScrubError::shader(err.to_string()));
    }
    Ok((pipeline, bind_group_layout))
}

impl CompositeBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn viewport(&self) -> Canvas {
        self.viewport
    }

    fn upload(&mut self, slot: TextureSlot, texels: &Texels) -> ScrubResult<()> {
        texels.check(self.viewport)?;
        let state = self.state()?;
        state.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &state.textures[slot.unit()],
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texels.rgba8,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(texels.width * 4),
                rows_per_image: Some(texels.height),
            },
            extent_of(self.viewport),
        );
        Ok(())
    }

    fn draw(&mut self) -> ScrubResult<()> {
        let state = self.state()?;
        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("logoscrub_draw"),
            });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("logoscrub_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &state.target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&state.pipeline);
            rp.set_bind_group(0, &state.bind_group, &[]);
            rp.set_vertex_buffer(0, state.positions.slice(..));
            rp.set_vertex_buffer(1, state.tex_coords.slice(..));
            rp.draw(0..QUAD_POSITIONS.len() as u32, 0..1);
        }
        state.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn readback_rgba8(&mut self) -> ScrubResult<FrameRGBA> {
        let state = self.state()?;
        let Canvas { width, height } = self.viewport;
        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("logoscrub_readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &state.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &state.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(state.readback_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent_of(self.viewport),
        );
        state.queue.submit(Some(encoder.finish()));

        let slice = state.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        state
            .device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| ScrubError::evaluation(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| ScrubError::evaluation("readback channel closed"))?
            .map_err(|e| ScrubError::evaluation(format!("readback map failed: {e:?}")))?;

        let row_bytes = width as usize * 4;
        let padded = state.readback_bytes_per_row as usize;
        let mapped = slice.get_mapped_range();
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in mapped.chunks(padded).take(height as usize) {
            data.extend_from_slice(&row[..row_bytes]);
        }
        drop(mapped);
        state.readback.unmap();

        Ok(FrameRGBA {
            width,
            height,
            data,
            premultiplied: true,
        })
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            for t in &state.textures {
                t.destroy();
            }
            state.target.destroy();
            state.readback.destroy();
            state.positions.destroy();
            state.tex_coords.destroy();
            tracing::debug!("gpu backend released");
        }
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        self.release();
    }
}

fn extent_of(c: Canvas) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: c.width,
        height: c.height,
        depth_or_array_layers: 1,
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_align_for_copies() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(1600 * 4, 256), 6400);
        assert_eq!(align_to(257, 256), 512);
    }

    #[test]
    fn quad_buffers_hold_four_vec2s() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_POSITIONS);
        assert_eq!(bytes.len() as wgpu::BufferAddress, 4 * VEC2_STRIDE);
    }
}
