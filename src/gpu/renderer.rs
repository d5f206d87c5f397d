//! Scene renderer.
//!
//! Draws static meshes and cloth instances with named shader programs and
//! overlays a marker on the grabbed vertex. Mesh shaders are assembled from
//! two preludes (frame uniforms with lighting, then the mesh vertex
//! interface with material bindings) followed by the program source, so a
//! scene's own shader files only define `vs_main` and `fs_main`.

use std::collections::HashMap;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{capture_validation, DeviceCloth, DEPTH_FORMAT};
use crate::camera::Camera;
use crate::error::GpuError;
use crate::mesh::{HostMesh, Vertex};
use crate::scene::{LightsGpu, Scene, ShaderProgram, TextureData};

pub const FRAME_WGSL: &str = include_str!("frame.wgsl");
pub const MATERIAL_WGSL: &str = include_str!("material.wgsl");
pub const MESH_WGSL: &str = include_str!("mesh.wgsl");
pub const CHECKERBOARD_WGSL: &str = include_str!("checkerboard.wgsl");
pub const MARKER_WGSL: &str = include_str!("marker.wgsl");

/// Program used when a mesh names a shader that is not loaded.
const FALLBACK_PROGRAM: &str = "phong";

const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.12, g: 0.13, b: 0.16, a: 1.0 };
const MARKER_COLOR: [f32; 4] = [1.0, 0.35, 0.1, 1.0];
const MARKER_RADIUS_PX: f32 = 6.0;

/// Prepend the mesh preludes to a shader body.
pub fn mesh_shader_source(body: &str) -> String {
    format!("{}\n{}\n{}", FRAME_WGSL, MATERIAL_WGSL, body)
}

pub fn marker_shader_source() -> String {
    format!("{}\n{}", FRAME_WGSL, MARKER_WGSL)
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub lights: LightsGpu,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MarkerUniforms {
    color: [f32; 4],
    extent: [f32; 2],
    vertex: u32,
    _pad: u32,
}

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        // Float32x3 attributes sit at 16-byte strides of the padded layout.
        attributes: &[
            wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x3 },
            wgpu::VertexAttribute { offset: 16, shader_location: 1, format: wgpu::VertexFormat::Float32x3 },
            wgpu::VertexAttribute { offset: 32, shader_location: 2, format: wgpu::VertexFormat::Float32x2 },
            wgpu::VertexAttribute { offset: 48, shader_location: 3, format: wgpu::VertexFormat::Float32x4 },
        ],
    }
}

/// A static mesh on the device.
pub struct MeshDraw {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub program: String,
    /// `None` samples the white fallback texture.
    material: Option<wgpu::BindGroup>,
}

struct ClothMaterial {
    program: String,
    material: Option<wgpu::BindGroup>,
}

pub struct Renderer {
    format: wgpu::TextureFormat,
    frame_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    marker_layout: wgpu::BindGroupLayout,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    marker_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    white: wgpu::BindGroup,
    programs: HashMap<String, wgpu::RenderPipeline>,
    marker_pipeline: wgpu::RenderPipeline,
    meshes: Vec<MeshDraw>,
    cloth_materials: Vec<ClothMaterial>,
}

impl Renderer {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Result<Self, GpuError> {
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
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
        let marker_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Marker Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: frame_buffer.as_entire_binding() }],
        });
        let marker_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Marker Uniforms"),
            size: std::mem::size_of::<MarkerUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Diffuse Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white_texture = TextureData::solid(255, 255, 255, 255);
        let white = create_material(device, queue, &material_layout, &sampler, &white_texture);

        let marker_pipeline = {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Marker Pipeline Layout"),
                bind_group_layouts: &[&frame_layout, &marker_layout],
                push_constant_ranges: &[],
            });
            let source = marker_shader_source();
            capture_validation(device, "marker", || {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Marker Shader"),
                    source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
                });
                create_pipeline(device, &layout, "Marker Pipeline", &module, &module, &[], format, false)
            })?
        };

        let mut renderer = Self {
            format,
            frame_layout,
            material_layout,
            marker_layout,
            frame_buffer,
            frame_bind_group,
            marker_buffer,
            sampler,
            white,
            programs: HashMap::new(),
            marker_pipeline,
            meshes: Vec::new(),
            cloth_materials: Vec::new(),
        };
        renderer.build_builtin_programs(device)?;
        Ok(renderer)
    }

    fn build_builtin_programs(&mut self, device: &wgpu::Device) -> Result<(), GpuError> {
        for (name, body) in [("phong", MESH_WGSL), ("checkerboard", CHECKERBOARD_WGSL)] {
            let source = mesh_shader_source(body);
            let pipeline = self.build_program(device, name, &source, &source)?;
            self.programs.insert(name.to_string(), pipeline);
        }
        Ok(())
    }

    fn build_program(
        &self,
        device: &wgpu::Device,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<wgpu::RenderPipeline, GpuError> {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&self.frame_layout, &self.material_layout],
            push_constant_ranges: &[],
        });
        capture_validation(device, name, || {
            let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
            });
            let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
            });
            create_pipeline(device, &layout, name, &vertex, &fragment, &[vertex_layout()], self.format, true)
        })
    }

    /// Compile a program from its vertex and fragment files. On failure the
    /// previously loaded program of that name stays in use.
    pub fn load_program(&mut self, device: &wgpu::Device, program: &ShaderProgram) -> Result<(), GpuError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| GpuError::PipelineBuild {
                label: program.name.clone(),
                message: format!("{}: {}", path.display(), e),
            })
        };
        let vertex = mesh_shader_source(&read(&program.vertex)?);
        let fragment = mesh_shader_source(&read(&program.fragment)?);
        let pipeline = self.build_program(device, &program.name, &vertex, &fragment)?;
        self.programs.insert(program.name.clone(), pipeline);
        log::info!("Loaded shader program '{}'", program.name);
        Ok(())
    }

    /// Rebuild the built-in programs and every scene program. Returns the
    /// number of programs that failed.
    pub fn reload_programs(&mut self, device: &wgpu::Device, programs: &[ShaderProgram]) -> usize {
        let mut failed = 0;
        if let Err(e) = self.build_builtin_programs(device) {
            log::error!("{}", e);
            failed += 1;
        }
        for program in programs {
            if let Err(e) = self.load_program(device, program) {
                log::error!("{}", e);
                failed += 1;
            }
        }
        failed
    }

    pub fn has_program(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Upload static meshes and cloth materials, and compile scene programs.
    /// Cloth materials are matched to solver instances by index.
    pub fn set_scene(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &Scene) {
        self.programs.retain(|name, _| name == "phong" || name == "checkerboard");
        for program in &scene.shaders {
            if let Err(e) = self.load_program(device, program) {
                log::error!("{}", e);
            }
        }

        self.meshes = scene
            .static_meshes
            .iter()
            .map(|m| MeshDraw {
                name: m.name.clone(),
                vertex_buffer: mesh_buffer(device, &m.mesh, wgpu::BufferUsages::VERTEX, true),
                index_buffer: mesh_buffer(device, &m.mesh, wgpu::BufferUsages::INDEX, false),
                index_count: m.mesh.num_triangles() as u32 * 3,
                program: m.shader.clone(),
                material: self.material(device, queue, m.texture.as_deref()),
            })
            .collect();

        self.cloth_materials = scene
            .cloths
            .iter()
            .map(|c| ClothMaterial {
                program: c.shader.clone(),
                material: self.material(device, queue, c.texture.as_deref()),
            })
            .collect();
    }

    fn material(&self, device: &wgpu::Device, queue: &wgpu::Queue, texture: Option<&TextureData>) -> Option<wgpu::BindGroup> {
        texture.map(|t| create_material(device, queue, &self.material_layout, &self.sampler, t))
    }

    fn program(&self, name: &str) -> Option<&wgpu::RenderPipeline> {
        self.programs.get(name).or_else(|| self.programs.get(FALLBACK_PROGRAM))
    }

    /// Write frame uniforms and the marker target.
    pub fn prepare(
        &self,
        queue: &wgpu::Queue,
        camera: &Camera,
        lights: &LightsGpu,
        viewport: (u32, u32),
        marker_vertex: Option<u32>,
    ) {
        let frame = FrameUniforms {
            view_proj: camera.view_proj().to_cols_array_2d(),
            camera_pos: camera.position().extend(1.0).to_array(),
            lights: *lights,
        };
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));

        if let Some(vertex) = marker_vertex {
            let (w, h) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
            let marker = MarkerUniforms {
                color: MARKER_COLOR,
                extent: [2.0 * MARKER_RADIUS_PX / w, 2.0 * MARKER_RADIUS_PX / h],
                vertex,
                _pad: 0,
            };
            queue.write_buffer(&self.marker_buffer, 0, bytemuck::bytes_of(&marker));
        }
    }

    /// Record the scene pass. `marker_instance` names the cloth whose
    /// grabbed vertex was passed to [`Renderer::prepare`].
    pub fn render(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        cloths: &[DeviceCloth],
        marker_instance: Option<usize>,
    ) {
        let marker_bind_group = marker_instance.and_then(|i| cloths.get(i)).map(|cloth| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Marker Bind Group"),
                layout: &self.marker_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.marker_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: cloth.vertex_buffer.as_entire_binding() },
                ],
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(CLEAR_COLOR), store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, &self.frame_bind_group, &[]);

        for mesh in &self.meshes {
            let Some(pipeline) = self.program(&mesh.program) else { continue };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, mesh.material.as_ref().unwrap_or(&self.white), &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        for (i, cloth) in cloths.iter().enumerate() {
            let material = self.cloth_materials.get(i);
            let program = material.map_or(FALLBACK_PROGRAM, |m| m.program.as_str());
            let Some(pipeline) = self.program(program) else { continue };
            let (vertices, indices, count) = cloth.render_buffers();
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, material.and_then(|m| m.material.as_ref()).unwrap_or(&self.white), &[]);
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..count, 0, 0..1);
        }

        if let Some(bind_group) = &marker_bind_group {
            pass.set_pipeline(&self.marker_pipeline);
            pass.set_bind_group(1, bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &str,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    buffers: &[wgpu::VertexBufferLayout<'_>],
    format: wgpu::TextureFormat,
    depth_write: bool,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth_write,
            depth_compare: if depth_write { wgpu::CompareFunction::Less } else { wgpu::CompareFunction::Always },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn mesh_buffer(device: &wgpu::Device, mesh: &HostMesh, usage: wgpu::BufferUsages, vertices: bool) -> wgpu::Buffer {
    let contents: &[u8] = if vertices {
        bytemuck::cast_slice(&mesh.vertices)
    } else {
        bytemuck::cast_slice(&mesh.triangles)
    };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(if vertices { "Mesh Vertices" } else { "Mesh Indices" }),
        contents,
        usage,
    })
}

fn create_material(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    texture: &TextureData,
) -> wgpu::BindGroup {
    let size = wgpu::Extent3d { width: texture.width, height: texture.height, depth_or_array_layers: 1 };
    let gpu_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Diffuse Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &gpu_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &texture.data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * texture.width),
            rows_per_image: Some(texture.height),
        },
        size,
    );
    let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Material Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 64 + 16 + std::mem::size_of::<LightsGpu>());
        assert_eq!(std::mem::size_of::<MarkerUniforms>(), 32);
    }

    #[test]
    fn test_vertex_layout_matches_vertex() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, 64);
        assert_eq!(layout.attributes[1].offset, std::mem::offset_of!(Vertex, normal) as u64);
        assert_eq!(layout.attributes[2].offset, std::mem::offset_of!(Vertex, tex_coord) as u64);
        assert_eq!(layout.attributes[3].offset, std::mem::offset_of!(Vertex, color) as u64);
    }
}
