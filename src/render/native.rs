use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use log::error;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::light::{CubeFace, ShadowFrustum};
use crate::obj::VERTEX_STRIDE;
use crate::scene::{PointLightDesc, Scene, SceneObject};
use crate::shadow::{SamplerFilter, HARD_SHADOW_BIAS};
use crate::texture::Texture;
use crate::ObjMesh;

use super::shader::{SHADER, SHADOW_PASS_SHADER};

/// Camera parameters consumed by the renderer's uniform buffers.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Per-frame state captured by `update_globals` and consumed by `render`.
#[derive(Clone, Debug)]
struct FrameState {
    view: Mat4,
    projection: Mat4,
    light_world: Vec3,
    frustum: ShadowFrustum,
    filter: SamplerFilter,
}

/// GPU renderer backed by wgpu: a depth-only pass into the six faces of a
/// shadow cube map, then a main pass whose shaders mirror the reference
/// shading core.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    hard_pipeline: wgpu::RenderPipeline,
    soft_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    face_layout: wgpu::BindGroupLayout,
    shadow_cube: ShadowCubeTexture,
    base_sampler: wgpu::Sampler,
    mesh_cache: HashMap<String, MeshBuffers>,
    missing_meshes: HashSet<String>,
    material_cache: HashMap<String, wgpu::BindGroup>,
    missing_textures: HashSet<String>,
    default_material: wgpu::BindGroup,
    scene: Arc<Scene>,
    default_mesh: MeshBuffers,
    frame: Option<FrameState>,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window and scene.
    pub async fn new(window: Arc<Window>, scene: Arc<Scene>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        // The surface must not outlive the window; the renderer owns both.
        let surface = unsafe { instance.create_surface(window.as_ref()) }?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("renderer-device"),
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| {
                    matches!(
                        mode,
                        wgpu::PresentMode::Mailbox | wgpu::PresentMode::Immediate
                    )
                })
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("main-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-pass-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_PASS_SHADER.into()),
        });

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<GlobalUniform>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<ObjectConstants>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-bind-layout"),
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

        let face_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-face-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<FaceConstants>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("main-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: 0,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x3,
                    offset: (3 * std::mem::size_of::<f32>()) as u64,
                    shader_location: 1,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: (6 * std::mem::size_of::<f32>()) as u64,
                    shader_location: 2,
                },
            ],
        };

        let main_pipeline = |entry_point: &str, label: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: std::slice::from_ref(&vertex_layout),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthBuffer::FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            })
        };
        let hard_pipeline = main_pipeline("fs_hard", "main-pipeline-hard");
        let soft_pipeline = main_pipeline("fs_soft", "main-pipeline-soft");

        let shadow_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("shadow-pipeline-layout"),
                bind_group_layouts: &[&face_layout],
                push_constant_ranges: &[],
            });
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow-pipeline"),
            layout: Some(&shadow_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: ShadowCubeTexture::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: None,
            multiview: None,
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let resolution = scene
            .lights
            .first()
            .map(|light| light.resolution)
            .unwrap_or(2048);
        let shadow_cube = ShadowCubeTexture::create(&device, resolution.max(16));

        let nearest_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-nearest-sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let comparison_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-comparison-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::Less),
            ..Default::default()
        });
        let base_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("base-texture-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let global_bind_group = create_global_bind_group(
            &device,
            &global_layout,
            &global_buffer,
            &shadow_cube,
            &nearest_sampler,
            &comparison_sampler,
        );

        let default_material = create_material_bind_group(
            &device,
            &queue,
            &material_layout,
            &base_sampler,
            &Texture::default(),
            "default-checkerboard",
        );

        let default_mesh = MeshBuffers::from_mesh(&device, &default_cube(), "default-cube");

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            hard_pipeline,
            soft_pipeline,
            shadow_pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            material_layout,
            face_layout,
            shadow_cube,
            base_sampler,
            mesh_cache: HashMap::new(),
            missing_meshes: HashSet::new(),
            material_cache: HashMap::new(),
            missing_textures: HashSet::new(),
            default_material,
            scene,
            default_mesh,
            frame: None,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Updates the per-frame uniforms: camera, light block, shadow
    /// parameters and the sampler filter selected by the operator.
    pub fn update_globals(
        &mut self,
        camera: &CameraParams,
        light: &PointLightDesc,
        frustum: ShadowFrustum,
        filter: SamplerFilter,
    ) {
        let light_view = camera.view * light.position.extend(1.0);
        let shadow_view = crate::light::shadow_view_matrix(light.position, camera.view);
        let uniform = GlobalUniform {
            light_color: (light.color * light.intensity).extend(1.0).into(),
            light_position: [light_view.x, light_view.y, light_view.z, 1.0],
            light_attenuation: light.attenuation.extend(0.0).into(),
            camera_position: camera.position.extend(1.0).into(),
            shadow_view: shadow_view.to_cols_array_2d(),
            shadow_params: [frustum.near, frustum.far, HARD_SHADOW_BIAS, 0.0],
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));

        self.frame = Some(FrameState {
            view: camera.view,
            projection: camera.projection,
            light_world: light.position,
            frustum,
            filter,
        });
    }

    /// Draws the shadow pass and the main pass for the scene snapshot.
    pub fn render(&mut self, objects: &[SceneObject]) -> Result<(), wgpu::SurfaceError> {
        let Some(frame) = self.frame.clone() else {
            return Ok(());
        };

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        // Build the draw list and ensure assets are cached
        let mut draw_list = Vec::new();
        for (index, object) in objects.iter().enumerate() {
            if !object_wants_mesh(object) {
                continue;
            }
            if let Some(name) = object.mesh.as_deref() {
                self.ensure_mesh_loaded(name);
            }
            if let Some(name) = object.texture.as_deref() {
                self.ensure_texture_loaded(name);
            }
            draw_list.push(index);
        }

        self.encode_shadow_pass(&mut encoder, objects, &draw_list, &frame);
        self.encode_main_pass(&mut encoder, &view, objects, &draw_list, &frame);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Depth-only render of every caster into each cube face, from the
    /// light's point of view.
    fn encode_shadow_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        objects: &[SceneObject],
        draw_list: &[usize],
        frame: &FrameState,
    ) {
        for face in CubeFace::ALL {
            let face_vp = face.view_proj(frame.light_world, frame.frustum);

            let mut bind_groups = Vec::new();
            for &index in draw_list {
                let object = &objects[index];
                let constants = FaceConstants {
                    mvp: (face_vp * object_model_matrix(object)).to_cols_array_2d(),
                };
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("shadow-face-uniform"),
                        contents: bytes_of(&constants),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("shadow-face-bind-group"),
                    layout: &self.face_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
                bind_groups.push((index, buffer, bind_group));
            }

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.shadow_cube.face_view(face),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: true,
                    }),
                    stencil_ops: None,
                }),
            });
            pass.set_pipeline(&self.shadow_pipeline);

            for (index, _buffer, bind_group) in bind_groups.iter() {
                let mesh = self.mesh_for(&objects[*index]);
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
    }

    fn encode_main_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        objects: &[SceneObject],
        draw_list: &[usize],
        frame: &FrameState,
    ) {
        let mut bind_groups = Vec::new();
        for &index in draw_list {
            let object = &objects[index];
            let model = object_model_matrix(object);
            let model_view = frame.view * model;
            let normal = Mat3::from_mat4(model_view).inverse().transpose();
            let constants = ObjectConstants {
                mvp: (frame.projection * model_view).to_cols_array_2d(),
                model_view: model_view.to_cols_array_2d(),
                normal: mat3_to_3x4(normal),
            };

            let buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("object-uniform"),
                    contents: bytes_of(&constants),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object-bind-group"),
                layout: &self.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            bind_groups.push((index, buffer, bind_group));
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.03,
                        g: 0.03,
                        b: 0.05,
                        a: 1.0,
                    }),
                    store: true,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: true,
                }),
                stencil_ops: None,
            }),
        });

        // Hard mode is a plain biased comparison; every other filter
        // resolves through the comparison sampler.
        let pipeline = match frame.filter {
            SamplerFilter::Nearest | SamplerFilter::Linear => &self.hard_pipeline,
            SamplerFilter::ComparisonPcf | SamplerFilter::EngineDefault => &self.soft_pipeline,
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.global_bind_group, &[]);

        for (index, _buffer, bind_group) in bind_groups.iter() {
            let object = &objects[*index];
            let mesh = self.mesh_for(object);
            let material = object
                .texture
                .as_deref()
                .and_then(|name| self.material_cache.get(name))
                .unwrap_or(&self.default_material);

            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, bind_group, &[]);
            pass.set_bind_group(2, material, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    fn mesh_for(&self, object: &SceneObject) -> &MeshBuffers {
        object
            .mesh
            .as_deref()
            .and_then(|name| self.mesh_cache.get(name))
            .unwrap_or(&self.default_mesh)
    }

    fn ensure_mesh_loaded(&mut self, name: &str) {
        if self.mesh_cache.contains_key(name) || self.missing_meshes.contains(name) {
            return;
        }
        match self.load_mesh(name) {
            Ok(mesh) => {
                self.mesh_cache.insert(name.to_string(), mesh);
            }
            Err(err) => {
                error!("failed to load mesh {name}: {err:?}");
                self.missing_meshes.insert(name.to_string());
            }
        }
    }

    fn load_mesh(&self, name: &str) -> Result<MeshBuffers> {
        let path = self.scene.resolve(name);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read mesh {}", path.display()))?;
        let mesh = crate::load_obj_from_str(&contents)
            .with_context(|| format!("failed to parse OBJ mesh {name}"))?;
        Ok(MeshBuffers::from_mesh(&self.device, &mesh, name))
    }

    fn ensure_texture_loaded(&mut self, name: &str) {
        if self.material_cache.contains_key(name) || self.missing_textures.contains(name) {
            return;
        }
        match Texture::load(self.scene.resolve(name)) {
            Ok(texture) => {
                let material = create_material_bind_group(
                    &self.device,
                    &self.queue,
                    &self.material_layout,
                    &self.base_sampler,
                    &texture,
                    name,
                );
                self.material_cache.insert(name.to_string(), material);
            }
            Err(err) => {
                error!("failed to load texture {name}: {err:?}");
                self.missing_textures.insert(name.to_string());
            }
        }
    }
}

fn create_global_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    shadow_cube: &ShadowCubeTexture,
    nearest: &wgpu::Sampler,
    comparison: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("global-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(shadow_cube.cube_view()),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(nearest),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(comparison),
            },
        ],
    })
}

fn create_material_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    texture: &Texture,
    label: &str,
) -> wgpu::BindGroup {
    let size = wgpu::Extent3d {
        width: texture.width(),
        height: texture.height(),
        depth_or_array_layers: 1,
    };
    let gpu_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &gpu_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &texture.to_rgba8(),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * texture.width()),
            rows_per_image: Some(texture.height()),
        },
        size,
    );
    let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());

    device.create_bind_group(&wgpu::BindGroupDescriptor {
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

fn object_model_matrix(object: &SceneObject) -> Mat4 {
    let translation = Mat4::from_translation(object.position);
    let rotation = Mat4::from_rotation_z(object.rotation.z.to_radians())
        * Mat4::from_rotation_y(object.rotation.y.to_radians())
        * Mat4::from_rotation_x(object.rotation.x.to_radians());
    let scale = Mat4::from_scale(object.scale);
    translation * rotation * scale
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

fn object_wants_mesh(object: &SceneObject) -> bool {
    if object.mesh.is_some() {
        true
    } else {
        matches!(object.object_type.as_str(), "mesh" | "part")
    }
}

fn default_cube() -> ObjMesh {
    // Unit cube with per-face normals and uvs, used when a scene object
    // declares no mesh.
    let obj = "\
v -0.5 -0.5 0.5\nv 0.5 -0.5 0.5\nv 0.5 0.5 0.5\nv -0.5 0.5 0.5\n\
v -0.5 -0.5 -0.5\nv 0.5 -0.5 -0.5\nv 0.5 0.5 -0.5\nv -0.5 0.5 -0.5\n\
vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
f 1/1 2/2 3/3 4/4\n\
f 6/1 5/2 8/3 7/4\n\
f 5/1 1/2 4/3 8/4\n\
f 2/1 6/2 7/3 3/4\n\
f 5/1 6/2 2/3 1/4\n\
f 4/1 3/2 7/3 8/4\n";
    crate::load_obj_from_str(obj).expect("default cube is well formed")
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &ObjMesh, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Cube depth texture the shadow pass renders into and the main pass
/// samples from.
struct ShadowCubeTexture {
    _texture: wgpu::Texture,
    face_views: [wgpu::TextureView; 6],
    cube_view: wgpu::TextureView,
}

impl ShadowCubeTexture {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    fn create(device: &wgpu::Device, resolution: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-cube-texture"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let face_views: [wgpu::TextureView; 6] = std::array::from_fn(|i| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&format!("shadow-cube-face-{i}")),
                format: Some(Self::FORMAT),
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::DepthOnly,
                base_mip_level: 0,
                mip_level_count: Some(1),
                base_array_layer: i as u32,
                array_layer_count: Some(1),
            })
        });

        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("shadow-cube-view"),
            format: Some(Self::FORMAT),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            aspect: wgpu::TextureAspect::DepthOnly,
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(6),
        });

        Self {
            _texture: texture,
            face_views,
            cube_view,
        }
    }

    fn face_view(&self, face: CubeFace) -> &wgpu::TextureView {
        &self.face_views[face as usize]
    }

    fn cube_view(&self) -> &wgpu::TextureView {
        &self.cube_view
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    light_color: [f32; 4],
    light_position: [f32; 4],
    light_attenuation: [f32; 4],
    camera_position: [f32; 4],
    shadow_view: [[f32; 4]; 4],
    shadow_params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    mvp: [[f32; 4]; 4],
    model_view: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FaceConstants {
    mvp: [[f32; 4]; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_part_with_mesh() {
        let mut object = SceneObject::default();
        object.object_type = "part".to_string();
        object.mesh = Some("models/cube.obj".to_string());
        assert!(object_wants_mesh(&object));
    }

    #[test]
    fn renders_part_without_mesh() {
        let mut object = SceneObject::default();
        object.object_type = "part".to_string();
        assert!(object_wants_mesh(&object));
    }

    #[test]
    fn skips_camera_and_light() {
        for kind in ["camera", "light"] {
            let mut object = SceneObject::default();
            object.object_type = kind.to_string();
            assert!(!object_wants_mesh(&object), "{kind}");
        }
    }

    #[test]
    fn default_cube_carries_full_vertex_layout() {
        let cube = default_cube();
        assert_eq!(cube.vertices.len() % VERTEX_STRIDE, 0);
        assert_eq!(cube.indices.len(), 36);
    }
}
