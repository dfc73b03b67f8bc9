//! Scene renderer
//!
//! Owns the per-frame data buffers and descriptor sets, the bindless texture
//! table, uploaded meshes and the two material types (lit default and
//! skybox). A frame renders into the device's offscreen targets and is then
//! blitted to the swapchain image.

use std::mem::size_of;

use ash::vk;
use slotmap::SlotMap;

use crate::config::RendererConfig;
use crate::render::bindless::BindlessTable;
use crate::render::device::{Device, GpuResources, COLOR_TARGET_FORMAT, DEPTH_TARGET_FORMAT};
use crate::render::draw::{
    record_draws, write_object_data, write_scene_data, DrawItem, DrawRecorder, FrameBuffers, MaterialTable, MaterialType,
    RenderList, Skybox,
};
use crate::render::frame::FRAME_OVERLAP;
use crate::render::gpu_data::{PushConstants, MAX_TEXTURES};
use crate::render::mesh::{GpuMesh, MeshDesc, MeshHandle, Vertex};
use crate::render::pipeline::{
    PipelineHandle, PipelineInfo, PipelineLayoutDesc, PipelineLayoutHandle, PipelineManager, VulkanPipelineCompiler,
};
use crate::render::resources::{BufferDesc, BufferHandle, BufferUsage, ImageDesc, ImageHandle};
use crate::render::texture::{Texture, TextureHandle, TextureKind};
use crate::render::vulkan::descriptors::{write_buffer, write_sampled_image};
use crate::render::vulkan::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, LayoutTransition, Sampler, VulkanError,
    VulkanResult,
};
use crate::scene::{Camera, LightComponent, Scene};
use crate::window::SurfaceExtent;

/// Binding of the bindless sampler array in the global set
const TEXTURE_BINDING: u32 = 3;

struct FrameResources {
    buffers: FrameBuffers,
    global_set: vk::DescriptorSet,
    scene_set: vk::DescriptorSet,
}

/// Draw recorder writing into a Vulkan command buffer
struct CommandRecorder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    pipelines: &'a PipelineManager<VulkanPipelineCompiler>,
    resources: &'a GpuResources,
    sets: [vk::DescriptorSet; 2],
}

impl CommandRecorder<'_> {
    fn buffer(&self, handle: BufferHandle) -> Option<vk::Buffer> {
        let buffer = self.resources.get_buffer(handle).map(|buffer| buffer.handle());
        if buffer.is_none() {
            log::warn!("[RENDERER] Bind of dead buffer {handle:?} ignored");
        }
        buffer
    }
}

impl DrawRecorder for CommandRecorder<'_> {
    fn bind_descriptor_sets(&mut self, layout: PipelineLayoutHandle) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.get_pipeline_layout(layout),
                0,
                &self.sets,
                &[],
            );
        }
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        unsafe {
            self.device.cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.get_pipeline(pipeline),
            );
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.buffer(buffer) {
            unsafe { self.device.cmd_bind_vertex_buffers(self.cmd, 0, &[buffer], &[0]) };
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.buffer(buffer) {
            unsafe {
                self.device
                    .cmd_bind_index_buffer(self.cmd, buffer, 0, vk::IndexType::UINT32);
            }
        }
    }

    fn push_draw_index(&mut self, layout: PipelineLayoutHandle, draw_index: u32) {
        let constants = PushConstants { draw_index };
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                self.pipelines.get_pipeline_layout(layout),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&constants),
            );
        }
    }

    fn draw(&mut self, vertex_count: u32) {
        unsafe { self.device.cmd_draw(self.cmd, vertex_count, 1, 0, 0) };
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe { self.device.cmd_draw_indexed(self.cmd, index_count, 1, 0, 0, 0) };
    }
}

fn whole_layers(aspect_mask: vk::ImageAspectFlags, layer: u32, count: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask,
        mip_level: 0,
        base_array_layer: layer,
        layer_count: count,
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

/// Forward renderer over a `Device`
pub struct Renderer {
    pipelines: PipelineManager<VulkanPipelineCompiler>,
    materials: MaterialTable,
    frames: Vec<FrameResources>,
    _descriptor_pool: DescriptorPool,
    _global_layout: DescriptorSetLayout,
    _scene_layout: DescriptorSetLayout,
    sampler: Sampler,
    meshes: SlotMap<MeshHandle, GpuMesh>,
    textures: BindlessTable,
    skybox: Skybox,
    render_list: RenderList,
    config: RendererConfig,
    device: Device,
}

impl Renderer {
    /// Build descriptor sets, pipelines, the default texture and the skybox mesh
    pub fn new(mut device: Device, config: RendererConfig) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let raw = device.raw().clone();
        let frame_count = FRAME_OVERLAP as u32;
        let texture_capacity = MAX_TEXTURES as u32;

        let vertex_fragment = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let global_layout = DescriptorSetLayoutBuilder::new()
            .add_storage_buffer(0, vertex_fragment)
            .add_storage_buffer(1, vk::ShaderStageFlags::VERTEX)
            .add_storage_buffer(2, vertex_fragment)
            .add_bindless_samplers(TEXTURE_BINDING, texture_capacity, vk::ShaderStageFlags::FRAGMENT)
            .build(&raw)?;
        let scene_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vertex_fragment)
            .add_uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT)
            .add_uniform_buffer(2, vk::ShaderStageFlags::FRAGMENT)
            .build(&raw)?;

        let descriptor_pool = DescriptorPool::new(
            &raw,
            2 * frame_count,
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    descriptor_count: 3 * frame_count,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 3 * frame_count,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: texture_capacity * frame_count,
                },
            ],
        )?;
        let global_sets =
            descriptor_pool.allocate(&vec![global_layout.handle(); FRAME_OVERLAP], Some(texture_capacity))?;
        let scene_sets = descriptor_pool.allocate(&vec![scene_layout.handle(); FRAME_OVERLAP], None)?;

        let mut frames = Vec::with_capacity(FRAME_OVERLAP);
        for (global_set, scene_set) in global_sets.into_iter().zip(scene_sets) {
            let buffers = FrameBuffers::create(device.resources_mut())?;
            let storage = vk::DescriptorType::STORAGE_BUFFER;
            let uniform = vk::DescriptorType::UNIFORM_BUFFER;
            write_buffer(&raw, global_set, 0, storage, vk_buffer(&device, buffers.draw_data)?);
            write_buffer(&raw, global_set, 1, storage, vk_buffer(&device, buffers.transforms)?);
            write_buffer(&raw, global_set, 2, storage, vk_buffer(&device, buffers.materials)?);
            write_buffer(&raw, scene_set, 0, uniform, vk_buffer(&device, buffers.camera)?);
            write_buffer(&raw, scene_set, 1, uniform, vk_buffer(&device, buffers.directional_light)?);
            write_buffer(&raw, scene_set, 2, uniform, vk_buffer(&device, buffers.point_lights)?);

            frames.push(FrameResources {
                buffers,
                global_set,
                scene_set,
            });
        }

        let max_anisotropy = device
            .context()
            .physical_device
            .properties
            .limits
            .max_sampler_anisotropy
            .min(16.0);
        let sampler = Sampler::linear(&raw, max_anisotropy)?;

        let mut pipelines = PipelineManager::new(VulkanPipelineCompiler::new(raw));
        let layout = pipelines.create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: vec![global_layout.handle(), scene_layout.handle()],
            push_constant_ranges: vec![vk::PushConstantRange {
                stage_flags: vertex_fragment,
                offset: 0,
                size: size_of::<PushConstants>() as u32,
            }],
        })?;
        let default_pipeline = pipelines.create_pipeline(PipelineInfo::opaque(
            "default",
            config.shader("default"),
            Vertex::input_description(),
            layout,
            COLOR_TARGET_FORMAT,
            DEPTH_TARGET_FORMAT,
        ))?;
        let skybox_pipeline = pipelines.create_pipeline(
            PipelineInfo::opaque(
                "skybox",
                config.shader("skybox"),
                Vertex::input_description(),
                layout,
                COLOR_TARGET_FORMAT,
                DEPTH_TARGET_FORMAT,
            )
            .without_depth_write(),
        )?;
        let materials = MaterialTable {
            default: MaterialType {
                pipeline: default_pipeline,
                layout,
            },
            skybox: MaterialType {
                pipeline: skybox_pipeline,
                layout,
            },
        };

        let default_image = create_texture_image(&mut device, &Texture::solid_color(1, 1, [255; 4]))?;
        let mut meshes = SlotMap::with_key();
        let skybox_mesh = meshes.insert(upload_mesh_buffers(&mut device, &MeshDesc::skybox_cube())?);

        let renderer = Self {
            pipelines,
            materials,
            frames,
            _descriptor_pool: descriptor_pool,
            _global_layout: global_layout,
            _scene_layout: scene_layout,
            sampler,
            meshes,
            textures: BindlessTable::new(default_image),
            skybox: Skybox {
                mesh: skybox_mesh,
                texture: TextureHandle::DEFAULT,
            },
            render_list: RenderList::default(),
            config,
            device,
        };
        renderer.write_texture_slot(TextureHandle::DEFAULT, default_image)?;

        log::info!("[RENDERER] Initialized");
        Ok(renderer)
    }

    /// Partition `scene` into drawables and lights for the following frames
    pub fn give_renderables(&mut self, scene: &Scene) -> VulkanResult<()> {
        self.render_list = RenderList::build(scene)?;
        Ok(())
    }

    /// Record and present one frame.
    ///
    /// Returns `Ok(false)` when the frame was skipped for a swapchain rebuild.
    /// An error after the frame has begun leaves the slot's fence unsignaled,
    /// so the next `draw` on that slot times out; callers treat any error as
    /// fatal and shut down.
    pub fn draw<W: SurfaceExtent>(&mut self, window: &mut W, camera: &Camera, scene: &Scene) -> VulkanResult<bool> {
        if !self.device.begin_frame(window)? {
            return Ok(false);
        }

        let frame = &self.frames[self.device.current_slot()];
        let buffers = frame.buffers;
        let sets = [frame.global_set, frame.scene_set];

        let items = write_object_data(
            self.device.resources_mut(),
            &buffers,
            scene,
            &self.render_list,
            self.skybox,
            &self.textures,
        )?;

        let extent = self.device.render_targets().extent;
        #[allow(clippy::cast_precision_loss)]
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        write_scene_data(
            self.device.resources_mut(),
            &buffers,
            scene,
            &self.render_list,
            camera,
            aspect,
        )?;

        self.record_frame(&items, sets)?;

        self.device.present(window)?;
        self.device.end_frame();
        Ok(true)
    }

    fn record_frame(&self, items: &[DrawItem], sets: [vk::DescriptorSet; 2]) -> VulkanResult<()> {
        use vk::ImageLayout as L;

        let device = self.device.raw();
        let cmd = self.device.current_command_buffer();
        let targets = self.device.render_targets();
        let color = self.device.image(targets.color)?;
        let depth = self.device.image(targets.depth)?;
        let swapchain_image = self.device.current_swapchain_image()?;
        let swapchain_extent = self.device.swapchain_extent();
        let color_aspect = vk::ImageAspectFlags::COLOR;
        let depth_aspect = vk::ImageAspectFlags::DEPTH;

        LayoutTransition::between(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL)?.record(
            device,
            cmd,
            color.handle(),
            color_aspect,
            1,
        );
        LayoutTransition::between(L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL)?.record(
            device,
            cmd,
            depth.handle(),
            depth_aspect,
            1,
        );

        #[allow(clippy::cast_precision_loss)]
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: targets.extent.width as f32,
            height: targets.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: targets.extent,
        };

        let color_attachment = vk::RenderingAttachmentInfo::builder()
            .image_view(color.view())
            .image_layout(L::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.config.clear_color,
                },
            })
            .build();
        let depth_attachment = vk::RenderingAttachmentInfo::builder()
            .image_view(depth.view())
            .image_layout(L::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            })
            .build();
        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::builder()
            .render_area(scissor)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
        }

        let mut recorder = CommandRecorder {
            device,
            cmd,
            pipelines: &self.pipelines,
            resources: self.device.resources(),
            sets,
        };
        record_draws(&mut recorder, items, &self.materials, &self.meshes);

        unsafe { device.cmd_end_rendering(cmd) };

        LayoutTransition::between(L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL)?.record(
            device,
            cmd,
            color.handle(),
            color_aspect,
            1,
        );
        LayoutTransition::between(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL)?.record(
            device,
            cmd,
            swapchain_image,
            color_aspect,
            1,
        );

        let blit = vk::ImageBlit {
            src_subresource: whole_layers(color_aspect, 0, 1),
            src_offsets: [vk::Offset3D::default(), far_corner(targets.extent)],
            dst_subresource: whole_layers(color_aspect, 0, 1),
            dst_offsets: [vk::Offset3D::default(), far_corner(swapchain_extent)],
        };
        unsafe {
            device.cmd_blit_image(
                cmd,
                color.handle(),
                L::TRANSFER_SRC_OPTIMAL,
                swapchain_image,
                L::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }

        LayoutTransition::between(L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR)?.record(
            device,
            cmd,
            swapchain_image,
            color_aspect,
            1,
        );
        // Leave both targets sampleable for the editor viewport
        LayoutTransition::between(L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)?.record(
            device,
            cmd,
            color.handle(),
            color_aspect,
            1,
        );
        LayoutTransition::between(L::DEPTH_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)?.record(
            device,
            cmd,
            depth.handle(),
            depth_aspect,
            1,
        );
        Ok(())
    }

    /// Upload geometry to device-local buffers
    pub fn upload_mesh(&mut self, mesh: &MeshDesc) -> VulkanResult<MeshHandle> {
        let gpu_mesh = upload_mesh_buffers(&mut self.device, mesh)?;
        Ok(self.meshes.insert(gpu_mesh))
    }

    /// Upload a texture into the next bindless slot.
    ///
    /// An empty texture logs a warning and resolves to the default slot.
    pub fn upload_texture(&mut self, texture: &Texture) -> VulkanResult<TextureHandle> {
        if texture.is_empty() {
            log::warn!("[RENDERER] Empty texture upload, using default texture");
            return Ok(TextureHandle::DEFAULT);
        }
        let image = create_texture_image(&mut self.device, texture)?;
        let handle = match self.textures.register(image, texture.kind) {
            Ok(handle) => handle,
            Err(e) => {
                self.device.resources_mut().destroy_image(image);
                return Err(e);
            }
        };

        // Sets of in-flight frames must not change under the GPU
        self.device.wait_render()?;
        self.write_texture_slot(handle, image)?;

        log::info!(
            "[RENDERER] Texture {}x{} {:?} bound to slot {}",
            texture.width,
            texture.height,
            texture.kind,
            handle.0
        );
        Ok(handle)
    }

    fn write_texture_slot(&self, handle: TextureHandle, image: ImageHandle) -> VulkanResult<()> {
        let view = self.device.image(image)?.view();
        for frame in &self.frames {
            write_sampled_image(
                self.device.raw(),
                frame.global_set,
                TEXTURE_BINDING,
                handle.0,
                view,
                self.sampler.handle(),
            );
        }
        Ok(())
    }

    /// Use the cubemap in `texture` as the skybox.
    ///
    /// Fails for unbound slots and for 2D textures.
    pub fn set_skybox(&mut self, texture: TextureHandle) -> VulkanResult<()> {
        self.skybox.texture = check_skybox_texture(&self.textures, texture)?;
        Ok(())
    }

    /// Rebuild every pipeline from its shader files
    pub fn recompile_pipelines(&mut self) -> VulkanResult<()> {
        self.device.wait_idle()?;
        self.pipelines.recompile_pipelines()
    }

    /// Request a swapchain rebuild, typically after a resize
    pub fn mark_swapchain_dirty(&mut self) {
        self.device.mark_swapchain_dirty();
    }

    /// Color and depth targets as images for the editor viewport
    pub const fn viewport_textures(&self) -> (ImageHandle, ImageHandle) {
        self.device.viewport_textures()
    }

    /// The sun of the current render list, for editing
    pub fn sun_light_mut<'s>(&self, scene: &'s mut Scene) -> Option<&'s mut LightComponent> {
        let id = self.render_list.directional()?;
        scene.get_mut(id)?.light.as_mut()
    }

    /// Current skybox cubemap slot
    pub const fn skybox_texture(&self) -> TextureHandle {
        self.skybox.texture
    }

    /// Occupied bindless slots, default included
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// The render list built by the last `give_renderables`
    pub const fn render_list(&self) -> &RenderList {
        &self.render_list
    }

    /// The underlying device
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// The underlying device, mutably
    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("[RENDERER] wait_idle failed during teardown: {e}");
        }
        for frame in &self.frames {
            frame.buffers.destroy(self.device.resources_mut());
        }
        log::debug!(
            "[RENDERER] Releasing {} meshes, {} textures, {} pipelines",
            self.meshes.len(),
            self.textures.len(),
            self.pipelines.pipeline_count()
        );
    }
}

/// Copy `bytes` into a new staging buffer
fn create_staging(device: &mut Device, bytes: &[u8]) -> VulkanResult<BufferHandle> {
    let resources = device.resources_mut();
    let staging = resources.create_buffer(BufferDesc::staging(bytes.len() as u64))?;
    if let Err(e) = resources.write_buffer(staging, 0, bytes) {
        resources.destroy_buffer(staging);
        return Err(e);
    }
    Ok(staging)
}

fn vk_buffer(device: &Device, handle: BufferHandle) -> VulkanResult<vk::Buffer> {
    device
        .resources()
        .get_buffer(handle)
        .map(|buffer| buffer.handle())
        .ok_or_else(|| VulkanError::ResourceNotFound {
            id: format!("{handle:?}"),
        })
}

/// Stage `bytes` and copy them into a new device-local buffer
fn upload_buffer(device: &mut Device, bytes: &[u8], usage: BufferUsage) -> VulkanResult<BufferHandle> {
    let size = bytes.len() as u64;
    let staging = create_staging(device, bytes)?;
    let result = device
        .resources_mut()
        .create_buffer(BufferDesc::device_local(size, usage))
        .and_then(|dst| {
            let src = vk_buffer(device, staging)?;
            let dst_buffer = vk_buffer(device, dst)?;
            let copied = device.immediate_submit(|raw, cmd| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                unsafe { raw.cmd_copy_buffer(cmd, src, dst_buffer, &[region]) };
                Ok(())
            });
            match copied {
                Ok(()) => Ok(dst),
                Err(e) => {
                    device.resources_mut().destroy_buffer(dst);
                    Err(e)
                }
            }
        });
    device.resources_mut().destroy_buffer(staging);
    result
}

fn upload_mesh_buffers(device: &mut Device, mesh: &MeshDesc) -> VulkanResult<GpuMesh> {
    if mesh.vertices.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "mesh has no vertices".to_string(),
        });
    }

    let vertex_buffer = upload_buffer(device, bytemuck::cast_slice(&mesh.vertices), BufferUsage::Vertex)?;
    let index_buffer = if mesh.has_indices() {
        match upload_buffer(device, bytemuck::cast_slice(&mesh.indices), BufferUsage::Index) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                device.resources_mut().destroy_buffer(vertex_buffer);
                return Err(e);
            }
        }
    } else {
        None
    };

    log::debug!(
        "[RENDERER] Mesh uploaded ({} vertices, {} indices)",
        mesh.vertices.len(),
        mesh.indices.len()
    );
    Ok(GpuMesh {
        vertex_buffer,
        index_buffer,
        draw_count: mesh.draw_count(),
    })
}

/// `texture` if it is a bound cubemap slot
fn check_skybox_texture(textures: &BindlessTable, texture: TextureHandle) -> VulkanResult<TextureHandle> {
    match textures.kind(texture) {
        Some(TextureKind::Cubemap) => Ok(texture),
        Some(TextureKind::Flat) => Err(VulkanError::InvalidOperation {
            reason: format!("skybox texture {texture:?} is not a cubemap"),
        }),
        None => Err(VulkanError::ResourceNotFound {
            id: format!("{texture:?}"),
        }),
    }
}

/// Create a sampled image from `texture` and fill it through a staging buffer.
///
/// The image ends in `SHADER_READ_ONLY_OPTIMAL`.
fn create_texture_image(device: &mut Device, texture: &Texture) -> VulkanResult<ImageHandle> {
    if !texture.is_complete() {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "texture data is {} bytes, expected {} for {}x{} {:?}",
                texture.pixels.len(),
                texture.face_size() * texture.kind.face_count(),
                texture.width,
                texture.height,
                texture.kind
            ),
        });
    }

    let format = texture.format.vk_format();
    let desc = match texture.kind {
        TextureKind::Flat => ImageDesc::texture(texture.width, texture.height, format),
        TextureKind::Cubemap => ImageDesc::cubemap(texture.width, format),
    };
    let layer_count = desc.layer_count();
    let aspect = desc.aspect_mask();

    let staging = create_staging(device, &texture.pixels)?;
    let result = device.resources_mut().create_image(desc).and_then(|image| {
        let src = vk_buffer(device, staging)?;
        let dst = device.image(image)?.handle();
        let face_size = texture.face_size() as u64;
        let regions: Vec<vk::BufferImageCopy> = (0..layer_count)
            .map(|layer| vk::BufferImageCopy {
                buffer_offset: u64::from(layer) * face_size,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: whole_layers(aspect, layer, 1),
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: texture.width,
                    height: texture.height,
                    depth: 1,
                },
            })
            .collect();

        let copied = device.immediate_submit(|raw, cmd| {
            use vk::ImageLayout as L;
            LayoutTransition::between(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL)?.record(raw, cmd, dst, aspect, layer_count);
            unsafe { raw.cmd_copy_buffer_to_image(cmd, src, dst, L::TRANSFER_DST_OPTIMAL, &regions) };
            LayoutTransition::between(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)?.record(
                raw,
                cmd,
                dst,
                aspect,
                layer_count,
            );
            Ok(())
        });
        match copied {
            Ok(()) => Ok(image),
            Err(e) => {
                device.resources_mut().destroy_image(image);
                Err(e)
            }
        }
    });
    device.resources_mut().destroy_buffer(staging);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_skybox_requires_bound_cubemap() {
        let mut images = SlotMap::<ImageHandle, ()>::with_key();
        let mut textures = BindlessTable::new(images.insert(()));
        let flat = textures.register(images.insert(()), TextureKind::Flat).unwrap();
        let cube = textures.register(images.insert(()), TextureKind::Cubemap).unwrap();

        assert_eq!(check_skybox_texture(&textures, cube).unwrap(), cube);
        assert!(matches!(
            check_skybox_texture(&textures, flat),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(matches!(
            check_skybox_texture(&textures, TextureHandle::DEFAULT),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(matches!(
            check_skybox_texture(&textures, TextureHandle(99)),
            Err(VulkanError::ResourceNotFound { .. })
        ));
    }
}
