//! Per-frame object data and draw recording
//!
//! The renderer turns the scene into three parallel arrays (draw data,
//! transforms, materials) plus camera and light blocks, then walks the same
//! ordered list to emit draws. Slot 0 of every array belongs to the skybox;
//! the k-th drawn entity uses slot k + 1. Entities are drawn first and the
//! skybox last so depth rejects most of its fragments.
//!
//! Recording goes through `DrawRecorder`, which the renderer implements on
//! a command buffer and tests implement on a plain command log.

use std::collections::HashMap;
use std::mem::size_of;

use bytemuck::Pod;
use slotmap::SlotMap;

use crate::foundation::math::{to_cols_array, Mat4};
use crate::render::bindless::BindlessTable;
use crate::render::gpu_data::{
    vec4, GpuCamera, GpuDirectionalLight, GpuDrawData, GpuMaterial, GpuPointLight, GpuPointLightBlock,
    GpuTransform, MAX_OBJECTS, MAX_POINT_LIGHTS, NO_TEXTURE,
};
use crate::render::mesh::{GpuMesh, MeshHandle};
use crate::render::pipeline::{PipelineHandle, PipelineLayoutHandle};
use crate::render::resources::{BufferDesc, BufferHandle, BufferUsage, ResourceBackend, ResourceManager};
use crate::render::texture::{TextureHandle, TextureKind};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::scene::{Camera, EntityId, LightComponent, LightType, RenderableComponent, Scene};

/// Draw data slot reserved for the skybox
pub const SKYBOX_SLOT: u32 = 0;

/// Pipeline state shared by every draw of one material type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialType {
    /// Graphics pipeline
    pub pipeline: PipelineHandle,
    /// Layout the pipeline and descriptor sets share
    pub layout: PipelineLayoutHandle,
}

/// Which material type a draw uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// Lit, textured entities
    Default,
    /// Cubemap background
    Skybox,
}

/// Material types by kind
#[derive(Debug, Clone, Copy)]
pub struct MaterialTable {
    /// Used by entities
    pub default: MaterialType,
    /// Used by the skybox
    pub skybox: MaterialType,
}

impl MaterialTable {
    /// Material type for `kind`
    pub const fn get(&self, kind: MaterialKind) -> MaterialType {
        match kind {
            MaterialKind::Default => self.default,
            MaterialKind::Skybox => self.skybox,
        }
    }
}

/// One draw in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    /// Material type to bind
    pub material: MaterialKind,
    /// Mesh to bind
    pub mesh: MeshHandle,
    /// Pushed as the draw data index
    pub draw_index: u32,
}

/// Skybox pseudo-object drawn after every entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skybox {
    /// Inward-facing cube
    pub mesh: MeshHandle,
    /// Cubemap slot; the default texture until one is set
    pub texture: TextureHandle,
}

/// Command sink for the draw loop
pub trait DrawRecorder {
    /// Bind the global set (0) and the scene set (1) against `layout`
    fn bind_descriptor_sets(&mut self, layout: PipelineLayoutHandle);
    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: PipelineHandle);
    /// Bind a vertex buffer at binding 0
    fn bind_vertex_buffer(&mut self, buffer: BufferHandle);
    /// Bind a `u32` index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle);
    /// Push the draw data index
    fn push_draw_index(&mut self, layout: PipelineLayoutHandle, draw_index: u32);
    /// Non-indexed draw
    fn draw(&mut self, vertex_count: u32);
    /// Indexed draw
    fn draw_indexed(&mut self, index_count: u32);
}

/// Partition of a scene into drawables and lights.
///
/// Built once by `give_renderables`; the draw loop reuses it every frame.
#[derive(Debug, Default, Clone)]
pub struct RenderList {
    renderables: Vec<EntityId>,
    lights: HashMap<LightType, Vec<EntityId>>,
}

impl RenderList {
    /// Collect renderable and light entities in scene order.
    ///
    /// Fails when the drawables plus the skybox would not fit the object arrays.
    pub fn build(scene: &Scene) -> VulkanResult<Self> {
        let mut list = Self::default();
        for (id, entity) in scene.iter() {
            if entity.renderable.is_some() {
                list.renderables.push(id);
            }
            if let Some(light) = &entity.light {
                list.lights.entry(light.light_type).or_default().push(id);
            }
        }

        let requested = list.renderables.len() + 1;
        if requested > MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                what: "objects",
                requested,
                capacity: MAX_OBJECTS,
            });
        }

        let points = list.point_lights().len();
        if points > MAX_POINT_LIGHTS {
            log::warn!("[RENDERER] {points} point lights in scene, only {MAX_POINT_LIGHTS} are shaded");
        }
        if list.directional().is_none() {
            log::warn!("[RENDERER] Scene has no directional light");
        }
        log::debug!(
            "[RENDERER] Render list: {} renderables, {} lights",
            list.renderables.len(),
            list.lights.values().map(Vec::len).sum::<usize>()
        );
        Ok(list)
    }

    /// Drawable entities in draw order
    pub fn renderables(&self) -> &[EntityId] {
        &self.renderables
    }

    /// First directional light, the sun
    pub fn directional(&self) -> Option<EntityId> {
        self.lights.get(&LightType::Directional).and_then(|ids| ids.first().copied())
    }

    /// Point lights in scene order
    pub fn point_lights(&self) -> &[EntityId] {
        self.lights.get(&LightType::Point).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One frame slot's data buffers, all host-visible and persistently mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBuffers {
    /// `GpuDrawData` array
    pub draw_data: BufferHandle,
    /// `GpuTransform` array
    pub transforms: BufferHandle,
    /// `GpuMaterial` array
    pub materials: BufferHandle,
    /// `GpuCamera` block
    pub camera: BufferHandle,
    /// `GpuDirectionalLight` block
    pub directional_light: BufferHandle,
    /// `GpuPointLightBlock`
    pub point_lights: BufferHandle,
}

const fn array_size<T>(count: usize) -> u64 {
    (size_of::<T>() * count) as u64
}

impl FrameBuffers {
    /// Allocate every buffer for one slot
    pub fn create<B: ResourceBackend>(resources: &mut ResourceManager<B>) -> VulkanResult<Self> {
        Ok(Self {
            draw_data: resources.create_buffer(BufferDesc::host(
                array_size::<GpuDrawData>(MAX_OBJECTS),
                BufferUsage::Storage,
            ))?,
            transforms: resources.create_buffer(BufferDesc::host(
                array_size::<GpuTransform>(MAX_OBJECTS),
                BufferUsage::Storage,
            ))?,
            materials: resources.create_buffer(BufferDesc::host(
                array_size::<GpuMaterial>(MAX_OBJECTS),
                BufferUsage::Storage,
            ))?,
            camera: resources.create_buffer(BufferDesc::host(array_size::<GpuCamera>(1), BufferUsage::Uniform))?,
            directional_light: resources.create_buffer(BufferDesc::host(
                array_size::<GpuDirectionalLight>(1),
                BufferUsage::Uniform,
            ))?,
            point_lights: resources.create_buffer(BufferDesc::host(
                array_size::<GpuPointLightBlock>(1),
                BufferUsage::Uniform,
            ))?,
        })
    }

    /// Release every buffer
    pub fn destroy<B: ResourceBackend>(&self, resources: &mut ResourceManager<B>) {
        for buffer in [
            self.draw_data,
            self.transforms,
            self.materials,
            self.camera,
            self.directional_light,
            self.point_lights,
        ] {
            resources.destroy_buffer(buffer);
        }
    }
}

fn write_slot<B: ResourceBackend, T: Pod>(
    resources: &mut ResourceManager<B>,
    buffer: BufferHandle,
    slot: u32,
    value: &T,
) -> VulkanResult<()> {
    let offset = u64::from(slot) * size_of::<T>() as u64;
    resources.write_buffer(buffer, offset, bytemuck::bytes_of(value))
}

fn write_object<B: ResourceBackend>(
    resources: &mut ResourceManager<B>,
    buffers: &FrameBuffers,
    slot: u32,
    model: &Mat4,
    material: &GpuMaterial,
) -> VulkanResult<()> {
    #[allow(clippy::cast_possible_wrap)]
    let index = slot as i32;
    write_slot(resources, buffers.draw_data, slot, &GpuDrawData::new(index, index))?;
    write_slot(resources, buffers.transforms, slot, &GpuTransform::from_model(model))?;
    write_slot(resources, buffers.materials, slot, material)
}

/// Material slots of an entity, restricted to bound 2D textures.
///
/// Unbound slots and cubemaps are written as `NO_TEXTURE`.
fn entity_texture_indices(id: EntityId, renderable: &RenderableComponent, textures: &BindlessTable) -> [i32; 4] {
    [
        renderable.diffuse,
        renderable.normal,
        renderable.roughness,
        renderable.emissive,
    ]
    .map(|texture| {
        let Some(handle) = texture else {
            return NO_TEXTURE;
        };
        textures.resolve(handle, TextureKind::Flat).map_or_else(
            || {
                log::warn!("[RENDERER] Entity {id:?} references {handle:?}, which is not a bound 2D texture");
                NO_TEXTURE
            },
            TextureHandle::shader_index,
        )
    })
}

/// Skybox cubemap slot, or the default slot when it is not a bound cubemap
fn skybox_texture_index(skybox: &Skybox, textures: &BindlessTable) -> i32 {
    let handle = textures
        .resolve(skybox.texture, TextureKind::Cubemap)
        .unwrap_or_else(|| {
            if skybox.texture != TextureHandle::DEFAULT {
                log::warn!("[RENDERER] Skybox {:?} is not a bound cubemap", skybox.texture);
            }
            TextureHandle::DEFAULT
        });
    handle.shader_index()
}

/// Fill the object arrays for this frame and return the draws in order.
///
/// Listed entities that have since lost their renderable, or were despawned,
/// are skipped with a warning; later entities still draw. Texture references
/// are checked against `textures` so the shaders only index bound slots of
/// the right view type.
pub fn write_object_data<B: ResourceBackend>(
    resources: &mut ResourceManager<B>,
    buffers: &FrameBuffers,
    scene: &Scene,
    list: &RenderList,
    skybox: Skybox,
    textures: &BindlessTable,
) -> VulkanResult<Vec<DrawItem>> {
    let mut items = Vec::with_capacity(list.renderables().len() + 1);

    for &id in list.renderables() {
        let Some((entity, renderable)) = scene
            .get(id)
            .and_then(|entity| entity.renderable.as_ref().map(|renderable| (entity, renderable)))
        else {
            log::warn!("[RENDERER] Entity {id:?} has no renderable, skipping");
            continue;
        };

        let slot = u32::try_from(items.len() + 1).unwrap_or(u32::MAX);
        if slot as usize >= MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                what: "objects",
                requested: slot as usize + 1,
                capacity: MAX_OBJECTS,
            });
        }

        let material = GpuMaterial::entity(entity_texture_indices(id, renderable, textures));
        write_object(resources, buffers, slot, &entity.transform.to_matrix(), &material)?;
        items.push(DrawItem {
            material: MaterialKind::Default,
            mesh: renderable.mesh,
            draw_index: slot,
        });
    }

    let material = GpuMaterial::skybox(skybox_texture_index(&skybox, textures));
    write_object(resources, buffers, SKYBOX_SLOT, &Mat4::identity(), &material)?;
    items.push(DrawItem {
        material: MaterialKind::Skybox,
        mesh: skybox.mesh,
        draw_index: SKYBOX_SLOT,
    });

    Ok(items)
}

/// Shader form of a directional light
pub fn directional_to_gpu(light: &LightComponent) -> GpuDirectionalLight {
    GpuDirectionalLight {
        ambient: vec4(&light.ambient, 1.0),
        diffuse: vec4(&light.diffuse, 1.0),
        specular: vec4(&light.specular, 1.0),
        direction: vec4(&light.direction, 0.0),
    }
}

/// Shader form of a point light
pub fn point_to_gpu(light: &LightComponent) -> GpuPointLight {
    GpuPointLight::new(
        vec4(&light.ambient, 1.0),
        vec4(&light.diffuse, 1.0),
        vec4(&light.specular, 1.0),
        vec4(&light.position, 1.0),
        [light.constant, light.linear, light.quadratic],
    )
}

/// Write the camera and light blocks for this frame
pub fn write_scene_data<B: ResourceBackend>(
    resources: &mut ResourceManager<B>,
    buffers: &FrameBuffers,
    scene: &Scene,
    list: &RenderList,
    camera: &Camera,
    aspect: f32,
) -> VulkanResult<()> {
    let camera_data = GpuCamera {
        view: to_cols_array(&camera.view_matrix()),
        proj: to_cols_array(&camera.projection_matrix(aspect)),
        position: vec4(&camera.position, 0.0),
    };
    write_slot(resources, buffers.camera, 0, &camera_data)?;

    // A list without a sun was already reported when it was built
    let sun_data = list.directional().map_or_else(GpuDirectionalLight::default, |id| {
        scene
            .get(id)
            .and_then(|entity| entity.light.as_ref())
            .map_or_else(
                || {
                    log::warn!("[RENDERER] Sun {id:?} is gone, sun zeroed");
                    GpuDirectionalLight::default()
                },
                directional_to_gpu,
            )
    });
    write_slot(resources, buffers.directional_light, 0, &sun_data)?;

    let points = list
        .point_lights()
        .iter()
        .filter_map(|&id| scene.get(id).and_then(|entity| entity.light.as_ref()))
        .filter(|light| light.light_type == LightType::Point)
        .map(point_to_gpu);
    write_slot(resources, buffers.point_lights, 0, &GpuPointLightBlock::pack(points))
}

/// Emit state changes and draws for `items`.
///
/// Descriptor sets and pipeline are rebound only when the material type
/// changes, vertex and index buffers only when the mesh changes.
pub fn record_draws<R: DrawRecorder>(
    recorder: &mut R,
    items: &[DrawItem],
    materials: &MaterialTable,
    meshes: &SlotMap<MeshHandle, GpuMesh>,
) {
    let mut last_material = None;
    let mut last_mesh = None;

    for item in items {
        let Some(mesh) = meshes.get(item.mesh) else {
            log::warn!("[RENDERER] Draw {} references a dead mesh, skipping", item.draw_index);
            continue;
        };

        let material = materials.get(item.material);
        if last_material != Some(item.material) {
            recorder.bind_descriptor_sets(material.layout);
            recorder.bind_pipeline(material.pipeline);
            last_material = Some(item.material);
        }

        recorder.push_draw_index(material.layout, item.draw_index);

        if last_mesh != Some(item.mesh) {
            recorder.bind_vertex_buffer(mesh.vertex_buffer);
            if let Some(index_buffer) = mesh.index_buffer {
                recorder.bind_index_buffer(index_buffer);
            }
            last_mesh = Some(item.mesh);
        }

        if mesh.index_buffer.is_some() {
            recorder.draw_indexed(mesh.draw_count);
        } else {
            recorder.draw(mesh.draw_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Transform, Vec3};
    use crate::render::resources::{HostMemoryBackend, ImageHandle};
    use crate::scene::{Entity, RenderableComponent};
    use approx::assert_relative_eq;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Command {
        BindSets(PipelineLayoutHandle),
        BindPipeline(PipelineHandle),
        BindVertex(BufferHandle),
        BindIndex(BufferHandle),
        Push(u32),
        Draw(u32),
        DrawIndexed(u32),
    }

    #[derive(Default)]
    struct CaptureRecorder {
        commands: Vec<Command>,
    }

    impl DrawRecorder for CaptureRecorder {
        fn bind_descriptor_sets(&mut self, layout: PipelineLayoutHandle) {
            self.commands.push(Command::BindSets(layout));
        }

        fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
            self.commands.push(Command::BindPipeline(pipeline));
        }

        fn bind_vertex_buffer(&mut self, buffer: BufferHandle) {
            self.commands.push(Command::BindVertex(buffer));
        }

        fn bind_index_buffer(&mut self, buffer: BufferHandle) {
            self.commands.push(Command::BindIndex(buffer));
        }

        fn push_draw_index(&mut self, _layout: PipelineLayoutHandle, draw_index: u32) {
            self.commands.push(Command::Push(draw_index));
        }

        fn draw(&mut self, vertex_count: u32) {
            self.commands.push(Command::Draw(vertex_count));
        }

        fn draw_indexed(&mut self, index_count: u32) {
            self.commands.push(Command::DrawIndexed(index_count));
        }
    }

    struct Fixture {
        resources: ResourceManager<HostMemoryBackend>,
        buffers: FrameBuffers,
        meshes: SlotMap<MeshHandle, GpuMesh>,
        cube: MeshHandle,
        skybox: Skybox,
        materials: MaterialTable,
        textures: BindlessTable,
    }

    fn fixture() -> Fixture {
        let mut resources = ResourceManager::new(HostMemoryBackend::default());
        let buffers = FrameBuffers::create(&mut resources).unwrap();

        let mut meshes = SlotMap::with_key();
        let cube_vertices = resources
            .create_buffer(BufferDesc::device_local(1024, BufferUsage::Vertex))
            .unwrap();
        let cube_indices = resources
            .create_buffer(BufferDesc::device_local(144, BufferUsage::Index))
            .unwrap();
        let cube = meshes.insert(GpuMesh {
            vertex_buffer: cube_vertices,
            index_buffer: Some(cube_indices),
            draw_count: 36,
        });
        let sky_vertices = resources
            .create_buffer(BufferDesc::device_local(2016, BufferUsage::Vertex))
            .unwrap();
        let sky = meshes.insert(GpuMesh {
            vertex_buffer: sky_vertices,
            index_buffer: None,
            draw_count: 36,
        });

        let materials = MaterialTable {
            default: MaterialType {
                pipeline: test_pipeline(0),
                layout: test_layout(0),
            },
            skybox: MaterialType {
                pipeline: test_pipeline(1),
                layout: test_layout(0),
            },
        };

        // Slots 1, 3 and 4 are 2D textures, slot 2 a cubemap
        let mut images = SlotMap::<ImageHandle, ()>::with_key();
        let mut textures = BindlessTable::new(images.insert(()));
        for kind in [TextureKind::Flat, TextureKind::Cubemap, TextureKind::Flat, TextureKind::Flat] {
            textures.register(images.insert(()), kind).unwrap();
        }

        Fixture {
            resources,
            buffers,
            meshes,
            cube,
            skybox: Skybox {
                mesh: sky,
                texture: TextureHandle(2),
            },
            materials,
            textures,
        }
    }

    const fn test_pipeline(index: u32) -> PipelineHandle {
        PipelineHandle(index)
    }

    const fn test_layout(index: u32) -> PipelineLayoutHandle {
        PipelineLayoutHandle(index)
    }

    fn read<T: Pod>(resources: &ResourceManager<HostMemoryBackend>, buffer: BufferHandle, slot: u32) -> T {
        let bytes = resources.buffer_bytes(buffer).unwrap();
        let start = slot as usize * size_of::<T>();
        bytemuck::pod_read_unaligned(&bytes[start..start + size_of::<T>()])
    }

    fn scene_with_cubes(cube: MeshHandle, count: usize) -> Scene {
        let mut scene = Scene::new();
        for i in 0..count {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f32 * 2.0;
            scene.spawn(
                Entity::new(format!("cube{i}"))
                    .with_transform(Transform::from_position(Vec3::new(x, 0.0, 0.0)))
                    .with_renderable(RenderableComponent::new(cube)),
            );
        }
        scene
    }

    #[test]
    fn test_transform_slot_matches_pushed_index() {
        let mut fx = fixture();
        let scene = scene_with_cubes(fx.cube, 3);
        let list = RenderList::build(&scene).unwrap();

        let items = write_object_data(&mut fx.resources, &fx.buffers, &scene, &list, fx.skybox, &fx.textures).unwrap();
        let mut recorder = CaptureRecorder::default();
        record_draws(&mut recorder, &items, &fx.materials, &fx.meshes);

        let pushed: Vec<u32> = recorder
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Push(index) => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(pushed, vec![1, 2, 3, 0]);

        for (k, &index) in pushed[..3].iter().enumerate() {
            let draw: GpuDrawData = read(&fx.resources, fx.buffers.draw_data, index);
            assert_eq!(draw.transform_index, index as i32);
            assert_eq!(draw.material_index, index as i32);

            let transform: GpuTransform = read(&fx.resources, fx.buffers.transforms, draw.transform_index as u32);
            #[allow(clippy::cast_precision_loss)]
            let expected_x = k as f32 * 2.0;
            assert_relative_eq!(transform.model[3][0], expected_x);
        }
    }

    #[test]
    fn test_absent_textures_serialize_negative() {
        let mut fx = fixture();
        let mut scene = Scene::new();
        scene.spawn(
            Entity::new("textured").with_renderable(
                RenderableComponent::new(fx.cube)
                    .with_diffuse(TextureHandle(1))
                    .with_roughness(TextureHandle(4)),
            ),
        );
        let list = RenderList::build(&scene).unwrap();
        write_object_data(&mut fx.resources, &fx.buffers, &scene, &list, fx.skybox, &fx.textures).unwrap();

        let material: GpuMaterial = read(&fx.resources, fx.buffers.materials, 1);
        assert_eq!(material.texture_indices, [1, -1, 4, -1]);
        assert_relative_eq!(material.shininess, 64.0);

        let skybox: GpuMaterial = read(&fx.resources, fx.buffers.materials, SKYBOX_SLOT);
        assert_eq!(skybox.texture_indices, [2, -1, -1, -1]);
    }

    #[test]
    fn test_unbound_and_cubemap_slots_fall_back() {
        let mut fx = fixture();
        let mut scene = Scene::new();
        scene.spawn(
            Entity::new("bad refs").with_renderable(
                RenderableComponent::new(fx.cube)
                    .with_diffuse(TextureHandle(99))
                    .with_normal(TextureHandle(2))
                    .with_emissive(TextureHandle(3)),
            ),
        );
        let list = RenderList::build(&scene).unwrap();
        write_object_data(&mut fx.resources, &fx.buffers, &scene, &list, fx.skybox, &fx.textures).unwrap();

        let material: GpuMaterial = read(&fx.resources, fx.buffers.materials, 1);
        assert_eq!(material.texture_indices, [NO_TEXTURE, NO_TEXTURE, NO_TEXTURE, 3]);
    }

    #[test]
    fn test_skybox_only_samples_cubemaps() {
        let mut fx = fixture();
        let scene = Scene::new();
        let list = RenderList::build(&scene).unwrap();

        for texture in [TextureHandle(1), TextureHandle(99), TextureHandle::DEFAULT] {
            let skybox = Skybox { texture, ..fx.skybox };
            write_object_data(&mut fx.resources, &fx.buffers, &scene, &list, skybox, &fx.textures).unwrap();
            let material: GpuMaterial = read(&fx.resources, fx.buffers.materials, SKYBOX_SLOT);
            assert_eq!(material.texture_indices[0], 0);
        }
    }

    #[test]
    fn test_state_changes_only_on_transitions() {
        let mut fx = fixture();
        let scene = scene_with_cubes(fx.cube, 3);
        let list = RenderList::build(&scene).unwrap();
        let items = write_object_data(&mut fx.resources, &fx.buffers, &scene, &list, fx.skybox, &fx.textures).unwrap();

        let mut recorder = CaptureRecorder::default();
        record_draws(&mut recorder, &items, &fx.materials, &fx.meshes);

        let count = |pred: fn(&Command) -> bool| recorder.commands.iter().filter(|c| pred(*c)).count();
        assert_eq!(count(|c| matches!(c, Command::BindPipeline(_))), 2);
        assert_eq!(count(|c| matches!(c, Command::BindSets(_))), 2);
        assert_eq!(count(|c| matches!(c, Command::BindVertex(_))), 2);
        assert_eq!(count(|c| matches!(c, Command::BindIndex(_))), 1);
        assert_eq!(count(|c| matches!(c, Command::DrawIndexed(36))), 3);
        assert_eq!(recorder.commands.last(), Some(&Command::Draw(36)));
    }

    #[test]
    fn test_missing_renderable_is_skipped() {
        let mut fx = fixture();
        let mut scene = scene_with_cubes(fx.cube, 3);
        let list = RenderList::build(&scene).unwrap();

        let middle = list.renderables()[1];
        scene.get_mut(middle).unwrap().renderable = None;

        let items = write_object_data(&mut fx.resources, &fx.buffers, &scene, &list, fx.skybox, &fx.textures).unwrap();
        let indices: Vec<u32> = items.iter().map(|item| item.draw_index).collect();
        assert_eq!(indices, vec![1, 2, 0]);

        let second: GpuTransform = read(&fx.resources, fx.buffers.transforms, 2);
        assert_relative_eq!(second.model[3][0], 4.0);
    }

    #[test]
    fn test_object_capacity_checked_up_front() {
        let fx = fixture();
        let scene = scene_with_cubes(fx.cube, MAX_OBJECTS);
        let err = RenderList::build(&scene).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::CapacityExceeded {
                requested,
                capacity: MAX_OBJECTS,
                ..
            } if requested == MAX_OBJECTS + 1
        ));

        let fits = scene_with_cubes(fx.cube, MAX_OBJECTS - 1);
        assert!(RenderList::build(&fits).is_ok());
    }

    #[test]
    fn test_single_sun_and_no_point_lights() {
        let mut fx = fixture();
        let mut scene = Scene::new();
        let sun = LightComponent::directional(Vec3::new(0.3, -1.0, 0.2));
        scene.spawn(Entity::new("sun").with_light(sun));
        let list = RenderList::build(&scene).unwrap();

        write_scene_data(&mut fx.resources, &fx.buffers, &scene, &list, &Camera::default(), 1.5).unwrap();

        let block: GpuPointLightBlock = read(&fx.resources, fx.buffers.point_lights, 0);
        assert_eq!(block.count, 0);
        assert!(block.lights.iter().all(|light| *light == GpuPointLight::default()));

        let written: GpuDirectionalLight = read(&fx.resources, fx.buffers.directional_light, 0);
        assert_eq!(written, directional_to_gpu(&sun));
        assert_relative_eq!(written.direction[1], -1.0);
    }

    #[test]
    fn test_missing_sun_is_zeroed() {
        let mut fx = fixture();
        let mut scene = Scene::new();
        scene.spawn(Entity::new("lamp").with_light(LightComponent::point(Vec3::new(0.0, 2.0, 0.0))));
        let list = RenderList::build(&scene).unwrap();

        write_scene_data(&mut fx.resources, &fx.buffers, &scene, &list, &Camera::default(), 1.0).unwrap();

        let sun: GpuDirectionalLight = read(&fx.resources, fx.buffers.directional_light, 0);
        assert_eq!(sun, GpuDirectionalLight::default());
        let block: GpuPointLightBlock = read(&fx.resources, fx.buffers.point_lights, 0);
        assert_eq!(block.count, 1);
        assert_relative_eq!(block.lights[0].position[1], 2.0);
        assert_relative_eq!(block.lights[0].linear, 0.09);
    }

    #[test]
    fn test_camera_block() {
        let mut fx = fixture();
        let scene = Scene::new();
        let list = RenderList::build(&scene).unwrap();
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0));

        write_scene_data(&mut fx.resources, &fx.buffers, &scene, &list, &camera, 2.0).unwrap();

        let block: GpuCamera = read(&fx.resources, fx.buffers.camera, 0);
        assert_eq!(block.position, [1.0, 2.0, 3.0, 0.0]);
        assert_relative_eq!(block.view[3][0], -1.0);
        assert!(block.proj[1][1] < 0.0);
    }
}
