//! Graphics pipeline registry
//!
//! Pipelines and layouts live in flat vectors and are referenced by index
//! handles. Recompilation swaps a pipeline in place, so handles held by the
//! renderer survive shader hot reloads.

mod vulkan;

pub use vulkan::VulkanPipelineCompiler;

use ash::vk;

use crate::config::ShaderPaths;
use crate::render::mesh::VertexInputDescription;
use crate::render::vulkan::VulkanResult;

/// Index of a pipeline inside a `PipelineManager`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub(crate) u32);

/// Index of a pipeline layout inside a `PipelineManager`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutHandle(pub(crate) u32);

/// Descriptor set layouts and push constant ranges of a pipeline layout
#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutDesc {
    /// Set layouts in set-number order
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Push constant ranges
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

/// Color blending applied to the single color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Write color as-is
    #[default]
    Opaque,
    /// Standard `src_alpha, 1 - src_alpha` blending
    Alpha,
}

/// Everything needed to build, and later rebuild, one graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    /// Name used in logs
    pub name: String,
    /// Compiled SPIR-V stage files
    pub shaders: ShaderPaths,
    /// Vertex bindings and attributes
    pub vertex_input: VertexInputDescription,
    /// Layout created earlier through the same manager
    pub layout: PipelineLayoutHandle,
    /// Whether fragments write depth
    pub depth_write: bool,
    /// Depth comparison
    pub depth_compare: vk::CompareOp,
    /// Culling mode
    pub cull_mode: vk::CullModeFlags,
    /// Color blending
    pub blend: BlendMode,
    /// Format of the color attachment rendered into
    pub color_format: vk::Format,
    /// Format of the depth attachment
    pub depth_format: vk::Format,
}

impl PipelineInfo {
    /// Opaque, depth-tested, back-face culled pipeline
    pub fn opaque(
        name: impl Into<String>,
        shaders: ShaderPaths,
        vertex_input: VertexInputDescription,
        layout: PipelineLayoutHandle,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Self {
        Self {
            name: name.into(),
            shaders,
            vertex_input,
            layout,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            cull_mode: vk::CullModeFlags::BACK,
            blend: BlendMode::Opaque,
            color_format,
            depth_format,
        }
    }

    /// Disable depth writes and compare with `LESS_OR_EQUAL`
    #[must_use]
    pub const fn without_depth_write(mut self) -> Self {
        self.depth_write = false;
        self.depth_compare = vk::CompareOp::LESS_OR_EQUAL;
        self
    }

    /// Replace the culling mode
    #[must_use]
    pub const fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Replace the blend mode
    #[must_use]
    pub const fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// Turns descriptions into driver objects
pub trait PipelineCompiler {
    /// Create a pipeline layout
    fn create_layout(&mut self, desc: &PipelineLayoutDesc) -> VulkanResult<vk::PipelineLayout>;
    /// Load the shader stages and link a pipeline against `layout`
    fn compile(&mut self, info: &PipelineInfo, layout: vk::PipelineLayout) -> VulkanResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);
    /// Destroy a pipeline layout
    fn destroy_layout(&mut self, layout: vk::PipelineLayout);
}

struct PipelineEntry {
    info: PipelineInfo,
    pipeline: vk::Pipeline,
}

/// Owns every pipeline and layout the renderer uses
pub struct PipelineManager<C: PipelineCompiler> {
    compiler: C,
    pipelines: Vec<PipelineEntry>,
    layouts: Vec<vk::PipelineLayout>,
}

impl<C: PipelineCompiler> PipelineManager<C> {
    /// Create an empty manager
    pub const fn new(compiler: C) -> Self {
        Self {
            compiler,
            pipelines: Vec::new(),
            layouts: Vec::new(),
        }
    }

    /// Create a layout; it lives until the manager drops
    pub fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> VulkanResult<PipelineLayoutHandle> {
        let layout = self.compiler.create_layout(desc)?;
        self.layouts.push(layout);
        Ok(PipelineLayoutHandle(index_u32(self.layouts.len() - 1)))
    }

    /// Compile `info` and track it for recompilation
    pub fn create_pipeline(&mut self, info: PipelineInfo) -> VulkanResult<PipelineHandle> {
        let layout = self.get_pipeline_layout(info.layout);
        let pipeline = self.compiler.compile(&info, layout)?;
        log::info!("[PIPELINE] Created '{}'", info.name);

        self.pipelines.push(PipelineEntry { info, pipeline });
        Ok(PipelineHandle(index_u32(self.pipelines.len() - 1)))
    }

    /// Rebuild every pipeline from its stored description.
    ///
    /// Each new pipeline replaces the old one only once it has compiled. On
    /// failure the remaining pipelines are left untouched and the first
    /// error is returned. The caller must ensure the GPU is idle.
    pub fn recompile_pipelines(&mut self) -> VulkanResult<()> {
        for entry in &mut self.pipelines {
            let layout = self.layouts[entry.info.layout.0 as usize];
            match self.compiler.compile(&entry.info, layout) {
                Ok(pipeline) => {
                    let old = std::mem::replace(&mut entry.pipeline, pipeline);
                    self.compiler.destroy_pipeline(old);
                }
                Err(e) => {
                    log::error!("[PIPELINE] Recompiling '{}' failed: {e}", entry.info.name);
                    return Err(e);
                }
            }
        }
        log::info!("[PIPELINE] Recompiled {} pipelines", self.pipelines.len());
        Ok(())
    }

    /// Driver handle of a pipeline.
    ///
    /// # Panics
    ///
    /// Panics if `handle` did not come from this manager.
    pub fn get_pipeline(&self, handle: PipelineHandle) -> vk::Pipeline {
        self.pipelines[handle.0 as usize].pipeline
    }

    /// Driver handle of a pipeline layout.
    ///
    /// # Panics
    ///
    /// Panics if `handle` did not come from this manager.
    pub fn get_pipeline_layout(&self, handle: PipelineLayoutHandle) -> vk::PipelineLayout {
        self.layouts[handle.0 as usize]
    }

    /// Number of tracked pipelines
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// The description a pipeline was built from
    pub fn pipeline_info(&self, handle: PipelineHandle) -> Option<&PipelineInfo> {
        self.pipelines.get(handle.0 as usize).map(|entry| &entry.info)
    }
}

impl<C: PipelineCompiler> Drop for PipelineManager<C> {
    fn drop(&mut self) {
        for entry in self.pipelines.drain(..) {
            self.compiler.destroy_pipeline(entry.pipeline);
        }
        for layout in self.layouts.drain(..) {
            self.compiler.destroy_layout(layout);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn index_u32(index: usize) -> u32 {
    index as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::mesh::Vertex;
    use crate::render::vulkan::VulkanError;
    use ash::vk::Handle;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        next: u64,
        compiled: Vec<String>,
        destroyed_pipelines: Vec<vk::Pipeline>,
        destroyed_layouts: usize,
        fail_on: Option<String>,
    }

    #[derive(Clone, Default)]
    struct RecordingCompiler(Rc<RefCell<Log>>);

    impl PipelineCompiler for RecordingCompiler {
        fn create_layout(&mut self, _desc: &PipelineLayoutDesc) -> VulkanResult<vk::PipelineLayout> {
            let mut log = self.0.borrow_mut();
            log.next += 1;
            Ok(vk::PipelineLayout::from_raw(log.next))
        }

        fn compile(&mut self, info: &PipelineInfo, _layout: vk::PipelineLayout) -> VulkanResult<vk::Pipeline> {
            let mut log = self.0.borrow_mut();
            if log.fail_on.as_deref() == Some(info.name.as_str()) {
                return Err(VulkanError::ShaderLoad {
                    path: info.shaders.vertex.clone(),
                    reason: "missing".to_string(),
                });
            }
            log.next += 1;
            log.compiled.push(info.name.clone());
            Ok(vk::Pipeline::from_raw(log.next))
        }

        fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.0.borrow_mut().destroyed_pipelines.push(pipeline);
        }

        fn destroy_layout(&mut self, _layout: vk::PipelineLayout) {
            self.0.borrow_mut().destroyed_layouts += 1;
        }
    }

    fn info(name: &str, layout: PipelineLayoutHandle) -> PipelineInfo {
        PipelineInfo::opaque(
            name,
            ShaderPaths::resolve(PathBuf::from("shaders"), name),
            Vertex::input_description(),
            layout,
            vk::Format::R8G8B8A8_SRGB,
            vk::Format::D32_SFLOAT,
        )
    }

    fn manager_with_two() -> (PipelineManager<RecordingCompiler>, Rc<RefCell<Log>>, PipelineHandle, PipelineHandle) {
        let compiler = RecordingCompiler::default();
        let log = Rc::clone(&compiler.0);
        let mut manager = PipelineManager::new(compiler);
        let layout = manager.create_pipeline_layout(&PipelineLayoutDesc::default()).unwrap();
        let default = manager.create_pipeline(info("default", layout)).unwrap();
        let skybox = manager
            .create_pipeline(info("skybox", layout).without_depth_write())
            .unwrap();
        (manager, log, default, skybox)
    }

    #[test]
    fn test_handles_are_sequential() {
        let (manager, _log, default, skybox) = manager_with_two();
        assert_eq!(default, PipelineHandle(0));
        assert_eq!(skybox, PipelineHandle(1));
        assert_eq!(manager.pipeline_count(), 2);
        assert_ne!(manager.get_pipeline(default), manager.get_pipeline(skybox));
    }

    #[test]
    fn test_recompile_keeps_handles_and_order() {
        let (mut manager, log, default, skybox) = manager_with_two();
        let before = (manager.get_pipeline(default), manager.get_pipeline(skybox));

        manager.recompile_pipelines().unwrap();

        assert_eq!(manager.pipeline_count(), 2);
        assert_eq!(manager.pipeline_info(default).unwrap().name, "default");
        assert_eq!(manager.pipeline_info(skybox).unwrap().name, "skybox");
        assert_ne!(manager.get_pipeline(default), before.0);
        assert_ne!(manager.get_pipeline(skybox), before.1);
        assert_eq!(log.borrow().destroyed_pipelines, vec![before.0, before.1]);
        assert_eq!(log.borrow().compiled, vec!["default", "skybox", "default", "skybox"]);
    }

    #[test]
    fn test_failed_recompile_keeps_previous_pipeline() {
        let (mut manager, log, default, skybox) = manager_with_two();
        let old_skybox = manager.get_pipeline(skybox);
        log.borrow_mut().fail_on = Some("skybox".to_string());

        let result = manager.recompile_pipelines();

        assert!(matches!(result, Err(VulkanError::ShaderLoad { .. })));
        assert_eq!(manager.get_pipeline(skybox), old_skybox);
        assert_eq!(manager.pipeline_count(), 2);
        assert_eq!(manager.pipeline_info(default).unwrap().name, "default");
    }

    #[test]
    fn test_drop_destroys_everything() {
        let (manager, log, _default, _skybox) = manager_with_two();
        drop(manager);
        assert_eq!(log.borrow().destroyed_pipelines.len(), 2);
        assert_eq!(log.borrow().destroyed_layouts, 1);
    }

    #[test]
    #[should_panic]
    fn test_foreign_handle_panics() {
        let (manager, _log, _default, _skybox) = manager_with_two();
        let _ = manager.get_pipeline(PipelineHandle(7));
    }
}
