//! Vulkan implementation of `PipelineCompiler`

use std::ffi::CStr;
use std::fs::File;
use std::path::Path;

use ash::{vk, Device};

use super::{BlendMode, PipelineCompiler, PipelineInfo, PipelineLayoutDesc};
use crate::render::vulkan::{VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = c"main";

/// Shader module destroyed on drop, after the pipeline has been linked
struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    fn load(device: &Device, path: &Path) -> VulkanResult<Self> {
        let shader_error = |reason: String| VulkanError::ShaderLoad {
            path: path.to_path_buf(),
            reason,
        };

        let mut file = File::open(path).map_err(|e| shader_error(e.to_string()))?;
        let code = ash::util::read_spv(&mut file).map_err(|e| shader_error(e.to_string()))?;
        if code.first() != Some(&0x0723_0203) {
            return Err(shader_error("missing SPIR-V magic number".to_string()));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(|e| shader_error(e.to_string()))?;

        log::debug!("[SHADER] Loaded {}", path.display());
        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    fn stage(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Builds pipelines for dynamic rendering on one logical device
pub struct VulkanPipelineCompiler {
    device: Device,
}

impl VulkanPipelineCompiler {
    /// Create a compiler for `device`
    pub const fn new(device: Device) -> Self {
        Self { device }
    }
}

fn color_blend_attachment(blend: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    let builder = vk::PipelineColorBlendAttachmentState::builder().color_write_mask(vk::ColorComponentFlags::RGBA);
    match blend {
        BlendMode::Opaque => builder.blend_enable(false).build(),
        BlendMode::Alpha => builder
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build(),
    }
}

impl PipelineCompiler for VulkanPipelineCompiler {
    fn create_layout(&mut self, desc: &PipelineLayoutDesc) -> VulkanResult<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&desc.set_layouts)
            .push_constant_ranges(&desc.push_constant_ranges);
        let layout = unsafe { self.device.create_pipeline_layout(&create_info, None) }?;
        Ok(layout)
    }

    fn compile(&mut self, info: &PipelineInfo, layout: vk::PipelineLayout) -> VulkanResult<vk::Pipeline> {
        let vertex = ShaderModule::load(&self.device, &info.shaders.vertex)?;
        let fragment = ShaderModule::load(&self.device, &info.shaders.fragment)?;
        let stages = [
            vertex.stage(vk::ShaderStageFlags::VERTEX),
            fragment.stage(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&info.vertex_input.bindings)
            .vertex_attribute_descriptions(&info.vertex_input.attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::builder().topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // Viewport and scissor are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(info.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisampling =
            vk::PipelineMultisampleStateCreateInfo::builder().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(info.depth_write)
            .depth_compare_op(info.depth_compare)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let attachments = [color_blend_attachment(info.blend)];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&attachments);

        let color_formats = [info.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(info.depth_format);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| VulkanError::Api(e))?;

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed(format!("no pipeline returned for '{}'", info.name)))
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.destroy_pipeline(pipeline, None);
        }
    }

    fn destroy_layout(&mut self, layout: vk::PipelineLayout) {
        unsafe {
            self.device.destroy_pipeline_layout(layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_blend_state() {
        let state = color_blend_attachment(BlendMode::Alpha);
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);

        let opaque = color_blend_attachment(BlendMode::Opaque);
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
