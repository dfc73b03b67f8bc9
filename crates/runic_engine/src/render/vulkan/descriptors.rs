//! Descriptor set layouts, pools and writes
//!
//! The renderer uses two set layouts: a global set with the object arrays
//! and the bindless texture array, and a scene set with camera and lights.

use ash::{vk, Device};

use super::context::VulkanResult;

/// Builder for descriptor set layouts, including one variable-count array
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    flags: Vec<vk::DescriptorBindingFlags>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(count)
                .stage_flags(stages)
                .build(),
        );
        self.flags.push(flags);
        self
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.add(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            stages,
            vk::DescriptorBindingFlags::empty(),
        )
    }

    /// Add a storage buffer binding
    #[must_use]
    pub fn add_storage_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.add(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            1,
            stages,
            vk::DescriptorBindingFlags::empty(),
        )
    }

    /// Add a partially bound, variable-count sampler array.
    ///
    /// Must be the highest-numbered binding of the layout.
    #[must_use]
    pub fn add_bindless_samplers(self, binding: u32, capacity: u32, stages: vk::ShaderStageFlags) -> Self {
        self.add(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            capacity,
            stages,
            vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
        )
    }

    /// Layout bindings collected so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Create the layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let mut binding_flags = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder().binding_flags(&self.flags);
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&self.bindings)
            .push_next(&mut binding_flags);

        let layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }?;
        Ok(DescriptorSetLayout {
            device: device.clone(),
            layout,
        })
    }
}

/// Descriptor set layout with RAII cleanup
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool with RAII cleanup
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool able to hold `max_sets` sets drawing from `sizes`
    pub fn new(device: &Device, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(sizes);

        let pool = unsafe { device.create_descriptor_pool(&create_info, None) }?;
        Ok(Self {
            device: device.clone(),
            pool,
        })
    }

    /// Allocate one set per entry of `layouts`.
    ///
    /// `variable_count` sizes the variable-count binding of each set, when the
    /// layout has one.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
        variable_count: Option<u32>,
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let counts = variable_count.map(|count| vec![count; layouts.len()]);
        let mut variable_info = counts
            .as_deref()
            .map(|counts| vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder().descriptor_counts(counts));

        let mut alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        if let Some(info) = variable_info.as_mut() {
            alloc_info = alloc_info.push_next(info);
        }

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }?;
        Ok(sets)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Point a buffer binding of `set` at the whole of `buffer`
pub fn write_buffer(device: &Device, set: vk::DescriptorSet, binding: u32, ty: vk::DescriptorType, buffer: vk::Buffer) {
    let buffer_info = [vk::DescriptorBufferInfo {
        buffer,
        offset: 0,
        range: vk::WHOLE_SIZE,
    }];
    let write = vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(ty)
        .buffer_info(&buffer_info)
        .build();

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Write one element of a combined image sampler array
pub fn write_sampled_image(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = [vk::DescriptorImageInfo {
        sampler,
        image_view: view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];
    let write = vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(array_element)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_info)
        .build();

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Texture sampler with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear, repeating sampler with anisotropy up to `max_anisotropy`
    pub fn linear(device: &Device, max_anisotropy: f32) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(max_anisotropy > 1.0)
            .max_anisotropy(max_anisotropy.max(1.0))
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe { device.create_sampler(&create_info, None) }?;
        Ok(Self {
            device: device.clone(),
            sampler,
        })
    }

    /// Get the Vulkan sampler handle
    pub const fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
