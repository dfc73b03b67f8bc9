//! Vulkan memory backend
//!
//! One dedicated allocation per buffer or image. Host-visible buffers stay
//! mapped for their whole lifetime.

use ash::{vk, Device};
use std::ptr::NonNull;

use super::{BufferDesc, ImageDesc, ImageKind, MappedMemory, ResourceBackend};
use crate::render::vulkan::context::find_memory_type_index;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Buffer with its memory and optional persistent mapping
pub struct GpuBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
    mapped: Option<NonNull<u8>>,
}

impl GpuBuffer {
    /// Raw buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

impl MappedMemory for GpuBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn mapped(&self) -> Option<&[u8]> {
        let len = usize::try_from(self.size).ok()?;
        // The mapping covers `size` bytes and lives until destroy_buffer
        self.mapped
            .map(|ptr| unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) })
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        let len = usize::try_from(self.size).ok()?;
        self.mapped
            .map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }
}

/// Image with its view and memory
pub struct GpuImage {
    image: vk::Image,
    view: vk::ImageView,
    memory: vk::DeviceMemory,
    desc: ImageDesc,
}

impl GpuImage {
    /// Raw image handle
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// View covering every layer
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Creation parameters
    pub const fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

/// Allocates buffers and images from a Vulkan device
pub struct VulkanResourceBackend {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanResourceBackend {
    /// Create a backend allocating from `device`
    pub const fn new(device: Device, memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            device,
            memory_properties,
        }
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let memory_type = find_memory_type_index(&self.memory_properties, requirements.memory_type_bits, properties)?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }?;
        Ok(memory)
    }

    fn create_view(&self, image: vk::Image, desc: &ImageDesc) -> VulkanResult<vk::ImageView> {
        let view_type = match desc.kind {
            ImageKind::Flat => vk::ImageViewType::TYPE_2D,
            ImageKind::Cubemap => vk::ImageViewType::CUBE,
        };
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect_mask(),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: desc.layer_count(),
            });

        let view = unsafe { self.device.create_image_view(&view_info, None) }?;
        Ok(view)
    }
}

impl ResourceBackend for VulkanResourceBackend {
    type Buffer = GpuBuffer;
    type Image = GpuImage;

    fn create_buffer(&mut self, desc: &BufferDesc) -> VulkanResult<GpuBuffer> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(desc.usage_flags())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&create_info, None) }?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let memory = match self.allocate(requirements, desc.memory_properties()) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bind_and_map = || -> VulkanResult<Option<NonNull<u8>>> {
            unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }?;
            if !desc.is_host_visible() {
                return Ok(None);
            }
            let ptr = unsafe { self.device.map_memory(memory, 0, desc.size, vk::MemoryMapFlags::empty()) }?;
            NonNull::new(ptr.cast::<u8>())
                .map(Some)
                .ok_or_else(|| VulkanError::InvalidOperation {
                    reason: "vkMapMemory returned null".to_string(),
                })
        };

        match bind_and_map() {
            Ok(mapped) => Ok(GpuBuffer {
                buffer,
                memory,
                size: desc.size,
                mapped,
            }),
            Err(e) => {
                unsafe {
                    self.device.destroy_buffer(buffer, None);
                    self.device.free_memory(memory, None);
                }
                Err(e)
            }
        }
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        unsafe {
            if buffer.mapped.is_some() {
                self.device.unmap_memory(buffer.memory);
            }
            self.device.destroy_buffer(buffer.buffer, None);
            self.device.free_memory(buffer.memory, None);
        }
    }

    fn create_image(&mut self, desc: &ImageDesc) -> VulkanResult<GpuImage> {
        let flags = match desc.kind {
            ImageKind::Flat => vk::ImageCreateFlags::empty(),
            ImageKind::Cubemap => vk::ImageCreateFlags::CUBE_COMPATIBLE,
        };
        let create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layer_count())
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage_flags())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { self.device.create_image(&create_info, None) }?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let memory = match self.allocate(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bind_and_view = || -> VulkanResult<vk::ImageView> {
            unsafe { self.device.bind_image_memory(image, memory, 0) }?;
            self.create_view(image, desc)
        };

        match bind_and_view() {
            Ok(view) => Ok(GpuImage {
                image,
                view,
                memory,
                desc: *desc,
            }),
            Err(e) => {
                unsafe {
                    self.device.destroy_image(image, None);
                    self.device.free_memory(memory, None);
                }
                Err(e)
            }
        }
    }

    fn destroy_image(&mut self, image: GpuImage) {
        unsafe {
            self.device.destroy_image_view(image.view, None);
            self.device.destroy_image(image.image, None);
            self.device.free_memory(image.memory, None);
        }
    }
}
