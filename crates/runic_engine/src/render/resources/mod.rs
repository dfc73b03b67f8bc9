//! GPU buffer and image ownership behind generational handles
//!
//! [`ResourceManager`] is the only owner of buffer and image objects. Every
//! other component holds a [`BufferHandle`] or [`ImageHandle`] and resolves
//! it on use. Handles carry a generation, so a handle whose resource has
//! been destroyed resolves to `None` rather than to whatever reuses the
//! slot.
//!
//! Allocation itself is delegated to a [`ResourceBackend`]: Vulkan memory in
//! the engine, plain host memory in headless tests.

mod host;
mod vulkan;

pub use host::{HostBuffer, HostImage, HostMemoryBackend};
pub use vulkan::{GpuBuffer, GpuImage, VulkanResourceBackend};

use ash::vk;
use slotmap::{new_key_type, SlotMap};

use crate::render::vulkan::{VulkanError, VulkanResult};

new_key_type! {
    /// Handle to a buffer owned by a [`ResourceManager`]
    pub struct BufferHandle;
    /// Handle to an image owned by a [`ResourceManager`]
    pub struct ImageHandle;
}

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Transfer-only (staging)
    None,
    /// Vertex input
    Vertex,
    /// Index input
    Index,
    /// Uniform block
    Uniform,
    /// Shader storage
    Storage,
}

/// Which side of a GPU copy a buffer sits on, which decides its memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Host-visible and persistently mapped; written by the CPU every frame
    None,
    /// Staging source: host-visible, mapped, `TRANSFER_SRC`
    Source,
    /// Copy target in device-local memory, never mapped
    Destination,
}

/// Buffer creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Binding usage
    pub usage: BufferUsage,
    /// Transfer role
    pub transfer: TransferDirection,
}

impl BufferDesc {
    /// Host-visible buffer rewritten by the CPU each frame
    pub const fn host(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
            transfer: TransferDirection::None,
        }
    }

    /// Staging buffer used as a copy source
    pub const fn staging(size: u64) -> Self {
        Self {
            size,
            usage: BufferUsage::None,
            transfer: TransferDirection::Source,
        }
    }

    /// Device-local buffer filled by a GPU copy
    pub const fn device_local(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
            transfer: TransferDirection::Destination,
        }
    }

    /// Whether the CPU can map this buffer
    pub const fn is_host_visible(&self) -> bool {
        !matches!(self.transfer, TransferDirection::Destination)
    }

    /// Vulkan usage flags implied by usage and transfer role
    pub fn usage_flags(&self) -> vk::BufferUsageFlags {
        let usage = match self.usage {
            BufferUsage::None => vk::BufferUsageFlags::empty(),
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
        };
        let transfer = match self.transfer {
            TransferDirection::None => vk::BufferUsageFlags::empty(),
            TransferDirection::Source => vk::BufferUsageFlags::TRANSFER_SRC,
            TransferDirection::Destination => vk::BufferUsageFlags::TRANSFER_DST,
        };
        usage | transfer
    }

    /// Memory properties required for the buffer's backing allocation
    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        if self.is_host_visible() {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        }
    }

    fn validate(&self) -> VulkanResult<()> {
        if self.size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer size must be non-zero".to_string(),
            });
        }
        if self.usage_flags().is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer has neither a binding usage nor a transfer role".to_string(),
            });
        }
        Ok(())
    }
}

/// What an image is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageUsage {
    /// Sampled texture filled by a transfer
    Sampled,
    /// Color render target, sampled by the editor and blitted to the swapchain
    Color,
    /// Depth render target
    Depth,
}

/// Image dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Single 2D layer
    Flat,
    /// Six square layers viewed as a cube
    Cubemap,
}

/// Image creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Size of one layer in pixels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Usage tag
    pub usage: ImageUsage,
    /// 2D or cubemap
    pub kind: ImageKind,
}

impl ImageDesc {
    /// 2D sampled texture
    pub const fn texture(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            format,
            usage: ImageUsage::Sampled,
            kind: ImageKind::Flat,
        }
    }

    /// Sampled cubemap with square faces
    pub const fn cubemap(face_size: u32, format: vk::Format) -> Self {
        Self {
            extent: vk::Extent2D {
                width: face_size,
                height: face_size,
            },
            format,
            usage: ImageUsage::Sampled,
            kind: ImageKind::Cubemap,
        }
    }

    /// Render target of the given usage
    pub const fn render_target(extent: vk::Extent2D, format: vk::Format, usage: ImageUsage) -> Self {
        Self {
            extent,
            format,
            usage,
            kind: ImageKind::Flat,
        }
    }

    /// Number of array layers
    pub const fn layer_count(&self) -> u32 {
        match self.kind {
            ImageKind::Flat => 1,
            ImageKind::Cubemap => 6,
        }
    }

    /// Aspect covered by views and barriers
    pub const fn aspect_mask(&self) -> vk::ImageAspectFlags {
        match self.usage {
            ImageUsage::Depth => vk::ImageAspectFlags::DEPTH,
            ImageUsage::Sampled | ImageUsage::Color => vk::ImageAspectFlags::COLOR,
        }
    }

    /// Vulkan usage flags implied by the usage tag
    pub fn usage_flags(&self) -> vk::ImageUsageFlags {
        match self.usage {
            ImageUsage::Sampled => vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ImageUsage::Color => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC
            }
            ImageUsage::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        }
    }

    /// Bytes of tightly packed RGBA8 data for all layers
    pub const fn rgba8_byte_size(&self) -> u64 {
        self.extent.width as u64 * self.extent.height as u64 * 4 * self.layer_count() as u64
    }

    fn validate(&self) -> VulkanResult<()> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Image extent must be non-zero".to_string(),
            });
        }
        if self.kind == ImageKind::Cubemap && self.extent.width != self.extent.height {
            return Err(VulkanError::InvalidOperation {
                reason: "Cubemap faces must be square".to_string(),
            });
        }
        Ok(())
    }
}

/// CPU view of a buffer's mapped memory
pub trait MappedMemory {
    /// Buffer size in bytes
    fn size(&self) -> u64;
    /// Mapped bytes, or `None` for device-local buffers
    fn mapped(&self) -> Option<&[u8]>;
    /// Mutable mapped bytes, or `None` for device-local buffers
    fn mapped_mut(&mut self) -> Option<&mut [u8]>;
}

/// Allocator behind a [`ResourceManager`]
pub trait ResourceBackend {
    /// Buffer object type
    type Buffer: MappedMemory;
    /// Image object type
    type Image;

    /// Allocate and bind a buffer, mapping it when host-visible
    fn create_buffer(&mut self, desc: &BufferDesc) -> VulkanResult<Self::Buffer>;
    /// Release a buffer and its memory
    fn destroy_buffer(&mut self, buffer: Self::Buffer);
    /// Allocate and bind an image with a view covering all layers
    fn create_image(&mut self, desc: &ImageDesc) -> VulkanResult<Self::Image>;
    /// Release an image, its view and its memory
    fn destroy_image(&mut self, image: Self::Image);
}

/// Owner of all buffers and images created for one device
pub struct ResourceManager<B: ResourceBackend> {
    backend: B,
    buffers: SlotMap<BufferHandle, B::Buffer>,
    images: SlotMap<ImageHandle, B::Image>,
}

impl<B: ResourceBackend> ResourceManager<B> {
    /// Create an empty manager over `backend`
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
        }
    }

    /// Allocate a buffer
    pub fn create_buffer(&mut self, desc: BufferDesc) -> VulkanResult<BufferHandle> {
        desc.validate()?;
        let buffer = self.backend.create_buffer(&desc)?;
        let handle = self.buffers.insert(buffer);
        log::trace!("[RESOURCES] Buffer {handle:?} created ({} bytes, {:?})", desc.size, desc.usage);
        Ok(handle)
    }

    /// Look up a live buffer
    pub fn get_buffer(&self, handle: BufferHandle) -> Option<&B::Buffer> {
        self.buffers.get(handle)
    }

    /// Mapped bytes of a live host-visible buffer
    pub fn buffer_bytes(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(handle).and_then(MappedMemory::mapped)
    }

    /// Mutable mapped bytes of a live host-visible buffer
    pub fn buffer_bytes_mut(&mut self, handle: BufferHandle) -> Option<&mut [u8]> {
        self.buffers.get_mut(handle).and_then(MappedMemory::mapped_mut)
    }

    /// Copy `bytes` into a mapped buffer at `offset`
    pub fn write_buffer(&mut self, handle: BufferHandle, offset: u64, bytes: &[u8]) -> VulkanResult<()> {
        let buffer = self.buffers.get_mut(handle).ok_or_else(|| VulkanError::ResourceNotFound {
            id: format!("{handle:?}"),
        })?;
        let size = buffer.size();
        let len = bytes.len() as u64;
        let end = offset.checked_add(len).filter(|&end| end <= size);
        let Some(end) = end else {
            return Err(VulkanError::OutOfBounds { offset, len, size });
        };

        let mapped = buffer.mapped_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Buffer {handle:?} is not host-visible"),
        })?;
        // offset and end are bounded by size, which fits the mapped slice
        let range = usize::try_from(offset).unwrap_or(usize::MAX)..usize::try_from(end).unwrap_or(usize::MAX);
        mapped
            .get_mut(range)
            .ok_or(VulkanError::OutOfBounds { offset, len, size })?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Destroy a buffer; returns false if the handle was already dead
    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> bool {
        match self.buffers.remove(handle) {
            Some(buffer) => {
                self.backend.destroy_buffer(buffer);
                true
            }
            None => {
                log::warn!("[RESOURCES] Destroy of dead buffer handle {handle:?}");
                false
            }
        }
    }

    /// Allocate an image
    pub fn create_image(&mut self, desc: ImageDesc) -> VulkanResult<ImageHandle> {
        desc.validate()?;
        let image = self.backend.create_image(&desc)?;
        let handle = self.images.insert(image);
        log::trace!(
            "[RESOURCES] Image {handle:?} created ({}x{} {:?} {:?})",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.kind
        );
        Ok(handle)
    }

    /// Look up a live image
    pub fn get_image(&self, handle: ImageHandle) -> Option<&B::Image> {
        self.images.get(handle)
    }

    /// Destroy an image; returns false if the handle was already dead
    pub fn destroy_image(&mut self, handle: ImageHandle) -> bool {
        match self.images.remove(handle) {
            Some(image) => {
                self.backend.destroy_image(image);
                true
            }
            None => {
                log::warn!("[RESOURCES] Destroy of dead image handle {handle:?}");
                false
            }
        }
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live images
    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    /// The allocation backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Destroy every remaining buffer and image
    pub fn clear(&mut self) {
        let (buffers, images) = (self.buffers.len(), self.images.len());
        for (_, buffer) in self.buffers.drain() {
            self.backend.destroy_buffer(buffer);
        }
        for (_, image) in self.images.drain() {
            self.backend.destroy_image(image);
        }
        if buffers + images > 0 {
            log::debug!("[RESOURCES] Released {buffers} buffers and {images} images");
        }
    }
}

impl<B: ResourceBackend> Drop for ResourceManager<B> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ResourceManager<HostMemoryBackend> {
        ResourceManager::new(HostMemoryBackend::default())
    }

    #[test]
    fn test_storage_buffer_round_trip() {
        let mut resources = manager();
        let handle = resources.create_buffer(BufferDesc::host(256, BufferUsage::Storage)).unwrap();

        let pattern: Vec<u8> = (0..=255u8).collect();
        resources.buffer_bytes_mut(handle).unwrap().copy_from_slice(&pattern);

        assert_eq!(resources.buffer_bytes(handle).unwrap(), pattern.as_slice());
    }

    #[test]
    fn test_handle_valid_until_destroyed() {
        let mut resources = manager();
        let buffer = resources.create_buffer(BufferDesc::host(64, BufferUsage::Uniform)).unwrap();
        let image = resources.create_image(ImageDesc::texture(4, 4, vk::Format::R8G8B8A8_SRGB)).unwrap();
        assert!(resources.get_buffer(buffer).is_some());
        assert!(resources.get_image(image).is_some());

        assert!(resources.destroy_buffer(buffer));
        assert!(resources.destroy_image(image));
        assert!(resources.get_buffer(buffer).is_none());
        assert!(resources.get_image(image).is_none());
        assert!(!resources.destroy_buffer(buffer));
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut resources = manager();
        let old = resources.create_buffer(BufferDesc::host(16, BufferUsage::Storage)).unwrap();
        resources.destroy_buffer(old);

        let new = resources.create_buffer(BufferDesc::host(32, BufferUsage::Storage)).unwrap();
        assert_ne!(old, new);
        assert!(resources.get_buffer(old).is_none());
        assert_eq!(resources.get_buffer(new).unwrap().size(), 32);
        assert!(resources.write_buffer(old, 0, &[1]).is_err());
    }

    #[test]
    fn test_write_buffer_bounds() {
        let mut resources = manager();
        let handle = resources.create_buffer(BufferDesc::host(8, BufferUsage::Uniform)).unwrap();

        resources.write_buffer(handle, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&resources.buffer_bytes(handle).unwrap()[4..], &[1, 2, 3, 4]);

        let result = resources.write_buffer(handle, 6, &[0; 4]);
        assert!(matches!(result, Err(VulkanError::OutOfBounds { offset: 6, len: 4, size: 8 })));
        let overflow = resources.write_buffer(handle, u64::MAX, &[0]);
        assert!(matches!(overflow, Err(VulkanError::OutOfBounds { .. })));
    }

    #[test]
    fn test_device_local_buffer_not_mapped() {
        let mut resources = manager();
        let handle = resources
            .create_buffer(BufferDesc::device_local(64, BufferUsage::Vertex))
            .unwrap();
        assert!(resources.buffer_bytes(handle).is_none());
        assert!(matches!(
            resources.write_buffer(handle, 0, &[0; 4]),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_memory_policy() {
        let staging = BufferDesc::staging(16);
        assert_eq!(staging.usage_flags(), vk::BufferUsageFlags::TRANSFER_SRC);
        assert!(staging.memory_properties().contains(vk::MemoryPropertyFlags::HOST_COHERENT));

        let vertex = BufferDesc::device_local(16, BufferUsage::Vertex);
        assert_eq!(
            vertex.usage_flags(),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(vertex.memory_properties(), vk::MemoryPropertyFlags::DEVICE_LOCAL);
    }

    #[test]
    fn test_invalid_descriptions_rejected() {
        let mut resources = manager();
        assert!(resources.create_buffer(BufferDesc::host(0, BufferUsage::Storage)).is_err());
        assert!(resources.create_buffer(BufferDesc::host(4, BufferUsage::None)).is_err());

        let mut cube = ImageDesc::cubemap(8, vk::Format::R8G8B8A8_SRGB);
        cube.extent.height = 4;
        assert!(resources.create_image(cube).is_err());
        assert_eq!(resources.live_buffers() + resources.live_images(), 0);
    }

    #[test]
    fn test_image_policy() {
        let cube = ImageDesc::cubemap(16, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(cube.layer_count(), 6);
        assert_eq!(cube.rgba8_byte_size(), 16 * 16 * 4 * 6);

        let depth = ImageDesc::render_target(
            vk::Extent2D { width: 8, height: 8 },
            vk::Format::D32_SFLOAT,
            ImageUsage::Depth,
        );
        assert_eq!(depth.aspect_mask(), vk::ImageAspectFlags::DEPTH);
        assert!(depth.usage_flags().contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut resources = manager();
        resources.create_buffer(BufferDesc::host(4, BufferUsage::Storage)).unwrap();
        resources.create_image(ImageDesc::texture(1, 1, vk::Format::R8G8B8A8_UNORM)).unwrap();

        resources.clear();
        assert_eq!(resources.live_buffers(), 0);
        assert_eq!(resources.live_images(), 0);
        assert_eq!(resources.backend().destroyed(), (1, 1));
    }
}
