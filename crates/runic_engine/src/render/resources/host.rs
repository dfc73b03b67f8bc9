//! Host-memory resource backend
//!
//! Buffers are plain heap allocations and images are descriptions only.
//! Used to run resource, upload and draw-data logic without a GPU.

use super::{BufferDesc, ImageDesc, MappedMemory, ResourceBackend};
use crate::render::vulkan::VulkanResult;

/// Heap-backed buffer
#[derive(Debug)]
pub struct HostBuffer {
    desc: BufferDesc,
    // u32 storage keeps the bytes 4-aligned for bytemuck reads
    words: Vec<u32>,
}

impl HostBuffer {
    /// Creation parameters
    pub const fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// All bytes, whether or not the buffer would be mappable on a GPU
    pub fn contents(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len()]
    }

    fn len(&self) -> usize {
        usize::try_from(self.desc.size).unwrap_or(usize::MAX)
    }
}

impl MappedMemory for HostBuffer {
    fn size(&self) -> u64 {
        self.desc.size
    }

    fn mapped(&self) -> Option<&[u8]> {
        self.desc.is_host_visible().then(|| self.contents())
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        if !self.desc.is_host_visible() {
            return None;
        }
        let len = self.len();
        Some(&mut bytemuck::cast_slice_mut(&mut self.words)[..len])
    }
}

/// Image description without storage
#[derive(Debug, Clone, Copy)]
pub struct HostImage {
    /// Creation parameters
    pub desc: ImageDesc,
}

/// Backend that allocates from the heap and counts releases
#[derive(Debug, Default)]
pub struct HostMemoryBackend {
    destroyed_buffers: usize,
    destroyed_images: usize,
}

impl HostMemoryBackend {
    /// Number of buffers and images destroyed so far
    pub const fn destroyed(&self) -> (usize, usize) {
        (self.destroyed_buffers, self.destroyed_images)
    }
}

impl ResourceBackend for HostMemoryBackend {
    type Buffer = HostBuffer;
    type Image = HostImage;

    fn create_buffer(&mut self, desc: &BufferDesc) -> VulkanResult<HostBuffer> {
        let words = usize::try_from(desc.size.div_ceil(4)).unwrap_or(usize::MAX);
        Ok(HostBuffer {
            desc: *desc,
            words: vec![0; words],
        })
    }

    fn destroy_buffer(&mut self, _buffer: HostBuffer) {
        self.destroyed_buffers += 1;
    }

    fn create_image(&mut self, desc: &ImageDesc) -> VulkanResult<HostImage> {
        Ok(HostImage { desc: *desc })
    }

    fn destroy_image(&mut self, _image: HostImage) {
        self.destroyed_images += 1;
    }
}
