//! Synchronization primitives
//!
//! RAII semaphores and fences, the per-frame sync set, and the image layout
//! transitions the renderer performs.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Binary semaphore with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }?;
        Ok(Self { device, fence })
    }

    /// Block until signaled or `timeout_ns` elapses
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) }?;
        Ok(())
    }

    /// Return to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }?;
        Ok(())
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame-in-flight slot
pub struct FrameSync {
    /// Signaled by the presentation engine when the acquired image is usable
    pub image_acquired: Semaphore,
    /// Signaled by the graphics queue when the frame's commands finish
    pub render_complete: Semaphore,
    /// Signaled when the GPU has consumed this slot; created signaled so the
    /// first wait returns immediately
    pub frame_complete: Fence,
}

impl FrameSync {
    /// Create one slot's semaphores and fence
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            render_complete: Semaphore::new(device.clone())?,
            frame_complete: Fence::new(device.clone(), true)?,
        })
    }
}

/// Stage and access masks for one image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Stages that must complete before the transition
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait on the transition
    pub dst_stage: vk::PipelineStageFlags,
    /// Writes made available
    pub src_access: vk::AccessFlags,
    /// Accesses made visible
    pub dst_access: vk::AccessFlags,
}

impl LayoutTransition {
    /// Masks for the transitions the renderer uses.
    ///
    /// Any other pair is an engine bug and reported as `InvalidOperation`.
    pub fn between(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> VulkanResult<Self> {
        use vk::AccessFlags as A;
        use vk::ImageLayout as L;
        use vk::PipelineStageFlags as S;

        let depth_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
        let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (S::TRANSFER, A::empty(), S::TRANSFER, A::TRANSFER_WRITE),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
                (S::TRANSFER, A::TRANSFER_WRITE, S::FRAGMENT_SHADER, A::SHADER_READ)
            }
            (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
                S::COLOR_ATTACHMENT_OUTPUT,
                A::empty(),
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_WRITE,
            ),
            (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL) => (
                depth_tests,
                A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                depth_tests,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            (L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
                (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE, S::TRANSFER, A::TRANSFER_READ)
            }
            (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
                (S::TRANSFER, A::empty(), S::FRAGMENT_SHADER, A::SHADER_READ)
            }
            (L::DEPTH_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
                S::LATE_FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                S::FRAGMENT_SHADER,
                A::SHADER_READ,
            ),
            (L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR) => {
                (S::TRANSFER, A::TRANSFER_WRITE, S::BOTTOM_OF_PIPE, A::empty())
            }
            _ => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("Unsupported layout transition {old_layout:?} -> {new_layout:?}"),
                })
            }
        };

        Ok(Self {
            old_layout,
            new_layout,
            src_stage,
            dst_stage,
            src_access,
            dst_access,
        })
    }

    /// Record the barrier for every mip level and `layer_count` layers of `image`
    pub fn record(
        &self,
        device: &Device,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        layer_count: u32,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count,
            })
            .build();

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stage,
                self.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions() {
        let to_dst = LayoutTransition::between(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let to_read =
            LayoutTransition::between(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_present_transition_has_no_destination_access() {
        let to_present =
            LayoutTransition::between(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR).unwrap();
        assert!(to_present.dst_access.is_empty());
        assert_eq!(to_present.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_unknown_transition_rejected() {
        let result = LayoutTransition::between(vk::ImageLayout::PRESENT_SRC_KHR, vk::ImageLayout::GENERAL);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }
}
