//! Vulkan backend objects
//!
//! Thin RAII wrappers over ash. Higher-level policy (frame pacing,
//! resources, pipelines) lives in the parent `render` module.

pub mod commands;
pub mod context;
pub mod descriptors;
pub mod swapchain;
pub mod sync;

pub use commands::{CommandPool, ImmediateSubmitter};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use descriptors::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, Sampler};
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSync, LayoutTransition, Semaphore};
