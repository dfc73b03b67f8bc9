//! # Rendering System
//!
//! Vulkan forward renderer with bindless textures and two frames in flight.
//!
//! ## Architecture
//!
//! Bottom-up:
//! - **Resources**: buffers and images behind generational handles
//! - **Pipelines**: shader pairs compiled into graphics pipelines, hot-reloadable
//! - **Device**: context, swapchain, frame pacing, offscreen targets
//! - **Renderer**: per-frame GPU data, the bindless table and draw submission
//!
//! Per frame the scene is written into frame-indexed storage buffers; every
//! draw pushes a single index into them.

pub mod bindless;
pub mod device;
pub mod draw;
pub mod frame;
pub mod gpu_data;
pub mod mesh;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod texture;
pub mod vulkan;

pub use device::{Device, RenderTargets};
pub use draw::RenderList;
pub use mesh::{MeshDesc, MeshHandle, Vertex};
pub use renderer::Renderer;
pub use resources::{BufferHandle, ImageHandle};
pub use texture::{Texture, TextureFormat, TextureHandle, TextureKind};
pub use vulkan::{VulkanError, VulkanResult};
