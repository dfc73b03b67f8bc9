//! GPU device: context, swapchain, frames in flight and render targets
//!
//! `Device` is the single owner of everything tied to the logical device.
//! Frame sequencing is delegated to `FramePacer`; this module supplies the
//! Vulkan side of it through a short-lived `Presenter` that also borrows
//! the window, since swapchain recreation may have to wait on it.

use ash::vk;

use crate::config::RendererConfig;
use crate::render::frame::{AcquireOutcome, FrameBackend, FramePacer, FRAME_FENCE_TIMEOUT_NS, FRAME_OVERLAP};
use crate::render::resources::{
    GpuImage, ImageDesc, ImageHandle, ImageUsage, ResourceManager, VulkanResourceBackend,
};
use crate::render::vulkan::commands::begin_one_time;
use crate::render::vulkan::{
    CommandPool, FrameSync, ImmediateSubmitter, Swapchain, VulkanContext, VulkanError, VulkanResult,
};
use crate::window::{wait_for_visible_extent, SurfaceExtent, Window};

/// Format of the offscreen color target
pub const COLOR_TARGET_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;
/// Format of the depth target
pub const DEPTH_TARGET_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Resource manager used by the Vulkan device
pub type GpuResources = ResourceManager<VulkanResourceBackend>;

/// Offscreen color and depth images the scene renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargets {
    /// Color attachment, blitted to the swapchain each frame
    pub color: ImageHandle,
    /// Depth attachment
    pub depth: ImageHandle,
    /// Size of both images
    pub extent: vk::Extent2D,
}

impl RenderTargets {
    fn create(resources: &mut GpuResources, extent: vk::Extent2D) -> VulkanResult<Self> {
        let color = resources.create_image(ImageDesc::render_target(extent, COLOR_TARGET_FORMAT, ImageUsage::Color))?;
        let depth = resources.create_image(ImageDesc::render_target(extent, DEPTH_TARGET_FORMAT, ImageUsage::Depth))?;
        Ok(Self { color, depth, extent })
    }

    fn destroy(self, resources: &mut GpuResources) {
        resources.destroy_image(self.color);
        resources.destroy_image(self.depth);
    }
}

struct FrameSlot {
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
}

/// Everything the frame backend touches, split from the pacer so both can
/// be borrowed at once
struct DeviceCore {
    resources: GpuResources,
    targets: RenderTargets,
    swapchain: Swapchain,
    frames: Vec<FrameSlot>,
    _command_pool: CommandPool,
    immediate: ImmediateSubmitter,
    context: VulkanContext,
}

impl DeviceCore {
    fn device(&self) -> &ash::Device {
        self.context.raw_device()
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
        unsafe { self.device().device_wait_idle() }?;

        // Build the replacement before the old swapchain drops so the
        // driver can hand its images over.
        let swapchain = Swapchain::new(&self.context, extent, self.swapchain.handle())?;
        self.swapchain = swapchain;

        let targets = RenderTargets::create(&mut self.resources, self.swapchain.extent())?;
        std::mem::replace(&mut self.targets, targets).destroy(&mut self.resources);

        // Fresh semaphores: an abandoned acquire may have left one signaled
        for frame in &mut self.frames {
            frame.sync = FrameSync::new(self.context.raw_device())?;
        }

        log::info!(
            "[SWAPCHAIN] Recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

/// Borrows the device core and the window for one pacer call
struct Presenter<'a, W: SurfaceExtent> {
    core: &'a mut DeviceCore,
    window: &'a mut W,
}

impl<W: SurfaceExtent> FrameBackend for Presenter<'_, W> {
    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> VulkanResult<()> {
        self.core.frames[slot].sync.frame_complete.wait(timeout_ns)
    }

    fn acquire_image(&mut self, slot: usize, timeout_ns: u64) -> VulkanResult<AcquireOutcome> {
        let semaphore = self.core.frames[slot].sync.image_acquired.handle();
        self.core.swapchain.acquire_next_image(semaphore, timeout_ns)
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let extent = wait_for_visible_extent(&mut *self.window);
        self.core.recreate_swapchain(extent)
    }

    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.core.frames[slot];
        frame.sync.frame_complete.reset()?;
        let device = self.core.device();
        unsafe { device.reset_command_buffer(frame.command_buffer, vk::CommandBufferResetFlags::empty()) }?;
        begin_one_time(device, frame.command_buffer)
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.core.frames[slot];
        let device = self.core.device();
        unsafe { device.end_command_buffer(frame.command_buffer) }?;

        let wait_semaphores = [frame.sync.image_acquired.handle()];
        // The swapchain image is first touched by the blit
        let wait_stages = [vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [frame.sync.render_complete.handle()];
        let command_buffers = [frame.command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            device.queue_submit(
                self.core.context.device.graphics_queue,
                &[submit_info],
                frame.sync.frame_complete.handle(),
            )
        }?;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let wait = self.core.frames[slot].sync.render_complete.handle();
        self.core
            .swapchain
            .present(self.core.context.device.present_queue, wait, image_index)
    }
}

/// Logical device with frame pacing, immediate submission and resources
pub struct Device {
    pacer: FramePacer,
    core: DeviceCore,
}

impl Device {
    /// Create the context, swapchain, render targets and per-frame objects.
    ///
    /// Blocks while the window is minimized, since a swapchain needs a
    /// non-zero extent.
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let context = VulkanContext::new(window, &config.application_name, config.enable_validation)?;
        let device = context.raw_device().clone();
        let graphics_family = context.physical_device.graphics_family;

        let mut resources = ResourceManager::new(VulkanResourceBackend::new(
            device.clone(),
            context.physical_device.memory_properties,
        ));

        let extent = wait_for_visible_extent(&mut *window);
        let swapchain = Swapchain::new(&context, extent, vk::SwapchainKHR::null())?;
        let targets = RenderTargets::create(&mut resources, swapchain.extent())?;

        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffers = command_pool.allocate(FRAME_OVERLAP as u32)?;
        let frames = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot {
                    sync: FrameSync::new(&device)?,
                    command_buffer,
                })
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let immediate = ImmediateSubmitter::new(device, context.device.graphics_queue, graphics_family)?;

        log::info!(
            "[DEVICE] Ready on {} with {FRAME_OVERLAP} frames in flight",
            context.physical_device.name()
        );

        Ok(Self {
            pacer: FramePacer::new(),
            core: DeviceCore {
                resources,
                targets,
                swapchain,
                frames,
                _command_pool: command_pool,
                immediate,
                context,
            },
        })
    }

    /// Wait for the current slot, acquire an image and begin recording.
    ///
    /// `Ok(false)` means the swapchain was rebuilt and this frame must be
    /// skipped.
    pub fn begin_frame<W: SurfaceExtent>(&mut self, window: &mut W) -> VulkanResult<bool> {
        let mut presenter = Presenter {
            core: &mut self.core,
            window,
        };
        self.pacer.begin_frame(&mut presenter)
    }

    /// Submit the current command buffer and present the acquired image
    pub fn present<W: SurfaceExtent>(&mut self, window: &mut W) -> VulkanResult<()> {
        let mut presenter = Presenter {
            core: &mut self.core,
            window,
        };
        self.pacer.present(&mut presenter)
    }

    /// Advance to the next frame slot
    pub fn end_frame(&mut self) {
        self.pacer.end_frame();
    }

    /// Rebuild the swapchain at the start of the next frame
    pub fn mark_swapchain_dirty(&mut self) {
        self.pacer.mark_swapchain_dirty();
    }

    /// Record with `record` on the upload command buffer and block until done
    pub fn immediate_submit<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> VulkanResult<()>,
    {
        self.core.immediate.submit(record)
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.core.device().device_wait_idle() }?;
        Ok(())
    }

    /// Block until every frame slot has finished on the GPU
    pub fn wait_render(&self) -> VulkanResult<()> {
        for frame in &self.core.frames {
            frame.sync.frame_complete.wait(FRAME_FENCE_TIMEOUT_NS)?;
        }
        Ok(())
    }

    /// Command buffer of the frame being recorded
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        self.core.frames[self.pacer.current_slot()].command_buffer
    }

    /// Slot index of the frame being recorded
    pub const fn current_slot(&self) -> usize {
        self.pacer.current_slot()
    }

    /// Frames presented so far
    pub const fn frame_number(&self) -> u64 {
        self.pacer.frame_number()
    }

    /// Swapchain image acquired for the current frame
    pub fn current_swapchain_image(&self) -> VulkanResult<vk::Image> {
        self.pacer
            .image_index()
            .and_then(|index| self.core.swapchain.image(index))
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "no swapchain image acquired for this frame".to_string(),
            })
    }

    /// Swapchain size in pixels
    pub const fn swapchain_extent(&self) -> vk::Extent2D {
        self.core.swapchain.extent()
    }

    /// Color and depth targets the scene renders into
    pub const fn render_targets(&self) -> RenderTargets {
        self.core.targets
    }

    /// Color and depth image handles for the editor viewport
    pub const fn viewport_textures(&self) -> (ImageHandle, ImageHandle) {
        (self.core.targets.color, self.core.targets.depth)
    }

    /// Look up a render target or texture image
    pub fn image(&self, handle: ImageHandle) -> VulkanResult<&GpuImage> {
        self.core
            .resources
            .get_image(handle)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                id: format!("{handle:?}"),
            })
    }

    /// The resource manager
    pub const fn resources(&self) -> &GpuResources {
        &self.core.resources
    }

    /// The resource manager, mutably
    pub fn resources_mut(&mut self) -> &mut GpuResources {
        &mut self.core.resources
    }

    /// Raw logical device
    pub fn raw(&self) -> &ash::Device {
        self.core.device()
    }

    /// Instance, physical and logical device
    pub const fn context(&self) -> &VulkanContext {
        &self.core.context
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("[DEVICE] wait_idle failed during teardown: {e}");
        }
        self.core.resources.clear();
        log::info!("[DEVICE] Destroyed after {} frames", self.pacer.frame_number());
    }
}
