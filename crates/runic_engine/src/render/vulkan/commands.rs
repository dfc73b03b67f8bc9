//! Command pools and the blocking immediate-submit path

use ash::{vk, Device};

use super::context::VulkanResult;
use super::sync::Fence;

/// How long an immediate submission may run before it is treated as a hang
pub const IMMEDIATE_SUBMIT_TIMEOUT_NS: u64 = 9_999_999_999;

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&create_info, None) }?;
        Ok(Self { device, command_pool })
    }

    /// Allocate `count` primary command buffers
    pub fn allocate(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }?;
        Ok(buffers)
    }

    /// Reset every buffer allocated from this pool
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
        }?;
        Ok(())
    }

    /// Get the command pool handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Begin `cmd` for a single submission
pub fn begin_one_time(device: &Device, cmd: vk::CommandBuffer) -> VulkanResult<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(cmd, &begin_info) }?;
    Ok(())
}

/// Dedicated pool, command buffer and fence for blocking uploads.
///
/// Kept apart from the per-frame command buffers so an upload never
/// disturbs a frame being recorded.
pub struct ImmediateSubmitter {
    device: Device,
    queue: vk::Queue,
    fence: Fence,
    command_buffer: vk::CommandBuffer,
    pool: CommandPool,
}

impl ImmediateSubmitter {
    /// Create the upload context on `queue` from `queue_family_index`
    pub fn new(device: Device, queue: vk::Queue, queue_family_index: u32) -> VulkanResult<Self> {
        let pool = CommandPool::new(device.clone(), queue_family_index)?;
        let command_buffer = pool.allocate(1)?[0];
        let fence = Fence::new(device.clone(), false)?;

        Ok(Self {
            device,
            queue,
            fence,
            command_buffer,
            pool,
        })
    }

    /// Record with `record`, submit, and block until the GPU finishes
    pub fn submit<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer) -> VulkanResult<()>,
    {
        let cmd = self.command_buffer;
        begin_one_time(&self.device, cmd)?;
        record(&self.device, cmd)?;
        unsafe { self.device.end_command_buffer(cmd) }?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe { self.device.queue_submit(self.queue, &[submit_info], self.fence.handle()) }?;

        self.fence.wait(IMMEDIATE_SUBMIT_TIMEOUT_NS)?;
        self.fence.reset()?;
        self.pool.reset()
    }
}
