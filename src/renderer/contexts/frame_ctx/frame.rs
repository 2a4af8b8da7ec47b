use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::SlotSync;

/// Per-frame command recording context and the objects that synchronize it
pub struct FrameSlot {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    // Signals when the acquired backbuffer can be written.
    pub image_available: vk::Semaphore,

    // Signals when rendering into the backbuffer has finished.
    pub render_finished: vk::Semaphore,

    // Signals when all commands submitted from this slot have finished execution.
    pub render_fence: vk::Fence,

    device: Arc<ash::Device>,
}

impl FrameSlot {
    pub fn new(
        queue_family_index: u32,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let mut slot = Self {
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            render_fence: vk::Fence::null(),
            device,
        };

        // Handles created so far are released by `Drop` if a later step fails
        unsafe {
            let command_pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family_index);
            slot.command_pool = slot.device.create_command_pool(&command_pool_info, None)?;

            let command_buffer_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(slot.command_pool)
                .command_buffer_count(1)
                .level(vk::CommandBufferLevel::PRIMARY);
            slot.command_buffer = slot.device.allocate_command_buffers(&command_buffer_info)?[0];

            slot.image_available = slot.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
            slot.render_finished = slot.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;

            // Created signaled so the first wait on this slot returns immediately
            slot.render_fence = slot.device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?;
        }

        Ok(slot)
    }
}

impl SlotSync for FrameSlot {
    fn wait_fence(&self, timeout_ns: u64) -> Result<bool> {
        let result = unsafe {
            self.device.wait_for_fences(&[self.render_fence], true, timeout_ns)
        };
        match result {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn reset(&mut self) -> Result<()> {
        unsafe {
            self.device.reset_fences(&[self.render_fence])?;
            self.device.reset_command_pool(
                self.command_pool,
                vk::CommandPoolResetFlags::empty(),
            )?;
        }
        Ok(())
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.render_fence, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_semaphore(self.image_available, None);
            // Frees the command buffer allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
