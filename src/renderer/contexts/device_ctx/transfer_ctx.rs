use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::Result;
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Blocking command submission for uploads done before the first frame
pub struct TransferContext {
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    done: vk::Fence,

    queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(queue: Arc<Queue>, device: Arc<ash::Device>) -> Result<Self> {
        let mut ctx = Self {
            pool: vk::CommandPool::null(),
            cmd: vk::CommandBuffer::null(),
            done: vk::Fence::null(),
            queue,
            device,
        };

        // On early return `Drop` releases whatever was created so far
        unsafe {
            ctx.pool = ctx.device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(ctx.queue.family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )?;
            ctx.cmd = ctx.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(ctx.pool)
                    .command_buffer_count(1)
                    .level(vk::CommandBufferLevel::PRIMARY),
            )?[0];
            ctx.done = ctx.device.create_fence(&vk::FenceCreateInfo::default(), None)?;
        }

        Ok(ctx)
    }

    /// Records `func`, submits it and returns once the device has executed it
    pub fn immediate_submit<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let device = &*self.device;

        unsafe {
            device.begin_command_buffer(
                self.cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }
        if let Err(err) = func(self.cmd, device) {
            unsafe {
                device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
            }
            return Err(err);
        }

        let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(self.cmd)];
        let submit = vk::SubmitInfo2::default().command_buffer_infos(&cmd_infos);
        unsafe {
            device.end_command_buffer(self.cmd)?;
            device.queue_submit2(self.queue.handle, &[submit], self.done)?;
            device.wait_for_fences(&[self.done], true, u64::MAX)?;

            // Ready for the next upload
            device.reset_fences(&[self.done])?;
            device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        }

        Ok(())
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.done, None);
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
