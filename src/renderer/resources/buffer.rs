use std::sync::{Arc, Mutex, PoisonError};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt, Result};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;

pub struct Buffer {
    pub buffer: vk::Buffer,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_loc: MemoryLocation,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer = {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = mem_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: mem_loc,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe {
                    device.destroy_buffer(buffer, None);
                }
                return Err(err.into());
            }
        };

        let buffer = Self {
            buffer,

            allocation: Some(allocation),
            memory_allocator: mem_allocator,
            device,
        };

        if let Some(allocation) = buffer.allocation.as_ref() {
            unsafe {
                buffer.device.bind_buffer_memory(
                    buffer.buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        Ok(buffer)
    }

    /// Device-local buffer readable from shaders through its device address,
    /// filled from `data` with a staging copy
    pub fn new_device_local<T>(
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self>
    where
        T: bytemuck::Pod,
    {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as u64;

        let buffer = Self::new(
            size,
            usage
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            name,
            MemoryLocation::GpuOnly,
            mem_allocator.clone(),
            device.clone(),
        )?;

        let mut staging_buffer = Self::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{} staging", name),
            MemoryLocation::CpuToGpu,
            mem_allocator,
            device,
        )?;
        staging_buffer.write(bytes, 0)?;

        transfer_context.immediate_submit(|cmd, device| {
            let region = vk::BufferCopy::default().size(size);
            unsafe {
                device.cmd_copy_buffer(cmd, staging_buffer.buffer, buffer.buffer, &[region]);
            }
            Ok(())
        })?;

        Ok(buffer)
    }

    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let allocation = self.allocation
            .as_ref()
            .ok_or_eyre("Buffer has no allocation")?;
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_eyre("Cannot write to buffer that is not host visible")?;

        let mut raw_allocation = presser::RawAllocation::from_raw_parts(
            mapped_ptr.cast::<u8>(),
            allocation.size() as usize,
        );
        let mut slab = unsafe { raw_allocation.borrow_as_slab() };
        let copy_record = presser::copy_from_slice_to_offset(
            data,
            &mut slab,
            start_offset,
        )?;

        Ok(copy_record)
    }

    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default()
            .buffer(self.buffer);
        unsafe {
            self.device.get_buffer_device_address(&info)
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let result = self.memory_allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .free(allocation);
            if let Err(err) = result {
                log::error!("Failed to free buffer allocation: {}", err);
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}
