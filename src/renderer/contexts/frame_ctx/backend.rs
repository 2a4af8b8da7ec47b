use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use glam::Mat4;
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::target::RenderSurface;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::frame::FrameSlot;
use crate::renderer::contexts::frame_ctx::scheduler::{Acquired, FrameBackend, PresentChain, Presented};
use crate::renderer::contexts::pipeline_ctx::GraphicsPipeline;
use crate::renderer::error::ChainError;
use crate::renderer::internals::barrier::{transition_image_layout, LayoutTransition};
use crate::renderer::internals::swapchain::{ChainRequest, PresentationChain};
use crate::renderer::internals::util::blit_image_letterboxed;
use crate::renderer::resources::image::Image;
use crate::renderer::resources::mesh::{Mesh, COLORED_CUBE};
use crate::renderer::shader_data::DrawPushConstants;

/// Offscreen color target: rendered into, then read by the blit
const DRAW_IMAGE_TRANSITIONS: [LayoutTransition; 2] = [
    LayoutTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
    LayoutTransition::new(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
];

const DEPTH_IMAGE_TRANSITION: LayoutTransition = LayoutTransition::new(
    vk::ImageLayout::UNDEFINED,
    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
);

/// Stage at which submission waits on the slot's image-ready semaphore
const IMAGE_READY_WAIT_STAGE: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;

/// Backbuffer: cleared, blitted into, presented. The first entry starts from
/// the image-ready wait stage so the clear is ordered after acquisition. The
/// middle entry orders the blit after the clear, both being transfer writes.
const BACKBUFFER_TRANSITIONS: [LayoutTransition; 3] = [
    LayoutTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .after_stage(IMAGE_READY_WAIT_STAGE),
    LayoutTransition::new(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
    LayoutTransition::new(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR),
];

fn chain_image_usage() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST
}

impl PresentChain for PresentationChain {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Renders the cube into a fixed-size offscreen image and letterboxes it
/// into whichever backbuffer was acquired.
///
/// The offscreen targets, mesh and pipeline are built once and never resized.
pub struct VulkanFrameBackend {
    draw_image: Image,
    depth_image: Image,
    mesh: Mesh,
    pipeline: GraphicsPipeline,

    render_matrix: Mat4,
    clear_color: vk::ClearColorValue,
    desired_present_mode: vk::PresentModeKHR,

    // Released after every resource above
    surface: Arc<RenderSurface>,
    device: Arc<RenderDevice>,
}

impl VulkanFrameBackend {
    pub fn new(dev: &RenderDeviceContext, config: &RenderConfig) -> Result<Self> {
        let device = dev.device.clone();

        let draw_image = device.create_draw_image(config.draw_extent, config.draw_format)?;
        let depth_image = device.create_depth_image(&dev.instance.instance, config.draw_extent)?;
        let mesh = device.create_mesh(&COLORED_CUBE)?;
        let pipeline = GraphicsPipeline::new_geometry(
            draw_image.format,
            depth_image.format,
            device.logical.clone(),
        )?;

        log::debug!(
            "Draw image {}x{} {:?}, depth format {:?}",
            draw_image.extent.width,
            draw_image.extent.height,
            draw_image.format,
            depth_image.format,
        );

        Ok(Self {
            render_matrix: Camera::new().get_render_mat(draw_image.extent),
            draw_image,
            depth_image,
            mesh,
            pipeline,

            clear_color: vk::ClearColorValue { float32: config.clear_color },
            desired_present_mode: config.desired_present_mode(),

            surface: dev.surface.clone(),
            device,
        })
    }

    /// Frame slots record on the graphics queue family
    pub fn create_slot(&self) -> Result<FrameSlot> {
        FrameSlot::new(
            self.device.graphics_queue.family_index,
            self.device.logical.clone(),
        )
    }

    fn transition(&self, cmd: vk::CommandBuffer, image: vk::Image, format: vk::Format, t: LayoutTransition) {
        transition_image_layout(cmd, image, format, t, &self.device.logical);
    }

    fn draw_geometry(&self, cmd: vk::CommandBuffer) {
        let device = &self.device.logical;
        let extent = self.draw_image.extent;

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(self.draw_image.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue { color: self.clear_color })];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_image.view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let push_constants = DrawPushConstants::new(
            self.render_matrix,
            self.mesh.vertex_buffer_address,
        );

        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
        }
        self.pipeline.bind(cmd);
        self.pipeline.push_constants(cmd, &push_constants);
        unsafe {
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.cmd_draw(cmd, self.mesh.vertex_count, 1, 0, 0);
            device.cmd_end_rendering(cmd);
        }
    }
}

impl FrameBackend for VulkanFrameBackend {
    type Slot = FrameSlot;
    type Chain = PresentationChain;

    fn build_chain(
        &mut self,
        extent: vk::Extent2D,
        old: Option<&PresentationChain>,
    ) -> Result<PresentationChain, ChainError> {
        // Surfaces with an adaptive extent would clamp this up to their minimum
        if extent.width == 0 || extent.height == 0 {
            return Err(ChainError::ZeroExtent {
                width: extent.width,
                height: extent.height,
            });
        }

        let request = ChainRequest {
            desired_extent: extent,
            desired_present_mode: self.desired_present_mode,
            image_usage: chain_image_usage(),
            graphics_family: self.device.queue_families.graphics,
            present_family: self.device.queue_families.present,
        };
        PresentationChain::new(&self.surface, &self.device, &request, old)
    }

    fn acquire(&mut self, chain: &PresentationChain, slot: &FrameSlot) -> Result<Acquired> {
        let result = unsafe {
            chain.loader().acquire_next_image(
                chain.swapchain,
                u64::MAX,
                slot.image_available,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }

    fn record(&mut self, chain: &PresentationChain, slot: &FrameSlot, image_index: u32) -> Result<()> {
        let device = &self.device.logical;
        let cmd = slot.command_buffer;
        let backbuffer = chain.images[image_index as usize];
        let draw = (self.draw_image.image, self.draw_image.format);

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device.begin_command_buffer(cmd, &begin_info)?;
        }

        self.transition(cmd, draw.0, draw.1, DRAW_IMAGE_TRANSITIONS[0]);
        self.transition(cmd, self.depth_image.image, self.depth_image.format, DEPTH_IMAGE_TRANSITION);
        self.draw_geometry(cmd);
        self.transition(cmd, draw.0, draw.1, DRAW_IMAGE_TRANSITIONS[1]);

        self.transition(cmd, backbuffer, chain.format, BACKBUFFER_TRANSITIONS[0]);
        let clear_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        };
        unsafe {
            device.cmd_clear_color_image(
                cmd,
                backbuffer,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &self.clear_color,
                &[clear_range],
            );
        }
        self.transition(cmd, backbuffer, chain.format, BACKBUFFER_TRANSITIONS[1]);
        blit_image_letterboxed(
            cmd,
            draw.0,
            backbuffer,
            self.draw_image.extent,
            chain.extent,
            device,
        );
        self.transition(cmd, backbuffer, chain.format, BACKBUFFER_TRANSITIONS[2]);

        unsafe {
            device.end_command_buffer(cmd)?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: &FrameSlot) -> Result<()> {
        let cmd_infos = [vk::CommandBufferSubmitInfo::default()
            .command_buffer(slot.command_buffer)];
        let wait_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.image_available)
            .stage_mask(IMAGE_READY_WAIT_STAGE)
            .value(1)];
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.render_finished)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)
            .value(1)];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos)
            .command_buffer_infos(&cmd_infos);

        unsafe {
            self.device.logical.queue_submit2(
                self.device.graphics_queue.handle,
                &[submit],
                slot.render_fence,
            )?;
        }
        Ok(())
    }

    fn present(
        &mut self,
        chain: &PresentationChain,
        slot: &FrameSlot,
        image_index: u32,
    ) -> Result<Presented> {
        let wait_semaphores = [slot.render_finished];
        let swapchains = [chain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            chain.loader().queue_present(self.device.present_queue.handle, &present_info)
        };
        match result {
            Ok(false) => Ok(Presented::Optimal),
            Ok(true) => Ok(Presented::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }
}
