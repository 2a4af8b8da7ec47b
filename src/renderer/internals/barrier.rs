use ash::vk;

/// Synchronization scopes and aspect of a single image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBarrier {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub aspect: vk::ImageAspectFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old: vk::ImageLayout,
    pub new: vk::ImageLayout,
    /// Replaces the table's source stage, e.g. to chain onto a semaphore wait
    pub src_stage: Option<vk::PipelineStageFlags2>,
}

impl LayoutTransition {
    pub const fn new(old: vk::ImageLayout, new: vk::ImageLayout) -> Self {
        Self { old, new, src_stage: None }
    }

    pub const fn after_stage(self, stage: vk::PipelineStageFlags2) -> Self {
        Self { src_stage: Some(stage), ..self }
    }

    pub fn barrier(&self, format: vk::Format) -> LayoutBarrier {
        let mut barrier = LayoutBarrier::for_transition(self.old, self.new, format);
        if let Some(stage) = self.src_stage {
            barrier.src_stage = stage;
        }
        barrier
    }
}

impl LayoutBarrier {
    /// Maps a transition to its barrier.
    ///
    /// Layouts without a table entry get the conservative
    /// `ALL_COMMANDS`/`MEMORY_*` scopes on their side of the barrier.
    pub fn for_transition(
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        format: vk::Format,
    ) -> Self {
        let (src_stage, src_access) = source_scope(old_layout).unwrap_or_else(|| {
            log::trace!("No source scope for {:?}, using full barrier", old_layout);
            (vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_WRITE)
        });
        let (dst_stage, dst_access) = destination_scope(new_layout).unwrap_or_else(|| {
            log::trace!("No destination scope for {:?}, using full barrier", new_layout);
            (
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            )
        });

        Self {
            src_stage,
            src_access,
            dst_stage,
            dst_access,
            aspect: aspect_for(new_layout, format),
        }
    }

    pub fn image_memory_barrier(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
    }
}

fn source_scope(layout: vk::ImageLayout) -> Option<(vk::PipelineStageFlags2, vk::AccessFlags2)> {
    match layout {
        vk::ImageLayout::UNDEFINED => {
            Some((vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE))
        }
        vk::ImageLayout::GENERAL => {
            Some((vk::PipelineStageFlags2::HOST, vk::AccessFlags2::NONE))
        }
        vk::ImageLayout::PREINITIALIZED => {
            Some((vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_WRITE))
        }
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            Some((vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE))
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => Some((
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        )),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => Some((
            vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )),
        _ => None,
    }
}

fn destination_scope(layout: vk::ImageLayout) -> Option<(vk::PipelineStageFlags2, vk::AccessFlags2)> {
    match layout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => Some((
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        )),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => Some((
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            Some((vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_READ))
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            Some((vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ))
        }
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            Some((vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE))
        }
        vk::ImageLayout::GENERAL => {
            Some((vk::PipelineStageFlags2::HOST, vk::AccessFlags2::NONE))
        }
        // Presentation is ordered by the render-complete semaphore, not by access scopes
        vk::ImageLayout::PRESENT_SRC_KHR => {
            Some((vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE))
        }
        _ => None,
    }
}

fn aspect_for(new_layout: vk::ImageLayout, format: vk::Format) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Records a layout transition of the whole first mip/layer of `image`
pub fn transition_image_layout(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    transition: LayoutTransition,
    device: &ash::Device,
) {
    let image_barrier = transition
        .barrier(format)
        .image_memory_barrier(image, transition.old, transition.new);
    let image_barriers = [image_barrier];
    let dep_info = vk::DependencyInfo::default()
        .image_memory_barriers(&image_barriers);

    unsafe {
        device.cmd_pipeline_barrier2(cmd, &dep_info);
    }
}
