use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::target::RenderSurface;
use crate::renderer::error::ChainError;

/// What the caller wants from a chain build. The surface decides what it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRequest {
    pub desired_extent: vk::Extent2D,
    pub desired_present_mode: vk::PresentModeKHR,
    pub image_usage: vk::ImageUsageFlags,
    pub graphics_family: u32,
    pub present_family: u32,
}

/// Creation parameters negotiated between a [`ChainRequest`] and the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
}

impl ChainPlan {
    const PREFERRED_IMAGE_COUNT: u32 = 3;

    pub fn resolve(
        caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        request: &ChainRequest,
    ) -> Result<Self, ChainError> {
        let extent = resolve_extent(caps, request.desired_extent)?;

        let min_image_count = {
            let min = caps.min_image_count;
            // A maximum of zero means the surface imposes no limit
            let max = match caps.max_image_count {
                0 => u32::MAX,
                max => max.max(min),
            };
            Self::PREFERRED_IMAGE_COUNT.clamp(min, max)
        };

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let (sharing_mode, queue_family_indices) =
            select_sharing_mode(request.graphics_family, request.present_family);

        Ok(Self {
            extent,
            min_image_count,
            surface_format: select_surface_format(formats),
            present_mode: select_present_mode(present_modes, request.desired_present_mode),
            pre_transform,
            composite_alpha: select_composite_alpha(caps.supported_composite_alpha),
            sharing_mode,
            queue_family_indices,
        })
    }
}

/// A surface reporting `u32::MAX` as its current width lets the swapchain
/// pick the extent; anything else must be used as reported.
pub fn resolve_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> Result<vk::Extent2D, ChainError> {
    let extent = if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired.width.clamp(
                caps.min_image_extent.width,
                caps.max_image_extent.width.max(caps.min_image_extent.width),
            ),
            height: desired.height.clamp(
                caps.min_image_extent.height,
                caps.max_image_extent.height.max(caps.min_image_extent.height),
            ),
        }
    } else {
        caps.current_extent
    };

    if extent.width == 0 || extent.height == 0 {
        return Err(ChainError::ZeroExtent {
            width: extent.width,
            height: extent.height,
        });
    }

    Ok(extent)
}

pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    const PREFERRED: [vk::Format; 4] = [
        vk::Format::B8G8R8A8_UNORM,
        vk::Format::R8G8B8A8_UNORM,
        vk::Format::B8G8R8_UNORM,
        vk::Format::R8G8B8_UNORM,
    ];

    assert!(!formats.is_empty(), "surface reports no formats");

    let picked = PREFERRED
        .iter()
        .find_map(|preferred| {
            formats.iter().find(|format| {
                format.format == *preferred
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
        })
        .copied()
        .unwrap_or(formats[0]);

    if picked.format == vk::Format::UNDEFINED {
        // The surface accepts any format
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    } else {
        picked
    }
}

pub fn select_present_mode(
    supported: &[vk::PresentModeKHR],
    desired: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if supported.contains(&desired) {
        desired
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn select_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|alpha| supported.contains(*alpha))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub fn select_sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family != present_family {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// Presentable images negotiated with the surface, plus one view per image
pub struct PresentationChain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,

    swapchain_loader: ash::khr::swapchain::Device,
    device: Arc<ash::Device>,
}

impl PresentationChain {
    /// Builds a chain for `surface`. Waits for the device to go idle first,
    /// so no in-flight work can still reference `old`'s images.
    pub fn new(
        surface: &RenderSurface,
        dev: &RenderDevice,
        request: &ChainRequest,
        old: Option<&PresentationChain>,
    ) -> Result<Self, ChainError> {
        unsafe {
            dev.logical.device_wait_idle()?;
        }

        let (caps, formats, present_modes) = unsafe {
            (
                surface.loader.get_physical_device_surface_capabilities(dev.physical, surface.handle)?,
                surface.loader.get_physical_device_surface_formats(dev.physical, surface.handle)?,
                surface.loader.get_physical_device_surface_present_modes(dev.physical, surface.handle)?,
            )
        };

        let plan = ChainPlan::resolve(&caps, &formats, &present_modes, request)?;

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(plan.min_image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_usage(request.image_usage)
            .image_sharing_mode(plan.sharing_mode)
            .queue_family_indices(&plan.queue_family_indices)
            .pre_transform(plan.pre_transform)
            .composite_alpha(plan.composite_alpha)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.swapchain))
            .image_array_layers(1);

        let swapchain_loader = dev.swapchain_loader.clone();
        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        let (images, image_views) = match Self::create_swapchain_images(
            swapchain,
            &swapchain_loader,
            plan.surface_format.format,
            &dev.logical,
        ) {
            Ok(images) => images,
            Err(err) => {
                unsafe {
                    swapchain_loader.destroy_swapchain(swapchain, None);
                }
                return Err(err.into());
            }
        };

        log::info!(
            "Built presentation chain: {}x{}, {:?}, {:?}, {} images",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.present_mode,
            images.len(),
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            extent: plan.extent,
            format: plan.surface_format.format,
            present_mode: plan.present_mode,
            swapchain_loader,
            device: dev.logical.clone(),
        })
    }

    pub fn loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    fn create_swapchain_images(
        swapchain: vk::SwapchainKHR,
        swapchain_loader: &ash::khr::swapchain::Device,
        format: vk::Format,
        device: &ash::Device,
    ) -> VkResult<(Vec<vk::Image>, Vec<vk::ImageView>)> {
        let images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image(*image);
            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => image_views.push(view),
                Err(err) => {
                    for view in image_views {
                        unsafe {
                            device.destroy_image_view(view, None);
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok((images, image_views))
    }
}

impl Drop for PresentationChain {
    fn drop(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
        }
    }

    fn adaptive() -> vk::Extent2D {
        vk::Extent2D { width: u32::MAX, height: u32::MAX }
    }

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn request(graphics_family: u32, present_family: u32) -> ChainRequest {
        ChainRequest {
            desired_extent: vk::Extent2D { width: 900, height: 600 },
            desired_present_mode: vk::PresentModeKHR::MAILBOX,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            graphics_family,
            present_family,
        }
    }

    fn resolve(caps: &vk::SurfaceCapabilitiesKHR, request: &ChainRequest) -> Result<ChainPlan, ChainError> {
        ChainPlan::resolve(
            caps,
            &[srgb(vk::Format::B8G8R8A8_UNORM)],
            &[vk::PresentModeKHR::FIFO],
            request,
        )
    }

    #[test]
    fn fixed_surface_extent_is_used_verbatim() {
        let fixed = vk::Extent2D { width: 1280, height: 720 };
        let extent = resolve_extent(&caps(fixed), vk::Extent2D { width: 900, height: 600 }).unwrap();
        assert_eq!(extent, fixed);
    }

    #[test]
    fn adaptive_surface_extent_is_clamped() {
        let mut caps = caps(adaptive());
        caps.max_image_extent = vk::Extent2D { width: 800, height: 800 };
        let extent = resolve_extent(&caps, vk::Extent2D { width: 900, height: 600 }).unwrap();
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn zero_width_or_height_is_a_zero_extent_error() {
        for (width, height) in [(0, 600), (900, 0), (0, 0), (0, 1), (1, 0)] {
            let zero = vk::Extent2D { width, height };
            let err = resolve_extent(&caps(zero), zero).unwrap_err();
            assert!(matches!(err, ChainError::ZeroExtent { width: w, height: h } if w == width && h == height));
        }
    }

    #[test]
    fn adaptive_surface_with_zero_minimum_rejects_zero_request() {
        let mut caps = caps(adaptive());
        caps.min_image_extent = vk::Extent2D { width: 0, height: 0 };
        let err = resolve_extent(&caps, vk::Extent2D { width: 0, height: 720 }).unwrap_err();
        assert!(matches!(err, ChainError::ZeroExtent { .. }));
    }

    #[test]
    fn distinct_families_share_concurrently() {
        let plan = resolve(&caps(adaptive()), &request(0, 2)).unwrap();
        assert_eq!(plan.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(plan.queue_family_indices, vec![0, 2]);
    }

    #[test]
    fn same_family_is_exclusive() {
        let plan = resolve(&caps(adaptive()), &request(1, 1)).unwrap();
        assert_eq!(plan.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert!(plan.queue_family_indices.is_empty());
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO,
        );
        assert_eq!(
            select_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                vk::PresentModeKHR::MAILBOX,
            ),
            vk::PresentModeKHR::MAILBOX,
        );
    }

    #[test]
    fn preferred_surface_format_wins_over_list_order() {
        let formats = [
            srgb(vk::Format::A2B10G10R10_UNORM_PACK32),
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(select_surface_format(&formats), srgb(vk::Format::B8G8R8A8_UNORM));
    }

    #[test]
    fn preferred_format_requires_nonlinear_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            srgb(vk::Format::R8G8B8A8_UNORM),
        ];
        assert_eq!(select_surface_format(&formats), srgb(vk::Format::R8G8B8A8_UNORM));
    }

    #[test]
    fn unknown_formats_fall_back_to_first() {
        let formats = [
            srgb(vk::Format::A2B10G10R10_UNORM_PACK32),
            srgb(vk::Format::R16G16B16A16_SFLOAT),
        ];
        assert_eq!(select_surface_format(&formats), formats[0]);
    }

    #[test]
    fn undefined_format_is_coerced() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(select_surface_format(&formats), srgb(vk::Format::B8G8R8A8_UNORM));
    }

    #[test]
    #[should_panic(expected = "surface reports no formats")]
    fn empty_format_list_is_a_defect() {
        select_surface_format(&[]);
    }

    #[test]
    fn image_count_prefers_three_within_limits() {
        let plan = resolve(&caps(adaptive()), &request(0, 0)).unwrap();
        assert_eq!(plan.min_image_count, 3);

        let mut tight = caps(adaptive());
        tight.max_image_count = 2;
        assert_eq!(resolve(&tight, &request(0, 0)).unwrap().min_image_count, 2);

        let mut unbounded = caps(adaptive());
        unbounded.min_image_count = 4;
        unbounded.max_image_count = 0;
        assert_eq!(resolve(&unbounded, &request(0, 0)).unwrap().min_image_count, 4);
    }

    #[test]
    fn composite_alpha_preference() {
        assert_eq!(
            select_composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT),
            vk::CompositeAlphaFlagsKHR::INHERIT,
        );
        assert_eq!(
            select_composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE),
            vk::CompositeAlphaFlagsKHR::OPAQUE,
        );
        assert_eq!(
            select_composite_alpha(
                vk::CompositeAlphaFlagsKHR::OPAQUE
                    | vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
                    | vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
                    | vk::CompositeAlphaFlagsKHR::INHERIT,
            ),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        );
    }

    #[test]
    fn transform_falls_back_to_current() {
        let mut caps = caps(adaptive());
        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        let plan = resolve(&caps, &request(0, 0)).unwrap();
        assert_eq!(plan.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }
}
