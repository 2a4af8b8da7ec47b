use ash::vk;

/// Destination corners of a blit that fits `src` inside `dst` without
/// distorting it, centered, leaving bars on the unused sides.
pub fn letterbox_offsets(src: vk::Extent2D, dst: vk::Extent2D) -> [vk::Offset3D; 2] {
    let src_aspect_ratio = src.width as f32 / src.height as f32;
    let dst_aspect_ratio = dst.width as f32 / dst.height as f32;

    let (width, height) = if src_aspect_ratio > dst_aspect_ratio {
        (dst.width, (dst.width as f32 / src_aspect_ratio) as u32)
    } else {
        ((dst.height as f32 * src_aspect_ratio) as u32, dst.height)
    };

    [
        vk::Offset3D {
            x: ((dst.width - width) / 2) as i32,
            y: ((dst.height - height) / 2) as i32,
            z: 0,
        },
        vk::Offset3D {
            x: ((dst.width + width) / 2) as i32,
            y: ((dst.height + height) / 2) as i32,
            z: 1,
        },
    ]
}

/// Linear-filtered, aspect-preserving blit. `src` must be in
/// `TRANSFER_SRC_OPTIMAL` and `dst` in `TRANSFER_DST_OPTIMAL`.
pub fn blit_image_letterboxed(
    cmd: vk::CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    src_size: vk::Extent2D,
    dst_size: vk::Extent2D,
    device: &ash::Device,
) {
    let color_layer = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let blit_region = vk::ImageBlit2::default()
        .src_subresource(color_layer)
        .src_offsets([
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: src_size.width as i32,
                y: src_size.height as i32,
                z: 1,
            },
        ])
        .dst_subresource(color_layer)
        .dst_offsets(letterbox_offsets(src_size, dst_size));
    let regions = [blit_region];

    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .regions(&regions)
        .filter(vk::Filter::LINEAR);

    unsafe {
        device.cmd_blit_image2(cmd, &blit_info);
    }
}
