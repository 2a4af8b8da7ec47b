/// "Internals" are the low-level Vulkan helpers the frame loop is built from:
/// the presentation chain, layout barriers and blits.

pub mod barrier;
pub mod swapchain;
pub mod util;
