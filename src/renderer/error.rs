use ash::vk;
use thiserror::Error;

/// Failure to build a presentation chain.
///
/// `ZeroExtent` is a transient condition (usually a minimized window) and is
/// retried later; everything else is fatal.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("presentation chain extent is zero ({width}x{height})")]
    ZeroExtent { width: u32, height: u32 },
    #[error("presentation chain creation failed: {0}")]
    Vulkan(#[from] vk::Result),
}

/// Errors raised by the renderer itself rather than by the Vulkan driver.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig { key: &'static str, value: String },
    #[error("no physical device supports Vulkan 1.3 with the required features")]
    NoSuitableDevice,
    #[error("no queue family supports presentation to the surface")]
    NoPresentQueue,
    #[error("no supported depth attachment format")]
    NoDepthFormat,
}
