use std::time::Duration;
use ash::vk;
use color_eyre::Result;
use crate::renderer::error::RenderError;

/// Contains configuration options for the renderer like the resolution, vsync, and other settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Number of frames the host may record ahead of the device
    pub frames_in_flight: usize,
    pub vsync: bool,
    /// Fixed size of the offscreen image the scene is rendered into
    pub draw_extent: vk::Extent2D,
    pub draw_format: vk::Format,
    /// How long to back off when the surface has a zero extent
    pub zero_extent_backoff: Duration,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vsync: false,
            draw_extent: vk::Extent2D { width: 1080, height: 1080 },
            draw_format: vk::Format::R16G16B16A16_SFLOAT,
            zero_extent_backoff: Duration::from_millis(100),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RenderConfig {
    pub const FRAMES_IN_FLIGHT_VAR: &'static str = "CADENCE_FRAMES_IN_FLIGHT";
    pub const VSYNC_VAR: &'static str = "CADENCE_VSYNC";

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup` on top of the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(Self::FRAMES_IN_FLIGHT_VAR) {
            config.frames_in_flight = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(RenderError::InvalidConfig {
                    key: Self::FRAMES_IN_FLIGHT_VAR,
                    value,
                }.into()),
            };
        }

        if let Some(value) = lookup(Self::VSYNC_VAR) {
            config.vsync = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                _ => return Err(RenderError::InvalidConfig {
                    key: Self::VSYNC_VAR,
                    value,
                }.into()),
            };
        }

        Ok(config)
    }

    /// Present mode requested from the surface; FIFO is used when it is unsupported
    pub fn desired_present_mode(&self) -> vk::PresentModeKHR {
        if self.vsync {
            vk::PresentModeKHR::FIFO
        } else {
            vk::PresentModeKHR::MAILBOX
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = RenderConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.frames_in_flight, 2);
        assert!(!config.vsync);
        assert_eq!(config.desired_present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn overrides_are_applied() {
        let config = RenderConfig::from_lookup(lookup_from(&[
            (RenderConfig::FRAMES_IN_FLIGHT_VAR, "3"),
            (RenderConfig::VSYNC_VAR, "on"),
        ])).unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.desired_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let err = RenderConfig::from_lookup(lookup_from(&[
            (RenderConfig::FRAMES_IN_FLIGHT_VAR, "0"),
        ])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::InvalidConfig { key: RenderConfig::FRAMES_IN_FLIGHT_VAR, .. })
        ));
    }

    #[test]
    fn malformed_vsync_is_rejected() {
        assert!(RenderConfig::from_lookup(lookup_from(&[
            (RenderConfig::VSYNC_VAR, "sometimes"),
        ])).is_err());
    }
}
