pub mod app;
pub mod renderer;

use std::process::ExitCode;
use ash::vk;
use color_eyre::{Report, Result};
use app::App;
use renderer::error::{ChainError, RenderError};
use renderer::RenderConfig;

fn main() -> ExitCode {
    if let Err(err) = color_eyre::install() {
        eprintln!("Failed to install error report handler: {}", err);
        return ExitCode::FAILURE;
    }
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            log::error!("[{}] {:?}", error_category(&report), report);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = RenderConfig::from_env()?;
    log::debug!("{:?}", config);

    App::new(config).run()
}

/// Where a fatal error came from: the renderer, the Vulkan driver or elsewhere
fn error_category(report: &Report) -> &'static str {
    match report.downcast_ref::<ChainError>() {
        Some(ChainError::Vulkan(_)) => "vulkan",
        Some(ChainError::ZeroExtent { .. }) => "internal",
        None if report.downcast_ref::<RenderError>().is_some() => "internal",
        None if report.downcast_ref::<vk::Result>().is_some() => "vulkan",
        None => "unknown",
    }
}
