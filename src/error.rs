//! Error type shared by the render core and the Vulkan backend.

use ash::vk;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("Failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Readback error: {0}")]
    Readback(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn device<T: ToString>(msg: T) -> Self {
        RenderError::Device(msg.to_string())
    }

    pub fn shader<T: ToString>(msg: T) -> Self {
        RenderError::Shader(msg.to_string())
    }

    pub fn upload<T: ToString>(msg: T) -> Self {
        RenderError::Upload(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        RenderError::Readback(msg.to_string())
    }

    pub fn unsupported<T: ToString>(msg: T) -> Self {
        RenderError::Unsupported(msg.to_string())
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
