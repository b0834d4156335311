pub mod constants;
pub mod error;
pub mod math;
pub mod mesh;
pub mod geometry;
pub mod drops;
pub mod simulation;
pub mod camera;
pub mod backend;
pub mod scene;
pub mod texture;
pub mod resources;
pub mod draw;
pub mod view;
pub mod fps_logger;
pub mod camera_controller;
pub mod picking;
pub mod track;
pub mod vulkan_common;
pub mod vulkan_backend;

// Re-export ash for use in consuming applications
pub use ash;

pub use backend::RenderBackend;
pub use error::{RenderError, RenderResult};
pub use view::{FrameContext, WaterView};

use bevy::prelude::*;
use bevy::window::{WindowPlugin, Window};
use bevy::asset::AssetPlugin;
use bevy::render::RenderPlugin;
use bevy::render::texture::ImagePlugin;
use bevy::render::settings::WgpuSettings;
use bevy::core_pipeline::CorePipelinePlugin;
use bevy::transform::TransformPlugin;
use bevy::winit::{WinitPlugin, WakeUp};
use bevy::a11y::AccessibilityPlugin;
use bevy::input::InputPlugin;
use bevy::input::keyboard::KeyboardFocusLost;

pub fn setup_bevy_app() -> App {
    setup_bevy_app_with_window(1280.0, 720.0, "Water View")
}

/// Window, input and frame-loop plugins only. Bevy's renderer is created
/// without a wgpu backend; drawing goes through the Vulkan backend.
pub fn setup_bevy_app_with_window(width: f32, height: f32, title: &str) -> App {
    std::env::set_var("RUST_BACKTRACE", "0");

    let mut app = App::new();
    app
        .add_event::<KeyboardFocusLost>()
        .add_plugins((
            MinimalPlugins,
            AssetPlugin::default(),
            WindowPlugin {
                primary_window: Some(Window {
                    title: title.to_string(),
                    resolution: (width, height).into(),
                    ..default()
                }),
                ..default()
            },
            AccessibilityPlugin,
            InputPlugin::default(),
            WinitPlugin::<WakeUp>::default(),
            TransformPlugin,
            RenderPlugin {
                render_creation: WgpuSettings {
                    backends: None,
                    ..default()
                }
                .into(),
                ..default()
            },
            ImagePlugin::default(),
            CorePipelinePlugin::default(),
        ));

    app
}
