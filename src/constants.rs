// Vulkan configuration constants
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
pub const ENABLE_VALIDATION_LAYERS: bool = false;

// Clear values. The scene clear is a dark blue; the pick target clears to the
// "no surface" sentinel (blue channel == 1.0).
pub const CLEAR_COLOR_SCENE: [f32; 4] = [0.0, 0.0, 0.3, 0.0];
pub const CLEAR_COLOR_PICK: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
pub const DEPTH_CLEAR_VALUE: f32 = 1.0;
pub const STENCIL_CLEAR_VALUE: u32 = 0;

// Scene layout
pub const MODEL_SCALE: f32 = 100.0;
pub const WATER_HEIGHT_FACTOR: f32 = 0.6;
/// World-space water height, the wave grid height scaled by the model scale.
pub const WATER_HEIGHT: f32 = WATER_HEIGHT_FACTOR * MODEL_SCALE;

// Wave grid
pub const WAVE_CELL_SIZE: f32 = 0.01;
pub const WAVE_HALF_EXTENT: f32 = 1.0;
pub const WAVE_SPEED: f32 = 0.03;
pub const PROCEDURAL_WAVE_SPEED_UNIFORM: f32 = 1.0;

// Water shading constants
pub const WATER_COLOR: [f32; 3] = [0.0, 1.0, 0.0];
pub const WATER_LIGHT_COLOR: [f32; 3] = [0.5, 0.5, 0.1];
pub const WATER_LIGHT_POSITION: [f32; 3] = [50.0, 200.0, 50.0];

// Default live parameters
pub const DEFAULT_AMPLITUDE: f32 = 1.0;
pub const DEFAULT_WAVELENGTH: f32 = 5.0;

// Ripples
pub const DEFAULT_DROP_RADIUS: f32 = 0.05;
pub const DEFAULT_DROP_KEEP_TIME: f32 = 3.0;

// Top-down orthographic camera
pub const TOP_CAMERA_HALF_EXTENT: f32 = 110.0;
pub const TOP_CAMERA_NEAR: f32 = 200.0;
pub const TOP_CAMERA_FAR: f32 = -200.0;

// Offscreen reflection/refraction targets
pub const OFFSCREEN_TARGET_WIDTH: u32 = 1280;
pub const OFFSCREEN_TARGET_HEIGHT: u32 = 720;

// Asset paths, relative to the asset root
pub const SKYBOX_FACE_PATHS: [&str; 6] = [
    "Images/skybox/right.jpg",
    "Images/skybox/left.jpg",
    "Images/skybox/top.jpg",
    "Images/skybox/bottom.jpg",
    "Images/skybox/front.jpg",
    "Images/skybox/back.jpg",
];
pub const TILES_TEXTURE_PATH: &str = "Images/tiles.jpg";
pub const HEIGHT_MAP_FRAME_DIR: &str = "Images/waves5";
pub const HEIGHT_MAP_FRAME_COUNT: usize = 200;

// World-mode orbit camera
pub const ORBIT_FOV_DEGREES: f32 = 40.0;
pub const ORBIT_DISTANCE: f32 = 250.0;
pub const ORBIT_PITCH: f32 = 0.2;
pub const ORBIT_YAW: f32 = 0.4;
pub const ORBIT_NEAR: f32 = 1.0;
pub const ORBIT_FAR: f32 = 1000.0;

// Track control points
pub const CONTROL_POINT_HALF_SIZE: f32 = 2.5;
