use bevy::input::mouse::MouseButton;
use bevy::prelude::*;
use bevy::window::{PrimaryWindow, RawHandleWrapperHolder};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use tracing_subscriber::filter::LevelFilter;

use water_view::{
    backend::{DrawCall, MeshHandle, RenderBackend, ShaderProgram, Uniform},
    camera::{CameraMode, CameraView},
    camera_controller::{orbit_camera_system, OrbitCamera},
    constants::{
        CONTROL_POINT_HALF_SIZE, DEFAULT_AMPLITUDE, DEFAULT_WAVELENGTH, HEIGHT_MAP_FRAME_COUNT, ORBIT_FAR,
        ORBIT_FOV_DEGREES, ORBIT_NEAR,
    },
    draw::WaveParams,
    error::RenderResult,
    fps_logger::FpsLogger,
    geometry,
    picking::cursor_ray,
    resources::ViewConfig,
    scene::{planar_shadow, AudioListener, ObjectPass, SceneHooks, SceneObjects},
    setup_bevy_app,
    simulation::WaterTechnique,
    track::ControlPoints,
    view::{FrameContext, WaterView},
    vulkan_backend::VulkanBackend,
};

const UNSELECTED_COLOR: [u8; 3] = [240, 60, 60];
const SELECTED_COLOR: [u8; 3] = [240, 240, 30];
const SHADOW_COLOR: Vec3 = Vec3::splat(0.1);
// Keeps flattened shadows in front of the floor tiles.
const SHADOW_LIFT: f32 = 0.5;
const AMPLITUDE_STEP: f32 = 0.1;
const WAVELENGTH_STEP: f32 = 0.5;
const MIN_WAVELENGTH: f32 = 0.5;
const TRAIN_SPEED: f32 = 0.25;
const TRAIN_EYE_HEIGHT: f32 = 5.0;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let mut app = setup_bevy_app();

    app.insert_resource(WaterControls::default())
        .insert_resource(TrackPoints::default())
        .insert_resource(Listener::default())
        .insert_resource(OrbitCamera::default())
        .add_systems(PostStartup, setup_water_view)
        .add_systems(
            Update,
            (
                handle_keyboard,
                orbit_camera_system.run_if(world_camera_active),
                handle_mouse,
                render_frame,
            )
                .chain()
                .run_if(resource_exists::<WaterContext>),
        )
        .run();
}

#[derive(Resource)]
struct WaterContext {
    backend: Arc<Mutex<Option<VulkanBackend>>>,
    view: WaterView,
}

/// Live parameters, changed from the keyboard and read every frame.
#[derive(Resource, Clone, Copy, Debug)]
struct WaterControls {
    amplitude: f32,
    wavelength: f32,
    technique: WaterTechnique,
    camera_mode: CameraMode,
    height_map_frame: usize,
}

impl Default for WaterControls {
    fn default() -> Self {
        Self {
            amplitude: DEFAULT_AMPLITUDE,
            wavelength: DEFAULT_WAVELENGTH,
            technique: WaterTechnique::default(),
            camera_mode: CameraMode::default(),
            height_map_frame: 0,
        }
    }
}

impl WaterControls {
    fn wave_params(&self) -> WaveParams {
        WaveParams {
            amplitude: self.amplitude,
            wavelength: self.wavelength,
            height_map_frame: self.height_map_frame,
        }
    }
}

/// Track control points, drawn as small cubes with floor shadows.
#[derive(Resource, Default)]
struct TrackPoints {
    points: ControlPoints,
    cube: Option<MeshHandle>,
    floor_height: f32,
}

impl TrackPoints {
    fn selected_point(&self) -> Option<Vec3> {
        self.points.selected_point()
    }

    /// Rides the closed control-point loop at a constant rate per segment.
    fn train_camera(&self, time: f32, aspect: f32) -> Option<CameraView> {
        let points = self.points.points();
        let n = points.len();
        if n < 2 {
            return None;
        }
        let u = time * TRAIN_SPEED;
        let i = u.floor() as usize % n;
        let (from, to) = (points[i], points[(i + 1) % n]);

        let eye = from.lerp(to, u.fract()) + Vec3::Y * TRAIN_EYE_HEIGHT;
        let forward = (to - from).try_normalize().unwrap_or(Vec3::NEG_Z);
        let view = Mat4::look_at_rh(eye, eye + forward, Vec3::Y);
        let projection =
            Mat4::perspective_rh_gl(ORBIT_FOV_DEGREES.to_radians(), aspect, ORBIT_NEAR, ORBIT_FAR);
        Some(CameraView::new(view, projection))
    }
}

fn color_from_bytes(rgb: [u8; 3]) -> Vec3 {
    Vec3::new(rgb[0] as f32, rgb[1] as f32, rgb[2] as f32) / 255.0
}

impl SceneObjects for TrackPoints {
    fn draw(&mut self, backend: &mut dyn RenderBackend, pass: &ObjectPass) -> RenderResult<()> {
        let Some(cube) = self.cube else {
            return Ok(());
        };

        let key_light = pass.lights.lights[0].direction;
        let flatten = if pass.shadows {
            match planar_shadow(key_light, self.floor_height + SHADOW_LIFT) {
                Some(m) => Some(m),
                None => return Ok(()),
            }
        } else {
            None
        };

        let selected = self.points.selected();
        for (i, point) in self.points.points().iter().enumerate() {
            let model = Mat4::from_translation(*point) * Mat4::from_scale(Vec3::splat(CONTROL_POINT_HALF_SIZE));

            let (model, color) = match flatten {
                Some(flatten) => (flatten * model, SHADOW_COLOR),
                None => {
                    let base = if Some(i) == selected { SELECTED_COLOR } else { UNSELECTED_COLOR };
                    (model, pass.lights.shade(color_from_bytes(base), Vec3::Y))
                }
            };

            let call = DrawCall::new(ShaderProgram::Objects, cube)
                .uniform(Uniform::View, pass.camera.view)
                .uniform(Uniform::Projection, pass.camera.projection)
                .uniform(Uniform::Model, model)
                .uniform(Uniform::Color, color)
                .uniform(Uniform::Plane, pass.plane.0);
            backend.draw(&call)?;
        }

        Ok(())
    }
}

/// Stand-in for the audio engine: remembers where the listener is.
#[derive(Resource, Default)]
struct Listener {
    position: Vec3,
}

impl AudioListener for Listener {
    fn set_listener_position(&mut self, position: Vec3) {
        if position != self.position {
            trace!("Listener moved to {:?}", position);
            self.position = position;
        }
    }
}

fn world_camera_active(controls: Res<WaterControls>) -> bool {
    controls.camera_mode == CameraMode::World
}

fn setup_water_view(
    mut commands: Commands,
    windows: Query<(Entity, &RawHandleWrapperHolder, &Window), With<PrimaryWindow>>,
    mut track: ResMut<TrackPoints>,
    mut exit: EventWriter<AppExit>,
) {
    let Ok((_entity, handle_wrapper, window)) = windows.single() else {
        error!("No primary window to render into");
        exit.write(AppExit::error());
        return;
    };

    let config = ViewConfig::default();
    track.floor_height = config.source_pos.y - config.model_scale;

    match create_water_context(handle_wrapper, window, config) {
        Ok((backend, view, cube)) => {
            track.cube = Some(cube);
            info!(
                "Water view ready: {} height-map frames, water at y = {}",
                view.resources().height_map_frames.len(),
                view.config().water_height()
            );
            commands.insert_resource(WaterContext {
                backend: Arc::new(Mutex::new(Some(backend))),
                view,
            });
        }
        Err(e) => {
            error!("Failed to create water view: {:#}", e);
            exit.write(AppExit::error());
        }
    }
}

fn create_water_context(
    handle_wrapper: &RawHandleWrapperHolder,
    window: &Window,
    config: ViewConfig,
) -> anyhow::Result<(VulkanBackend, WaterView, MeshHandle)> {
    let (display_handle, window_handle) = {
        let raw_handle = handle_wrapper
            .0
            .lock()
            .map_err(|_| anyhow!("window handle lock poisoned"))?;
        let raw_handle_ref = raw_handle.as_ref().context("window handle not available")?;
        (raw_handle_ref.get_display_handle(), raw_handle_ref.get_window_handle())
    };

    let size = (window.physical_width(), window.physical_height());
    let mut backend = VulkanBackend::new(display_handle, window_handle, size, &config)
        .context("creating Vulkan backend")?;
    let view = WaterView::load(&mut backend, config).context("uploading scene resources")?;
    let cube = backend
        .create_mesh(&geometry::solid_cube())
        .context("uploading control point mesh")?;

    Ok((backend, view, cube))
}

fn handle_keyboard(
    keys: Res<ButtonInput<KeyCode>>,
    mut controls: ResMut<WaterControls>,
    mut track: ResMut<TrackPoints>,
) {
    let technique = if keys.just_pressed(KeyCode::Digit1) {
        Some(WaterTechnique::Procedural)
    } else if keys.just_pressed(KeyCode::Digit2) {
        Some(WaterTechnique::HeightMap)
    } else if keys.just_pressed(KeyCode::Digit0) {
        Some(WaterTechnique::None)
    } else {
        None
    };
    if let Some(technique) = technique {
        controls.technique = technique;
        info!("Water technique: {}", technique.label());
    }

    if keys.just_pressed(KeyCode::ArrowUp) {
        controls.amplitude += AMPLITUDE_STEP;
        info!("Amplitude: {:.2}", controls.amplitude);
    }
    if keys.just_pressed(KeyCode::ArrowDown) {
        controls.amplitude = (controls.amplitude - AMPLITUDE_STEP).max(0.0);
        info!("Amplitude: {:.2}", controls.amplitude);
    }
    if keys.just_pressed(KeyCode::ArrowRight) {
        controls.wavelength += WAVELENGTH_STEP;
        info!("Wavelength: {:.2}", controls.wavelength);
    }
    if keys.just_pressed(KeyCode::ArrowLeft) {
        controls.wavelength = (controls.wavelength - WAVELENGTH_STEP).max(MIN_WAVELENGTH);
        info!("Wavelength: {:.2}", controls.wavelength);
    }

    if keys.just_pressed(KeyCode::KeyC) {
        controls.camera_mode = controls.camera_mode.next();
        info!("Camera: {:?}", controls.camera_mode);
    }

    if keys.just_pressed(KeyCode::Tab) {
        track.points.select_next();
    }
    if keys.just_pressed(KeyCode::Escape) {
        track.points.clear_selection();
    }
    if keys.just_pressed(KeyCode::KeyP) {
        match track.points.selected().zip(track.selected_point()) {
            Some((i, p)) => info!("Selected({}) ({} {} {})", i, p.x, p.y, p.z),
            None => info!("Nothing Selected"),
        }
    }
}

fn frame_context(
    controls: &WaterControls,
    orbit: &OrbitCamera,
    track: &TrackPoints,
    time: f32,
    aspect: f32,
) -> FrameContext {
    let camera = match controls.camera_mode {
        CameraMode::Train => track
            .train_camera(time, aspect)
            .unwrap_or_else(|| orbit.to_camera_view(aspect)),
        CameraMode::World | CameraMode::Top => orbit.to_camera_view(aspect),
    };

    FrameContext {
        camera,
        mode: controls.camera_mode,
        aspect,
        technique: controls.technique,
        params: controls.wave_params(),
        selected_point: track.selected_point(),
    }
}

/// Left click picks a control point and left drag moves it, vertically
/// while Ctrl is held. Shift + left click drops a ripple on the water.
fn handle_mouse(
    mut context: ResMut<WaterContext>,
    mouse_button_input: Res<ButtonInput<MouseButton>>,
    keys: Res<ButtonInput<KeyCode>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    controls: Res<WaterControls>,
    orbit: Res<OrbitCamera>,
    mut track: ResMut<TrackPoints>,
    mut dragging_point: Local<bool>,
) {
    if mouse_button_input.just_released(MouseButton::Left) {
        *dragging_point = false;
    }
    let pressed = mouse_button_input.just_pressed(MouseButton::Left);
    if !pressed && !*dragging_point {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor) = window.physical_cursor_position() else {
        return;
    };

    let viewport = Vec2::new(window.physical_width() as f32, window.physical_height() as f32);
    let aspect = viewport.x / viewport.y.max(1.0);
    let frame = frame_context(&controls, &orbit, &track, context.view.state().time, aspect);
    let camera = frame.screen_camera();

    if pressed && keys.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]) {
        add_ripple(&mut context, &camera, cursor, viewport.y);
        return;
    }

    let Some(ray) = cursor_ray(&camera, cursor, viewport) else {
        return;
    };
    if pressed {
        *dragging_point = track.points.pick(&ray).is_some();
    } else {
        let vertical = keys.any_pressed([KeyCode::ControlLeft, KeyCode::ControlRight]);
        if track.points.drag_selected(&ray, vertical) {
            trace!("Control point moved to {:?}", track.selected_point());
        }
    }
}

fn add_ripple(context: &mut WaterContext, camera: &CameraView, cursor: Vec2, window_height: f32) {
    let WaterContext { backend, view } = context;
    let Ok(mut guard) = backend.lock() else {
        return;
    };
    let Some(backend) = guard.as_mut() else {
        return;
    };

    match view.add_default_drop(backend, camera, cursor, window_height) {
        Ok(Some(id)) => debug!("Added ripple {:?}", id),
        Ok(None) => {}
        Err(e) => warn!("Pick failed: {}", e),
    }
}

fn render_frame(
    mut context: ResMut<WaterContext>,
    mut controls: ResMut<WaterControls>,
    mut track: ResMut<TrackPoints>,
    mut listener: ResMut<Listener>,
    orbit: Res<OrbitCamera>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut fps_logger: Local<FpsLogger>,
    time: Res<Time>,
) {
    fps_logger.update(&time);

    let Ok(window) = windows.single() else {
        return;
    };
    let (width, height) = (window.physical_width(), window.physical_height());

    let WaterContext { backend, view } = &mut *context;
    let Ok(mut guard) = backend.lock() else {
        return;
    };
    let Some(backend) = guard.as_mut() else {
        return;
    };

    if backend.surface_size() != (width, height) {
        backend.resize(width, height);
    }

    view.advance(time.delta_secs());
    controls.height_map_frame = (controls.height_map_frame + 1) % HEIGHT_MAP_FRAME_COUNT;

    let aspect = width as f32 / height.max(1) as f32;
    let frame = frame_context(&controls, &orbit, &track, view.state().time, aspect);

    let mut hooks = SceneHooks {
        objects: Some(&mut *track),
        listener: Some(&mut *listener),
    };

    if let Err(e) = view.render_frame(backend, &frame, &mut hooks) {
        error!("Frame failed: {}", e);
    }
}
