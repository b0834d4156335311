//! Frame orchestration: the reflection, refraction and final passes, and the
//! pick pass behind ripple creation.

use bevy::log::{debug, trace};
use bevy::math::{Vec2, Vec3};

use crate::backend::{ClearValues, RenderBackend, RenderTarget};
use crate::camera::{CameraMode, CameraView};
use crate::draw::{self, SurfacePass, WaveParams};
use crate::drops::{decode_pick, flip_cursor_y, DropId};
use crate::error::RenderResult;
use crate::math::ClipPlane;
use crate::resources::{SceneResources, ViewConfig};
use crate::scene::{LightRig, ObjectPass, SceneHooks};
use crate::simulation::{SimulationState, WaterTechnique};

/// The three scene renders of a frame, in submission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScenePass {
    /// Above-water content seen through the mirrored camera.
    Reflection,
    /// Below-water content.
    Refraction,
    /// The visible image, unclipped.
    Final,
}

impl ScenePass {
    pub const ORDER: [ScenePass; 3] = [ScenePass::Reflection, ScenePass::Refraction, ScenePass::Final];

    pub fn target(&self) -> RenderTarget {
        match self {
            ScenePass::Reflection => RenderTarget::Reflection,
            ScenePass::Refraction => RenderTarget::Refraction,
            ScenePass::Final => RenderTarget::Screen,
        }
    }

    /// The final pass runs with clipping disabled, so its plane is inert.
    pub fn plane(&self, water_height: f32) -> ClipPlane {
        match self {
            ScenePass::Reflection => ClipPlane::above(water_height),
            ScenePass::Refraction | ScenePass::Final => ClipPlane::below(water_height),
        }
    }

    pub fn is_reflection(&self) -> bool {
        matches!(self, ScenePass::Reflection)
    }

    pub fn clipped(&self) -> bool {
        !matches!(self, ScenePass::Final)
    }
}

/// Host state read once per frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    /// The host's camera, used in World and Train modes.
    pub camera: CameraView,
    pub mode: CameraMode,
    /// Surface width over height.
    pub aspect: f32,
    pub technique: WaterTechnique,
    pub params: WaveParams,
    pub selected_point: Option<Vec3>,
}

impl FrameContext {
    /// The camera the final pass renders with.
    pub fn screen_camera(&self) -> CameraView {
        CameraView::for_mode(self.mode, &self.camera, self.aspect)
    }
}

pub struct WaterView {
    resources: SceneResources,
    config: ViewConfig,
    state: SimulationState,
}

impl WaterView {
    pub fn new(resources: SceneResources, config: ViewConfig) -> Self {
        Self {
            resources,
            config,
            state: SimulationState::default(),
        }
    }

    /// Loads every image and uploads all meshes and textures.
    pub fn load(backend: &mut dyn RenderBackend, config: ViewConfig) -> RenderResult<Self> {
        let resources = SceneResources::load(backend, &config)?;
        Ok(Self::new(resources, config))
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn resources(&self) -> &SceneResources {
        &self.resources
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Moves simulation time forward. Call once per frame, before rendering.
    pub fn advance(&mut self, dt: f32) {
        self.state.advance(dt);
    }

    /// Renders one frame. Returns `Ok(false)` when the backend skipped it.
    pub fn render_frame(
        &mut self,
        backend: &mut dyn RenderBackend,
        frame: &FrameContext,
        hooks: &mut SceneHooks,
    ) -> RenderResult<bool> {
        let expired = self.state.expire_drops();
        if expired > 0 {
            debug!("Expired {} ripples, {} left", expired, self.state.drops.len());
        }

        if !backend.begin_frame()? {
            return Ok(false);
        }

        let drawn = self.render_passes(backend, frame, hooks);
        let ended = backend.end_frame();
        drawn?;
        ended?;
        Ok(true)
    }

    fn render_passes(
        &self,
        backend: &mut dyn RenderBackend,
        frame: &FrameContext,
        hooks: &mut SceneHooks,
    ) -> RenderResult<()> {
        backend.set_clip_enabled(true);
        for pass in ScenePass::ORDER {
            if !pass.clipped() {
                backend.set_clip_enabled(false);
            }
            trace!("Scene pass {:?}", pass);
            backend.begin_pass(pass.target())?;
            let drawn = self.draw_scene(backend, frame, pass, hooks);
            let ended = backend.end_pass();
            drawn?;
            ended?;
        }
        Ok(())
    }

    fn draw_scene(
        &self,
        backend: &mut dyn RenderBackend,
        frame: &FrameContext,
        pass: ScenePass,
        hooks: &mut SceneHooks,
    ) -> RenderResult<()> {
        backend.clear(&ClearValues::scene())?;

        let water_height = self.config.water_height();
        let screen = frame.screen_camera();
        let camera = if pass.is_reflection() {
            screen.mirrored(water_height)
        } else {
            screen
        };
        let plane = pass.plane(water_height);
        let lights = LightRig::for_mode(frame.mode);

        if let Some(listener) = hooks.listener.as_deref_mut() {
            listener.set_listener_position(frame.selected_point.unwrap_or(self.config.source_pos));
        }

        if frame.mode != CameraMode::Train {
            if let Some(objects) = hooks.objects.as_deref_mut() {
                let mut object_pass = ObjectPass {
                    camera,
                    lights,
                    plane,
                    shadows: false,
                    reflection: pass.is_reflection(),
                };
                objects.draw(backend, &object_pass)?;
                if frame.mode != CameraMode::Top {
                    object_pass.shadows = true;
                    objects.draw(backend, &object_pass)?;
                }
            }
        }

        backend.set_shared_matrices(&camera.projection, &camera.view);

        let surface = SurfacePass {
            camera,
            plane,
            model: self.config.surface_model(),
            state: &self.state,
            params: frame.params,
        };

        draw::draw_tiles(backend, &self.resources, &surface)?;

        match frame.technique {
            WaterTechnique::Procedural if pass == ScenePass::Final => {
                draw::draw_procedural_wave(backend, &self.resources, &surface)?
            }
            WaterTechnique::HeightMap => draw::draw_height_map_wave(backend, &self.resources, &surface)?,
            _ => {}
        }

        draw::draw_skybox(backend, &self.resources, &surface)
    }

    /// Renders the pick pass with `camera` and reads the surface coordinate
    /// under `cursor` (top-left origin). A hit adds a ripple at the current
    /// time; a miss returns `Ok(None)`.
    pub fn add_drop(
        &mut self,
        backend: &mut dyn RenderBackend,
        camera: &CameraView,
        cursor: Vec2,
        window_height: f32,
        radius: f32,
        keep_time: f32,
    ) -> RenderResult<Option<DropId>> {
        backend.begin_pass(RenderTarget::Pick)?;
        let drawn = match backend.clear(&ClearValues::pick()) {
            Ok(()) => draw::draw_pick_surface(backend, &self.resources, camera, self.config.pick_model()),
            Err(e) => Err(e),
        };
        let ended = backend.end_pass();
        drawn?;
        ended?;

        let (x, y) = flip_cursor_y(cursor, window_height);
        let texel = backend.read_pixel(RenderTarget::Pick, x, y)?;

        match decode_pick(texel) {
            Some(origin) => {
                let id = self.state.drops.push(origin, self.state.time, radius, keep_time);
                debug!("Ripple {:?} at {:?}, t = {:.2}", id, origin, self.state.time);
                Ok(Some(id))
            }
            None => {
                trace!("Pick at ({}, {}) missed the water", x, y);
                Ok(None)
            }
        }
    }

    /// `add_drop` with the configured radius and keep time.
    pub fn add_default_drop(
        &mut self,
        backend: &mut dyn RenderBackend,
        camera: &CameraView,
        cursor: Vec2,
        window_height: f32,
    ) -> RenderResult<Option<DropId>> {
        let (radius, keep_time) = (self.config.drop_radius, self.config.drop_keep_time);
        self.add_drop(backend, camera, cursor, window_height, radius, keep_time)
    }
}
