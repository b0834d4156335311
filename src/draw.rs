//! One routine per surface. Each builds its draw calls from the pass state
//! and submits them; none of them mutate the simulation.

use bevy::math::{Mat4, Vec2, Vec3};

use crate::backend::{DepthFunc, DrawCall, RenderBackend, Sampler, ShaderProgram, Uniform};
use crate::camera::CameraView;
use crate::constants::{PROCEDURAL_WAVE_SPEED_UNIFORM, WATER_COLOR, WATER_LIGHT_COLOR, WATER_LIGHT_POSITION};
use crate::error::RenderResult;
use crate::math::{strip_translation, ClipPlane};
use crate::resources::SceneResources;
use crate::simulation::SimulationState;

/// Live water parameters, read from the host every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveParams {
    pub amplitude: f32,
    pub wavelength: f32,
    pub height_map_frame: usize,
}

/// State shared by every draw in one scene pass.
#[derive(Clone, Copy, Debug)]
pub struct SurfacePass<'a> {
    pub camera: CameraView,
    pub plane: ClipPlane,
    pub model: Mat4,
    pub state: &'a SimulationState,
    pub params: WaveParams,
}

pub fn draw_skybox(
    backend: &mut dyn RenderBackend,
    resources: &SceneResources,
    pass: &SurfacePass,
) -> RenderResult<()> {
    let call = DrawCall::new(ShaderProgram::Skybox, resources.skybox_mesh)
        .uniform(Uniform::View, strip_translation(&pass.camera.view))
        .uniform(Uniform::Projection, pass.camera.projection)
        .sampler(Sampler::Skybox, resources.skybox)
        .depth(DepthFunc::LessOrEqual);
    backend.draw(&call)
}

pub fn draw_tiles(
    backend: &mut dyn RenderBackend,
    resources: &SceneResources,
    pass: &SurfacePass,
) -> RenderResult<()> {
    let call = DrawCall::new(ShaderProgram::Tiles, resources.room_mesh)
        .uniform(Uniform::Model, pass.model)
        .uniform(Uniform::Color, Vec3::from(WATER_COLOR))
        .uniform(Uniform::Plane, pass.plane.0)
        .optional_sampler(Sampler::Texture, resources.tiles);
    backend.draw(&call)
}

/// Sine-wave water. Receives no clip plane; it is only drawn in the final
/// pass, where it samples the reflection and refraction targets.
pub fn draw_procedural_wave(
    backend: &mut dyn RenderBackend,
    resources: &SceneResources,
    pass: &SurfacePass,
) -> RenderResult<()> {
    let mut call = DrawCall::new(ShaderProgram::ProceduralWave, resources.wave_mesh)
        .uniform(Uniform::Model, pass.model)
        .uniform(Uniform::Color, Vec3::from(WATER_COLOR))
        .uniform(Uniform::Amplitude, pass.params.amplitude)
        .uniform(Uniform::Wavelength, pass.params.wavelength)
        .uniform(Uniform::Speed, PROCEDURAL_WAVE_SPEED_UNIFORM)
        .uniform(Uniform::Time, pass.state.time)
        .uniform(Uniform::MoveFactor, pass.state.move_factor)
        .uniform(Uniform::LightColor, Vec3::from(WATER_LIGHT_COLOR))
        .uniform(Uniform::LightPosition, Vec3::from(WATER_LIGHT_POSITION))
        .sampler(Sampler::Skybox, resources.skybox)
        .optional_sampler(Sampler::Tiles, resources.tiles)
        .optional_sampler(Sampler::ReflectionTexture, resources.reflection)
        .optional_sampler(Sampler::RefractionTexture, resources.refraction)
        .blended();

    // skipped for a singular view
    if let Some(position) = pass.camera.position() {
        call.set_uniform(Uniform::CameraPos, position);
    }

    backend.draw(&call)
}

/// Height-map water: one base draw, then one more per live ripple.
pub fn draw_height_map_wave(
    backend: &mut dyn RenderBackend,
    resources: &SceneResources,
    pass: &SurfacePass,
) -> RenderResult<()> {
    let mut base = DrawCall::new(ShaderProgram::HeightMapWave, resources.wave_mesh)
        .uniform(Uniform::Model, pass.model)
        .uniform(Uniform::Color, Vec3::from(WATER_COLOR))
        .uniform(Uniform::Plane, pass.plane.0)
        .uniform(Uniform::Amplitude, pass.params.amplitude)
        .uniform(Uniform::Wavelength, pass.params.wavelength)
        .uniform(Uniform::Time, pass.state.time)
        .uniform(Uniform::DropPoint, Vec2::ZERO)
        .uniform(Uniform::DropTime, 0.0f32)
        .uniform(Uniform::InteractiveRadius, 0.0f32)
        .optional_sampler(Sampler::Texture, resources.height_map_frame(pass.params.height_map_frame))
        .optional_sampler(Sampler::Tiles, resources.tiles)
        .sampler(Sampler::Skybox, resources.skybox)
        .blended();

    if let Some(position) = pass.camera.position() {
        base.set_uniform(Uniform::Camera, position);
    }

    backend.draw(&base)?;

    let now = pass.state.time;
    for drop in pass.state.drops.active_at(now) {
        let mut ripple = base.clone();
        ripple.set_uniform(Uniform::DropPoint, drop.origin);
        ripple.set_uniform(Uniform::DropTime, drop.time);
        ripple.set_uniform(Uniform::InteractiveRadius, drop.radius);
        backend.draw(&ripple)?;
    }

    Ok(())
}

/// Pass-through surface that writes its UV for readback.
pub fn draw_pick_surface(
    backend: &mut dyn RenderBackend,
    resources: &SceneResources,
    camera: &CameraView,
    model: Mat4,
) -> RenderResult<()> {
    let call = DrawCall::new(ShaderProgram::Pick, resources.wave_mesh)
        .uniform(Uniform::View, camera.view)
        .uniform(Uniform::Projection, camera.projection)
        .uniform(Uniform::Model, model);
    backend.draw(&call)
}
