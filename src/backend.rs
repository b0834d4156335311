//! The seam between the render core and a graphics API.
//!
//! Uniform and sampler names are the wire format shared with the shaders;
//! `as_str` returns exactly the identifier the GLSL sources declare.

use bevy::math::{Mat4, Vec2, Vec3, Vec4};

use crate::constants::{CLEAR_COLOR_PICK, CLEAR_COLOR_SCENE, DEPTH_CLEAR_VALUE, STENCIL_CLEAR_VALUE};
use crate::error::RenderResult;
use crate::mesh::MeshData;
use crate::texture::{CubemapData, TextureData};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Where a pass writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Screen,
    Reflection,
    Refraction,
    Pick,
}

impl RenderTarget {
    pub fn is_offscreen(&self) -> bool {
        !matches!(self, RenderTarget::Screen)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    Skybox,
    Tiles,
    ProceduralWave,
    HeightMapWave,
    Pick,
    Objects,
}

impl ShaderProgram {
    pub const ALL: [ShaderProgram; 6] = [
        ShaderProgram::Skybox,
        ShaderProgram::Tiles,
        ShaderProgram::ProceduralWave,
        ShaderProgram::HeightMapWave,
        ShaderProgram::Pick,
        ShaderProgram::Objects,
    ];

    /// File stem of the `.vert`/`.frag` pair in the shader directory.
    pub fn shader_stem(&self) -> &'static str {
        match self {
            ShaderProgram::Skybox => "skybox",
            ShaderProgram::Tiles => "tiles",
            ShaderProgram::ProceduralWave => "sine_wave",
            ShaderProgram::HeightMapWave => "height_map",
            ShaderProgram::Pick => "pick",
            ShaderProgram::Objects => "objects",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Uniform {
    View,
    Projection,
    Model,
    Color,
    Plane,
    Amplitude,
    Wavelength,
    Time,
    Speed,
    MoveFactor,
    CameraPos,
    Camera,
    LightColor,
    LightPosition,
    DropPoint,
    DropTime,
    InteractiveRadius,
}

impl Uniform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Uniform::View => "view",
            Uniform::Projection => "projection",
            Uniform::Model => "u_model",
            Uniform::Color => "u_color",
            Uniform::Plane => "plane",
            Uniform::Amplitude => "amplitude",
            Uniform::Wavelength => "wavelength",
            Uniform::Time => "time",
            Uniform::Speed => "speed",
            Uniform::MoveFactor => "moveFactor",
            Uniform::CameraPos => "cameraPos",
            Uniform::Camera => "camera",
            Uniform::LightColor => "lightColor",
            Uniform::LightPosition => "lightPosition",
            Uniform::DropPoint => "dropPoint",
            Uniform::DropTime => "dropTime",
            Uniform::InteractiveRadius => "interactiveRadius",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

/// Named texture slots. Several are reserved for water shading and only
/// bound by some techniques.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sampler {
    Texture,
    Skybox,
    Tiles,
    ReflectionTexture,
    RefractionTexture,
    DepthMap,
    DudvMap,
    NormalMap,
}

impl Sampler {
    pub const ALL: [Sampler; 8] = [
        Sampler::Texture,
        Sampler::Skybox,
        Sampler::Tiles,
        Sampler::ReflectionTexture,
        Sampler::RefractionTexture,
        Sampler::DepthMap,
        Sampler::DudvMap,
        Sampler::NormalMap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sampler::Texture => "u_texture",
            Sampler::Skybox => "skybox",
            Sampler::Tiles => "tiles",
            Sampler::ReflectionTexture => "reflectionTexture",
            Sampler::RefractionTexture => "refractionTexture",
            Sampler::DepthMap => "depthMap",
            Sampler::DudvMap => "dudvMap",
            Sampler::NormalMap => "normalMap",
        }
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, Sampler::Skybox)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    #[default]
    Less,
    /// Lets geometry pushed to the far plane pass against a cleared buffer.
    LessOrEqual,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl ClearValues {
    pub fn scene() -> Self {
        Self {
            color: CLEAR_COLOR_SCENE,
            depth: DEPTH_CLEAR_VALUE,
            stencil: STENCIL_CLEAR_VALUE,
        }
    }

    pub fn pick() -> Self {
        Self {
            color: CLEAR_COLOR_PICK,
            depth: DEPTH_CLEAR_VALUE,
            stencil: STENCIL_CLEAR_VALUE,
        }
    }
}

/// One indexed draw of a whole mesh with its full pipeline state.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub program: ShaderProgram,
    pub mesh: MeshHandle,
    pub uniforms: Vec<(Uniform, UniformValue)>,
    pub samplers: Vec<(Sampler, TextureHandle)>,
    pub depth: DepthFunc,
    pub blend: bool,
}

impl DrawCall {
    pub fn new(program: ShaderProgram, mesh: MeshHandle) -> Self {
        Self {
            program,
            mesh,
            uniforms: Vec::new(),
            samplers: Vec::new(),
            depth: DepthFunc::Less,
            blend: false,
        }
    }

    /// Sets a uniform, replacing an earlier value with the same name.
    pub fn uniform(mut self, name: Uniform, value: impl Into<UniformValue>) -> Self {
        self.set_uniform(name, value);
        self
    }

    pub fn set_uniform(&mut self, name: Uniform, value: impl Into<UniformValue>) {
        let value = value.into();
        match self.uniforms.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.uniforms.push((name, value)),
        }
    }

    pub fn sampler(mut self, name: Sampler, texture: TextureHandle) -> Self {
        self.samplers.retain(|(n, _)| *n != name);
        self.samplers.push((name, texture));
        self
    }

    /// Binds `texture` when present; an unset slot leaves the sampler unbound.
    pub fn optional_sampler(self, name: Sampler, texture: Option<TextureHandle>) -> Self {
        match texture {
            Some(texture) => self.sampler(name, texture),
            None => self,
        }
    }

    pub fn depth(mut self, depth: DepthFunc) -> Self {
        self.depth = depth;
        self
    }

    pub fn blended(mut self) -> Self {
        self.blend = true;
        self
    }

    pub fn uniform_value(&self, name: Uniform) -> Option<UniformValue> {
        self.uniforms.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn sampler_texture(&self, name: Sampler) -> Option<TextureHandle> {
        self.samplers.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }
}

/// Everything the render core needs from a graphics API.
///
/// Calls arrive on the thread that owns the context. Pass state follows GL
/// conventions: projections map depth to [-1, 1] and pixel rows for
/// `read_pixel` count from the bottom.
pub trait RenderBackend {
    fn create_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle>;
    fn create_texture(&mut self, texture: &TextureData) -> RenderResult<TextureHandle>;
    fn create_cubemap(&mut self, cubemap: &CubemapData) -> RenderResult<TextureHandle>;

    /// Color attachment of an offscreen target, for sampling in later passes.
    fn target_texture(&self, target: RenderTarget) -> Option<TextureHandle>;

    /// Size of the on-screen surface in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Starts a frame. `Ok(false)` means the frame should be skipped.
    fn begin_frame(&mut self) -> RenderResult<bool>;
    fn end_frame(&mut self) -> RenderResult<()>;

    /// Redirects output to `target` until `end_pass`. The pick target may be
    /// used outside a frame.
    fn begin_pass(&mut self, target: RenderTarget) -> RenderResult<()>;
    fn end_pass(&mut self) -> RenderResult<()>;

    fn clear(&mut self, values: &ClearValues) -> RenderResult<()>;
    fn set_clip_enabled(&mut self, enabled: bool);

    /// The view/projection block shared by every program that does not set
    /// its own `view`/`projection` uniforms.
    fn set_shared_matrices(&mut self, projection: &Mat4, view: &Mat4);

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()>;

    /// Reads one texel, bottom-left origin.
    fn read_pixel(&mut self, target: RenderTarget, x: u32, y: u32) -> RenderResult<[f32; 4]>;
}
