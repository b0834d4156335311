#![allow(dead_code)]

use bevy::math::{Mat4, Vec3};

use water_view::backend::{
    ClearValues, DrawCall, MeshHandle, RenderBackend, RenderTarget, ShaderProgram, TextureHandle,
};
use water_view::camera::{CameraMode, CameraView};
use water_view::draw::WaveParams;
use water_view::error::{RenderError, RenderResult};
use water_view::geometry::GridSpec;
use water_view::mesh::MeshData;
use water_view::resources::{SceneImages, SceneResources, ViewConfig};
use water_view::scene::{AudioListener, ObjectPass, SceneObjects};
use water_view::simulation::WaterTechnique;
use water_view::texture::{CubemapData, TextureData};
use water_view::view::{FrameContext, WaterView};

pub const REFLECTION_TEXTURE: TextureHandle = TextureHandle(0);
pub const REFRACTION_TEXTURE: TextureHandle = TextureHandle(1);
pub const MISS: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    BeginFrame,
    EndFrame,
    BeginPass(RenderTarget),
    EndPass,
    Clear(ClearValues),
    ClipEnabled(bool),
    SharedMatrices { projection: Mat4, view: Mat4 },
    Draw(DrawCall),
    ReadPixel(RenderTarget, u32, u32),
}

/// Backend that records every call and enforces pass nesting.
pub struct RecordingBackend {
    pub events: Vec<Event>,
    pub pick_texel: [f32; 4],
    pub size: (u32, u32),
    pub skip_frames: bool,
    pub fail_draws_of: Option<ShaderProgram>,
    next_mesh: u32,
    next_texture: u32,
    in_frame: bool,
    pass: Option<RenderTarget>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            pick_texel: MISS,
            size: (800, 600),
            skip_frames: false,
            fail_draws_of: None,
            next_mesh: 0,
            // 0 and 1 belong to the offscreen targets.
            next_texture: 2,
            in_frame: false,
            pass: None,
        }
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn passes(&self) -> Vec<RenderTarget> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::BeginPass(target) => Some(*target),
                _ => None,
            })
            .collect()
    }

    /// Draw calls grouped by the pass they were recorded in.
    pub fn draws_in(&self, target: RenderTarget) -> Vec<DrawCall> {
        let mut current = None;
        let mut draws = Vec::new();
        for event in &self.events {
            match event {
                Event::BeginPass(t) => current = Some(*t),
                Event::EndPass => current = None,
                Event::Draw(call) if current == Some(target) => draws.push(call.clone()),
                _ => {}
            }
        }
        draws
    }

    pub fn programs_in(&self, target: RenderTarget) -> Vec<ShaderProgram> {
        self.draws_in(target).iter().map(|c| c.program).collect()
    }

    /// Clip state in effect when each pass began.
    pub fn clip_at_pass_start(&self) -> Vec<(RenderTarget, bool)> {
        let mut clip = false;
        let mut out = Vec::new();
        for event in &self.events {
            match event {
                Event::ClipEnabled(enabled) => clip = *enabled,
                Event::BeginPass(target) => out.push((*target, clip)),
                _ => {}
            }
        }
        out
    }

    pub fn shared_view_in(&self, target: RenderTarget) -> Option<Mat4> {
        let mut current = None;
        for event in &self.events {
            match event {
                Event::BeginPass(t) => current = Some(*t),
                Event::SharedMatrices { view, .. } if current == Some(target) => return Some(*view),
                _ => {}
            }
        }
        None
    }

    pub fn shared_projection_in(&self, target: RenderTarget) -> Option<Mat4> {
        let mut current = None;
        for event in &self.events {
            match event {
                Event::BeginPass(t) => current = Some(*t),
                Event::SharedMatrices { projection, .. } if current == Some(target) => {
                    return Some(*projection)
                }
                _ => {}
            }
        }
        None
    }
}

impl RenderBackend for RecordingBackend {
    fn create_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle> {
        if !mesh.indices_in_bounds() {
            return Err(RenderError::upload("index out of range"));
        }
        self.next_mesh += 1;
        Ok(MeshHandle(self.next_mesh - 1))
    }

    fn create_texture(&mut self, texture: &TextureData) -> RenderResult<TextureHandle> {
        if !texture.is_valid() {
            return Err(RenderError::upload("bad texture"));
        }
        self.next_texture += 1;
        Ok(TextureHandle(self.next_texture - 1))
    }

    fn create_cubemap(&mut self, _cubemap: &CubemapData) -> RenderResult<TextureHandle> {
        self.next_texture += 1;
        Ok(TextureHandle(self.next_texture - 1))
    }

    fn target_texture(&self, target: RenderTarget) -> Option<TextureHandle> {
        match target {
            RenderTarget::Reflection => Some(REFLECTION_TEXTURE),
            RenderTarget::Refraction => Some(REFRACTION_TEXTURE),
            _ => None,
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn begin_frame(&mut self) -> RenderResult<bool> {
        if self.in_frame {
            return Err(RenderError::device("frame already started"));
        }
        if self.skip_frames {
            return Ok(false);
        }
        self.in_frame = true;
        self.events.push(Event::BeginFrame);
        Ok(true)
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        if !self.in_frame || self.pass.is_some() {
            return Err(RenderError::device("unbalanced end_frame"));
        }
        self.in_frame = false;
        self.events.push(Event::EndFrame);
        Ok(())
    }

    fn begin_pass(&mut self, target: RenderTarget) -> RenderResult<()> {
        if self.pass.is_some() {
            return Err(RenderError::device("pass already open"));
        }
        if !self.in_frame && target != RenderTarget::Pick {
            return Err(RenderError::device("scene pass outside a frame"));
        }
        self.pass = Some(target);
        self.events.push(Event::BeginPass(target));
        Ok(())
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        if self.pass.take().is_none() {
            return Err(RenderError::device("no pass to end"));
        }
        self.events.push(Event::EndPass);
        Ok(())
    }

    fn clear(&mut self, values: &ClearValues) -> RenderResult<()> {
        if self.pass.is_none() {
            return Err(RenderError::device("clear outside a pass"));
        }
        self.events.push(Event::Clear(*values));
        Ok(())
    }

    fn set_clip_enabled(&mut self, enabled: bool) {
        self.events.push(Event::ClipEnabled(enabled));
    }

    fn set_shared_matrices(&mut self, projection: &Mat4, view: &Mat4) {
        self.events.push(Event::SharedMatrices {
            projection: *projection,
            view: *view,
        });
    }

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()> {
        if self.pass.is_none() {
            return Err(RenderError::device("draw outside a pass"));
        }
        if self.fail_draws_of == Some(call.program) {
            return Err(RenderError::shader("forced failure"));
        }
        self.events.push(Event::Draw(call.clone()));
        Ok(())
    }

    fn read_pixel(&mut self, target: RenderTarget, x: u32, y: u32) -> RenderResult<[f32; 4]> {
        if self.pass.is_some() {
            return Err(RenderError::readback("read while recording"));
        }
        self.events.push(Event::ReadPixel(target, x, y));
        Ok(self.pick_texel)
    }
}

/// Records what the scene asked world objects to draw.
#[derive(Default)]
pub struct RecordingObjects {
    pub calls: Vec<ObjectPass>,
}

impl SceneObjects for RecordingObjects {
    fn draw(&mut self, backend: &mut dyn RenderBackend, pass: &ObjectPass) -> RenderResult<()> {
        self.calls.push(*pass);
        backend.draw(&DrawCall::new(ShaderProgram::Objects, MeshHandle(0)))
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub positions: Vec<Vec3>,
}

impl AudioListener for RecordingListener {
    fn set_listener_position(&mut self, position: Vec3) {
        self.positions.push(position);
    }
}

/// A coarse grid keeps the wave mesh small.
pub fn test_config() -> ViewConfig {
    ViewConfig {
        grid: GridSpec {
            cell_size: 0.25,
            ..GridSpec::default()
        },
        height_map_frames: 4,
        ..ViewConfig::default()
    }
}

/// Scene images without touching the filesystem. Frame 2 is missing.
pub fn test_images() -> SceneImages {
    let frame = TextureData::solid([128, 128, 128, 255], 4, 4);
    SceneImages {
        skybox: CubemapData::default(),
        tiles: Some(TextureData::solid([200, 200, 200, 255], 2, 2)),
        height_map_frames: vec![Some(frame.clone()), Some(frame.clone()), None, Some(frame)],
    }
}

pub fn test_view(backend: &mut RecordingBackend) -> WaterView {
    let config = test_config();
    let resources = SceneResources::upload(backend, &config, &test_images()).expect("upload");
    backend.clear_events();
    WaterView::new(resources, config)
}

pub fn host_camera(aspect: f32) -> CameraView {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 150.0, 200.0), Vec3::ZERO, Vec3::Y);
    let projection = Mat4::perspective_rh_gl(40f32.to_radians(), aspect, 1.0, 1000.0);
    CameraView::new(view, projection)
}

pub fn frame(technique: WaterTechnique, mode: CameraMode) -> FrameContext {
    let aspect = 800.0 / 600.0;
    FrameContext {
        camera: host_camera(aspect),
        mode,
        aspect,
        technique,
        params: WaveParams {
            amplitude: 1.0,
            wavelength: 5.0,
            height_map_frame: 0,
        },
        selected_point: None,
    }
}
