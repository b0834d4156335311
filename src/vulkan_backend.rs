//! `RenderBackend` on top of raw Vulkan.
//!
//! Every draw gets its own descriptor set from a per-frame pool and its own
//! slice of a per-frame uniform arena, bound with a dynamic offset. Pipelines
//! are built on first use for each (program, target kind, depth, blend)
//! combination. Projections arrive in GL clip space and are remapped here;
//! the viewport is flipped so image rows run top to bottom like GL's
//! default framebuffer seen from above.

use std::collections::HashMap;
use std::mem;
use std::path::PathBuf;

use ash::vk;
use bevy::log::{debug, info, trace, warn};
use bevy::math::{Mat4, Vec4};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::backend::{
    ClearValues, DepthFunc, DrawCall, MeshHandle, RenderBackend, RenderTarget, Sampler, ShaderProgram,
    TextureHandle, Uniform, UniformValue,
};
use crate::constants::MAX_FRAMES_IN_FLIGHT;
use crate::error::{RenderError, RenderResult};
use crate::mesh::{MeshData, Vertex};
use crate::resources::ViewConfig;
use crate::texture::{CubemapData, Texture, TextureData};
use crate::vulkan_common::*;

/// Upper bound on draws recorded between two submits.
pub const MAX_DRAWS_PER_FRAME: u32 = 2048;

const OFFSCREEN_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const PICK_COLOR_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
const SAMPLER_BINDING_BASE: u32 = 1;

/// Maps GL clip depth [-w, w] to Vulkan's [0, w].
const CLIP_CORRECTION: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 1.0),
);

/// std140 mirror of the `Uniforms` block every shader declares.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuUniforms {
    pub view: [f32; 16],
    pub projection: [f32; 16],
    pub model: [f32; 16],
    pub color: [f32; 4],
    pub plane: [f32; 4],
    pub camera_pos: [f32; 4],
    pub light_color: [f32; 4],
    pub light_position: [f32; 4],
    pub drop_point: [f32; 2],
    pub drop_time: f32,
    pub interactive_radius: f32,
    pub amplitude: f32,
    pub wavelength: f32,
    pub time: f32,
    pub speed: f32,
    pub move_factor: f32,
    pub clip_enabled: f32,
    pub _pad: [f32; 2],
}

/// State that outlives a single draw: the shared matrix block, the clip
/// flag and the last camera position any draw supplied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SharedUniforms {
    pub projection: Mat4,
    pub view: Mat4,
    pub camera_pos: [f32; 4],
    pub clip_enabled: bool,
}

impl Default for SharedUniforms {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            camera_pos: [0.0, 0.0, 0.0, 1.0],
            clip_enabled: false,
        }
    }
}

impl GpuUniforms {
    /// Packs a draw's uniforms over the shared state. Unset fields are
    /// zero, so an unset `plane` never clips; an unset camera position keeps
    /// the last one seen.
    pub fn pack(call: &DrawCall, shared: &SharedUniforms) -> Self {
        let mut out = Self {
            view: shared.view.to_cols_array(),
            projection: shared.projection.to_cols_array(),
            model: Mat4::IDENTITY.to_cols_array(),
            camera_pos: shared.camera_pos,
            clip_enabled: if shared.clip_enabled { 1.0 } else { 0.0 },
            ..<Self as bytemuck::Zeroable>::zeroed()
        };

        for (name, value) in &call.uniforms {
            let value = *value;
            match name {
                Uniform::View => out.view = as_mat4(value).to_cols_array(),
                Uniform::Projection => out.projection = as_mat4(value).to_cols_array(),
                Uniform::Model => out.model = as_mat4(value).to_cols_array(),
                Uniform::Color => out.color = as_vec4(value, 1.0),
                Uniform::Plane => out.plane = as_vec4(value, 0.0),
                Uniform::CameraPos | Uniform::Camera => out.camera_pos = as_vec4(value, 1.0),
                Uniform::LightColor => out.light_color = as_vec4(value, 1.0),
                Uniform::LightPosition => out.light_position = as_vec4(value, 1.0),
                Uniform::DropPoint => {
                    let v = as_vec4(value, 0.0);
                    out.drop_point = [v[0], v[1]];
                }
                Uniform::DropTime => out.drop_time = as_float(value),
                Uniform::InteractiveRadius => out.interactive_radius = as_float(value),
                Uniform::Amplitude => out.amplitude = as_float(value),
                Uniform::Wavelength => out.wavelength = as_float(value),
                Uniform::Time => out.time = as_float(value),
                Uniform::Speed => out.speed = as_float(value),
                Uniform::MoveFactor => out.move_factor = as_float(value),
            }
        }

        let projection = CLIP_CORRECTION * Mat4::from_cols_array(&out.projection);
        out.projection = projection.to_cols_array();
        out
    }
}

fn as_mat4(value: UniformValue) -> Mat4 {
    match value {
        UniformValue::Mat4(m) => m,
        other => {
            warn!("Expected a matrix uniform, got {:?}", other);
            Mat4::IDENTITY
        }
    }
}

fn as_vec4(value: UniformValue, w: f32) -> [f32; 4] {
    match value {
        UniformValue::Float(f) => [f, f, f, w],
        UniformValue::Vec2(v) => [v.x, v.y, 0.0, w],
        UniformValue::Vec3(v) => [v.x, v.y, v.z, w],
        UniformValue::Vec4(v) => v.to_array(),
        UniformValue::Mat4(m) => m.col(0).to_array(),
    }
}

fn as_float(value: UniformValue) -> f32 {
    as_vec4(value, 0.0)[0]
}

/// Image texel for a bottom-left-origin pixel, clamped to the target.
pub fn pick_texel(x: u32, y: u32, extent: vk::Extent2D) -> (u32, u32) {
    let max_x = extent.width.saturating_sub(1);
    let max_y = extent.height.saturating_sub(1);
    (x.min(max_x), max_y - y.min(max_y))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TargetKind {
    Swapchain,
    Offscreen,
    Pick,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ShaderProgram,
    kind: TargetKind,
    depth: DepthFunc,
    blend: bool,
}

struct GpuMesh {
    vertex_buffer: vk::Buffer,
    vertex_memory: vk::DeviceMemory,
    index_buffer: vk::Buffer,
    index_memory: vk::DeviceMemory,
    index_count: u32,
}

enum TextureSlot {
    Owned(Texture),
    Target(RenderTarget),
}

struct TextureEntry {
    slot: TextureSlot,
    cube: bool,
}

struct OffscreenTarget {
    color: Texture,
    depth_image: vk::Image,
    depth_memory: vk::DeviceMemory,
    depth_view: vk::ImageView,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl OffscreenTarget {
    fn create(
        core: &VulkanCore,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        resting_layout: vk::ImageLayout,
    ) -> RenderResult<Self> {
        let (image, memory) = create_image(
            &core.instance,
            &core.device,
            core.physical_device,
            extent,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | usage,
            1,
            vk::ImageCreateFlags::empty(),
        )?;
        transition_image_layout(
            &core.device,
            core.command_pool,
            core.graphics_queue,
            image,
            vk::ImageLayout::UNDEFINED,
            resting_layout,
            1,
        )?;
        let view = create_image_view(
            &core.device,
            image,
            format,
            vk::ImageViewType::TYPE_2D,
            vk::ImageAspectFlags::COLOR,
            1,
        )?;
        let (depth_image, depth_memory, depth_view) = create_depth_resources(
            &core.instance,
            &core.device,
            core.physical_device,
            extent,
            core.depth_format,
        )?;
        let framebuffer = create_framebuffer(&core.device, &[view, depth_view], render_pass, extent)?;

        Ok(Self {
            color: Texture { image, memory, view },
            depth_image,
            depth_memory,
            depth_view,
            framebuffer,
            extent,
        })
    }

    fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_framebuffer(self.framebuffer, None) };
        destroy_image(device, self.depth_image, self.depth_memory, self.depth_view);
        self.color.destroy(device);
    }
}

/// Per-submit uniform storage and descriptor pool.
struct FrameArena {
    uniform_buffer: vk::Buffer,
    uniform_memory: vk::DeviceMemory,
    descriptor_pool: vk::DescriptorPool,
    staging: Vec<u8>,
    stride: usize,
    capacity: usize,
}

impl FrameArena {
    fn create(core: &VulkanCore, stride: usize) -> RenderResult<Self> {
        let capacity = stride * MAX_DRAWS_PER_FRAME as usize;
        let (uniform_buffer, uniform_memory) = create_buffer(
            &core.instance,
            &core.device,
            core.physical_device,
            capacity as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: MAX_DRAWS_PER_FRAME,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_DRAWS_PER_FRAME * Sampler::ALL.len() as u32,
            },
        ];
        let descriptor_pool = create_descriptor_pool(&core.device, MAX_DRAWS_PER_FRAME, &pool_sizes)?;

        Ok(Self {
            uniform_buffer,
            uniform_memory,
            descriptor_pool,
            staging: Vec::with_capacity(capacity),
            stride,
            capacity,
        })
    }

    fn reset(&mut self, device: &ash::Device) -> RenderResult<()> {
        self.staging.clear();
        unsafe { device.reset_descriptor_pool(self.descriptor_pool, vk::DescriptorPoolResetFlags::empty())? };
        Ok(())
    }

    /// Appends one uniform block and returns its offset.
    fn push(&mut self, uniforms: &GpuUniforms) -> RenderResult<u32> {
        let offset = self.staging.len();
        if offset + self.stride > self.capacity {
            return Err(RenderError::upload(format!(
                "more than {} draws in one submit",
                MAX_DRAWS_PER_FRAME
            )));
        }
        self.staging.extend_from_slice(bytemuck::bytes_of(uniforms));
        self.staging.resize(offset + self.stride, 0);
        Ok(offset as u32)
    }

    fn flush(&self, device: &ash::Device) -> RenderResult<()> {
        write_host_memory(device, self.uniform_memory, &self.staging)
    }

    fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_descriptor_pool(self.descriptor_pool, None) };
        destroy_buffer(device, self.uniform_buffer, self.uniform_memory);
    }
}

struct ActivePass {
    target: RenderTarget,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    started: bool,
}

struct Recording {
    command_buffer: vk::CommandBuffer,
    arena: usize,
    /// Swapchain image for a frame; `None` for a one-off pick submit.
    image_index: Option<u32>,
    pass: Option<ActivePass>,
    screen_drawn: bool,
}

pub struct VulkanBackend {
    core: VulkanCore,
    shader_dir: PathBuf,
    window_extent: vk::Extent2D,
    swapchain_stale: bool,

    sampler: vk::Sampler,
    descriptor_set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    pipelines: HashMap<PipelineKey, vk::Pipeline>,

    offscreen_render_pass: vk::RenderPass,
    pick_render_pass: vk::RenderPass,
    reflection: OffscreenTarget,
    refraction: OffscreenTarget,
    pick: OffscreenTarget,
    readback_buffer: vk::Buffer,
    readback_memory: vk::DeviceMemory,

    meshes: Vec<GpuMesh>,
    textures: Vec<TextureEntry>,
    fallback_2d: Texture,
    fallback_cube: Texture,

    arenas: Vec<FrameArena>,
    recording: Option<Recording>,
    shared: SharedUniforms,
}

impl VulkanBackend {
    pub fn new(
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        window_size: (u32, u32),
        config: &ViewConfig,
    ) -> RenderResult<Self> {
        let window_extent = vk::Extent2D {
            width: window_size.0,
            height: window_size.1,
        };
        let core = VulkanCore::new(display_handle, window_handle, window_extent)?;
        let device = &core.device;

        let sampler = create_texture_sampler(device, core.max_sampler_anisotropy())?;

        let mut bindings = vec![vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)];
        for i in 0..Sampler::ALL.len() as u32 {
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(SAMPLER_BINDING_BASE + i)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
            );
        }
        let descriptor_set_layout = create_descriptor_set_layout(device, &bindings)?;

        let set_layouts = [descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let offscreen_render_pass = create_render_pass(
            device,
            OFFSCREEN_COLOR_FORMAT,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            core.depth_format,
        )?;
        let pick_render_pass = create_render_pass(
            device,
            PICK_COLOR_FORMAT,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            core.depth_format,
        )?;

        let offscreen_extent = vk::Extent2D {
            width: config.offscreen_size.0,
            height: config.offscreen_size.1,
        };
        let reflection = OffscreenTarget::create(
            &core,
            offscreen_render_pass,
            offscreen_extent,
            OFFSCREEN_COLOR_FORMAT,
            vk::ImageUsageFlags::SAMPLED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        let refraction = OffscreenTarget::create(
            &core,
            offscreen_render_pass,
            offscreen_extent,
            OFFSCREEN_COLOR_FORMAT,
            vk::ImageUsageFlags::SAMPLED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        let pick = Self::create_pick_target(&core, pick_render_pass)?;

        let (readback_buffer, readback_memory) = create_buffer(
            &core.instance,
            device,
            core.physical_device,
            mem::size_of::<[f32; 4]>() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let fallback_2d = Texture::create_2d(&core, &TextureData::placeholder())?;
        let fallback_cube = Texture::create_cube(&core, &CubemapData::default())?;

        let stride = aligned_stride::<GpuUniforms>(core.min_uniform_alignment()) as usize;
        let arenas = (0..=MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameArena::create(&core, stride))
            .collect::<RenderResult<Vec<_>>>()?;

        let textures = vec![
            TextureEntry {
                slot: TextureSlot::Target(RenderTarget::Reflection),
                cube: false,
            },
            TextureEntry {
                slot: TextureSlot::Target(RenderTarget::Refraction),
                cube: false,
            },
        ];

        info!(
            "Vulkan backend ready: offscreen {}x{}, uniform stride {} bytes",
            offscreen_extent.width, offscreen_extent.height, stride
        );

        Ok(Self {
            core,
            shader_dir: config.shader_dir.clone(),
            window_extent,
            swapchain_stale: false,
            sampler,
            descriptor_set_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            offscreen_render_pass,
            pick_render_pass,
            reflection,
            refraction,
            pick,
            readback_buffer,
            readback_memory,
            meshes: Vec::new(),
            textures,
            fallback_2d,
            fallback_cube,
            arenas,
            recording: None,
            shared: SharedUniforms::default(),
        })
    }

    /// The pick target always matches the swapchain so cursor pixels map 1:1.
    fn create_pick_target(core: &VulkanCore, render_pass: vk::RenderPass) -> RenderResult<OffscreenTarget> {
        OffscreenTarget::create(
            core,
            render_pass,
            core.swapchain_extent,
            PICK_COLOR_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
    }

    /// Records a new window size; the swapchain follows on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent != self.window_extent {
            self.window_extent = extent;
            self.swapchain_stale = true;
        }
    }

    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        self.core.recreate_swapchain(self.window_extent)?;
        self.pick.destroy(&self.core.device);
        self.pick = Self::create_pick_target(&self.core, self.pick_render_pass)?;
        self.swapchain_stale = false;
        Ok(())
    }

    fn target_kind(target: RenderTarget) -> TargetKind {
        match target {
            RenderTarget::Screen => TargetKind::Swapchain,
            RenderTarget::Reflection | RenderTarget::Refraction => TargetKind::Offscreen,
            RenderTarget::Pick => TargetKind::Pick,
        }
    }

    fn pipeline(&mut self, key: PipelineKey) -> RenderResult<vk::Pipeline> {
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }

        let render_pass = match key.kind {
            TargetKind::Swapchain => self.core.render_pass,
            TargetKind::Offscreen => self.offscreen_render_pass,
            TargetKind::Pick => self.pick_render_pass,
        };
        let depth_compare = match key.depth {
            DepthFunc::Less => vk::CompareOp::LESS,
            DepthFunc::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        };

        let pipeline = PipelineBuilder::new(
            self.core.device.clone(),
            &self.shader_dir,
            key.program.shader_stem(),
            self.pipeline_layout,
            render_pass,
        )?
        .with_vertex_input(vec![Vertex::get_binding_description()], Vertex::get_attribute_descriptions())
        .with_depth_compare(depth_compare)
        .with_cull_mode(vk::CullModeFlags::NONE)
        .with_alpha_blending(key.blend)
        .build()?;

        debug!("Built pipeline {:?}", key);
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    fn offscreen(&self, target: RenderTarget) -> Option<&OffscreenTarget> {
        match target {
            RenderTarget::Reflection => Some(&self.reflection),
            RenderTarget::Refraction => Some(&self.refraction),
            RenderTarget::Pick => Some(&self.pick),
            RenderTarget::Screen => None,
        }
    }

    fn texture_view(&self, handle: TextureHandle) -> Option<(vk::ImageView, bool)> {
        let entry = self.textures.get(handle.0 as usize)?;
        let view = match &entry.slot {
            TextureSlot::Owned(texture) => texture.view,
            TextureSlot::Target(target) => self.offscreen(*target)?.color.view,
        };
        Some((view, entry.cube))
    }

    fn sampler_views(&self, call: &DrawCall) -> Vec<vk::ImageView> {
        Sampler::ALL
            .iter()
            .map(|slot| {
                let fallback = if slot.is_cube() { self.fallback_cube.view } else { self.fallback_2d.view };
                match call.sampler_texture(*slot).and_then(|h| self.texture_view(h)) {
                    Some((view, cube)) if cube == slot.is_cube() => view,
                    Some(_) => {
                        warn!("Texture bound to {} has the wrong dimensionality", slot.as_str());
                        fallback
                    }
                    None => fallback,
                }
            })
            .collect()
    }

    /// Begins the pending render pass with `clear` if it has not started.
    fn start_pass(&mut self, clear: &ClearValues) -> RenderResult<()> {
        let recording = self
            .recording
            .as_mut()
            .ok_or_else(|| RenderError::device("no command buffer is recording"))?;
        let pass = recording
            .pass
            .as_mut()
            .ok_or_else(|| RenderError::device("no render pass is active"))?;
        if pass.started {
            return Ok(());
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear.color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear.depth,
                    stencil: clear.stencil,
                },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(pass.render_pass)
            .framebuffer(pass.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: pass.extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: pass.extent.height as f32,
            width: pass.extent.width as f32,
            height: -(pass.extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: pass.extent,
        };

        let device = &self.core.device;
        unsafe {
            device.cmd_begin_render_pass(recording.command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(recording.command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(recording.command_buffer, 0, &[scissor]);
        }
        pass.started = true;
        trace!("Render pass started on {:?}", pass.target);
        Ok(())
    }

    fn current_arena(&self) -> RenderResult<usize> {
        self.recording
            .as_ref()
            .map(|r| r.arena)
            .ok_or_else(|| RenderError::device("no command buffer is recording"))
    }

    fn reset_arena(&mut self, arena: usize) -> RenderResult<()> {
        let device = &self.core.device;
        self.arenas[arena].reset(device)
    }

    fn destroy_resources(&mut self) {
        let device = &self.core.device;
        unsafe {
            for (_, pipeline) in self.pipelines.drain() {
                device.destroy_pipeline(pipeline, None);
            }
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            device.destroy_sampler(self.sampler, None);
        }

        for arena in &self.arenas {
            arena.destroy(device);
        }
        for mesh in &self.meshes {
            destroy_buffer(device, mesh.vertex_buffer, mesh.vertex_memory);
            destroy_buffer(device, mesh.index_buffer, mesh.index_memory);
        }
        for entry in &self.textures {
            if let TextureSlot::Owned(texture) = &entry.slot {
                texture.destroy(device);
            }
        }
        self.fallback_2d.destroy(device);
        self.fallback_cube.destroy(device);

        self.reflection.destroy(device);
        self.refraction.destroy(device);
        self.pick.destroy(device);
        destroy_buffer(device, self.readback_buffer, self.readback_memory);

        unsafe {
            device.destroy_render_pass(self.offscreen_render_pass, None);
            device.destroy_render_pass(self.pick_render_pass, None);
        }
    }
}

impl RenderBackend for VulkanBackend {
    fn create_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(RenderError::upload("mesh has no geometry"));
        }
        if !mesh.indices_in_bounds() {
            return Err(RenderError::upload("mesh index out of range"));
        }

        let core = &self.core;
        let (vertex_buffer, vertex_memory) = create_vertex_buffer(
            &core.instance,
            &core.device,
            core.physical_device,
            core.command_pool,
            core.graphics_queue,
            &mesh.vertices,
        )?;
        let (index_buffer, index_memory) = match create_index_buffer(
            &core.instance,
            &core.device,
            core.physical_device,
            core.command_pool,
            core.graphics_queue,
            &mesh.indices,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                destroy_buffer(&core.device, vertex_buffer, vertex_memory);
                return Err(e);
            }
        };

        self.meshes.push(GpuMesh {
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            index_count: mesh.index_count() as u32,
        });
        debug!("Uploaded mesh: {} vertices, {} indices", mesh.vertex_count(), mesh.index_count());
        Ok(MeshHandle(self.meshes.len() as u32 - 1))
    }

    fn create_texture(&mut self, texture: &TextureData) -> RenderResult<TextureHandle> {
        let texture = Texture::create_2d(&self.core, texture)?;
        self.textures.push(TextureEntry {
            slot: TextureSlot::Owned(texture),
            cube: false,
        });
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn create_cubemap(&mut self, cubemap: &CubemapData) -> RenderResult<TextureHandle> {
        let texture = Texture::create_cube(&self.core, cubemap)?;
        self.textures.push(TextureEntry {
            slot: TextureSlot::Owned(texture),
            cube: true,
        });
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn target_texture(&self, target: RenderTarget) -> Option<TextureHandle> {
        self.textures
            .iter()
            .position(|entry| matches!(entry.slot, TextureSlot::Target(t) if t == target))
            .map(|i| TextureHandle(i as u32))
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.core.swapchain_extent.width, self.core.swapchain_extent.height)
    }

    fn begin_frame(&mut self) -> RenderResult<bool> {
        if self.recording.is_some() {
            return Err(RenderError::device("begin_frame while a submit is still recording"));
        }
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(false);
        }
        if self.swapchain_stale {
            self.recreate_swapchain()?;
        }

        let Some(image_index) = self.core.begin_frame()? else {
            self.recreate_swapchain()?;
            return Ok(false);
        };

        let arena = self.core.current_frame;
        self.reset_arena(arena)?;

        let command_buffer = self.core.current_command_buffer();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.core.device.begin_command_buffer(command_buffer, &begin_info)? };

        self.recording = Some(Recording {
            command_buffer,
            arena,
            image_index: Some(image_index),
            pass: None,
            screen_drawn: false,
        });
        Ok(true)
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        let image_index = match &self.recording {
            Some(Recording { image_index: Some(index), .. }) => *index,
            _ => return Err(RenderError::device("end_frame without a frame")),
        };

        if self.recording.as_ref().is_some_and(|r| r.pass.is_some()) {
            self.end_pass()?;
        }
        // present needs the image in PRESENT_SRC even if nothing was drawn
        if self.recording.as_ref().is_some_and(|r| !r.screen_drawn) {
            self.begin_pass(RenderTarget::Screen)?;
            self.end_pass()?;
        }

        let recording = self
            .recording
            .take()
            .ok_or_else(|| RenderError::device("end_frame without a frame"))?;
        unsafe { self.core.device.end_command_buffer(recording.command_buffer)? };
        self.arenas[recording.arena].flush(&self.core.device)?;

        if self.core.end_frame(image_index)? {
            self.swapchain_stale = true;
        }
        Ok(())
    }

    fn begin_pass(&mut self, target: RenderTarget) -> RenderResult<()> {
        if self.recording.is_none() {
            if target != RenderTarget::Pick {
                return Err(RenderError::device(format!("{:?} pass outside a frame", target)));
            }
            let arena = MAX_FRAMES_IN_FLIGHT;
            self.reset_arena(arena)?;
            let command_buffer = begin_single_time_commands(&self.core.device, self.core.command_pool)?;
            self.recording = Some(Recording {
                command_buffer,
                arena,
                image_index: None,
                pass: None,
                screen_drawn: false,
            });
        }

        let (render_pass, framebuffer, extent) = match target {
            RenderTarget::Screen => {
                let image_index = self
                    .recording
                    .as_ref()
                    .and_then(|r| r.image_index)
                    .ok_or_else(|| RenderError::device("screen pass outside a frame"))?;
                (
                    self.core.render_pass,
                    self.core.framebuffers[image_index as usize],
                    self.core.swapchain_extent,
                )
            }
            RenderTarget::Reflection | RenderTarget::Refraction => {
                let t = if target == RenderTarget::Reflection { &self.reflection } else { &self.refraction };
                (self.offscreen_render_pass, t.framebuffer, t.extent)
            }
            RenderTarget::Pick => (self.pick_render_pass, self.pick.framebuffer, self.pick.extent),
        };

        let recording = self
            .recording
            .as_mut()
            .ok_or_else(|| RenderError::device("no command buffer is recording"))?;
        if let Some(active) = &recording.pass {
            return Err(RenderError::device(format!(
                "{:?} pass begun while {:?} is active",
                target, active.target
            )));
        }
        recording.pass = Some(ActivePass {
            target,
            render_pass,
            framebuffer,
            extent,
            started: false,
        });
        Ok(())
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        self.start_pass(&ClearValues::scene())?;

        let recording = self
            .recording
            .as_mut()
            .ok_or_else(|| RenderError::device("no command buffer is recording"))?;
        let pass = recording
            .pass
            .take()
            .ok_or_else(|| RenderError::device("end_pass without begin_pass"))?;
        unsafe { self.core.device.cmd_end_render_pass(recording.command_buffer) };
        if pass.target == RenderTarget::Screen {
            recording.screen_drawn = true;
        }

        if recording.image_index.is_none() {
            let recording = self
                .recording
                .take()
                .ok_or_else(|| RenderError::device("no command buffer is recording"))?;
            self.arenas[recording.arena].flush(&self.core.device)?;
            end_single_time_commands(
                &self.core.device,
                self.core.command_pool,
                self.core.graphics_queue,
                recording.command_buffer,
            )?;
        }
        Ok(())
    }

    fn clear(&mut self, values: &ClearValues) -> RenderResult<()> {
        let already_started = self
            .recording
            .as_ref()
            .and_then(|r| r.pass.as_ref())
            .map(|p| p.started)
            .ok_or_else(|| RenderError::device("clear outside a pass"))?;
        if !already_started {
            return self.start_pass(values);
        }

        let (command_buffer, extent) = match &self.recording {
            Some(Recording { command_buffer, pass: Some(pass), .. }) => (*command_buffer, pass.extent),
            _ => return Err(RenderError::device("clear outside a pass")),
        };
        let attachments = [
            vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    color: vk::ClearColorValue { float32: values.color },
                },
            },
            vk::ClearAttachment {
                aspect_mask: depth_aspect(self.core.depth_format),
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: values.depth,
                        stencil: values.stencil,
                    },
                },
            },
        ];
        let rect = vk::ClearRect {
            rect: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe { self.core.device.cmd_clear_attachments(command_buffer, &attachments, &[rect]) };
        Ok(())
    }

    fn set_clip_enabled(&mut self, enabled: bool) {
        self.shared.clip_enabled = enabled;
    }

    fn set_shared_matrices(&mut self, projection: &Mat4, view: &Mat4) {
        self.shared.projection = *projection;
        self.shared.view = *view;
    }

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()> {
        self.start_pass(&ClearValues::scene())?;

        let mesh = self
            .meshes
            .get(call.mesh.0 as usize)
            .map(|m| (m.vertex_buffer, m.index_buffer, m.index_count))
            .ok_or_else(|| RenderError::device(format!("unknown mesh {:?}", call.mesh)))?;

        let (command_buffer, target) = match &self.recording {
            Some(Recording { command_buffer, pass: Some(pass), .. }) => (*command_buffer, pass.target),
            _ => return Err(RenderError::device("draw outside a pass")),
        };

        let pipeline = self.pipeline(PipelineKey {
            program: call.program,
            kind: Self::target_kind(target),
            depth: call.depth,
            blend: call.blend,
        })?;

        let uniforms = GpuUniforms::pack(call, &self.shared);
        self.shared.camera_pos = uniforms.camera_pos;
        let arena_index = self.current_arena()?;
        let offset = self.arenas[arena_index].push(&uniforms)?;

        let device = &self.core.device;
        let arena = &self.arenas[arena_index];
        let descriptor_set = allocate_descriptor_set(device, arena.descriptor_pool, self.descriptor_set_layout)?;

        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(arena.uniform_buffer)
            .offset(0)
            .range(mem::size_of::<GpuUniforms>() as vk::DeviceSize)];
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = self
            .sampler_views(call)
            .into_iter()
            .map(|view| {
                [vk::DescriptorImageInfo::default()
                    .sampler(self.sampler)
                    .image_view(view)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)]
            })
            .collect();

        let mut writes = vec![vk::WriteDescriptorSet::default()
            .dst_set(descriptor_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .buffer_info(&buffer_info)];
        for (i, info) in image_infos.iter().enumerate() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(descriptor_set)
                    .dst_binding(SAMPLER_BINDING_BASE + i as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info),
            );
        }

        let (vertex_buffer, index_buffer, index_count) = mesh;
        unsafe {
            device.update_descriptor_sets(&writes, &[]);
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[descriptor_set],
                &[offset],
            );
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[vertex_buffer], &[0]);
            device.cmd_bind_index_buffer(command_buffer, index_buffer, 0, vk::IndexType::UINT32);
            device.cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0);
        }
        Ok(())
    }

    fn read_pixel(&mut self, target: RenderTarget, x: u32, y: u32) -> RenderResult<[f32; 4]> {
        if target != RenderTarget::Pick {
            return Err(RenderError::unsupported(format!("readback from {:?}", target)));
        }
        if self.recording.is_some() {
            return Err(RenderError::readback("pick target is still being recorded"));
        }

        let (px, py) = pick_texel(x, y, self.pick.extent);
        let device = &self.core.device;
        let command_buffer = begin_single_time_commands(device, self.core.command_pool)?;
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D {
                x: px as i32,
                y: py as i32,
                z: 0,
            })
            .image_extent(vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            });
        unsafe {
            device.cmd_copy_image_to_buffer(
                command_buffer,
                self.pick.color.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.readback_buffer,
                &[region],
            );
        }
        end_single_time_commands(device, self.core.command_pool, self.core.graphics_queue, command_buffer)?;

        let size = mem::size_of::<[f32; 4]>();
        let texel = unsafe {
            let data = device.map_memory(self.readback_memory, 0, size as vk::DeviceSize, vk::MemoryMapFlags::empty())?;
            let bytes = std::slice::from_raw_parts(data as *const u8, size);
            let texel: [f32; 4] = bytemuck::pod_read_unaligned(bytes);
            device.unmap_memory(self.readback_memory);
            texel
        };
        trace!("Pick texel at ({}, {}): {:?}", px, py, texel);
        Ok(texel)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.core.device.device_wait_idle();
        }
        self.destroy_resources();
    }
}
