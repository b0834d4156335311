use std::path::{Path, PathBuf};

use ash::vk;
use bevy::log::warn;
use image::imageops::FilterType;

use crate::constants::HEIGHT_MAP_FRAME_DIR;
use crate::error::{RenderError, RenderResult};
use crate::vulkan_common::{
    create_buffer, create_image, create_image_view, copy_buffer_to_image, destroy_buffer,
    transition_image_layout, write_host_memory, VulkanCore,
};

/// Sampled images keep the bytes as loaded, without sRGB decoding.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Tightly packed RGBA8 pixels, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self { pixels, width, height }
    }

    pub fn from_file(path: &Path) -> RenderResult<Self> {
        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self::new(rgba.into_raw(), width, height))
    }

    /// Loads `path`, logging and returning `None` when it cannot be read.
    pub fn load_optional(path: &Path) -> Option<Self> {
        match Self::from_file(path) {
            Ok(texture) => Some(texture),
            Err(e) => {
                warn!("Failed to load texture {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn solid(rgba: [u8; 4], width: u32, height: u32) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self { pixels, width, height }
    }

    /// 1x1 black, bound to sampler slots a draw leaves empty.
    pub fn placeholder() -> Self {
        Self::solid([0, 0, 0, 255], 1, 1)
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == (self.width * self.height * 4) as usize
    }

    fn resized(&self, width: u32, height: u32) -> Self {
        if self.width == width && self.height == height {
            return self.clone();
        }
        match image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone()) {
            Some(img) => {
                let resized = image::imageops::resize(&img, width, height, FilterType::Triangle);
                Self::new(resized.into_raw(), width, height)
            }
            None => Self::solid([0, 0, 0, 255], width, height),
        }
    }
}

/// Six faces in +X, -X, +Y, -Y, +Z, -Z order. Faces that failed to load
/// are `None`.
#[derive(Clone, Debug, Default)]
pub struct CubemapData {
    pub faces: [Option<TextureData>; 6],
}

impl CubemapData {
    pub fn load(asset_root: &Path, face_paths: &[&str; 6]) -> Self {
        let mut faces: [Option<TextureData>; 6] = Default::default();
        for (face, path) in faces.iter_mut().zip(face_paths) {
            *face = TextureData::load_optional(&asset_root.join(path));
        }
        Self { faces }
    }

    pub fn loaded_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.is_some()).count()
    }

    /// All six faces at the size of the first loaded one. Missing faces
    /// become black; a cube with no faces at all is 1x1.
    pub fn normalized_faces(&self) -> [TextureData; 6] {
        let (width, height) = self
            .faces
            .iter()
            .flatten()
            .next()
            .map(|f| (f.width, f.height))
            .unwrap_or((1, 1));

        std::array::from_fn(|i| match &self.faces[i] {
            Some(face) if face.is_valid() => face.resized(width, height),
            _ => TextureData::solid([0, 0, 0, 255], width, height),
        })
    }
}

/// `Images/waves5/007.png` for frame 7.
pub fn height_map_frame_path(asset_root: &Path, index: usize) -> PathBuf {
    asset_root.join(HEIGHT_MAP_FRAME_DIR).join(format!("{:03}.png", index))
}

/// A sampled image living on the GPU.
pub struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl Texture {
    pub fn create_2d(core: &VulkanCore, texture_data: &TextureData) -> RenderResult<Self> {
        if !texture_data.is_valid() {
            return Err(RenderError::upload(format!(
                "texture data does not match {}x{}",
                texture_data.width, texture_data.height
            )));
        }
        Self::upload(
            core,
            &texture_data.pixels,
            texture_data.width,
            texture_data.height,
            1,
            vk::ImageCreateFlags::empty(),
            vk::ImageViewType::TYPE_2D,
        )
    }

    pub fn create_cube(core: &VulkanCore, cubemap: &CubemapData) -> RenderResult<Self> {
        let faces = cubemap.normalized_faces();
        let (width, height) = (faces[0].width, faces[0].height);
        let pixels: Vec<u8> = faces.iter().flat_map(|f| f.pixels.iter().copied()).collect();
        Self::upload(
            core,
            &pixels,
            width,
            height,
            6,
            vk::ImageCreateFlags::CUBE_COMPATIBLE,
            vk::ImageViewType::CUBE,
        )
    }

    fn upload(
        core: &VulkanCore,
        pixels: &[u8],
        width: u32,
        height: u32,
        layers: u32,
        flags: vk::ImageCreateFlags,
        view_type: vk::ImageViewType,
    ) -> RenderResult<Self> {
        let device = &core.device;
        let image_size = pixels.len() as vk::DeviceSize;

        let (staging_buffer, staging_memory) = create_buffer(
            &core.instance,
            device,
            core.physical_device,
            image_size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let result = (|| {
            write_host_memory(device, staging_memory, pixels)?;

            let (image, memory) = create_image(
                &core.instance,
                device,
                core.physical_device,
                vk::Extent2D { width, height },
                TEXTURE_FORMAT,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                layers,
                flags,
            )?;

            transition_image_layout(
                device,
                core.command_pool,
                core.graphics_queue,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                layers,
            )?;

            copy_buffer_to_image(
                device,
                core.command_pool,
                core.graphics_queue,
                staging_buffer,
                image,
                width,
                height,
                layers,
            )?;

            transition_image_layout(
                device,
                core.command_pool,
                core.graphics_queue,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                layers,
            )?;

            let view = create_image_view(
                device,
                image,
                TEXTURE_FORMAT,
                view_type,
                vk::ImageAspectFlags::COLOR,
                layers,
            )?;

            Ok(Self { image, memory, view })
        })();

        destroy_buffer(device, staging_buffer, staging_memory);
        result
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_paths_are_zero_padded() {
        let path = height_map_frame_path(Path::new("assets"), 7);
        assert_eq!(path, Path::new("assets/Images/waves5/007.png"));
        let path = height_map_frame_path(Path::new("assets"), 199);
        assert!(path.ends_with("199.png"));
    }

    #[test]
    fn missing_file_is_skipped() {
        assert!(TextureData::load_optional(Path::new("does/not/exist.png")).is_none());
    }

    #[test]
    fn cube_faces_share_the_first_loaded_size() {
        let mut cube = CubemapData::default();
        cube.faces[1] = Some(TextureData::solid([255, 0, 0, 255], 4, 4));
        cube.faces[3] = Some(TextureData::solid([0, 255, 0, 255], 2, 8));

        let faces = cube.normalized_faces();
        assert_eq!(cube.loaded_faces(), 2);
        for face in &faces {
            assert_eq!((face.width, face.height), (4, 4));
            assert!(face.is_valid());
        }
        assert_eq!(&faces[1].pixels[..4], &[255, 0, 0, 255]);
        assert_eq!(&faces[0].pixels[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn empty_cube_is_one_texel() {
        let faces = CubemapData::default().normalized_faces();
        assert!(faces.iter().all(|f| f.width == 1 && f.height == 1));
    }
}
