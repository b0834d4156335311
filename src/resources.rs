use std::path::PathBuf;

use bevy::log::{info, warn};
use bevy::math::{Mat4, Vec3};

use crate::backend::{MeshHandle, RenderBackend, RenderTarget, TextureHandle};
use crate::constants::*;
use crate::error::RenderResult;
use crate::geometry::{self, GridSpec};
use crate::texture::{height_map_frame_path, CubemapData, TextureData};

/// Tunables the host may override before the view is built.
#[derive(Clone, Debug)]
pub struct ViewConfig {
    pub asset_root: PathBuf,
    pub shader_dir: PathBuf,
    pub offscreen_size: (u32, u32),
    pub model_scale: f32,
    /// Where the water, room and sound source sit in the world.
    pub source_pos: Vec3,
    pub grid: GridSpec,
    pub drop_radius: f32,
    pub drop_keep_time: f32,
    pub height_map_frames: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            shader_dir: PathBuf::from("shaders"),
            offscreen_size: (OFFSCREEN_TARGET_WIDTH, OFFSCREEN_TARGET_HEIGHT),
            model_scale: MODEL_SCALE,
            source_pos: Vec3::ZERO,
            grid: GridSpec::default(),
            drop_radius: DEFAULT_DROP_RADIUS,
            drop_keep_time: DEFAULT_DROP_KEEP_TIME,
            height_map_frames: HEIGHT_MAP_FRAME_COUNT,
        }
    }
}

impl ViewConfig {
    /// World height of the water surface, used for both clip planes.
    pub fn water_height(&self) -> f32 {
        self.grid.height * self.model_scale
    }

    /// Model matrix shared by the room and the water surfaces.
    pub fn surface_model(&self) -> Mat4 {
        Mat4::from_translation(self.source_pos) * Mat4::from_scale(Vec3::splat(self.model_scale))
    }

    /// The pick pass draws the untranslated surface.
    pub fn pick_model(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(self.model_scale))
    }
}

/// Image data for a view, read before any GPU upload.
#[derive(Clone, Debug, Default)]
pub struct SceneImages {
    pub skybox: CubemapData,
    pub tiles: Option<TextureData>,
    pub height_map_frames: Vec<Option<TextureData>>,
}

impl SceneImages {
    /// Reads every image the view uses. Missing files are logged and left
    /// unset; nothing here fails.
    pub fn load(config: &ViewConfig) -> Self {
        let skybox = CubemapData::load(&config.asset_root, &SKYBOX_FACE_PATHS);
        if skybox.loaded_faces() < 6 {
            warn!("Skybox has {} of 6 faces", skybox.loaded_faces());
        }

        let tiles = TextureData::load_optional(&config.asset_root.join(TILES_TEXTURE_PATH));

        let height_map_frames: Vec<Option<TextureData>> = (0..config.height_map_frames)
            .map(|i| TextureData::load_optional(&height_map_frame_path(&config.asset_root, i)))
            .collect();

        info!(
            "Loaded {} of {} height-map frames",
            height_map_frames.iter().flatten().count(),
            height_map_frames.len()
        );

        Self {
            skybox,
            tiles,
            height_map_frames,
        }
    }
}

/// GPU handles the view draws with, created once before the first frame.
#[derive(Clone, Debug)]
pub struct SceneResources {
    pub skybox_mesh: MeshHandle,
    pub room_mesh: MeshHandle,
    /// Shared by both water techniques and the pick pass.
    pub wave_mesh: MeshHandle,
    pub skybox: TextureHandle,
    pub tiles: Option<TextureHandle>,
    pub height_map_frames: Vec<Option<TextureHandle>>,
    pub reflection: Option<TextureHandle>,
    pub refraction: Option<TextureHandle>,
}

impl SceneResources {
    pub fn load(backend: &mut dyn RenderBackend, config: &ViewConfig) -> RenderResult<Self> {
        let images = SceneImages::load(config);
        Self::upload(backend, config, &images)
    }

    pub fn upload(
        backend: &mut dyn RenderBackend,
        config: &ViewConfig,
        images: &SceneImages,
    ) -> RenderResult<Self> {
        let skybox_mesh = backend.create_mesh(&geometry::skybox_cube())?;
        let room_mesh = backend.create_mesh(&geometry::tiled_room())?;
        let wave_mesh = backend.create_mesh(&geometry::wave_grid(&config.grid))?;

        let skybox = backend.create_cubemap(&images.skybox)?;
        let tiles = images
            .tiles
            .as_ref()
            .map(|t| backend.create_texture(t))
            .transpose()?;
        let height_map_frames = images
            .height_map_frames
            .iter()
            .map(|frame| frame.as_ref().map(|t| backend.create_texture(t)).transpose())
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            skybox_mesh,
            room_mesh,
            wave_mesh,
            skybox,
            tiles,
            height_map_frames,
            reflection: backend.target_texture(RenderTarget::Reflection),
            refraction: backend.target_texture(RenderTarget::Refraction),
        })
    }

    /// Frame texture for `index`, wrapping around the sequence. `None` when
    /// that frame failed to load or no frames exist.
    pub fn height_map_frame(&self, index: usize) -> Option<TextureHandle> {
        if self.height_map_frames.is_empty() {
            return None;
        }
        self.height_map_frames[index % self.height_map_frames.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_sits_at_scaled_grid_height() {
        let config = ViewConfig::default();
        assert!((config.water_height() - WATER_HEIGHT).abs() < 1e-4);
        let top = config.surface_model().transform_point3(Vec3::new(1.0, 0.6, 1.0));
        assert!((top - Vec3::new(100.0, 60.0, 100.0)).length() < 1e-3);
    }

    #[test]
    fn pick_model_ignores_source_position() {
        let config = ViewConfig {
            source_pos: Vec3::new(5.0, 1.0, -3.0),
            ..Default::default()
        };
        assert_eq!(config.pick_model().transform_point3(Vec3::ZERO), Vec3::ZERO);
        assert_eq!(config.surface_model().transform_point3(Vec3::ZERO), config.source_pos);
    }
}
