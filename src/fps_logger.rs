use bevy::prelude::*;

/// Logs frames per second once a second.
#[derive(Default)]
pub struct FpsLogger {
    frame_count: u32,
    fps_frame_count: u32,
    last_fps_time: f32,
}

impl FpsLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, time: &Time) {
        if let Some((fps, frame_time_ms)) = self.tick(time.elapsed_secs()) {
            info!("FPS: {:.1} | Frame Time: {:.2}ms", fps, frame_time_ms);
        }
    }

    /// Counts a frame at `now` seconds. Returns (fps, frame time in ms) when
    /// a full second has passed since the last report.
    fn tick(&mut self, now: f32) -> Option<(f32, f32)> {
        self.frame_count += 1;
        self.fps_frame_count += 1;

        if self.frame_count == 1 {
            info!("Starting render loop...");
        }

        let elapsed = now - self.last_fps_time;
        if elapsed < 1.0 {
            return None;
        }

        let fps = self.fps_frame_count as f32 / elapsed;
        let frame_time_ms = elapsed * 1000.0 / self.fps_frame_count as f32;

        self.last_fps_time = now;
        self.fps_frame_count = 0;
        Some((fps, frame_time_ms))
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
}
