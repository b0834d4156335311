use crate::constants::WAVE_SPEED;
use crate::drops::DropList;

/// Which water surface the scene draws this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WaterTechnique {
    /// Sine-wave displacement with a scrolling phase.
    #[default]
    Procedural,
    /// Pre-baked height-map frames plus interactive ripples.
    HeightMap,
    None,
}

impl WaterTechnique {
    pub fn label(&self) -> &'static str {
        match self {
            WaterTechnique::Procedural => "procedural",
            WaterTechnique::HeightMap => "height-map",
            WaterTechnique::None => "none",
        }
    }
}

/// Time-dependent state owned by the view and advanced once per frame.
/// Draw routines only read it.
#[derive(Clone, Debug)]
pub struct SimulationState {
    /// Accumulated simulation time in seconds.
    pub time: f32,
    /// Scroll offset for the procedural water, grows without bound.
    pub move_factor: f32,
    pub wave_speed: f32,
    pub drops: DropList,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new(WAVE_SPEED)
    }
}

impl SimulationState {
    pub fn new(wave_speed: f32) -> Self {
        Self {
            time: 0.0,
            move_factor: 0.0,
            wave_speed,
            drops: DropList::new(),
        }
    }

    /// Advances time and the wave phase by one frame of length `dt`.
    pub fn advance(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.time += dt;
        self.move_factor += self.wave_speed * dt;
    }

    /// Removes ripples that outlived their keep time at the current time.
    pub fn expire_drops(&mut self) -> usize {
        self.drops.expire(self.time)
    }
}
