use glam::Vec3;

/// Per-connection replicated movement state: `grounded`/`last_ground_tick`
/// live here and in the connection handle respectively, `position` on
/// `Entity`.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub velocity: Vec3,
    pub grounded: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            grounded: true,
        }
    }
}

impl PlayerState {
    pub fn new() -> Self {
        Self::default()
    }
}
