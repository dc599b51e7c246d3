/// Tunables for the minimal gravity/jump/horizontal-move model. The
/// teacher's strafe-jump, crouch and stun feel tuning lives entirely in the
/// character controller, which is out of scope here.
pub struct PlayerConfig {
    pub move_speed_ground: f32,
    pub move_speed_air: f32,
    pub acceleration: f32,

    pub gravity: f32,
    pub max_fall_speed: f32,
    pub jump_power: f32,

    pub player_radius: f32,
    pub player_height: f32,
    pub ground_check_threshold: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            move_speed_ground: 9.0,
            move_speed_air: 7.0,
            acceleration: 7.0,

            gravity: 9.8,
            max_fall_speed: 70.0,
            jump_power: 6.0,

            player_radius: 0.3,
            player_height: 1.8,
            ground_check_threshold: 1.0,
        }
    }
}
