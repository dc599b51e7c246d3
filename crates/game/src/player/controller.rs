use glam::{Quat, Vec3};

use crate::physics::PhysicsWorld;
use crate::snapshot::Entity;

use super::{InputFlags, PlayerConfig, PlayerInput, PlayerState};

/// Gravity, jump and horizontal-move character controller. Collision
/// response and the rest of the movement feel are handled by `PhysicsWorld`'s
/// kinematic character controller; this just decides the velocity it's fed.
pub struct PlayerController {
    config: PlayerConfig,
}

impl Default for PlayerController {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

impl PlayerController {
    pub fn new(config: PlayerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn process(
        &self,
        input: &PlayerInput,
        entity: &mut Entity,
        physics: &mut PhysicsWorld,
        state: &mut PlayerState,
        dt: f32,
    ) {
        let Some(handle) = entity.physics_handle else {
            return;
        };

        let grounded = physics.is_grounded(handle, self.config.ground_check_threshold);
        let current = physics.body_velocity(handle).unwrap_or(Vec3::ZERO);
        let yaw = input.aim_x.atan2(input.aim_z);

        let mut vertical = current.y;
        if !grounded {
            vertical = (vertical - self.config.gravity * dt).max(-self.config.max_fall_speed);
        }
        if input.flags.contains(InputFlags::JUMP) && grounded {
            vertical = self.config.jump_power;
        }

        let world_direction = self.local_to_world_direction(input.move_vector(), yaw);
        let max_speed = if grounded {
            self.config.move_speed_ground
        } else {
            self.config.move_speed_air
        };
        let target = world_direction * max_speed;
        let blend = (self.config.acceleration * dt).min(1.0);
        let horizontal = Vec3::new(current.x, 0.0, current.z).lerp(target, blend);

        let velocity = Vec3::new(horizontal.x, vertical, horizontal.z);
        physics.set_body_velocity(handle, velocity);

        state.velocity = velocity;
        state.grounded = grounded;

        entity.orientation = Quat::from_rotation_y(yaw);
        entity.dirty = true;
    }

    fn local_to_world_direction(&self, local: Vec3, yaw: f32) -> Vec3 {
        if local.length_squared() < 0.001 {
            return Vec3::ZERO;
        }

        let normalized = local.normalize();
        let (sin_yaw, cos_yaw) = yaw.sin_cos();

        Vec3::new(
            normalized.x * cos_yaw + normalized.z * sin_yaw,
            0.0,
            -normalized.x * sin_yaw + normalized.z * cos_yaw,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::PhysicsWorld;
    use crate::snapshot::Entity;

    #[test]
    fn controller_processes_without_panic() {
        let controller = PlayerController::default();
        let mut physics = PhysicsWorld::new();
        let mut entity = Entity::player(1, Vec3::new(0.0, 1.0, 0.0));

        let handle = physics.add_player(entity.position, 0.3, 1.8);
        entity.physics_handle = Some(handle);

        let mut state = PlayerState::new();
        let input = PlayerInput::default();

        controller.process(&input, &mut entity, &mut physics, &mut state, 1.0 / 60.0);

        assert!(entity.dirty);
    }

    #[test]
    fn jump_requires_being_grounded() {
        let controller = PlayerController::default();
        let mut physics = PhysicsWorld::new();
        // No ground collider: the player is airborne, so `is_grounded` is false.
        let mut entity = Entity::player(1, Vec3::new(0.0, 1.0, 0.0));
        let handle = physics.add_player(entity.position, 0.3, 1.8);
        entity.physics_handle = Some(handle);

        let mut state = PlayerState::new();
        let input = PlayerInput {
            flags: InputFlags::JUMP,
            ..Default::default()
        };
        controller.process(&input, &mut entity, &mut physics, &mut state, 1.0 / 60.0);

        assert!(!state.grounded);
        assert!(state.velocity.y < controller.config().jump_power);
    }
}
