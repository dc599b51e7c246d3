use crate::snapshot::Entity;

use super::PhysicsWorld;

pub struct PhysicsSync;

impl PhysicsSync {
    pub fn physics_to_entity(entity: &mut Entity, physics: &PhysicsWorld) {
        let Some(handle) = entity.physics_handle else {
            return;
        };

        if let Some(pos) = physics.body_position(handle) {
            if entity.position != pos {
                entity.position = pos;
                entity.dirty = true;
            }
        }

        if let Some(vel) = physics.body_velocity(handle) {
            if entity.velocity != vel {
                entity.velocity = vel;
                entity.dirty = true;
            }
        }
    }
}
