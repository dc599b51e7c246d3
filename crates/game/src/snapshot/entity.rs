use glam::{Quat, Vec3};
use rapier3d::dynamics::RigidBodyHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum EntityType {
    #[default]
    Player = 0,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: u32,
    pub entity_type: EntityType,
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
    pub physics_handle: Option<RigidBodyHandle>,
    pub dirty: bool,
}

impl Entity {
    pub fn player(id: u32, spawn_position: Vec3) -> Self {
        Self {
            id,
            entity_type: EntityType::Player,
            position: spawn_position,
            velocity: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            physics_handle: None,
            dirty: true,
        }
    }
}
