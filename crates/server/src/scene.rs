//! Static scene bookkeeping: shape metadata for registry objects (rapier
//! doesn't hand back a compact "type tag" for a collider, so the server keeps
//! its own side table), plus the pluggable initial-scene callback the spec
//! calls out as an external collaborator's responsibility, not this crate's.

use std::collections::HashMap;

use glam::{Quat, Vec3};
use physx_core::wire::Writer;
use physx_core::{Actor, ObjectCategory, ObjectSource, ObjectTypeTag, PhysicsWorld, Registry};

#[derive(Debug, Clone, Copy)]
pub enum ShapeDesc {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Plane,
    Capsule { half_height: f32, radius: f32 },
    PlayerCapsule { half_height: f32, radius: f32 },
}

impl ShapeDesc {
    pub fn tag(&self) -> ObjectTypeTag {
        match self {
            ShapeDesc::Box { .. } => ObjectTypeTag::Box,
            ShapeDesc::Sphere { .. } => ObjectTypeTag::Sphere,
            ShapeDesc::Plane => ObjectTypeTag::Plane,
            ShapeDesc::Capsule { .. } => ObjectTypeTag::Capsule,
            ShapeDesc::PlayerCapsule { .. } => ObjectTypeTag::Player,
        }
    }

    pub fn write_payload(&self, w: &mut Writer) {
        match self {
            ShapeDesc::Box { half_extents } => {
                w.write_f32(half_extents.x);
                w.write_f32(half_extents.y);
                w.write_f32(half_extents.z);
            }
            ShapeDesc::Sphere { radius } => w.write_f32(*radius),
            ShapeDesc::Plane => {}
            ShapeDesc::Capsule { half_height, radius }
            | ShapeDesc::PlayerCapsule { half_height, radius } => {
                w.write_f32(*half_height);
                w.write_f32(*radius);
            }
        }
    }
}

/// Side table mapping a registry object id to the shape metadata needed to
/// encode its ADD record. Populated whenever a primitive is spawned.
#[derive(Default)]
pub struct ShapeTable {
    shapes: HashMap<u16, ShapeDesc>,
    dynamic: HashMap<u16, bool>,
}

impl ShapeTable {
    pub fn insert(&mut self, id: u16, shape: ShapeDesc, dynamic: bool) {
        self.shapes.insert(id, shape);
        self.dynamic.insert(id, dynamic);
    }

    pub fn remove(&mut self, id: u16) {
        self.shapes.remove(&id);
        self.dynamic.remove(&id);
    }

    pub fn get(&self, id: u16) -> Option<&ShapeDesc> {
        self.shapes.get(&id)
    }

    pub fn is_dynamic(&self, id: u16) -> bool {
        self.dynamic.get(&id).copied().unwrap_or(false)
    }
}

/// Pluggable initial-scene generator: populates the physics world and
/// registry with whatever static/dynamic content the deployment wants before
/// the first tick runs. [`TestingGroundSeed`] is the default; applications
/// supply their own to replace it.
pub trait SceneSeed {
    fn seed(&self, physics: &mut PhysicsWorld, registry: &mut Registry, shapes: &mut ShapeTable);
}

/// Default scene: a single static ground plane and a scattering of dynamic
/// boxes and spheres.
pub struct TestingGroundSeed;

impl SceneSeed for TestingGroundSeed {
    fn seed(&self, physics: &mut PhysicsWorld, registry: &mut Registry, shapes: &mut ShapeTable) {
        let ground = physics.add_ground(0.0, 50.0);
        if let Ok(id) = registry.add(Actor::Collider(ground), ObjectCategory::Primitive) {
            shapes.insert(id, ShapeDesc::Plane, false);
        }

        for i in 0..8 {
            let x = (i as f32 - 4.0) * 3.0;
            let handle = physics.add_dynamic_box(
                Vec3::new(x, 5.0 + i as f32, 0.0),
                Vec3::splat(0.5),
                1.0,
            );
            if let Ok(id) = registry.add(Actor::Body(handle), ObjectCategory::Primitive) {
                shapes.insert(id, ShapeDesc::Box { half_extents: Vec3::splat(0.5) }, true);
            }
        }

        for i in 0..4 {
            let x = (i as f32 - 2.0) * 4.0;
            let handle = physics.add_dynamic_sphere(Vec3::new(x, 8.0, 3.0), 0.5, 1.0);
            if let Ok(id) = registry.add(Actor::Body(handle), ObjectCategory::Primitive) {
                shapes.insert(id, ShapeDesc::Sphere { radius: 0.5 }, true);
            }
        }
    }
}

/// Bridges the replica cache's [`ObjectSource`] seam to the concrete scene:
/// rapier3d bodies/colliders for pose and sleep state, [`ShapeTable`] for the
/// type tag and ADD-record payload. Borrowed fresh each net tick, never held
/// across a physics step.
pub struct SceneSource<'a> {
    pub physics: &'a PhysicsWorld,
    pub registry: &'a Registry,
    pub shapes: &'a ShapeTable,
}

fn rapier_quat(rot: &rapier3d::prelude::Rotation) -> Quat {
    Quat::from_xyzw(rot.i(), rot.j(), rot.k(), rot.w())
}

impl ObjectSource for SceneSource<'_> {
    fn position(&self, id: u16) -> Vec3 {
        match self.registry.get(id).map(|o| o.actor) {
            Some(Actor::Body(handle)) => self.physics.body_position(handle).unwrap_or(Vec3::ZERO),
            Some(Actor::Collider(handle)) => self
                .physics
                .colliders
                .get(handle)
                .map(|c| {
                    let t = c.translation();
                    Vec3::new(t.x, t.y, t.z)
                })
                .unwrap_or(Vec3::ZERO),
            None => Vec3::ZERO,
        }
    }

    fn orientation(&self, id: u16) -> Quat {
        match self.registry.get(id).map(|o| o.actor) {
            Some(Actor::Body(handle)) => self
                .physics
                .body(handle)
                .map(|b| rapier_quat(b.rotation()))
                .unwrap_or(Quat::IDENTITY),
            Some(Actor::Collider(handle)) => self
                .physics
                .colliders
                .get(handle)
                .map(|c| rapier_quat(c.rotation()))
                .unwrap_or(Quat::IDENTITY),
            None => Quat::IDENTITY,
        }
    }

    fn is_sleeping(&self, id: u16) -> bool {
        match self.registry.get(id).map(|o| o.actor) {
            Some(Actor::Body(handle)) => {
                self.physics.body(handle).map(|b| b.is_sleeping()).unwrap_or(false)
            }
            _ => false,
        }
    }

    fn is_dynamic(&self, id: u16) -> bool {
        self.shapes.is_dynamic(id)
    }

    fn type_tag(&self, id: u16) -> ObjectTypeTag {
        self.shapes.get(id).map(|s| s.tag()).unwrap_or(ObjectTypeTag::Unknown)
    }

    fn write_shape_payload(&self, id: u16, w: &mut Writer) {
        if let Some(shape) = self.shapes.get(id) {
            shape.write_payload(w);
        }
    }
}
