mod snapshot;
mod sync;
mod world;

pub use rapier3d::dynamics::RigidBodyHandle as PhysicsHandle;
pub use snapshot::PhysicsSnapshot;
pub use sync::PhysicsSync;
pub use world::PhysicsWorld;
