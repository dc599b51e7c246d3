pub mod net;
pub mod physics;
pub mod player;
pub mod registry;
pub mod replica;
pub mod snapshot;
pub mod transport;
pub mod wire;

pub use net::DEFAULT_PORT;
pub use physics::{PhysicsSnapshot, PhysicsSync, PhysicsWorld};
pub use player::{InputFlags, PlayerConfig, PlayerController, PlayerInput, PlayerState};
pub use registry::{Actor, ObjectCategory, PresenceBitmap, Registry, RegistryError, WorldObject};
pub use replica::{ObjectSource, ObjectTypeTag, RecordSubop, ReplicaCache, StateFlags};
pub use snapshot::{Entity, EntityType};
pub use transport::{Client, Connection, ConnectionState, Listener, TransportError, ALPN};
pub use wire::{
    CompressionProfile, Framer, FramerError, Reader, Writer, MAX_DECOMP, MAX_RECV,
    PROTOCOL_VERSION,
};
