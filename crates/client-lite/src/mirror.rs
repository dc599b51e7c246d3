//! The client's local mirror: one [`MirrorEntry`] per cached object, in the
//! same order as the server's `ReplicaCache` for that connection, plus a
//! pid→player table. No object id travels over the wire (on-wire order *is*
//! the identity, mirroring `game::replica::ReplicaCache`'s own entries
//! vector); [`MirrorEntry::local_id`] is assigned here purely so callers have
//! something stable to key off of across decode calls.

use std::collections::HashMap;

use glam::{Quat, Vec3};
use physx_core::ObjectTypeTag;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Plane,
    Capsule { half_height: f32, radius: f32 },
    Player { half_height: f32, radius: f32 },
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct MirrorEntry {
    pub local_id: u64,
    pub type_tag: ObjectTypeTag,
    pub dynamic: bool,
    pub sleeping: bool,
    pub shape: Shape,
    pub prev_pos: Vec3,
    pub net_pos: Vec3,
    pub prev_quat: Quat,
    pub net_quat: Quat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub grounded: bool,
    pub last_ground_tick: u32,
    pub position: Vec3,
    pub velocity: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub enum MirrorEvent {
    PlayerAdded { pid: u32, snapshot: PlayerSnapshot },
    PlayerUpdated { pid: u32, snapshot: PlayerSnapshot },
    PlayerRemoved { pid: u32 },
    ObjectAdded { local_id: u64 },
    ObjectUpdated { local_id: u64 },
    ObjectRemoved { local_id: u64 },
}

/// Per-connection client-side mirror. Kept under one mutex by the transport
/// layer so a render-thread read never sees a half-applied decode.
pub struct Mirror {
    pub(crate) entries: Vec<MirrorEntry>,
    pub(crate) players: HashMap<u32, PlayerSnapshot>,
    pub(crate) last_snapshot_time_ms: i64,
    pub(crate) next_local_id: u64,
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            players: HashMap::new(),
            last_snapshot_time_ms: 0,
            next_local_id: 1,
        }
    }

    pub fn cache_size(&self) -> usize {
        self.entries.len()
    }

    pub fn players(&self) -> impl Iterator<Item = (&u32, &PlayerSnapshot)> {
        self.players.iter()
    }

    pub fn player(&self, pid: u32) -> Option<&PlayerSnapshot> {
        self.players.get(&pid)
    }

    pub fn entries(&self) -> &[MirrorEntry] {
        &self.entries
    }

    pub fn last_snapshot_time_ms(&self) -> i64 {
        self.last_snapshot_time_ms
    }

    pub(crate) fn fresh_local_id(&mut self) -> u64 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }
}
