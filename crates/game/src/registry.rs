//! Object registry and GC: 16-bit id allocation, presence tracking, and
//! deferred reclamation of released objects.
//!
//! A 16-bit id pool (`id = 0` reserved), a presence bitmap for O(1)
//! membership tests, and a double-buffered trash queue: an object released during
//! tick N has its id freed only at the GC pass that follows tick N+1, so any
//! in-flight per-client diff started before the release still sees a consistent
//! presence bitmap for that tick.

use std::sync::atomic::{AtomicBool, Ordering};

use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};
use thiserror::Error;

const BITMAP_WORDS: usize = 65536 / 64;

/// Fixed-size bitset over the full 16-bit id space.
pub struct PresenceBitmap {
    words: [u64; BITMAP_WORDS],
}

impl Default for PresenceBitmap {
    fn default() -> Self {
        Self {
            words: [0; BITMAP_WORDS],
        }
    }
}

impl PresenceBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u16) -> bool {
        let id = id as usize;
        self.words[id / 64] & (1 << (id % 64)) != 0
    }

    pub fn set(&mut self, id: u16, present: bool) {
        let id = id as usize;
        let mask = 1u64 << (id % 64);
        if present {
            self.words[id / 64] |= mask;
        } else {
            self.words[id / 64] &= !mask;
        }
    }
}

/// The physics actor a registry entry is bound to.
#[derive(Debug, Clone, Copy)]
pub enum Actor {
    Body(RigidBodyHandle),
    Collider(ColliderHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectCategory {
    Primitive,
    Player,
}

pub struct WorldObject {
    pub id: u16,
    pub actor: Actor,
    pub category: ObjectCategory,
    released: AtomicBool,
}

impl WorldObject {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Idempotent: returns `true` only for the thread that performs the
    /// transition, so release-triggered side effects run exactly once.
    pub fn release(&self) -> bool {
        self.released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("object id pool exhausted")]
    IdPoolExhausted,
}

/// Object registry with an id free-list and double-buffered GC.
pub struct Registry {
    objects: Vec<WorldObject>,
    index_by_id: Vec<Option<usize>>, // id -> index into `objects`
    free_ids: Vec<u16>,
    next_fresh_id: u32,
    presence: PresenceBitmap,
    trash_current: Vec<u16>,
    trash_previous: Vec<u16>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            index_by_id: vec![None; 65536],
            free_ids: Vec::new(),
            next_fresh_id: 1, // id 0 is reserved
            presence: PresenceBitmap::new(),
            trash_current: Vec::new(),
            trash_previous: Vec::new(),
        }
    }

    fn allocate_id(&mut self) -> Option<u16> {
        if let Some(id) = self.free_ids.pop() {
            return Some(id);
        }
        if self.next_fresh_id < 65536 {
            let id = self.next_fresh_id as u16;
            self.next_fresh_id += 1;
            return Some(id);
        }
        None
    }

    /// Bind a new object to `actor`, returning its freshly allocated id.
    pub fn add(&mut self, actor: Actor, category: ObjectCategory) -> Result<u16, RegistryError> {
        let id = self.allocate_id().ok_or(RegistryError::IdPoolExhausted)?;
        let index = self.objects.len();
        self.objects.push(WorldObject {
            id,
            actor,
            category,
            released: AtomicBool::new(false),
        });
        self.index_by_id[id as usize] = Some(index);
        self.presence.set(id, true);
        Ok(id)
    }

    pub fn get(&self, id: u16) -> Option<&WorldObject> {
        self.index_by_id[id as usize].map(|i| &self.objects[i])
    }

    /// Mark an object released; it is reaped on the *next* `gc()` call and its
    /// id becomes reusable on the call after that.
    pub fn release(&self, id: u16) -> bool {
        self.get(id).map(|o| o.release()).unwrap_or(false)
    }

    pub fn presence(&self) -> &PresenceBitmap {
        &self.presence
    }

    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Run one GC pass: free ids from the previous pass's trash, then move
    /// newly-released objects into this pass's trash (to be freed next time),
    /// invoking `on_reap` for each (caller releases the bound physics actor
    /// under the scene write lock before this returns).
    pub fn gc(&mut self, mut on_reap: impl FnMut(&WorldObject)) {
        for id in self.trash_previous.drain(..) {
            self.free_ids.push(id);
        }
        std::mem::swap(&mut self.trash_previous, &mut self.trash_current);

        let mut write = 0;
        for read in 0..self.objects.len() {
            let released = self.objects[read].is_released();
            if released {
                on_reap(&self.objects[read]);
                let id = self.objects[read].id;
                self.presence.set(id, false);
                self.index_by_id[id as usize] = None;
                self.trash_current.push(id);
            } else {
                if write != read {
                    self.objects.swap(write, read);
                    self.index_by_id[self.objects[write].id as usize] = Some(write);
                }
                write += 1;
            }
        }
        self.objects.truncate(write);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::PhysicsWorld;

    fn dummy_actor(physics: &mut PhysicsWorld) -> Actor {
        Actor::Body(physics.add_kinematic(glam::Vec3::ZERO))
    }

    #[test]
    fn ids_start_at_one_and_increment() {
        let mut physics = PhysicsWorld::new();
        let mut reg = Registry::new();
        let a = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        let b = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert!(reg.presence().get(a));
        assert!(reg.presence().get(b));
    }

    #[test]
    fn release_is_idempotent() {
        let mut physics = PhysicsWorld::new();
        let mut reg = Registry::new();
        let id = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        assert!(reg.release(id));
        assert!(!reg.release(id));
    }

    #[test]
    fn id_is_not_reused_until_one_gc_cycle_after_trash() {
        let mut physics = PhysicsWorld::new();
        let mut reg = Registry::new();
        let id = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        reg.release(id);

        // first gc: moves `id` into trash_current, doesn't free it yet
        reg.gc(|_| {});
        assert!(!reg.presence().get(id));
        let fresh = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        assert_ne!(fresh, id, "id must not be reused before the following gc");

        // second gc: trash from the first pass is now freed
        reg.gc(|_| {});
        let recycled = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        assert_eq!(recycled, id);
    }

    #[test]
    fn presence_matches_live_objects() {
        let mut physics = PhysicsWorld::new();
        let mut reg = Registry::new();
        let a = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        let b = reg.add(dummy_actor(&mut physics), ObjectCategory::Primitive).unwrap();
        reg.release(a);
        reg.gc(|_| {});
        assert!(!reg.presence().get(a));
        assert!(reg.presence().get(b));
        assert_eq!(reg.len(), 1);
    }
}
