//! Client protocol decoder. Inverse of `game::replica::ReplicaCache::diff`;
//! the record dispatch mirrors that function's subop match arm for arm, with
//! a streaming bit-packed reader and explicit cache-size integrity echoes
//! instead of a deserialize-in-one-shot snapshot struct.

use thiserror::Error;

use physx_core::wire::{
    quat_sm3_decode, vec3_24_delta_decode, vec3_48_decode, Reader, PROTOCOL_VERSION,
};
use physx_core::{ObjectTypeTag, RecordSubop, StateFlags};

use crate::mirror::{Mirror, MirrorEntry, MirrorEvent, PlayerSnapshot, Shape};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("protocol version mismatch: peer speaks {0}.{1}.{2}")]
    VersionMismatch(u8, u8, u8),
    #[error("cache size mismatch: server declared {expected}, mirror holds {actual}")]
    CacheSizeMismatch { expected: u32, actual: u32 },
    #[error("final cache size mismatch: expected {expected}, got {actual}")]
    FinalCacheSizeMismatch { expected: u32, actual: u32 },
    #[error("add count {0} exceeds the 16-bit object id space")]
    AddCountOverflow(u32),
    #[error("{0} trailing bytes after a fully parsed snapshot")]
    TrailingBytes(usize),
    #[error("reader ran past the end of the payload")]
    ReaderError,
}

impl Mirror {
    /// Apply one framed, already-decompressed snapshot payload. On any
    /// [`ProtocolError`] the connection must be dropped: the mirror may be
    /// left partially updated, but that's moot since the caller disconnects.
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<MirrorEvent>, ProtocolError> {
        let r = Reader::new(payload);
        let mut events = Vec::new();

        let version = (r.read_u8(), r.read_u8(), r.read_u8());
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch(version.0, version.1, version.2));
        }

        self.last_snapshot_time_ms = r.read_i64();

        self.decode_player_table(&r, &mut events);

        let declared_cache_size = r.read_u32();
        if declared_cache_size as usize != self.entries.len() {
            return Err(ProtocolError::CacheSizeMismatch {
                expected: declared_cache_size,
                actual: self.entries.len() as u32,
            });
        }

        self.decode_cache_entries(&r, &mut events)?;
        self.decode_adds(&r, &mut events)?;

        let final_cache_size = r.read_u32();
        if final_cache_size as usize != self.entries.len() {
            return Err(ProtocolError::FinalCacheSizeMismatch {
                expected: final_cache_size,
                actual: self.entries.len() as u32,
            });
        }

        if r.has_error() {
            return Err(ProtocolError::ReaderError);
        }
        if r.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes(r.remaining()));
        }

        Ok(events)
    }

    fn decode_player_table(&mut self, r: &Reader, events: &mut Vec<MirrorEvent>) {
        let player_count = r.read_u32();
        let mut seen = std::collections::HashSet::with_capacity(player_count as usize);

        for _ in 0..player_count {
            let pid = r.read_u32();
            let grounded = r.read_u8() != 0;
            let last_ground_tick = r.read_u32();
            let position = glam::Vec3::new(r.read_f32(), r.read_f32(), r.read_f32());
            let velocity = glam::Vec3::new(r.read_f32(), r.read_f32(), r.read_f32());
            let snapshot = PlayerSnapshot { grounded, last_ground_tick, position, velocity };

            seen.insert(pid);
            if self.players.insert(pid, snapshot).is_some() {
                events.push(MirrorEvent::PlayerUpdated { pid, snapshot });
            } else {
                events.push(MirrorEvent::PlayerAdded { pid, snapshot });
            }
        }

        let stale: Vec<u32> = self
            .players
            .keys()
            .copied()
            .filter(|pid| !seen.contains(pid))
            .collect();
        for pid in stale {
            self.players.remove(&pid);
            events.push(MirrorEvent::PlayerRemoved { pid });
        }
    }

    fn decode_cache_entries(
        &mut self,
        r: &Reader,
        events: &mut Vec<MirrorEvent>,
    ) -> Result<(), ProtocolError> {
        let mut write = 0;
        for read in 0..self.entries.len() {
            let mut entry = self.entries[read];
            let header = r.read_u8();
            let subop = header & 0xC0;
            let low = header & 0x3F;

            if subop == RecordSubop::UpdatePose as u8 {
                apply_update_pose(&mut entry, r, low);
                events.push(MirrorEvent::ObjectUpdated { local_id: entry.local_id });
                self.entries[write] = entry;
                write += 1;
                continue;
            }

            if subop != RecordSubop::StateChange as u8 {
                return Err(ProtocolError::ReaderError);
            }

            let flags = StateFlags::from_bits_truncate(low);
            if flags.contains(StateFlags::REMOVE) {
                events.push(MirrorEvent::ObjectRemoved { local_id: entry.local_id });
                continue;
            }

            if flags.contains(StateFlags::SLEEP) {
                if entry.sleeping {
                    // still sleeping: no payload, entry unchanged
                } else {
                    // falling asleep: lossless pose follows
                    let pos = vec3_48_decode([r.read_u16(), r.read_u16(), r.read_u16()]);
                    let quat = quat_sm3_decode(r.read_u32());
                    entry.prev_pos = entry.net_pos;
                    entry.prev_quat = entry.net_quat;
                    entry.net_pos = pos;
                    entry.net_quat = quat;
                    entry.sleeping = true;
                }
            } else {
                // waking: an inlined UpdatePose record follows immediately
                let update_header = r.read_u8();
                apply_update_pose(&mut entry, r, update_header & 0x3F);
                entry.sleeping = false;
            }

            events.push(MirrorEvent::ObjectUpdated { local_id: entry.local_id });
            self.entries[write] = entry;
            write += 1;
        }
        self.entries.truncate(write);
        Ok(())
    }

    fn decode_adds(&mut self, r: &Reader, events: &mut Vec<MirrorEvent>) -> Result<(), ProtocolError> {
        let adds_count = r.read_u32();
        if adds_count > 65536 {
            return Err(ProtocolError::AddCountOverflow(adds_count));
        }

        for _ in 0..adds_count {
            let header = r.read_u8();
            let dynamic = (header & 0xC0) == RecordSubop::AddDynamic as u8;
            let type_tag = type_tag_from_bits(header & 0x3F);

            let pos = vec3_48_decode([r.read_u16(), r.read_u16(), r.read_u16()]);
            let quat = quat_sm3_decode(r.read_u32());
            let shape = decode_shape(type_tag, r);

            let local_id = self.fresh_local_id();
            self.entries.push(MirrorEntry {
                local_id,
                type_tag,
                dynamic,
                sleeping: false,
                shape,
                prev_pos: pos,
                net_pos: pos,
                prev_quat: quat,
                net_quat: quat,
            });
            events.push(MirrorEvent::ObjectAdded { local_id });
        }
        Ok(())
    }
}

fn apply_update_pose(entry: &mut MirrorEntry, r: &Reader, selector: u8) {
    let bytes = [r.read_u8(), r.read_u8(), r.read_u8()];
    let new_pos = vec3_24_delta_decode(entry.net_pos, selector, bytes);
    let quat = quat_sm3_decode(r.read_u32());
    entry.prev_pos = entry.net_pos;
    entry.prev_quat = entry.net_quat;
    entry.net_pos = new_pos;
    entry.net_quat = quat;
}

fn type_tag_from_bits(bits: u8) -> ObjectTypeTag {
    match bits {
        1 => ObjectTypeTag::Box,
        2 => ObjectTypeTag::Sphere,
        3 => ObjectTypeTag::Plane,
        4 => ObjectTypeTag::Capsule,
        5 => ObjectTypeTag::Player,
        _ => ObjectTypeTag::Unknown,
    }
}

fn decode_shape(tag: ObjectTypeTag, r: &Reader) -> Shape {
    match tag {
        ObjectTypeTag::Box => Shape::Box {
            half_extents: glam::Vec3::new(r.read_f32(), r.read_f32(), r.read_f32()),
        },
        ObjectTypeTag::Sphere => Shape::Sphere { radius: r.read_f32() },
        ObjectTypeTag::Plane => Shape::Plane,
        ObjectTypeTag::Capsule => Shape::Capsule {
            half_height: r.read_f32(),
            radius: r.read_f32(),
        },
        ObjectTypeTag::Player => Shape::Player {
            half_height: r.read_f32(),
            radius: r.read_f32(),
        },
        ObjectTypeTag::Unknown => Shape::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physx_core::wire::Writer;

    fn header(timestamp_ms: i64) -> Writer {
        let mut w = Writer::new();
        w.write_u8(PROTOCOL_VERSION.0);
        w.write_u8(PROTOCOL_VERSION.1);
        w.write_u8(PROTOCOL_VERSION.2);
        w.write_i64(timestamp_ms);
        w
    }

    #[test]
    fn add_then_remove_round_trips_through_mirror() {
        let mut mirror = Mirror::new();

        let mut w = header(1000);
        w.write_u32(0); // no players
        w.write_u32(0); // cache_size before
        w.write_u32(1); // adds_count
        w.write_u8(RecordSubop::AddDynamic as u8 | 1); // Box tag
        let bits = physx_core::wire::vec3_48_encode(glam::Vec3::new(1.0, 2.0, 3.0));
        w.write_u16(bits[0]);
        w.write_u16(bits[1]);
        w.write_u16(bits[2]);
        w.write_u32(physx_core::wire::quat_sm3_encode(glam::Quat::IDENTITY));
        w.write_f32(0.5);
        w.write_f32(0.5);
        w.write_f32(0.5);
        w.write_u32(1); // final_cache_size
        let events = mirror.decode(&w.finalize()).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MirrorEvent::ObjectAdded { .. }));
        assert_eq!(mirror.cache_size(), 1);

        let mut w2 = header(1100);
        w2.write_u32(0);
        w2.write_u32(1); // cache_size before
        w2.write_u8(RecordSubop::StateChange as u8 | StateFlags::REMOVE.bits());
        w2.write_u32(0); // adds_count
        w2.write_u32(0); // final_cache_size
        let events2 = mirror.decode(&w2.finalize()).unwrap();
        assert!(matches!(events2[0], MirrorEvent::ObjectRemoved { .. }));
        assert_eq!(mirror.cache_size(), 0);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut mirror = Mirror::new();
        let mut w = Writer::new();
        w.write_u8(9);
        w.write_u8(9);
        w.write_u8(9);
        let err = mirror.decode(&w.finalize()).unwrap_err();
        assert!(matches!(err, ProtocolError::VersionMismatch(9, 9, 9)));
    }

    #[test]
    fn cache_size_mismatch_is_rejected() {
        let mut mirror = Mirror::new();
        let mut w = header(0);
        w.write_u32(0);
        w.write_u32(5); // claims 5 cached objects, mirror has 0
        let err = mirror.decode(&w.finalize()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CacheSizeMismatch { expected: 5, actual: 0 }
        ));
    }
}
