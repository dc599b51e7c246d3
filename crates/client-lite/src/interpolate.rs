//! Turns a [`Mirror`] into render poses: lerp/slerp between the last two
//! snapshots, no buffering and no extrapolation past `net`.
//!
//! This crate only ever holds the two samples a record carries
//! (`prev`/`net`) and clamps alpha at 1.0 rather than extrapolating past the
//! newest sample or correcting for clock offset. Quaternion blending calls
//! `glam::Quat::slerp` directly — it already takes the shortest path, so a
//! manual dot-product negation beforehand would be redundant.

use glam::{Quat, Vec3};

use crate::mirror::Mirror;

#[derive(Debug, Clone, Copy)]
pub struct InterpolatedPose {
    pub local_id: u64,
    pub position: Vec3,
    pub orientation: Quat,
}

/// Interpolated pose for every live entry in `mirror`, at `now_ms`.
///
/// `net_interval_ms` is the server's advertised snapshot cadence; it sets the
/// denominator for alpha, not a wall-clock delta between two arrivals.
pub fn interpolate(mirror: &Mirror, now_ms: i64, net_interval_ms: u32) -> Vec<InterpolatedPose> {
    let elapsed = (now_ms - mirror.last_snapshot_time_ms()).max(0) as f32;
    let alpha = if net_interval_ms == 0 {
        1.0
    } else {
        (elapsed / net_interval_ms as f32).clamp(0.0, 1.0)
    };

    mirror
        .entries()
        .iter()
        .map(|entry| {
            let (position, orientation) = if entry.sleeping {
                (entry.net_pos, entry.net_quat)
            } else {
                (
                    entry.prev_pos.lerp(entry.net_pos, alpha),
                    entry.prev_quat.slerp(entry.net_quat, alpha),
                )
            };
            InterpolatedPose { local_id: entry.local_id, position, orientation }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{MirrorEntry, Shape};
    use physx_core::ObjectTypeTag;
    use std::collections::HashMap;

    fn entry(prev: Vec3, net: Vec3) -> MirrorEntry {
        MirrorEntry {
            local_id: 1,
            type_tag: ObjectTypeTag::Box,
            dynamic: true,
            sleeping: false,
            shape: Shape::Box { half_extents: Vec3::ONE },
            prev_pos: prev,
            net_pos: net,
            prev_quat: Quat::IDENTITY,
            net_quat: Quat::IDENTITY,
        }
    }

    fn mirror_with(entries: Vec<MirrorEntry>) -> Mirror {
        Mirror {
            entries,
            players: HashMap::new(),
            last_snapshot_time_ms: 0,
            next_local_id: 1,
        }
    }

    #[test]
    fn halfway_through_the_interval_blends_evenly() {
        let mirror = mirror_with(vec![entry(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0))]);

        let poses = interpolate(&mirror, 50, 100);
        assert_eq!(poses.len(), 1);
        assert!((poses[0].position.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn alpha_clamps_at_one_past_the_interval() {
        let mirror = mirror_with(vec![entry(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0))]);

        let poses = interpolate(&mirror, 500, 100);
        assert!((poses[0].position.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn sleeping_entries_skip_interpolation() {
        let mut e = entry(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0));
        e.sleeping = true;
        let mirror = mirror_with(vec![e]);

        let poses = interpolate(&mirror, 50, 100);
        assert_eq!(poses[0].position, Vec3::new(10.0, 0.0, 0.0));
    }
}
