//! Bit-packed quantised encodings for positions and orientations.
//!
//! Grounded on `original_source/src/network/util/bitmagic.hpp`. Constants and
//! bit layouts are carried over exactly; the C macro-heavy style is replaced
//! with plain functions over `glam` types.

use glam::{Quat, Vec3};

/// One sign bit + 15 magnitude bits. Magnitude clamped to `[0, 511]` world units,
/// scaled by 64 before rounding (resolution 1/64 unit).
const FIXED16_SCALE: f32 = 64.0;
const FIXED16_MAX_MAGNITUDE: f32 = 511.0;

pub fn fixed16_encode(v: f32) -> u16 {
    let sign = (v < 0.0) as u16;
    let mag = (v.abs().min(FIXED16_MAX_MAGNITUDE) * FIXED16_SCALE).round() as u16;
    let mag = mag.min(0x7FFF);
    (sign << 15) | mag
}

pub fn fixed16_decode(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let mag = (bits & 0x7FFF) as f32;
    sign * mag / FIXED16_SCALE
}

/// Three fixed-16s concatenated; lossless within the quantisation grid.
pub fn vec3_48_encode(v: Vec3) -> [u16; 3] {
    [
        fixed16_encode(v.x),
        fixed16_encode(v.y),
        fixed16_encode(v.z),
    ]
}

pub fn vec3_48_decode(bits: [u16; 3]) -> Vec3 {
    Vec3::new(
        fixed16_decode(bits[0]),
        fixed16_decode(bits[1]),
        fixed16_decode(bits[2]),
    )
}

/// Range table for the 24-bit delta encoding: (magnitude exclusive upper bound,
/// offset subtracted before quantising, divisor applied to the offset-subtracted
/// magnitude). Each band therefore has a fixed per-band step (1/divisor),
/// regardless of where in the band the magnitude falls.
const DELTA_RANGES: [(f32, f32, f32); 4] = [
    (0.5, 0.0, 255.0),
    (1.5, 0.5, 127.0),
    (3.5, 1.5, 63.0),
    (7.5, 3.5, 31.0),
];

/// Picks the smallest range selector that covers `|delta|`, clamping to the last
/// range (selector 3) if it still exceeds 7.5.
fn delta_range_for(delta: f32) -> usize {
    let mag = delta.abs();
    for (i, (bound, _, _)) in DELTA_RANGES.iter().enumerate() {
        if mag < *bound {
            return i;
        }
    }
    DELTA_RANGES.len() - 1
}

/// One axis of the Vec3-24 delta encoding: selector (0..=3) plus a signed 7-bit
/// magnitude byte. Returns the selector, the encoded byte, and the feedback value
/// the caller should store back into `prev` so server and client stay bit-identical.
pub fn delta_axis_encode(prev: f32, curr: f32) -> (u8, u8, f32) {
    let delta = curr - prev;
    let selector = delta_range_for(delta);
    let (bound, offset, divisor) = DELTA_RANGES[selector];
    let clamped = delta.clamp(-bound, bound);
    let sign = (clamped < 0.0) as u8;
    let mag = (((clamped.abs() - offset) * divisor).round() as u8).min(0x7F);
    let byte = (sign << 7) | mag;
    let decoded_delta = decode_delta_axis(selector as u8, byte);
    (selector as u8, byte, prev + decoded_delta)
}

fn decode_delta_axis(selector: u8, byte: u8) -> f32 {
    let (_, offset, divisor) = DELTA_RANGES[selector as usize & 0x3];
    let sign = if byte & 0x80 != 0 { -1.0 } else { 1.0 };
    let mag = (byte & 0x7F) as f32;
    sign * (offset + mag / divisor)
}

/// Decode one delta axis and return the new `prev` feedback value.
pub fn delta_axis_decode(prev: f32, selector: u8, byte: u8) -> f32 {
    prev + decode_delta_axis(selector, byte)
}

/// Vec3-24 delta: a 6-bit range selector (2 bits per axis, packed by the caller
/// into the record header: x at bits 4-5, y at bits 2-3, z at bits 0-1) plus
/// three signed 7-bit magnitude bytes.
pub fn vec3_24_delta_encode(prev: Vec3, curr: Vec3) -> (u8, [u8; 3], Vec3) {
    let (sx, bx, fx) = delta_axis_encode(prev.x, curr.x);
    let (sy, by, fy) = delta_axis_encode(prev.y, curr.y);
    let (sz, bz, fz) = delta_axis_encode(prev.z, curr.z);
    let selector_bits = (sx << 4) | (sy << 2) | sz;
    (selector_bits, [bx, by, bz], Vec3::new(fx, fy, fz))
}

pub fn vec3_24_delta_decode(prev: Vec3, selector_bits: u8, bytes: [u8; 3]) -> Vec3 {
    let sx = (selector_bits >> 4) & 0x3;
    let sy = (selector_bits >> 2) & 0x3;
    let sz = selector_bits & 0x3;
    Vec3::new(
        delta_axis_decode(prev.x, sx, bytes[0]),
        delta_axis_decode(prev.y, sy, bytes[1]),
        delta_axis_decode(prev.z, sz, bytes[2]),
    )
}

/// Smallest-three quaternion compression: drop the largest-magnitude component,
/// transmit the other three at 9-bit precision. If the dropped component was
/// negative, negate the whole quaternion first (q and -q are the same rotation),
/// so the dropped component always reconstructs as the positive square root.
const SM3_RANGE: u32 = (1 << 9) - 1;
const SM3_SCALE: f32 = SM3_RANGE as f32 * std::f32::consts::SQRT_2;

pub fn quat_sm3_encode(q: Quat) -> u32 {
    let comps = [q.x, q.y, q.z, q.w];
    let (idx, _) = comps
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
        .unwrap();

    let flip = comps[idx] < 0.0;
    let signed = |v: f32| if flip { -v } else { v };

    let mut others = [0f32; 3];
    let mut k = 0;
    for (i, c) in comps.iter().enumerate() {
        if i != idx {
            others[k] = signed(*c);
            k += 1;
        }
    }

    let mut bits: u32 = (idx as u32) << 30;
    for (i, v) in others.iter().enumerate() {
        let sign = (*v < 0.0) as u32;
        let mag = ((v.abs() * SM3_SCALE).round() as u32).min(SM3_RANGE);
        let shift = 20 - i as u32 * 10;
        bits |= (sign << (shift + 9)) | (mag << shift);
    }
    bits
}

pub fn quat_sm3_decode(bits: u32) -> Quat {
    let idx = (bits >> 30) & 0x3;
    let mut comp = [0f32; 4];
    let mut sum_sq = 0f32;
    for i in 0..3 {
        let shift = 20 - i * 10;
        let sign = (bits >> (shift + 9)) & 0x1;
        let mag = (bits >> shift) & SM3_RANGE;
        let mut v = mag as f32 / SM3_SCALE;
        if sign == 1 {
            v = -v;
        }
        comp[if i as u32 >= idx { i + 1 } else { i }] = v;
        sum_sq += v * v;
    }
    let dropped = (1.0 - sum_sq).max(0.0).sqrt();
    comp[idx as usize] = dropped;

    Quat::from_xyzw(comp[0], comp[1], comp[2], comp[3]).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed16_round_trip_within_resolution() {
        for v in [-511.0, -12.25, 0.0, 3.5, 200.125, 511.9] {
            let decoded = fixed16_decode(fixed16_encode(v));
            assert!((decoded - v.clamp(-511.0, 511.0)).abs() <= 1.0 / 64.0 + 1e-5);
        }
    }

    #[test]
    fn vec3_48_round_trip() {
        let v = Vec3::new(1.5, -200.25, 0.0);
        let decoded = vec3_48_decode(vec3_48_encode(v));
        assert!((decoded - v).length() <= 1.0 / 128.0);
    }

    #[test]
    fn vec3_24_delta_matches_feedback() {
        let prev = Vec3::new(1.0, 2.0, 3.0);
        let curr = Vec3::new(1.2, 1.9, 3.4);
        let (selector, bytes, feedback) = vec3_24_delta_encode(prev, curr);
        let decoded = vec3_24_delta_decode(prev, selector, bytes);
        assert_eq!(decoded, feedback);
        assert!((decoded - curr).abs().max_element() <= 1.0 / 255.0 + 1e-5);
    }

    #[test]
    fn vec3_24_delta_selector_3_keeps_fixed_band_resolution() {
        // A delta of 5.0 falls in the selector-3 band [3.5, 7.5); the
        // offset-subtract scheme keeps its step at 1/31 regardless of where
        // in the band it lands, not the ~7.5/31 a naive full-span rescale
        // would give.
        let prev = Vec3::new(0.0, 0.0, 0.0);
        let curr = Vec3::new(5.0, -5.0, 0.0);
        let (selector_bits, bytes, feedback) = vec3_24_delta_encode(prev, curr);
        let decoded = vec3_24_delta_decode(prev, selector_bits, bytes);
        assert_eq!(decoded, feedback);
        assert!((decoded - curr).abs().max_element() <= 1.0 / 31.0 + 1e-5);

        let x_selector = (selector_bits >> 4) & 0x3;
        assert_eq!(x_selector, 3);
    }

    #[test]
    fn quat_smallest_three_round_trip() {
        let samples = [
            Quat::IDENTITY,
            Quat::from_euler(glam::EulerRot::XYZ, 0.3, 1.2, -0.7),
            Quat::from_euler(glam::EulerRot::XYZ, -2.9, 0.1, 3.0),
            Quat::from_xyzw(0.0, 0.0, 0.0, -1.0),
        ];
        for q in samples {
            let q = q.normalize();
            let decoded = quat_sm3_decode(quat_sm3_encode(q));
            let dot = q.dot(decoded).abs();
            assert!(dot >= 0.999, "dot {dot} too low for {q:?} -> {decoded:?}");
        }
    }
}
