use bitflags::bitflags;

use crate::wire::{Reader, Writer};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputFlags: u8 {
        const JUMP = 0b00001;
        const MOVE_FORWARD = 0b00010;
        const MOVE_BACK = 0b00100;
        const MOVE_LEFT = 0b01000;
        const MOVE_RIGHT = 0b10000;
    }
}

/// One client-to-server input sample: movement flags plus a 2D aim
/// direction (camera forward, x/z). Sent on every key transition, optionally
/// every frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInput {
    pub flags: InputFlags,
    pub aim_x: f32,
    pub aim_z: f32,
}

impl PlayerInput {
    pub fn encode(&self, w: &mut Writer) {
        w.write_u8(self.flags.bits());
        w.write_f32(self.aim_x);
        w.write_f32(self.aim_z);
    }

    pub fn decode(r: &Reader) -> Self {
        let flags = InputFlags::from_bits_truncate(r.read_u8());
        let aim_x = r.read_f32();
        let aim_z = r.read_f32();
        Self {
            flags,
            aim_x,
            aim_z,
        }
    }

    pub fn move_vector(&self) -> glam::Vec3 {
        let mut v = glam::Vec3::ZERO;
        if self.flags.contains(InputFlags::MOVE_FORWARD) {
            v.z -= 1.0;
        }
        if self.flags.contains(InputFlags::MOVE_BACK) {
            v.z += 1.0;
        }
        if self.flags.contains(InputFlags::MOVE_LEFT) {
            v.x -= 1.0;
        }
        if self.flags.contains(InputFlags::MOVE_RIGHT) {
            v.x += 1.0;
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let input = PlayerInput {
            flags: InputFlags::JUMP | InputFlags::MOVE_FORWARD,
            aim_x: 0.5,
            aim_z: -0.3,
        };
        let mut w = Writer::new();
        input.encode(&mut w);
        let buf = w.finalize();
        let r = Reader::new(&buf);
        assert_eq!(PlayerInput::decode(&r), input);
    }
}
