use serde::{Deserialize, Serialize};

pub mod codec;
pub mod protocol;

pub use codec::{ByteReader, ByteWriter, DecodeError};
pub use protocol::SkillCommand;

pub const PROTOCOL_VERSION: u32 = 1;

/// World-space vector as carried by the skill command layer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Datagram envelope exchanged between client and server.
///
/// Client-bound skill traffic uses dedicated variants carrying only
/// server-validated fields; the server-bound `Skill` variant carries the raw
/// command buffer so the byte layout of the skill layer is preserved exactly
/// as the client wrote it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Skill {
        data: Vec<u8>,
    },
    Disconnect,

    Connected {
        session_id: u32,
    },
    SkillUse {
        caster: u32,
        cast_uid: i64,
        skill_id: i32,
        level: i16,
        motion_point: u8,
        position: Vec3,
        direction: Vec3,
    },
    SkillSync {
        caster: u32,
        cast_uid: i64,
        skill_id: i32,
        motion_point: u8,
    },
    SkillDamage {
        caster: u32,
        cast_uid: i64,
        attack_point: u8,
        targets: Vec<i32>,
    },
    SkillCancel {
        caster: u32,
        cast_uid: i64,
    },
    SkillCastFailed {
        cast_uid: i64,
    },
    Disconnected {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec3_distance_squared() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 6.0, 3.0);
        assert_approx_eq!(a.distance_squared(&b), 25.0, 0.0001);
    }

    #[test]
    fn test_vec3_magnitude() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert_approx_eq!(v.magnitude(), 5.0, 0.0001);
    }

    #[test]
    fn test_packet_serialization_skill() {
        let packet = Packet::Skill {
            data: vec![0, 1, 2, 3, 4],
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Skill { data } => assert_eq!(data, vec![0, 1, 2, 3, 4]),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_skill_use() {
        let packet = Packet::SkillUse {
            caster: 7,
            cast_uid: 55,
            skill_id: 100201,
            level: 1,
            motion_point: 0,
            position: Vec3::new(1.0, 2.0, 3.0),
            direction: Vec3::default(),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::SkillUse {
                caster,
                cast_uid,
                skill_id,
                level,
                motion_point,
                position,
                ..
            } => {
                assert_eq!(caster, 7);
                assert_eq!(cast_uid, 55);
                assert_eq!(skill_id, 100201);
                assert_eq!(level, 1);
                assert_eq!(motion_point, 0);
                assert_approx_eq!(position.x, 1.0, 0.0001);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_skill_damage() {
        let packet = Packet::SkillDamage {
            caster: 3,
            cast_uid: 99,
            attack_point: 1,
            targets: vec![10, 11, 12],
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::SkillDamage {
                attack_point,
                targets,
                ..
            } => {
                assert_eq!(attack_point, 1);
                assert_eq!(targets, vec![10, 11, 12]);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
