//! Integration tests for the skill cast server components
//!
//! These tests validate cross-component interactions: the wire protocol over
//! real sockets and full cast conversations driven through a field.

use bincode::{deserialize, serialize};
use server::broadcast::{GameMessage, ObserverBroadcaster};
use server::cast::TargetCategory;
use server::field::{Field, FieldCommand, FieldEntity};
use server::metadata::default_table;
use shared::protocol::{AttackSplashCommand, AttackTargetCommand, UseCommand};
use shared::{Packet, SkillCommand, Vec3};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that a skill command survives the envelope round trip intact
    #[test]
    fn skill_command_through_envelope() {
        let command = SkillCommand::Use(UseCommand {
            cast_uid: 55,
            server_tick: 10,
            skill_id: 100201,
            level: 1,
            motion_point: 0,
            position: Vec3::new(1.0, 2.0, 3.0),
            direction: Vec3::new(0.0, 1.0, 0.0),
            rotation: Vec3::default(),
            rotate2_z: 45.0,
            item_uid: 0,
            is_hold: false,
            hold_int: None,
            hold_string: None,
        });

        let envelope = Packet::Skill {
            data: command.encode(),
        };
        let serialized = serialize(&envelope).unwrap();
        let deserialized: Packet = deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Skill { data } => {
                let decoded = SkillCommand::decode(&data).unwrap();
                assert_eq!(decoded, command);
            }
            _ => panic!("Packet type mismatch after serialization"),
        }
    }

    /// Tests real UDP socket communication with a skill envelope
    #[tokio::test]
    async fn udp_socket_communication() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind server socket");
        let server_addr = server_socket.local_addr().unwrap();

        // Echo server
        let server_socket_clone = server_socket.try_clone().unwrap();
        thread::spawn(move || {
            let mut buf = [0; 1024];
            if let Ok((size, client_addr)) = server_socket_clone.recv_from(&mut buf) {
                let _ = server_socket_clone.send_to(&buf[..size], client_addr);
            }
        });

        sleep(Duration::from_millis(10)).await;

        let client_socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind client socket");
        client_socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();

        let test_packet = Packet::Skill {
            data: SkillCommand::Cancel { cast_uid: 55 }.encode(),
        };
        let serialized = serialize(&test_packet).unwrap();

        client_socket.send_to(&serialized, server_addr).unwrap();

        let mut buf = [0; 1024];
        let (size, _) = client_socket.recv_from(&mut buf).unwrap();
        let received_packet: Packet = deserialize(&buf[..size]).unwrap();

        match received_packet {
            Packet::Skill { data } => {
                let command = SkillCommand::decode(&data).unwrap();
                assert_eq!(command, SkillCommand::Cancel { cast_uid: 55 });
            }
            _ => panic!("Wrong packet type received"),
        }
    }
}

/// CAST LIFECYCLE TESTS
mod cast_flow_tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9200".parse().unwrap()
    }

    /// A field with one session and hostiles 10..=14 on the x axis.
    fn test_field() -> (Field, mpsc::UnboundedReceiver<GameMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut field = Field::new(1, Arc::new(default_table()), ObserverBroadcaster::new(tx));
        for target_id in 10..15 {
            field.insert_entity(
                TargetCategory::Hostile,
                FieldEntity {
                    target_id,
                    object_uid: 9000 + target_id as i64,
                    position: Vec3::new(target_id as f32, 0.0, 0.0),
                },
            );
        }
        field.apply(FieldCommand::Join {
            session_id: 1,
            addr: test_addr(),
        });
        (field, rx)
    }

    fn use_command(cast_uid: i64, skill_id: i32, motion_point: u8, is_hold: bool) -> SkillCommand {
        SkillCommand::Use(UseCommand {
            cast_uid,
            server_tick: 0,
            skill_id,
            level: 1,
            motion_point,
            position: Vec3::new(12.0, 0.0, 0.0),
            direction: Vec3::new(0.0, 1.0, 0.0),
            rotation: Vec3::default(),
            rotate2_z: 0.0,
            item_uid: 0,
            is_hold,
            hold_int: if is_hold { Some(1) } else { None },
            hold_string: if is_hold {
                Some("hold_a".to_string())
            } else {
                None
            },
        })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GameMessage>) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Full use / attack / cancel conversation for skill 100201
    #[test]
    fn cast_conversation_with_overflowing_targets() {
        let (mut field, mut rx) = test_field();

        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: use_command(55, 100201, 0, false),
        });

        let cast = field.player(1).unwrap().registry.get(55).unwrap();
        assert_eq!(cast.motion_index(), Some(0));
        assert_eq!(cast.attack_index(), None);

        // Four reported targets against a three-target limit.
        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: SkillCommand::AttackTarget(AttackTargetCommand {
                cast_uid: 55,
                target_uid: 9010,
                impact_position: Vec3::new(11.0, 0.0, 0.0),
                direction: Vec3::new(0.0, 1.0, 0.0),
                attack_point: 0,
                iterations: 1,
                target_ids: vec![10, 11, 12, 13],
            }),
        });

        let cast = field.player(1).unwrap().registry.get(55).unwrap();
        assert_eq!(cast.target_count(), 3);
        assert!(cast.has_target(10));
        assert!(cast.has_target(11));
        assert!(cast.has_target(12));
        assert!(!cast.has_target(13));

        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: SkillCommand::Cancel { cast_uid: 55 },
        });
        assert!(field.player(1).unwrap().registry.get(55).is_none());

        let messages = drain(&mut rx);
        let cancel_broadcasts = messages
            .iter()
            .filter(|message| {
                matches!(
                    message,
                    GameMessage::BroadcastPacket {
                        packet: Packet::SkillCancel { cast_uid: 55, .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(cancel_broadcasts, 1);
    }

    /// A use with an out-of-range motion point leaves no registry entry
    #[test]
    fn invalid_motion_point_is_rejected() {
        let (mut field, mut rx) = test_field();

        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: use_command(55, 100201, 5, false),
        });

        assert!(field.player(1).unwrap().registry.get(55).is_none());

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            GameMessage::SendPacket {
                packet: Packet::SkillCastFailed { cast_uid: 55 },
                ..
            }
        ));
    }

    /// Splash resolution happens on the tick after registration
    #[test]
    fn splash_resolves_on_later_tick() {
        let (mut field, mut rx) = test_field();

        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: use_command(77, 100300, 0, false),
        });
        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: SkillCommand::AttackSplash(AttackSplashCommand {
                cast_uid: 77,
                attack_point: 0,
                position: Vec3::new(12.0, 0.0, 0.0),
                rotation: Vec3::default(),
            }),
        });

        // Nothing resolves synchronously.
        assert_eq!(field.pending_area_skills(), 1);
        assert_eq!(field.player(1).unwrap().registry.get(77).unwrap().target_count(), 0);
        let _ = drain(&mut rx);

        field.tick();

        // The area resolved against the hostiles inside the 5.0 radius and
        // the cast completed.
        assert_eq!(field.pending_area_skills(), 0);
        assert!(field.player(1).unwrap().registry.get(77).is_none());

        let messages = drain(&mut rx);
        let damage = messages.iter().find_map(|message| match message {
            GameMessage::BroadcastPacket {
                packet: Packet::SkillDamage { targets, .. },
                ..
            } => Some(targets.clone()),
            _ => None,
        });
        let mut targets = damage.expect("splash damage broadcast");
        targets.sort_unstable();
        assert_eq!(targets, vec![10, 11, 12, 13, 14]);
    }

    /// A held cast auto-advances its state phase when the deadline arrives
    #[test]
    fn held_cast_auto_advances_state_phase() {
        let (mut field, mut rx) = test_field();

        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: use_command(88, 100300, 0, true),
        });
        let _ = drain(&mut rx);

        // The hold deadline sits a fixed number of ticks out.
        for _ in 0..30 {
            field.tick();
        }

        let messages = drain(&mut rx);
        let advanced = messages.iter().any(|message| {
            matches!(
                message,
                GameMessage::BroadcastPacket {
                    packet: Packet::SkillUse {
                        cast_uid: 88,
                        motion_point: 1,
                        ..
                    },
                    ..
                }
            )
        });
        assert!(advanced, "expected a phase-advance broadcast");

        // The deadline is one-shot.
        for _ in 0..30 {
            field.tick();
        }
        assert!(drain(&mut rx).is_empty());
    }

    /// Sessions leaving mid-cast tear their registry down
    #[test]
    fn leave_drops_in_flight_casts() {
        let (mut field, _rx) = test_field();

        field.apply(FieldCommand::Skill {
            session_id: 1,
            command: use_command(99, 100201, 0, false),
        });
        assert!(field.player(1).is_some());

        field.apply(FieldCommand::Leave { session_id: 1 });
        assert!(field.player(1).is_none());
    }
}
