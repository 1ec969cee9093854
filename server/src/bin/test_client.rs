//! Scripted client exercising a full cast conversation against a running
//! server: use, attack waves, sync, tick-sync, cancel. Run the server first,
//! then this binary, and watch both sides narrate the exchange.

use bincode::{deserialize, serialize};
use shared::protocol::{
    AttackSplashCommand, AttackTargetCommand, SyncCommand, UseCommand,
};
use shared::{Packet, SkillCommand, Vec3, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

async fn send_skill(
    socket: &UdpSocket,
    server_addr: SocketAddr,
    command: &SkillCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let packet = Packet::Skill {
        data: command.encode(),
    };
    socket.send_to(&serialize(&packet)?, server_addr).await?;
    Ok(())
}

async fn recv_packet(
    socket: &UdpSocket,
    buf: &mut [u8],
) -> Result<Packet, Box<dyn std::error::Error>> {
    let (len, _) = socket.recv_from(buf).await?;
    Ok(deserialize::<Packet>(&buf[0..len])?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:8080".parse::<SocketAddr>()?;

    println!("Sending connection request to {}", server_addr);
    let connect = Packet::Connect {
        client_version: PROTOCOL_VERSION,
    };
    socket.send_to(&serialize(&connect)?, server_addr).await?;

    let mut buf = [0u8; 2048];
    let session_id = match recv_packet(&socket, &mut buf).await? {
        Packet::Connected { session_id } => {
            println!("Connected with session ID: {}", session_id);
            session_id
        }
        other => {
            println!("Connection refused: {:?}", other);
            return Ok(());
        }
    };

    let cast_uid = rand::random::<i64>().abs();
    println!("Starting cast {} for skill 100201", cast_uid);

    // Use: begin the cast at motion point 0.
    let use_command = SkillCommand::Use(UseCommand {
        cast_uid,
        server_tick: 0,
        skill_id: 100201,
        level: 1,
        motion_point: 0,
        position: Vec3::new(10.0, 0.0, 0.0),
        direction: Vec3::new(0.0, 1.0, 0.0),
        rotation: Vec3::default(),
        rotate2_z: 0.0,
        item_uid: 0,
        is_hold: false,
        hold_int: None,
        hold_string: None,
    });
    send_skill(&socket, server_addr, &use_command).await?;
    println!("Use broadcast: {:?}", recv_packet(&socket, &mut buf).await?);

    // Attack: report four targets against a three-target skill; the server
    // clamps the batch.
    let attack = SkillCommand::AttackTarget(AttackTargetCommand {
        cast_uid,
        target_uid: 9010,
        impact_position: Vec3::new(11.0, 0.0, 0.0),
        direction: Vec3::new(0.0, 1.0, 0.0),
        attack_point: 0,
        iterations: 1,
        target_ids: vec![10, 11, 12, 13],
    });
    send_skill(&socket, server_addr, &attack).await?;
    println!(
        "Damage broadcast: {:?}",
        recv_packet(&socket, &mut buf).await?
    );

    // Sync: re-report the armed motion.
    let sync = SkillCommand::Sync(SyncCommand {
        cast_uid,
        skill_id: 100201,
        level: 1,
        motion_point: 0,
        position: Vec3::new(10.0, 0.0, 0.0),
        direction: Vec3::new(0.0, 1.0, 0.0),
        rotation: Vec3::default(),
        input: Vec3::default(),
        is_charge: false,
        is_release: false,
    });
    send_skill(&socket, server_addr, &sync).await?;
    println!("Sync broadcast: {:?}", recv_packet(&socket, &mut buf).await?);

    // Tick sync is fire-and-forget bookkeeping.
    send_skill(
        &socket,
        server_addr,
        &SkillCommand::TickSync {
            cast_uid,
            server_tick: 100,
        },
    )
    .await?;

    sleep(Duration::from_millis(200)).await;

    // Cancel ends the conversation with exactly one broadcast.
    send_skill(&socket, server_addr, &SkillCommand::Cancel { cast_uid }).await?;
    println!(
        "Cancel broadcast: {:?}",
        recv_packet(&socket, &mut buf).await?
    );

    // A second conversation showing deferred splash resolution.
    let splash_uid = rand::random::<i64>().abs();
    println!("Starting splash cast {} for skill 100300", splash_uid);
    let use_splash = SkillCommand::Use(UseCommand {
        cast_uid: splash_uid,
        server_tick: 0,
        skill_id: 100300,
        level: 1,
        motion_point: 0,
        position: Vec3::new(12.0, 0.0, 0.0),
        direction: Vec3::default(),
        rotation: Vec3::default(),
        rotate2_z: 0.0,
        item_uid: 0,
        is_hold: false,
        hold_int: None,
        hold_string: None,
    });
    send_skill(&socket, server_addr, &use_splash).await?;
    println!("Use broadcast: {:?}", recv_packet(&socket, &mut buf).await?);

    let splash = SkillCommand::AttackSplash(AttackSplashCommand {
        cast_uid: splash_uid,
        attack_point: 0,
        position: Vec3::new(12.0, 0.0, 0.0),
        rotation: Vec3::default(),
    });
    send_skill(&socket, server_addr, &splash).await?;
    println!(
        "Splash placement: {:?}",
        recv_packet(&socket, &mut buf).await?
    );
    println!(
        "Deferred splash damage: {:?}",
        recv_packet(&socket, &mut buf).await?
    );

    let disconnect = Packet::Disconnect;
    socket.send_to(&serialize(&disconnect)?, server_addr).await?;
    println!("Session {} done", session_id);

    Ok(())
}
