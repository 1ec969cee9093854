//! Server network layer handling UDP communications and field coordination.

use crate::broadcast::{GameMessage, ObserverBroadcaster};
use crate::field::{run_field, Field, FieldCommand};
use crate::metadata::SkillTable;
use crate::session::SessionManager;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, SkillCommand, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to the main server loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SessionTimeout {
        session_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Main server coordinating networking and the field simulation task.
pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<RwLock<SessionManager>>,
    field: Option<Field>,
    field_tx: mpsc::UnboundedSender<FieldCommand>,
    field_rx: Option<mpsc::UnboundedReceiver<FieldCommand>>,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_sessions: usize,
        table: Arc<SkillTable>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (field_tx, field_rx) = mpsc::unbounded_channel();

        let field = Field::new(1, table, ObserverBroadcaster::new(game_tx.clone()));

        Ok(Server {
            socket,
            sessions: Arc::new(RwLock::new(SessionManager::new(max_sessions))),
            field: Some(field),
            field_tx,
            field_rx: Some(field_rx),
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    /// The field owned by this server, until `run` hands it to its task.
    /// Used at startup to populate entity indices.
    pub fn field_mut(&mut self) -> Option<&mut Field> {
        self.field.as_mut()
    }

    /// Spawns task that continuously listens for incoming packets.
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket {
                        packet,
                        addrs,
                        exclude,
                    } => {
                        for addr in addrs {
                            if Some(addr) == exclude {
                                continue;
                            }
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors session timeouts.
    fn spawn_timeout_checker(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut sessions_guard = sessions.write().await;
                    sessions_guard.check_timeouts()
                };

                for session_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::SessionTimeout { session_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes an inbound envelope from a client.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );
                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Remove an existing connection from the same address first.
                let existing = {
                    let sessions = self.sessions.read().await;
                    sessions.find_session_by_addr(addr)
                };
                if let Some(existing_id) = existing {
                    info!("Removing existing session {} from {}", existing_id, addr);
                    let mut sessions = self.sessions.write().await;
                    sessions.remove_session(&existing_id);
                    let _ = self.field_tx.send(FieldCommand::Leave {
                        session_id: existing_id,
                    });
                }

                let session_id = {
                    let mut sessions = self.sessions.write().await;
                    sessions.add_session(addr)
                };

                if let Some(session_id) = session_id {
                    let _ = self.field_tx.send(FieldCommand::Join { session_id, addr });
                    self.send_packet(Packet::Connected { session_id }, addr);
                } else {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                }
            }

            Packet::Skill { data } => {
                let session_id = {
                    let mut sessions = self.sessions.write().await;
                    sessions.touch_by_addr(addr);
                    sessions.find_session_by_addr(addr)
                };
                let Some(session_id) = session_id else {
                    warn!("Skill packet from unconnected address {}", addr);
                    return;
                };

                match SkillCommand::decode(&data) {
                    Ok(command) => {
                        debug!("session {}: {:?}", session_id, command);
                        let _ = self.field_tx.send(FieldCommand::Skill {
                            session_id,
                            command,
                        });
                    }
                    Err(e) => {
                        warn!(
                            "session {}: malformed skill command dropped: {}",
                            session_id, e
                        );
                    }
                }
            }

            Packet::Disconnect => {
                let session_id = {
                    let sessions = self.sessions.read().await;
                    sessions.find_session_by_addr(addr)
                };
                if let Some(session_id) = session_id {
                    let mut sessions = self.sessions.write().await;
                    sessions.remove_session(&session_id);
                    let _ = self.field_tx.send(FieldCommand::Leave { session_id });
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop coordinating all operations.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let field = self
            .field
            .take()
            .ok_or("server is already running")?;
        let field_rx = self
            .field_rx
            .take()
            .ok_or("server is already running")?;
        tokio::spawn(run_field(field, field_rx, self.tick_duration));

        info!("Server started successfully");

        loop {
            match self.server_rx.recv().await {
                Some(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr).await;
                }
                Some(ServerMessage::SessionTimeout { session_id }) => {
                    let _ = self.field_tx.send(FieldCommand::Leave { session_id });
                }
                Some(ServerMessage::Shutdown) | None => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080)
    }

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr: test_addr(),
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, test_addr());
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, PROTOCOL_VERSION);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_session_timeout_message() {
        let msg = ServerMessage::SessionTimeout { session_id: 42 };
        match msg {
            ServerMessage::SessionTimeout { session_id } => assert_eq!(session_id, 42),
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let msg = ServerMessage::PacketReceived {
            packet: Packet::Skill {
                data: SkillCommand::Cancel { cast_uid: 55 }.encode(),
            },
            addr: test_addr(),
        };
        assert!(tx.send(msg).is_ok());

        match rx.try_recv().unwrap() {
            ServerMessage::PacketReceived { packet, .. } => match packet {
                Packet::Skill { data } => {
                    let command = SkillCommand::decode(&data).unwrap();
                    assert_eq!(command, SkillCommand::Cancel { cast_uid: 55 });
                }
                _ => panic!("Unexpected packet type"),
            },
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_address_validation() {
        let valid_addrs = vec![
            "127.0.0.1:8080",
            "0.0.0.0:0",
            "192.168.1.1:9090",
            "[::1]:8080",
        ];
        for addr_str in valid_addrs {
            assert!(
                addr_str.parse::<SocketAddr>().is_ok(),
                "Failed to parse address: {}",
                addr_str
            );
        }

        let invalid_addrs = vec!["invalid", "127.0.0.1:99999", "256.256.256.256:8080", ""];
        for addr_str in invalid_addrs {
            assert!(
                addr_str.parse::<SocketAddr>().is_err(),
                "Should fail to parse: {}",
                addr_str
            );
        }
    }

    #[test]
    fn test_malformed_skill_buffer_is_decode_error() {
        assert!(SkillCommand::decode(&[]).is_err());
        assert!(SkillCommand::decode(&[200]).is_err());
    }
}
