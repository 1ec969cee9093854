//! Observer fan-out.
//!
//! Handlers never touch the socket: every outbound packet is queued on the
//! network sender channel, either addressed to a single session (failure
//! notices go to the caster alone) or fanned out to every session observing
//! the field.

use log::error;
use shared::Packet;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Messages sent from the field task to the network sender task.
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        addrs: Vec<SocketAddr>,
        exclude: Option<SocketAddr>,
    },
}

#[derive(Clone)]
pub struct ObserverBroadcaster {
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl ObserverBroadcaster {
    pub fn new(game_tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self { game_tx }
    }

    pub fn send_to(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    pub fn broadcast(&self, packet: Packet, observers: &[SocketAddr], exclude: Option<SocketAddr>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket {
            packet,
            addrs: observers.to_vec(),
            exclude,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }
}
