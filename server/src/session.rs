//! Connected session management for the skill server.
//!
//! This module handles the server-side lifecycle of connected sessions:
//! - connection establishment, disconnect, and timeout cleanup
//! - session id assignment and address tracking for response routing
//! - capacity enforcement
//!
//! Input buffering lives elsewhere: decoded skill commands go straight into
//! the owning field's command queue, so a session here is only the
//! transport-facing identity of a player.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected session and its transport state.
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier assigned by the server.
    pub id: u32,
    /// Network address for sending responses.
    pub addr: SocketAddr,
    /// Last time we received any packet from this session.
    pub last_seen: Instant,
}

impl Session {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Marks the session as active now.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected sessions and enforces the capacity limit.
pub struct SessionManager {
    sessions: HashMap<u32, Session>,
    next_session_id: u32,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            max_sessions,
        }
    }

    /// Attempts to add a new session.
    ///
    /// Returns `Some(session_id)` if successful, `None` if the server is at
    /// capacity.
    pub fn add_session(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} connected from {}", session_id, addr);
        self.sessions.insert(session_id, Session::new(session_id, addr));

        Some(session_id)
    }

    /// Removes a session; returns true if it was present.
    pub fn remove_session(&mut self, session_id: &u32) -> bool {
        if let Some(session) = self.sessions.remove(session_id) {
            info!("Session {} disconnected", session.id);
            true
        } else {
            false
        }
    }

    pub fn find_session_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes the activity timestamp of the session at `addr`.
    pub fn touch_by_addr(&mut self, addr: SocketAddr) {
        if let Some(session) = self
            .sessions
            .values_mut()
            .find(|session| session.addr == addr)
        {
            session.touch();
        }
    }

    /// Removes sessions that have gone quiet and returns their ids so the
    /// field can be told to drop them.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timeout = Duration::from_secs(5);
        let timed_out: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for session_id in &timed_out {
            self.remove_session(session_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
