//! Connection-to-session bindings for the gateway.
//!
//! Inbound events after a join carry no session context of their own, so the
//! gateway records which session (and display name) each socket address is
//! bound to. The binding table also tracks liveness: UDP has no transport
//! disconnect, so a connection that stays silent past the timeout is treated
//! as a disconnect by the sweep in the main loop.
//!
//! The set of addresses bound to a code is the session "room", the audience
//! for broadcasts. Admin connections bind with no display name.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// What the gateway knows about one bound connection.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Normalized session code this connection belongs to.
    pub code: String,
    /// Display name for players; `None` for admin connections.
    pub name: Option<String>,
    /// Last time any packet arrived from this address.
    pub last_seen: Instant,
}

impl Binding {
    fn new(code: String, name: Option<String>) -> Self {
        Self {
            code,
            name,
            last_seen: Instant::now(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Maps socket addresses to their session bindings.
pub struct ConnectionTable {
    bindings: HashMap<SocketAddr, Binding>,
    timeout: Duration,
}

impl ConnectionTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            bindings: HashMap::new(),
            timeout,
        }
    }

    /// Records (or replaces) the binding for an address. A connection can be
    /// in at most one session at a time; re-binding moves it.
    pub fn bind(&mut self, addr: SocketAddr, code: String, name: Option<String>) {
        self.bindings.insert(addr, Binding::new(code, name));
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Binding> {
        self.bindings.get(addr)
    }

    /// Marks the address as alive. Returns false for unknown addresses.
    pub fn refresh(&mut self, addr: &SocketAddr) -> bool {
        if let Some(binding) = self.bindings.get_mut(addr) {
            binding.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    /// Drops the binding for an address, returning it if it existed.
    pub fn unbind(&mut self, addr: &SocketAddr) -> Option<Binding> {
        self.bindings.remove(addr)
    }

    /// Drops every binding for a session (used when a session expires).
    pub fn unbind_session(&mut self, code: &str) -> Vec<SocketAddr> {
        let addrs: Vec<SocketAddr> = self
            .bindings
            .iter()
            .filter(|(_, b)| b.code == code)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &addrs {
            self.bindings.remove(addr);
        }
        addrs
    }

    /// All addresses bound to a session (the broadcast audience).
    pub fn addrs_in(&self, code: &str) -> Vec<SocketAddr> {
        self.bindings
            .iter()
            .filter(|(_, b)| b.code == code)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Removes and returns every binding that has been silent past the
    /// timeout. The caller handles each one as a disconnect.
    pub fn check_timeouts(&mut self) -> Vec<(SocketAddr, Binding)> {
        let timeout = self.timeout;
        let timed_out: Vec<SocketAddr> = self
            .bindings
            .iter()
            .filter(|(_, b)| b.is_timed_out(timeout))
            .map(|(addr, _)| *addr)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|addr| {
                let binding = self.bindings.remove(&addr)?;
                info!(
                    "Connection {} timed out (session {})",
                    addr, binding.code
                );
                Some((addr, binding))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
