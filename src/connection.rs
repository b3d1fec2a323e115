//! # Connection manager
//!
//! Owns the `ConnectionTable` and drives the idle-eviction tick. The table's
//! only mutator is this type: inserted on accept, `last_active` touched on
//! every successful read, removed on disconnect. Broadcast takes a snapshot
//! of the live ids before fanning out, so a handler removing itself mid-fan-out
//! can't deadlock on its own lock.

use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::ServerCapability;
use crate::logsink::LogSink;
use crate::protocol::Protocol;
use crate::registry::UserRegistry;
use crate::websocket;
use crate::ConnId;

struct ConnectionEntry {
    writer: Mutex<TcpStream>,
    protocol: Protocol,
    last_active: Mutex<Instant>,
}

pub struct ConnectionManager {
    connections: Mutex<HashMap<ConnId, Arc<ConnectionEntry>>>,
    users: UserRegistry,
    log: Arc<LogSink>,
    idle_ttl: Duration,
    cleanup_tick: Duration,
}

impl ConnectionManager {
    pub fn new(idle_ttl: Duration, cleanup_tick: Duration, log: Arc<LogSink>) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            users: UserRegistry::new(),
            log,
            idle_ttl,
            cleanup_tick,
        }
    }

    /// Register a freshly accepted connection. `writer` is a clone of the
    /// socket used for outbound writes; the caller keeps its own handle for
    /// the read loop.
    pub fn accept(&self, id: ConnId, writer: TcpStream, protocol: Protocol) {
        let entry = Arc::new(ConnectionEntry {
            writer: Mutex::new(writer),
            protocol,
            last_active: Mutex::new(Instant::now()),
        });
        self.connections.lock().unwrap().insert(id, entry);
        self.users.set(id, "Anonymous".to_string());
        log::info!("connection {:#x} accepted ({:?})", id, protocol);
    }

    /// Update `last_active` for `id`. No-op if the connection is gone.
    pub fn touch(&self, id: ConnId) {
        if let Some(entry) = self.connections.lock().unwrap().get(&id) {
            *entry.last_active.lock().unwrap() = Instant::now();
        }
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.connections.lock().unwrap().contains_key(&id)
    }

    pub fn log_line(&self, line: &str) {
        if let Err(e) = self.log.append(line) {
            log::error!("log sink write failed: {}", e);
        }
    }

    fn write_to(entry: &ConnectionEntry, text: &str) -> std::io::Result<()> {
        let mut writer = entry.writer.lock().unwrap();
        match entry.protocol {
            Protocol::Plain => {
                let mut line = text.as_bytes().to_vec();
                line.push(b'\n');
                writer.write_all(&line)
            }
            Protocol::WebSocket => writer.write_all(&websocket::encode_text_frame(text)),
        }
    }

    /// Run the 60s (configurable) cleanup tick on the caller's thread. Never
    /// returns; intended to be the body of a dedicated background thread so
    /// ticks cannot overlap.
    pub fn run_eviction_loop(self: &Arc<Self>) {
        loop {
            thread::sleep(self.cleanup_tick);
            let now = Instant::now();
            let stale: Vec<ConnId> = {
                let connections = self.connections.lock().unwrap();
                connections
                    .iter()
                    .filter(|(_, entry)| now.duration_since(*entry.last_active.lock().unwrap()) > self.idle_ttl)
                    .map(|(id, _)| *id)
                    .collect()
            };
            for id in stale {
                log::info!("connection {:#x} evicted after idle TTL", id);
                self.disconnect(id);
            }
        }
    }

    pub fn spawn_eviction_loop(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        thread::spawn(move || manager.run_eviction_loop());
    }
}

impl ServerCapability for ConnectionManager {
    fn send(&self, id: ConnId, text: &str) {
        let entry = match self.connections.lock().unwrap().get(&id).cloned() {
            Some(entry) => entry,
            None => return,
        };
        if let Err(e) = Self::write_to(&entry, text) {
            log::warn!("send to {:#x} failed: {}", id, e);
        }
    }

    fn broadcast(&self, text: &str) {
        let ids: Vec<ConnId> = self.connections.lock().unwrap().keys().copied().collect();
        for id in ids {
            self.send(id, text);
        }
    }

    fn disconnect(&self, id: ConnId) {
        let entry = self.connections.lock().unwrap().remove(&id);
        self.users.remove(id);
        if let Some(entry) = entry {
            let writer = entry.writer.lock().unwrap();
            let _ = writer.shutdown(Shutdown::Both);
            log::info!("connection {:#x} disconnected", id);
        }
    }

    fn set_nick(&self, id: ConnId, nick: String) {
        self.users.set(id, nick);
    }

    fn get_nick(&self, id: ConnId) -> String {
        self.users.get(id)
    }
}
