//! # Server loop
//!
//! Accepts connections, classifies the first read as plain or WebSocket, and
//! drives each connection's read → dispatch loop on its own OS thread. The
//! listening socket itself is owned exclusively here.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::logsink::LogSink;
use crate::protocol::{trim_line, Protocol, Tokens};
use crate::websocket;
use crate::ConnId;

pub struct Server {
    commands: Arc<CommandRegistry>,
    connections: Arc<ConnectionManager>,
    listener: TcpListener,
    read_buffer: usize,
}

impl Server {
    /// Bind the listening socket and build the shared server state. Does not
    /// start accepting yet — call `run`.
    pub fn bind(config: Config) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr)?;
        let log = Arc::new(LogSink::open(&config.log_path)?);
        let connections = Arc::new(ConnectionManager::new(config.idle_ttl, config.cleanup_tick, log));
        Ok(Self {
            commands: Arc::new(CommandRegistry::with_builtins()),
            connections,
            listener,
            read_buffer: config.read_buffer,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener errors out. A per-connection
    /// failure never stops the loop; a listener failure (this function
    /// returning `Err`) is fatal to the process, per the propagation policy.
    pub fn run(self) -> Result<()> {
        self.connections.spawn_eviction_loop();
        log::info!("listening on {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let id: ConnId = rand::random();
                    let commands = Arc::clone(&self.commands);
                    let connections = Arc::clone(&self.connections);
                    let read_buffer = self.read_buffer;
                    thread::spawn(move || {
                        handle_connection(stream, id, read_buffer, &commands, &connections);
                    });
                }
                Err(e) => log::warn!("accept failed: {}", e),
            }
        }
        Ok(())
    }
}

fn handle_connection(
    mut reader: TcpStream,
    id: ConnId,
    read_buffer: usize,
    commands: &CommandRegistry,
    connections: &Arc<ConnectionManager>,
) {
    let writer = match reader.try_clone() {
        Ok(w) => w,
        Err(e) => {
            log::warn!("failed to clone socket for {:#x}: {}", id, e);
            return;
        }
    };

    let mut first_chunk = vec![0u8; read_buffer];
    let n = match reader.read(&mut first_chunk) {
        Ok(0) | Err(_) => return, // peer closed or errored before sending anything
        Ok(n) => n,
    };
    first_chunk.truncate(n);
    let first_text = String::from_utf8_lossy(&first_chunk).into_owned();

    if first_text.starts_with("GET ") {
        handle_websocket(reader, writer, id, &first_text, commands, connections);
    } else {
        connections.accept(id, writer, Protocol::Plain);
        handle_plain(reader, first_chunk, read_buffer, id, commands, connections);
    }

    // Safety net: a loop can exit on transport error or peer close without
    // ever going through a command handler's disconnect() call.
    connections.disconnect(id);
}

fn handle_websocket(
    mut reader: TcpStream,
    mut writer: TcpStream,
    id: ConnId,
    request: &str,
    commands: &CommandRegistry,
    connections: &Arc<ConnectionManager>,
) {
    let key = match websocket::find_websocket_key(request) {
        Some(k) => k,
        None => {
            log::warn!("connection {:#x}: missing Sec-WebSocket-Key", id);
            return;
        }
    };

    let response = websocket::handshake_response(key);
    if let Err(e) = writer.write_all(response.as_bytes()) {
        log::warn!("connection {:#x}: handshake send failed: {}", id, e);
        return;
    }

    connections.accept(id, writer, Protocol::WebSocket);

    loop {
        match read_ws_frame(&mut reader) {
            Ok(None) => break,
            Ok(Some(raw)) => {
                connections.touch(id);
                let (text, should_close) = websocket::decode_frame(&raw);
                if let Some(text) = text {
                    connections.log_line(&text);
                    let tokens = Tokens::parse(&text);
                    commands.dispatch(&tokens.command, id, &tokens, connections.as_ref());
                }
                if should_close || !connections.contains(id) {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn handle_plain(
    mut reader: TcpStream,
    leftover: Vec<u8>,
    read_buffer: usize,
    id: ConnId,
    commands: &CommandRegistry,
    connections: &Arc<ConnectionManager>,
) {
    let mut buf = leftover;

    loop {
        let line = match next_line(&mut reader, &mut buf, read_buffer) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(_) => break,
        };

        connections.touch(id);
        let line = trim_line(&line);
        if line.is_empty() {
            continue;
        }
        connections.log_line(line);
        let tokens = Tokens::parse(line);
        commands.dispatch(&tokens.command, id, &tokens, connections.as_ref());

        if !connections.contains(id) {
            break;
        }
    }
}

/// Pull the next LF-delimited line out of `buf`, reading more bytes from
/// `reader` as needed. Handles the case where `buf` already holds bytes left
/// over from the classification read.
fn next_line(reader: &mut TcpStream, buf: &mut Vec<u8>, read_buffer: usize) -> io::Result<Option<String>> {
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let rest = buf.split_off(pos + 1);
            let mut line_bytes = std::mem::replace(buf, rest);
            line_bytes.truncate(pos);
            return Ok(Some(String::from_utf8_lossy(&line_bytes).into_owned()));
        }

        let mut chunk = vec![0u8; read_buffer];
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            let line = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            return Ok(Some(line));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Read exactly one WebSocket frame's bytes off `reader`, honoring the
/// length fields as it goes so later frames stay in sync. Returns `Ok(None)`
/// on a clean peer close before any bytes arrive.
fn read_ws_frame(reader: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut b0 = [0u8; 1];
    if reader.read(&mut b0)? == 0 {
        return Ok(None);
    }
    let mut b1 = [0u8; 1];
    reader.read_exact(&mut b1)?;
    let mut raw = vec![b0[0], b1[0]];

    let masked = b1[0] & 0x80 != 0;
    let len7 = b1[0] & 0x7F;

    let payload_len: usize = if len7 == 126 {
        let mut ext = [0u8; 2];
        reader.read_exact(&mut ext)?;
        raw.extend_from_slice(&ext);
        u16::from_be_bytes(ext) as usize
    } else if len7 == 127 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "64-bit frame length unsupported",
        ));
    } else {
        len7 as usize
    };

    if masked {
        let mut mask = [0u8; 4];
        reader.read_exact(&mut mask)?;
        raw.extend_from_slice(&mask);
    }

    if payload_len > 0 {
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;
        raw.extend_from_slice(&payload);
    }

    Ok(Some(raw))
}
