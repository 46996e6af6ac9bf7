//! Client event loop: heartbeat timer, UDP receive, TCP both ways.
//!
//! Like the server, the client is a single task on a current-thread
//! runtime. All sockets are driven with non-blocking `try_*` calls; when
//! one would block, the pending data stays queued and the corresponding
//! writability branch of the `select!` re-arms.

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::MissedTickBehavior;

use shared::{Heartbeat, TurnDirection, MAX_DATAGRAM_SIZE};

use crate::game::GameStream;
use crate::input::KeyReader;
use crate::ClientError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30);

/// Queue of GUI lines awaiting the TCP socket, with wrap-around flushing.
/// Grows as needed under backpressure and shrinks back to its initial
/// capacity once fully drained.
struct GuiSendBuffer {
    buf: VecDeque<u8>,
}

impl GuiSendBuffer {
    const INITIAL_CAPACITY: usize = 256;

    fn new() -> Self {
        GuiSendBuffer {
            buf: VecDeque::with_capacity(Self::INITIAL_CAPACITY),
        }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn push_line(&mut self, line: &str) {
        self.buf.extend(line.as_bytes());
        self.buf.push_back(b'\n');
    }

    /// Writes as much as the socket accepts right now.
    fn flush(&mut self, stream: &TcpStream) -> Result<(), ClientError> {
        while !self.buf.is_empty() {
            let (front, _) = self.buf.as_slices();
            match stream.try_write(front) {
                Ok(written) => {
                    self.buf.drain(..written);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        if self.buf.capacity() > Self::INITIAL_CAPACITY {
            self.buf.shrink_to(Self::INITIAL_CAPACITY);
        }
        Ok(())
    }
}

enum Wake {
    Heartbeat,
    ServerDatagram(io::Result<usize>),
    GuiReadable(io::Result<()>),
    GuiWritable(io::Result<()>),
    ServerWritable(io::Result<()>),
}

/// The GUI-bridging client.
pub struct Client {
    server: UdpSocket,
    gui: TcpStream,
    session_id: u64,
    player_name: String,
    turn_direction: TurnDirection,
    stream: GameStream,
    keys: KeyReader,
    gui_out: GuiSendBuffer,
    pending_heartbeat: Option<Vec<u8>>,
}

impl Client {
    /// Resolves both endpoints and connects: UDP to the game server (any
    /// address family the resolver offers), TCP with `TCP_NODELAY` to the
    /// GUI. The session id is the startup wall clock in microseconds, so a
    /// restarted client supersedes its previous session.
    pub async fn connect(
        game_server: &str,
        server_port: u16,
        gui_host: &str,
        gui_port: u16,
        player_name: String,
    ) -> Result<Self, ClientError> {
        let server_addr = lookup_host((game_server, server_port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("cannot resolve game server {:?}", game_server),
                )
            })?;
        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let server = UdpSocket::bind(bind_addr).await?;
        server.connect(server_addr).await?;

        let gui = TcpStream::connect((gui_host, gui_port)).await?;
        gui.set_nodelay(true)?;

        let session_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros() as u64;

        info!(
            "connected: game server {}, interface {}:{}",
            server_addr, gui_host, gui_port
        );

        Ok(Client {
            server,
            gui,
            session_id,
            player_name,
            turn_direction: TurnDirection::Straight,
            stream: GameStream::new(),
            keys: KeyReader::new(),
            gui_out: GuiSendBuffer::new(),
            pending_heartbeat: None,
        })
    }

    /// Runs forever; returns only on a fatal condition.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut heartbeats = tokio::time::interval(HEARTBEAT_INTERVAL);
        // Catching up on missed beats would only duplicate state the next
        // beat carries anyway.
        heartbeats.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = [0u8; MAX_DATAGRAM_SIZE + 1];

        loop {
            let wake = tokio::select! {
                _ = heartbeats.tick() => Wake::Heartbeat,
                received = self.server.recv(&mut buf) => Wake::ServerDatagram(received),
                readable = self.gui.readable() => Wake::GuiReadable(readable),
                writable = self.gui.writable(), if !self.gui_out.is_empty() => {
                    Wake::GuiWritable(writable)
                }
                writable = self.server.writable(), if self.pending_heartbeat.is_some() => {
                    Wake::ServerWritable(writable)
                }
            };

            match wake {
                Wake::Heartbeat => self.send_heartbeat()?,
                Wake::ServerDatagram(received) => {
                    let len = received?;
                    self.handle_server_datagram(&buf[..len])?;
                }
                Wake::GuiReadable(readable) => {
                    readable?;
                    self.read_gui_keys()?;
                }
                Wake::GuiWritable(writable) => {
                    writable?;
                    self.gui_out.flush(&self.gui)?;
                }
                Wake::ServerWritable(writable) => {
                    writable?;
                    self.retry_heartbeat()?;
                }
            }
        }
    }

    fn send_heartbeat(&mut self) -> Result<(), ClientError> {
        let heartbeat = Heartbeat {
            session_id: self.session_id,
            turn_direction: self.turn_direction,
            next_expected_event_no: self.stream.next_expected_event_no(),
            player_name: self.player_name.clone(),
        };
        let mut wire = Vec::with_capacity(13 + self.player_name.len());
        heartbeat.encode(&mut wire);

        match self.server.try_send(&wire) {
            Ok(_) => self.pending_heartbeat = None,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // Keep only the newest heartbeat for the writability retry.
                self.pending_heartbeat = Some(wire);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn retry_heartbeat(&mut self) -> Result<(), ClientError> {
        let Some(wire) = self.pending_heartbeat.take() else {
            return Ok(());
        };
        match self.server.try_send(&wire) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.pending_heartbeat = Some(wire);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn handle_server_datagram(&mut self, datagram: &[u8]) -> Result<(), ClientError> {
        let mut lines = Vec::new();
        self.stream.handle_datagram(datagram, &mut lines)?;
        if lines.is_empty() {
            return Ok(());
        }
        debug!("delivering {} lines to the interface", lines.len());
        for line in &lines {
            self.gui_out.push_line(line);
        }
        self.gui_out.flush(&self.gui)
    }

    fn read_gui_keys(&mut self) -> Result<(), ClientError> {
        let mut chunk = [0u8; 256];
        loop {
            match self.gui.try_read(&mut chunk) {
                Ok(0) => return Err(ClientError::GuiClosed),
                Ok(n) => {
                    if let Some(direction) = self.keys.push(&chunk[..n]) {
                        self.turn_direction = direction;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
