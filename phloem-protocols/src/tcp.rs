//! Blocking TCP transport speaking RESP
//!
//! Each logical connection owns one `TcpStream`. A pipelined batch is written with a single
//! `write_all` and its replies are read back in order.

use crate::resp::{encode_command, parse_reply, Reply};
use anyhow::{anyhow, Context};
use phloem_core::command::Command;
use phloem_core::error::TransportError;
use phloem_core::transport::{Connector, Response, Transport};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_CHUNK: usize = 16 * 1024;

/// Socket options for every connection
#[derive(Debug, Clone)]
pub struct TcpOptions {
    pub connect_timeout: Duration,
    /// Read/write timeout; `None` blocks indefinitely
    pub io_timeout: Option<Duration>,
    pub nodelay: bool,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
        }
    }
}

/// Opens RESP connections to one target address
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    options: TcpOptions,
}

impl TcpConnector {
    /// Resolve `target` (`host:port`) once, up front
    pub fn new(target: &str, options: TcpOptions) -> anyhow::Result<Self> {
        let addr = target
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve target '{target}'"))?
            .next()
            .ok_or_else(|| anyhow!("Target '{target}' resolved to no address"))?;
        Ok(Self { addr, options })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connector for TcpConnector {
    type Conn = RespConnection;

    fn connect(&self, conn_id: usize) -> Result<RespConnection, TransportError> {
        let stream = TcpStream::connect_timeout(&self.addr, self.options.connect_timeout)?;
        stream.set_nodelay(self.options.nodelay)?;
        stream.set_read_timeout(self.options.io_timeout)?;
        stream.set_write_timeout(self.options.io_timeout)?;
        tracing::debug!("Connection {} established to {}", conn_id, self.addr);
        Ok(RespConnection::new(stream))
    }
}

/// One established RESP connection
pub struct RespConnection {
    stream: TcpStream,
    /// Received bytes not yet consumed by a reply
    buffer: Vec<u8>,
    out: Vec<u8>,
}

impl RespConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream, buffer: Vec::with_capacity(READ_CHUNK), out: Vec::new() }
    }

    fn read_reply(&mut self) -> Result<(Reply, usize), TransportError> {
        loop {
            let parsed =
                parse_reply(&self.buffer).map_err(|e| TransportError::Protocol(e.to_string()))?;
            if let Some((reply, used)) = parsed {
                self.buffer.drain(..used);
                return Ok((reply, used));
            }

            let filled = self.buffer.len();
            self.buffer.resize(filled + READ_CHUNK, 0);
            let n = match self.stream.read(&mut self.buffer[filled..]) {
                Ok(n) => n,
                Err(e) => {
                    self.buffer.truncate(filled);
                    return Err(e.into());
                }
            };
            self.buffer.truncate(filled + n);
            if n == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    fn to_response(command: &Command, reply: Reply, sent: usize, received: usize) -> Response {
        let cursor = if command.is_cursor_command() { reply.cursor() } else { None };
        Response {
            bytes_sent: sent,
            bytes_received: received,
            cursor,
            server_error: reply.error_message().map(str::to_string),
        }
    }
}

impl Transport for RespConnection {
    fn send(&mut self, command: &Command) -> Result<Response, TransportError> {
        let mut responses = self.send_batch(std::slice::from_ref(command))?;
        responses.pop().ok_or_else(|| TransportError::Protocol("missing reply".to_string()))
    }

    fn send_batch(&mut self, commands: &[Command]) -> Result<Vec<Response>, TransportError> {
        self.out.clear();
        let sizes: Vec<usize> =
            commands.iter().map(|c| encode_command(&c.args, &mut self.out)).collect();
        self.stream.write_all(&self.out)?;

        let mut responses = Vec::with_capacity(commands.len());
        for (command, sent) in commands.iter().zip(sizes) {
            let (reply, received) = self.read_reply()?;
            let missing_cursor = command.is_cursor_command()
                && reply.error_message().is_none()
                && reply.cursor().is_none();
            if missing_cursor {
                return Err(TransportError::Protocol(format!(
                    "{} reply carries no cursor",
                    command.verb()
                )));
            }
            responses.push(Self::to_response(command, reply, sent, received));
        }
        Ok(responses)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.buffer.clear();
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
