//! Transport interface consumed by the engine
//!
//! The engine never frames bytes itself. A [`Connector`] opens one [`Transport`] per logical
//! connection; the transport encodes each [`Command`], waits for its reply and reports the
//! high-level outcome as a [`Response`].

use crate::command::Command;
use crate::error::TransportError;

/// High-level outcome of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Encoded request size
    pub bytes_sent: usize,
    /// Raw reply size
    pub bytes_received: usize,
    /// Cursor returned by a cursor-bearing command
    pub cursor: Option<u64>,
    /// Error reply from the server (the connection itself is still healthy)
    pub server_error: Option<String>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.server_error.is_none()
    }
}

/// One established connection
pub trait Transport: Send {
    /// Send `command` and block until its reply arrives
    fn send(&mut self, command: &Command) -> Result<Response, TransportError>;

    /// Send a pipelined batch, one response per command in order
    ///
    /// The default sends the commands one at a time.
    fn send_batch(&mut self, commands: &[Command]) -> Result<Vec<Response>, TransportError> {
        commands.iter().map(|command| self.send(command)).collect()
    }

    /// Close the connection
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Factory for transports, shared by all worker threads
pub trait Connector: Send + Sync {
    type Conn: Transport;

    /// Open connection `conn_id`
    fn connect(&self, conn_id: usize) -> Result<Self::Conn, TransportError>;
}
