//! Phloem Protocol Implementations
//!
//! RESP framing and a blocking TCP connector that plug into the engine's
//! [`Connector`](phloem_core::transport::Connector) interface.

pub mod resp;
pub mod tcp;

pub use resp::{encode_command, parse_reply, Reply};
pub use tcp::{RespConnection, TcpConnector, TcpOptions};
