//! Network Transport - framed connections and encrypted channels
//!
//! A [`FramedConnection`] moves whole frames over WebSocket, Content-Length
//! framed byte streams or an in-memory pair. [`SecureChannel`] runs the
//! password handshake over one and then encrypts every frame.

mod connection;
mod error;
mod secure;
mod socket;
mod websocket;

pub use connection::*;
pub use error::*;
pub use secure::*;
pub use socket::*;
pub use websocket::*;

/// Default TCP port
pub const DEFAULT_TCP_PORT: u16 = 9001;

/// Default WebSocket port
pub const DEFAULT_WEBSOCKET_PORT: u16 = 9002;
