//! Shared Protocol Definitions for Streaming Remote
//!
//! This crate contains the JSON-RPC message model, method names and the
//! output/scene types shared by the remote controller and the streaming
//! software side.

mod error;
mod methods;
mod rpc;
mod types;

pub use error::*;
pub use methods::*;
pub use rpc::*;
pub use types::*;

/// The only JSON-RPC version spoken on the wire
pub const JSONRPC_VERSION: &str = "2.0";
