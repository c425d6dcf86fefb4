//! JSON-RPC over an encrypted Streaming Remote session
//!
//! [`RpcClient`] correlates responses to concurrent calls and fans
//! notifications out to subscribers. [`RpcServer`] answers calls on behalf
//! of a [`StreamingSoftware`] implementation and pushes its events.

mod client;
mod error;
mod ids;
mod server;
mod software;
mod subscribers;

pub use client::*;
pub use error::*;
pub use ids::*;
pub use server::*;
pub use software::*;
pub use subscribers::*;
