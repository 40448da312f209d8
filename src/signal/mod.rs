//! # Signal Server Components
//!
//! - [`protocol`]: request/response messages between peers and the server
//! - [`directory`]: the name -> endpoint map with ownership leases
//! - [`server`]: the TCP accept loop

pub mod directory;
pub mod protocol;
pub mod server;

pub use server::SignalServer;
