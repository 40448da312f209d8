//! # Common Components
//!
//! Shared utilities and data structures used by the session, the match
//! protocol and the transports.
//!
//! ## Modules
//!
//! - [`messages`]: Peer-to-peer message definitions and envelope codec
//! - [`address`]: Short join codes and namespaced peer addresses
//! - [`connection`]: TCP connection abstraction with message framing
//! - [`config`]: Configuration parsing utilities

pub mod address;
pub mod config;
pub mod connection;
pub mod messages;
