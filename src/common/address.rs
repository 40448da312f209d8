//! # Peer Addresses
//!
//! A peer address is the application prefix followed by a short code a human
//! reads off one screen and types into another, e.g. `EHUTI-A1B2`. Hosts
//! display only the code; joiners type only the code.

use rand::Rng;
use std::fmt;

use super::config::CodeScheme;

/// Number of characters in a join code.
pub const CODE_LENGTH: usize = 4;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A namespaced transport address built from a short code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    full: String,
    prefix_len: usize,
}

impl PeerAddress {
    pub fn new(prefix: &str, code: &str) -> Self {
        Self {
            full: format!("{}{}", prefix, code),
            prefix_len: prefix.len(),
        }
    }

    /// The full name registered with the transport.
    pub fn full(&self) -> &str {
        &self.full
    }

    /// The human-shareable suffix.
    pub fn code(&self) -> &str {
        &self.full[self.prefix_len..]
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

/// Generate a fresh candidate code.
pub fn generate_code<R: Rng + ?Sized>(scheme: CodeScheme, rng: &mut R) -> String {
    match scheme {
        CodeScheme::Digits => rng.gen_range(1000..=9999u32).to_string(),
        CodeScheme::Alphanumeric => (0..CODE_LENGTH)
            .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
            .collect(),
    }
}

/// Normalize a code typed by a user: trim whitespace and uppercase.
///
/// Returns `None` when nothing usable is left or the code contains characters
/// no scheme ever produces.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(code)
}
