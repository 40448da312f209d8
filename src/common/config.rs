//! # Configuration Utilities
//!
//! Shared configuration structures and parsing utilities used by the peer
//! binary, the signal server and the library defaults.
//!
//! Every section implements `Default`, so a TOML file only needs to name the
//! values it overrides.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: PeerConfig = load_config("config/peer.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Complete configuration of one peer (host or client).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Address acquisition and join behaviour
    pub network: NetworkConfig,
    /// Where the rendezvous server lives
    pub signal: SignalConfig,
    /// Shared world rules the host applies
    pub rules: MatchRules,
}

/// How short join codes are generated.
///
/// Digit codes are easier to read aloud and type on a phone keypad but only
/// offer 9000 values, so they collide far more often than alphanumeric ones
/// (36^4 = 1,679,616 values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeScheme {
    /// Four digits in `1000..=9999`
    Digits,
    /// Four characters from `A-Z0-9`
    Alphanumeric,
}

/// Address acquisition and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Prefix namespacing our addresses in the shared transport (e.g. "EHUTI-")
    pub address_prefix: String,
    /// Code generation scheme
    pub code_scheme: CodeScheme,
    /// How long a join waits for the channel to open (seconds)
    pub join_timeout_secs: u64,
    /// Give up acquiring an address after this many collisions (None = never)
    pub identity_retry_limit: Option<u32>,
    /// Pause between collision retries (milliseconds, 0 = immediate)
    pub identity_retry_backoff_ms: u64,
    /// Ask the transport for reliable delivery
    pub reliable: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address_prefix: "EHUTI-".to_string(),
            code_scheme: CodeScheme::Alphanumeric,
            join_timeout_secs: 15,
            identity_retry_limit: None,
            identity_retry_backoff_ms: 0,
            reliable: false,
        }
    }
}

impl NetworkConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.identity_retry_backoff_ms)
    }
}

/// Rendezvous server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Address peers dial to register and look up names
    pub server: String,
    /// Address the signal server binds
    pub listen: String,
    /// Address a hosting peer binds for incoming game connections
    pub peer_listen: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:9470".to_string(),
            listen: "0.0.0.0:9470".to_string(),
            peer_listen: "0.0.0.0:0".to_string(),
        }
    }
}

/// Heal item and roster rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Number of selectable fighters (`fighter_0` .. `fighter_{n-1}`)
    pub roster_size: u8,
    /// Host spawns a heal item this often (seconds)
    pub item_spawn_interval_secs: u64,
    /// An uncollected item despawns after this long (seconds)
    pub item_lifetime_secs: u64,
    /// Health restored by one item
    pub heal_amount: u32,
    pub spawn_x_min: i32,
    pub spawn_x_max: i32,
    pub spawn_y_min: i32,
    pub spawn_y_max: i32,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            roster_size: 7,
            item_spawn_interval_secs: 10,
            item_lifetime_secs: 5,
            heal_amount: 20,
            spawn_x_min: 100,
            spawn_x_max: 1180,
            spawn_y_min: 300,
            spawn_y_max: 600,
        }
    }
}

impl MatchRules {
    pub fn item_spawn_interval(&self) -> Duration {
        Duration::from_secs(self.item_spawn_interval_secs)
    }

    pub fn item_lifetime(&self) -> Duration {
        Duration::from_secs(self.item_lifetime_secs)
    }
}
