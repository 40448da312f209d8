pub mod common;
pub mod protocol;
pub mod session;
pub mod signal;
pub mod transport;
pub mod utils;

pub use common::messages::Message;
pub use protocol::MatchCoordinator;
pub use session::{Role, Session, SessionError};
pub use transport::Transport;
