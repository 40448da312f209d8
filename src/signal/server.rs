//! # Signal Server
//!
//! Rendezvous point for hosts and joiners. It answers two questions only:
//! "may I have this name?" and "where is this name?". Game traffic never
//! passes through it.
//!
//! A registration lives exactly as long as the TCP connection that made it;
//! when the hosting peer tears down (or crashes), the name is free again.

use anyhow::Result;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::directory::Directory;
use super::protocol::{SignalRequest, SignalResponse};
use crate::common::connection::Connection;

/// The signal server and its name directory.
pub struct SignalServer {
    directory: Arc<Directory>,
}

impl Default for SignalServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalServer {
    pub fn new() -> Self {
        Self {
            directory: Arc::new(Directory::new()),
        }
    }

    pub fn directory(&self) -> Arc<Directory> {
        self.directory.clone()
    }

    /// Bind `listen` and serve in a background task.
    ///
    /// Returns the bound address (useful with port 0) and the serving task.
    ///
    /// # Example
    /// ```ignore
    /// let (addr, handle) = SignalServer::new().start("127.0.0.1:0").await?;
    /// ```
    pub async fn start(self, listen: &str) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(listen).await?;
        let addr = listener.local_addr()?;
        info!("📡 Signal server listening on {}", addr);

        let handle = tokio::spawn(async move {
            self.serve(listener).await;
        });
        Ok((addr, handle))
    }

    /// Accept connections forever.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    debug!("🔗 Accepted connection from {}", addr);
                    let directory = self.directory.clone();
                    tokio::spawn(async move {
                        handle_connection(directory, socket, addr).await;
                    });
                }
                Err(e) => error!("❌ Accept error: {}", e),
            }
        }
    }
}

/// Serve one peer connection until it closes, then drop its registrations.
async fn handle_connection(directory: Arc<Directory>, socket: TcpStream, addr: SocketAddr) {
    let mut conn = Connection::new(socket);
    let mut held: Vec<(String, Uuid)> = Vec::new();

    loop {
        match conn.read_json::<SignalRequest>().await {
            Ok(Some(request)) => {
                let response = handle_request(&directory, request, addr, &mut held).await;
                if let Err(e) = conn.write_json(&response).await {
                    warn!("⚠️  Failed to answer {}: {}", addr, e);
                    break;
                }
            }
            Ok(None) => {
                debug!("🔌 Connection from {} closed", addr);
                break;
            }
            Err(e) => {
                error!("❌ Error reading from {}: {}", addr, e);
                break;
            }
        }
    }

    for (name, lease) in held {
        if let Some(registration) = directory.release(&name, lease).await {
            let held_for = chrono::Utc::now().timestamp() - registration.registered_at;
            info!("👋 Released {} after {}s", name, held_for);
        }
    }
}

async fn handle_request(
    directory: &Directory,
    request: SignalRequest,
    addr: SocketAddr,
    held: &mut Vec<(String, Uuid)>,
) -> SignalResponse {
    match request {
        SignalRequest::Register { name, port } => {
            let endpoint = SocketAddr::new(addr.ip(), port).to_string();
            match directory.register(&name, endpoint.clone()).await {
                Some(lease) => {
                    info!("✅ {} registered at {}", name, endpoint);
                    held.push((name, lease));
                    SignalResponse::Registered { lease }
                }
                None => {
                    info!("⛔ {} already taken", name);
                    SignalResponse::Taken
                }
            }
        }
        SignalRequest::Lookup { name } => match directory.lookup(&name).await {
            Some(endpoint) => SignalResponse::Found { endpoint },
            None => {
                debug!("🔍 {} not found", name);
                SignalResponse::NotFound
            }
        },
    }
}
