//! # TCP Transport
//!
//! Direct peer-to-peer links over TCP. The only third party involved is the
//! signal server, which maps names to endpoints and never sees game traffic.
//!
//! ## Architecture
//!
//! - `register()` spawns an identity task: it binds a listener for incoming
//!   links, claims the name on the signal server and then holds that signal
//!   connection open while accepting links. Aborting the task drops the
//!   signal connection, which releases the name.
//! - `connect()` spawns a task that looks the name up and dials the endpoint.
//! - Every established link gets a reader task (frames -> events) and a writer
//!   task (queued payloads -> frames).
//! - Events flow back through an unbounded channel that the frame loop drains
//!   with `poll_event()`, so the caller never waits on the network.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::{ConnectOptions, LinkId, Transport, TransportError, TransportEvent};
use crate::common::config::SignalConfig;
use crate::common::connection::Connection;
use crate::signal::protocol::{SignalRequest, SignalResponse};

type LinkTable = Arc<Mutex<HashMap<LinkId, LinkHandle>>>;

/// Book-keeping for one link owned by the transport.
struct LinkHandle {
    /// Present once the link is established
    writer: Option<UnboundedSender<Vec<u8>>>,
    open: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl LinkHandle {
    fn pending(task: JoinHandle<()>) -> Self {
        Self {
            writer: None,
            open: Arc::new(AtomicBool::new(false)),
            tasks: vec![task],
        }
    }

    fn shut(self) {
        self.open.store(false, Ordering::SeqCst);
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Shared pieces every background task needs.
#[derive(Clone)]
struct Shared {
    events: UnboundedSender<TransportEvent>,
    links: LinkTable,
    next_link: Arc<AtomicU64>,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        // The receiver is gone only after destroy(); nobody is listening then.
        let _ = self.events.send(event);
    }

    fn allocate(&self) -> LinkId {
        LinkId(self.next_link.fetch_add(1, Ordering::SeqCst))
    }

    /// Wire reader and writer tasks onto an established stream.
    ///
    /// Returns `false` if the link was closed while it was being established.
    fn attach(&self, link: LinkId, stream: TcpStream, incoming: bool) -> bool {
        let mut links = match self.links.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        if !incoming && !links.contains_key(&link) {
            return false;
        }

        let (mut reader, mut writer) = Connection::new(stream).into_split();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let open = Arc::new(AtomicBool::new(true));

        let writer_task = tokio::spawn(async move {
            while let Some(payload) = writer_rx.recv().await {
                if let Err(e) = writer.write_frame(&payload).await {
                    warn!("⚠️  Write on {} failed: {}", link, e);
                    break;
                }
            }
        });

        let shared = self.clone();
        let reader_open = open.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.read_frame().await {
                    Ok(Some(payload)) => shared.emit(TransportEvent::Data { link, payload }),
                    Ok(None) => break,
                    Err(e) => {
                        shared.emit(TransportEvent::LinkError {
                            link,
                            error: TransportError::Network(e.to_string()),
                        });
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            shared.emit(TransportEvent::Closed { link });
        });

        let mut handle = links.remove(&link).unwrap_or(LinkHandle {
            writer: None,
            open: open.clone(),
            tasks: Vec::new(),
        });
        handle.writer = Some(writer_tx);
        handle.open = open;
        handle.tasks.push(writer_task);
        handle.tasks.push(reader_task);
        links.insert(link, handle);
        true
    }
}

/// Transport that links peers directly over TCP.
pub struct TcpTransport {
    runtime: Handle,
    signal_server: String,
    peer_listen: String,
    shared: Shared,
    events: UnboundedReceiver<TransportEvent>,
    identity: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Create a transport whose background tasks run on `runtime`.
    ///
    /// # Example
    /// ```ignore
    /// let transport = TcpTransport::new(&config.signal, Handle::current());
    /// ```
    pub fn new(config: &SignalConfig, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            signal_server: config.server.clone(),
            peer_listen: config.peer_listen.clone(),
            shared: Shared {
                events: tx,
                links: Arc::new(Mutex::new(HashMap::new())),
                next_link: Arc::new(AtomicU64::new(1)),
            },
            events: rx,
            identity: None,
        }
    }

    fn release_identity(&mut self) {
        if let Some(task) = self.identity.take() {
            task.abort();
        }
    }
}

impl Transport for TcpTransport {
    fn register(&mut self, name: &str) {
        self.release_identity();

        let shared = self.shared.clone();
        let name = name.to_string();
        let signal_server = self.signal_server.clone();
        let peer_listen = self.peer_listen.clone();

        self.identity = Some(self.runtime.spawn(async move {
            hold_identity(shared, name, signal_server, peer_listen).await;
        }));
    }

    fn connect(&mut self, remote: &str, options: ConnectOptions) -> LinkId {
        let link = self.shared.allocate();
        if !options.reliable {
            debug!("TCP links are always reliable; ignoring unreliable request for {}", link);
        }

        let shared = self.shared.clone();
        let remote = remote.to_string();
        let signal_server = self.signal_server.clone();

        // Hold the table lock across spawn so the task cannot attach first.
        if let Ok(mut links) = self.shared.links.lock() {
            let task = self.runtime.spawn(async move {
                dial(shared, link, remote, signal_server).await;
            });
            links.insert(link, LinkHandle::pending(task));
        }
        link
    }

    fn send(&mut self, link: LinkId, payload: Vec<u8>) -> Result<(), TransportError> {
        let links = self
            .shared
            .links
            .lock()
            .map_err(|_| TransportError::Other("link table poisoned".to_string()))?;
        match links.get(&link) {
            Some(LinkHandle {
                writer: Some(writer),
                open,
                ..
            }) if open.load(Ordering::SeqCst) => writer
                .send(payload)
                .map_err(|_| TransportError::Other(format!("{} writer stopped", link))),
            _ => Err(TransportError::Other(format!("{} is not open", link))),
        }
    }

    fn is_open(&self, link: LinkId) -> bool {
        self.shared
            .links
            .lock()
            .map(|links| {
                links
                    .get(&link)
                    .is_some_and(|h| h.writer.is_some() && h.open.load(Ordering::SeqCst))
            })
            .unwrap_or(false)
    }

    fn close(&mut self, link: LinkId) {
        let handle = self
            .shared
            .links
            .lock()
            .ok()
            .and_then(|mut links| links.remove(&link));
        if let Some(handle) = handle {
            handle.shut();
            self.shared.emit(TransportEvent::Closed { link });
        }
    }

    fn destroy(&mut self) {
        self.release_identity();

        if let Ok(mut links) = self.shared.links.lock() {
            for (_, handle) in links.drain() {
                handle.shut();
            }
        }

        // Fresh event channel: anything still in flight from aborted tasks is lost.
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.events = tx;
        self.events = rx;
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Claim `name` on the signal server and accept links until aborted.
async fn hold_identity(shared: Shared, name: String, signal_server: String, peer_listen: String) {
    let failed = |error: TransportError| TransportEvent::RegisterFailed {
        name: name.clone(),
        error,
    };

    let listener = match TcpListener::bind(&peer_listen).await {
        Ok(listener) => listener,
        Err(e) => {
            shared.emit(failed(TransportError::Network(format!(
                "cannot listen on {}: {}",
                peer_listen, e
            ))));
            return;
        }
    };
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            shared.emit(failed(TransportError::Network(e.to_string())));
            return;
        }
    };

    let mut signal = match TcpStream::connect(&signal_server).await {
        Ok(stream) => Connection::new(stream),
        Err(e) => {
            shared.emit(failed(TransportError::Network(format!(
                "signal server {} unreachable: {}",
                signal_server, e
            ))));
            return;
        }
    };

    let request = SignalRequest::Register {
        name: name.clone(),
        port,
    };
    if let Err(e) = signal.write_json(&request).await {
        shared.emit(failed(TransportError::Network(e.to_string())));
        return;
    }

    match signal.read_json::<SignalResponse>().await {
        Ok(Some(SignalResponse::Registered { lease })) => {
            info!("✅ Registered {} (lease {}), accepting on port {}", name, lease, port);
            shared.emit(TransportEvent::Registered { name: name.clone() });
        }
        Ok(Some(SignalResponse::Taken)) => {
            shared.emit(failed(TransportError::UnavailableId));
            return;
        }
        Ok(Some(other)) => {
            shared.emit(failed(TransportError::Other(format!(
                "unexpected signal response: {:?}",
                other
            ))));
            return;
        }
        Ok(None) | Err(_) => {
            shared.emit(failed(TransportError::Network(
                "signal server closed the connection".to_string(),
            )));
            return;
        }
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let link = shared.allocate();
                    info!("📥 Incoming link {} from {}", link, addr);
                    if shared.attach(link, stream, true) {
                        shared.emit(TransportEvent::Incoming { link });
                        shared.emit(TransportEvent::Open { link });
                    }
                }
                Err(e) => warn!("⚠️  Accept failed: {}", e),
            },
            closed = signal.read_frame() => {
                if !matches!(closed, Ok(Some(_))) {
                    warn!("⚠️  Lost signal server, {} is no longer reachable", name);
                    shared.emit(TransportEvent::Error(TransportError::Network(
                        "signal server connection lost".to_string(),
                    )));
                    return;
                }
            }
        }
    }
}

/// Resolve `remote` and open a link to it.
async fn dial(shared: Shared, link: LinkId, remote: String, signal_server: String) {
    let fail = |error: TransportError| {
        if let Ok(mut links) = shared.links.lock() {
            links.remove(&link);
        }
        shared.emit(TransportEvent::ConnectFailed { link, error });
    };

    let endpoint = match lookup(&signal_server, &remote).await {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => {
            fail(TransportError::PeerUnavailable(remote));
            return;
        }
        Err(e) => {
            fail(TransportError::Network(e.to_string()));
            return;
        }
    };

    match TcpStream::connect(&endpoint).await {
        Ok(stream) => {
            info!("🔗 {} connected to {} at {}", link, remote, endpoint);
            if shared.attach(link, stream, false) {
                shared.emit(TransportEvent::Open { link });
            }
        }
        Err(e) => {
            debug!("Dial {} at {} failed: {}", remote, endpoint, e);
            fail(TransportError::PeerUnavailable(remote));
        }
    }
}

async fn lookup(signal_server: &str, name: &str) -> anyhow::Result<Option<String>> {
    let stream = TcpStream::connect(signal_server).await?;
    let mut conn = Connection::new(stream);

    conn.write_json(&SignalRequest::Lookup {
        name: name.to_string(),
    })
    .await?;

    match conn.read_json::<SignalResponse>().await? {
        Some(SignalResponse::Found { endpoint }) => Ok(Some(endpoint)),
        Some(SignalResponse::NotFound) => Ok(None),
        other => Err(anyhow::anyhow!("unexpected lookup response: {:?}", other)),
    }
}
