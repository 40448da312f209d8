//! In-process transport.
//!
//! A [`MemoryNetwork`] is a shared registry of names and links; each
//! [`MemoryTransport`] is one endpoint on it with its own event queue. All
//! state lives behind `Rc<RefCell<_>>`: the network is driven from a single
//! thread, exactly like the frame loop that owns the session.
//!
//! The network exposes knobs that the real world provides for free: names
//! already taken by strangers, an offline network, hosts that never answer,
//! dropped payloads and reordered payloads.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::{ConnectOptions, LinkId, Transport, TransportError, TransportEvent};

type EndpointId = u64;

#[derive(Default)]
struct Endpoint {
    name: Option<String>,
    queue: VecDeque<TransportEvent>,
}

struct Link {
    owner: EndpointId,
    peer: Option<LinkId>,
    open: bool,
    closed: bool,
}

struct NetworkState {
    online: bool,
    next_endpoint: EndpointId,
    next_link: u64,
    names: HashMap<String, EndpointId>,
    foreign_names: HashSet<String>,
    stalled_names: HashSet<String>,
    stalled_links: Vec<(LinkId, String)>,
    endpoints: HashMap<EndpointId, Endpoint>,
    links: HashMap<LinkId, Link>,
    drop_budget: usize,
    reorder: bool,
    held: Vec<(EndpointId, TransportEvent)>,
    delivered: usize,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            online: true,
            next_endpoint: 1,
            next_link: 1,
            names: HashMap::new(),
            foreign_names: HashSet::new(),
            stalled_names: HashSet::new(),
            stalled_links: Vec::new(),
            endpoints: HashMap::new(),
            links: HashMap::new(),
            drop_budget: 0,
            reorder: false,
            held: Vec::new(),
            delivered: 0,
        }
    }
}

impl NetworkState {
    fn push(&mut self, endpoint: EndpointId, event: TransportEvent) {
        if let Some(ep) = self.endpoints.get_mut(&endpoint) {
            ep.queue.push_back(event);
        }
    }

    fn new_link(&mut self, owner: EndpointId) -> LinkId {
        let id = LinkId(self.next_link);
        self.next_link += 1;
        self.links.insert(
            id,
            Link {
                owner,
                peer: None,
                open: false,
                closed: false,
            },
        );
        id
    }

    /// Complete a pending outbound link to the endpoint registered as `remote`.
    fn accept(&mut self, outbound: LinkId, remote: &str) {
        let Some(owner) = self.links.get(&outbound).map(|l| l.owner) else {
            return;
        };

        let Some(&host) = self.names.get(remote) else {
            if let Some(link) = self.links.get_mut(&outbound) {
                link.closed = true;
            }
            self.push(
                owner,
                TransportEvent::ConnectFailed {
                    link: outbound,
                    error: TransportError::PeerUnavailable(remote.to_string()),
                },
            );
            return;
        };

        let inbound = self.new_link(host);
        if let Some(link) = self.links.get_mut(&outbound) {
            link.peer = Some(inbound);
            link.open = true;
        }
        if let Some(link) = self.links.get_mut(&inbound) {
            link.peer = Some(outbound);
            link.open = true;
        }

        self.push(host, TransportEvent::Incoming { link: inbound });
        self.push(host, TransportEvent::Open { link: inbound });
        self.push(owner, TransportEvent::Open { link: outbound });
    }

    fn close(&mut self, id: LinkId) {
        let Some(link) = self.links.get_mut(&id) else {
            return;
        };
        if link.closed {
            return;
        }
        link.open = false;
        link.closed = true;
        let owner = link.owner;
        let peer = link.peer;

        self.stalled_links.retain(|(pending, _)| *pending != id);
        self.push(owner, TransportEvent::Closed { link: id });

        if let Some(peer_id) = peer {
            if let Some(peer_link) = self.links.get_mut(&peer_id) {
                if !peer_link.closed {
                    peer_link.open = false;
                    peer_link.closed = true;
                    let peer_owner = peer_link.owner;
                    self.push(peer_owner, TransportEvent::Closed { link: peer_id });
                }
            }
        }
    }
}

/// Shared in-process network. Cloning yields another handle to the same network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint to the network.
    pub fn endpoint(&self) -> MemoryTransport {
        let mut state = self.state.borrow_mut();
        let id = state.next_endpoint;
        state.next_endpoint += 1;
        state.endpoints.insert(id, Endpoint::default());
        MemoryTransport {
            network: self.clone(),
            endpoint: id,
        }
    }

    /// Mark `name` as held by a party outside this network's endpoints.
    pub fn occupy(&self, name: &str) {
        self.state.borrow_mut().foreign_names.insert(name.to_string());
    }

    /// While offline, registrations and connects fail with a network error.
    pub fn set_online(&self, online: bool) {
        self.state.borrow_mut().online = online;
    }

    /// Links to `name` stay pending until [`MemoryNetwork::release_stalled`].
    pub fn stall(&self, name: &str) {
        self.state.borrow_mut().stalled_names.insert(name.to_string());
    }

    /// Stop stalling `name` and complete every link still waiting on it.
    pub fn release_stalled(&self, name: &str) {
        let mut state = self.state.borrow_mut();
        state.stalled_names.remove(name);
        let (ready, waiting): (Vec<_>, Vec<_>) = state
            .stalled_links
            .drain(..)
            .partition(|(_, remote)| remote == name);
        state.stalled_links = waiting;
        for (link, remote) in ready {
            state.accept(link, &remote);
        }
    }

    /// Silently drop the next `count` payloads sent on any link.
    pub fn drop_next(&self, count: usize) {
        self.state.borrow_mut().drop_budget = count;
    }

    /// While enabled, payloads are held back; [`MemoryNetwork::flush_held`]
    /// delivers them newest first.
    pub fn set_reorder(&self, reorder: bool) {
        self.state.borrow_mut().reorder = reorder;
    }

    pub fn flush_held(&self) {
        let mut state = self.state.borrow_mut();
        let held: Vec<_> = state.held.drain(..).collect();
        for (endpoint, event) in held.into_iter().rev() {
            state.delivered += 1;
            state.push(endpoint, event);
        }
    }

    /// Number of payloads handed to a receiving endpoint so far.
    pub fn delivered(&self) -> usize {
        self.state.borrow().delivered
    }

    /// Whether `name` is currently registered by an endpoint on this network.
    pub fn is_registered(&self, name: &str) -> bool {
        self.state.borrow().names.contains_key(name)
    }

    pub fn registered_count(&self) -> usize {
        self.state.borrow().names.len()
    }
}

/// One endpoint of a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    endpoint: EndpointId,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Transport for MemoryTransport {
    fn register(&mut self, name: &str) {
        let mut state = self.network.state.borrow_mut();

        if !state.online {
            state.push(
                self.endpoint,
                TransportEvent::RegisterFailed {
                    name: name.to_string(),
                    error: TransportError::Network("offline".to_string()),
                },
            );
            return;
        }

        let taken = state.foreign_names.contains(name)
            || state
                .names
                .get(name)
                .is_some_and(|owner| *owner != self.endpoint);
        if taken {
            state.push(
                self.endpoint,
                TransportEvent::RegisterFailed {
                    name: name.to_string(),
                    error: TransportError::UnavailableId,
                },
            );
            return;
        }

        let previous = state
            .endpoints
            .get_mut(&self.endpoint)
            .and_then(|ep| ep.name.replace(name.to_string()));
        if let Some(previous) = previous {
            state.names.remove(&previous);
        }
        state.names.insert(name.to_string(), self.endpoint);
        state.push(
            self.endpoint,
            TransportEvent::Registered {
                name: name.to_string(),
            },
        );
    }

    fn connect(&mut self, remote: &str, _options: ConnectOptions) -> LinkId {
        let mut state = self.network.state.borrow_mut();
        let link = state.new_link(self.endpoint);

        if !state.online {
            if let Some(l) = state.links.get_mut(&link) {
                l.closed = true;
            }
            state.push(
                self.endpoint,
                TransportEvent::ConnectFailed {
                    link,
                    error: TransportError::Network("offline".to_string()),
                },
            );
        } else if state.stalled_names.contains(remote) {
            state.stalled_links.push((link, remote.to_string()));
        } else {
            state.accept(link, remote);
        }

        link
    }

    fn send(&mut self, link: LinkId, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut state = self.network.state.borrow_mut();
        let peer = match state.links.get(&link) {
            Some(l) if l.open && l.owner == self.endpoint => l.peer,
            _ => return Err(TransportError::Other(format!("{} is not open", link))),
        };
        let Some(peer) = peer else {
            return Err(TransportError::Other(format!("{} has no peer", link)));
        };
        let peer_owner = match state.links.get(&peer) {
            Some(l) if l.open => l.owner,
            _ => return Err(TransportError::Other(format!("{} peer closed", link))),
        };

        if state.drop_budget > 0 {
            state.drop_budget -= 1;
            return Ok(());
        }

        let event = TransportEvent::Data {
            link: peer,
            payload,
        };
        if state.reorder {
            state.held.push((peer_owner, event));
        } else {
            state.delivered += 1;
            state.push(peer_owner, event);
        }
        Ok(())
    }

    fn is_open(&self, link: LinkId) -> bool {
        let state = self.network.state.borrow();
        state
            .links
            .get(&link)
            .is_some_and(|l| l.open && l.owner == self.endpoint)
    }

    fn close(&mut self, link: LinkId) {
        let mut state = self.network.state.borrow_mut();
        if state.links.get(&link).is_some_and(|l| l.owner == self.endpoint) {
            state.close(link);
        }
    }

    fn destroy(&mut self) {
        let mut state = self.network.state.borrow_mut();

        let owned: Vec<LinkId> = state
            .links
            .iter()
            .filter(|(_, l)| l.owner == self.endpoint && !l.closed)
            .map(|(id, _)| *id)
            .collect();
        for link in owned {
            state.close(link);
        }

        let name = state
            .endpoints
            .get_mut(&self.endpoint)
            .and_then(|ep| ep.name.take());
        if let Some(name) = name {
            state.names.remove(&name);
        }
        if let Some(ep) = state.endpoints.get_mut(&self.endpoint) {
            ep.queue.clear();
        }
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.network
            .state
            .borrow_mut()
            .endpoints
            .get_mut(&self.endpoint)
            .and_then(|ep| ep.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(t: &mut MemoryTransport) -> Vec<TransportEvent> {
        std::iter::from_fn(|| t.poll_event()).collect()
    }

    #[test]
    fn test_register_collision_and_release() {
        let net = MemoryNetwork::new();
        let mut a = net.endpoint();
        let mut b = net.endpoint();

        a.register("EHUTI-AAAA");
        b.register("EHUTI-AAAA");

        assert_eq!(
            drain(&mut a),
            vec![TransportEvent::Registered {
                name: "EHUTI-AAAA".into()
            }]
        );
        assert_eq!(
            drain(&mut b),
            vec![TransportEvent::RegisterFailed {
                name: "EHUTI-AAAA".into(),
                error: TransportError::UnavailableId,
            }]
        );

        a.destroy();
        assert!(!net.is_registered("EHUTI-AAAA"));
        b.register("EHUTI-AAAA");
        assert!(net.is_registered("EHUTI-AAAA"));
    }

    #[test]
    fn test_connect_opens_both_ends_and_carries_data() {
        let net = MemoryNetwork::new();
        let mut host = net.endpoint();
        let mut guest = net.endpoint();
        host.register("EHUTI-HOST");
        drain(&mut host);

        let out = guest.connect("EHUTI-HOST", ConnectOptions::default());
        let host_events = drain(&mut host);
        let inbound = match host_events[0] {
            TransportEvent::Incoming { link } => link,
            ref other => panic!("expected Incoming, got {:?}", other),
        };
        assert_eq!(host_events[1], TransportEvent::Open { link: inbound });
        assert_eq!(drain(&mut guest), vec![TransportEvent::Open { link: out }]);

        guest.send(out, b"hi".to_vec()).unwrap();
        assert_eq!(
            drain(&mut host),
            vec![TransportEvent::Data {
                link: inbound,
                payload: b"hi".to_vec()
            }]
        );

        guest.close(out);
        assert!(!host.is_open(inbound));
        assert_eq!(drain(&mut host), vec![TransportEvent::Closed { link: inbound }]);
        assert!(guest.send(out, b"late".to_vec()).is_err());
    }

    #[test]
    fn test_unknown_remote_fails_the_link() {
        let net = MemoryNetwork::new();
        let mut guest = net.endpoint();

        let out = guest.connect("EHUTI-NOPE", ConnectOptions::default());
        assert_eq!(
            drain(&mut guest),
            vec![TransportEvent::ConnectFailed {
                link: out,
                error: TransportError::PeerUnavailable("EHUTI-NOPE".into()),
            }]
        );
    }

    #[test]
    fn test_reorder_delivers_newest_first() {
        let net = MemoryNetwork::new();
        let mut host = net.endpoint();
        let mut guest = net.endpoint();
        host.register("EHUTI-HOST");
        let out = guest.connect("EHUTI-HOST", ConnectOptions::default());
        drain(&mut host);

        net.set_reorder(true);
        guest.send(out, b"1".to_vec()).unwrap();
        guest.send(out, b"2".to_vec()).unwrap();
        assert!(drain(&mut host).is_empty());

        net.flush_held();
        let payloads: Vec<Vec<u8>> = drain(&mut host)
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::Data { payload, .. } => Some(payload),
                _ => None,
            })
            .collect();
        assert_eq!(payloads, vec![b"2".to_vec(), b"1".to_vec()]);
    }
}
