#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    use peer_duel::common::config::{NetworkConfig, SignalConfig};
    use peer_duel::common::messages::{FighterId, Message};
    use peer_duel::signal::SignalServer;
    use peer_duel::transport::{
        ConnectOptions, TcpTransport, Transport, TransportError, TransportEvent,
    };
    use peer_duel::{Session, SessionError};

    async fn start_signal() -> SignalConfig {
        let (addr, _server) = SignalServer::new().start("127.0.0.1:0").await.unwrap();
        SignalConfig {
            server: addr.to_string(),
            listen: addr.to_string(),
            peer_listen: "127.0.0.1:0".to_string(),
        }
    }

    fn session(config: &SignalConfig) -> Session<TcpTransport> {
        Session::new(
            TcpTransport::new(config, Handle::current()),
            NetworkConfig::default(),
        )
    }

    /// Pump both sessions until `done` holds or about three seconds pass.
    async fn settle<F>(
        a: &mut Session<TcpTransport>,
        b: &mut Session<TcpTransport>,
        mut done: F,
    ) -> bool
    where
        F: FnMut(&Session<TcpTransport>, &Session<TcpTransport>) -> bool,
    {
        for _ in 0..300 {
            a.pump();
            b.pump();
            if done(&*a, &*b) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn next_event(transport: &mut TcpTransport) -> Option<TransportEvent> {
        for _ in 0..300 {
            if let Some(event) = transport.poll_event() {
                return Some(event);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_host_and_join_over_loopback() {
        let config = start_signal().await;
        let mut host = session(&config);
        let mut client = session(&config);

        host.host_game(|| {}).unwrap();
        let mut idle = session(&config);
        assert!(settle(&mut host, &mut idle, |h, _| h.code().is_some()).await);
        let code = host.code().unwrap().to_string();

        let errors: Rc<RefCell<Vec<SessionError>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        client
            .join_game(&code, || {}, move |e| sink.borrow_mut().push(e))
            .unwrap();
        assert!(settle(&mut host, &mut client, |h, c| h.is_connected() && c.is_connected()).await);
        assert!(errors.borrow().is_empty());

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        host.on_data(Some(Box::new(move |m| sink.borrow_mut().push(m))));

        let pick = Message::CharacterSelected {
            character: FighterId::from_index(6),
        };
        client.send(&pick);
        assert!(settle(&mut host, &mut client, |_, _| !received.borrow().is_empty()).await);
        assert_eq!(*received.borrow(), vec![pick]);

        host.clean_up();
        assert!(settle(&mut host, &mut client, |_, c| !c.is_connected()).await);
        client.clean_up();
    }

    #[tokio::test]
    async fn test_join_unknown_code_reports_host_not_found() {
        let config = start_signal().await;
        let mut client = session(&config);
        let mut idle = session(&config);

        let errors: Rc<RefCell<Vec<SessionError>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        client
            .join_game("QQQQ", || {}, move |e| sink.borrow_mut().push(e))
            .unwrap();

        assert!(settle(&mut client, &mut idle, |_, _| !errors.borrow().is_empty()).await);
        assert_eq!(
            *errors.borrow(),
            vec![SessionError::HostNotFound {
                code: "QQQQ".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_name_is_exclusive_until_released() {
        let config = start_signal().await;
        let mut first = TcpTransport::new(&config, Handle::current());
        let mut second = TcpTransport::new(&config, Handle::current());

        first.register("EHUTI-TEST");
        assert!(matches!(
            next_event(&mut first).await,
            Some(TransportEvent::Registered { .. })
        ));

        second.register("EHUTI-TEST");
        assert!(matches!(
            next_event(&mut second).await,
            Some(TransportEvent::RegisterFailed {
                error: TransportError::UnavailableId,
                ..
            })
        ));

        first.destroy();
        let mut registered = false;
        for _ in 0..50 {
            second.destroy();
            second.register("EHUTI-TEST");
            if matches!(
                next_event(&mut second).await,
                Some(TransportEvent::Registered { .. })
            ) {
                registered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(registered);
    }

    #[tokio::test]
    async fn test_connect_to_unregistered_name_fails() {
        let config = start_signal().await;
        let mut transport = TcpTransport::new(&config, Handle::current());

        let link = transport.connect("EHUTI-NONE", ConnectOptions { reliable: true });
        assert!(!transport.is_open(link));
        assert!(matches!(
            next_event(&mut transport).await,
            Some(TransportEvent::ConnectFailed {
                error: TransportError::PeerUnavailable(_),
                ..
            })
        ));
    }
}
