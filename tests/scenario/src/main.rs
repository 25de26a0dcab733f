fn main() {
    println!("Run `cargo test -p scenario` to execute the end-to-end scenarios.");
}

#[cfg(test)]
mod loopback;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    use dropline_negotiation::{
        EVENT_QUEUE_SIZE, NegotiationError, NegotiationState, Negotiator, Role, WsPipe,
    };
    use dropline_relay_server::{Relay, RelayServer, ServerConfig};
    use dropline_transfer::{
        ChannelEvent, DataChannel, FileReceiver, ReceivedFile, ReceiverConfig, SendOptions,
        send_file,
    };

    use crate::loopback::{Endpoint, Link, LoopbackEngine};

    const TIMEOUT: Duration = Duration::from_secs(5);

    type PeerNegotiator = Negotiator<LoopbackEngine, WsPipe>;
    type Outcome = (PeerNegotiator, Result<Endpoint, NegotiationError>);

    async fn start_relay() -> (Arc<RelayServer>, String) {
        let config = ServerConfig {
            bind: std::net::Ipv4Addr::LOCALHOST.into(),
            port: 0,
            ..Default::default()
        };
        let server = RelayServer::new(config, Relay::new());
        let runner = server.clone();
        tokio::spawn(async move { runner.run().await });

        for _ in 0..200 {
            if let Some(addr) = server.local_addr().await {
                return (server, format!("ws://{addr}"));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("relay did not bind");
    }

    /// Connects one peer to the relay and runs its negotiation in a task.
    async fn spawn_peer(
        link: &Arc<Link>,
        role: Role,
        url: &str,
        room: Option<&str>,
        cancel: CancellationToken,
    ) -> JoinHandle<Outcome> {
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let engine = link.engine(role, tx.clone());
        let pipe = WsPipe::connect(url, tx).await.expect("connect to relay");

        let mut negotiator = Negotiator::new(role, engine, pipe);
        if let Some(room) = room {
            negotiator = negotiator.with_room(room);
        }

        tokio::spawn(async move {
            let res = negotiator.run(&mut rx, &cancel).await;
            (negotiator, res)
        })
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    async fn answerer_registered(server: &RelayServer, room: &str) {
        wait_until(|| async move { server.handler().answerer_in(room).await.is_some() }).await;
    }

    async fn offerer_registered(server: &RelayServer, room: &str) {
        wait_until(|| async move { server.handler().offerer_in(room).await.is_some() }).await;
    }

    async fn finish(handle: JoinHandle<Outcome>) -> Outcome {
        tokio::time::timeout(TIMEOUT, handle)
            .await
            .expect("negotiation timed out")
            .expect("negotiation task panicked")
    }

    /// Opens a channel between a fresh answerer and offerer in `room`.
    async fn connect_pair(
        server: &Arc<RelayServer>,
        url: &str,
        link: &Arc<Link>,
        room: Option<&str>,
    ) -> (Endpoint, Endpoint) {
        let cancel = CancellationToken::new();
        let answerer = spawn_peer(link, Role::Answerer, url, room, cancel.clone()).await;
        answerer_registered(server, room.unwrap_or("")).await;
        let offerer = spawn_peer(link, Role::Offerer, url, room, cancel).await;

        let (o_neg, o_res) = finish(offerer).await;
        let (a_neg, a_res) = finish(answerer).await;
        assert_eq!(o_neg.state(), NegotiationState::ChannelOpen);
        assert_eq!(a_neg.state(), NegotiationState::ChannelOpen);
        (o_res.expect("offerer channel"), a_res.expect("answerer channel"))
    }

    /// Feeds the answerer's inbox into a receiver; returns the file and
    /// the size of every binary message seen.
    fn spawn_receiver(mut endpoint: Endpoint) -> JoinHandle<(Option<ReceivedFile>, Vec<usize>)> {
        tokio::spawn(async move {
            let (done_tx, mut done_rx) = mpsc::unbounded_channel();
            let mut receiver = FileReceiver::new(ReceiverConfig::default(), move |file| {
                let _ = done_tx.send(file);
            });
            let mut chunk_sizes = Vec::new();

            while let Some(event) = endpoint.incoming.recv().await {
                if let ChannelEvent::Binary(data) = &event {
                    chunk_sizes.push(data.len());
                }
                let closed = event == ChannelEvent::Closed;
                receiver.handle(event).expect("well-formed transfer");
                if let Ok(file) = done_rx.try_recv() {
                    return (Some(file), chunk_sizes);
                }
                if closed {
                    break;
                }
            }
            (None, chunk_sizes)
        })
    }

    fn demo_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn demo_file_end_to_end() {
        let (server, url) = start_relay().await;
        let link = Link::new("demo");

        let (offerer, answerer) = connect_pair(&server, &url, &link, None).await;

        // The offer arrived intact and the offerer's candidate was
        // delivered to the answerer through the relay.
        let offer = link.remote_description(Role::Answerer).unwrap();
        assert_eq!(offer["type"], "offer");
        assert_eq!(offer["sdp"], "v=0 offer demo");
        let candidates = link.remote_candidates(Role::Answerer);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0]["candidate"].as_str().unwrap().contains("demo"));
        assert_eq!(link.remote_candidates(Role::Offerer).len(), 1);

        let receiving = spawn_receiver(answerer);
        let data = demo_bytes(20_000);
        let sent = send_file(&offerer.outgoing, "demo.txt", &data, &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(sent, 20_000);

        let (file, chunk_sizes) = tokio::time::timeout(TIMEOUT, receiving)
            .await
            .unwrap()
            .unwrap();
        let file = file.expect("file completed");
        assert_eq!(chunk_sizes, vec![16_384, 3_616]);
        assert_eq!(file.name(), "demo.txt");
        assert_eq!(file.data(), &data[..]);

        let dir = tempfile::tempdir().unwrap();
        let path = file.save_to(dir.path()).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), data);

        server.shutdown();
    }

    #[tokio::test]
    async fn zero_byte_file_end_to_end() {
        let (server, url) = start_relay().await;
        let link = Link::new("empty");
        let (offerer, answerer) = connect_pair(&server, &url, &link, None).await;

        let receiving = spawn_receiver(answerer);
        send_file(&offerer.outgoing, "empty.bin", &Vec::<u8>::new(), &SendOptions::default())
            .await
            .unwrap();

        let (file, chunk_sizes) = tokio::time::timeout(TIMEOUT, receiving)
            .await
            .unwrap()
            .unwrap();
        assert!(file.unwrap().is_empty());
        assert!(chunk_sizes.is_empty());

        server.shutdown();
    }

    #[tokio::test]
    async fn rooms_keep_pairs_apart() {
        let (server, url) = start_relay().await;
        let red = Link::new("red");
        let blue = Link::new("blue");

        let cancel = CancellationToken::new();
        let red_answerer =
            spawn_peer(&red, Role::Answerer, &url, Some("red"), cancel.clone()).await;
        let blue_answerer =
            spawn_peer(&blue, Role::Answerer, &url, Some("blue"), cancel.clone()).await;
        answerer_registered(&server, "red").await;
        answerer_registered(&server, "blue").await;

        let blue_offerer =
            spawn_peer(&blue, Role::Offerer, &url, Some("blue"), cancel.clone()).await;
        let red_offerer = spawn_peer(&red, Role::Offerer, &url, Some("red"), cancel).await;

        for handle in [red_answerer, blue_answerer, blue_offerer, red_offerer] {
            let (negotiator, res) = finish(handle).await;
            assert!(res.is_ok());
            assert_eq!(negotiator.state(), NegotiationState::ChannelOpen);
        }

        assert_eq!(
            red.remote_description(Role::Answerer).unwrap()["sdp"],
            "v=0 offer red"
        );
        assert_eq!(
            blue.remote_description(Role::Answerer).unwrap()["sdp"],
            "v=0 offer blue"
        );
        assert_eq!(
            blue.remote_description(Role::Offerer).unwrap()["sdp"],
            "v=0 answer blue"
        );
        assert_eq!(server.handler().room_count().await, 2);

        server.shutdown();
    }

    #[tokio::test]
    async fn late_answerer_never_sees_earlier_offer() {
        let (server, url) = start_relay().await;
        let link = Link::new("late");
        let cancel = CancellationToken::new();

        let offerer = spawn_peer(&link, Role::Offerer, &url, None, cancel.clone()).await;
        offerer_registered(&server, "").await;

        let answerer = spawn_peer(&link, Role::Answerer, &url, None, cancel.clone()).await;
        answerer_registered(&server, "").await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(link.remote_description(Role::Answerer).is_none());
        assert!(!link.is_open());

        cancel.cancel();
        let (negotiator, res) = finish(answerer).await;
        assert!(matches!(res, Err(NegotiationError::Aborted)));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
        let (_, res) = finish(offerer).await;
        assert!(res.is_err());

        server.shutdown();
    }

    #[tokio::test]
    async fn relay_shutdown_fails_pending_negotiation() {
        let (server, url) = start_relay().await;
        let link = Link::new("down");

        let answerer =
            spawn_peer(&link, Role::Answerer, &url, None, CancellationToken::new()).await;
        answerer_registered(&server, "").await;

        server.shutdown();

        let (negotiator, res) = finish(answerer).await;
        assert!(matches!(res, Err(NegotiationError::SignalingClosed)));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
    }

    #[tokio::test]
    async fn closing_channel_discards_partial_transfer() {
        let (server, url) = start_relay().await;
        let link = Link::new("cut");
        let (offerer, answerer) = connect_pair(&server, &url, &link, None).await;

        let receiving = spawn_receiver(answerer);
        let metadata = dropline_protocol::ChannelMessage::file_metadata("cut.bin", 50_000)
            .encode()
            .unwrap();
        offerer.outgoing.send_text(metadata).await.unwrap();
        offerer.outgoing.send_binary(vec![0u8; 16_384]).await.unwrap();
        offerer.outgoing.close();

        let (file, chunk_sizes) = tokio::time::timeout(TIMEOUT, receiving)
            .await
            .unwrap()
            .unwrap();
        assert!(file.is_none());
        assert_eq!(chunk_sizes, vec![16_384]);
        assert!(!offerer.outgoing.is_open());

        server.shutdown();
    }
}
