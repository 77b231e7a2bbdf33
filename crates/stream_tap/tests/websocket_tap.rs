//! WebSocket tap integration tests against in-process servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use contracts::{IngestError, Lifecycle, Record, Sink, TapConfig};
use fanout::Tap;
use stream_tap::{ConnectionState, WebSocketTap, WebSocketTapConfig};

/// Sink that records everything it receives
#[derive(Default)]
struct CollectSink {
    records: Mutex<Vec<Record>>,
}

impl CollectSink {
    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for CollectSink {
    fn name(&self) -> &str {
        "collect"
    }

    async fn take(&self, record: Record) -> Result<(), IngestError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Poll a condition until it holds or the timeout expires.
async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn tap_config(name: &str, addr: std::net::SocketAddr) -> WebSocketTapConfig {
    WebSocketTapConfig::new(TapConfig::new(name), format!("ws://{addr}"))
}

#[tokio::test]
async fn test_inbound_messages_reach_sinks_with_default_attribution() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text("hello".into())).await.unwrap();
        ws.send(Message::Binary(Bytes::from_static(&[1, 2, 3])))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    });

    let config = tap_config("ws-test", addr).ping_keep_alive(None);
    let tap = WebSocketTap::new(config, &"host-a".into()).unwrap();
    let sink = Arc::new(CollectSink::default());
    tap.attach_sink(sink.clone());

    tap.enable().await.unwrap();
    assert!(wait_for(|| sink.len() >= 2, Duration::from_secs(5)).await);
    assert_eq!(tap.state(), ConnectionState::Connected);

    let records = sink.records();
    assert_eq!(records[0].content, Bytes::from_static(b"hello"));
    assert_eq!(records[0].author, "host-a");
    assert_eq!(records[0].source, "ws-test");
    assert_eq!(records[1].content, Bytes::from_static(&[1, 2, 3]));

    tap.disable().await.unwrap();
    assert_eq!(tap.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnects_after_peer_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = Arc::clone(&accepts);

    tokio::spawn(async move {
        // First connection: one message, then a clean close.
        let (stream, _) = listener.accept().await.unwrap();
        server_accepts.fetch_add(1, Ordering::SeqCst);
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text("one".into())).await.unwrap();
        ws.close(None).await.unwrap();

        // Second connection: the reconnected client.
        let (stream, _) = listener.accept().await.unwrap();
        server_accepts.fetch_add(1, Ordering::SeqCst);
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text("two".into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = tap_config("ws-reconnect", addr).ping_keep_alive(None);
    let tap = WebSocketTap::new(config, &"host".into()).unwrap();
    let sink = Arc::new(CollectSink::default());
    tap.attach_sink(sink.clone());

    tap.enable().await.unwrap();
    assert!(wait_for(|| sink.len() >= 2, Duration::from_secs(5)).await);

    // Exactly one reconnect for the close.
    assert_eq!(accepts.load(Ordering::SeqCst), 2);
    let contents: Vec<_> = sink.records().into_iter().map(|r| r.content).collect();
    assert_eq!(contents, vec![Bytes::from("one"), Bytes::from("two")]);

    tap.disable().await.unwrap();
}

#[tokio::test]
async fn test_missed_pong_forces_reconnect_within_two_intervals() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_times: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let server_times = Arc::clone(&accept_times);

    tokio::spawn(async move {
        // Complete the handshake, then never poll the socket: pings go
        // unanswered, so the client must decide the connection is dead.
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            server_times.lock().unwrap().push(Instant::now());
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            held.push(ws);
        }
    });

    let ping = Duration::from_millis(200);
    let config = tap_config("ws-ping", addr).ping_keep_alive(Some(ping));
    let tap = WebSocketTap::new(config, &"host".into()).unwrap();

    tap.enable().await.unwrap();
    assert!(wait_for(|| accept_times.lock().unwrap().len() >= 2, Duration::from_secs(5)).await);
    tap.disable().await.unwrap();

    let times = accept_times.lock().unwrap();
    let gap = times[1].duration_since(times[0]);
    // First probe goes out on connect; the unanswered probe is noticed one
    // interval later. Allow generous scheduling slack either side.
    assert!(gap >= Duration::from_millis(150), "gap was {gap:?}");
    assert!(gap <= Duration::from_millis(1000), "gap was {gap:?}");
}

#[tokio::test]
async fn test_silence_kill_reconnects_and_inbound_data_defers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_times: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let server_times = Arc::clone(&accept_times);

    tokio::spawn(async move {
        // First connection: one message half-way into the silence window,
        // then nothing.
        let (stream, _) = listener.accept().await.unwrap();
        server_times.lock().unwrap().push(Instant::now());
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        ws.send(Message::Text("keep".into())).await.unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        server_times.lock().unwrap().push(Instant::now());
        let mut ws2 = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws2.next().await.is_some() {}
    });

    let config = tap_config("ws-silence", addr)
        .ping_keep_alive(None)
        .silence_kill(Some(Duration::from_millis(300)));
    let tap = WebSocketTap::new(config, &"host".into()).unwrap();
    let sink = Arc::new(CollectSink::default());
    tap.attach_sink(sink.clone());

    tap.enable().await.unwrap();
    assert!(wait_for(|| accept_times.lock().unwrap().len() >= 2, Duration::from_secs(5)).await);
    tap.disable().await.unwrap();

    // The message got through before the reconnect.
    assert_eq!(sink.records()[0].content, Bytes::from_static(b"keep"));

    // The message at 150ms deferred the kill past the first check at 300ms;
    // the second check at 600ms fired it.
    let times = accept_times.lock().unwrap();
    let gap = times[1].duration_since(times[0]);
    assert!(gap >= Duration::from_millis(450), "gap was {gap:?}");
    assert!(gap <= Duration::from_millis(1500), "gap was {gap:?}");
}

#[tokio::test]
async fn test_disable_stops_reconnection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = Arc::clone(&accepts);

    tokio::spawn(async move {
        // Accept one connection and close it straight away, then stop
        // listening entirely.
        let (stream, _) = listener.accept().await.unwrap();
        server_accepts.fetch_add(1, Ordering::SeqCst);
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.ok();
        drop(listener);
    });

    let config = tap_config("ws-disable", addr).ping_keep_alive(None);
    let tap = WebSocketTap::new(config, &"host".into()).unwrap();

    tap.enable().await.unwrap();
    assert!(wait_for(|| accepts.load(Ordering::SeqCst) >= 1, Duration::from_secs(5)).await);

    // The tap is now cycling through failed reconnect attempts; disable must
    // return promptly and leave it fully stopped.
    tokio::time::timeout(Duration::from_secs(2), tap.disable())
        .await
        .expect("disable timed out")
        .unwrap();
    assert_eq!(tap.state(), ConnectionState::Disconnected);
    assert!(!tap.is_enabled());

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(tap.state(), ConnectionState::Disconnected);
}
