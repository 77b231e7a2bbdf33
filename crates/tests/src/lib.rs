//! # Integration Tests
//!
//! End-to-end tests across the pipeline crates.
//!
//! Covers:
//! - Blueprint-to-contract consistency
//! - Mock e2e flows (no broker, in-process WebSocket servers)
//! - Pipe fan-in across multiple taps

#[cfg(test)]
mod support {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use contracts::{IngestError, Record, Sink};

    /// Sink that records everything it receives
    #[derive(Default)]
    pub struct CollectSink {
        records: Mutex<Vec<Record>>,
    }

    impl CollectSink {
        pub fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn records(&self) -> Vec<Record> {
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
    pub async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }
}

#[cfg(test)]
mod contract_tests {
    use bytes::Bytes;
    use contracts::{AuthorDefault, PartialRecord};

    #[test]
    fn test_partial_record_resolution_defaults() {
        let record = PartialRecord::new("payload").resolve("host-a", "events");
        assert_eq!(record.author, "host-a");
        assert_eq!(record.source, "events");
        assert_eq!(record.content, Bytes::from("payload"));
    }

    #[test]
    fn test_author_default_precedence() {
        let configured = AuthorDefault::resolve(Some("configured".into()));
        assert_eq!(configured.as_str(), "configured");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use contracts::{Lifecycle, Record, TapConfig};
    use fanout::{Pipe, Tap};
    use futures_util::{SinkExt, StreamExt};
    use queue_tap::{AmqpTap, AmqpTapConfig, MockDelivery, MockQueueClient, QueueBind};
    use sinks::{FileSink, FileSinkConfig, PayloadMode};
    use stream_tap::{WebSocketTap, WebSocketTapConfig};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use crate::support::{wait_for, CollectSink};

    fn amqp_config(name: &str) -> AmqpTapConfig {
        AmqpTapConfig::new(
            TapConfig::new(name),
            "amqp://localhost:5672",
            "ingest",
            format!("{name}-queue"),
        )
        .with_bind(QueueBind::new("telemetry.#"))
    }

    /// End-to-end: mock queue -> AmqpTap -> Pipe -> CollectSink + FileSink
    #[tokio::test]
    async fn test_e2e_queue_to_file_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.log");

        let file_sink = Arc::new(FileSink::new(
            FileSinkConfig::new("archive", path.to_str().unwrap()).with_mode(PayloadMode::Text),
        ));
        file_sink.enable().await.unwrap();
        let collect = Arc::new(CollectSink::default());

        let pipe = Arc::new(Pipe::new());
        pipe.attach_sink(file_sink.clone());
        pipe.attach_sink(collect.clone());

        let (client, handle) = MockQueueClient::new();
        let tap =
            AmqpTap::with_client(amqp_config("events"), &"host-a".into(), client).unwrap();
        tap.attach_sink(pipe.clone());
        tap.enable().await.unwrap();

        for i in 0..3 {
            handle.deliver(MockDelivery::body(format!("payload-{i}")));
        }
        assert!(wait_for(|| collect.len() == 3, Duration::from_secs(2)).await);

        tap.disable().await.unwrap();
        file_sink.disable().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("\"payload-0\""));
        assert_eq!(handle.acks().len(), 3);

        let records = collect.records();
        assert!(records.iter().all(|r| r.author == "host-a" && r.source == "events"));
    }

    /// End-to-end: in-process WebSocket server -> WebSocketTap -> Pipe -> sink
    #[tokio::test]
    async fn test_e2e_websocket_through_pipe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("tick".into())).await.unwrap();
            ws.send(Message::Binary(Bytes::from_static(&[9, 9])))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let collect = Arc::new(CollectSink::default());
        let pipe = Arc::new(Pipe::new());
        pipe.attach_sink(collect.clone());

        let config = WebSocketTapConfig::new(TapConfig::new("market"), format!("ws://{addr}"))
            .ping_keep_alive(None);
        let tap = WebSocketTap::new(config, &"host-a".into()).unwrap();
        tap.attach_sink(pipe.clone());
        tap.enable().await.unwrap();

        assert!(wait_for(|| collect.len() == 2, Duration::from_secs(2)).await);
        tap.disable().await.unwrap();

        let records = collect.records();
        assert_eq!(records[0].content, Bytes::from("tick"));
        assert_eq!(records[0].source, "market");
    }

    /// Two taps feeding the same pipe: records merge with their original
    /// attribution intact.
    #[tokio::test]
    async fn test_pipe_merges_records_from_multiple_taps() {
        let collect = Arc::new(CollectSink::default());
        let pipe = Arc::new(Pipe::new());
        pipe.attach_sink(collect.clone());

        let (client_a, handle_a) = MockQueueClient::new();
        let tap_a = AmqpTap::with_client(amqp_config("alpha"), &"host-a".into(), client_a).unwrap();
        tap_a.attach_sink(pipe.clone());
        tap_a.enable().await.unwrap();

        let (client_b, handle_b) = MockQueueClient::new();
        let tap_b = AmqpTap::with_client(amqp_config("beta"), &"host-b".into(), client_b).unwrap();
        tap_b.attach_sink(pipe.clone());
        tap_b.enable().await.unwrap();

        handle_a.deliver(MockDelivery::body("from-alpha"));
        handle_b.deliver(MockDelivery::body("from-beta"));
        assert!(wait_for(|| collect.len() == 2, Duration::from_secs(2)).await);

        tap_a.disable().await.unwrap();
        tap_b.disable().await.unwrap();

        let records = collect.records();
        let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
        assert!(sources.contains(&"alpha"));
        assert!(sources.contains(&"beta"));
        let authors: Vec<&str> = records.iter().map(|r| r.author.as_str()).collect();
        assert!(authors.contains(&"host-a"));
        assert!(authors.contains(&"host-b"));
    }

    /// A blueprint string drives the same wiring the CLI performs.
    #[tokio::test]
    async fn test_blueprint_round_trip_matches_tap_configs() {
        let toml = r#"
default_author = "host-a"

[[taps.amqp]]
name = "events"
uri = "amqp://localhost:5672"
exchange = "ingest"
queue_name = "events-queue"
prefetch = 2
sinks = ["console"]

[[taps.amqp.binds]]
pattern = "telemetry.#"

[[sinks.log]]
name = "console"
"#;
        let blueprint = config_loader::ConfigLoader::load_from_str(
            toml,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let spec = &blueprint.taps.amqp[0];
        let config = AmqpTapConfig::new(
            TapConfig::new(&spec.name),
            &spec.uri,
            &spec.exchange,
            &spec.queue_name,
        )
        .with_prefetch(spec.prefetch)
        .with_bind(QueueBind::new(&spec.binds[0].pattern));

        let plan = config.provision_plan();
        assert_eq!(plan.queue_name, "events-queue");
        assert_eq!(plan.prefetch, 2);
        assert_eq!(
            plan.bindings,
            vec![("ingest".to_string(), "telemetry.#".to_string())]
        );
    }

    /// Disabling a tap mid-stream leaves already-delivered records intact.
    #[tokio::test]
    async fn test_disable_preserves_delivered_records() {
        let collect = Arc::new(CollectSink::default());

        let (client, handle) = MockQueueClient::new();
        let tap = AmqpTap::with_client(amqp_config("events"), &"host-a".into(), client).unwrap();
        tap.attach_sink(collect.clone());
        tap.enable().await.unwrap();

        handle.deliver(MockDelivery::body("kept"));
        assert!(wait_for(|| collect.len() == 1, Duration::from_secs(2)).await);

        tap.disable().await.unwrap();
        handle.deliver(MockDelivery::body("late"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let records: Vec<Record> = collect.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, Bytes::from("kept"));
    }
}
