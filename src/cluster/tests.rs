//! Cluster Module Tests
//!
//! Drives [`ClusterEngine`] through a recording sink with explicit timestamps,
//! so reliable delivery and discovery are exercised without a socket.
//!
//! ## Test Scopes
//! - **Delivery**: unicast completion, resend, timeout, multicast ack counting.
//! - **Receiving**: dedup with repeated acks, deferred dispatch, inbound expiry,
//!   out-of-range timeouts.
//! - **Membership**: readiness, identify expiry, leave notices.
//! - **Options**: defaults, environment overlay, JSON loading, validation.

#[cfg(test)]
mod tests {
    use crate::cluster::engine::ClusterEngine;
    use crate::cluster::options::ClusterOptions;
    use crate::membership::types::{ClusterEvent, ClusterNode, ClusterState, NodeId};
    use crate::messaging::handlers::Dispatch;
    use crate::messaging::types::{CompletionFn, DeliveryReport};
    use crate::transport::socket::DatagramSink;
    use crate::transport::receiver::{Rejection, accept};
    use crate::wire::codec::{self, Datagram, Header, WireError};
    use crate::wire::types::{AckPayload, InstanceId, MessageId};
    use parking_lot::Mutex;
    use std::io;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    const LOCAL: NodeId = NodeId(0x11);
    const PEER_A: NodeId = NodeId(0xA1);
    const PEER_B: NodeId = NodeId(0xB2);
    const SECRET: u64 = 1234;
    const TEST: MessageId = MessageId::from_code(b"TEST");

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl DatagramSink for RecordingSink {
        fn send_datagram(&self, datagram: &[u8]) -> io::Result<usize> {
            self.sent.lock().push(datagram.to_vec());
            Ok(datagram.len())
        }
    }

    impl RecordingSink {
        fn datagrams(&self) -> Vec<Datagram> {
            let source: SocketAddr = "10.0.0.1:58085".parse().unwrap();
            self.sent
                .lock()
                .iter()
                .map(|bytes| codec::decode(bytes, &source).unwrap())
                .collect()
        }

        fn acks(&self) -> Vec<(NodeId, AckPayload)> {
            self.datagrams()
                .into_iter()
                .filter(|d| d.header.message_id == MessageId::ACK)
                .map(|d| (d.header.recipient, AckPayload::decode(&d.payload).unwrap()))
                .collect()
        }

        fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    fn addr_of(node: NodeId) -> IpAddr {
        format!("10.0.0.{}", node.0 & 0xFF).parse().unwrap()
    }

    fn engine_with(options: ClusterOptions) -> (Arc<ClusterEngine>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(ClusterEngine::new(
            options,
            LOCAL,
            "10.0.0.1".parse().unwrap(),
            sink.clone(),
        ));
        (engine, sink)
    }

    fn engine(expected_nodes: usize) -> (Arc<ClusterEngine>, Arc<RecordingSink>) {
        engine_with(ClusterOptions::new(SECRET, expected_nodes))
    }

    fn from_peer(peer: NodeId, counter: u32, message_id: MessageId, payload: &[u8]) -> Datagram {
        Datagram {
            header: Header {
                recipient: NodeId::BROADCAST,
                message_id,
                instance_id: InstanceId::new(peer, counter),
                secret: SECRET,
                timeout_secs: 0.1,
                sender: addr_of(peer),
            },
            payload: payload.to_vec(),
        }
    }

    fn ack_from(peer: NodeId, counter: u32, acked: InstanceId) -> Datagram {
        let mut datagram = from_peer(
            peer,
            counter,
            MessageId::ACK,
            &AckPayload {
                instance_id: acked,
                avg_dispatch_delay: 0.25,
            }
            .encode(),
        );
        datagram.header.recipient = LOCAL;
        datagram.header.timeout_secs = 0.0;
        datagram
    }

    /// Completion that stores every report it is given.
    fn capture() -> (Arc<Mutex<Vec<DeliveryReport>>>, CompletionFn) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        (
            reports,
            Box::new(move |report: &DeliveryReport| sink.lock().push(report.clone())),
        )
    }

    fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<ClusterEvent>) -> Vec<ClusterEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // ============================================================
    // DELIVERY TESTS
    // ============================================================

    #[test]
    fn test_engine_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClusterEngine>();
        assert_send_sync::<std::sync::Weak<ClusterEngine>>();
        assert_send_sync::<CompletionFn>();
    }

    #[test]
    fn test_send_encodes_header() {
        let (engine, sink) = engine(1);
        let peer = ClusterNode::new(addr_of(PEER_A), PEER_A);

        let instance = engine
            .send_message(&peer, TEST, b"hello", Some(Duration::from_millis(500)), None)
            .unwrap();

        assert_eq!(instance.sender(), LOCAL);
        let sent = sink.datagrams();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.recipient, PEER_A);
        assert_eq!(sent[0].header.message_id, TEST);
        assert_eq!(sent[0].header.instance_id, instance);
        assert_eq!(sent[0].header.secret, SECRET);
        assert_eq!(sent[0].header.timeout_secs, 0.5);
        assert_eq!(sent[0].payload, b"hello");
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let (engine, _sink) = engine(1);
        let peer = ClusterNode::new(addr_of(PEER_A), PEER_A);

        let first = engine.send_message(&peer, TEST, &[], None, None).unwrap();
        let second = engine.send_message(&peer, TEST, &[], None, None).unwrap();

        assert_ne!(first, second);
        assert_eq!(engine.messages.outbound_count(), 2);
    }

    #[test]
    fn test_unicast_completes_on_ack() {
        let (engine, _sink) = engine(1);
        let peer = ClusterNode::new(addr_of(PEER_A), PEER_A);
        let (reports, completion) = capture();

        let instance = engine
            .send_message(&peer, TEST, b"x", None, Some(completion))
            .unwrap();
        engine.handle_datagram(ack_from(PEER_A, 1, instance), Instant::now());

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].timed_out);
        assert_eq!(reports[0].instance_id, instance);
        assert_eq!(reports[0].acked_by.len(), 1);
        assert_eq!(engine.messages.outbound_count(), 0);

        let peer_stats = engine.stats.peer(&addr_of(PEER_A));
        assert_eq!(peer_stats.samples, 1);
        assert_eq!(peer_stats.avg_dispatch_delay, 0.25);
        assert_eq!(engine.stats.message(&TEST).samples, 1);
    }

    #[test]
    fn test_resend_after_retry_interval() {
        let (engine, sink) = engine(1);
        let peer = ClusterNode::new(addr_of(PEER_A), PEER_A);
        let start = Instant::now();

        engine.send_message(&peer, TEST, b"again", None, None).unwrap();
        assert_eq!(sink.count(), 1);

        // Retry is 0.1s, timeout 0.2s.
        engine.sweep(start + Duration::from_millis(150));

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[test]
    fn test_unreachable_destination_times_out_once() {
        let (engine, _sink) = engine(1);
        let peer = ClusterNode::new(addr_of(PEER_A), PEER_A);
        let (reports, completion) = capture();
        let start = Instant::now();

        let instance = engine
            .send_message(&peer, TEST, &[], None, Some(completion))
            .unwrap();

        engine.sweep(start + Duration::from_secs(1));
        engine.sweep(start + Duration::from_secs(2));
        // A late ack finds nothing to complete.
        engine.handle_datagram(ack_from(PEER_A, 1, instance), start + Duration::from_secs(3));

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].timed_out);
        assert!(reports[0].acked_by.is_empty());
        assert_eq!(engine.messages.outbound_count(), 0);
        assert_eq!(engine.stats.message(&TEST).samples, 0);
    }

    #[test]
    fn test_multicast_counts_distinct_nodes() {
        let (engine, _sink) = engine(3);
        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), Instant::now());
        engine.handle_datagram(from_peer(PEER_B, 1, TEST, &[]), Instant::now());
        let (reports, completion) = capture();

        let multicast = engine.multicast_node;
        let instance = engine
            .send_message(&multicast, TEST, &[], None, Some(completion))
            .unwrap();

        engine.handle_datagram(ack_from(PEER_A, 2, instance), Instant::now());
        engine.handle_datagram(ack_from(PEER_A, 3, instance), Instant::now());

        assert!(reports.lock().is_empty());
        assert_eq!(
            engine
                .messages
                .with_outbound(&instance, |message| message.remaining_acks()),
            Some(1)
        );

        engine.handle_datagram(ack_from(PEER_B, 2, instance), Instant::now());

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].timed_out);
        assert_eq!(reports[0].expected_acks, 2);
        assert_eq!(reports[0].acked_by.len(), 2);
    }

    #[test]
    fn test_multicast_partial_acks_time_out() {
        let (engine, _sink) = engine(3);
        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), Instant::now());
        engine.handle_datagram(from_peer(PEER_B, 1, TEST, &[]), Instant::now());
        let (reports, completion) = capture();
        let start = Instant::now();

        let multicast = engine.multicast_node;
        let instance = engine
            .send_message(&multicast, TEST, &[], None, Some(completion))
            .unwrap();
        engine.handle_datagram(ack_from(PEER_B, 2, instance), Instant::now());

        engine.sweep(start + Duration::from_secs(1));
        engine.sweep(start + Duration::from_secs(2));

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].timed_out);
        assert_eq!(reports[0].expected_acks, 2);
        assert_eq!(reports[0].acked_by.len(), 1);
        assert_eq!(reports[0].acked_by[0].0, PEER_B);
    }

    #[test]
    fn test_timeout_not_reported_before_deadline() {
        let (engine, _sink) = engine(1);
        let peer = ClusterNode::new(addr_of(PEER_A), PEER_A);
        let (reports, completion) = capture();
        let timeout = Duration::from_millis(200);

        let instance = engine
            .send_message(&peer, TEST, &[], Some(timeout), Some(completion))
            .unwrap();
        let started = engine
            .messages
            .with_outbound(&instance, |message| message.started)
            .unwrap();

        engine.sweep(started + Duration::from_millis(150));
        engine.sweep(started + timeout);
        assert!(reports.lock().is_empty());
        assert_eq!(engine.messages.outbound_count(), 1);

        engine.sweep(started + timeout + Duration::from_millis(1));
        assert_eq!(reports.lock().len(), 1);
        assert!(reports.lock()[0].timed_out);
    }

    #[test]
    fn test_multicast_without_peers_only_times_out() {
        let (engine, _sink) = engine(1);
        let (reports, completion) = capture();
        let start = Instant::now();

        let multicast = engine.multicast_node;
        let instance = engine
            .send_message(&multicast, TEST, &[], None, Some(completion))
            .unwrap();
        engine.handle_datagram(ack_from(PEER_A, 1, instance), start);
        assert!(reports.lock().is_empty());

        engine.sweep(start + Duration::from_secs(1));
        assert!(reports.lock()[0].timed_out);
    }

    #[test]
    fn test_send_preconditions() {
        let (engine, _sink) = engine(1);
        let peer = ClusterNode::new(addr_of(PEER_A), PEER_A);

        assert!(engine.send_message(&peer, MessageId(0), &[], None, None).is_err());
        assert!(
            engine
                .send_message(&peer, TEST, &[], Some(Duration::ZERO), None)
                .is_err()
        );

        assert!(
            engine
                .send_message(&peer, TEST, &[], Some(Duration::MAX), None)
                .is_err()
        );

        engine.publish(engine.membership.dispose());
        assert!(engine.send_message(&peer, TEST, &[], None, None).is_err());
        assert_eq!(engine.messages.outbound_count(), 0);
    }

    // ============================================================
    // RECEIVING TESTS
    // ============================================================

    #[test]
    fn test_duplicate_dispatched_once_acked_twice() {
        let (engine, sink) = engine(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        engine.handlers.register(TEST, Dispatch::Immediate, move |message| {
            assert_eq!(message.payload, b"data");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let datagram = from_peer(PEER_A, 7, TEST, b"data");
        engine.handle_datagram(datagram.clone(), Instant::now());
        engine.handle_datagram(datagram, Instant::now());

        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let acks = sink.acks();
        assert_eq!(acks.len(), 2);
        for (recipient, ack) in acks {
            assert_eq!(recipient, PEER_A);
            assert_eq!(ack.instance_id, InstanceId::new(PEER_A, 7));
        }
    }

    #[test]
    fn test_handler_receives_sender_details() {
        let (engine, _sink) = engine(1);
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        engine.handlers.register(TEST, Dispatch::Immediate, move |message| {
            *slot.lock() = Some((message.sender, message.sender_id()));
        });

        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), Instant::now());

        assert_eq!(*seen.lock(), Some((addr_of(PEER_A), PEER_A)));
    }

    #[test]
    fn test_deferred_handler_waits_for_drain() {
        let (engine, sink) = engine(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        engine.handlers.register(TEST, Dispatch::Deferred, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), Instant::now());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Acked before the application ever sees it.
        assert_eq!(sink.acks().len(), 1);
        assert_eq!(engine.deferred.len(), 1);

        assert_eq!(engine.deferred.drain(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(engine.deferred.is_empty());
    }

    #[test]
    fn test_inbound_record_expires_on_sweep() {
        let (engine, _sink) = engine(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        engine.handlers.register(TEST, Dispatch::Immediate, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let start = Instant::now();
        let datagram = from_peer(PEER_A, 1, TEST, &[]);

        engine.handle_datagram(datagram.clone(), start);
        assert_eq!(engine.messages.inbound_count(), 1);

        engine.sweep(start + Duration::from_secs(1));
        assert_eq!(engine.messages.inbound_count(), 0);

        // Once forgotten, the same instance counts as new.
        engine.handle_datagram(datagram, start + Duration::from_secs(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_huge_wire_timeout_never_stops_the_worker() {
        let (engine, sink) = engine(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        engine.handlers.register(TEST, Dispatch::Immediate, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let start = Instant::now();

        // Datagrams like these are refused by the receive filter.
        for (counter, timeout) in [(1, 1e20_f32), (2, 1e19_f32)] {
            let mut datagram = from_peer(PEER_A, counter, TEST, &[]);
            datagram.header.timeout_secs = timeout;
            let bytes = datagram.header.encode(&datagram.payload);
            let source: SocketAddr = "10.0.0.161:58085".parse().unwrap();
            assert!(matches!(
                accept(&bytes, &source, LOCAL, SECRET),
                Err(Rejection::Malformed(WireError::InvalidTimeout(_)))
            ));

            // Handed to the engine anyway, they are processed without panicking.
            engine.handle_datagram(datagram, start);
        }
        engine.sweep(start + Duration::from_secs(1));
        engine.sweep(start + Duration::from_secs(2));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.acks().len(), 2);
    }

    #[test]
    fn test_malformed_ack_is_ignored() {
        let (engine, _sink) = engine(1);
        let mut datagram = from_peer(PEER_A, 1, MessageId::ACK, &[1, 2, 3]);
        datagram.header.recipient = LOCAL;

        engine.handle_datagram(datagram, Instant::now());

        // The sender still counts as seen.
        assert_eq!(engine.membership.node_count(), 1);
        assert_eq!(engine.messages.inbound_count(), 0);
    }

    // ============================================================
    // MEMBERSHIP TESTS
    // ============================================================

    #[test]
    fn test_ready_after_expected_peers() {
        let (engine, _sink) = engine(3);
        let mut events = engine.subscribe();

        engine.handle_datagram(from_peer(PEER_A, 1, MessageId::IDENTIFY, &[]), Instant::now());
        assert_eq!(engine.membership.state(), ClusterState::Discovering);

        engine.handle_datagram(from_peer(PEER_B, 1, TEST, &[]), Instant::now());
        assert_eq!(engine.membership.state(), ClusterState::Ready);
        assert_eq!(engine.membership.node_count(), 2);

        let events = drain_events(&mut events);
        assert_eq!(
            events.last(),
            Some(&ClusterEvent::StateChanged {
                previous: ClusterState::Discovering,
                current: ClusterState::Ready,
            })
        );
        let joins = events
            .iter()
            .filter(|e| matches!(e, ClusterEvent::NodeCountChanged { .. }))
            .count();
        assert_eq!(joins, 2);
    }

    #[test]
    fn test_single_node_ready_on_discovery() {
        let (engine, sink) = engine(1);

        engine.start_discovery().unwrap();

        assert_eq!(engine.membership.state(), ClusterState::Ready);
        let sent = sink.datagrams();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.message_id, MessageId::IDENTIFY);
        assert!(sent[0].header.recipient.is_broadcast());
    }

    #[test]
    fn test_identify_expiry_times_out_discovery() {
        let (engine, _sink) = engine(3);
        let start = Instant::now();

        engine.start_discovery().unwrap();
        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), start);
        engine.sweep(start + Duration::from_secs(25));

        assert_eq!(engine.membership.state(), ClusterState::TimedOut);

        // A late peer no longer makes the cluster ready.
        engine.handle_datagram(from_peer(PEER_B, 1, TEST, &[]), start);
        assert_eq!(engine.membership.state(), ClusterState::TimedOut);
    }

    #[test]
    fn test_identify_expiry_keeps_ready_state() {
        let (engine, _sink) = engine(2);
        let start = Instant::now();

        engine.start_discovery().unwrap();
        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), start);
        assert_eq!(engine.membership.state(), ClusterState::Ready);

        engine.sweep(start + Duration::from_secs(25));
        assert_eq!(engine.membership.state(), ClusterState::Ready);
    }

    #[test]
    fn test_leave_notice_removes_node() {
        let (engine, sink) = engine(3);
        let mut events = engine.subscribe();

        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), Instant::now());
        assert_eq!(engine.membership.node_count(), 1);

        let leave = from_peer(PEER_A, 2, MessageId::SHUTDOWN, &[]);
        engine.handle_datagram(leave.clone(), Instant::now());
        assert_eq!(engine.membership.node_count(), 0);

        // A retransmitted notice neither re-adds nor re-removes the node.
        engine.handle_datagram(leave, Instant::now());
        assert_eq!(engine.membership.node_count(), 0);
        assert_eq!(sink.acks().len(), 3);

        let node = ClusterNode::new(addr_of(PEER_A), PEER_A);
        assert_eq!(
            drain_events(&mut events),
            vec![
                ClusterEvent::NodeCountChanged {
                    node,
                    count: 1,
                    previous: 0,
                },
                ClusterEvent::NodeCountChanged {
                    node,
                    count: 0,
                    previous: 1,
                },
            ]
        );
    }

    #[test]
    fn test_leave_notice_does_not_change_state() {
        let (engine, _sink) = engine(2);

        engine.handle_datagram(from_peer(PEER_A, 1, TEST, &[]), Instant::now());
        engine.handle_datagram(from_peer(PEER_A, 2, MessageId::SHUTDOWN, &[]), Instant::now());

        assert_eq!(engine.membership.state(), ClusterState::Ready);
        assert_eq!(engine.membership.node_count(), 0);
    }

    // ============================================================
    // OPTIONS TESTS
    // ============================================================

    #[test]
    fn test_default_options() {
        let options = ClusterOptions::default();

        assert_eq!(options.secret, 1234);
        assert_eq!(options.expected_nodes, 1);
        assert_eq!(options.port, 58085);
        assert_eq!(options.send_timeout(), Duration::from_secs_f32(0.2));
        assert_eq!(options.ack_retry_interval(), Duration::from_secs_f32(0.1));
        assert_eq!(options.identify_timeout(), Duration::from_secs(20));
        assert_eq!(options.poll_interval(), Duration::from_secs_f32(0.5));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let vars = [
            ("CLUSTER_SECRET", "42"),
            ("CLUSTER_EXPECTED_NODES", " 3 "),
            ("CLUSTER_PORT", "6000"),
            ("CLUSTER_LOCAL_ADDRESS", "192.168.1.5"),
        ];
        let lookup = |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        };

        let options = ClusterOptions::default().apply_vars(lookup).unwrap();

        assert_eq!(options.secret, 42);
        assert_eq!(options.expected_nodes, 3);
        assert_eq!(options.port, 6000);
        assert_eq!(options.local_address, Some("192.168.1.5".parse().unwrap()));
        assert_eq!(options.send_message_timeout_sec, 0.2);
    }

    #[test]
    fn test_env_overlay_rejects_garbage() {
        let result = ClusterOptions::default().apply_vars(|key| {
            (key == "CLUSTER_PORT").then(|| "not-a-port".to_string())
        });

        let err = result.unwrap_err().to_string();
        assert!(err.contains("CLUSTER_PORT"));
    }

    #[test]
    fn test_options_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, r#"{ "secret": 99, "expected_nodes": 4 }"#).unwrap();

        let options = ClusterOptions::from_json_file(&path).unwrap();

        assert_eq!(options.secret, 99);
        assert_eq!(options.expected_nodes, 4);
        assert_eq!(options.port, 58085);
    }

    #[test]
    fn test_json_file_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, r#"{ "send_message_timeout_sec": 0.0 }"#).unwrap();

        assert!(ClusterOptions::from_json_file(&path).is_err());
        assert!(ClusterOptions::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let mut options = ClusterOptions::new(SECRET, 0);
        assert!(options.validate().is_err());

        options.expected_nodes = 2;
        options.multicast_group = "10.0.0.1".parse().unwrap();
        assert!(options.validate().is_err());

        options.multicast_group = "224.0.0.2".parse().unwrap();
        options.message_ack_retry_timeout_sec = f32::NAN;
        assert!(options.validate().is_err());

        options.message_ack_retry_timeout_sec = 0.1;
        options.send_message_timeout_sec = 1e20;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_out_of_range_timeouts_fail_to_load() {
        let options = ClusterOptions::default()
            .apply_vars(|key| (key == "CLUSTER_SEND_TIMEOUT_SEC").then(|| "1e20".to_string()))
            .unwrap();
        assert!(options.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, r#"{ "identify_cluster_timeout_sec": 1e20 }"#).unwrap();
        assert!(ClusterOptions::from_json_file(&path).is_err());
    }
}
