use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ductworks::frame::{
    BytesCodec, DuctLock, FileLock, FrameError, FramePhase, JsonCodec, MessageClient,
    MessageServer, ThreadLock, MAGIC,
};
use ductworks::pair::{duct_pair, duct_pair_with, tcp_duct_pair, PairConfig};
use ductworks::transport::{DuctState, RawDuct};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tagged {
    writer: usize,
    seq: usize,
    body: String,
}

#[test]
fn anonymous_unix_scenario_cleans_up_socket_path() {
    let mut server =
        MessageServer::<Value>::pseudo_anonymous().expect("anonymous path should be generated");
    server.bind().expect("server should bind");
    let bind_path = server.bind_address().clone();
    assert_eq!(server.listener_address(), Some(&bind_path));
    assert!(bind_path.exists(), "listener socket should exist while awaiting a peer");

    let mut client = MessageClient::<Value>::unix(&bind_path);
    client.connect().expect("client should connect");
    assert!(server.listen(LISTEN_TIMEOUT).expect("listen should succeed"));

    server
        .send(&json!(["hello world", 42]))
        .expect("server should send");
    assert_eq!(
        client.recv().expect("client should receive"),
        json!(["hello world", 42])
    );

    client.close().expect("client should close");
    server.close().expect("server should close");
    assert!(!bind_path.exists(), "socket path should be gone after close");
}

#[test]
fn tcp_pair_round_trip() {
    let (server, client) =
        tcp_duct_pair::<Value, _>("127.0.0.1", JsonCodec, PairConfig::default())
            .expect("tcp pair should connect");

    client
        .send(&json!({"op": "ping", "n": 1}))
        .expect("client should send");
    assert_eq!(
        server.recv().expect("server should receive"),
        json!({"op": "ping", "n": 1})
    );
    server.send(&json!("pong")).expect("server should send");
    assert_eq!(client.recv().expect("client should receive"), json!("pong"));
}

#[test]
fn large_message_survives_partial_io() {
    let (server, client) = duct_pair::<Vec<String>>().expect("pair should connect");
    let big = vec!["lol".to_string(); 1024 * 128];

    let received = thread::scope(|scope| {
        let sender = scope.spawn(|| server.send(&big));
        let received = client.recv().expect("client should receive big message");
        sender
            .join()
            .expect("sender thread should not panic")
            .expect("server should send big message");
        received
    });

    assert_eq!(received.len(), big.len());
    assert_eq!(received, big);
}

#[test]
fn sequential_sends_arrive_in_order() {
    let (server, client) = duct_pair::<u64>().expect("pair should connect");

    thread::scope(|scope| {
        scope.spawn(|| {
            for n in 0..500u64 {
                server.send(&n).expect("send should succeed");
            }
        });
        for n in 0..500u64 {
            assert_eq!(client.recv().expect("recv should succeed"), n);
        }
    });
}

#[test]
fn empty_and_unicode_payloads_round_trip() {
    let (server, client) = duct_pair::<Value>().expect("pair should connect");

    let payloads = [
        json!(""),
        json!([]),
        json!({}),
        json!("\u{0FF0}lol"),
        json!(["h\u{e9}llo w\u{f6}rld", "\u{1F980}", "\u{65E5}\u{672C}\u{8A9E}"]),
    ];
    for payload in &payloads {
        server.send(payload).expect("send should succeed");
    }
    for payload in &payloads {
        assert_eq!(&client.recv().expect("recv should succeed"), payload);
    }
}

#[test]
fn zero_length_payload_crosses_the_socket() {
    let (server, client) = duct_pair_with::<Vec<u8>, _>("", BytesCodec, PairConfig::default())
        .expect("pair should connect");

    client.send(&Vec::new()).expect("empty send should succeed");
    client.send(&vec![7u8]).expect("send should succeed");
    client.send(&Vec::new()).expect("empty send should succeed");

    assert!(server.recv().expect("empty frame").is_empty());
    assert_eq!(server.recv().expect("one-byte frame"), vec![7u8]);
    assert!(server.recv().expect("empty frame").is_empty());

    // Only the five header bytes of each empty frame went over the wire.
    server.send(&Vec::new()).expect("empty send should succeed");
    let mut header = [0u8; 8];
    let read = client
        .get_ref()
        .recv_into(&mut header)
        .expect("raw recv should succeed");
    assert_eq!(&header[..read], &[MAGIC, 0, 0, 0, 0]);
}

fn concurrent_writers_stay_intact(lock: Arc<dyn DuctLock>) {
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 25;

    let config = PairConfig {
        client_lock: Some(lock),
        ..PairConfig::default()
    };
    let (server, client) =
        duct_pair_with::<Tagged, _>("", JsonCodec, config).expect("pair should connect");

    // Bodies larger than a socket buffer force each frame through several writes.
    let body = "x".repeat(256 * 1024);

    let mut last_seq: HashMap<usize, usize> = HashMap::new();
    thread::scope(|scope| {
        for writer in 0..WRITERS {
            let client = &client;
            let body = body.clone();
            scope.spawn(move || {
                for seq in 0..PER_WRITER {
                    let msg = Tagged {
                        writer,
                        seq,
                        body: body.clone(),
                    };
                    client.send(&msg).expect("locked send should succeed");
                }
            });
        }

        for _ in 0..WRITERS * PER_WRITER {
            let msg = server.recv().expect("every frame should decode");
            assert_eq!(msg.body.len(), body.len());
            let expected = last_seq.get(&msg.writer).map_or(0, |seq| seq + 1);
            assert_eq!(msg.seq, expected, "writer {} out of order", msg.writer);
            last_seq.insert(msg.writer, msg.seq);
        }
    });

    assert_eq!(last_seq.len(), WRITERS);
    assert!(last_seq.values().all(|&seq| seq == PER_WRITER - 1));
    assert!(!server
        .poll(Duration::from_millis(50))
        .expect("poll should succeed"));
}

#[test]
fn thread_lock_serializes_concurrent_writers() {
    concurrent_writers_stay_intact(Arc::new(ThreadLock::new()));
}

#[test]
fn file_lock_serializes_concurrent_writers() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let lock = FileLock::open(dir.path().join("writers.lock")).expect("lock file should open");
    concurrent_writers_stay_intact(Arc::new(lock));
}

#[test]
fn locked_concurrent_readers_each_get_whole_frames() {
    let config = PairConfig {
        server_lock: Some(Arc::new(ThreadLock::new())),
        ..PairConfig::default()
    };
    let (server, client) =
        duct_pair_with::<Tagged, _>("", JsonCodec, config).expect("pair should connect");

    let total = 60;
    let received = thread::scope(|scope| {
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let server = &server;
                scope.spawn(move || {
                    (0..total / 3)
                        .map(|_| server.recv().expect("locked recv should succeed"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for seq in 0..total {
            client
                .send(&Tagged {
                    writer: 0,
                    seq,
                    body: "y".repeat(1000 + seq),
                })
                .expect("send should succeed");
        }

        readers
            .into_iter()
            .flat_map(|reader| reader.join().expect("reader should not panic"))
            .collect::<Vec<_>>()
    });

    let mut seqs: Vec<_> = received
        .iter()
        .inspect(|msg| assert_eq!(msg.body.len(), 1000 + msg.seq))
        .map(|msg| msg.seq)
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..total).collect::<Vec<_>>());
}

#[test]
fn bad_magic_is_protocol_violation() {
    let (server, client) = duct_pair::<Value>().expect("pair should connect");

    let garbage = [0x00, 0x00, 0x00, 0x00, 0x02, b'{', b'}'];
    let written = client.get_ref().send(&garbage).expect("raw send should succeed");
    assert_eq!(written, garbage.len());

    let err = server.recv().unwrap_err();
    assert!(err.is_protocol_violation(), "{err}");
    assert!(matches!(
        err,
        FrameError::ProtocolViolation {
            expected: MAGIC,
            actual: 0x00
        }
    ));
}

#[test]
fn sender_closing_mid_frame_is_remote_closed() {
    let (server, mut client) = duct_pair::<Value>().expect("pair should connect");

    // Header announces 100 bytes; only 10 follow.
    let mut partial = vec![MAGIC, 0x00, 0x00, 0x00, 100];
    partial.extend_from_slice(&[b' '; 10]);
    client
        .get_ref()
        .send(&partial)
        .expect("raw send should succeed");
    client.close().expect("client should close");

    let err = server.recv().unwrap_err();
    assert!(err.is_mid_frame_close(), "{err}");
    assert!(matches!(
        err,
        FrameError::RemoteClosed {
            phase: FramePhase::Payload
        }
    ));
}

#[test]
fn sender_closing_between_frames_is_orderly() {
    let (server, mut client) = duct_pair::<Value>().expect("pair should connect");
    client.send(&json!(1)).expect("send should succeed");
    client.close().expect("client should close");

    assert_eq!(server.recv().expect("queued frame survives close"), json!(1));
    let err = server.recv().unwrap_err();
    assert!(err.is_remote_closed());
    assert!(!err.is_mid_frame_close());
}

#[test]
fn listen_without_peer_times_out_without_error() {
    let mut server = MessageServer::<Value>::pseudo_anonymous().expect("server should build");
    let timeout = Duration::from_millis(200);

    let started = Instant::now();
    let connected = server.listen(timeout).expect("timeout is not an error");
    let elapsed = started.elapsed();

    assert!(!connected);
    assert!(elapsed >= timeout, "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "returned after {elapsed:?}");
    assert_eq!(server.state(), DuctState::AwaitingPeer);

    let mut client = MessageClient::<Value>::unix(server.bind_address());
    client.connect().expect("late client should connect");
    assert!(server.listen(LISTEN_TIMEOUT).expect("retry should accept"));
}

#[test]
fn shutdown_wakes_blocked_receiver() {
    let (server, _client) = duct_pair::<Value>().expect("pair should connect");

    let err = thread::scope(|scope| {
        let receiver = scope.spawn(|| server.recv());
        thread::sleep(Duration::from_millis(50));
        server.shutdown().expect("shutdown should succeed");
        receiver.join().expect("receiver should not panic").unwrap_err()
    });
    assert!(err.is_remote_closed(), "{err}");
}

#[test]
fn closed_duct_is_terminal() {
    let (mut server, mut client) = duct_pair::<Value>().expect("pair should connect");
    client.close().expect("client should close");
    server.close().expect("server should close");

    assert!(client.connect().unwrap_err().is_invalid_state());
    assert!(client.send(&json!(null)).unwrap_err().is_invalid_state());
    assert!(server.listen(LISTEN_TIMEOUT).unwrap_err().is_invalid_state());
    assert!(server.recv().unwrap_err().is_invalid_state());
}
