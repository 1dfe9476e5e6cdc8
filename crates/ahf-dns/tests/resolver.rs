//! Resolver socket behaviour against in-process mock servers.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

use ahf_dns::buffer::Writer;
use ahf_dns::{
    DnsError, Flags, Message, RData, RecordType, ResolverConfig, ResolverSocket, ResourceRecord,
    TsigSigner, UpdateBuilder, OPCODE_UPDATE,
};

fn encode(msg: &Message) -> Vec<u8> {
    // Larger than any transport limit so oversize fixtures can be sized.
    let mut buf = vec![0u8; 131072];
    let mut w = Writer::new(&mut buf);
    msg.write(&mut w).unwrap();
    w.buffer().to_vec()
}

fn answer_a(query: &Message) -> Message {
    let mut response = Message {
        id: query.id,
        flags: Flags { qr: true, rd: query.flags.rd, ra: true, ..Flags::default() },
        question: query.question.clone(),
        ..Message::default()
    };
    if let Some(q) = query.question.first() {
        response
            .answer
            .push(ResourceRecord::a(&q.name, Ipv4Addr::new(10, 0, 0, 99), 60));
    }
    response
}

/// UDP mock bound to an ephemeral port. `reply` maps a request to an
/// optional response; `None` swallows the datagram.
async fn spawn_udp_mock(
    reply: impl Fn(&Message) -> Option<Message> + Send + 'static,
) -> (u16, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else { return };
            counter.fetch_add(1, Ordering::SeqCst);
            let Ok(query) = Message::read(&buf[..len]) else { continue };
            if let Some(response) = reply(&query) {
                let _ = socket.send_to(&encode(&response), src).await;
            }
        }
    });
    (port, seen)
}

/// TCP mock serving framed queries on an explicit port (0 = ephemeral).
/// Reports the instant each connection hits EOF.
async fn spawn_tcp_mock(
    port: u16,
    reply: impl Fn(&Message) -> Option<Message> + Clone + Send + Sync + 'static,
) -> (u16, mpsc::UnboundedReceiver<Instant>) {
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (eof_tx, eof_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            let reply = reply.clone();
            let eof_tx = eof_tx.clone();
            tokio::spawn(async move {
                loop {
                    let mut len_buf = [0u8; 2];
                    match stream.read_exact(&mut len_buf).await {
                        Ok(_) => {}
                        Err(_) => {
                            let _ = eof_tx.send(Instant::now());
                            return;
                        }
                    }
                    let len = u16::from_be_bytes(len_buf) as usize;
                    let mut body = vec![0u8; len];
                    if stream.read_exact(&mut body).await.is_err() {
                        let _ = eof_tx.send(Instant::now());
                        return;
                    }
                    let Ok(query) = Message::read(&body) else { continue };
                    if let Some(response) = reply(&query) {
                        let wire = encode(&response);
                        let mut frame = (wire.len() as u16).to_be_bytes().to_vec();
                        frame.extend_from_slice(&wire);
                        if stream.write_all(&frame).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    (port, eof_rx)
}

fn resolver(port: u16, timeout_ms: u64, keep_open_ms: u64) -> ResolverSocket {
    let config = ResolverConfig {
        address: "127.0.0.1".to_string(),
        port,
        keep_open_ms,
        timeout_ms,
    };
    ResolverSocket::new(config).unwrap()
}

/// A query padded with TXT additional data until its encoding crosses
/// `target` bytes.
fn padded_query(id: u16, target: usize) -> Message {
    let mut msg = Message::query(id, "bulk.arrowhead.org.", RecordType::TXT);
    while encode(&msg).len() <= target {
        msg.additional.push(ResourceRecord::txt(
            "bulk.arrowhead.org.",
            vec!["x".repeat(200)],
            60,
        ));
    }
    msg
}

/// A query padded with one TXT additional until its encoding is exactly
/// `total` bytes.
fn padded_query_exact(id: u16, total: usize) -> Message {
    let mut msg = Message::query(id, "bulk.arrowhead.org.", RecordType::TXT);
    // Fixed cost of the padding record: name "p." (3) + type, class, TTL,
    // RDLENGTH (10).
    let mut remaining = total - encode(&msg).len() - 13;
    let mut strings = Vec::new();
    while remaining > 0 {
        let take = remaining.saturating_sub(1).min(255);
        strings.push("x".repeat(take));
        remaining -= take + 1;
    }
    msg.additional.push(ResourceRecord::txt("p.", strings, 60));
    assert_eq!(encode(&msg).len(), total);
    msg
}

#[tokio::test]
async fn test_payload_boundary_selects_transport() {
    let (udp_port, udp_seen) = spawn_udp_mock(|q| Some(answer_a(q))).await;
    let (_, _eof) = spawn_tcp_mock(udp_port, |q| Some(answer_a(q))).await;
    let socket = resolver(udp_port, 2000, 3000);

    // Exactly 512 bytes still travels over UDP.
    socket.send(padded_query_exact(31, 512)).await.unwrap();
    assert_eq!(udp_seen.load(Ordering::SeqCst), 1);

    // One byte more falls over to TCP.
    socket.send(padded_query_exact(32, 513)).await.unwrap();
    assert_eq!(udp_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_udp_round_trip() {
    let (port, _) = spawn_udp_mock(|q| Some(answer_a(q))).await;
    let socket = resolver(port, 2000, 3000);

    let response = socket
        .send(Message::query(4711, "one.arrowhead.org.", RecordType::A))
        .await
        .unwrap();

    assert_eq!(response.id, 4711);
    assert!(response.flags.qr);
    assert_eq!(
        response.answer[0].rdata,
        Some(RData::A(Ipv4Addr::new(10, 0, 0, 99)))
    );
}

#[tokio::test]
async fn test_silent_server_retries_then_unanswered() {
    let (port, seen) = spawn_udp_mock(|_| None).await;
    let socket = resolver(port, 100, 3000);

    let started = Instant::now();
    let err = socket
        .send(Message::query(7, "two.arrowhead.org.", RecordType::A))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err, DnsError::RequestUnanswered);
    // Initial attempt plus two retries, each on a ~100ms timeout.
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_millis(280), "settled too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2000), "settled too late: {:?}", elapsed);
}

#[tokio::test]
async fn test_truncated_response_falls_back_to_tcp() {
    let (udp_port, udp_seen) = spawn_udp_mock(|q| {
        let mut truncated = answer_a(q);
        truncated.answer.clear();
        truncated.flags.tc = true;
        Some(truncated)
    })
    .await;
    let (_, _eof) = spawn_tcp_mock(udp_port, |q| Some(answer_a(q))).await;

    let socket = resolver(udp_port, 2000, 3000);
    let response = socket
        .send(Message::query(9, "three.arrowhead.org.", RecordType::A))
        .await
        .unwrap();

    assert_eq!(udp_seen.load(Ordering::SeqCst), 1);
    assert_eq!(response.answer.len(), 1);
    assert!(!response.flags.tc);
}

#[tokio::test]
async fn test_oversize_request_rides_tcp() {
    let (udp_port, udp_seen) = spawn_udp_mock(|q| Some(answer_a(q))).await;
    let (_, _eof) = spawn_tcp_mock(udp_port, |q| Some(answer_a(q))).await;

    let socket = resolver(udp_port, 2000, 3000);
    let msg = padded_query(11, 600);
    assert!(encode(&msg).len() > 600);

    let response = socket.send(msg).await.unwrap();
    assert_eq!(response.id, 11);
    // Never touched UDP.
    assert_eq!(udp_seen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_request_exceeding_tcp_limit_fails_fast() {
    let socket = resolver(1, 2000, 3000); // no server needed
    let msg = padded_query(12, 66000);
    let err = socket.send(msg).await.unwrap_err();
    assert!(matches!(err, DnsError::RequestTooLong(_)));
}

#[tokio::test]
async fn test_duplicate_id_rejected_while_in_flight() {
    let (port, _) = spawn_udp_mock(|_| None).await;
    let socket = resolver(port, 500, 3000);

    let first = {
        let socket = socket.clone();
        tokio::spawn(async move {
            socket
                .send(Message::query(77, "four.arrowhead.org.", RecordType::A))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = socket
        .send(Message::query(77, "four.arrowhead.org.", RecordType::A))
        .await
        .unwrap_err();
    assert_eq!(err, DnsError::RequestIdInUse(77));

    let _ = first.await.unwrap();
}

#[tokio::test]
async fn test_stray_response_reported_to_hook() {
    let (port, _) = spawn_udp_mock(|q| {
        let mut response = answer_a(q);
        response.id = q.id.wrapping_add(1);
        Some(response)
    })
    .await;

    let (hook_tx, mut hook_rx) = mpsc::unbounded_channel();
    let config = ResolverConfig { address: "127.0.0.1".into(), port, keep_open_ms: 3000, timeout_ms: 100 };
    let socket = ResolverSocket::with_ignored_error_hook(
        config,
        Arc::new(move |err| {
            let _ = hook_tx.send(err);
        }),
    )
    .unwrap();

    let err = socket
        .send(Message::query(500, "five.arrowhead.org.", RecordType::A))
        .await
        .unwrap_err();
    assert_eq!(err, DnsError::RequestUnanswered);

    let reported = hook_rx.recv().await.unwrap();
    assert_eq!(reported, DnsError::ResponseIdUnexpected(501));
}

#[tokio::test]
async fn test_signed_update_travels_tcp_with_tsig() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let (tcp_port, _eof) = spawn_tcp_mock(0, move |q| {
        let _ = seen_tx.send(q.clone());
        Some(Message {
            id: q.id,
            flags: Flags { qr: true, opcode: q.flags.opcode, ..Flags::default() },
            question: q.question.clone(),
            ..Message::default()
        })
    })
    .await;

    let signer = TsigSigner::new("key.arrowhead.org.", "VQEOSuLEGcsnJqjOJKnjbA==").unwrap();
    let update = UpdateBuilder::new()
        .with_id(321)
        .zone("arrowhead.org.")
        .add(ResourceRecord::ptr(
            "_pulse._udp.arrowhead.org.",
            "heart.arrowhead.org.",
            120,
        ))
        .sign(signer.clone())
        .build()
        .unwrap();

    let socket = resolver(tcp_port, 2000, 3000);
    let response = socket.send(update).await.unwrap();
    assert_eq!(response.flags.rcode, 0);

    let received = seen_rx.recv().await.unwrap();
    assert_eq!(received.flags.opcode, OPCODE_UPDATE);
    assert_eq!(received.additional.len(), 1);
    let tsig = &received.additional[0];
    assert_eq!(tsig.rtype, RecordType::TSIG);
    assert_eq!(tsig.name, "key.arrowhead.org.");
}

#[tokio::test]
async fn test_idle_transport_closes_after_keep_open() {
    let (tcp_port, mut eof_rx) = spawn_tcp_mock(0, |q| Some(answer_a(q))).await;

    // Oversize query forces TCP; short keep-open, coarse timeout tick.
    let socket = resolver(tcp_port, 1000, 200);
    let responded_at = Instant::now();
    socket.send(padded_query(13, 600)).await.unwrap();

    let eof_at = tokio::time::timeout(Duration::from_secs(3), eof_rx.recv())
        .await
        .expect("transport never closed")
        .unwrap();
    let held_open = eof_at.duration_since(responded_at);
    assert!(held_open >= Duration::from_millis(180), "closed too early: {:?}", held_open);
    assert!(held_open < Duration::from_millis(1500), "closed too late: {:?}", held_open);
}

#[tokio::test]
async fn test_close_settles_and_next_send_reopens() {
    let (port, _) = spawn_udp_mock(|q| Some(answer_a(q))).await;
    let socket = resolver(port, 2000, 3000);

    socket
        .send(Message::query(21, "six.arrowhead.org.", RecordType::A))
        .await
        .unwrap();
    socket.close().await;

    // A closed resolver accepts new work and reopens its transport.
    let response = socket
        .send(Message::query(22, "six.arrowhead.org.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(response.id, 22);
}
