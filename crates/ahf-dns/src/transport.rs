//! Transport endpoints for the resolver socket.
//!
//! Each open transport runs as one spawned task that owns its socket. It
//! takes encoded frames from an unbounded channel and reports everything
//! else — opening, responses, idle timeouts, faults, closure — as typed
//! events tagged with the transport kind and an epoch. Dropping the frame
//! sender is the close signal.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{DnsError, WireError};
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportKind {
    Udp,
    Tcp,
}

#[derive(Debug)]
pub(crate) enum TransportEvent {
    Opened,
    Response(Message),
    /// The TCP socket idled out with the connection still up.
    Timeout,
    Error(DnsError),
    Closed { graceful: bool },
}

pub(crate) type EventTx = mpsc::UnboundedSender<(TransportKind, u64, TransportEvent)>;

/// Event sender bound to one transport incarnation.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: EventTx,
    kind: TransportKind,
    epoch: u64,
}

impl EventSink {
    pub(crate) fn new(tx: EventTx, kind: TransportKind, epoch: u64) -> Self {
        Self { tx, kind, epoch }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send((self.kind, self.epoch, event));
    }
}

/// The worker's side of an open transport.
#[derive(Debug)]
pub(crate) struct TransportHandle {
    pub(crate) frames: mpsc::UnboundedSender<Vec<u8>>,
}

/// Two-state parser for the RFC 1035 §4.2.2 TCP stream framing: a u16
/// big-endian length, then that many message bytes. Trailing bytes of a
/// chunk re-enter the parser synchronously.
pub(crate) struct FrameParser {
    expected: Option<usize>,
    acc: Vec<u8>,
}

impl FrameParser {
    pub(crate) fn new() -> Self {
        Self { expected: None, acc: Vec::new() }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<Message>, WireError> {
        self.acc.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            match self.expected {
                None => {
                    if self.acc.len() < 2 {
                        break;
                    }
                    self.expected = Some(u16::from_be_bytes([self.acc[0], self.acc[1]]) as usize);
                    self.acc.drain(..2);
                }
                Some(n) => {
                    if self.acc.len() < n {
                        break;
                    }
                    let body: Vec<u8> = self.acc.drain(..n).collect();
                    out.push(Message::read(&body)?);
                    self.expected = None;
                }
            }
        }
        Ok(out)
    }
}

pub(crate) async fn run_udp(
    server: SocketAddr,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    sink: EventSink,
) {
    let bind: SocketAddr = if server.is_ipv4() {
        "0.0.0.0:0".parse().unwrap()
    } else {
        "[::]:0".parse().unwrap()
    };
    let socket = match UdpSocket::bind(bind).await {
        Ok(socket) => socket,
        Err(e) => {
            sink.emit(TransportEvent::Error(DnsError::from_io(&e)));
            sink.emit(TransportEvent::Closed { graceful: false });
            return;
        }
    };
    sink.emit(TransportEvent::Opened);

    let mut buf = vec![0u8; 65535];
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = socket.send_to(&frame, server).await {
                        sink.emit(TransportEvent::Error(DnsError::from_io(&e)));
                        sink.emit(TransportEvent::Closed { graceful: false });
                        return;
                    }
                }
                None => {
                    sink.emit(TransportEvent::Closed { graceful: true });
                    return;
                }
            },
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    // Only the queried server may answer (RFC 5452).
                    if src.ip() != server.ip() {
                        debug!("Dropping datagram from unexpected source {}", src);
                        continue;
                    }
                    match Message::read(&buf[..len]) {
                        Ok(msg) => sink.emit(TransportEvent::Response(msg)),
                        Err(e) => {
                            sink.emit(TransportEvent::Error(DnsError::ResponseMalformed(e)));
                            sink.emit(TransportEvent::Closed { graceful: false });
                            return;
                        }
                    }
                }
                Err(e) => {
                    sink.emit(TransportEvent::Error(DnsError::from_io(&e)));
                    sink.emit(TransportEvent::Closed { graceful: false });
                    return;
                }
            },
        }
    }
}

pub(crate) async fn run_tcp(
    server: SocketAddr,
    idle: Duration,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    sink: EventSink,
) {
    let mut stream = match timeout(idle, TcpStream::connect(server)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            sink.emit(TransportEvent::Error(DnsError::from_io(&e)));
            sink.emit(TransportEvent::Closed { graceful: false });
            return;
        }
        Err(_) => {
            sink.emit(TransportEvent::Timeout);
            sink.emit(TransportEvent::Closed { graceful: false });
            return;
        }
    };
    sink.emit(TransportEvent::Opened);

    let mut parser = FrameParser::new();
    let mut buf = [0u8; 4096];
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = stream.write_all(&frame).await {
                        sink.emit(TransportEvent::Error(DnsError::from_io(&e)));
                        sink.emit(TransportEvent::Closed { graceful: false });
                        return;
                    }
                }
                None => {
                    let _ = stream.shutdown().await;
                    sink.emit(TransportEvent::Closed { graceful: true });
                    return;
                }
            },
            read = timeout(idle, stream.read(&mut buf)) => match read {
                Err(_) => {
                    sink.emit(TransportEvent::Timeout);
                    sink.emit(TransportEvent::Closed { graceful: false });
                    return;
                }
                Ok(Ok(0)) => {
                    // Server ended its keep-alive.
                    sink.emit(TransportEvent::Closed { graceful: true });
                    return;
                }
                Ok(Ok(n)) => match parser.push(&buf[..n]) {
                    Ok(messages) => {
                        for msg in messages {
                            sink.emit(TransportEvent::Response(msg));
                        }
                    }
                    Err(e) => {
                        sink.emit(TransportEvent::Error(DnsError::ResponseMalformed(e)));
                        sink.emit(TransportEvent::Closed { graceful: false });
                        return;
                    }
                },
                Ok(Err(e)) => {
                    sink.emit(TransportEvent::Error(DnsError::from_io(&e)));
                    sink.emit(TransportEvent::Closed { graceful: false });
                    return;
                }
            },
        }
    }
}
