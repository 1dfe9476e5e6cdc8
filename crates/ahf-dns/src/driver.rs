//! Request multiplexing across the UDP and TCP transports.
//!
//! One driver task owns both workers; commands from resolver handles and
//! events from transport tasks are serialised through its loop, so no task
//! state is ever shared across threads. A task lives in exactly one place
//! at a time: a worker's outbound queue, its inbound-by-ID map, or the
//! caller's settled future.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::buffer::Writer;
use crate::error::DnsError;
use crate::message::{Message, OPCODE_UPDATE};
use crate::socket::IgnoredErrorHook;
use crate::transport::{
    self, EventSink, EventTx, TransportEvent, TransportHandle, TransportKind,
};

pub(crate) const UDP_PAYLOAD_LIMIT: usize = 512;
pub(crate) const TCP_PAYLOAD_LIMIT: usize = 65535;
const UDP_RETRIES: u8 = 2;

pub(crate) enum Command {
    Send {
        msg: Message,
        reply: oneshot::Sender<Result<Message, DnsError>>,
    },
    Close,
}

/// One `send` invocation's in-flight state.
struct Task {
    request: Message,
    reply: oneshot::Sender<Result<Message, DnsError>>,
    retries_left: u8,
    time_sent: Option<Instant>,
}

impl Task {
    fn reject(self, err: DnsError) {
        let _ = self.reply.send(Err(err));
    }
}

enum Link {
    Closed,
    Opening(TransportHandle),
    Open(TransportHandle),
}

/// Transport-owning state machine; one per transport kind.
struct Worker {
    kind: TransportKind,
    server: SocketAddr,
    timeout: Duration,
    keep_open: Duration,
    outbound: VecDeque<Task>,
    inbound: HashMap<u16, Task>,
    link: Link,
    /// Incarnation counter; events from a previous transport task carry a
    /// stale epoch and are dropped.
    epoch: u64,
    idle_since: Option<Instant>,
    scratch: Vec<u8>,
}

impl Worker {
    fn new(kind: TransportKind, server: SocketAddr, timeout: Duration, keep_open: Duration) -> Self {
        let scratch = match kind {
            // Room for a full message, TCP additionally for the length prefix.
            TransportKind::Udp => vec![0u8; UDP_PAYLOAD_LIMIT],
            TransportKind::Tcp => vec![0u8; TCP_PAYLOAD_LIMIT + 2],
        };
        Self {
            kind,
            server,
            timeout,
            keep_open,
            outbound: VecDeque::new(),
            inbound: HashMap::new(),
            link: Link::Closed,
            epoch: 0,
            idle_since: None,
            scratch,
        }
    }

    fn contains(&self, id: u16) -> bool {
        self.inbound.contains_key(&id) || self.outbound.iter().any(|t| t.request.id == id)
    }

    fn is_idle(&self) -> bool {
        self.inbound.is_empty() && self.outbound.is_empty()
    }

    fn enqueue(&mut self, task: Task) {
        if self.contains(task.request.id) {
            let id = task.request.id;
            task.reject(DnsError::RequestIdInUse(id));
            return;
        }
        self.outbound.push_back(task);
        self.idle_since = None;
    }

    fn requeue_front(&mut self, mut task: Task) {
        task.time_sent = None;
        self.outbound.push_front(task);
        self.idle_since = None;
    }

    /// Drain the outbound queue into the open transport. Returns tasks that
    /// overflowed the UDP payload and need the TCP fallback.
    fn poll(&mut self, events: &EventTx, now: Instant) -> Vec<Task> {
        if self.outbound.is_empty() {
            return Vec::new();
        }
        match self.link {
            Link::Closed => {
                self.open(events);
                return Vec::new();
            }
            Link::Opening(_) => return Vec::new(),
            Link::Open(_) => {}
        }

        let mut fallbacks = Vec::new();
        while let Some(mut task) = self.outbound.pop_front() {
            let frame = match self.kind {
                TransportKind::Udp => {
                    let mut w = Writer::new(&mut self.scratch[..UDP_PAYLOAD_LIMIT]);
                    match task.request.write(&mut w) {
                        Err(e) => {
                            task.reject(DnsError::ResponseMalformed(e));
                            continue;
                        }
                        Ok(()) if w.overflowed() => {
                            debug!(id = task.request.id, "Request overflows UDP, retrying over TCP");
                            fallbacks.push(task);
                            continue;
                        }
                        Ok(()) => w.buffer().to_vec(),
                    }
                }
                TransportKind::Tcp => {
                    let encoded = {
                        let mut w = Writer::starting_at(&mut self.scratch, 2);
                        task.request.write(&mut w).map(|_| (w.offset(), w.overflowed()))
                    };
                    match encoded {
                        Err(e) => {
                            task.reject(DnsError::ResponseMalformed(e));
                            continue;
                        }
                        Ok((size, true)) => {
                            task.reject(DnsError::RequestTooLong(size));
                            continue;
                        }
                        Ok((len, false)) => {
                            self.scratch[..2].copy_from_slice(&(len as u16).to_be_bytes());
                            self.scratch[..len + 2].to_vec()
                        }
                    }
                }
            };

            task.time_sent = Some(now);
            let id = task.request.id;
            self.inbound.insert(id, task);
            if let Link::Open(handle) = &self.link {
                // A dead transport task surfaces through its Closed event.
                let _ = handle.frames.send(frame);
            }
        }
        fallbacks
    }

    fn open(&mut self, events: &EventTx) {
        self.epoch += 1;
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(events.clone(), self.kind, self.epoch);
        match self.kind {
            TransportKind::Udp => {
                tokio::spawn(transport::run_udp(self.server, frame_rx, sink));
            }
            TransportKind::Tcp => {
                tokio::spawn(transport::run_tcp(self.server, self.timeout, frame_rx, sink));
            }
        }
        self.link = Link::Opening(TransportHandle { frames: frame_tx });
    }

    /// Drop the transport; the frame sender going away makes the transport
    /// task exit, and its remaining events are stale by epoch.
    fn close_link(&mut self) {
        self.epoch += 1;
        self.link = Link::Closed;
        self.idle_since = None;
    }

    fn reject_all(&mut self, err: &DnsError) {
        for (_, task) in self.inbound.drain() {
            task.reject(err.clone());
        }
        while let Some(task) = self.outbound.pop_front() {
            task.reject(err.clone());
        }
    }

    /// Pull back every in-flight task for retransmission on the next open
    /// (TCP keep-alive ended under us).
    fn recycle_inflight(&mut self) {
        let ids: Vec<u16> = self.inbound.keys().copied().collect();
        for id in ids {
            if let Some(task) = self.inbound.remove(&id) {
                self.requeue_front(task);
            }
        }
    }

    /// Timeout scan: expired tasks either retry or settle unanswered.
    /// Tasks whose caller went away are swept out.
    fn on_tick(&mut self, now: Instant) -> bool {
        self.outbound.retain(|t| !t.reply.is_closed());

        let expired: Vec<u16> = self
            .inbound
            .iter()
            .filter(|(_, t)| {
                t.reply.is_closed()
                    || t.time_sent.is_some_and(|sent| now.duration_since(sent) >= self.timeout)
            })
            .map(|(id, _)| *id)
            .collect();

        let mut requeued = false;
        for id in expired {
            let Some(mut task) = self.inbound.remove(&id) else { continue };
            if task.reply.is_closed() {
                continue;
            }
            if task.retries_left > 0 {
                task.retries_left -= 1;
                debug!(id, retries_left = task.retries_left, "Request timed out, retrying");
                self.requeue_front(task);
                requeued = true;
            } else {
                task.reject(DnsError::RequestUnanswered);
            }
        }
        requeued
    }

    /// Arm or fire the deferred close once both queues are empty.
    fn on_idle_tick(&mut self, now: Instant) {
        if !self.is_idle() {
            self.idle_since = None;
            return;
        }
        if matches!(self.link, Link::Closed) {
            return;
        }
        match self.idle_since {
            None => self.idle_since = Some(now),
            Some(since) if now.duration_since(since) >= self.keep_open => {
                debug!(kind = ?self.kind, "Closing idle transport");
                self.close_link();
            }
            Some(_) => {}
        }
    }

    fn mark_idle(&mut self, now: Instant) {
        if self.is_idle() && self.idle_since.is_none() {
            self.idle_since = Some(now);
        }
    }
}

pub(crate) struct Driver {
    udp: Worker,
    tcp: Worker,
    hook: IgnoredErrorHook,
    /// Sizing buffer for transport selection at submit time.
    measure: Vec<u8>,
    timeout: Duration,
}

impl Driver {
    pub(crate) fn new(
        server: SocketAddr,
        timeout_ms: u64,
        keep_open_ms: u64,
        hook: IgnoredErrorHook,
    ) -> Self {
        let timeout = Duration::from_millis(timeout_ms);
        let keep_open = Duration::from_millis(keep_open_ms);
        Self {
            udp: Worker::new(TransportKind::Udp, server, timeout, keep_open),
            tcp: Worker::new(TransportKind::Tcp, server, timeout, keep_open),
            hook,
            measure: vec![0u8; TCP_PAYLOAD_LIMIT + 1],
            timeout,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut events_rx: mpsc::UnboundedReceiver<(TransportKind, u64, TransportEvent)>,
        events_tx: EventTx,
    ) {
        let tick_every = Duration::from_millis((self.timeout.as_millis() as u64 / 20).max(50));
        let mut tick = tokio::time::interval(tick_every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd, &events_tx),
                    // Every resolver handle is gone.
                    None => break,
                },
                Some((kind, epoch, event)) = events_rx.recv() => {
                    self.on_transport_event(kind, epoch, event, &events_tx);
                }
                _ = tick.tick() => self.on_tick(&events_tx),
            }
        }

        self.udp.reject_all(&DnsError::Cancelled);
        self.tcp.reject_all(&DnsError::Cancelled);
    }

    fn on_command(&mut self, cmd: Command, events: &EventTx) {
        match cmd {
            Command::Send { msg, reply } => self.submit(msg, reply, events),
            Command::Close => {
                debug!("Resolver closed, settling outstanding requests");
                self.udp.reject_all(&DnsError::Cancelled);
                self.tcp.reject_all(&DnsError::Cancelled);
                self.udp.close_link();
                self.tcp.close_link();
            }
        }
    }

    /// Transport selection: UPDATE always rides TCP; everything else by
    /// encoded size (≤512 UDP with retries, ≤65535 TCP, above that fails).
    fn submit(
        &mut self,
        msg: Message,
        reply: oneshot::Sender<Result<Message, DnsError>>,
        events: &EventTx,
    ) {
        let id = msg.id;
        if self.udp.contains(id) || self.tcp.contains(id) {
            let _ = reply.send(Err(DnsError::RequestIdInUse(id)));
            return;
        }

        if msg.flags.opcode == OPCODE_UPDATE {
            self.tcp.enqueue(Task { request: msg, reply, retries_left: 0, time_sent: None });
            self.poll_tcp(events);
            return;
        }

        let mut w = Writer::new(&mut self.measure);
        match msg.write(&mut w) {
            Err(e) => {
                let _ = reply.send(Err(DnsError::ResponseMalformed(e)));
                return;
            }
            Ok(()) => {}
        }
        let size = w.offset();
        if w.overflowed() || size > TCP_PAYLOAD_LIMIT {
            let _ = reply.send(Err(DnsError::RequestTooLong(size)));
            return;
        }
        if size <= UDP_PAYLOAD_LIMIT {
            self.udp.enqueue(Task {
                request: msg,
                reply,
                retries_left: UDP_RETRIES,
                time_sent: None,
            });
            self.poll_udp(events);
        } else {
            self.tcp.enqueue(Task { request: msg, reply, retries_left: 0, time_sent: None });
            self.poll_tcp(events);
        }
    }

    fn poll_udp(&mut self, events: &EventTx) {
        let now = Instant::now();
        let fallbacks = self.udp.poll(events, now);
        if fallbacks.is_empty() {
            return;
        }
        for mut task in fallbacks {
            task.retries_left = 0;
            self.tcp.enqueue(task);
        }
        self.poll_tcp(events);
    }

    fn poll_tcp(&mut self, events: &EventTx) {
        let now = Instant::now();
        let fallbacks = self.tcp.poll(events, now);
        debug_assert!(fallbacks.is_empty(), "TCP has no fallback transport");
        for task in fallbacks {
            task.reject(DnsError::RequestTooLong(TCP_PAYLOAD_LIMIT + 1));
        }
    }

    fn worker_mut(&mut self, kind: TransportKind) -> &mut Worker {
        match kind {
            TransportKind::Udp => &mut self.udp,
            TransportKind::Tcp => &mut self.tcp,
        }
    }

    fn on_transport_event(
        &mut self,
        kind: TransportKind,
        epoch: u64,
        event: TransportEvent,
        events: &EventTx,
    ) {
        let now = Instant::now();
        if self.worker_mut(kind).epoch != epoch {
            return;
        }
        match event {
            TransportEvent::Opened => {
                let worker = self.worker_mut(kind);
                if let Link::Opening(handle) = std::mem::replace(&mut worker.link, Link::Closed) {
                    worker.link = Link::Open(handle);
                }
                match kind {
                    TransportKind::Udp => self.poll_udp(events),
                    TransportKind::Tcp => self.poll_tcp(events),
                }
            }
            TransportEvent::Response(msg) => self.on_response(kind, msg, events, now),
            TransportEvent::Timeout => {
                warn!(kind = ?kind, "Transport idle timeout");
                let worker = self.worker_mut(kind);
                worker.reject_all(&DnsError::RequestUnanswered);
                worker.close_link();
            }
            TransportEvent::Error(err) => {
                warn!(kind = ?kind, error = %err, "Transport error, settling bound requests");
                let worker = self.worker_mut(kind);
                worker.reject_all(&err);
                worker.close_link();
            }
            TransportEvent::Closed { graceful } => {
                let worker = self.worker_mut(kind);
                worker.link = Link::Closed;
                worker.idle_since = None;
                if graceful {
                    if kind == TransportKind::Tcp && !worker.inbound.is_empty() {
                        // Keep-alive ended mid-flight: reissue on next open.
                        worker.recycle_inflight();
                    }
                } else {
                    worker.reject_all(&DnsError::Other("transport closed".to_string()));
                }
                worker.epoch += 1;
                match kind {
                    TransportKind::Udp => self.poll_udp(events),
                    TransportKind::Tcp => self.poll_tcp(events),
                }
            }
        }
    }

    fn on_response(&mut self, kind: TransportKind, msg: Message, events: &EventTx, now: Instant) {
        let worker = self.worker_mut(kind);
        match worker.inbound.remove(&msg.id) {
            Some(task) => {
                if kind == TransportKind::Udp && msg.flags.tc {
                    debug!(id = msg.id, "Truncated response, falling back to TCP");
                    let mut task = task;
                    task.retries_left = 0;
                    task.time_sent = None;
                    worker.mark_idle(now);
                    self.tcp.enqueue(task);
                    self.poll_tcp(events);
                    return;
                }
                let _ = task.reply.send(Ok(msg));
                worker.mark_idle(now);
            }
            None => (self.hook)(DnsError::ResponseIdUnexpected(msg.id)),
        }
    }

    fn on_tick(&mut self, events: &EventTx) {
        let now = Instant::now();
        if self.udp.on_tick(now) {
            self.poll_udp(events);
        }
        if self.tcp.on_tick(now) {
            self.poll_tcp(events);
        }
        self.udp.on_idle_tick(now);
        self.tcp.on_idle_tick(now);
    }
}
