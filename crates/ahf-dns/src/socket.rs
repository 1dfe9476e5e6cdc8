//! The resolver socket: a dual-transport DNS request multiplexer bound to
//! one configured server.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures_util::future::join_all;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::driver::{Command, Driver};
use crate::error::DnsError;
use crate::message::Message;
use crate::rdata::{RData, RecordType};

/// Callback for faults that cannot be attributed to any in-flight request
/// (stray responses in particular).
pub type IgnoredErrorHook = Arc<dyn Fn(DnsError) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Server address; an IPv4 or IPv6 literal, never a hostname.
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long an idle transport stays open.
    #[serde(default = "default_keep_open_ms")]
    pub keep_open_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    53
}
fn default_keep_open_ms() -> u64 {
    3000
}
fn default_timeout_ms() -> u64 {
    10000
}

impl ResolverConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            port: default_port(),
            keep_open_ms: default_keep_open_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Handle to one resolver. Cloning shares the underlying driver task; the
/// driver settles everything and exits once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct ResolverSocket {
    cmd_tx: mpsc::Sender<Command>,
}

impl ResolverSocket {
    pub fn new(config: ResolverConfig) -> Result<Self, DnsError> {
        Self::with_ignored_error_hook(
            config,
            Arc::new(|err| warn!(error = %err, "Ignoring unattributable resolver error")),
        )
    }

    pub fn with_ignored_error_hook(
        config: ResolverConfig,
        hook: IgnoredErrorHook,
    ) -> Result<Self, DnsError> {
        let ip: IpAddr = config
            .address
            .parse()
            .map_err(|_| DnsError::InvalidServerAddress(config.address.clone()))?;
        let server = SocketAddr::new(ip, config.port);

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let driver = Driver::new(server, config.timeout_ms, config.keep_open_ms, hook);
        tokio::spawn(driver.run(cmd_rx, events_rx, events_tx));
        Ok(Self { cmd_tx })
    }

    /// Submit one message and await its response. Settles when a response
    /// with the same ID arrives, retries run out, or the transport fails.
    pub async fn send(&self, msg: Message) -> Result<Message, DnsError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send { msg, reply })
            .await
            .map_err(|_| DnsError::Cancelled)?;
        rx.await.map_err(|_| DnsError::Cancelled)?
    }

    /// Fan out several messages; each settles on its own.
    pub async fn send_all(&self, msgs: Vec<Message>) -> Vec<Result<Message, DnsError>> {
        join_all(msgs.into_iter().map(|m| self.send(m))).await
    }

    /// Terminate both transports and settle outstanding requests. The
    /// resolver stays usable; the next send reopens.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
    }

    pub async fn resolve_ptr(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let response = self.send(Message::query(random_id(), name, RecordType::PTR)).await?;
        Ok(response
            .answer
            .iter()
            .filter_map(|rr| match &rr.rdata {
                Some(RData::PTR(target)) => Some(target.clone()),
                _ => None,
            })
            .collect())
    }

    /// SRV lookup; returns the SRV RDATA values from the answer section.
    pub async fn resolve_srv(&self, name: &str) -> Result<Vec<RData>, DnsError> {
        let response = self.send(Message::query(random_id(), name, RecordType::SRV)).await?;
        Ok(response
            .answer
            .iter()
            .filter_map(|rr| match &rr.rdata {
                Some(rdata @ RData::SRV { .. }) => Some(rdata.clone()),
                _ => None,
            })
            .collect())
    }

    /// TXT lookup; returns the character-strings of every TXT answer.
    pub async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let response = self.send(Message::query(random_id(), name, RecordType::TXT)).await?;
        Ok(response
            .answer
            .iter()
            .filter_map(|rr| match &rr.rdata {
                Some(RData::TXT(strings)) => Some(strings.clone()),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Reverse lookup: PTR query under `in-addr.arpa.` / `ip6.arpa.`.
    pub async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        self.resolve_ptr(&reverse_name(ip)).await
    }
}

fn random_id() -> u16 {
    rand::rng().random()
}

fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", d, c, b, a)
        }
        IpAddr::V6(v6) => {
            let mut name = String::with_capacity(74);
            for byte in v6.octets().iter().rev() {
                name.push(char::from_digit(u32::from(byte & 0xF), 16).unwrap());
                name.push('.');
                name.push(char::from_digit(u32::from(byte >> 4), 16).unwrap());
                name.push('.');
            }
            name.push_str("ip6.arpa.");
            name
        }
    }
}
