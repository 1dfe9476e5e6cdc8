//! DNS wire codec and resolver socket for service discovery.
//!
//! The codec covers RFC 1035 messages (with compression-pointer decoding),
//! RFC 2136 dynamic updates, and RFC 2845 transaction signatures. The
//! resolver socket multiplexes request/response pairs over one UDP and one
//! TCP transport to a single configured server, with size-based transport
//! selection, retry, truncation fallback, and idle close.

pub mod buffer;
pub mod error;
pub mod message;
pub mod rdata;
pub mod record;
pub mod socket;
pub mod tsig;
pub mod update;

mod driver;
mod transport;

pub use error::{DnsError, WireError};
pub use message::{Flags, Message, OPCODE_QUERY, OPCODE_UPDATE};
pub use rdata::{RData, RecordClass, RecordType};
pub use record::ResourceRecord;
pub use socket::{IgnoredErrorHook, ResolverConfig, ResolverSocket};
pub use tsig::TsigSigner;
pub use update::UpdateBuilder;
