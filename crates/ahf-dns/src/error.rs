use thiserror::Error;

/// Faults raised while encoding or decoding the RFC 1035 wire format.
///
/// Reads past a window's end do not error (they yield zero-valued fields);
/// only name handling has hard failure modes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Label too long: {0} bytes (max 63)")]
    LabelTooLong(usize),
    #[error("Name exceeds 255 wire bytes")]
    NameTooLong,
    #[error("Name compression loop detected")]
    CompressionLoop,
    #[error("Compression pointer to offset {0} outside the message")]
    PointerOutOfRange(usize),
}

/// Everything a resolver-socket caller can see go wrong.
///
/// Variants are `Clone` because one transport fault settles every task bound
/// to that transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// The configured server address was not an IPv4/IPv6 literal.
    #[error("Server address must be an IP literal, got {0:?}")]
    InvalidServerAddress(String),

    /// Another request with the same message ID is already in flight.
    #[error("Request ID {0} already in flight")]
    RequestIdInUse(u16),

    /// The encoded request does not fit either transport.
    #[error("Request encodes to {0} bytes, exceeding the 65535-byte limit")]
    RequestTooLong(usize),

    /// Retries exhausted without a response, or the transport idled out.
    #[error("Request went unanswered")]
    RequestUnanswered,

    /// A decoded response matched no in-flight request. Reported through the
    /// ignored-error hook, never to a caller.
    #[error("Response ID {0} matches no request in flight")]
    ResponseIdUnexpected(u16),

    /// A message failed to decode; settles every task on the transport.
    #[error("Malformed message: {0}")]
    ResponseMalformed(#[from] WireError),

    #[error("TSIG signature did not verify")]
    TsigBadSig,
    #[error("TSIG key or algorithm not recognised: {0}")]
    TsigBadKey(String),
    #[error("TSIG time outside the fudge window")]
    TsigBadTime,

    /// An UPDATE was built without naming its zone.
    #[error("Update message requires a zone")]
    UpdateWithoutZone,

    /// The request was cancelled or the resolver closed underneath it.
    #[error("Request cancelled")]
    Cancelled,

    /// An underlying I/O fault, carried as text so it stays cloneable.
    #[error("Transport error: {0}")]
    Other(String),
}

impl DnsError {
    pub(crate) fn from_io(err: &std::io::Error) -> Self {
        DnsError::Other(err.to_string())
    }
}
