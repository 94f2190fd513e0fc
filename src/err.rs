//! Error taxonomy.
//!
//! `WireError` covers garbage-datagram outcomes at the codec boundary; it is
//! never surfaced to a host as a connection failure, only logged and
//! dropped (spec §7: corrupt/truncated datagrams are routine, not
//! exceptional). `Error` is the host-facing enum: bind failures, unknown
//! peers, and the one engine outcome that does abort a session, a fatal
//! `output_write`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram shorter than header")]
    Truncated,
    #[error("declared length out of range")]
    BadLength,
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {0}: {1}")]
    Bind(std::net::SocketAddr, std::io::Error),

    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no peer configured for client role")]
    NoPeer,

    #[error("output stream for {0} failed fatally")]
    FatalOutput(std::net::SocketAddr),
}
