//! Wire framing: header layout, the Internet checksum, and segment
//! encode/decode.
//!
//! Two header shapes share one in-memory `Header`: the baseline variant
//! omits the trailing `rwnd` field and is 12 bytes on the wire, the
//! congestion-controlled variant carries it and is 16 bytes. Which shape
//! is used is determined by the active [`Variant`], never by inspecting
//! the bytes themselves.

use crate::err::WireError;

pub const BASELINE_HEADER_LEN: usize = 12;
pub const CONGESTION_HEADER_LEN: usize = 16;

/// Selects the wire shape and congestion behavior for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Baseline,
    Congestion,
}

impl Variant {
    pub fn header_len(self) -> usize {
        match self {
            Variant::Baseline => BASELINE_HEADER_LEN,
            Variant::Congestion => CONGESTION_HEADER_LEN,
        }
    }
}

/// The fixed fields every segment carries, baseline or extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub ackno: u32,
    pub seqno: u32,
    /// Receiver-advertised flow-control window, in packets. Only
    /// meaningful (and only serialized) under [`Variant::Congestion`].
    pub rwnd: u32,
}

/// A decoded or about-to-be-encoded segment: header plus payload. An
/// empty payload means either a pure ACK or an EOF marker; which one it
/// is depends on whether `header.seqno` falls in the receiver's
/// acceptance window, a judgment the wire format itself does not encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn encode(&self, variant: Variant) -> Vec<u8> {
        let hlen = variant.header_len();
        let total = hlen + self.payload.len();
        let mut buf = vec![0u8; total];

        buf[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        buf[4..8].copy_from_slice(&self.header.ackno.to_be_bytes());
        buf[8..12].copy_from_slice(&self.header.seqno.to_be_bytes());
        if let Variant::Congestion = variant {
            buf[12..16].copy_from_slice(&self.header.rwnd.to_be_bytes());
        }
        buf[hlen..].copy_from_slice(&self.payload);

        let cksum = internet_checksum(&buf);
        buf[0..2].copy_from_slice(&cksum.to_be_bytes());
        buf
    }

    /// Decodes a received datagram. A declared length below the header
    /// size, above the received length, or a checksum mismatch is
    /// reported as [`WireError`] rather than panicking: garbage datagrams
    /// are routine on an unreliable channel, not exceptional.
    pub fn decode(variant: Variant, bytes: &[u8]) -> Result<Segment, WireError> {
        let hlen = variant.header_len();
        if bytes.len() < hlen {
            return Err(WireError::Truncated);
        }
        let declared_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if declared_len < hlen || declared_len > bytes.len() {
            return Err(WireError::BadLength);
        }

        let mut scratch = bytes[..declared_len].to_vec();
        let recv_cksum = u16::from_be_bytes([scratch[0], scratch[1]]);
        scratch[0] = 0;
        scratch[1] = 0;
        if internet_checksum(&scratch) != recv_cksum {
            return Err(WireError::ChecksumMismatch);
        }

        let ackno = u32::from_be_bytes(scratch[4..8].try_into().unwrap());
        let seqno = u32::from_be_bytes(scratch[8..12].try_into().unwrap());
        let rwnd = if let Variant::Congestion = variant {
            u32::from_be_bytes(scratch[12..16].try_into().unwrap())
        } else {
            0
        };
        let payload = scratch[hlen..].to_vec();

        Ok(Segment {
            header: Header { ackno, seqno, rwnd },
            payload,
        })
    }
}

/// RFC 1071 Internet checksum: one's complement sum of 16-bit words,
/// complemented. The caller is responsible for zeroing the checksum
/// field in `bytes` before calling this for verification.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = bytes.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = *chunks.remainder() {
        sum += (last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
