//! Receiver state machine (spec §4.5) and delivery to the application
//! (spec §4.6).
//!
//! Accepts in-window packets, advances the cumulative expected-sequence
//! pointer as the prefix fills, drains payloads to the application, and
//! emits exactly one cumulative ACK per accepted, duplicate, or
//! out-of-window data packet.

use crate::buffer::RecvBuffer;
use crate::session::Host;
use crate::util::in_window;
use crate::wire::{Header, Segment, Variant};
use tracing::trace;

#[derive(Debug)]
pub struct Receiver {
    variant: Variant,
    mss: u16,
    window: u32,
    rwnd_cap: u32,
    congestion: bool,
    next_expected: u32,
    next_to_deliver: u32,
    recv_eof: bool,
    buffer: RecvBuffer,
}

/// Surfaced when `output_write` returns a fatal negative result. The host
/// decides what happens to the connection from here (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalOutput;

impl Receiver {
    pub fn new(variant: Variant, mss: u16, window: u16, rwnd_cap: u32, congestion: bool) -> Self {
        Receiver {
            variant,
            mss,
            window: window as u32,
            rwnd_cap,
            congestion,
            next_expected: 1,
            next_to_deliver: 1,
            recv_eof: false,
            buffer: RecvBuffer::new(),
        }
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn next_to_deliver(&self) -> u32 {
        self.next_to_deliver
    }

    pub fn recv_eof(&self) -> bool {
        self.recv_eof
    }

    pub fn fully_delivered(&self) -> bool {
        self.next_to_deliver == self.next_expected
    }

    /// Window this receiver advertises to the peer: the static configured
    /// window in the baseline variant, or `output_space() / mss` capped at
    /// `rwnd_cap` in the extended one (spec §4.8).
    pub fn advertised_window(&self, host: &mut impl Host) -> u32 {
        if self.congestion {
            ((host.output_space() / self.mss as usize) as u32).min(self.rwnd_cap)
        } else {
            self.window
        }
    }

    /// Re-emits the current cumulative ACK outside of the normal
    /// accept/reject path, used when a datagram couldn't even be decoded
    /// (spec §7: a corrupt packet still gets an ACK so a lost ACK isn't
    /// compounded by silence).
    pub fn reemit_ack(&self, host: &mut impl Host) {
        self.emit_ack(host);
    }

    fn emit_ack(&self, host: &mut impl Host) {
        let rwnd = self.advertised_window(host);
        let seg = Segment {
            header: Header {
                ackno: self.next_expected,
                seqno: 0,
                rwnd,
            },
            payload: Vec::new(),
        };
        host.send_datagram(&seg.encode(self.variant));
    }

    /// A structurally header-only packet is this receiver's EOF/data iff
    /// its seqno is in the current acceptance window; otherwise it is a
    /// pure ACK addressed to the sender half (spec §9 disambiguation).
    pub fn in_acceptance_window(&self, host: &mut impl Host, seqno: u32) -> bool {
        let window = self.advertised_window(host);
        in_window(self.next_expected, seqno, window)
    }

    /// A data packet (non-empty payload, or an in-window empty-payload
    /// EOF) arrived. Out-of-window and duplicate packets are dropped but
    /// still re-emit the current cumulative ACK.
    pub fn on_data(&mut self, host: &mut impl Host, seqno: u32, payload: Vec<u8>) {
        let window = self.advertised_window(host);
        if !in_window(self.next_expected, seqno, window) {
            trace!(seqno, next_expected = self.next_expected, window, "dropping out-of-window/duplicate packet");
            self.emit_ack(host);
            return;
        }

        let is_eof = payload.is_empty();
        self.buffer.insert(seqno, payload);
        if is_eof {
            self.recv_eof = true;
        }

        while self.buffer.contains(self.next_expected) {
            self.next_expected = self.next_expected.wrapping_add(1);
        }

        self.emit_ack(host);
    }

    /// Drains buffered payloads to the application in seqno order,
    /// stopping at the first gap, at backpressure (`output_write == 0`),
    /// or at a fatal output error.
    ///
    /// Does not emit an ACK of its own: `on_data` already emits exactly
    /// one ACK per accepted, duplicate, or out-of-window data packet
    /// (spec §4.5), and this is always called right after `on_data` in
    /// `Engine::on_datagram`. An independent emission here would double
    /// every duplicate ACK the peer observes, tripping fast retransmit
    /// after half as many out-of-order packets as the spec's triple-dup
    /// threshold intends.
    pub fn deliver(&mut self, host: &mut impl Host) -> Result<(), FatalOutput> {
        loop {
            let seqno = self.next_to_deliver;
            let Some(entry) = self.buffer.get_mut(seqno) else {
                return Ok(());
            };

            // An EOF entry has nothing to write; it is delivered the
            // moment it's at the front, without consulting `output_write`
            // (an empty write would otherwise read as backpressure).
            if entry.payload.is_empty() {
                self.next_to_deliver = self.next_to_deliver.wrapping_add(1);
                self.buffer.advance(self.next_to_deliver);
                continue;
            }

            let n = host.output_write(entry.remaining());
            if n > 0 {
                entry.progress += n as usize;
                if entry.fully_delivered() {
                    self.next_to_deliver = self.next_to_deliver.wrapping_add(1);
                    self.buffer.advance(self.next_to_deliver);
                }
            } else if n == 0 {
                return Ok(());
            } else {
                return Err(FatalOutput);
            }
        }
    }
}
