//! Sender state machine (spec §4.4).
//!
//! Fragments application bytes into packets up to MSS, admits them to the
//! wire subject to the effective window, retransmits on timeout or triple
//! duplicate ACK, and emits an EOF packet once on input EOF.

use std::time::{Duration, Instant};

use crate::buffer::SendBuffer;
use crate::congestion::CongestionController;
use crate::session::Host;
use crate::util::seq_lt;
use crate::wire::{Header, Segment, Variant};
use tracing::{debug, trace};

#[derive(Debug)]
pub struct Sender {
    variant: Variant,
    mss: u16,
    timeout: Duration,
    window: u32,
    next_out_seq: u32,
    last_ack: u32,
    send_eof: bool,
    dup_ack_count: u32,
    peer_rwnd: u32,
    buffer: SendBuffer,
    congestion: Option<CongestionController>,
}

impl Sender {
    pub fn new(variant: Variant, mss: u16, timeout: Duration, window: u16, congestion: bool) -> Self {
        Sender {
            variant,
            mss,
            timeout,
            window: window as u32,
            next_out_seq: 1,
            last_ack: 1,
            send_eof: false,
            dup_ack_count: 0,
            // Bootstraps the first packets before any peer advertisement
            // arrives. The original source leaves this at zero, which
            // stalls the very first transmission; we start it at the
            // configured window instead (see DESIGN.md).
            peer_rwnd: window as u32,
            buffer: SendBuffer::new(),
            congestion: congestion.then(|| CongestionController::new(window as u32)),
        }
    }

    pub fn next_out_seq(&self) -> u32 {
        self.next_out_seq
    }

    pub fn last_ack(&self) -> u32 {
        self.last_ack
    }

    pub fn send_eof_sent(&self) -> bool {
        self.send_eof
    }

    pub fn fully_acked(&self) -> bool {
        self.last_ack == self.next_out_seq
    }

    fn effective_window(&self) -> u32 {
        match &self.congestion {
            Some(cc) => cc.cwnd().min(self.peer_rwnd),
            None => self.window,
        }
    }

    fn admissible(&self, seqno: u32) -> bool {
        seqno.wrapping_sub(self.last_ack) < self.effective_window()
    }

    fn record_and_maybe_send(&mut self, host: &mut impl Host, seqno: u32, bytes: Vec<u8>, now: Instant) {
        if self.admissible(seqno) {
            host.send_datagram(&bytes);
        }
        self.buffer.append(seqno, bytes, now);
        self.next_out_seq = self.next_out_seq.wrapping_add(1);
    }

    /// Host signals application input may be available. `ackno`/`rwnd`
    /// are the receiver's current piggyback fields, stamped onto any
    /// packet built from this read.
    pub fn on_readable(&mut self, host: &mut impl Host, ackno: u32, rwnd: u32) {
        if self.send_eof {
            return;
        }
        let mut buf = vec![0u8; self.mss as usize];
        let n = host.input_read(&mut buf);
        let now = host.now();
        if n > 0 {
            buf.truncate(n as usize);
            let seqno = self.next_out_seq;
            let seg = Segment {
                header: Header { ackno, seqno, rwnd },
                payload: buf,
            };
            let bytes = seg.encode(self.variant);
            self.record_and_maybe_send(host, seqno, bytes, now);
        } else if n == 0 {
            // Nothing available right now.
        } else {
            let seqno = self.next_out_seq;
            let seg = Segment {
                header: Header { ackno, seqno, rwnd },
                payload: Vec::new(),
            };
            let bytes = seg.encode(self.variant);
            self.send_eof = true;
            self.record_and_maybe_send(host, seqno, bytes, now);
        }
    }

    /// Sends the EOF packet immediately and unconditionally skips reading
    /// application input; used once at bootstrap for a receiver-role
    /// session (spec §4.7). Idempotent: a second call is a no-op.
    pub fn send_eof_now(&mut self, host: &mut impl Host, ackno: u32, rwnd: u32) {
        if self.send_eof {
            return;
        }
        let seqno = self.next_out_seq;
        let seg = Segment {
            header: Header { ackno, seqno, rwnd },
            payload: Vec::new(),
        };
        let bytes = seg.encode(self.variant);
        self.send_eof = true;
        let now = host.now();
        self.record_and_maybe_send(host, seqno, bytes, now);
    }

    fn fast_retransmit(&mut self, host: &mut impl Host, now: Instant) {
        if let Some(entry) = self.buffer.front_mut() {
            debug!(seqno = entry.seqno, "fast retransmit");
            host.send_datagram(&entry.bytes);
            entry.last_try = now;
        }
    }

    /// Processes the piggybacked ackno/rwnd carried by every inbound
    /// packet, data or pure ACK alike. Returns `true` if `last_ack`
    /// advanced.
    pub fn on_ack(&mut self, host: &mut impl Host, ackno: u32, rwnd: u32) -> bool {
        self.peer_rwnd = rwnd;
        let now = host.now();

        if ackno == self.last_ack {
            self.dup_ack_count += 1;
            if self.dup_ack_count == 3 {
                self.dup_ack_count = 0;
                self.fast_retransmit(host, now);
                if let Some(cc) = &mut self.congestion {
                    cc.on_triple_dup_ack();
                }
            }
            return false;
        }

        if seq_lt(self.last_ack, ackno) && !seq_lt(self.next_out_seq, ackno) {
            self.last_ack = ackno;
            self.dup_ack_count = 0;
            self.buffer.advance(ackno);
            if let Some(cc) = &mut self.congestion {
                cc.on_ack_advance();
            }
            return true;
        }

        // Stale or invalid ackno (ackno < last_ack, not counting the
        // duplicate case above, or ackno > next_out_seq): ignored.
        false
    }

    /// Retransmission scan. Subject to the same window admission as a
    /// fresh send; a timeout on any entry delivers a Timeout event to the
    /// congestion controller.
    pub fn on_tick(&mut self, host: &mut impl Host, now: Instant) {
        let last_ack = self.last_ack;
        let window = self.effective_window();
        let timeout = self.timeout;
        let mut timed_out = 0usize;
        for entry in self.buffer.iter_mut() {
            if now.duration_since(entry.last_try) >= timeout
                && entry.seqno.wrapping_sub(last_ack) < window
            {
                trace!(seqno = entry.seqno, "retransmit on timeout");
                host.send_datagram(&entry.bytes);
                entry.last_try = now;
                timed_out += 1;
            }
        }
        if timed_out > 0 {
            if let Some(cc) = &mut self.congestion {
                cc.on_timeout();
            }
        }
    }
}
