//! TCP-style congestion control for the extended variant (spec §4.8).
//!
//! Tracks `cwnd` and `ssthresh` in packets (not bytes: this crate's window
//! admission is itself counted in packets, per `SPEC_FULL.md` §4). Growth
//! is per-ACK in both slow start and congestion avoidance, not per-RTT —
//! the specification's own stated carry-over from the source, which grows
//! `cwnd` by one `MSS` per acknowledging ACK regardless of phase.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Normal,
    FastRecovery,
    SlowStartAfterTimeout,
}

#[derive(Debug)]
pub struct CongestionController {
    cwnd: u32,
    ssthresh: u32,
    phase: Phase,
}

impl CongestionController {
    pub fn new(initial_ssthresh: u32) -> Self {
        CongestionController {
            cwnd: 1,
            ssthresh: initial_ssthresh.max(1),
            phase: Phase::Normal,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    fn is_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// An ACK that advanced `last_ack` arrived: grow the window and, if a
    /// recovery phase had been entered, check whether it has run its
    /// course (spec §4.8's last table row).
    pub fn on_ack_advance(&mut self) {
        self.cwnd += 1;
        if matches!(self.phase, Phase::FastRecovery | Phase::SlowStartAfterTimeout)
            && self.cwnd >= self.ssthresh
        {
            self.phase = Phase::Normal;
        }
    }

    /// Third duplicate ACK at the same value: fast retransmit territory.
    /// Caller is responsible for actually resending the packet at
    /// `last_ack`; this only updates the window.
    pub fn on_triple_dup_ack(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(1);
        self.cwnd = self.ssthresh;
        self.phase = Phase::FastRecovery;
        debug!(cwnd = self.cwnd, ssthresh = self.ssthresh, "triple dup ack: fast recovery");
    }

    /// A retransmission timer fired: multiplicative decrease to 1, then
    /// slow start.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(1);
        self.cwnd = 1;
        self.phase = Phase::SlowStartAfterTimeout;
        debug!(ssthresh = self.ssthresh, "timeout: cwnd reset, slow start");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_one_per_advancing_ack_in_slow_start() {
        let mut cc = CongestionController::new(16);
        assert_eq!(cc.cwnd(), 1);
        cc.on_ack_advance();
        assert_eq!(cc.cwnd(), 2);
        assert!(cc.is_slow_start());
    }

    #[test]
    fn timeout_halves_threshold_and_resets_window() {
        let mut cc = CongestionController::new(16);
        for _ in 0..10 {
            cc.on_ack_advance();
        }
        let cwnd_before = cc.cwnd();
        cc.on_timeout();
        assert_eq!(cc.ssthresh, cwnd_before / 2);
        assert_eq!(cc.cwnd(), 1);
    }

    #[test]
    fn triple_dup_halves_window_to_threshold() {
        let mut cc = CongestionController::new(16);
        for _ in 0..20 {
            cc.on_ack_advance();
        }
        let cwnd_before = cc.cwnd();
        cc.on_triple_dup_ack();
        assert_eq!(cc.cwnd(), cwnd_before / 2);
        assert_eq!(cc.ssthresh, cwnd_before / 2);
    }

    #[test]
    fn exits_fast_recovery_once_window_regrows() {
        let mut cc = CongestionController::new(16);
        for _ in 0..20 {
            cc.on_ack_advance();
        }
        cc.on_triple_dup_ack();
        assert_eq!(cc.phase, Phase::FastRecovery);
        while cc.cwnd() < cc.ssthresh {
            cc.on_ack_advance();
        }
        assert_eq!(cc.phase, Phase::Normal);
    }
}
