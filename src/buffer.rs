//! Send and receive buffers (spec §4.2, §4.3).
//!
//! The original source keeps these as singly-linked lists walked linearly
//! on every tick and every delivery attempt. Re-expressed here as ordered
//! containers keyed by seqno, the buffers' natural primary key (spec §9):
//! a `VecDeque` for the strictly-increasing, append-only send queue, and a
//! `BTreeMap` for the receive set, which fills in arbitrary order but is
//! always scanned from its low end.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::Instant;

/// One unacknowledged outbound packet, owned until its seqno falls below
/// `last_ack`.
#[derive(Debug)]
pub struct OutEntry {
    pub seqno: u32,
    pub bytes: Vec<u8>,
    pub last_try: Instant,
}

/// FIFO of in-flight packets, ordered by seqno. Entries are appended in
/// increasing seqno order and never reordered.
#[derive(Debug, Default)]
pub struct SendBuffer {
    entries: VecDeque<OutEntry>,
}

impl SendBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, seqno: u32, bytes: Vec<u8>, now: Instant) {
        debug_assert!(self.entries.back().map_or(true, |e| e.seqno < seqno));
        self.entries.push_back(OutEntry {
            seqno,
            bytes,
            last_try: now,
        });
    }

    /// Drops every entry with `seqno < last_ack`.
    pub fn advance(&mut self, last_ack: u32) {
        while self
            .entries
            .front()
            .is_some_and(|e| crate::util::seq_lt(e.seqno, last_ack))
        {
            self.entries.pop_front();
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OutEntry> {
        self.entries.iter_mut()
    }

    pub fn front(&self) -> Option<&OutEntry> {
        self.entries.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut OutEntry> {
        self.entries.front_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A received data packet, buffered because it arrived ahead of
/// `next_to_deliver`, or because its payload has only been partially
/// written to the application.
#[derive(Debug)]
pub struct InEntry {
    pub seqno: u32,
    pub payload: Vec<u8>,
    pub progress: usize,
}

impl InEntry {
    pub fn remaining(&self) -> &[u8] {
        &self.payload[self.progress..]
    }

    pub fn fully_delivered(&self) -> bool {
        self.progress >= self.payload.len()
    }
}

/// Set of in-window received packets keyed by seqno. Insertion is
/// idempotent: a second insert at an already-present seqno is a no-op, so
/// a retransmitted duplicate never disturbs delivery progress already made
/// on the original.
#[derive(Debug, Default)]
pub struct RecvBuffer {
    entries: BTreeMap<u32, InEntry>,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this seqno was newly inserted, `false` if it was
    /// already present (the duplicate case).
    pub fn insert(&mut self, seqno: u32, payload: Vec<u8>) -> bool {
        if self.entries.contains_key(&seqno) {
            return false;
        }
        self.entries.insert(
            seqno,
            InEntry {
                seqno,
                payload,
                progress: 0,
            },
        );
        true
    }

    pub fn contains(&self, seqno: u32) -> bool {
        self.entries.contains_key(&seqno)
    }

    pub fn get_mut(&mut self, seqno: u32) -> Option<&mut InEntry> {
        self.entries.get_mut(&seqno)
    }

    /// Drops every entry with `seqno < next_to_deliver`. `Receiver::deliver`
    /// calls this after each entry it fully drains, rather than removing
    /// that one seqno directly, so this is the single prune path for the
    /// receive buffer (spec §4.3).
    pub fn advance(&mut self, next_to_deliver: u32) {
        self.entries.retain(|&s, _| !crate::util::seq_lt(s, next_to_deliver));
    }
}
