//! Session configuration and its CLI surface.
//!
//! `Config` is the typed knob set an `Engine` is built from: window size,
//! timeout, MSS, role, and which wire variant (baseline or
//! congestion-controlled) is active. The CLI layer (`Args`, parsed with
//! `clap`) is host plumbing, not engine state, but lives here because the
//! two binaries share it verbatim.

use std::net::SocketAddr;
use std::time::Duration;

use crate::wire::Variant;

/// Which side of the bootstrap handshake this session plays (spec §4.7).
/// A sender reads application input; a receiver sends its EOF immediately
/// and otherwise only acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Static window in packets, used directly as the effective window in
    /// the baseline variant and as the initial `ssthresh` in the
    /// congestion-controlled variant.
    pub window: u16,
    pub timeout: Duration,
    pub mss: u16,
    pub role: Role,
    pub variant: Variant,
    /// Cap on the advertised receive window, in packets (spec §4.8).
    pub rwnd_cap: u32,
}

impl Config {
    pub fn header_len(&self) -> usize {
        self.variant.header_len()
    }

    pub fn max_packet_len(&self) -> usize {
        self.header_len() + self.mss as usize
    }
}

/// Command-line surface for both `rdt-server` and `rdt-client` binaries
/// (spec §6's "Configuration" surface, made concrete per `SPEC_FULL.md`
/// §6). No environment variables are read.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Reliable datagram transport over UDP")]
pub struct Args {
    /// Local address to bind the UDP socket to.
    #[arg(long)]
    pub bind: SocketAddr,

    /// Peer address. Required for the client binary; the server binary
    /// learns its peer from the first datagram it receives.
    #[arg(long)]
    pub peer: Option<SocketAddr>,

    /// Initial/static window, in packets.
    #[arg(long, default_value_t = 16)]
    pub window: u16,

    /// Retransmission timeout, in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 300)]
    pub timeout_ms: u64,

    /// Maximum payload bytes per data packet.
    #[arg(long)]
    pub mss: Option<u16>,

    /// Enable the extended variant: AIMD congestion control plus a
    /// receiver-advertised flow-control window.
    #[arg(long)]
    pub congestion: bool,

    /// Raise log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn mss(&self) -> u16 {
        self.mss.unwrap_or(if self.congestion { 1000 } else { 488 })
    }

    pub fn variant(&self) -> Variant {
        if self.congestion {
            Variant::Congestion
        } else {
            Variant::Baseline
        }
    }

    pub fn to_config(&self, role: Role) -> Config {
        Config {
            window: self.window,
            timeout: Duration::from_millis(self.timeout_ms),
            mss: self.mss(),
            role,
            variant: self.variant(),
            rwnd_cap: 64,
        }
    }

    /// Maps `-v` repeats onto a `tracing_subscriber` filter directive,
    /// mirroring the teacher's narrated trace output at leveled
    /// granularity instead of unconditional `println!`.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
