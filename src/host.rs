//! UDP host harness: the one concrete `Host` implementation this crate
//! ships (`SPEC_FULL.md` §2's "Host harness" layer). Owns the socket, a
//! one-session-per-peer table, and a `poll`-driven event loop; it never
//! reaches into engine internals, matching the teacher's `segment_loop`
//! design (single-threaded, re-entered on datagram arrival and a
//! periodic tick).

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags};
use tracing::{info, warn};

use crate::config::Config;
use crate::session::{Engine, Host};

/// `Host` implementation backing one peer's session: a shared UDP socket
/// (for `send_datagram`), that peer's address (so every send lands on the
/// right far end), and the process's stdin/stdout for application data.
pub struct UdpHost<'a> {
    socket: &'a UdpSocket,
    peer: SocketAddr,
    stdin_eof: bool,
}

impl<'a> UdpHost<'a> {
    fn new(socket: &'a UdpSocket, peer: SocketAddr) -> Self {
        UdpHost {
            socket,
            peer,
            stdin_eof: false,
        }
    }
}

impl Host for UdpHost<'_> {
    fn input_read(&mut self, buf: &mut [u8]) -> i64 {
        if self.stdin_eof {
            return -1;
        }
        match std::io::stdin().read(buf) {
            Ok(0) => {
                self.stdin_eof = true;
                -1
            }
            Ok(n) => n as i64,
            // stdin is put in non-blocking mode at startup (see
            // `set_stdin_nonblocking`); "nothing to read yet" surfaces as
            // `WouldBlock` here rather than as a blocking wait, so the
            // event loop keeps servicing the socket and the tick in the
            // meantime (spec §5, §6's `input_read` contract).
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(_) => {
                self.stdin_eof = true;
                -1
            }
        }
    }

    fn output_write(&mut self, buf: &[u8]) -> i64 {
        match std::io::stdout().write(buf) {
            Ok(n) => n as i64,
            Err(_) => -1,
        }
    }

    fn output_space(&mut self) -> usize {
        // Stdout has no addressable capacity; advertise a generous
        // constant rather than special-casing the congestion window
        // around an un-measurable sink.
        64 * 1024
    }

    fn send_datagram(&mut self, bytes: &[u8]) {
        if let Err(err) = self.socket.send_to(bytes, self.peer) {
            warn!(peer = %self.peer, %err, "send_to failed");
        }
    }

    fn now(&mut self) -> Instant {
        Instant::now()
    }
}

/// Owns the socket and the peer→session table; the engine never sees
/// either. Mirrors the teacher's `Manager`/`segment_loop` split: a global
/// mutable registry is host state, not engine state (spec §9).
pub struct EventLoop {
    socket: UdpSocket,
    config: Config,
    sessions: HashMap<SocketAddr, Engine>,
    tick: Duration,
}

/// Puts stdin in non-blocking mode so `UdpHost::input_read` never stalls
/// the single-threaded event loop waiting on application input (spec §5).
/// Only the client binary's sender-role session ever reads stdin, but
/// this is harmless to set up unconditionally at startup; failure is
/// logged and otherwise ignored rather than aborting the process, since a
/// receiver-role server never touches stdin regardless.
fn set_stdin_nonblocking() {
    let fd = std::io::stdin().as_raw_fd();
    let flags = match fcntl(fd, FcntlArg::F_GETFL) {
        Ok(flags) => flags,
        Err(err) => {
            warn!(%err, "failed to read stdin flags; input_read may block");
            return;
        }
    };
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    if let Err(err) = fcntl(fd, FcntlArg::F_SETFL(flags)) {
        warn!(%err, "failed to set stdin non-blocking; input_read may block");
    }
}

impl EventLoop {
    pub fn bind(bind: SocketAddr, config: Config, tick: Duration) -> Result<Self, crate::err::Error> {
        let socket = UdpSocket::bind(bind).map_err(|e| crate::err::Error::Bind(bind, e))?;
        socket.set_nonblocking(true)?;
        set_stdin_nonblocking();
        info!(%bind, "listening");
        Ok(EventLoop {
            socket,
            config,
            sessions: HashMap::new(),
            tick,
        })
    }

    /// Eagerly creates and bootstraps a session for `peer` — used by the
    /// client binary, which knows its peer up front instead of learning
    /// it from the first inbound datagram.
    pub fn connect(&mut self, peer: SocketAddr) {
        self.ensure_session(peer);
    }

    fn ensure_session(&mut self, peer: SocketAddr) -> bool {
        match self.sessions.entry(peer) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                let mut engine = Engine::new(self.config);
                let mut host = UdpHost::new(&self.socket, peer);
                engine.bootstrap(&mut host);
                v.insert(engine);
                info!(%peer, "session established");
                true
            }
        }
    }

    /// Runs indefinitely, accepting and retiring sessions as peers come
    /// and go. Used by the server binary, which has no single session
    /// whose quiescence should end the process.
    pub fn run_forever(&mut self) -> ! {
        loop {
            self.tick_once();
        }
    }

    /// Runs until `peer`'s session has quiesced (or failed fatally) and
    /// been retired. Used by the client binary, which knows up front
    /// which single session it's waiting on.
    pub fn run_until_done(&mut self, peer: SocketAddr) {
        loop {
            self.tick_once();
            if !self.sessions.contains_key(&peer) {
                break;
            }
        }
    }

    fn tick_once(&mut self) {
        self.tick_all();
        self.poll_once();
    }

    fn tick_all(&mut self) {
        let peers: Vec<SocketAddr> = self.sessions.keys().copied().collect();
        for peer in peers {
            let mut host = UdpHost::new(&self.socket, peer);
            if let Some(engine) = self.sessions.get_mut(&peer) {
                engine.on_readable(&mut host);
                engine.on_writable(&mut host);
                engine.on_tick(&mut host);
            }
        }
        self.sessions.retain(|peer, engine| {
            let keep = !engine.is_quiescent() && !engine.has_fatal_output_error();
            if !keep {
                info!(%peer, "session closed");
            }
            keep
        });
    }

    fn poll_once(&mut self) {
        let mut pfd = [PollFd::new(self.socket.as_raw_fd(), PollFlags::POLLIN)];
        let timeout_ms = self.tick.as_millis().min(i32::MAX as u128) as i32;
        let Ok(n) = poll(&mut pfd, timeout_ms) else { return };
        if n == 0 {
            return;
        }

        let mut buf = [0u8; 2048];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    self.ensure_session(peer);
                    let mut host = UdpHost::new(&self.socket, peer);
                    if let Some(engine) = self.sessions.get_mut(&peer) {
                        engine.on_datagram(&mut host, &buf[..len]);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }
}

/// In-memory `Host` used only by unit tests: no sockets, no stdio. Lets
/// the state machines be tested directly against constructed segments,
/// the way the teacher tests `TCB` transitions against constructed
/// headers rather than over a real `Tun` device.
#[cfg(test)]
pub mod test_support {
    use super::*;

    pub struct FakeHost {
        pub input: VecDeque<u8>,
        pub input_eof: bool,
        pub sent: Vec<Vec<u8>>,
        pub output_writable: usize,
        pub written: Vec<u8>,
        pub output_fatal: bool,
        pub clock: Instant,
    }

    impl FakeHost {
        pub fn new() -> Self {
            FakeHost {
                input: VecDeque::new(),
                input_eof: false,
                sent: Vec::new(),
                output_writable: usize::MAX,
                written: Vec::new(),
                output_fatal: false,
                clock: Instant::now(),
            }
        }

        pub fn with_input(bytes: &[u8]) -> Self {
            let mut h = Self::new();
            h.input.extend(bytes.iter().copied());
            h.input_eof = true;
            h
        }

        pub fn with_eof() -> Self {
            let mut h = Self::new();
            h.input_eof = true;
            h
        }

        pub fn advance(&mut self, d: Duration) {
            self.clock += d;
        }
    }

    impl Host for FakeHost {
        fn input_read(&mut self, buf: &mut [u8]) -> i64 {
            if self.input.is_empty() {
                return if self.input_eof { -1 } else { 0 };
            }
            let n = buf.len().min(self.input.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.input.pop_front().unwrap();
            }
            n as i64
        }

        fn output_write(&mut self, buf: &[u8]) -> i64 {
            if self.output_fatal {
                return -1;
            }
            let n = buf.len().min(self.output_writable);
            if n == 0 {
                return 0;
            }
            self.written.extend_from_slice(&buf[..n]);
            self.output_writable -= n;
            n as i64
        }

        fn output_space(&mut self) -> usize {
            self.output_writable
        }

        fn send_datagram(&mut self, bytes: &[u8]) {
            self.sent.push(bytes.to_vec());
        }

        fn now(&mut self) -> Instant {
            self.clock
        }
    }
}
