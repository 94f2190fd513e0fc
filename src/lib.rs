//! Reliable, in-order, byte-stream transport over a lossy UDP-style
//! datagram channel.
//!
//! The engine (`session::Engine`) is host-agnostic: it never touches a
//! socket, a file descriptor, or a clock directly. Everything it needs
//! from the outside world crosses the `session::Host` trait, so the same
//! state machine runs against real UDP sockets (`host::UdpHost`) or an
//! in-memory fake in tests.

pub mod buffer;
pub mod config;
pub mod congestion;
pub mod err;
pub mod host;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod util;
pub mod wire;

pub use config::{Args, Config, Role};
pub use err::Error;
pub use host::{EventLoop, UdpHost};
pub use session::{Engine, Host};
pub use wire::Variant;
