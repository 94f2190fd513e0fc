//! Listens on a UDP socket and serves every peer that sends it a
//! datagram, each as an independent session (spec §6 "server" role).

use clap::Parser;

use rdt::config::{Args, Role};
use rdt::EventLoop;

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .init();

    let config = args.to_config(Role::Receiver);
    let tick = config.timeout / 4;

    let mut event_loop = match EventLoop::bind(args.bind, config, tick) {
        Ok(event_loop) => event_loop,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    event_loop.run_forever();
}
