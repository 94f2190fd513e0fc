//! Connects to a peer over UDP, streams stdin to it, and exits once the
//! session quiesces (spec §6 "client" role).

use clap::Parser;

use rdt::config::{Args, Role};
use rdt::{Error, EventLoop};

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .init();

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    let peer = args.peer.ok_or(Error::NoPeer)?;
    let config = args.to_config(Role::Sender);
    let tick = config.timeout / 4;

    let mut event_loop = EventLoop::bind(args.bind, config, tick)?;
    event_loop.connect(peer);
    event_loop.run_until_done(peer);
    Ok(())
}
