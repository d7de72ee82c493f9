//! A volume service: answers `volume.get` and applies `volume.set` posts.
//!
//! Run with:
//!   cargo run --example volume-service -- unix:/run/flora.sock
//!
//! Then, from another terminal:
//!   cargo run --features cli -- post unix:/run/flora.sock volume.set --value i32:40
//!   cargo run --features cli -- get unix:/run/flora.sock volume.get

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flora::{Agent, AgentConfig, Caps, Response};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let uri = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "unix:/run/flora.sock".to_string());
    let agent = Agent::new(AgentConfig {
        reconnect_interval: Duration::from_secs(2),
        ..AgentConfig::new(format!("{uri}#volume-service"))
    });

    let volume = Arc::new(AtomicI32::new(30));
    {
        let volume = Arc::clone(&volume);
        agent.subscribe("volume.set", move |_, mut payload| match payload.read_i32() {
            Ok(level) => {
                volume.store(level.clamp(0, 100), Ordering::SeqCst);
                eprintln!("volume set to {}", volume.load(Ordering::SeqCst));
            }
            Err(err) => eprintln!("ignoring volume.set: {err}"),
        })?;
    }
    {
        let volume = Arc::clone(&volume);
        agent.declare_method("volume.get", move |_, _| {
            let mut out = Caps::new();
            out.write_i32(volume.load(Ordering::SeqCst)).ok()?;
            Some(Response::ok(out))
        })?;
    }

    agent.start()?;
    eprintln!("volume service running against {uri}; Ctrl-C to stop");
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
