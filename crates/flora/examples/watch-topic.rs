//! Print every post on one topic until the broker goes away.
//!
//! Run with:
//!   cargo run --example watch-topic -- unix:/run/flora.sock volume.set

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use flora::{Caps, Client, ClientCallback, ClientConfig, MsgClass};

struct Printer {
    gone: Mutex<mpsc::Sender<()>>,
}

impl ClientCallback for Printer {
    fn on_broadcast(&self, name: &str, mut payload: Caps, class: MsgClass) {
        let mut entries = Vec::new();
        while let Ok(kind) = payload.peek_type() {
            let text = match kind {
                flora::caps::ValueType::I32 => payload.read_i32().map(|v| v.to_string()),
                flora::caps::ValueType::String => payload.read_string(),
                _ => break,
            };
            match text {
                Ok(text) => entries.push(text),
                Err(_) => break,
            }
        }
        println!("{name} [{class}] {}", entries.join(" "));
    }

    fn on_disconnect(&self) {
        if let Ok(gone) = self.gone.lock() {
            let _ = gone.send(());
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let uri = args
        .next()
        .unwrap_or_else(|| "unix:/run/flora.sock".to_string());
    let topic = args.next().unwrap_or_else(|| "volume.set".to_string());

    let (tx, rx) = mpsc::channel();
    let client = Client::new(ClientConfig::default());
    client.connect(
        &uri,
        Arc::new(Printer {
            gone: Mutex::new(tx),
        }),
    )?;
    client.subscribe(&topic, MsgClass::Instant)?;
    eprintln!("watching {topic} on {uri}");

    let _ = rx.recv();
    eprintln!("broker disconnected");
    Ok(())
}
