use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use flora_caps::Caps;
use flora_client::{ClientCallback, MsgClass, Response};
use tracing::info;

use crate::cmd::{connect, ListenArgs};
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_delivery, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

enum Event {
    Delivery {
        topic: String,
        class: MsgClass,
        payload: Caps,
    },
    Disconnected,
}

struct Forward {
    events: Mutex<Sender<Event>>,
}

impl Forward {
    fn send(&self, event: Event) {
        let _ = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(event);
    }
}

impl ClientCallback for Forward {
    fn on_broadcast(&self, name: &str, payload: Caps, class: MsgClass) {
        self.send(Event::Delivery {
            topic: name.to_string(),
            class,
            payload,
        });
    }

    fn on_request(&self, name: &str, payload: Caps) -> Option<Response> {
        self.send(Event::Delivery {
            topic: name.to_string(),
            class: MsgClass::Request,
            payload,
        });
        None
    }

    fn on_disconnect(&self) {
        self.send(Event::Disconnected);
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let (tx, rx) = mpsc::channel();
    let callback = Arc::new(Forward {
        events: Mutex::new(tx),
    });
    let client = connect(&args.uri, callback)?;

    let class = if args.request {
        MsgClass::Request
    } else {
        MsgClass::Instant
    };
    for topic in &args.topics {
        client
            .subscribe(topic, class)
            .map_err(|err| client_error("subscribe failed", err))?;
    }
    info!(topics = args.topics.len(), %class, "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let event = match rx.recv_timeout(POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            Event::Delivery {
                topic,
                class,
                payload,
            } => {
                print_delivery(&topic, class, payload, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Event::Disconnected => {
                return Err(CliError::new(TRANSPORT_ERROR, "broker closed the connection"));
            }
        }
    }

    client.destroy();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
