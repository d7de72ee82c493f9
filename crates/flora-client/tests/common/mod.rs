//! In-process broker and helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flora_caps::Caps;
use flora_client::{Client, ClientCallback, Message, MsgClass, Response};
use flora_frame::{command, Frame, FrameConfig, FrameReader, FrameWriter};
use flora_transport::{IpcStream, UnixDomainSocket};

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

pub fn make_sock_path(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/flora-{}-{}-{}",
        tag,
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir.join("broker.sock")
}

pub fn uri_for(path: &Path, extra: Option<&str>) -> String {
    match extra {
        Some(extra) => format!("unix:{}#{extra}", path.display()),
        None => format!("unix:{}", path.display()),
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrokerOptions {
    pub reject_auth: bool,
    /// Read AUTH but never answer it.
    pub silent_auth: bool,
    pub ping_on_connect: bool,
}

type SharedWriter = Arc<Mutex<FrameWriter<IpcStream>>>;

struct Peer {
    writer: SharedWriter,
    extra: String,
}

struct Route {
    requester: usize,
    id: i32,
    remaining: usize,
}

#[derive(Default)]
struct State {
    options: BrokerOptions,
    stop: AtomicBool,
    next_conn: AtomicUsize,
    next_request: AtomicI32,
    streams: Mutex<Vec<IpcStream>>,
    peers: Mutex<HashMap<usize, Peer>>,
    subscriptions: Mutex<HashSet<(usize, String, MsgClass)>>,
    routes: Mutex<HashMap<i32, Route>>,
    counts: Mutex<HashMap<u16, usize>>,
    auth_extras: Mutex<Vec<String>>,
}

impl State {
    fn count(&self, command: u16) {
        *self.counts.lock().unwrap().entry(command).or_default() += 1;
    }

    fn writer(&self, conn: usize) -> Option<SharedWriter> {
        self.peers
            .lock()
            .unwrap()
            .get(&conn)
            .map(|peer| Arc::clone(&peer.writer))
    }

    fn send(&self, conn: usize, msg: &Message) {
        if let Some(writer) = self.writer(conn) {
            let frame = msg.to_frame().expect("broker frame should encode");
            let _ = writer.lock().unwrap().write_frame(&frame);
        }
    }

    fn subscribers(&self, name: &str, class: MsgClass) -> Vec<usize> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, n, c)| n == name && *c == class)
            .map(|(conn, _, _)| *conn)
            .collect()
    }
}

/// A minimal broker: routes posts, fans requests out and collects replies.
pub struct MockBroker {
    path: PathBuf,
    state: Arc<State>,
    accept: Option<JoinHandle<()>>,
}

impl MockBroker {
    pub fn start(tag: &str) -> Self {
        Self::with_options(tag, BrokerOptions::default())
    }

    pub fn with_options(tag: &str, options: BrokerOptions) -> Self {
        Self::bind(make_sock_path(tag), options)
    }

    pub fn bind(path: PathBuf, options: BrokerOptions) -> Self {
        let listener = UnixDomainSocket::bind(&path).expect("broker should bind");
        let state = Arc::new(State {
            options,
            next_request: AtomicI32::new(1000),
            ..State::default()
        });

        let accept = {
            let state = Arc::clone(&state);
            thread::spawn(move || loop {
                let stream = match listener.accept() {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                if state.stop.load(Ordering::SeqCst) {
                    break;
                }
                let conn = state.next_conn.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&state);
                thread::spawn(move || serve(state, conn, stream));
            })
        };

        Self {
            path,
            state,
            accept: Some(accept),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uri(&self, extra: Option<&str>) -> String {
        uri_for(&self.path, extra)
    }

    pub fn count(&self, command: u16) -> usize {
        self.state
            .counts
            .lock()
            .unwrap()
            .get(&command)
            .copied()
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, name: &str, class: MsgClass) -> usize {
        self.state.subscribers(name, class).len()
    }

    pub fn peer_count(&self) -> usize {
        self.state.peers.lock().unwrap().len()
    }

    pub fn auth_extras(&self) -> Vec<String> {
        self.state.auth_extras.lock().unwrap().clone()
    }

    /// Drop every connection without a goodbye.
    pub fn kick_all(&self) {
        for stream in self.state.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown();
        }
    }

    pub fn send_disconnect_notice(&self) {
        self.broadcast(&Message::DisconnectNotice.to_frame().unwrap());
    }

    /// Send every peer a frame bigger than any client buffer.
    pub fn send_oversized(&self, len: usize) {
        self.broadcast(&Frame::new(command::DELIVER_POST, vec![0u8; len]));
    }

    fn broadcast(&self, frame: &Frame) {
        let writers: Vec<_> = self
            .state
            .peers
            .lock()
            .unwrap()
            .values()
            .map(|peer| Arc::clone(&peer.writer))
            .collect();
        for writer in writers {
            let _ = writer.lock().unwrap().write_frame(frame);
        }
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.state.stop.store(true, Ordering::SeqCst);
        self.kick_all();
        let _ = UnixDomainSocket::connect(&self.path);
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}

fn serve(state: Arc<State>, conn: usize, stream: IpcStream) {
    let config = FrameConfig {
        max_payload_size: usize::MAX,
        ..FrameConfig::default()
    };
    let Ok(control) = stream.try_clone() else {
        return;
    };
    let Ok(reader_stream) = stream.try_clone() else {
        return;
    };
    state.streams.lock().unwrap().push(control);
    let mut reader = FrameReader::with_config(reader_stream, config.clone());
    let writer: SharedWriter = Arc::new(Mutex::new(FrameWriter::with_config(stream, config)));

    let Ok(frame) = reader.read_frame() else {
        return;
    };
    state.count(frame.command);
    let Ok(Some(Message::Auth { extra, .. })) = Message::decode(&frame) else {
        return;
    };
    state.auth_extras.lock().unwrap().push(extra.clone());

    if state.options.silent_auth {
        while reader.read_frame().is_ok() {}
        return;
    }
    let code = if state.options.reject_auth { -1 } else { 0 };
    let result = Message::AuthResult { code }.to_frame().unwrap();
    if writer.lock().unwrap().write_frame(&result).is_err() || code != 0 {
        return;
    }

    state.peers.lock().unwrap().insert(
        conn,
        Peer {
            writer: Arc::clone(&writer),
            extra: extra.clone(),
        },
    );
    if state.options.ping_on_connect {
        state.send(conn, &Message::Ping);
    }

    while let Ok(frame) = reader.read_frame() {
        state.count(frame.command);
        let Ok(Some(msg)) = Message::decode(&frame) else {
            continue;
        };
        match msg {
            Message::Subscribe { name, class } => {
                state.subscriptions.lock().unwrap().insert((conn, name, class));
            }
            Message::Unsubscribe { name, class } => {
                state
                    .subscriptions
                    .lock()
                    .unwrap()
                    .remove(&(conn, name, class));
            }
            Message::Post {
                name,
                class,
                payload,
            } => {
                let out = Message::DeliverPost {
                    name: name.clone(),
                    class,
                    payload,
                };
                for target in state.subscribers(&name, class) {
                    state.send(target, &out);
                }
            }
            Message::Request {
                name,
                id,
                timeout_ms,
                payload,
            } => {
                let targets: Vec<_> = state
                    .subscribers(&name, MsgClass::Request)
                    .into_iter()
                    .filter(|target| *target != conn)
                    .collect();
                if targets.is_empty() {
                    state.send(conn, &Message::NoTarget { id });
                    continue;
                }
                let broker_id = state.next_request.fetch_add(1, Ordering::SeqCst);
                state.routes.lock().unwrap().insert(
                    broker_id,
                    Route {
                        requester: conn,
                        id,
                        remaining: targets.len(),
                    },
                );
                let out = Message::DeliverRequest {
                    name,
                    id: broker_id,
                    timeout_ms,
                    payload,
                };
                for target in targets {
                    state.send(target, &out);
                }
            }
            Message::Reply {
                id,
                ret_code,
                payload,
                ..
            } => {
                let routed = {
                    let mut routes = state.routes.lock().unwrap();
                    let Some(route) = routes.get_mut(&id) else {
                        continue;
                    };
                    route.remaining -= 1;
                    let done = route.remaining == 0;
                    let routed = (route.requester, route.id, done);
                    if done {
                        routes.remove(&id);
                    }
                    routed
                };
                let (requester, original, done) = routed;
                state.send(
                    requester,
                    &Message::DeliverReply {
                        id: original,
                        ret_code,
                        extra: extra.clone(),
                        payload,
                    },
                );
                if done {
                    state.send(requester, &Message::ReplyEnd { id: original });
                }
            }
            Message::Disconnect => break,
            _ => {}
        }
    }

    state.peers.lock().unwrap().remove(&conn);
    state
        .subscriptions
        .lock()
        .unwrap()
        .retain(|(owner, _, _)| *owner != conn);
}

/// A hand-driven client that subscribes to a request topic and never replies.
pub struct SilentPeer {
    _reader: FrameReader<IpcStream>,
    _writer: FrameWriter<IpcStream>,
}

impl SilentPeer {
    pub fn subscribe(path: &Path, topic: &str) -> Self {
        let stream = UnixDomainSocket::connect(path).expect("peer should connect");
        let mut reader = FrameReader::new(stream.try_clone().expect("stream should clone"));
        let mut writer = FrameWriter::new(stream);

        let auth = Message::Auth {
            version: 1,
            extra: "silent".to_string(),
            pid: 0,
        };
        writer
            .write_frame(&auth.to_frame().unwrap())
            .expect("AUTH should send");
        let result = reader.read_frame().expect("AUTH_RESULT should arrive");
        assert_eq!(result.command, command::AUTH_RESULT);

        let sub = Message::Subscribe {
            name: topic.to_string(),
            class: MsgClass::Request,
        };
        writer
            .write_frame(&sub.to_frame().unwrap())
            .expect("SUBSCRIBE should send");

        Self {
            _reader: reader,
            _writer: writer,
        }
    }
}

/// Records every callback; answers requests with `reply_code`, or not at
/// all when `declines` is set.
#[derive(Default)]
pub struct Recorder {
    pub reply_code: i32,
    pub declines: bool,
    /// Pause before answering a request.
    pub reply_delay: Duration,
    pub posts: Mutex<Vec<(String, MsgClass, Option<i32>)>>,
    pub requests: Mutex<Vec<String>>,
    pub disconnects: AtomicUsize,
    /// When set, `on_broadcast` tries a `get` and stores its result code.
    pub nested_get: Mutex<Option<Weak<Client>>>,
    pub nested_code: Mutex<Option<i32>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answering(reply_code: i32) -> Arc<Self> {
        Arc::new(Self {
            reply_code,
            ..Self::default()
        })
    }

    pub fn answering_after(reply_code: i32, reply_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply_code,
            reply_delay,
            ..Self::default()
        })
    }

    pub fn declining() -> Arc<Self> {
        Arc::new(Self {
            declines: true,
            ..Self::default()
        })
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl ClientCallback for Recorder {
    fn on_broadcast(&self, name: &str, mut payload: Caps, class: MsgClass) {
        let value = payload.read_i32().ok();
        self.posts
            .lock()
            .unwrap()
            .push((name.to_string(), class, value));

        let client = self.nested_get.lock().unwrap().as_ref().and_then(Weak::upgrade);
        if let Some(client) = client {
            let code = match client.get("nested", &Caps::new(), Duration::from_millis(10)) {
                Ok(response) => response.code(),
                Err(err) => err.code(),
            };
            *self.nested_code.lock().unwrap() = Some(code);
        }
    }

    fn on_request(&self, name: &str, _payload: Caps) -> Option<Response> {
        self.requests.lock().unwrap().push(name.to_string());
        if self.declines {
            return None;
        }
        thread::sleep(self.reply_delay);
        let mut out = Caps::new();
        out.write_i32(self.reply_code).unwrap();
        Some(Response::new(self.reply_code, out))
    }

    fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn int_payload(value: i32) -> Caps {
    let mut caps = Caps::new();
    caps.write_i32(value).unwrap();
    caps
}

/// A payload `depth` levels deep whose outermost entry is `depth` as i32.
pub fn nested_payload(depth: usize) -> Caps {
    let mut caps = Caps::new();
    caps.write_i32(depth as i32).unwrap();
    if depth > 1 {
        caps.write_caps(nested_payload(depth - 1)).unwrap();
    }
    caps
}
