use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use flora_caps::Caps;
use flora_frame::{command, Frame, FrameError, FrameReader, FrameWriter};
use flora_transport::{BrokerUri, IpcStream};
use tracing::{debug, info, warn};

use crate::callback::ClientCallback;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result, SUCCESS};
use crate::handshake::{authenticate, AuthRequest};
use crate::message::{post_body, reply_body, request_body, subscription_body, Message, MsgClass, Reply};
use crate::pending::{Outcome, PendingTable};
use crate::subscription::SubscriptionTable;

/// Lifecycle of a client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Replies collected by [`Client::get`].
#[derive(Debug)]
pub struct GetResponse {
    /// Replies in arrival order.
    pub replies: Vec<Reply>,
    /// The deadline passed before the broker reported the end of replies.
    pub timed_out: bool,
}

impl GetResponse {
    /// `Success`, or `Timeout` when the deadline cut collection short.
    pub fn code(&self) -> i32 {
        if self.timed_out {
            ClientError::Timeout.code()
        } else {
            SUCCESS
        }
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

const LIVE: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Upper bound for a single `get` wait.
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// State shared between the application threads and one receive thread.
struct Connection {
    uri: String,
    writer: Mutex<FrameWriter<IpcStream>>,
    stream: IpcStream,
    subscriptions: RwLock<SubscriptionTable>,
    /// Serializes subscribe/unsubscribe so the table lock is never held
    /// across a socket write.
    subscription_changes: Mutex<()>,
    pending: PendingTable,
    callback: Arc<dyn ClientCallback>,
    state: AtomicU8,
    recv_thread: OnceLock<ThreadId>,
}

impl Connection {
    fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            LIVE => ConnectionState::Connected,
            CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Disconnected,
        }
    }

    fn is_connected(&self) -> bool {
        self.state.load(Ordering::Acquire) == LIVE
    }

    fn on_receive_thread(&self) -> bool {
        self.recv_thread.get() == Some(&thread::current().id())
    }

    fn subscriptions(&self) -> RwLockReadGuard<'_, SubscriptionTable> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions_mut(&self) -> RwLockWriteGuard<'_, SubscriptionTable> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription_changes(&self) -> MutexGuard<'_, ()> {
        self.subscription_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one frame. A failed write may leave a partial frame on the
    /// wire, so the stream is shut down and the receive thread reports
    /// the loss.
    fn send(&self, command: u16, body: &Caps) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer.send_caps(command, body) {
            Ok(()) => Ok(()),
            Err(err @ (FrameError::Io(_) | FrameError::ConnectionClosed)) => {
                warn!(uri = %self.uri, error = %err, "write failed, dropping connection");
                if let Err(shutdown) = self.stream.shutdown() {
                    debug!(error = %shutdown, "shutdown after failed write failed");
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Move from live to closing. False if someone else got there first.
    fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(LIVE, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Tear the connection down. Returns true only for the caller that
    /// found it live, which is then responsible for `on_disconnect`.
    fn close(&self) -> bool {
        let prev = self.state.swap(CLOSED, Ordering::AcqRel);
        if prev == CLOSED {
            return false;
        }
        self.pending.close();
        if let Err(err) = self.stream.shutdown() {
            debug!(error = %err, "shutdown after close failed");
        }
        prev == LIVE
    }

    fn dispatch(&self, frame: &Frame) -> ControlFlow<String> {
        let message = match Message::decode(frame) {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(command = frame.command, "dropping frame with unknown command");
                return ControlFlow::Continue(());
            }
            Err(err) => {
                warn!(command = frame.command_name(), error = %err, "dropping malformed frame");
                return ControlFlow::Continue(());
            }
        };

        match message {
            Message::DeliverPost {
                name,
                class,
                payload,
            } => {
                if self.subscriptions().contains(&name, class) {
                    self.callback.on_broadcast(&name, payload, class);
                } else {
                    debug!(topic = %name, %class, "dropping post for unsubscribed topic");
                }
            }
            Message::DeliverRequest {
                name, id, payload, ..
            } => {
                if !self.subscriptions().contains(&name, MsgClass::Request) {
                    debug!(topic = %name, id, "dropping request for unsubscribed topic");
                    return ControlFlow::Continue(());
                }
                let response = self.callback.on_request(&name, payload).unwrap_or_default();
                let sent = reply_body(id, response.ret_code, "", &response.payload)
                    .map_err(ClientError::from)
                    .and_then(|body| self.send(command::REPLY, &body));
                if let Err(err) = sent {
                    warn!(topic = %name, id, error = %err, "failed to send reply");
                }
            }
            Message::DeliverReply {
                id,
                ret_code,
                extra,
                payload,
            } => {
                let reply = Reply {
                    ret_code,
                    extra: (!extra.is_empty()).then_some(extra),
                    payload,
                };
                if !self.pending.push_reply(id, reply) {
                    debug!(id, "dropping reply for unknown request");
                }
            }
            Message::ReplyEnd { id } => {
                if !self.pending.finish(id, Outcome::Complete) {
                    debug!(id, "REPLY_END for unknown request");
                }
            }
            Message::NoTarget { id } => {
                if !self.pending.finish(id, Outcome::NoTarget) {
                    debug!(id, "NO_TARGET for unknown request");
                }
            }
            Message::Ping => {
                if let Err(err) = self.send(command::PONG, &Caps::new()) {
                    warn!(error = %err, "failed to answer PING");
                }
            }
            Message::DisconnectNotice => {
                return ControlFlow::Break("broker sent DISCONNECT".to_string());
            }
            _ => {
                warn!(command = frame.command_name(), "unexpected command from broker");
            }
        }
        ControlFlow::Continue(())
    }
}

fn receive_loop(conn: Arc<Connection>, mut reader: FrameReader<IpcStream>) {
    let _ = conn.recv_thread.set(thread::current().id());

    let reason = loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => break "broker closed the connection".to_string(),
            Err(err) => break err.to_string(),
        };
        if let ControlFlow::Break(reason) = conn.dispatch(&frame) {
            break reason;
        }
    };

    if conn.close() {
        info!(uri = %conn.uri, %reason, "connection lost");
        conn.callback.on_disconnect();
    } else {
        debug!(uri = %conn.uri, "receive thread stopped");
    }
}

fn join_unless_current(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        warn!("receive thread panicked");
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ClientError::InvalidParam("topic name is empty".to_string()));
    }
    Ok(())
}

#[derive(Default)]
struct Slot {
    conn: Option<Arc<Connection>>,
    recv: Option<JoinHandle<()>>,
    connecting: bool,
}

/// A connection to a flora broker.
///
/// One client holds at most one live connection. All methods take `&self`
/// and may be called from any thread; share the client with `Arc`.
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use flora_caps::Caps;
/// use flora_client::{Client, ClientConfig, MsgClass, NoopCallback};
///
/// let client = Client::new(ClientConfig::default());
/// client.connect("unix:/run/flora.sock#player", Arc::new(NoopCallback))?;
///
/// let mut volume = Caps::new();
/// volume.write_i32(30)?;
/// client.post("volume.changed", &volume, MsgClass::Instant)?;
///
/// let answer = client.get("volume.get", &Caps::new(), Duration::from_millis(500))?;
/// for reply in answer.replies {
///     println!("{:?} answered {}", reply.extra, reply.ret_code);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Client {
    config: ClientConfig,
    slot: Mutex<Slot>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        let slot = self.lock_slot();
        if slot.connecting {
            return ConnectionState::Connecting;
        }
        slot.conn
            .as_ref()
            .map_or(ConnectionState::Disconnected, |conn| conn.state())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connect and authenticate, then start delivering inbound events to
    /// `callback`.
    ///
    /// Fails with `InvalidParam` while a connection is live; call
    /// [`Client::destroy`] first.
    pub fn connect(&self, uri: &str, callback: Arc<dyn ClientCallback>) -> Result<()> {
        if uri.is_empty() {
            return Err(ClientError::InvalidParam("empty uri".to_string()));
        }
        let uri = BrokerUri::parse(uri)?;

        let stale = {
            let mut slot = self.lock_slot();
            let live = slot
                .conn
                .as_ref()
                .is_some_and(|conn| conn.state() != ConnectionState::Disconnected);
            if slot.connecting || live {
                return Err(ClientError::InvalidParam(
                    "client is already connected".to_string(),
                ));
            }
            slot.connecting = true;
            slot.conn = None;
            slot.recv.take()
        };
        if let Some(handle) = stale {
            join_unless_current(handle);
        }

        let opened = self.open(&uri, callback);

        let mut slot = self.lock_slot();
        slot.connecting = false;
        let (conn, handle) = opened?;
        slot.conn = Some(conn);
        slot.recv = Some(handle);
        Ok(())
    }

    fn open(
        &self,
        uri: &BrokerUri,
        callback: Arc<dyn ClientCallback>,
    ) -> Result<(Arc<Connection>, JoinHandle<()>)> {
        let stream = flora_transport::connect(uri)?;
        let control = stream.try_clone()?;
        let reader_stream = stream.try_clone()?;

        let frame_config = self.config.frame_config();
        let mut reader = FrameReader::with_config_ipc(reader_stream, frame_config.clone())?;
        let mut writer = FrameWriter::with_config_ipc(stream, frame_config)?;

        let auth = AuthRequest::new(self.config.protocol_version, uri.extra.as_deref());
        authenticate(&mut reader, &mut writer, &auth, self.config.auth_timeout)?;
        reader.get_ref().set_read_timeout(None)?;

        let conn = Arc::new(Connection {
            uri: uri.to_string(),
            writer: Mutex::new(writer),
            stream: control,
            subscriptions: RwLock::new(SubscriptionTable::new()),
            subscription_changes: Mutex::new(()),
            pending: PendingTable::new(),
            callback,
            state: AtomicU8::new(LIVE),
            recv_thread: OnceLock::new(),
        });

        let handle = thread::Builder::new()
            .name("flora-recv".to_string())
            .spawn({
                let conn = Arc::clone(&conn);
                move || receive_loop(conn, reader)
            })
            .map_err(|err| ClientError::Connection(format!("spawning receive thread: {err}")))?;

        info!(
            uri = %uri,
            transport = conn.stream.transport_name(),
            "connected to broker"
        );
        Ok((conn, handle))
    }

    /// Close the connection. Pending `get` calls fail with `Connection`;
    /// `on_disconnect` is not called. A no-op when not connected.
    pub fn destroy(&self) {
        let (conn, handle) = {
            let mut slot = self.lock_slot();
            (slot.conn.take(), slot.recv.take())
        };

        if let Some(conn) = conn {
            if conn.begin_close() {
                if let Err(err) = conn.send(command::DISCONNECT, &Caps::new()) {
                    debug!(error = %err, "DISCONNECT not delivered");
                }
                info!(uri = %conn.uri, "disconnected from broker");
            }
            conn.close();
        }
        if let Some(handle) = handle {
            join_unless_current(handle);
        }
    }

    fn live(&self) -> Result<Arc<Connection>> {
        let slot = self.lock_slot();
        match &slot.conn {
            Some(conn) if conn.is_connected() => Ok(Arc::clone(conn)),
            _ => Err(ClientError::not_connected()),
        }
    }

    /// Register interest in `(name, class)`. Subscribing twice is a no-op.
    pub fn subscribe(&self, name: &str, class: MsgClass) -> Result<()> {
        check_name(name)?;
        let conn = self.live()?;
        let _changing = conn.subscription_changes();
        if conn.subscriptions().contains(name, class) {
            return Ok(());
        }
        conn.send(command::SUBSCRIBE, &subscription_body(name, class)?)?;
        conn.subscriptions_mut().insert(name, class);
        debug!(topic = name, %class, "subscribed");
        Ok(())
    }

    /// Drop interest in `(name, class)`. Unknown pairs are a no-op.
    pub fn unsubscribe(&self, name: &str, class: MsgClass) -> Result<()> {
        check_name(name)?;
        let conn = self.live()?;
        let _changing = conn.subscription_changes();
        if !conn.subscriptions().contains(name, class) {
            return Ok(());
        }
        conn.send(command::UNSUBSCRIBE, &subscription_body(name, class)?)?;
        conn.subscriptions_mut().remove(name, class);
        debug!(topic = name, %class, "unsubscribed");
        Ok(())
    }

    pub fn is_subscribed(&self, name: &str, class: MsgClass) -> bool {
        self.live()
            .map(|conn| conn.subscriptions().contains(name, class))
            .unwrap_or(false)
    }

    /// Publish `payload` on `name`. Nothing is retained locally.
    ///
    /// The message body wraps the payload one level deep, so payloads may
    /// nest at most `MAX_DEPTH - 1` levels; deeper ones fail with
    /// `InvalidParam` before anything is sent. The same holds for `get`.
    pub fn post(&self, name: &str, payload: &Caps, class: MsgClass) -> Result<()> {
        check_name(name)?;
        let conn = self.live()?;
        conn.send(command::POST, &post_body(name, class, payload)?)?;
        debug!(topic = name, %class, "posted");
        Ok(())
    }

    /// Send a request and block until every target has replied, the broker
    /// reports no target, the connection drops, or `timeout` passes.
    ///
    /// A timeout is not an error: the response carries whatever replies
    /// arrived, with `timed_out` set.
    pub fn get(&self, name: &str, payload: &Caps, timeout: Duration) -> Result<GetResponse> {
        check_name(name)?;
        let conn = self.live()?;
        if conn.on_receive_thread() {
            return Err(ClientError::InvalidParam(
                "get cannot be called from a client callback".to_string(),
            ));
        }

        let (id, pending) = conn
            .pending
            .register()
            .ok_or_else(ClientError::not_connected)?;
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let sent = request_body(name, id, timeout_ms, payload)
            .map_err(ClientError::from)
            .and_then(|body| conn.send(command::REQUEST, &body));
        if let Err(err) = sent {
            conn.pending.remove(id);
            return Err(err);
        }
        debug!(topic = name, id, ?timeout, "request sent");

        let deadline = Instant::now() + timeout.min(MAX_WAIT);
        let (replies, outcome) = pending.wait(deadline);
        conn.pending.remove(id);

        match outcome {
            None => {
                debug!(topic = name, id, replies = replies.len(), "request timed out");
                Ok(GetResponse {
                    replies,
                    timed_out: true,
                })
            }
            Some(Outcome::Complete) => Ok(GetResponse {
                replies,
                timed_out: false,
            }),
            Some(Outcome::NoTarget) => Err(ClientError::NoTarget(name.to_string())),
            Some(Outcome::Closed) => Err(ClientError::Connection(
                "connection closed while waiting for replies".to_string(),
            )),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::NoopCallback;

    #[test]
    fn fresh_client_is_disconnected() {
        let client = Client::default();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_subscribed("a", MsgClass::Instant));
        client.destroy();
    }

    #[test]
    fn operations_need_a_connection() {
        let client = Client::default();
        let payload = Caps::new();
        assert_eq!(client.subscribe("a", MsgClass::Instant).unwrap_err().code(), -3);
        assert_eq!(client.unsubscribe("a", MsgClass::Instant).unwrap_err().code(), -3);
        assert_eq!(client.post("a", &payload, MsgClass::Instant).unwrap_err().code(), -3);
        assert_eq!(
            client.get("a", &payload, Duration::ZERO).unwrap_err().code(),
            -3
        );
    }

    #[test]
    fn empty_name_is_invalid_even_when_disconnected() {
        let client = Client::default();
        let err = client.post("", &Caps::new(), MsgClass::Instant).unwrap_err();
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn bad_uris_are_invalid_param() {
        let client = Client::default();
        for uri in ["", "http://host/", "tcp://host", "unix:"] {
            let err = client.connect(uri, Arc::new(NoopCallback)).unwrap_err();
            assert_eq!(err.code(), -2, "{uri}: {err}");
        }
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn unreachable_broker_is_connection_error() {
        let client = Client::default();
        let path = std::env::temp_dir().join(format!("flora-none-{}.sock", std::process::id()));
        let err = client
            .connect(&format!("unix:{}", path.display()), Arc::new(NoopCallback))
            .unwrap_err();
        assert_eq!(err.code(), -3, "{err}");
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn timed_out_response_reports_timeout_code() {
        let response = GetResponse {
            replies: Vec::new(),
            timed_out: true,
        };
        assert_eq!(response.code(), -4);
        assert!(response.is_empty());
    }
}
