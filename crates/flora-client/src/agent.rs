use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flora_caps::Caps;
use tracing::{debug, info, warn};

use crate::callback::ClientCallback;
use crate::client::{Client, GetResponse};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::message::{MsgClass, Response};

/// Handler for posts on one topic.
pub type PostHandler = Arc<dyn Fn(&str, Caps) + Send + Sync>;

/// Handler for requests on one topic.
pub type MethodHandler = Arc<dyn Fn(&str, Caps) -> Option<Response> + Send + Sync>;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub uri: String,
    pub client: ClientConfig,
    /// Pause between reconnect attempts.
    pub reconnect_interval: Duration,
}

impl AgentConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client: ClientConfig::default(),
            reconnect_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Default)]
struct Handlers {
    posts: HashMap<String, PostHandler>,
    methods: HashMap<String, MethodHandler>,
}

#[derive(Default)]
struct Shared {
    handlers: RwLock<Handlers>,
    /// Set when the worker should re-check the connection.
    wake: Mutex<bool>,
    wake_cond: Condvar,
    running: AtomicBool,
}

impl Shared {
    fn notify(&self) {
        *self.wake.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake_cond.notify_all();
    }

    /// Sleep until notified or `timeout` passes.
    fn sleep(&self, timeout: Duration) {
        let wake = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut wake, _) = self
            .wake_cond
            .wait_timeout_while(wake, timeout, |woken| !*woken)
            .unwrap_or_else(PoisonError::into_inner);
        *wake = false;
    }

    fn post_handler(&self, name: &str) -> Option<PostHandler> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.posts.get(name).cloned()
    }

    fn method_handler(&self, name: &str) -> Option<MethodHandler> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.methods.get(name).cloned()
    }

    fn topics(&self) -> Vec<(String, MsgClass)> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers
            .posts
            .keys()
            .map(|name| (name.clone(), MsgClass::Instant))
            .chain(
                handlers
                    .methods
                    .keys()
                    .map(|name| (name.clone(), MsgClass::Request)),
            )
            .collect()
    }
}

struct AgentCallback {
    shared: Arc<Shared>,
}

impl ClientCallback for AgentCallback {
    fn on_broadcast(&self, name: &str, payload: Caps, _class: MsgClass) {
        match self.shared.post_handler(name) {
            Some(handler) => handler(name, payload),
            None => debug!(topic = name, "no post handler"),
        }
    }

    fn on_request(&self, name: &str, payload: Caps) -> Option<Response> {
        let handler = self.shared.method_handler(name)?;
        handler(name, payload)
    }

    fn on_disconnect(&self) {
        self.shared.notify();
    }
}

/// A client that stays connected.
///
/// Handlers registered on the agent survive reconnects: after every
/// successful connect the agent subscribes them again. The background
/// worker starts with [`Agent::start`] and stops with [`Agent::close`].
pub struct Agent {
    config: AgentConfig,
    client: Arc<Client>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let client = Arc::new(Client::new(config.client.clone()));
        Self {
            config,
            client,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Handle posts on `name`. Replaces any earlier handler for the topic.
    pub fn subscribe<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&str, Caps) + Send + Sync + 'static,
    {
        check_name(name)?;
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .posts
            .insert(name.to_string(), Arc::new(handler));
        self.sync_subscription(name, MsgClass::Instant);
        Ok(())
    }

    /// Answer requests on `name`. Replaces any earlier handler for the topic.
    pub fn declare_method<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&str, Caps) -> Option<Response> + Send + Sync + 'static,
    {
        check_name(name)?;
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .methods
            .insert(name.to_string(), Arc::new(handler));
        self.sync_subscription(name, MsgClass::Request);
        Ok(())
    }

    pub fn unsubscribe(&self, name: &str) {
        let removed = self
            .shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .posts
            .remove(name);
        if removed.is_some() {
            self.drop_subscription(name, MsgClass::Instant);
        }
    }

    pub fn remove_method(&self, name: &str) {
        let removed = self
            .shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .methods
            .remove(name);
        if removed.is_some() {
            self.drop_subscription(name, MsgClass::Request);
        }
    }

    fn sync_subscription(&self, name: &str, class: MsgClass) {
        if !self.client.is_connected() {
            return;
        }
        if let Err(err) = self.client.subscribe(name, class) {
            debug!(topic = name, error = %err, "subscribe deferred to reconnect");
        }
    }

    fn drop_subscription(&self, name: &str, class: MsgClass) {
        if !self.client.is_connected() {
            return;
        }
        if let Err(err) = self.client.unsubscribe(name, class) {
            debug!(topic = name, error = %err, "unsubscribe failed");
        }
    }

    /// Start the background connect/reconnect worker. Idempotent.
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let worker = Worker {
            uri: self.config.uri.clone(),
            interval: self.config.reconnect_interval,
            client: Arc::clone(&self.client),
            shared: Arc::clone(&self.shared),
        };
        let handle = thread::Builder::new()
            .name("flora-agent".to_string())
            .spawn(move || worker.run())
            .map_err(|err| {
                self.shared.running.store(false, Ordering::Release);
                ClientError::Connection(format!("spawning agent worker: {err}"))
            })?;
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Stop the worker and disconnect. Handlers stay registered, so a later
    /// `start` resumes with the same subscriptions.
    pub fn close(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.notify();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("agent worker panicked");
            }
        }
        self.client.destroy();
        info!(uri = %self.config.uri, "agent closed");
    }

    pub fn post(&self, name: &str, payload: &Caps, class: MsgClass) -> Result<()> {
        self.client.post(name, payload, class)
    }

    pub fn get(&self, name: &str, payload: &Caps, timeout: Duration) -> Result<GetResponse> {
        self.client.get(name, payload, timeout)
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ClientError::InvalidParam("topic name is empty".to_string()));
    }
    Ok(())
}

struct Worker {
    uri: String,
    interval: Duration,
    client: Arc<Client>,
    shared: Arc<Shared>,
}

impl Worker {
    fn run(self) {
        debug!(uri = %self.uri, "agent worker started");
        while self.shared.running.load(Ordering::Acquire) {
            if self.client.is_connected() {
                self.shared.sleep(self.interval);
                continue;
            }

            match self.connect() {
                Ok(()) => info!(uri = %self.uri, "agent connected"),
                Err(err) => {
                    warn!(uri = %self.uri, error = %err, "agent connect failed");
                    self.client.destroy();
                    self.shared.sleep(self.interval);
                }
            }
        }
        debug!(uri = %self.uri, "agent worker stopped");
    }

    fn connect(&self) -> Result<()> {
        // Reap whatever the last connection left behind.
        self.client.destroy();
        let callback = Arc::new(AgentCallback {
            shared: Arc::clone(&self.shared),
        });
        self.client.connect(&self.uri, callback)?;
        for (name, class) in self.shared.topics() {
            self.client.subscribe(&name, class)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AgentConfig::new("unix:/tmp/flora.sock");
        assert_eq!(config.reconnect_interval, Duration::from_secs(10));
        assert_eq!(config.uri, "unix:/tmp/flora.sock");
    }

    #[test]
    fn handlers_are_kept_while_disconnected() {
        let agent = Agent::new(AgentConfig::new("unix:/nonexistent/flora.sock"));
        agent.subscribe("a", |_, _| {}).unwrap();
        agent.declare_method("b", |_, _| None).unwrap();

        let mut topics = agent.shared.topics();
        topics.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(
            topics,
            vec![
                ("a".to_string(), MsgClass::Instant),
                ("b".to_string(), MsgClass::Request)
            ]
        );

        agent.unsubscribe("a");
        agent.remove_method("b");
        assert!(agent.shared.topics().is_empty());
    }

    #[test]
    fn empty_topic_rejected() {
        let agent = Agent::new(AgentConfig::new("unix:/nonexistent/flora.sock"));
        assert_eq!(agent.subscribe("", |_, _| {}).unwrap_err().code(), -2);
    }

    #[test]
    fn operations_fail_while_disconnected() {
        let agent = Agent::new(AgentConfig::new("unix:/nonexistent/flora.sock"));
        let err = agent
            .post("x", &Caps::new(), MsgClass::Instant)
            .unwrap_err();
        assert_eq!(err.code(), -3);
    }

    #[test]
    fn callback_routes_by_topic() {
        let shared = Arc::new(Shared::default());
        shared
            .handlers
            .write()
            .unwrap()
            .methods
            .insert("sum".into(), Arc::new(|_: &str, mut caps: Caps| {
                let total = caps.read_i32().unwrap() + caps.read_i32().unwrap();
                let mut out = Caps::new();
                out.write_i32(total).unwrap();
                Some(Response::ok(out))
            }));
        let callback = AgentCallback {
            shared: Arc::clone(&shared),
        };

        let mut args = Caps::new();
        args.write_i32(2).unwrap();
        args.write_i32(3).unwrap();
        let args = Caps::parse_bytes(args.serialize().unwrap()).unwrap();
        let response = callback.on_request("sum", args).unwrap();
        let mut out = Caps::parse_bytes(response.payload.serialize().unwrap()).unwrap();
        assert_eq!(out.read_i32().unwrap(), 5);
        assert!(callback.on_request("other", Caps::new()).is_none());
    }
}
