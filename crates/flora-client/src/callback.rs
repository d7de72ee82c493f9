use flora_caps::Caps;

use crate::message::{MsgClass, Response};

/// Inbound event handlers for a [`crate::Client`] connection.
///
/// All methods run on the connection's receive thread, one at a time, in
/// frame order. They should return promptly. Handlers may `post`,
/// `subscribe` or `unsubscribe`; calling `get` from a handler fails with
/// `InvalidParam`.
pub trait ClientCallback: Send + Sync {
    /// A POST arrived on a subscribed (topic, class) pair.
    fn on_broadcast(&self, name: &str, payload: Caps, class: MsgClass) {
        let _ = (name, payload, class);
    }

    /// A REQUEST arrived on a subscribed request topic. `None` answers with
    /// an empty `Success` reply.
    fn on_request(&self, name: &str, payload: Caps) -> Option<Response> {
        let _ = (name, payload);
        None
    }

    /// The broker side went away. Not called for a local `destroy`.
    fn on_disconnect(&self) {}
}

/// A callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl ClientCallback for NoopCallback {}
