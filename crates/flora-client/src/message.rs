//! Protocol messages and their Caps layouts.
//!
//! The client encodes outbound bodies straight from borrowed payloads with
//! the `*_body` functions. [`Message`] is the owned, decoded form of any
//! frame in either direction.

use std::fmt;

use flora_caps::{Caps, CapsError, Result};
use flora_frame::{command, Frame, FrameError};

/// Delivery class of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgClass {
    /// Fire-and-forget broadcast.
    Instant,
    /// Service-style call that expects replies.
    Request,
}

impl MsgClass {
    pub const fn to_wire(self) -> i32 {
        match self {
            MsgClass::Instant => 0,
            MsgClass::Request => 2,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self> {
        match value {
            0 => Ok(MsgClass::Instant),
            2 => Ok(MsgClass::Request),
            _ => Err(CapsError::InvalidParam("unknown message class")),
        }
    }
}

impl fmt::Display for MsgClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MsgClass::Instant => "instant",
            MsgClass::Request => "request",
        })
    }
}

/// One answer to a `get`.
#[derive(Debug)]
pub struct Reply {
    /// Result code chosen by the replier.
    pub ret_code: i32,
    /// Identity tag of the replier, as announced to the broker.
    pub extra: Option<String>,
    pub payload: Caps,
}

/// What an `on_request` handler sends back.
#[derive(Debug)]
pub struct Response {
    pub ret_code: i32,
    pub payload: Caps,
}

impl Response {
    pub fn new(ret_code: i32, payload: Caps) -> Self {
        Self { ret_code, payload }
    }

    /// A `Success` response carrying `payload`.
    pub fn ok(payload: Caps) -> Self {
        Self::new(crate::error::SUCCESS, payload)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok(Caps::new())
    }
}

/// A decoded protocol frame.
#[derive(Debug)]
pub enum Message {
    Auth { version: i32, extra: String, pid: i32 },
    Subscribe { name: String, class: MsgClass },
    Unsubscribe { name: String, class: MsgClass },
    Post { name: String, class: MsgClass, payload: Caps },
    Request { name: String, id: i32, timeout_ms: i64, payload: Caps },
    Reply { id: i32, ret_code: i32, extra: String, payload: Caps },
    Pong,
    Disconnect,
    AuthResult { code: i32 },
    DeliverPost { name: String, class: MsgClass, payload: Caps },
    DeliverRequest { name: String, id: i32, timeout_ms: i64, payload: Caps },
    DeliverReply { id: i32, ret_code: i32, extra: String, payload: Caps },
    ReplyEnd { id: i32 },
    NoTarget { id: i32 },
    DisconnectNotice,
    Ping,
}

impl Message {
    /// Decode a frame. Returns `Ok(None)` for unknown command IDs.
    pub fn decode(frame: &Frame) -> std::result::Result<Option<Self>, FrameError> {
        let mut body = frame.caps()?;
        let body = &mut body;
        let msg = match frame.command {
            command::AUTH => Message::Auth {
                version: body.read_i32()?,
                extra: body.read_string()?,
                pid: body.read_i32()?,
            },
            command::SUBSCRIBE => Message::Subscribe {
                name: body.read_string()?,
                class: MsgClass::from_wire(body.read_i32()?)?,
            },
            command::UNSUBSCRIBE => Message::Unsubscribe {
                name: body.read_string()?,
                class: MsgClass::from_wire(body.read_i32()?)?,
            },
            command::POST => {
                let (name, class, payload) = read_post(body)?;
                Message::Post {
                    name,
                    class,
                    payload,
                }
            }
            command::REQUEST => {
                let (name, id, timeout_ms, payload) = read_request(body)?;
                Message::Request {
                    name,
                    id,
                    timeout_ms,
                    payload,
                }
            }
            command::REPLY => {
                let (id, ret_code, extra, payload) = read_reply(body)?;
                Message::Reply {
                    id,
                    ret_code,
                    extra,
                    payload,
                }
            }
            command::PONG => Message::Pong,
            command::DISCONNECT => Message::Disconnect,
            command::AUTH_RESULT => Message::AuthResult {
                code: body.read_i32()?,
            },
            command::DELIVER_POST => {
                let (name, class, payload) = read_post(body)?;
                Message::DeliverPost {
                    name,
                    class,
                    payload,
                }
            }
            command::DELIVER_REQUEST => {
                let (name, id, timeout_ms, payload) = read_request(body)?;
                Message::DeliverRequest {
                    name,
                    id,
                    timeout_ms,
                    payload,
                }
            }
            command::DELIVER_REPLY => {
                let (id, ret_code, extra, payload) = read_reply(body)?;
                Message::DeliverReply {
                    id,
                    ret_code,
                    extra,
                    payload,
                }
            }
            command::REPLY_END => Message::ReplyEnd {
                id: body.read_i32()?,
            },
            command::NO_TARGET => Message::NoTarget {
                id: body.read_i32()?,
            },
            command::DISCONNECT_NOTICE => Message::DisconnectNotice,
            command::PING => Message::Ping,
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }

    /// Command ID this message travels under.
    pub fn command(&self) -> u16 {
        match self {
            Message::Auth { .. } => command::AUTH,
            Message::Subscribe { .. } => command::SUBSCRIBE,
            Message::Unsubscribe { .. } => command::UNSUBSCRIBE,
            Message::Post { .. } => command::POST,
            Message::Request { .. } => command::REQUEST,
            Message::Reply { .. } => command::REPLY,
            Message::Pong => command::PONG,
            Message::Disconnect => command::DISCONNECT,
            Message::AuthResult { .. } => command::AUTH_RESULT,
            Message::DeliverPost { .. } => command::DELIVER_POST,
            Message::DeliverRequest { .. } => command::DELIVER_REQUEST,
            Message::DeliverReply { .. } => command::DELIVER_REPLY,
            Message::ReplyEnd { .. } => command::REPLY_END,
            Message::NoTarget { .. } => command::NO_TARGET,
            Message::DisconnectNotice => command::DISCONNECT_NOTICE,
            Message::Ping => command::PING,
        }
    }

    /// Encode the frame body.
    pub fn body(&self) -> Result<Caps> {
        match self {
            Message::Auth {
                version,
                extra,
                pid,
            } => auth_body(*version, extra, *pid),
            Message::Subscribe { name, class } | Message::Unsubscribe { name, class } => {
                subscription_body(name, *class)
            }
            Message::Post {
                name,
                class,
                payload,
            }
            | Message::DeliverPost {
                name,
                class,
                payload,
            } => post_body(name, *class, payload),
            Message::Request {
                name,
                id,
                timeout_ms,
                payload,
            }
            | Message::DeliverRequest {
                name,
                id,
                timeout_ms,
                payload,
            } => request_body(name, *id, *timeout_ms, payload),
            Message::Reply {
                id,
                ret_code,
                extra,
                payload,
            }
            | Message::DeliverReply {
                id,
                ret_code,
                extra,
                payload,
            } => reply_body(*id, *ret_code, extra, payload),
            Message::AuthResult { code } => single_i32(*code),
            Message::ReplyEnd { id } | Message::NoTarget { id } => single_i32(*id),
            Message::Pong | Message::Disconnect | Message::DisconnectNotice | Message::Ping => {
                Ok(Caps::new())
            }
        }
    }

    /// Encode into a complete frame.
    pub fn to_frame(&self) -> std::result::Result<Frame, FrameError> {
        Frame::from_caps(self.command(), &self.body()?)
    }
}

pub fn auth_body(version: i32, extra: &str, pid: i32) -> Result<Caps> {
    let mut body = Caps::new();
    body.write_i32(version)?;
    body.write_str(extra)?;
    body.write_i32(pid)?;
    Ok(body)
}

pub fn subscription_body(name: &str, class: MsgClass) -> Result<Caps> {
    let mut body = Caps::new();
    body.write_str(name)?;
    body.write_i32(class.to_wire())?;
    Ok(body)
}

pub fn post_body(name: &str, class: MsgClass, payload: &Caps) -> Result<Caps> {
    let mut body = subscription_body(name, class)?;
    body.write_caps_ref(payload)?;
    Ok(body)
}

pub fn request_body(name: &str, id: i32, timeout_ms: i64, payload: &Caps) -> Result<Caps> {
    let mut body = Caps::new();
    body.write_str(name)?;
    body.write_i32(id)?;
    body.write_i64(timeout_ms)?;
    body.write_caps_ref(payload)?;
    Ok(body)
}

pub fn reply_body(id: i32, ret_code: i32, extra: &str, payload: &Caps) -> Result<Caps> {
    let mut body = Caps::new();
    body.write_i32(id)?;
    body.write_i32(ret_code)?;
    body.write_str(extra)?;
    body.write_caps_ref(payload)?;
    Ok(body)
}

fn single_i32(value: i32) -> Result<Caps> {
    let mut body = Caps::new();
    body.write_i32(value)?;
    Ok(body)
}

fn read_post(body: &mut Caps) -> Result<(String, MsgClass, Caps)> {
    Ok((
        body.read_string()?,
        MsgClass::from_wire(body.read_i32()?)?,
        body.read_caps()?,
    ))
}

fn read_request(body: &mut Caps) -> Result<(String, i32, i64, Caps)> {
    Ok((
        body.read_string()?,
        body.read_i32()?,
        body.read_i64()?,
        body.read_caps()?,
    ))
}

fn read_reply(body: &mut Caps) -> Result<(i32, i32, String, Caps)> {
    Ok((
        body.read_i32()?,
        body.read_i32()?,
        body.read_string()?,
        body.read_caps()?,
    ))
}
