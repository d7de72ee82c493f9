//! Protocol command IDs.
//!
//! Commands below 100 travel from client to broker; commands from 100 up
//! travel from broker to client. Every frame payload is one serialized Caps
//! whose entries are listed on each constant.

use std::fmt;

/// Client → broker: `version i32, extra string, pid i32`.
pub const AUTH: u16 = 0;
/// Client → broker: `name string, class i32`.
pub const SUBSCRIBE: u16 = 1;
/// Client → broker: `name string, class i32`.
pub const UNSUBSCRIBE: u16 = 2;
/// Client → broker: `name string, class i32, payload caps`.
pub const POST: u16 = 3;
/// Client → broker: `name string, id i32, timeout_ms i64, payload caps`.
pub const REQUEST: u16 = 4;
/// Client → broker: `id i32, code i32, extra string, payload caps`.
pub const REPLY: u16 = 5;
/// Client → broker: answer to [`PING`], empty.
pub const PONG: u16 = 6;
/// Client → broker: orderly goodbye, empty.
pub const DISCONNECT: u16 = 7;

/// First broker → client command ID.
pub const INBOUND_START: u16 = 100;

/// Broker → client: `code i32`.
pub const AUTH_RESULT: u16 = 101;
/// Broker → client: `name string, class i32, payload caps`.
pub const DELIVER_POST: u16 = 102;
/// Broker → client: `name string, id i32, timeout_ms i64, payload caps`.
pub const DELIVER_REQUEST: u16 = 103;
/// Broker → client: `id i32, code i32, extra string, payload caps`.
pub const DELIVER_REPLY: u16 = 104;
/// Broker → client: every target has answered request `id i32`.
pub const REPLY_END: u16 = 105;
/// Broker → client: request `id i32` had no subscriber.
pub const NO_TARGET: u16 = 106;
/// Broker → client: the broker is closing this connection, empty.
pub const DISCONNECT_NOTICE: u16 = 107;
/// Broker → client: keepalive, empty.
pub const PING: u16 = 108;

/// A decoded command ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Auth,
    Subscribe,
    Unsubscribe,
    Post,
    Request,
    Reply,
    Pong,
    Disconnect,
    AuthResult,
    DeliverPost,
    DeliverRequest,
    DeliverReply,
    ReplyEnd,
    NoTarget,
    DisconnectNotice,
    Ping,
}

impl Command {
    pub fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            AUTH => Command::Auth,
            SUBSCRIBE => Command::Subscribe,
            UNSUBSCRIBE => Command::Unsubscribe,
            POST => Command::Post,
            REQUEST => Command::Request,
            REPLY => Command::Reply,
            PONG => Command::Pong,
            DISCONNECT => Command::Disconnect,
            AUTH_RESULT => Command::AuthResult,
            DELIVER_POST => Command::DeliverPost,
            DELIVER_REQUEST => Command::DeliverRequest,
            DELIVER_REPLY => Command::DeliverReply,
            REPLY_END => Command::ReplyEnd,
            NO_TARGET => Command::NoTarget,
            DISCONNECT_NOTICE => Command::DisconnectNotice,
            PING => Command::Ping,
            _ => return None,
        })
    }

    pub const fn id(self) -> u16 {
        match self {
            Command::Auth => AUTH,
            Command::Subscribe => SUBSCRIBE,
            Command::Unsubscribe => UNSUBSCRIBE,
            Command::Post => POST,
            Command::Request => REQUEST,
            Command::Reply => REPLY,
            Command::Pong => PONG,
            Command::Disconnect => DISCONNECT,
            Command::AuthResult => AUTH_RESULT,
            Command::DeliverPost => DELIVER_POST,
            Command::DeliverRequest => DELIVER_REQUEST,
            Command::DeliverReply => DELIVER_REPLY,
            Command::ReplyEnd => REPLY_END,
            Command::NoTarget => NO_TARGET,
            Command::DisconnectNotice => DISCONNECT_NOTICE,
            Command::Ping => PING,
        }
    }

    /// True for commands the broker sends to clients.
    pub const fn is_inbound(self) -> bool {
        self.id() >= INBOUND_START
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(command_name(self.id()))
    }
}

/// Returns a human-readable name for a command ID.
pub fn command_name(id: u16) -> &'static str {
    match id {
        AUTH => "AUTH",
        SUBSCRIBE => "SUBSCRIBE",
        UNSUBSCRIBE => "UNSUBSCRIBE",
        POST | DELIVER_POST => "POST",
        REQUEST | DELIVER_REQUEST => "REQUEST",
        REPLY | DELIVER_REPLY => "REPLY",
        PONG => "PONG",
        DISCONNECT | DISCONNECT_NOTICE => "DISCONNECT",
        AUTH_RESULT => "AUTH_RESULT",
        REPLY_END => "REPLY_END",
        NO_TARGET => "NO_TARGET",
        PING => "PING",
        _ => "UNKNOWN",
    }
}
