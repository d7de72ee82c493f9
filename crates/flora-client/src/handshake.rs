use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use flora_frame::{command, FrameError, FrameReader, FrameWriter};
use tracing::debug;

use crate::error::{ClientError, Result, SUCCESS};
use crate::message::{auth_body, Message};

const MAX_EXTRA_LEN: usize = 1024;

/// What the client announces in its AUTH frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub version: i32,
    /// Identity tag, taken from the broker URI's `#fragment`.
    pub extra: String,
    pub pid: i32,
}

impl AuthRequest {
    pub fn new(version: i32, extra: Option<&str>) -> Self {
        Self {
            version,
            extra: extra.unwrap_or_default().to_string(),
            pid: std::process::id() as i32,
        }
    }
}

/// Send AUTH and wait for the broker's AUTH_RESULT.
///
/// The reader must already carry a read timeout no longer than `timeout`;
/// the wait is bounded by `timeout` overall.
pub fn authenticate<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    request: &AuthRequest,
    timeout: Duration,
) -> Result<()> {
    if request.extra.len() > MAX_EXTRA_LEN {
        return Err(ClientError::InvalidParam(format!(
            "identity tag too long: {} bytes (max {MAX_EXTRA_LEN})",
            request.extra.len()
        )));
    }

    let body = auth_body(request.version, &request.extra, request.pid)?;
    writer
        .send_caps(command::AUTH, &body)
        .map_err(|err| ClientError::Connection(format!("sending AUTH: {err}")))?;
    debug!(version = request.version, extra = %request.extra, "sent AUTH");

    let deadline = Instant::now() + timeout;
    loop {
        if Instant::now() >= deadline {
            return Err(ClientError::Auth(format!(
                "no AUTH_RESULT within {timeout:?}"
            )));
        }

        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                return Err(ClientError::Connection(
                    "broker closed the connection during authentication".to_string(),
                ));
            }
            Err(err) => return Err(ClientError::Connection(err.to_string())),
        };

        return match Message::decode(&frame) {
            Ok(Some(Message::AuthResult { code })) if code == SUCCESS => Ok(()),
            Ok(Some(Message::AuthResult { code })) => Err(ClientError::Auth(format!(
                "broker rejected the client (code {code})"
            ))),
            Ok(_) => Err(ClientError::Auth(format!(
                "expected AUTH_RESULT, got {}",
                frame.command_name()
            ))),
            Err(err) => Err(ClientError::Auth(format!("malformed AUTH_RESULT: {err}"))),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use flora_caps::Caps;
    use flora_frame::FrameConfig;

    use super::*;

    fn broker_says(msg: Message) -> FrameReader<Cursor<Vec<u8>>> {
        let mut out = FrameWriter::new(Cursor::new(Vec::new()));
        out.write_frame(&msg.to_frame().unwrap()).unwrap();
        FrameReader::new(Cursor::new(out.into_inner().into_inner()))
    }

    fn request() -> AuthRequest {
        AuthRequest::new(1, Some("tester"))
    }

    #[test]
    fn accepted() {
        let mut reader = broker_says(Message::AuthResult { code: 0 });
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        authenticate(&mut reader, &mut writer, &request(), Duration::from_secs(1)).unwrap();

        let sent = writer.into_inner().into_inner();
        let mut sent = FrameReader::new(Cursor::new(sent));
        match Message::decode(&sent.read_frame().unwrap()).unwrap() {
            Some(Message::Auth {
                version,
                extra,
                pid,
            }) => {
                assert_eq!((version, extra.as_str()), (1, "tester"));
                assert_eq!(pid, std::process::id() as i32);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejected_is_auth_error() {
        let mut reader = broker_says(Message::AuthResult { code: -1 });
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let err =
            authenticate(&mut reader, &mut writer, &request(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn unexpected_command_is_auth_error() {
        let mut reader = broker_says(Message::DeliverPost {
            name: "x".into(),
            class: crate::message::MsgClass::Instant,
            payload: Caps::new(),
        });
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let err =
            authenticate(&mut reader, &mut writer, &request(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
    }

    #[test]
    fn closed_during_auth_is_connection_error() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let err =
            authenticate(&mut reader, &mut writer, &request(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }

    #[test]
    #[cfg(unix)]
    fn silent_broker_times_out() {
        let (client, _broker) = std::os::unix::net::UnixStream::pair().unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let mut reader =
            FrameReader::with_config(client.try_clone().unwrap(), FrameConfig::default());
        let mut writer = FrameWriter::new(client);

        let started = Instant::now();
        let err = authenticate(
            &mut reader,
            &mut writer,
            &request(),
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn long_identity_tag_rejected() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let req = AuthRequest::new(1, Some(&"x".repeat(MAX_EXTRA_LEN + 1)));
        let err = authenticate(&mut reader, &mut writer, &req, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), -2);
    }
}
