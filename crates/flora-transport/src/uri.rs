use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Where a broker listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// TCP host and port.
    Tcp { host: String, port: u16 },
}

/// A parsed broker URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUri {
    pub endpoint: Endpoint,
    /// Identity tag from the `#fragment`, sent during authentication.
    pub extra: Option<String>,
}

impl BrokerUri {
    /// Parse `unix:<path>`, `unix://<path>` or `tcp://<host>:<port>[/...]`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason| TransportError::InvalidUri {
            uri: input.to_string(),
            reason,
        };

        let input_trimmed = input.trim();
        if input_trimmed.is_empty() {
            return Err(invalid("empty uri"));
        }

        let (body, extra) = match input_trimmed.split_once('#') {
            Some((body, fragment)) if !fragment.is_empty() => (body, Some(fragment.to_string())),
            Some((body, _)) => (body, None),
            None => (input_trimmed, None),
        };

        let (scheme, rest) = body
            .split_once(':')
            .ok_or_else(|| invalid("missing scheme"))?;

        let endpoint = match scheme {
            "unix" => {
                let path = rest.strip_prefix("//").unwrap_or(rest);
                if path.is_empty() {
                    return Err(invalid("missing socket path"));
                }
                Endpoint::Unix(PathBuf::from(path))
            }
            "tcp" => {
                let authority = rest
                    .strip_prefix("//")
                    .ok_or_else(|| invalid("tcp uri must start with tcp://"))?;
                let authority = authority.split('/').next().unwrap_or_default();
                let (host, port) = split_host_port(authority).ok_or_else(|| invalid("expected host:port"))?;
                Endpoint::Tcp { host, port }
            }
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        };

        Ok(Self { endpoint, extra })
    }
}

fn split_host_port(authority: &str) -> Option<(String, u16)> {
    // Bracketed IPv6 literal: [::1]:2517
    let (host, port) = if let Some(stripped) = authority.strip_prefix('[') {
        let (host, tail) = stripped.split_once(']')?;
        (host, tail.strip_prefix(':')?)
    } else {
        authority.rsplit_once(':')?
    };

    if host.is_empty() {
        return None;
    }
    let port = port.parse::<u16>().ok().filter(|port| *port != 0)?;
    Some((host.to_string(), port))
}

impl FromStr for BrokerUri {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BrokerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display())?,
            Endpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{host}]:{port}/")?
            }
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}/")?,
        }
        if let Some(extra) = &self.extra {
            write!(f, "#{extra}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_forms() {
        let short = BrokerUri::parse("unix:/var/run/flora.sock").unwrap();
        assert_eq!(
            short.endpoint,
            Endpoint::Unix(PathBuf::from("/var/run/flora.sock"))
        );
        assert!(short.extra.is_none());

        let long: BrokerUri = "unix:///var/run/flora.sock#player".parse().unwrap();
        assert_eq!(
            long.endpoint,
            Endpoint::Unix(PathBuf::from("/var/run/flora.sock"))
        );
        assert_eq!(long.extra.as_deref(), Some("player"));
    }

    #[test]
    fn parses_tcp_with_path_and_fragment() {
        let uri = BrokerUri::parse("tcp://localhost:2517/flora#svc-a").unwrap();
        assert_eq!(
            uri.endpoint,
            Endpoint::Tcp {
                host: "localhost".to_string(),
                port: 2517
            }
        );
        assert_eq!(uri.extra.as_deref(), Some("svc-a"));
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let uri = BrokerUri::parse("tcp://[::1]:9000/").unwrap();
        assert_eq!(
            uri.endpoint,
            Endpoint::Tcp {
                host: "::1".to_string(),
                port: 9000
            }
        );
        assert_eq!(uri.to_string(), "tcp://[::1]:9000/");
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "",
            "   ",
            "flora.sock",
            "unix:",
            "unix://",
            "tcp:localhost:1",
            "tcp://localhost",
            "tcp://:80/",
            "tcp://host:notaport/",
            "tcp://host:0/",
        ] {
            let err = BrokerUri::parse(bad).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidUri { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = BrokerUri::parse("http://localhost:80/").unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme(s) if s == "http"));
    }

    #[test]
    fn display_roundtrips() {
        for text in ["unix:/tmp/f.sock#me", "tcp://10.0.0.2:2517/"] {
            let uri = BrokerUri::parse(text).unwrap();
            assert_eq!(BrokerUri::parse(&uri.to_string()).unwrap(), uri);
        }
    }
}
