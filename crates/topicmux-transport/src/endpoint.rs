use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Address of a byte-stream endpoint.
///
/// Accepted textual forms:
/// - `tcp://127.0.0.1:7000` or a bare `127.0.0.1:7000`
/// - `unix:/tmp/topicmux.sock`, `unix:///tmp/topicmux.sock` or a bare path
///   containing `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP socket address (`host:port`).
    Tcp(String),
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Build a TCP endpoint.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::Tcp(addr.into())
    }

    /// Build a Unix domain socket endpoint.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    /// Short scheme name used in logs.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Unix(_) => "unix",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let invalid = |reason| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("endpoint must not be empty"));
        }

        if let Some(rest) = trimmed.strip_prefix("tcp://") {
            return parse_tcp(rest).ok_or_else(|| invalid("expected tcp://host:port"));
        }

        if let Some(rest) = trimmed.strip_prefix("unix:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.is_empty() {
                return Err(invalid("unix endpoint requires a socket path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(TransportError::InvalidEndpoint {
                input: input.to_string(),
                reason: if scheme.is_empty() {
                    "missing scheme"
                } else {
                    "unsupported scheme (expected tcp:// or unix:)"
                },
            });
        }

        if trimmed.contains('/') {
            return Ok(Self::Unix(PathBuf::from(trimmed)));
        }

        parse_tcp(trimmed).ok_or_else(|| invalid("expected host:port or a socket path"))
    }
}

fn parse_tcp(addr: &str) -> Option<Endpoint> {
    let (host, port) = addr.rsplit_once(':')?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }
    Some(Endpoint::Tcp(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_forms() {
        assert_eq!(
            "tcp://127.0.0.1:7000".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("127.0.0.1:7000")
        );
        assert_eq!(
            "localhost:80".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("localhost:80")
        );
    }

    #[test]
    fn parses_unix_forms() {
        let expected = Endpoint::unix("/tmp/mux.sock");
        assert_eq!("unix:/tmp/mux.sock".parse::<Endpoint>().unwrap(), expected);
        assert_eq!("unix:///tmp/mux.sock".parse::<Endpoint>().unwrap(), expected);
        assert_eq!("/tmp/mux.sock".parse::<Endpoint>().unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for bad in ["", "   ", "tcp://nohost", "tcp://host:notaport", "udp://x:1", "unix:", "plain"] {
            assert!(
                matches!(
                    bad.parse::<Endpoint>(),
                    Err(TransportError::InvalidEndpoint { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for endpoint in [Endpoint::tcp("10.0.0.1:9"), Endpoint::unix("/run/t.sock")] {
            let text = endpoint.to_string();
            assert_eq!(text.parse::<Endpoint>().unwrap(), endpoint);
        }
    }
}
