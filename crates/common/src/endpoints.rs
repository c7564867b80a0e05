//! Backend endpoint derivation
//!
//! A single base URL selects the backend origin. HTTP endpoints hang off
//! `<base>/api/...`; WebSocket endpoints use the same origin with the scheme
//! rewritten (`http` -> `ws`, `https` -> `wss`).

use crate::{Error, Result};
use url::Url;

/// Resolved backend endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    http: Url,
    ws: Url,
}

impl Endpoints {
    /// Build endpoints from a base URL such as `https://devstack.example.com`
    pub fn new(base: &str) -> Result<Self> {
        let trimmed = base.trim();
        let mut http = Url::parse(trimmed)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", trimmed, e)))?;
        http.set_query(None);
        http.set_fragment(None);

        let ws_scheme = match http.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(Error::InvalidUrl(format!(
                    "unsupported scheme '{}' (expected http or https)",
                    other
                )))
            }
        };

        let mut ws = http.clone();
        ws.set_scheme(ws_scheme)
            .map_err(|_| Error::InvalidUrl(format!("cannot derive {} URL from {}", ws_scheme, trimmed)))?;

        Ok(Self { http, ws })
    }

    /// Base URL as configured
    pub fn base(&self) -> &Url {
        &self.http
    }

    /// HTTP endpoint under `/api`
    pub fn api(&self, segments: &[&str]) -> Url {
        join(&self.http, segments)
    }

    /// Dashboard sync socket (`/api/ws`)
    pub fn sync_socket(&self) -> Url {
        join(&self.ws, &["ws"])
    }

    /// Terminal socket for one container session.
    ///
    /// The returned URL embeds the session capability and must not be logged.
    pub fn terminal_socket(&self, container_id: &str, session_id: &str) -> Url {
        join(
            &self.ws,
            &["nanobox", "containers", container_id, "terminal", session_id],
        )
    }
}

fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().push("api").extend(segments);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("http://localhost:8001", "ws://localhost:8001/api/ws")]
    #[test_case("https://devstack.example.com/", "wss://devstack.example.com/api/ws")]
    #[test_case("https://example.com/console", "wss://example.com/console/api/ws")]
    fn test_sync_socket_scheme_rewrite(base: &str, expected: &str) {
        let endpoints = Endpoints::new(base).unwrap();
        assert_eq!(endpoints.sync_socket().as_str(), expected);
    }

    #[test]
    fn test_terminal_socket_path() {
        let endpoints = Endpoints::new("https://example.com").unwrap();
        assert_eq!(
            endpoints.terminal_socket("c1", "s1").as_str(),
            "wss://example.com/api/nanobox/containers/c1/terminal/s1"
        );
    }

    #[test]
    fn test_api_paths_encode_segments() {
        let endpoints = Endpoints::new("http://127.0.0.1:8001").unwrap();
        assert_eq!(
            endpoints.api(&["nanobox", "containers", "web 1", "start"]).as_str(),
            "http://127.0.0.1:8001/api/nanobox/containers/web%201/start"
        );
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(matches!(Endpoints::new("ftp://example.com"), Err(Error::InvalidUrl(_))));
        assert!(matches!(Endpoints::new("not a url"), Err(Error::InvalidUrl(_))));
    }
}
