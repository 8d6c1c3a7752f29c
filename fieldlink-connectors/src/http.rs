//! HTTP Delivery Transport
//!
//! ## Overview
//!
//! Posts every event payload as the JSON body of its own request to
//! `<base_url><endpoint>` and reports the response status as the event's
//! outcome. The server answers `201 Created` for accepted measurement
//! batches.
//!
//! ## Design Decisions
//!
//! - One request per event, in batch order, so every event gets its own
//!   status code.
//! - No retries here: a failed event is retained by the core and retried on
//!   a later cycle.
//! - The first transport-level failure ends the batch. The remaining events
//!   are set to the 503 sentinel without being attempted.
//! - Empty events are skipped and reported as `200`.
//!
//! ## Example Usage
//!
//! ```no_run
//! use fieldlink_connectors::http::{HttpConfig, HttpTransport};
//! use fieldlink_core::{DeliveryTransport, Event, StatusCode};
//!
//! let config = HttpConfig::new("http://192.168.1.105:8000")
//!     .token("872408e3e07b09c35cd89b10eba29aae1e35bcfd")
//!     .header("X-Device", "datalogger-01");
//! let mut http = HttpTransport::new(config)?;
//!
//! let events = [Event::measurement("2024-05-01T10:00:00 -05:00", "[]")?];
//! let mut outcomes = [StatusCode::SERVICE_UNAVAILABLE; 1];
//! http.submit_batch(&events, &mut outcomes);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use fieldlink_core::constants::HTTP_TIMEOUT_MS;
use fieldlink_core::{DeliveryTransport, Event, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConnectorError, TransportStats};

/// Measurement ingestion path on the server
pub const DEFAULT_ENDPOINT: &str = "/api/measurement/careverga";

/// HTTP-specific errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Base URL is not an http(s) URL
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    /// Request never got a response
    #[error("Request failed: {0}")]
    Transport(String),
}

/// HTTP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Scheme, host and port, without a trailing path
    pub base_url: String,
    /// Path appended to the base URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout_ms: u64,
    /// Authentication method
    pub auth: AuthMethod,
    /// Custom headers
    pub headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

/// Authentication methods
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No authentication
    #[default]
    None,
    /// `Authorization: Token <key>`
    Token(String),
    /// Bearer token
    Bearer(String),
    /// Basic authentication
    Basic { username: String, password: String },
    /// API key in header
    ApiKey { header: String, value: String },
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoint: DEFAULT_ENDPOINT.into(),
            timeout_ms: HTTP_TIMEOUT_MS,
            auth: AuthMethod::None,
            headers: HashMap::new(),
            user_agent: format!("FieldLink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Create new configuration with base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing fields take defaults
    pub fn from_json_str(text: &str) -> Result<Self, ConnectorError> {
        serde_json::from_str(text).map_err(|e| ConnectorError::Config(e.to_string()))
    }

    /// Set the ingestion path
    pub fn endpoint(mut self, path: impl Into<String>) -> Self {
        self.endpoint = path.into();
        self
    }

    /// Set `Token` authentication
    pub fn token(mut self, key: impl Into<String>) -> Self {
        self.auth = AuthMethod::Token(key.into());
        self
    }

    /// Set bearer token authentication
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthMethod::Bearer(token.into());
        self
    }

    /// Set basic authentication
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Basic {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Set API key authentication
    pub fn api_key(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth = AuthMethod::ApiKey {
            header: header.into(),
            value: value.into(),
        };
        self
    }

    /// Set request timeout in milliseconds
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Add custom header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Full request URL
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint)
    }

    fn authorization(&self) -> Option<(&str, String)> {
        match &self.auth {
            AuthMethod::None => None,
            AuthMethod::Token(key) => Some(("Authorization", format!("Token {}", key))),
            AuthMethod::Bearer(token) => Some(("Authorization", format!("Bearer {}", token))),
            AuthMethod::Basic { username, password } => {
                let credentials = STANDARD.encode(format!("{}:{}", username, password));
                Some(("Authorization", format!("Basic {}", credentials)))
            }
            AuthMethod::ApiKey { header, value } => Some((header.as_str(), value.clone())),
        }
    }
}

/// Delivery transport over plain HTTP(S) using the ureq client
pub struct HttpTransport {
    config: HttpConfig,
    url: String,
    agent: ureq::Agent,
    stats: TransportStats,
}

impl HttpTransport {
    /// Create new HTTP transport
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(HttpError::InvalidUrl(config.base_url));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(&config.user_agent)
            .build();

        Ok(Self {
            url: config.url(),
            config,
            agent,
            stats: TransportStats::default(),
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Post one payload and return the response status
    pub fn post(&mut self, payload: &str) -> Result<StatusCode, HttpError> {
        let mut request = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json");
        if let Some((name, value)) = self.config.authorization() {
            request = request.set(name, &value);
        }
        for (name, value) in &self.config.headers {
            request = request.set(name, value);
        }

        let status = match request.send_string(payload) {
            Ok(response) => response.status(),
            Err(ureq::Error::Status(code, _)) => code,
            Err(ureq::Error::Transport(err)) => {
                self.stats.transport_errors += 1;
                self.stats.last_error = Some(err.to_string());
                log::warn!("POST {} failed: {}", self.url, err);
                return Err(HttpError::Transport(err.to_string()));
            }
        };

        let code = StatusCode(status);
        self.stats.requests += 1;
        self.stats.bytes_sent += payload.len() as u64;
        match status {
            200..=299 => self.stats.accepted += 1,
            400..=499 => self.stats.rejected += 1,
            500..=u16::MAX => self.stats.server_errors += 1,
            _ => {}
        }
        log::debug!("POST {} -> {}", self.url, code);
        Ok(code)
    }
}

impl DeliveryTransport for HttpTransport {
    fn submit_batch(&mut self, events: &[Event], outcomes: &mut [StatusCode]) {
        let n = events.len().min(outcomes.len());
        for i in 0..n {
            if events[i].is_empty() {
                outcomes[i] = StatusCode::OK;
                continue;
            }
            match self.post(events[i].payload()) {
                Ok(code) => outcomes[i] = code,
                Err(_) => {
                    outcomes[i..n].fill(StatusCode::SERVICE_UNAVAILABLE);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Answers each request with the next status and reports what it got
    fn serve(statuses: Vec<u16>) -> (String, mpsc::Receiver<(Vec<String>, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for status in statuses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut headers = Vec::new();
                let mut length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end().to_string();
                    if line.is_empty() {
                        break;
                    }
                    if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                        length = value.trim().parse().unwrap();
                    }
                    headers.push(line);
                }
                let mut body = vec![0; length];
                reader.read_exact(&mut body).unwrap();

                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                )
                .unwrap();
                tx.send((headers, String::from_utf8(body).unwrap())).unwrap();
            }
        });

        (format!("http://{}", addr), rx)
    }

    fn event(payload: &str) -> Event {
        Event::measurement("2024-05-01T10:00:00 -05:00", payload).unwrap()
    }

    #[test]
    fn config_builder() {
        let config = HttpConfig::new("https://api.example.com/")
            .token("abc")
            .timeout_ms(2000)
            .header("X-Custom", "value");

        assert_eq!(config.url(), "https://api.example.com/api/measurement/careverga");
        assert_eq!(config.timeout_ms, 2000);
        assert!(config.headers.contains_key("X-Custom"));
        assert_eq!(
            config.authorization(),
            Some(("Authorization", "Token abc".to_string()))
        );

        let basic = HttpConfig::new("http://h").basic_auth("admin", "admin");
        assert_eq!(
            basic.authorization(),
            Some(("Authorization", "Basic YWRtaW46YWRtaW4=".to_string()))
        );
    }

    #[test]
    fn config_from_json() {
        let config = HttpConfig::from_json_str(
            r#"{"base_url": "http://10.0.0.2:8000", "auth": {"token": "k"}}"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.auth, AuthMethod::Token("k".into()));

        assert!(HttpConfig::from_json_str("{").is_err());
    }

    #[test]
    fn url_validation() {
        assert!(HttpTransport::new(HttpConfig::new("not-a-url")).is_err());
        assert!(HttpTransport::new(HttpConfig::new("https://valid.url")).is_ok());
    }

    #[test]
    fn status_per_event() {
        let (base, rx) = serve(vec![201, 500]);
        let mut http = HttpTransport::new(HttpConfig::new(base).token("secret")).unwrap();

        let events = [event("[1]"), Event::default(), event("[2]")];
        let mut outcomes = [StatusCode::SERVICE_UNAVAILABLE; 3];
        http.submit_batch(&events, &mut outcomes);

        assert_eq!(outcomes, [StatusCode(201), StatusCode::OK, StatusCode(500)]);
        let (headers, body) = rx.recv().unwrap();
        assert_eq!(body, "[1]");
        assert!(headers.iter().any(|h| h == "Authorization: Token secret"));
        assert!(headers[0].starts_with("POST /api/measurement/careverga "));
        assert_eq!(rx.recv().unwrap().1, "[2]");

        assert_eq!(http.stats().accepted, 1);
        assert_eq!(http.stats().server_errors, 1);
    }

    #[test]
    fn unreachable_server_ends_batch() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let config = HttpConfig::new(format!("http://127.0.0.1:{}", port)).timeout_ms(500);
        let mut http = HttpTransport::new(config).unwrap();

        let events = [event("[1]"), event("[2]")];
        let mut outcomes = [StatusCode::OK; 2];
        http.submit_batch(&events, &mut outcomes);

        assert_eq!(outcomes, [StatusCode::SERVICE_UNAVAILABLE; 2]);
        assert_eq!(http.stats().transport_errors, 1);
        assert_eq!(http.stats().requests, 0);
    }
}
