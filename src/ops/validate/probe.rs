//! Endpoint probing against a running server.
//!
//! The probe checks routing and wiring, not business logic: POST and PUT
//! carry a placeholder body, and any status below the configured threshold
//! (default 500) counts as success, so a 400 or 404 still proves the server
//! answers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;

use crate::util::port;
use crate::util::process::{truncate, ManagedProcess};

use super::types::{EndpointResult, ErrorCode, Stage, ValidationError};

/// HTTP methods the probe knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("Unsupported HTTP method: {}", other)),
        }
    }
}

/// Probe settings.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub base_url: String,
    pub request_timeout: Duration,
    pub success_status_below: u16,
    pub stderr_limit: usize,
}

/// Result of probing every endpoint.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    pub success: bool,
    pub results: BTreeMap<String, EndpointResult>,
    pub errors: Vec<ValidationError>,
}

/// Split `"METHOD /path"` on the first space.
pub fn parse_endpoint(endpoint: &str) -> Result<(HttpMethod, &str), String> {
    let (method, path) = endpoint
        .trim()
        .split_once(' ')
        .ok_or_else(|| format!("Invalid endpoint format: {}", endpoint))?;

    let path = path.trim();
    if path.is_empty() {
        return Err(format!("Invalid endpoint format: {}", endpoint));
    }

    Ok((method.parse()?, path))
}

/// Join a base URL and a request path.
fn endpoint_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

pub fn build_client(request_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(request_timeout).build()
}

/// Send one request and classify the response.
pub fn probe_endpoint(client: &Client, endpoint: &str, opts: &ProbeOptions) -> EndpointResult {
    let (method, path) = match parse_endpoint(endpoint) {
        Ok(parsed) => parsed,
        Err(message) => return EndpointResult::failed(message),
    };

    let url = endpoint_url(&opts.base_url, path);
    let mut request = match method {
        HttpMethod::Get => client.get(&url),
        HttpMethod::Post => client.post(&url),
        HttpMethod::Put => client.put(&url),
        HttpMethod::Delete => client.delete(&url),
    };
    if method.has_body() {
        request = request.json(&serde_json::json!({ "test": "data" }));
    }

    tracing::debug!("Probing {} {}", method, url);
    let started = Instant::now();
    match request.send() {
        Ok(response) => {
            let status = response.status().as_u16();
            let success = status < opts.success_status_below;
            EndpointResult {
                success,
                status_code: Some(status),
                error: (!success).then(|| format!("Server error: {}", status)),
                response_time_ms: Some(started.elapsed().as_millis() as u64),
            }
        }
        Err(e) if e.is_connect() => {
            EndpointResult::failed("Connection refused - endpoint not available")
        }
        Err(e) if e.is_timeout() => EndpointResult::failed("Request timeout"),
        Err(e) => EndpointResult::failed(format!("Request error: {}", e)),
    }
}

/// Probe every endpoint against a live server.
///
/// All endpoints are attempted even when earlier ones fail.
pub fn probe_endpoints(
    process: &mut ManagedProcess,
    endpoints: &[String],
    opts: &ProbeOptions,
) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();

    if let (false, stderr) = process.is_running() {
        let stderr = stderr.unwrap_or_default();
        let excerpt = truncate(stderr.trim(), opts.stderr_limit);
        let detail = if excerpt.is_empty() {
            "Application crashed"
        } else {
            excerpt
        };
        outcome.errors.push(ValidationError::new(
            Stage::EndpointTest,
            ErrorCode::AppCrashed,
            format!("Application crashed before testing: {}", detail),
        ));
        return outcome;
    }

    let client = match build_client(opts.request_timeout) {
        Ok(client) => client,
        Err(e) => {
            outcome.errors.push(ValidationError::new(
                Stage::EndpointTest,
                ErrorCode::EndpointTestError,
                format!("Endpoint testing error: {}", e),
            ));
            return outcome;
        }
    };

    for endpoint in endpoints {
        let result = probe_endpoint(&client, endpoint, opts);
        if result.success {
            tracing::info!("  {} -> {}", endpoint, result.status_code.unwrap_or_default());
        } else {
            let reason = result.error.as_deref().unwrap_or("Unknown error");
            tracing::warn!("  {} failed: {}", endpoint, reason);
            outcome.errors.push(
                ValidationError::new(
                    Stage::EndpointTest,
                    ErrorCode::EndpointFailed,
                    format!("Endpoint {} failed: {}", endpoint, reason),
                )
                .with_endpoint(endpoint.clone()),
            );
        }
        outcome.results.insert(endpoint.clone(), result);
    }

    outcome.success = outcome.errors.is_empty();
    outcome
}

/// Port the probe will talk to: the base URL's, else `fallback`.
pub fn probe_port(base_url: &str, fallback: u16) -> u16 {
    port::port_from_url(base_url).unwrap_or(fallback)
}

/// Refuse to probe a port something else already holds.
pub fn precheck_port(port: u16) -> Result<(), ValidationError> {
    if port::is_port_in_use(port) {
        return Err(ValidationError::new(
            Stage::EndpointTest,
            ErrorCode::PortInUse,
            format!(
                "Port {} is already in use. Please free the port before testing.",
                port
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    /// Answer every request with `status` until the test process exits.
    fn stub_server(status: u16) -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                respond(stream, status);
            }
        });
        port
    }

    fn respond(mut stream: TcpStream, status: u16) {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        let mut body = vec![0u8; content_length];
        let _ = reader.read_exact(&mut body);

        let response = format!(
            "HTTP/1.1 {} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        );
        let _ = stream.write_all(response.as_bytes());
    }

    fn opts(port: u16) -> ProbeOptions {
        ProbeOptions {
            base_url: format!("http://127.0.0.1:{}", port),
            request_timeout: Duration::from_secs(5),
            success_status_below: 500,
            stderr_limit: 200,
        }
    }

    fn closed_port() -> u16 {
        TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(parse_endpoint("GET /owners").unwrap(), (HttpMethod::Get, "/owners"));
        assert_eq!(
            parse_endpoint("  post /owners/1/pets ").unwrap(),
            (HttpMethod::Post, "/owners/1/pets")
        );
        assert!(parse_endpoint("/owners")
            .unwrap_err()
            .contains("Invalid endpoint format"));
        assert!(parse_endpoint("PATCH /owners")
            .unwrap_err()
            .contains("Unsupported HTTP method: PATCH"));
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("http://localhost:3000/", "/a"), "http://localhost:3000/a");
        assert_eq!(endpoint_url("http://localhost:3000", "a"), "http://localhost:3000/a");
    }

    #[test]
    fn test_not_found_counts_as_wired() {
        let port = stub_server(404);
        let client = build_client(Duration::from_secs(5)).unwrap();

        let result = probe_endpoint(&client, "GET /missing", &opts(port));
        assert!(result.success);
        assert_eq!(result.status_code, Some(404));
        assert!(result.error.is_none());
        assert!(result.response_time_ms.is_some());
    }

    #[test]
    fn test_server_error_fails() {
        let port = stub_server(500);
        let client = build_client(Duration::from_secs(5)).unwrap();

        let result = probe_endpoint(&client, "POST /owners", &opts(port));
        assert!(!result.success);
        assert_eq!(result.status_code, Some(500));
        assert_eq!(result.error.as_deref(), Some("Server error: 500"));
    }

    #[test]
    fn test_threshold_is_configurable() {
        let port = stub_server(404);
        let client = build_client(Duration::from_secs(5)).unwrap();
        let strict = ProbeOptions {
            success_status_below: 300,
            ..opts(port)
        };

        assert!(!probe_endpoint(&client, "GET /owners", &strict).success);
    }

    #[test]
    fn test_connection_refused() {
        let port = closed_port();
        let client = build_client(Duration::from_secs(5)).unwrap();

        let result = probe_endpoint(&client, "GET /owners", &opts(port));
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Connection refused - endpoint not available")
        );
        assert!(result.status_code.is_none());
    }

    #[test]
    fn test_request_timeout() {
        // Accepts but never answers.
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let _held: Vec<_> = listener.incoming().take(1).collect();
            thread::sleep(Duration::from_secs(10));
        });

        let client = build_client(Duration::from_millis(300)).unwrap();
        let result = probe_endpoint(&client, "GET /slow", &opts(port));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Request timeout"));
    }

    #[test]
    fn test_malformed_endpoint_is_per_endpoint_failure() {
        let client = build_client(Duration::from_secs(5)).unwrap();
        let result = probe_endpoint(&client, "owners", &opts(closed_port()));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid endpoint format"));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_endpoints_does_not_short_circuit() {
        use crate::util::process::ProcessBuilder;

        let port = stub_server(200);
        let mut app = ProcessBuilder::new("sleep").arg("30").start().unwrap();

        let endpoints = vec![
            "FETCH /owners".to_string(),
            "GET /owners".to_string(),
            "DELETE /owners/1".to_string(),
        ];
        let outcome = probe_endpoints(&mut app, &endpoints, &opts(port));

        assert!(!outcome.success);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results["GET /owners"].success);
        assert!(outcome.results["DELETE /owners/1"].success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].code, ErrorCode::EndpointFailed);
        assert_eq!(outcome.errors[0].endpoint.as_deref(), Some("FETCH /owners"));

        app.terminate(Duration::from_secs(2), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_reports_crashed_app() {
        use crate::util::process::ProcessBuilder;

        let mut app = ProcessBuilder::new("sh")
            .args(["-c", "echo dead >&2; exit 1"])
            .start()
            .unwrap();
        thread::sleep(Duration::from_millis(500));

        let outcome = probe_endpoints(&mut app, &["GET /".to_string()], &opts(closed_port()));
        assert!(!outcome.success);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.errors[0].code, ErrorCode::AppCrashed);
        assert!(outcome.errors[0].message.contains("dead"));
    }

    #[test]
    fn test_precheck_port() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = precheck_port(port).unwrap_err();
        assert_eq!(err.code, ErrorCode::PortInUse);
        assert_eq!(err.stage, Stage::EndpointTest);

        drop(listener);
        assert!(precheck_port(port).is_ok());
    }

    #[test]
    fn test_probe_port() {
        assert_eq!(probe_port("http://localhost:8080", 3000), 8080);
        assert_eq!(probe_port("garbage", 3000), 3000);
    }
}
