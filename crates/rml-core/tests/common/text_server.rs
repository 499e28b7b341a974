//! Minimal HTTP/1.1 server serving text routes for integration tests.
//!
//! Each route has its own status, body, and optional artificial delay.
//! Every request target (path plus query) is recorded so tests can assert
//! on hit counts and cache-busting parameters. Unknown paths get 404.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: String,
    pub delay: Option<Duration>,
}

impl Route {
    /// 200 with the given body.
    pub fn text(body: &str) -> Route {
        Route {
            status: 200,
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn with_status(status: u16, body: &str) -> Route {
        Route {
            status,
            body: body.to_string(),
            delay: None,
        }
    }

    /// 200 with the given body, written only after `delay`.
    pub fn with_delay(body: &str, delay: Duration) -> Route {
        Route {
            status: 200,
            body: body.to_string(),
            delay: Some(delay),
        }
    }
}

pub struct TextServer {
    base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TextServer {
    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    /// Request targets seen so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Full targets of requests for `path`, query string included.
    pub fn requests_for(&self, path: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|target| target_path(target) == path)
            .collect()
    }

    /// Number of requests for `path`, ignoring any query string.
    pub fn hits(&self, path: &str) -> usize {
        self.requests_for(path).len()
    }
}

fn target_path(target: &str) -> &str {
    let end = target.find('?').unwrap_or(target.len());
    &target[..end]
}

/// Starts a server on an ephemeral port in a background thread. The server
/// runs until the process exits.
pub fn start(routes: Vec<(&str, Route)>) -> TextServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect(),
    );
    let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &routes, &log));
        }
    });
    TextServer {
        base: format!("http://127.0.0.1:{}/", port),
        requests,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    routes: &HashMap<String, Route>,
    log: &Mutex<Vec<String>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let target = match request_target(request) {
        Some(t) => t,
        None => return,
    };
    log.lock().unwrap().push(target.clone());

    let (status, body, delay) = match routes.get(target_path(&target)) {
        Some(route) => (route.status, route.body.as_str(), route.delay),
        None => (404, "", None),
    };
    if let Some(delay) = delay {
        thread::sleep(delay);
    }
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain;charset=UTF-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status_line(status),
        body.len(),
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body.as_bytes());
}

/// Returns the request target from the request line, e.g. "/a.js?_=123".
fn request_target(request: &str) -> Option<String> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let _method = parts.next()?;
    parts.next().map(|target| target.to_string())
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        304 => "304 Not Modified",
        403 => "403 Forbidden",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "500 Internal Server Error",
    }
}
