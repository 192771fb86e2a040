//! Minimal HTTP/1.1 server imitating the match-statistics API for integration tests.
//!
//! Routes under `/api`: `GET matches/{id}`, `POST request/{id}`,
//! `GET explorer?sql=...` and `GET constants/patch`. Match responses are
//! configured per id (unknown ids get 404). Every request target is recorded.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Routes {
    /// Status and body per match id.
    pub matches: HashMap<i64, (u16, String)>,
    pub explorer: (u16, String),
    pub patch: (u16, String),
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            matches: HashMap::new(),
            explorer: (200, r#"{"rows":[],"fields":[],"err":null}"#.to_string()),
            patch: (200, "[]".to_string()),
        }
    }
}

impl Routes {
    pub fn with_match(mut self, id: i64, status: u16, body: impl Into<String>) -> Self {
        self.matches.insert(id, (status, body.into()));
        self
    }

    /// Explorer answer in the array-rows form.
    pub fn with_explorer_rows(mut self, rows: &[(i64, i64)]) -> Self {
        let rows = rows
            .iter()
            .map(|(id, start)| format!("[{},{}]", id, start))
            .collect::<Vec<_>>()
            .join(",");
        self.explorer = (
            200,
            format!(
                r#"{{"rows":[{}],"fields":[{{"name":"match_id"}},{{"name":"start_time"}}],"err":null}}"#,
                rows
            ),
        );
        self
    }
}

/// Payload shaped like a remote match record.
pub fn match_json(id: i64, start_time: i64, parsed: bool) -> String {
    format!(
        r#"{{"match_id":{},"start_time":{},"patch":58,"od_data":{{"has_parsed":{}}},"players":[]}}"#,
        id, start_time, parsed
    )
}

pub struct ApiServer {
    /// e.g. "http://127.0.0.1:12345/api"
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ApiServer {
    /// `METHOD target` for every request received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests with the query string stripped.
    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.split('?').next().unwrap_or("").to_string())
            .collect()
    }
}

/// Starts the server in a background thread. It runs until the process exits.
pub fn start(routes: Routes) -> ApiServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes = Arc::new(routes);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &routes, &log));
        }
    });
    ApiServer {
        base_url: format!("http://127.0.0.1:{}/api", port),
        requests,
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 8192];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8(head).ok()
}

fn handle(mut stream: TcpStream, routes: &Routes, log: &Mutex<Vec<String>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(head) = read_head(&mut stream) else {
        return;
    };
    let mut parts = head.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();
    if method.is_empty() {
        return;
    }
    log.lock().unwrap().push(format!("{} {}", method, target));

    let path = target.split('?').next().unwrap_or("");
    let route = path.trim_start_matches("/api/");
    let (status, body) = match (method.as_str(), route.split_once('/')) {
        ("GET", Some(("matches", id))) => id
            .parse::<i64>()
            .ok()
            .and_then(|id| routes.matches.get(&id).cloned())
            .unwrap_or((404, r#"{"error":"Not Found"}"#.to_string())),
        ("POST", Some(("request", _))) => (200, r#"{"job":{"jobId":1}}"#.to_string()),
        ("GET", Some(("constants", "patch"))) => routes.patch.clone(),
        ("GET", None) if route == "explorer" => routes.explorer.clone(),
        _ => (404, String::new()),
    };

    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body.as_bytes());
}
