//! Shared test support: a local canned-response HTTP listener standing in for
//! the Sheets API and the OAuth token endpoint.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body should be json")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serves one canned response per accepted connection, in order, and records
/// what the client sent. Every response closes the connection so the next
/// request arrives on a fresh accept.
pub struct MockApi {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockApi {
    pub async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind mock api listener");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let server = tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let request = read_request(&mut socket).await;
                recorded.lock().expect("record request").push(request);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url,
            requests,
            _server: server,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("read requests").clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> CapturedRequest {
    let mut raw: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let size = socket.read(&mut chunk).await.expect("read request");
        assert!(size > 0, "client closed before sending a full request");
        raw.extend_from_slice(&chunk[..size]);
        if let Some(pos) = find_header_end(&raw) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let mut first_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = first_line.next().unwrap_or_default().to_string();
    let target = first_line.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = head
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let size = socket.read(&mut chunk).await.expect("read body");
        assert!(size > 0, "client closed before sending the full body");
        body.extend_from_slice(&chunk[..size]);
    }
    body.truncate(content_length);

    CapturedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

pub fn http_response(status_line: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

pub fn ok_json(body: &str) -> String {
    http_response("200 OK", body)
}

/// Token endpoint success payload; long expiry so one grant covers a test.
pub fn token_ok() -> String {
    ok_json(r#"{"access_token": "ya29.test-access-token", "expires_in": 3599, "token_type": "Bearer"}"#)
}
