//! Loopback HTTP fixtures for client tests.
//!
//! [`serve_once`] answers exactly one request with a canned response and
//! hands back the raw request text, so tests can assert on both what was
//! sent and how the reply was handled.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub(crate) struct CannedServer {
    pub base_url: String,
    request: JoinHandle<String>,
}

impl CannedServer {
    /// Raw request (head + body) as received by the server.
    pub async fn request(self) -> String {
        self.request.await.expect("server task panicked")
    }
}

/// Serve one HTTP/1.1 response with the given status and JSON body.
pub(crate) async fn serve_once(status: u16, body: impl Into<String>) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let body = body.into();

    let request = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let raw = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write");
        let _ = socket.shutdown().await;
        raw
    });

    CannedServer {
        base_url: format!("http://{addr}"),
        request,
    }
}

/// URL of a port nothing is listening on.
pub(crate) async fn closed_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Client that never routes loopback traffic through a system proxy.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("reqwest client")
}

/// Parse the JSON body out of a raw request captured by [`serve_once`].
pub(crate) fn json_body(raw: &str) -> serde_json::Value {
    let body = raw.split_once("\r\n\r\n").map_or("", |(_, b)| b);
    serde_json::from_str(body).expect("request body is JSON")
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.expect("read");
        if n == 0 {
            return String::from_utf8_lossy(&data).into_owned();
        }
        data.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while data.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.expect("read");
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&data).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
