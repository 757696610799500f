use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the fake meter sends back for one request
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// `200 OK` with an XML body
    Xml(String),
    /// Any status with an empty body
    Status(u16),
    /// Headers announce more body than is sent before the connection closes
    Truncated(String),
    /// Accept the request and never answer
    Hang,
}

type Responder = dyn Fn(u64, u32) -> FakeReply + Send + Sync;

/// An in-process HTTP server that impersonates a power meter
///
/// Every request is answered by the responder, which gets the parsed `ts` and `n`
/// query parameters. Request targets are recorded in arrival order.
pub struct FakeMeter {
    host: String,
    requests: Arc<Mutex<Vec<String>>>,
    server: JoinHandle<()>,
}

impl FakeMeter {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(u64, u32) -> FakeReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake meter");
        let host = listener.local_addr().expect("local addr").to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let recorded = requests.clone();
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let responder = responder.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, &*responder, &recorded).await;
                });
            }
        });

        Self { host, requests, server }
    }

    /// A meter that always answers with the same reply
    pub async fn fixed(reply: FakeReply) -> Self {
        Self::start(move |_, _| reply.clone()).await
    }

    /// `host:port` to put into a `MeterConfig`
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Raw request targets, e.g. `/InstantView/request/getPowerProfile.html?ts=0&n=1`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// `(ts, n)` of every request received so far
    pub fn windows(&self) -> Vec<(u64, u32)> {
        self.requests().iter().map(|target| parse_window(target)).collect()
    }
}

impl Drop for FakeMeter {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A `host:port` on which nothing is listening
pub async fn closed_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let host = listener.local_addr().expect("local addr").to_string();
    drop(listener);
    host
}

async fn serve(mut stream: TcpStream, responder: &Responder, recorded: &Mutex<Vec<String>>) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..read]);
    }

    let head = String::from_utf8_lossy(&head);
    let target = head.lines().next().and_then(|line| line.split_whitespace().nth(1)).unwrap_or("/").to_string();
    let (ts, n) = parse_window(&target);
    recorded.lock().push(target);

    let response = match responder(ts, n) {
        FakeReply::Xml(body) => http_response(200, "OK", body.len(), &body),
        FakeReply::Status(status) => http_response(status, "Error", 0, ""),
        FakeReply::Truncated(body) => http_response(200, "OK", body.len() + 512, &body),
        FakeReply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Ok(());
        },
    };
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn http_response(status: u16, reason: &str, content_length: usize, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/xml\r\nContent-Length: {content_length}\r\nConnection: close\r\n\r\n{body}"
    )
}

fn parse_window(target: &str) -> (u64, u32) {
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
    let mut ts = 0;
    let mut n = 0;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("ts", value)) => ts = value.parse().unwrap_or(0),
            Some(("n", value)) => n = value.parse().unwrap_or(0),
            _ => {},
        }
    }
    (ts, n)
}
