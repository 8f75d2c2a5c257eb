//! A wiremock responder that serves byte ranges of a fixed body.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Deterministic, position-dependent test payload.
#[must_use]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Serves `body` honoring `Range: bytes=a-b` and `bytes=a-`.
#[derive(Clone)]
pub struct RangeResponder {
    body: Arc<Vec<u8>>,
    etag: Option<String>,
    accept_ranges: bool,
    /// Ranged requests starting at or after this offset are delayed.
    slow_from: Option<(usize, Duration)>,
    /// Every `Range` header received, in arrival order.
    seen_ranges: Arc<Mutex<Vec<Option<String>>>>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            etag: None,
            accept_ranges: true,
            slow_from: None,
            seen_ranges: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    pub fn without_range_support(mut self) -> Self {
        self.accept_ranges = false;
        self
    }

    pub fn slow_from(mut self, offset: usize, delay: Duration) -> Self {
        self.slow_from = Some((offset, delay));
        self
    }

    /// Range headers seen so far; `None` entries are un-ranged requests.
    pub fn seen_ranges(&self) -> Vec<Option<String>> {
        self.seen_ranges.lock().unwrap().clone()
    }

    /// Mounts this responder for `GET route` on `server`.
    pub async fn mount(&self, server: &MockServer, route: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(self.clone())
            .mount(server)
            .await;
    }

    fn parse_range(&self, header: &str) -> Option<(usize, usize)> {
        let last = self.body.len().checked_sub(1)?;
        let spec = header.strip_prefix("bytes=")?;
        let (start, end) = spec.split_once('-')?;
        let start: usize = start.parse().ok()?;
        let end = if end.is_empty() {
            last
        } else {
            end.parse::<usize>().ok()?.min(last)
        };
        (start <= end).then_some((start, end))
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        self.seen_ranges.lock().unwrap().push(range.clone());

        let mut template = match range.as_deref().filter(|_| self.accept_ranges) {
            Some(header) => match self.parse_range(header) {
                Some((start, end)) => {
                    let mut t = ResponseTemplate::new(206)
                        .insert_header(
                            "Content-Range",
                            format!("bytes {start}-{end}/{}", self.body.len()).as_str(),
                        )
                        .set_body_bytes(self.body[start..=end].to_vec());
                    if let Some((slow_offset, delay)) = self.slow_from
                        && start >= slow_offset
                    {
                        t = t.set_delay(delay);
                    }
                    t
                }
                None => ResponseTemplate::new(416),
            },
            None => ResponseTemplate::new(200).set_body_bytes(self.body.as_slice()),
        };

        if self.accept_ranges {
            template = template.insert_header("Accept-Ranges", "bytes");
        }
        if let Some(etag) = &self.etag {
            template = template.insert_header("ETag", etag.as_str());
        }
        template
    }
}

/// Serves `body` to every connection with no `Content-Length`, closing the
/// connection to end the body. Returns the base URL.
pub async fn serve_without_length(body: Vec<u8>) -> Option<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
    let address = listener.local_addr().ok()?;
    let body = Arc::new(body);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = Arc::clone(&body);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(head).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Some(format!("http://{address}"))
}

/// Raw range server that can stop every ranged body partway through.
///
/// While stalling, a ranged response announces its full length, sends the
/// first `stall_after` bytes and then holds the connection open until the
/// client hangs up.
#[derive(Clone)]
pub struct StallingServer {
    pub base: String,
    stalling: Arc<std::sync::atomic::AtomicBool>,
    seen_ranges: Arc<Mutex<Vec<String>>>,
}

impl StallingServer {
    pub async fn start(body: Vec<u8>, etag: &str, stall_after: usize) -> Option<Self> {
        use std::sync::atomic::{AtomicBool, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
        let base = format!("http://{}", listener.local_addr().ok()?);
        let server = Self {
            base,
            stalling: Arc::new(AtomicBool::new(true)),
            seen_ranges: Arc::new(Mutex::new(Vec::new())),
        };

        let body = Arc::new(body);
        let etag = etag.to_string();
        let shared = server.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = Arc::clone(&body);
                let etag = etag.clone();
                let shared = shared.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request).to_string();
                    let range = head.lines().find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.trim()
                            .eq_ignore_ascii_case("range")
                            .then(|| value.trim().to_string())
                    });

                    let last = body.len() - 1;
                    let (status, start, end) = match &range {
                        Some(header) => {
                            shared.seen_ranges.lock().unwrap().push(header.clone());
                            let spec = header.trim_start_matches("bytes=");
                            let (start, end) = spec.split_once('-').unwrap_or((spec, ""));
                            let start: usize = start.parse().unwrap_or(0);
                            let end = end.parse::<usize>().map_or(last, |e| e.min(last));
                            ("206 Partial Content", start, end)
                        }
                        None => ("200 OK", 0, last),
                    };
                    let slice = &body[start..=end];
                    let response_head = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nETag: {etag}\r\nConnection: close\r\n\r\n",
                        slice.len()
                    );
                    if socket.write_all(response_head.as_bytes()).await.is_err() {
                        return;
                    }

                    if range.is_some() && shared.stalling.load(Ordering::SeqCst) {
                        let sent = slice.len().min(stall_after);
                        let _ = socket.write_all(&slice[..sent]).await;
                        let _ = socket.flush().await;
                        // Hold the response open until the client gives up.
                        while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                        return;
                    }

                    let _ = socket.write_all(slice).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Some(server)
    }

    /// Serves every later request in full.
    pub fn stop_stalling(&self) {
        self.stalling
            .store(false, std::sync::atomic::Ordering::SeqCst);
    }

    /// `Range` headers received so far, in arrival order.
    pub fn seen_ranges(&self) -> Vec<String> {
        self.seen_ranges.lock().unwrap().clone()
    }
}
