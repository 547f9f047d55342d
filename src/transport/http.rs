//! `reqwest` implementation of [`Transport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use marku::transport::http::HttpTransport;
//! use marku::Marku;
//! use std::sync::Arc;
//!
//! let transport = HttpTransport::new()?;
//! let marku = Marku::new(page, Arc::new(transport));
//! ```

use crate::config::Config;
use crate::error::{Result, TransportError};
use crate::transport::{
    endpoint, BatchReadRequest, BatchResponse, BatchWriteRequest, Transport, DEFAULT_TIMEOUT,
    READ_PATH, WRITE_PATH,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;

/// Posts batches as JSON over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport whose requests time out after
    /// [`DEFAULT_TIMEOUT`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Wraps an existing client, keeping its settings. `timeout` is the bound
    /// the client was built with and is reported when a request expires.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }

    async fn post<B>(&self, config: &Config, path: &str, body: &B) -> Result<BatchResponse>
    where
        B: Serialize + ?Sized + Sync,
    {
        config.ensure_valid()?;
        let url = endpoint(&config.api_base_url, path)?;
        tracing::debug!(%url, "posting batch");
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| self.map_error(err))?;
        self.decode_response(resp).await
    }

    async fn decode_response(&self, resp: Response) -> Result<BatchResponse> {
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await.map_err(|err| self.map_error(err))?;
        let response: BatchResponse = serde_json::from_slice(&bytes)?;
        tracing::debug!(code = response.code, message = ?response.message, "batch response");
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn batch_read(
        &self,
        config: &Config,
        request: &BatchReadRequest,
    ) -> Result<BatchResponse> {
        self.post(config, READ_PATH, request).await
    }

    async fn batch_write(
        &self,
        config: &Config,
        request: &BatchWriteRequest,
    ) -> Result<BatchResponse> {
        self.post(config, WRITE_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Reads one request and returns its head once the body is complete.
    async fn read_http_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                assert!(n > 0, "connection closed before the request head");
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length || n == 0 {
                return head;
            }
        }
    }

    /// Serves one connection with `response` and yields the request head.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_http_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            head
        });
        (base, handle)
    }

    fn read_request() -> BatchReadRequest {
        BatchReadRequest {
            site_id: "s".into(),
            keys: vec!["a".into()],
            url: None,
        }
    }

    #[tokio::test]
    async fn test_missing_config_fails_locally() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .batch_read(&Config::new("s", ""), &read_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Config(ConfigError::MissingApiBaseUrl)
        ));
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .batch_read(&Config::new("s", "::not-a-url"), &read_request())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Url(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(2)).unwrap();
        let request = BatchWriteRequest {
            site_id: "s".into(),
            url: None,
            counters: Vec::new(),
        };
        // Port 9 (discard) is closed on test machines.
        let err = transport
            .batch_write(&Config::new("s", "http://127.0.0.1:9"), &request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Request(_) | TransportError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let (base, server) = serve_once(http_response("500 Internal Server Error", "")).await;
        let transport = HttpTransport::new().unwrap();

        let err = transport
            .batch_read(&Config::new("s", base), &read_request())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Status(500)));
        let head = server.await.unwrap();
        assert!(head.starts_with("POST /api/count/batch "));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let (base, server) = serve_once(http_response("200 OK", "{not json")).await;
        let transport = HttpTransport::new().unwrap();
        let request = BatchWriteRequest {
            site_id: "s".into(),
            url: Some("/post".into()),
            counters: Vec::new(),
        };

        let err = transport
            .batch_write(&Config::new("s", base), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Decode(_)));
        let head = server.await.unwrap();
        assert!(head.starts_with("POST /api/increment/batch "));
    }

    #[tokio::test]
    async fn test_success_without_data() {
        let (base, server) = serve_once(http_response("200 OK", r#"{"code":200}"#)).await;
        let transport = HttpTransport::new().unwrap();

        let response = transport
            .batch_read(&Config::new("s", base), &read_request())
            .await
            .unwrap();

        assert!(response.is_success());
        assert!(response.into_counts().unwrap().is_empty());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_timeout_is_reported_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_http_request(&mut socket).await;
            // Hold the connection open without answering.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let timeout = Duration::from_millis(200);
        let transport = HttpTransport::with_timeout(timeout).unwrap();

        let err = transport
            .batch_read(&Config::new("s", base), &read_request())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout(d) if d == timeout));
        server.abort();
    }
}
