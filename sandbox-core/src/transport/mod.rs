//! Connect-RPC transport: a pooled HTTP/2 client able to drive the four
//! call shapes (unary, server-streaming, client-streaming, bidirectional)
//! against an envd agent. Streaming responses are demultiplexed on a spawned
//! task that bridges the raw byte stream into an mpsc channel consumed as a
//! `Stream`, using the frame codec in [`frame`] and [`codec`].

pub mod codec;
pub mod frame;

use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::connection_config::ConnectionConfig;
use crate::error::Result;
use crate::error::SandboxError;
use crate::flags::SBX_STREAM_IDLE_TIMEOUT_MS;
use crate::flags::SBX_TRANSPORT_BACKOFF_FACTOR_SECS;
use crate::flags::SBX_TRANSPORT_MAX_RETRIES;
use crate::transport::codec::Encoding;
use crate::transport::codec::RpcMessage;
use crate::transport::codec::decode_message;
use crate::transport::codec::encode_message;
use crate::transport::frame::Frame;
use crate::transport::frame::FrameDecoder;
use crate::util::backoff;

/// Pooled HTTP/2 client shared by every sub-client (management API, process
/// supervisor, filesystem driver, code interpreter). One `ConnectTransport`
/// is created per `ConnectionConfig` and cloned cheaply (the inner
/// `reqwest::Client` is itself an `Arc`).
///
/// Two distinct base URLs are derived from it: [`Self::management_base_url`]
/// (the control-plane host, `config.domain`, unaffected by `debug`) for the
/// Management API, and [`Self::envd_base_url`] (the per-sandbox envd agent)
/// for everything in [`crate::filesystem`], [`crate::process`] and
/// [`crate::code_interpreter`]. `envd_host`/`envd_access_token` start `None`
/// on a freshly-built transport and are filled in by
/// [`Self::with_envd`] once `create`/`connect` learns the sandbox's actual
/// `sandboxDomain` and (if secured) its envd access token.
#[derive(Clone)]
pub struct ConnectTransport {
    client: reqwest::Client,
    config: ConnectionConfig,
    envd_host: Option<String>,
    envd_access_token: Option<String>,
}

impl ConnectTransport {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .http2_keep_alive_interval(Duration::from_secs(20))
            .http2_keep_alive_timeout(Duration::from_secs(10))
            .http2_keep_alive_while_idle(true)
            // A debug session usually talks to a local envd behind a
            // self-signed or no certificate at all.
            .danger_accept_invalid_certs(config.debug);

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        let client = builder.build()?;
        Ok(Self {
            client,
            config,
            envd_host: None,
            envd_access_token: None,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The pooled HTTP client, for sub-clients (the filesystem driver's
    /// download/upload endpoints) that bypass the Connect-RPC framing.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Returns a clone of this transport scoped to one sandbox's envd agent:
    /// `host` is the sandbox's `sandboxDomain`, and `access_token` is its
    /// `envdAccessToken` when the sandbox was
    /// created `secure: true`. Falls back to `ConnectionConfig::access_token`
    /// when the sandbox did not hand back its own token (e.g. a manual
    /// `debug` connection to a local envd).
    pub fn with_envd(&self, host: Option<String>, access_token: Option<String>) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            envd_host: host,
            envd_access_token: access_token.or_else(|| self.config.access_token.clone()),
        }
    }

    /// Base URL for the per-sandbox envd agent: `sandboxDomain` (`envd_host`)
    /// wins when non-empty, else the connection config's `domain`. `debug` always wins
    /// over both, since a debug session talks to a local envd regardless of
    /// what the control plane reports.
    pub(crate) fn envd_base_url(&self) -> String {
        if self.config.debug {
            return format!("http://{}", self.config.debug_host);
        }
        match self.envd_host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) => format!("https://{host}"),
            None => self.config.api_url(),
        }
    }

    /// Base URL for the control-plane Management API: always
    /// `https://{domain}`, independent of `debug` (debug only affects envd
    /// reachability, never the control plane itself).
    pub(crate) fn management_base_url(&self) -> String {
        self.config.api_url()
    }

    fn build_envd_headers(&self, timeout_ms: Option<u64>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer root"),
        );
        if let Some(token) = &self.envd_access_token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| SandboxError::InvalidArgument(format!("invalid access token: {e}")))?;
            headers.insert(HeaderName::from_static("x-access-token"), value);
        }
        if let Some(ms) = timeout_ms {
            let value = HeaderValue::from_str(&ms.to_string())
                .map_err(|e| SandboxError::InvalidArgument(format!("invalid timeout header: {e}")))?;
            headers.insert(HeaderName::from_static("connect-timeout-ms"), value);
        }
        self.merge_extra_headers(&mut headers)?;
        Ok(headers)
    }

    /// Headers for a Management API call: an `Authorization: Bearer <api
    /// key>` in place of envd's fixed `Bearer root` / `X-Access-Token` pair,
    /// since the control plane authenticates the caller's account rather
    /// than a single sandbox.
    fn build_management_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| SandboxError::InvalidArgument(format!("invalid api key: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        self.merge_extra_headers(&mut headers)?;
        Ok(headers)
    }

    /// Merges `config.headers` last, never clobbering `Authorization`: the
    /// caller may supply `extraHeaders` but cannot overwrite Authorization.
    fn merge_extra_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        for (key, value) in &self.config.headers {
            let name = HeaderName::try_from(key.as_str())
                .map_err(|e| SandboxError::InvalidArgument(format!("invalid header name {key}: {e}")))?;
            if name == reqwest::header::AUTHORIZATION {
                continue;
            }
            let value = HeaderValue::from_str(value)
                .map_err(|e| SandboxError::InvalidArgument(format!("invalid header value for {key}: {e}")))?;
            headers.insert(name, value);
        }
        Ok(())
    }

    /// Single request/single response call. Retries on connection failure or
    /// 500/502/503/504, bounded by `SBX_TRANSPORT_MAX_RETRIES`.
    pub async fn unary<Req: serde::Serialize + Send + Sync, Resp: RpcMessage>(
        &self,
        path: &str,
        req: &Req,
        timeout_ms: Option<u64>,
    ) -> Result<Resp> {
        let url = format!("{}{path}", self.envd_base_url());
        let body = encode_message(Encoding::Json, req)?;
        let headers = self.build_envd_headers(timeout_ms)?;

        let mut attempt = 0u64;
        loop {
            attempt += 1;
            debug!(url, attempt, "unary call");
            let result = self
                .client
                .post(&url)
                .headers(headers.clone())
                .header(
                    reqwest::header::CONTENT_TYPE,
                    Encoding::Json.unary_content_type(),
                )
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp.bytes().await?;
                    return decode_message(Encoding::Json, &bytes);
                }
                Ok(resp) => {
                    let status = resp.status();
                    if !should_retry_status(status) || attempt > *SBX_TRANSPORT_MAX_RETRIES {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(SandboxError::from_status(status, text));
                    }
                    tokio::time::sleep(backoff(attempt, Duration::from_secs_f64(*SBX_TRANSPORT_BACKOFF_FACTOR_SECS))).await;
                }
                Err(e) => {
                    if attempt > *SBX_TRANSPORT_MAX_RETRIES {
                        return Err(e.into());
                    }
                    tokio::time::sleep(backoff(attempt, Duration::from_secs_f64(*SBX_TRANSPORT_BACKOFF_FACTOR_SECS))).await;
                }
            }
        }
    }

    /// `GET` against the Management API (`listSandboxes`, `getInfo`,
    /// `getMetrics`). Retries the same way [`Self::unary`] does.
    pub async fn get<Resp: RpcMessage>(&self, path: &str) -> Result<Resp> {
        self.rest_call::<(), Resp>(reqwest::Method::GET, path, None).await
    }

    /// `POST` against the Management API (`createSandbox`, `setTimeout`,
    /// `pause`, `connect`).
    pub async fn post<Req: serde::Serialize + Send + Sync, Resp: RpcMessage>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        self.rest_call(reqwest::Method::POST, path, Some(body)).await
    }

    /// `DELETE` against the Management API (`kill`).
    pub async fn delete<Resp: RpcMessage>(&self, path: &str) -> Result<Resp> {
        self.rest_call::<(), Resp>(reqwest::Method::DELETE, path, None).await
    }

    /// Plain REST call against the Management API: unlike [`Self::unary`],
    /// the HTTP method is caller-chosen and the body is optional -- the
    /// Management API is a regular REST surface, not Connect-RPC. Retry
    /// policy mirrors `unary`.
    async fn rest_call<Req: serde::Serialize + Send + Sync, Resp: RpcMessage>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Req>,
    ) -> Result<Resp> {
        let url = format!("{}{path}", self.management_base_url());
        let headers = self.build_management_headers()?;
        let encoded_body = body.map(|b| encode_message(Encoding::Json, b)).transpose()?;

        let mut attempt = 0u64;
        loop {
            attempt += 1;
            debug!(url, %method, attempt, "management call");
            let mut req = self
                .client
                .request(method.clone(), &url)
                .headers(headers.clone());
            if let Some(b) = &encoded_body {
                req = req
                    .header(reqwest::header::CONTENT_TYPE, Encoding::Json.unary_content_type())
                    .body(b.clone());
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp.bytes().await?;
                    if bytes.is_empty() {
                        return decode_message(Encoding::Json, b"null");
                    }
                    return decode_message(Encoding::Json, &bytes);
                }
                Ok(resp) => {
                    let status = resp.status();
                    if !should_retry_status(status) || attempt > *SBX_TRANSPORT_MAX_RETRIES {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(SandboxError::from_status(
                            status,
                            SandboxError::message_from_body(&text),
                        ));
                    }
                    tokio::time::sleep(backoff(attempt, Duration::from_secs_f64(*SBX_TRANSPORT_BACKOFF_FACTOR_SECS))).await;
                }
                Err(e) => {
                    if attempt > *SBX_TRANSPORT_MAX_RETRIES {
                        return Err(e.into());
                    }
                    tokio::time::sleep(backoff(attempt, Duration::from_secs_f64(*SBX_TRANSPORT_BACKOFF_FACTOR_SECS))).await;
                }
            }
        }
    }

    /// Server-streaming call: one request, a stream of framed responses. The
    /// underlying byte stream is demultiplexed into [`Frame`]s on a spawned
    /// task and delivered through an mpsc channel, mirroring `process_sse`.
    pub async fn server_stream(
        &self,
        path: &str,
        req: &impl serde::Serialize,
        timeout_ms: Option<u64>,
    ) -> Result<FrameStream> {
        let url = format!("{}{path}", self.envd_base_url());
        let body = encode_message(Encoding::Json, req)?;
        let headers = self.build_envd_headers(timeout_ms)?;

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .header(
                reqwest::header::CONTENT_TYPE,
                Encoding::Json.streaming_content_type(),
            )
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SandboxError::from_status(status, text));
        }

        Ok(spawn_frame_stream(resp.bytes_stream()))
    }

    /// Bidirectional call: caller pushes request frames into the returned
    /// sender while reading response frames from the returned [`FrameStream`].
    /// Client-streaming reuses this with the sender closed after the first
    /// send.
    pub async fn duplex_stream(
        &self,
        path: &str,
        timeout_ms: Option<u64>,
    ) -> Result<(mpsc::Sender<Bytes>, FrameStream)> {
        let url = format!("{}{path}", self.envd_base_url());
        let headers = self.build_envd_headers(timeout_ms)?;

        let (tx_body, rx_body) = mpsc::channel::<Bytes>(32);
        let body_stream = tokio_stream_from_receiver(rx_body);
        let body = reqwest::Body::wrap_stream(body_stream);

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .header(
                reqwest::header::CONTENT_TYPE,
                Encoding::Json.streaming_content_type(),
            )
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SandboxError::from_status(status, text));
        }

        Ok((tx_body, spawn_frame_stream(resp.bytes_stream())))
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn tokio_stream_from_receiver(
    rx: mpsc::Receiver<Bytes>,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
    tokio_stream::wrappers::ReceiverStream::new(rx).map(Ok)
}

/// Cancellable handle bridging a spawned demultiplexer task to a consumer
/// `Stream`. `status()` is only meaningful after the stream has yielded
/// `None`; it is set from the trailer frame.
pub struct FrameStream {
    rx: mpsc::Receiver<Result<Frame>>,
    cancel: Option<oneshot::Sender<()>>,
    status: Option<Result<()>>,
}

impl FrameStream {
    /// Aborts the underlying HTTP body read. Used when a caller drops a
    /// streaming call early (e.g. `commands.run(background=True)` followed
    /// by disconnect).
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// `Some` once the stream has ended, reflecting the trailer's status.
    pub fn status(&self) -> Option<&Result<()>> {
        self.status.as_ref()
    }
}

impl Stream for FrameStream {
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if frame.is_end_stream() {
                    self.status = Some(Ok(()));
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.status = Some(Err(match &e {
                    SandboxError::Cancelled => SandboxError::Cancelled,
                    other => SandboxError::Sandbox(other.to_string()),
                }));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn spawn_frame_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> FrameStream {
    let (tx, rx) = mpsc::channel::<Result<Frame>>(64);
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut byte_stream = Box::pin(byte_stream);
        let mut decoder = FrameDecoder::new();
        let idle_timeout = *SBX_STREAM_IDLE_TIMEOUT_MS;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    trace!("frame stream cancelled");
                    return;
                }
                chunk = timeout(idle_timeout, byte_stream.next()) => {
                    match chunk {
                        Ok(Some(Ok(bytes))) => {
                            match decoder.push(bytes) {
                                Ok(frames) => {
                                    for frame in frames {
                                        if tx.send(Ok(frame)).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                Err(e) => {
                                    let _ = tx.send(Err(e)).await;
                                    return;
                                }
                            }
                        }
                        Ok(Some(Err(e))) => {
                            let _ = tx.send(Err(SandboxError::Reqwest(e))).await;
                            return;
                        }
                        Ok(None) => {
                            if decoder.has_trailing_partial() {
                                warn!("stream ended with a partial frame buffered");
                                let _ = tx
                                    .send(Err(SandboxError::Sandbox(
                                        "connection closed mid-frame".into(),
                                    )))
                                    .await;
                            }
                            return;
                        }
                        Err(_) => {
                            let _ = tx
                                .send(Err(SandboxError::Timeout(
                                    "idle timeout waiting for stream frame".into(),
                                )))
                                .await;
                            return;
                        }
                    }
                }
            }
        }
    });

    FrameStream {
        rx,
        cancel: Some(cancel_tx),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]
    use super::*;

    #[test]
    fn retryable_statuses_match_5xx_subset() {
        assert!(should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(should_retry_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!should_retry_status(StatusCode::NOT_FOUND));
        assert!(!should_retry_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn base_url_uses_debug_host_in_debug_mode() {
        let config = ConnectionConfig::builder()
            .domain("api.example.com")
            .debug(true)
            .debug_host("localhost:8080")
            .build()
            .expect("build");
        let transport = ConnectTransport::new(config).expect("transport");
        assert_eq!(transport.envd_base_url(), "http://localhost:8080");
    }

    #[test]
    fn base_url_uses_https_domain_outside_debug_mode() {
        let config = ConnectionConfig::builder()
            .domain("api.example.com")
            .build()
            .expect("build");
        let transport = ConnectTransport::new(config).expect("transport");
        assert_eq!(transport.envd_base_url(), "https://api.example.com");
    }
}
