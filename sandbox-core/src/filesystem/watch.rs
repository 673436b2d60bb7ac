//! Directory watching: the legacy poll-based `WatchHandle` and the
//! streaming `watch_dir` RPC.

use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::SandboxError;
use crate::filesystem::types::FilesystemEvent;
use crate::filesystem::types::map_event_type;
use crate::transport::ConnectTransport;
use crate::transport::codec::decode_message;
use crate::transport::codec::Encoding;

#[derive(Debug, Serialize)]
struct CreateWatcherRequest<'a> {
    path: &'a str,
    recursive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWatcherResponse {
    watcher_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetWatcherEventsRequest<'a> {
    watcher_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct WatcherEventWire {
    name: String,
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct GetWatcherEventsResponse {
    events: Vec<WatcherEventWire>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveWatcherRequest<'a> {
    watcher_id: &'a str,
}

/// Poll-based watcher handle. Becomes unusable once [`WatchHandle::stop`] is
/// called: `get_new_events` afterward returns `SandboxError::Sandbox`.
pub struct WatchHandle {
    transport: ConnectTransport,
    watcher_id: String,
    closed: bool,
}

impl WatchHandle {
    pub(crate) async fn create(
        transport: ConnectTransport,
        path: &str,
        recursive: bool,
    ) -> Result<Self> {
        let body = CreateWatcherRequest { path, recursive };
        let resp: CreateWatcherResponse = transport
            .unary("/filesystem.Filesystem/CreateWatcher", &body, None)
            .await?;
        Ok(Self {
            transport,
            watcher_id: resp.watcher_id,
            closed: false,
        })
    }

    pub fn watcher_id(&self) -> &str {
        &self.watcher_id
    }

    /// Drains events accumulated since the last call (or since creation).
    pub async fn get_new_events(&self) -> Result<Vec<FilesystemEvent>> {
        if self.closed {
            return Err(SandboxError::Sandbox(
                "the watcher is already stopped".into(),
            ));
        }
        let body = GetWatcherEventsRequest {
            watcher_id: &self.watcher_id,
        };
        let resp: GetWatcherEventsResponse = self
            .transport
            .unary("/filesystem.Filesystem/GetWatcherEvents", &body, None)
            .await?;
        Ok(resp
            .events
            .into_iter()
            .filter_map(|e| {
                map_event_type(&e.r#type).map(|t| FilesystemEvent {
                    name: e.name,
                    r#type: t,
                })
            })
            .collect())
    }

    /// Finalizes the watcher server-side. Idempotent at the type level: a
    /// second call is a programmer error caught by `get_new_events`'s guard,
    /// not re-issued against the server.
    pub async fn stop(&mut self) -> Result<()> {
        let body = RemoveWatcherRequest {
            watcher_id: &self.watcher_id,
        };
        let _: serde_json::Value = self
            .transport
            .unary("/filesystem.Filesystem/RemoveWatcher", &body, None)
            .await?;
        self.closed = true;
        Ok(())
    }
}

/// Streaming directory watch: each yielded item is one decoded
/// `FilesystemEvent`, continuing until the caller drops the stream (which
/// cancels the underlying RPC) or the server ends it.
pub struct WatchStream {
    inner: crate::transport::FrameStream,
}

impl WatchStream {
    pub(crate) fn new(inner: crate::transport::FrameStream) -> Self {
        Self { inner }
    }

    pub fn cancel(&mut self) {
        self.inner.cancel();
    }
}

impl Stream for WatchStream {
    type Item = Result<FilesystemEvent>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match std::pin::Pin::new(&mut this.inner).poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(frame))) => {
                    if frame.is_end_stream() {
                        return std::task::Poll::Ready(None);
                    }
                    let wire: std::result::Result<WatcherEventWire, _> =
                        decode_message(Encoding::Json, &frame.payload);
                    match wire {
                        Ok(w) => match map_event_type(&w.r#type) {
                            // Unrecognized event type: drop and poll again,
                            // matching the forward-compatible skip in `list`.
                            Some(t) => {
                                return std::task::Poll::Ready(Some(Ok(FilesystemEvent {
                                    name: w.name,
                                    r#type: t,
                                })));
                            }
                            None => continue,
                        },
                        Err(e) => return std::task::Poll::Ready(Some(Err(e))),
                    }
                }
                std::task::Poll::Ready(Some(Err(e))) => return std::task::Poll::Ready(Some(Err(e))),
                std::task::Poll::Ready(None) => return std::task::Poll::Ready(None),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}
