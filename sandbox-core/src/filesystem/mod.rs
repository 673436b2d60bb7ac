//! Filesystem driver: byte-level read/write over envd's HTTP download/upload
//! endpoints, plus typed stat/list/mkdir/move/remove RPCs and directory
//! watching. The streaming read mode exposes a `Stream<Item = Result<Bytes>>`
//! over the HTTP response body so large files never need to be buffered
//! whole in memory.

pub mod types;
pub mod watch;

use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
use mime_guess::from_path;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::SandboxError;
use crate::filesystem::types::EntryInfo;
use crate::filesystem::types::FileType;
use crate::filesystem::types::WriteData;
use crate::filesystem::types::WriteEntry;
use crate::filesystem::types::map_file_type;
use crate::filesystem::watch::WatchHandle;
use crate::filesystem::watch::WatchStream;
use crate::transport::ConnectTransport;

/// Minimum envd version supporting recursive directory watching.
/// `watch_dir(recursive = true)` against an older envd fails fast with a
/// `Template` error rather than silently watching non-recursively.
pub const ENVD_VERSION_RECURSIVE_WATCH: &str = "0.1.5";

#[derive(Debug, Serialize)]
struct StatRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryWire {
    name: String,
    r#type: String,
    path: String,
    size: i64,
    mode: u32,
    permissions: String,
    owner: String,
    group: String,
    modified_time: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    symlink_target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
    entry: EntryWire,
}

#[derive(Debug, Serialize)]
struct ListDirRequest<'a> {
    path: &'a str,
    depth: u32,
}

#[derive(Debug, Deserialize)]
struct ListDirResponse {
    entries: Vec<EntryWire>,
}

#[derive(Debug, Serialize)]
struct MakeDirRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct MoveRequest<'a> {
    source: &'a str,
    destination: &'a str,
}

#[derive(Debug, Serialize)]
struct RemoveRequest<'a> {
    path: &'a str,
}

fn entry_from_wire(w: EntryWire) -> Option<EntryInfo> {
    Some(EntryInfo {
        name: w.name,
        r#type: map_file_type(&w.r#type)?,
        path: w.path,
        size: w.size,
        mode: w.mode,
        permissions: w.permissions,
        owner: w.owner,
        group: w.group,
        modified_time: w.modified_time,
        symlink_target: w.symlink_target,
    })
}

/// Byte-level read result mode: text, whole-buffer bytes, or a chunk stream.
pub enum ReadContent {
    Text(String),
    Bytes(Vec<u8>),
    Stream(Box<dyn Stream<Item = Result<Bytes>> + Send + Unpin>),
}

pub struct Filesystem {
    transport: ConnectTransport,
    envd_api_url: String,
    envd_version: Option<String>,
}

impl Filesystem {
    pub(crate) fn new(
        transport: ConnectTransport,
        envd_api_url: String,
        envd_version: Option<String>,
    ) -> Self {
        Self {
            transport,
            envd_api_url,
            envd_version,
        }
    }

    fn download_client(&self) -> &reqwest::Client {
        self.transport.http_client()
    }

    /// Reads a file as UTF-8 text via `GET /download/{path}`.
    pub async fn read_text(&self, path: &str) -> Result<String> {
        match self.read(path, ReadFormat::Text).await? {
            ReadContent::Text(s) => Ok(s),
            _ => unreachable!("ReadFormat::Text always yields ReadContent::Text"),
        }
    }

    /// Reads a file as raw bytes via `GET /download/{path}`.
    pub async fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        match self.read(path, ReadFormat::Bytes).await? {
            ReadContent::Bytes(b) => Ok(b),
            _ => unreachable!("ReadFormat::Bytes always yields ReadContent::Bytes"),
        }
    }

    /// Opens a file for streamed reading; the HTTP body closes when the
    /// stream is drained or dropped.
    pub async fn read_stream(
        &self,
        path: &str,
    ) -> Result<Box<dyn Stream<Item = Result<Bytes>> + Send + Unpin>> {
        match self.read(path, ReadFormat::Stream).await? {
            ReadContent::Stream(s) => Ok(s),
            _ => unreachable!("ReadFormat::Stream always yields ReadContent::Stream"),
        }
    }

    async fn read(&self, path: &str, format: ReadFormat) -> Result<ReadContent> {
        let url = format!(
            "{}/download/{}",
            self.envd_base_url(),
            path.trim_start_matches('/')
        );
        let resp = self.download_client().get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::from_status(status, body));
        }
        match format {
            ReadFormat::Text => Ok(ReadContent::Text(resp.text().await?)),
            ReadFormat::Bytes => Ok(ReadContent::Bytes(resp.bytes().await?.to_vec())),
            ReadFormat::Stream => {
                let stream = resp
                    .bytes_stream()
                    .map(|r| r.map_err(SandboxError::Reqwest));
                Ok(ReadContent::Stream(Box::new(Box::pin(stream))))
            }
        }
    }

    /// Writes a single file via `POST /upload` multipart.
    pub async fn write(&self, path: &str, data: WriteData) -> Result<crate::filesystem::types::WriteInfo> {
        let mut results = self
            .write_many(vec![WriteEntry {
                path: path.to_string(),
                data,
            }])
            .await?;
        Ok(results.remove(0))
    }

    /// Writes a batch of files. An empty batch returns an empty list without
    /// making any request.
    pub async fn write_many(
        &self,
        files: Vec<WriteEntry>,
    ) -> Result<Vec<crate::filesystem::types::WriteInfo>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let path = file.path.clone();
            let name = path
                .rsplit('/')
                .next()
                .unwrap_or(&path)
                .to_string();
            let mime = from_path(&path).first_or_octet_stream();
            let part = Part::bytes(file.data.into_bytes())
                .file_name(path.clone())
                .mime_str(mime.as_ref())
                .map_err(|e| SandboxError::InvalidArgument(format!("invalid mime type: {e}")))?;
            let form = Form::new().part("file", part).text("path", path.clone());

            let url = format!("{}/upload", self.envd_base_url());
            let resp = self.download_client().post(&url).multipart(form).send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(SandboxError::from_status(status, body));
            }

            results.push(crate::filesystem::types::WriteInfo {
                path,
                name,
                r#type: FileType::File,
            });
        }
        Ok(results)
    }

    pub async fn stat(&self, path: &str) -> Result<EntryInfo> {
        let body = StatRequest { path };
        let resp: StatResponse = self
            .transport
            .unary("/filesystem.Filesystem/Stat", &body, None)
            .await?;
        entry_from_wire(resp.entry)
            .ok_or_else(|| SandboxError::Sandbox("server returned an unrecognized entry type".into()))
    }

    /// `false` when the server reports "no such file or directory";
    /// otherwise propagates other errors.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(SandboxError::NotFound(msg)) if msg.contains("no such file or directory") => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// `depth < 1` is rejected locally without reaching the server.
    pub async fn list_dir(&self, path: &str, depth: u32) -> Result<Vec<EntryInfo>> {
        if depth < 1 {
            return Err(SandboxError::InvalidArgument(
                "depth should be at least 1".into(),
            ));
        }
        let body = ListDirRequest { path, depth };
        let resp: ListDirResponse = self
            .transport
            .unary("/filesystem.Filesystem/ListDir", &body, None)
            .await?;
        Ok(resp.entries.into_iter().filter_map(entry_from_wire).collect())
    }

    /// `true` on creation, `false` when the directory already existed.
    pub async fn make_dir(&self, path: &str) -> Result<bool> {
        let body = MakeDirRequest { path };
        match self
            .transport
            .unary::<_, serde_json::Value>("/filesystem.Filesystem/MakeDir", &body, None)
            .await
        {
            Ok(_) => Ok(true),
            Err(SandboxError::Sandbox(msg)) if msg.contains("directory already exists") => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn rename(&self, source: &str, destination: &str) -> Result<EntryInfo> {
        let body = MoveRequest { source, destination };
        let resp: StatResponse = self
            .transport
            .unary("/filesystem.Filesystem/Move", &body, None)
            .await?;
        entry_from_wire(resp.entry)
            .ok_or_else(|| SandboxError::Sandbox("server returned an unrecognized entry type".into()))
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        let body = RemoveRequest { path };
        let _: serde_json::Value = self
            .transport
            .unary("/filesystem.Filesystem/Remove", &body, None)
            .await?;
        Ok(())
    }

    /// Legacy poll-based watcher.
    pub async fn create_watcher(&self, path: &str, recursive: bool) -> Result<WatchHandle> {
        self.check_recursive_support(recursive)?;
        WatchHandle::create(self.transport.clone(), path, recursive).await
    }

    /// Streaming watcher: opens a server-streaming RPC and yields events
    /// until cancelled.
    pub async fn watch_dir(&self, path: &str, recursive: bool) -> Result<WatchStream> {
        self.check_recursive_support(recursive)?;
        #[derive(Serialize)]
        struct WatchDirRequest<'a> {
            path: &'a str,
            recursive: bool,
        }
        let body = WatchDirRequest { path, recursive };
        let inner = self
            .transport
            .server_stream("/filesystem.Filesystem/WatchDir", &body, None)
            .await?;
        Ok(WatchStream::new(inner))
    }

    fn check_recursive_support(&self, recursive: bool) -> Result<()> {
        if !recursive {
            return Ok(());
        }
        // Lexicographic comparison is sufficient for the zero-padded
        // `major.minor.patch` versions envd reports; a real semver compare
        // would be overkill for a three-field version string.
        if let Some(version) = &self.envd_version
            && version.as_str() < ENVD_VERSION_RECURSIVE_WATCH
        {
            return Err(SandboxError::Template(
                "you need to update the template to use recursive watching. You can do this by rebuilding the template.".into(),
            ));
        }
        Ok(())
    }

    fn envd_base_url(&self) -> &str {
        &self.envd_api_url
    }
}

enum ReadFormat {
    Text,
    Bytes,
    Stream,
}
