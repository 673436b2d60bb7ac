//! Shared value types for the filesystem driver: `EntryInfo`, `FileType`,
//! `WriteInfo`, and the watcher's `FilesystemEvent`/`FilesystemEventType`.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    File,
    Dir,
}

/// Maps the server's file-type enum to [`FileType`]. Unrecognized values
/// return `None` so callers can drop the entry, matching the forward-
/// compatible handling.
pub fn map_file_type(raw: &str) -> Option<FileType> {
    match raw {
        "FILE_TYPE_FILE" | "FILE" => Some(FileType::File),
        "FILE_TYPE_DIRECTORY" | "DIRECTORY" | "DIR" => Some(FileType::Dir),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    pub r#type: FileType,
    pub path: String,
    pub size: i64,
    pub mode: u32,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub modified_time: DateTime<Utc>,
    pub symlink_target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteInfo {
    pub path: String,
    pub name: String,
    pub r#type: FileType,
}

/// A single file to write in a batch `write` call.
#[derive(Debug, Clone)]
pub struct WriteEntry {
    pub path: String,
    pub data: WriteData,
}

#[derive(Debug, Clone)]
pub enum WriteData {
    Text(String),
    Bytes(Vec<u8>),
}

impl WriteData {
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            WriteData::Text(s) => s.into_bytes(),
            WriteData::Bytes(b) => b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemEventType {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

/// Maps the server's watcher-event enum the same forward-compatible way as
/// [`map_file_type`].
pub fn map_event_type(raw: &str) -> Option<FilesystemEventType> {
    match raw {
        "EVENT_TYPE_CREATE" | "CREATE" => Some(FilesystemEventType::Create),
        "EVENT_TYPE_WRITE" | "WRITE" => Some(FilesystemEventType::Write),
        "EVENT_TYPE_REMOVE" | "REMOVE" => Some(FilesystemEventType::Remove),
        "EVENT_TYPE_RENAME" | "RENAME" => Some(FilesystemEventType::Rename),
        "EVENT_TYPE_CHMOD" | "CHMOD" => Some(FilesystemEventType::Chmod),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemEvent {
    pub name: String,
    pub r#type: FilesystemEventType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_file_type_is_dropped() {
        assert_eq!(map_file_type("FILE_TYPE_SOCKET"), None);
    }

    #[test]
    fn unrecognized_event_type_is_dropped() {
        assert_eq!(map_event_type("EVENT_TYPE_UNKNOWN"), None);
    }
}
