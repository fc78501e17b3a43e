use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::JobError;

/// The closed set of job variants. Written into pack tickets as `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    File,
    Folder,
    Webhook,
    Packed,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::File => "file",
            JobKind::Folder => "folder",
            JobKind::Webhook => "webhook",
            JobKind::Packed => "packed",
        }
    }

    /// Parses a ticket `kind`, returning `None` for anything unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(JobKind::File),
            "folder" => Some(JobKind::Folder),
            "webhook" => Some(JobKind::Webhook),
            "packed" => Some(JobKind::Packed),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    #[default]
    Zip,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
        }
    }
}

/// A file inside a folder job, relative to the folder root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    relative_path: PathBuf,
    size: u64,
}

impl FileEntry {
    pub fn new(relative_path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            size,
        }
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn basename(&self) -> String {
        self.relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<String> {
        self.relative_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }

    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.relative_path)
            .first_or_octet_stream()
            .to_string()
    }
}

/// Variant-specific data carried by a [`Job`](super::Job).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    File,
    Folder { children: Vec<FileEntry> },
    Webhook,
    Packed { format: ArchiveFormat },
}

impl Payload {
    pub fn kind(&self) -> JobKind {
        match self {
            Payload::File => JobKind::File,
            Payload::Folder { .. } => JobKind::Folder,
            Payload::Webhook => JobKind::Webhook,
            Payload::Packed { .. } => JobKind::Packed,
        }
    }
}

/// Lists every regular file below `root`, sorted by path.
pub(crate) fn scan_children(root: &Path) -> Result<Vec<FileEntry>, JobError> {
    let mut children = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());
        let size = entry.metadata()?.len();
        children.push(FileEntry::new(relative, size));
    }
    Ok(children)
}
