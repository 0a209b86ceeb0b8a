//!
//! Virtual-root file service
//! -------------------------
//! Exposes a set of independently configured "virtual root" directories
//! through a uniform, security-bounded listing/download interface. A request
//! names a virtual root and a relative path; resolution classifies the entry,
//! follows symlink chains, and verifies the resolved target never escapes the
//! root's source directory.
//!
//! Submodules:
//! - `service`: root registry, path resolution and directory listing.
//! - `meta`: attribute extraction (size, permissions, ownership, mime, times).
//! - `query`: pagination/sort parameter parsing and the collection envelope.
//! - `handler`: axum handlers mapping the service onto `/api/v1/files`.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub mod handler;
pub mod meta;
pub mod query;
pub mod service;

pub use meta::Metadata;
pub use service::Service;

/// Route prefix under which all file resources are served.
pub const API_BASE: &str = "/api/v1/files";

/// Errors produced by the file service.
///
/// Construction failures (`EmptyRoots`, `DuplicateRoot`, `ResolveRoot`) are
/// fatal at startup; the rest surface per request. Messages carry the virtual
/// path only, never the host-absolute path.
#[derive(Debug, Error)]
pub enum FilesError {
    #[error("no file roots provided")]
    EmptyRoots,

    #[error("duplicate file root: {0}")]
    DuplicateRoot(String),

    #[error("resolve file root {virtual_name}: {source}")]
    ResolveRoot {
        virtual_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file root not found: {0}")]
    RootNotFound(String),

    #[error("path escapes configured root: {0}")]
    OutsideRoot(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("{op} {virtual_path}: {source}")]
    Stat {
        op: &'static str,
        virtual_path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request canceled")]
    Canceled,

    #[error("{0}")]
    InvalidQuery(String),
}

/// Classification of a path itself, before following any symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    File,
    Folder,
    Symlink,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::File => "file",
            ResourceKind::Folder => "folder",
            ResourceKind::Symlink => "symlink",
        }
    }
}

/// Classification after following a symlink chain. A symlink always resolves
/// to one of these; a non-symlink is its own target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Folder,
}

/// Maps a virtual folder name to a source directory. The source is stored in
/// canonicalized absolute form once the registry is constructed.
#[derive(Debug, Clone)]
pub struct Root {
    pub virtual_name: String,
    pub source: PathBuf,
}

/// A fully resolved, classified view of one filesystem entry at a point in
/// time. Recomputed on every request; never cached.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub root: Root,
    pub virtual_path: String,
    pub rel_path: String,
    pub name: String,
    pub kind: ResourceKind,
    pub target_kind: TargetKind,
    /// Resolved target path; always equal to or a descendant of `root.source`.
    pub absolute_path: PathBuf,
    /// The symlink path itself; equals `absolute_path` when not a symlink.
    pub link_path: PathBuf,
    pub metadata: Metadata,
}
