//!
//! Root registry, path resolution and directory listing
//! ----------------------------------------------------
//! The registry is built once at startup from validated configuration and is
//! immutable afterwards. Resolution ("describe") turns a virtual root plus a
//! relative path into a `Descriptor`, enforcing two containment rules:
//! a literal `..` segment anywhere in the relative path is rejected outright,
//! and a symlink chain must resolve to a path equal to or below the root's
//! canonical source.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::{meta, Descriptor, FilesError, ResourceKind, Root, TargetKind};

/// File operations scoped to a fixed set of configured roots. Holds no
/// mutable state; safe to share behind an `Arc` across request tasks.
#[derive(Debug)]
pub struct Service {
    roots: HashMap<String, Root>,
    ordered: Vec<Root>,
}

impl Service {
    /// Build the registry. Each source is canonicalized (symlinks in the
    /// configured path are resolved here, once). Fails on an empty list, a
    /// repeated virtual name, or a source that cannot be resolved.
    pub fn new(roots: Vec<Root>) -> Result<Self, FilesError> {
        if roots.is_empty() {
            return Err(FilesError::EmptyRoots);
        }

        let mut ordered = Vec::with_capacity(roots.len());
        let mut map = HashMap::with_capacity(roots.len());
        for root in roots {
            if map.contains_key(&root.virtual_name) {
                return Err(FilesError::DuplicateRoot(root.virtual_name));
            }
            let source = fs::canonicalize(&root.source).map_err(|e| FilesError::ResolveRoot {
                virtual_name: root.virtual_name.clone(),
                source: e,
            })?;
            let normalized = Root {
                virtual_name: root.virtual_name.clone(),
                source,
            };
            ordered.push(normalized.clone());
            map.insert(root.virtual_name, normalized);
        }

        Ok(Self { roots: map, ordered })
    }

    /// Look up a root by virtual name, with or without the leading slash.
    pub fn lookup(&self, virtual_name: &str) -> Option<&Root> {
        if virtual_name.starts_with('/') {
            self.roots.get(virtual_name)
        } else {
            self.roots.get(&format!("/{virtual_name}"))
        }
    }

    /// Ordered snapshot of the configured roots.
    pub fn roots(&self) -> &[Root] {
        &self.ordered
    }

    /// True iff exactly one root exists and its virtual name is `/`.
    pub fn has_single_root_slash(&self) -> bool {
        self.ordered.len() == 1 && self.ordered[0].virtual_name == "/"
    }

    /// Resolve a single path beneath a virtual root.
    pub fn describe(&self, virtual_name: &str, rel: &str) -> Result<Descriptor, FilesError> {
        let root = self
            .lookup(virtual_name)
            .ok_or_else(|| FilesError::RootNotFound(virtual_name.to_string()))?
            .clone();
        self.describe_in(&root, rel)
    }

    /// Descriptors for all configured roots, in configuration order.
    pub fn list_roots(&self) -> Result<Vec<Descriptor>, FilesError> {
        let mut descs = Vec::with_capacity(self.ordered.len());
        for root in &self.ordered {
            descs.push(self.describe_in(root, "")?);
        }
        Ok(descs)
    }

    /// Enumerate the direct children of a directory. Children come back in
    /// whatever order the underlying directory read yields; ordering is the
    /// query engine's job. The cancellation token is checked before each
    /// child resolution so a dropped or timed-out request aborts instead of
    /// completing the enumeration.
    pub fn list_directory(
        &self,
        virtual_name: &str,
        rel: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Descriptor>, FilesError> {
        let root = self
            .lookup(virtual_name)
            .ok_or_else(|| FilesError::RootNotFound(virtual_name.to_string()))?
            .clone();

        let rel_clean = clean_relative_path(rel)?;
        let parent = self.describe_in(&root, &rel_clean)?;
        if parent.target_kind != TargetKind::Folder {
            return Err(FilesError::NotADirectory(parent.virtual_path));
        }

        let entries = fs::read_dir(&parent.absolute_path).map_err(|e| FilesError::Stat {
            op: "read dir",
            virtual_path: parent.virtual_path.clone(),
            source: e,
        })?;

        let mut descs = Vec::new();
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(FilesError::Canceled);
            }
            let entry = entry.map_err(|e| FilesError::Stat {
                op: "read dir",
                virtual_path: parent.virtual_path.clone(),
                source: e,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel = if rel_clean.is_empty() {
                name
            } else {
                format!("{rel_clean}/{name}")
            };
            descs.push(self.describe_in(&root, &child_rel)?);
        }

        Ok(descs)
    }

    fn describe_in(&self, root: &Root, rel: &str) -> Result<Descriptor, FilesError> {
        let rel_clean = clean_relative_path(rel)?;
        let virtual_path = join_virtual(&root.virtual_name, &rel_clean);

        let candidate = if rel_clean.is_empty() {
            root.source.clone()
        } else {
            root.source.join(&rel_clean)
        };

        let info = fs::symlink_metadata(&candidate).map_err(|e| FilesError::Stat {
            op: "stat",
            virtual_path: virtual_path.clone(),
            source: e,
        })?;
        let kind = classify(&info);

        let (absolute_path, target_kind, basis) = match kind {
            ResourceKind::Symlink => {
                // Resolve the whole chain, however many hops, then re-check
                // containment against the canonical source.
                let resolved = fs::canonicalize(&candidate).map_err(|e| FilesError::Stat {
                    op: "resolve symlink",
                    virtual_path: virtual_path.clone(),
                    source: e,
                })?;
                ensure_within_root(&root.source, &resolved, &virtual_path)?;
                let target_info = fs::metadata(&resolved).map_err(|e| FilesError::Stat {
                    op: "stat symlink target",
                    virtual_path: virtual_path.clone(),
                    source: e,
                })?;
                let target_kind = if target_info.is_dir() {
                    TargetKind::Folder
                } else {
                    TargetKind::File
                };
                (resolved, target_kind, target_info)
            }
            ResourceKind::Folder => (candidate.clone(), TargetKind::Folder, info),
            ResourceKind::File => (candidate.clone(), TargetKind::File, info),
        };

        let name = entry_name(root, &rel_clean);
        let metadata = meta::extract(&name, &virtual_path, kind, &absolute_path, &basis);

        Ok(Descriptor {
            root: root.clone(),
            virtual_path,
            rel_path: rel_clean,
            name,
            kind,
            target_kind,
            absolute_path,
            link_path: candidate,
            metadata,
        })
    }
}

fn classify(info: &fs::Metadata) -> ResourceKind {
    let ft = info.file_type();
    if ft.is_dir() {
        ResourceKind::Folder
    } else if ft.is_symlink() {
        ResourceKind::Symlink
    } else {
        ResourceKind::File
    }
}

/// Normalize a request-relative path. Any literal `..` segment is an error,
/// even one that naive normalization would cancel against an earlier
/// segment. Empty output denotes the root itself.
fn clean_relative_path(rel: &str) -> Result<String, FilesError> {
    if rel.split('/').any(|part| part == "..") {
        return Err(FilesError::OutsideRoot(rel.to_string()));
    }
    let parts: Vec<&str> = rel
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    Ok(parts.join("/"))
}

/// The resolved target must be the root itself or a descendant of it.
/// Component-wise comparison, so `/data-x` never passes for root `/data`.
fn ensure_within_root(root: &Path, target: &Path, virtual_path: &str) -> Result<(), FilesError> {
    if target.starts_with(root) {
        Ok(())
    } else {
        Err(FilesError::OutsideRoot(virtual_path.to_string()))
    }
}

fn join_virtual(virtual_name: &str, rel: &str) -> String {
    if rel.is_empty() {
        virtual_name.to_string()
    } else if virtual_name == "/" {
        format!("/{rel}")
    } else {
        format!("{virtual_name}/{rel}")
    }
}

fn entry_name(root: &Root, rel: &str) -> String {
    if rel.is_empty() {
        if root.virtual_name == "/" {
            return "/".to_string();
        }
        return root.virtual_name.trim_start_matches('/').to_string();
    }
    rel.rsplit('/').next().unwrap_or(rel).to_string()
}
