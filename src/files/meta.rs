//!
//! Metadata extraction
//! -------------------
//! Derives the deterministic attribute set for a resolved target: size,
//! permission mode, ownership, mime type and timestamps. Extraction is a pure
//! function of the target's stat data plus the descriptor's own kind; it
//! performs at most one extra filesystem touch (the content sniff for regular
//! files) and that touch degrades silently on failure.

use std::fs;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};

use super::ResourceKind;

/// Fixed mime token for folders; no target inspection happens.
pub const MIME_DIRECTORY: &str = "inode/directory";
/// Fixed mime token for symlinks; the target is never sniffed.
pub const MIME_SYMLINK: &str = "inode/symlink";

/// Leading bytes sampled for content-type sniffing.
const SNIFF_LEN: usize = 512;

/// Attribute set surfaced for every descriptor. Nullable fields are absent,
/// never zero-valued stand-ins.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub name: String,
    pub virtual_path: String,
    pub resource_kind: ResourceKind,
    /// Present only for regular files. Folders and symlinks carry no size,
    /// whatever the symlink target is.
    pub size_bytes: Option<u64>,
    /// Lower nine permission bits, zero-padded octal (e.g. "0644").
    pub permission_mode: String,
    pub user: String,
    pub group: String,
    pub user_id: u32,
    pub group_id: u32,
    pub mime_type: String,
    pub accessed_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub changed_at: Option<DateTime<Utc>>,
    /// Populated only where the platform stat structure exposes a birth
    /// time; absent elsewhere rather than fabricated.
    pub born_at: Option<DateTime<Utc>>,
}

/// Build the metadata for a resolved entry. `info` is the stat basis: the
/// entry's own lstat data for files and folders, the resolved target's stat
/// data for symlinks.
pub fn extract(
    name: &str,
    virtual_path: &str,
    kind: ResourceKind,
    absolute_path: &Path,
    info: &fs::Metadata,
) -> Metadata {
    let size_bytes = match kind {
        ResourceKind::File => Some(info.len()),
        _ => None,
    };

    let uid = info.uid();
    let gid = info.gid();
    let user = lookup_user(uid).unwrap_or_else(|| name_or_empty(uid));
    let group = lookup_group(gid).unwrap_or_else(|| name_or_empty(gid));

    Metadata {
        name: name.to_string(),
        virtual_path: virtual_path.to_string(),
        resource_kind: kind,
        size_bytes,
        permission_mode: format!("{:04o}", info.mode() & 0o777),
        user,
        group,
        user_id: uid,
        group_id: gid,
        mime_type: mime_for(kind, absolute_path),
        accessed_at: unix_time(info.atime(), info.atime_nsec()),
        modified_at: unix_time(info.mtime(), info.mtime_nsec()),
        changed_at: unix_time(info.ctime(), info.ctime_nsec()),
        born_at: born_time(info),
    }
}

fn unix_time(secs: i64, nsec: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, nsec as u32).single()
}

#[cfg(target_os = "macos")]
fn born_time(info: &fs::Metadata) -> Option<DateTime<Utc>> {
    use std::os::macos::fs::MetadataExt as _;
    unix_time(info.st_birthtime(), info.st_birthtime_nsec())
}

#[cfg(not(target_os = "macos"))]
fn born_time(_info: &fs::Metadata) -> Option<DateTime<Utc>> {
    // The stat structure carries no creation time here; absence is truthful.
    None
}

fn mime_for(kind: ResourceKind, absolute_path: &Path) -> String {
    match kind {
        ResourceKind::Folder => MIME_DIRECTORY.to_string(),
        ResourceKind::Symlink => MIME_SYMLINK.to_string(),
        ResourceKind::File => sniff_mime(absolute_path).unwrap_or_default(),
    }
}

/// Signature-based content sniff over the first `SNIFF_LEN` bytes. Returns
/// `None` on any open/read failure; the caller degrades to an empty string.
fn sniff_mime(path: &Path) -> Option<String> {
    let mut f = fs::File::open(path).ok()?;
    let mut buf = [0u8; SNIFF_LEN];
    let mut n = 0;
    while n < SNIFF_LEN {
        match f.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(m) => n += m,
            Err(_) => return None,
        }
    }
    let sample = &buf[..n];

    if let Some(kind) = infer::get(sample) {
        return Some(kind.mime_type().to_string());
    }
    if looks_like_text(sample) {
        Some("text/plain; charset=utf-8".to_string())
    } else {
        Some("application/octet-stream".to_string())
    }
}

fn looks_like_text(sample: &[u8]) -> bool {
    if sample.contains(&0) {
        return false;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        // A multi-byte sequence cut off at the sample boundary still counts.
        Err(e) => e.error_len().is_none(),
    }
}

/// Numeric fallback for a failed name lookup; id 0 maps to the empty string.
fn name_or_empty(id: u32) -> String {
    if id == 0 {
        String::new()
    } else {
        id.to_string()
    }
}

fn lookup_user(uid: u32) -> Option<String> {
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0u8; 1024];
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    loop {
        let rc = unsafe {
            libc::getpwuid_r(
                uid,
                &mut pwd,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        break;
    }
    let name = unsafe { std::ffi::CStr::from_ptr(pwd.pw_name) };
    name.to_str().ok().map(str::to_string)
}

fn lookup_group(gid: u32) -> Option<String> {
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0u8; 1024];
    let mut result: *mut libc::group = std::ptr::null_mut();
    loop {
        let rc = unsafe {
            libc::getgrgid_r(
                gid,
                &mut grp,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        break;
    }
    let name = unsafe { std::ffi::CStr::from_ptr(grp.gr_name) };
    name.to_str().ok().map(str::to_string)
}
