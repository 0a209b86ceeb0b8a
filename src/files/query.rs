//!
//! List query engine
//! -----------------
//! Parses the `page[limit]`/`page[offset]`/`sort` wire parameters, applies a
//! deterministic ordering over the full descriptor set, slices the requested
//! window and builds the JSON:API collection envelope with navigation links.
//! Sorting always precedes slicing so pagination windows stay consistent
//! across repeated requests with the same parameters.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::{Descriptor, FilesError, ResourceKind, API_BASE};

pub const DEFAULT_LIMIT: usize = 200;
pub const MAX_LIMIT: usize = 500;

/// Allowed sort fields. One field per request, optionally `-`-prefixed for
/// descending order on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    ResourceKind,
    SizeBytes,
    PermissionMode,
    User,
    Group,
    UserId,
    GroupId,
    MimeType,
    AccessedAt,
    ModifiedAt,
    ChangedAt,
    BornAt,
}

impl SortField {
    pub fn parse(s: &str) -> Option<SortField> {
        match s {
            "name" => Some(SortField::Name),
            "resource_kind" => Some(SortField::ResourceKind),
            "size_bytes" => Some(SortField::SizeBytes),
            "permission_mode" => Some(SortField::PermissionMode),
            "user" => Some(SortField::User),
            "group" => Some(SortField::Group),
            "user_id" => Some(SortField::UserId),
            "group_id" => Some(SortField::GroupId),
            "mime_type" => Some(SortField::MimeType),
            "accessed_at" => Some(SortField::AccessedAt),
            "modified_at" => Some(SortField::ModifiedAt),
            "changed_at" => Some(SortField::ChangedAt),
            "born_at" => Some(SortField::BornAt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::ResourceKind => "resource_kind",
            SortField::SizeBytes => "size_bytes",
            SortField::PermissionMode => "permission_mode",
            SortField::User => "user",
            SortField::Group => "group",
            SortField::UserId => "user_id",
            SortField::GroupId => "group_id",
            SortField::MimeType => "mime_type",
            SortField::AccessedAt => "accessed_at",
            SortField::ModifiedAt => "modified_at",
            SortField::ChangedAt => "changed_at",
            SortField::BornAt => "born_at",
        }
    }
}

/// Validated pagination and sorting parameters.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub limit: usize,
    pub offset: usize,
    pub sort: SortField,
    pub descending: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: SortField::Name,
            descending: false,
        }
    }
}

/// Parse the wire parameters. Empty values are treated as absent; anything
/// present must validate or the whole request is rejected.
pub fn parse_list_params(query: &HashMap<String, String>) -> Result<ListParams, FilesError> {
    let mut params = ListParams::default();

    if let Some(limit_str) = query.get("page[limit]").filter(|s| !s.is_empty()) {
        let limit = limit_str
            .parse::<usize>()
            .ok()
            .filter(|l| *l >= 1)
            .ok_or_else(|| {
                FilesError::InvalidQuery("invalid page[limit]: must be a positive integer".into())
            })?;
        if limit > MAX_LIMIT {
            return Err(FilesError::InvalidQuery(format!(
                "page[limit] exceeds maximum of {MAX_LIMIT}"
            )));
        }
        params.limit = limit;
    }

    if let Some(offset_str) = query.get("page[offset]").filter(|s| !s.is_empty()) {
        params.offset = offset_str.parse::<usize>().map_err(|_| {
            FilesError::InvalidQuery("invalid page[offset]: must be a non-negative integer".into())
        })?;
    }

    if let Some(sort_param) = query.get("sort").filter(|s| !s.is_empty()) {
        if sort_param.contains(',') {
            return Err(FilesError::InvalidQuery(
                "sorting by multiple fields is not supported".into(),
            ));
        }
        let field = match sort_param.strip_prefix('-') {
            Some(rest) => {
                params.descending = true;
                rest
            }
            None => sort_param.as_str(),
        };
        params.sort = SortField::parse(field)
            .ok_or_else(|| FilesError::InvalidQuery(format!("invalid sort field: {field}")))?;
    }

    Ok(params)
}

/// Stable sort over the whole set, before any slicing. Descending order is a
/// plain reversal of the comparator result, which is what pushes
/// absent-valued entries to the end of a descending listing.
pub fn sort_descriptors(entries: &mut [Descriptor], field: SortField, descending: bool) {
    entries.sort_by(|a, b| {
        let ord = compare_by(&a.metadata, &b.metadata, field);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn compare_by(a: &super::Metadata, b: &super::Metadata, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::ResourceKind => a.resource_kind.as_str().cmp(b.resource_kind.as_str()),
        SortField::SizeBytes => compare_optional(a.size_bytes.as_ref(), b.size_bytes.as_ref()),
        SortField::PermissionMode => a.permission_mode.cmp(&b.permission_mode),
        SortField::User => a.user.cmp(&b.user),
        SortField::Group => a.group.cmp(&b.group),
        SortField::UserId => a.user_id.cmp(&b.user_id),
        SortField::GroupId => a.group_id.cmp(&b.group_id),
        SortField::MimeType => a.mime_type.cmp(&b.mime_type),
        SortField::AccessedAt => compare_optional(a.accessed_at.as_ref(), b.accessed_at.as_ref()),
        SortField::ModifiedAt => compare_optional(a.modified_at.as_ref(), b.modified_at.as_ref()),
        SortField::ChangedAt => compare_optional(a.changed_at.as_ref(), b.changed_at.as_ref()),
        SortField::BornAt => compare_optional(a.born_at.as_ref(), b.born_at.as_ref()),
    }
}

/// Absent orders before any present value, unconditionally; direction is
/// applied afterwards by the caller.
fn compare_optional<T: Ord>(a: Option<&T>, b: Option<&T>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

/// JSON:API collection envelope for file listings.
#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
    pub data: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<PaginationLinks>,
}

#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Navigation links. `prev`/`next` serialize as explicit nulls when absent.
#[derive(Debug, Serialize)]
pub struct PaginationLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub first: String,
    pub last: String,
    pub prev: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    pub attributes: Attributes,
    pub links: ResourceLinks,
}

/// Per-entry attributes. Nullable metadata is surfaced as explicit `null`.
#[derive(Debug, Serialize)]
pub struct Attributes {
    pub name: String,
    pub resource_kind: ResourceKind,
    pub size_bytes: Option<u64>,
    pub permission_mode: String,
    pub user: String,
    pub group: String,
    pub user_id: u32,
    pub group_id: u32,
    pub mime_type: String,
    pub accessed_at: Option<String>,
    pub modified_at: Option<String>,
    pub changed_at: Option<String>,
    pub born_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResourceLinks {
    #[serde(rename = "self")]
    pub self_link: String,
}

/// Slice the pre-sorted set and wrap it in the envelope.
pub fn collection_response(
    base_path: &str,
    entries: &[Descriptor],
    params: &ListParams,
) -> Response {
    let total = entries.len();
    let start = params.offset.min(total);
    let end = (start + params.limit).min(total);

    let data = entries[start..end].iter().map(resource_from).collect();
    let links = build_pagination_links(base_path, params, total);

    Response {
        meta: Some(PaginationMeta {
            total_count: total,
            offset: params.offset,
            limit: params.limit,
        }),
        data,
        links: Some(links),
    }
}

pub fn build_pagination_links(
    base_path: &str,
    params: &ListParams,
    total: usize,
) -> PaginationLinks {
    let build_url = |offset: usize| {
        let mut u = format!(
            "{}?page[offset]={}&page[limit]={}",
            base_path, offset, params.limit
        );
        if params.sort != SortField::Name || params.descending {
            let prefix = if params.descending { "-" } else { "" };
            u.push_str(&format!("&sort={}{}", prefix, params.sort.as_str()));
        }
        u
    };

    let last_offset = if total > 0 {
        ((total - 1) / params.limit) * params.limit
    } else {
        0
    };

    let prev = (params.offset > 0).then(|| build_url(params.offset.saturating_sub(params.limit)));
    let next = (params.offset + params.limit < total).then(|| build_url(params.offset + params.limit));

    PaginationLinks {
        self_link: build_url(params.offset),
        first: build_url(0),
        last: build_url(last_offset),
        prev,
        next,
    }
}

pub fn resource_from(desc: &Descriptor) -> Resource {
    let m = &desc.metadata;
    Resource {
        id: m.virtual_path.clone(),
        resource_type: "files",
        attributes: Attributes {
            name: m.name.clone(),
            resource_kind: m.resource_kind,
            size_bytes: m.size_bytes,
            permission_mode: m.permission_mode.clone(),
            user: m.user.clone(),
            group: m.group.clone(),
            user_id: m.user_id,
            group_id: m.group_id,
            mime_type: m.mime_type.clone(),
            accessed_at: format_time(m.accessed_at),
            modified_at: format_time(m.modified_at),
            changed_at: format_time(m.changed_at),
            born_at: format_time(m.born_at),
        },
        links: ResourceLinks {
            self_link: join_api_path(&m.virtual_path),
        },
    }
}

fn format_time(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Virtual paths always start with `/`; the bare `/` root collapses onto the
/// base path itself.
fn join_api_path(virtual_path: &str) -> String {
    if virtual_path == "/" {
        API_BASE.to_string()
    } else {
        format!("{API_BASE}{virtual_path}")
    }
}
