//! Canonical profile records and the total mapper from raw portal rows.
//!
//! Source rows are loosely shaped: URL-valued and image-valued fields show
//! up as plain strings, structured objects under several casings, or (for
//! image columns) JSON-encoded strings and arrays. Every sub-mapper here is
//! total; a field that cannot be parsed maps to `None`, never an error, so
//! one bad field cannot take down the record.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

static NULL: Value = Value::Null;

/// Canonical profile record, post-mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub hire_date: Option<String>,
    pub birthday: Option<String>,
    pub company_url: Option<String>,
    pub linked_in_url: Option<String>,
    pub photo_url: Option<String>,
    /// Account identifier (email/login) driving the identity-photo strategy.
    /// Transient: never persisted, never rendered.
    pub identity_key: Option<String>,
    /// Rich-text body. Must pass through `sanitize` before display.
    pub details_html: Option<String>,
}

/// The three observed shapes of a link-valued source field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkValue {
    /// A bare URL string.
    Direct(String),
    /// A structured value carrying an explicit URL field.
    Explicit { url: String },
    /// A server base plus a server-relative path.
    Composite {
        server_url: String,
        server_relative_url: String,
    },
}

impl LinkValue {
    /// Match a raw field against the known shapes. Explicit URL wins over
    /// the base+relative composite.
    pub fn classify(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(LinkValue::Direct(s.clone())),
            Value::Object(obj) => {
                if let Some(url) = str_key(obj, &["Url", "url"]) {
                    return Some(LinkValue::Explicit { url });
                }
                let server_url = str_key(obj, &["serverUrl", "ServerUrl"]);
                let server_relative_url = str_key(obj, &["serverRelativeUrl", "ServerRelativeUrl"]);
                match (server_url, server_relative_url) {
                    (Some(server_url), Some(server_relative_url)) => Some(LinkValue::Composite {
                        server_url,
                        server_relative_url,
                    }),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn resolve(&self) -> String {
        match self {
            LinkValue::Direct(s) => s.clone(),
            LinkValue::Explicit { url } => url.clone(),
            LinkValue::Composite {
                server_url,
                server_relative_url,
            } => format!("{server_url}{server_relative_url}"),
        }
    }
}

/// Map a link-valued field to a resolved URL.
pub fn map_link(value: &Value) -> Option<String> {
    LinkValue::classify(value).map(|v| v.resolve())
}

/// Map an image-valued field to an absolute URL.
///
/// Beyond the link shapes this accepts arrays (first element wins) and
/// JSON-encoded string payloads; server-relative paths are resolved against
/// the site origin.
pub fn map_image(value: &Value, origin: &str) -> Option<String> {
    let value = match value {
        Value::Null => return None,
        Value::Array(items) => items.first()?,
        other => other,
    };

    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            // Image columns often store the structured value JSON-encoded.
            if let Ok(parsed) = serde_json::from_str::<Value>(s) {
                if let Some(url) = shape_to_url(&parsed, origin) {
                    return Some(url);
                }
            }
            if has_scheme(s) {
                return Some(s.to_string());
            }
            if s.starts_with('/') {
                return Some(format!("{origin}{s}"));
            }
            None
        }
        Value::Object(_) => shape_to_url(value, origin),
        _ => None,
    }
}

fn shape_to_url(value: &Value, origin: &str) -> Option<String> {
    let obj = value.as_object()?;
    let server_url = str_key(obj, &["serverUrl", "ServerUrl"]);
    let server_relative_url = str_key(obj, &["serverRelativeUrl", "ServerRelativeUrl"]);
    let url = str_key(obj, &["Url", "url"]);

    if let (Some(su), Some(sr)) = (server_url.as_deref(), server_relative_url.as_deref()) {
        return Some(format!("{su}{sr}"));
    }
    if let Some(url) = url {
        return Some(url);
    }
    if let Some(sr) = server_relative_url {
        return Some(format!("{origin}{sr}"));
    }
    match obj.get("path").and_then(Value::as_str) {
        Some(path) if path.starts_with('/') => Some(format!("{origin}{path}")),
        Some(path) if !path.is_empty() => Some(path.to_string()),
        _ => None,
    }
}

fn has_scheme(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:")
}

fn str_key(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map a date-valued field to a formatted date string, `M/D/YYYY`.
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`, and bare `YYYY-MM-DD`;
/// anything else is `None`.
pub fn map_date(value: &Value) -> Option<String> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }
    let date = parse_date(raw)?;
    date.format(format_description!(
        "[month padding:none]/[day padding:none]/[year]"
    ))
    .ok()
}

fn parse_date(raw: &str) -> Option<Date> {
    if let Ok(stamp) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(stamp.date());
    }
    if let Ok(stamp) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(stamp.date());
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()
}

/// Field names probed for a usable account identifier, in order.
const IDENTITY_FIELDS: &[&str] = &[
    "email",
    "mail",
    "userPrincipalName",
    "upn",
    "workEmail",
    "UserPrincipalName",
    "AccountName",
    "LoginName",
];

/// Extract an account identifier from whichever field carries one.
/// Claims-encoded values (`i:0#.f|membership|ann@x.com`) keep only the
/// final segment.
pub fn extract_identity_key(raw: &Value) -> Option<String> {
    let obj = raw.as_object()?;
    for field in IDENTITY_FIELDS {
        if let Some(s) = obj.get(*field).and_then(Value::as_str) {
            let s = match s.rsplit_once('|') {
                Some((_, tail)) => tail,
                None => s,
            };
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Convert one raw source row into a canonical record. Total: every field
/// that fails to parse becomes its default.
pub fn map_record(raw: &Value, origin: &str) -> ProfileRecord {
    let get = |key: &str| raw.get(key).unwrap_or(&NULL);

    ProfileRecord {
        id: get("Id").as_i64().unwrap_or_default(),
        name: get("Title").as_str().unwrap_or_default().to_string(),
        role: get("Role").as_str().unwrap_or_default().to_string(),
        hire_date: map_date(get("Hire_x0020_Date")),
        birthday: map_date(get("Birthday")),
        company_url: map_link(get("CompanyProfile")),
        linked_in_url: map_link(get("LinkedIn")),
        photo_url: map_image(get("Image0"), origin),
        identity_key: extract_identity_key(raw),
        details_html: get("About")
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
    }
}
