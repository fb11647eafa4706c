//! Portal list-API client: blocking JSON reads over the host's
//! already-authenticated HTTP channel.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use url::Url;

use anyhow::{Context, Result};

use crate::library::ImageEntry;
use crate::remote::{Directory, DirectoryError, SourceInfo};

/// Read cap per list; the portal refuses unbounded item reads.
const ITEM_CAP: usize = 5000;

/// Field projection for the primary profile list.
const PROFILE_FIELDS: &str = "Id,Title,Role,Hire_x0020_Date,Birthday,CompanyProfile,LinkedIn,Image0,About,Modified,Created";

/// Field projection for the image library.
const IMAGE_FIELDS: &str = "Id,Title,FileLeafRef,FileRef";

/// Template id of plain record lists; everything else (document libraries,
/// system lists) is not selectable as a primary source.
const GENERIC_LIST_TEMPLATE: i64 = 100;

/// How the host's authenticated channel is reproduced in CLI form.
#[derive(Debug, Clone)]
pub enum PortalAuth {
    None,
    /// A pass-through `Authorization` header value.
    Header(String),
    Basic { username: String, password: String },
}

impl PortalAuth {
    fn header_value(&self) -> Option<String> {
        match self {
            PortalAuth::None => None,
            PortalAuth::Header(value) => Some(value.clone()),
            PortalAuth::Basic { username, password } => Some(format!(
                "Basic {}",
                BASE64_STANDARD.encode(format!("{username}:{password}"))
            )),
        }
    }
}

pub struct PortalClient {
    http: Client,
    site_url: Url,
    auth: PortalAuth,
}

impl PortalClient {
    pub fn new(site_url: &str, auth: PortalAuth) -> Result<Self> {
        let site_url: Url = site_url
            .parse()
            .with_context(|| format!("invalid portal URL: {site_url}"))?;
        let http = Client::builder()
            .user_agent(concat!("rostr/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            site_url,
            auth,
        })
    }

    /// Tenant origin: the site URL with its site-relative suffix removed.
    pub fn origin(&self) -> String {
        self.site_url.origin().ascii_serialization()
    }

    /// Full site URL (origin + site path), no trailing slash.
    pub fn site_url(&self) -> String {
        self.site_url.as_str().trim_end_matches('/').to_string()
    }

    fn api_url(&self, path_and_query: &str) -> String {
        format!("{}/_api/{}", self.site_url(), path_and_query)
    }

    fn get(&self, url: &str, json: bool) -> Result<Response, DirectoryError> {
        let mut request = self.http.get(url);
        if json {
            request = request.header(ACCEPT, "application/json;odata=nometadata");
        }
        if let Some(value) = self.auth.header_value() {
            request = request.header(AUTHORIZATION, value);
        }
        let response = request.send().map_err(|source| DirectoryError::Transport {
            url: url.to_string(),
            source,
        })?;
        if !response.status().is_success() {
            return Err(DirectoryError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }

    fn get_rows(&self, url: &str) -> Result<Vec<Value>, DirectoryError> {
        let body: Value = self
            .get(url, true)?
            .json()
            .map_err(|source| DirectoryError::Transport {
                url: url.to_string(),
                source,
            })?;
        rows_from_body(body).ok_or_else(|| DirectoryError::Shape {
            url: url.to_string(),
            detail: "no row array in response".to_string(),
        })
    }
}

/// Accept both bare `{"value":[...]}` and verbose `{"d":{"results":[...]}}`
/// payload envelopes, plus a top-level array.
fn rows_from_body(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(rows) => Some(rows),
        Value::Object(mut obj) => {
            if let Some(Value::Array(rows)) = obj.remove("value") {
                return Some(rows);
            }
            if let Some(Value::Object(mut d)) = obj.remove("d") {
                if let Some(Value::Array(rows)) = d.remove("results") {
                    return Some(rows);
                }
            }
            None
        }
        _ => None,
    }
}

/// Selectable-source filter: plain record lists only, hidden lists skipped.
fn source_from_row(row: &Value) -> Option<SourceInfo> {
    let template = row.get("BaseTemplate").and_then(Value::as_i64)?;
    let hidden = row.get("Hidden").and_then(Value::as_bool).unwrap_or(false);
    if template != GENERIC_LIST_TEMPLATE || hidden {
        return None;
    }
    let id = row.get("Id").and_then(Value::as_str)?.to_string();
    if id.is_empty() {
        return None;
    }
    let title = row
        .get("Title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(SourceInfo { id, title })
}

fn image_entry_from_row(row: &Value) -> ImageEntry {
    let field = |key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    ImageEntry {
        title: field("Title"),
        file_name: field("FileLeafRef"),
        file_ref: field("FileRef"),
    }
}

impl Directory for PortalClient {
    fn list_sources(&self) -> Result<Vec<SourceInfo>, DirectoryError> {
        let url = self.api_url("web/lists?$select=Id,Title,BaseTemplate,Hidden");
        let rows = self.get_rows(&url)?;
        Ok(rows.iter().filter_map(source_from_row).collect())
    }

    fn fetch_profiles(&self, list_id: &str) -> Result<Vec<Value>, DirectoryError> {
        if list_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = self.api_url(&format!(
            "web/lists(guid'{list_id}')/items?$select={PROFILE_FIELDS}&$top={ITEM_CAP}"
        ));
        self.get_rows(&url)
    }

    fn fetch_image_entries(&self, list_id: &str) -> Result<Vec<ImageEntry>, DirectoryError> {
        if list_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = self.api_url(&format!(
            "web/lists(guid'{list_id}')/items?$select={IMAGE_FIELDS}&$top={ITEM_CAP}"
        ));
        let rows = self.get_rows(&url)?;
        Ok(rows.iter().map(image_entry_from_row).collect())
    }

    fn fetch_image_bytes(&self, url: &str) -> Result<Vec<u8>, DirectoryError> {
        let response = self.get(url, false)?;
        let bytes = response.bytes().map_err(|source| DirectoryError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_accept_all_known_envelopes() {
        let bare = json!({ "value": [{ "Id": 1 }] });
        let verbose = json!({ "d": { "results": [{ "Id": 1 }, { "Id": 2 }] } });
        let top_level = json!([{ "Id": 1 }]);

        assert_eq!(rows_from_body(bare).unwrap().len(), 1);
        assert_eq!(rows_from_body(verbose).unwrap().len(), 2);
        assert_eq!(rows_from_body(top_level).unwrap().len(), 1);
        assert!(rows_from_body(json!({ "unexpected": true })).is_none());
        assert!(rows_from_body(json!("nope")).is_none());
    }

    #[test]
    fn sources_filter_templates_and_hidden_lists() {
        let rows = vec![
            json!({ "Id": "aaa", "Title": "Profiles", "BaseTemplate": 100, "Hidden": false }),
            json!({ "Id": "bbb", "Title": "Docs", "BaseTemplate": 101, "Hidden": false }),
            json!({ "Id": "ccc", "Title": "System", "BaseTemplate": 100, "Hidden": true }),
            json!({ "Title": "No id", "BaseTemplate": 100 }),
        ];
        let sources: Vec<SourceInfo> = rows.iter().filter_map(source_from_row).collect();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, "aaa");
        assert_eq!(sources[0].title, "Profiles");
    }

    #[test]
    fn image_rows_project_three_fields() {
        let row = json!({
            "Id": 1,
            "Title": "Ann Lee",
            "FileLeafRef": "ann-lee.jpg",
            "FileRef": "/sites/team/lib/ann-lee.jpg"
        });
        let entry = image_entry_from_row(&row);
        assert_eq!(entry.title.as_deref(), Some("Ann Lee"));
        assert_eq!(entry.file_name.as_deref(), Some("ann-lee.jpg"));
        assert_eq!(entry.file_ref.as_deref(), Some("/sites/team/lib/ann-lee.jpg"));

        let sparse = image_entry_from_row(&json!({ "Id": 2, "Title": "" }));
        assert!(sparse.title.is_none());
        assert!(sparse.file_name.is_none());
        assert!(sparse.file_ref.is_none());
    }

    #[test]
    fn origin_strips_the_site_path() {
        let client = PortalClient::new("https://contoso.example.com/sites/team", PortalAuth::None)
            .unwrap();
        assert_eq!(client.origin(), "https://contoso.example.com");
        assert_eq!(client.site_url(), "https://contoso.example.com/sites/team");
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let auth = PortalAuth::Basic {
            username: "svc".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(auth.header_value().unwrap(), "Basic c3ZjOnNlY3JldA==");
        assert!(PortalAuth::None.header_value().is_none());
    }
}
