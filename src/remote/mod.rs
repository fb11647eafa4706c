//! Remote directory abstraction and the portal list-API client.
//!
//! This module provides:
//! - `Directory` trait for abstracting the record source
//! - `PortalClient` implementation over the portal's JSON list API
//! - Types for selectable sources and typed transport errors

pub mod portal;

use serde_json::Value;
use thiserror::Error;

use crate::library::ImageEntry;

/// A selectable record list on the portal.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unexpected response shape from {url}: {detail}")]
    Shape { url: String, detail: String },
}

/// Trait for record-source implementations. All reads are point-in-time;
/// nothing here is cached or persisted.
pub trait Directory: Send + Sync {
    /// Enumerate selectable primary lists (for the `sources` command).
    fn list_sources(&self) -> Result<Vec<SourceInfo>, DirectoryError>;

    /// Fetch raw profile rows from the selected list, projected to the
    /// fields the record mapper understands.
    fn fetch_profiles(&self, list_id: &str) -> Result<Vec<Value>, DirectoryError>;

    /// Fetch image-library rows projected to (title, file name, file path).
    fn fetch_image_entries(&self, list_id: &str) -> Result<Vec<ImageEntry>, DirectoryError>;

    /// Fetch one image by URL.
    fn fetch_image_bytes(&self, url: &str) -> Result<Vec<u8>, DirectoryError>;
}
