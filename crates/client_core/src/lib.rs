//! Client-side logic for the listings site: profile editing with avatar
//! upload, account lifecycle, and listing views over the REST backend.

pub mod api;
pub mod blob;
pub mod config;
pub mod error;
pub mod listings;
pub mod profile;
pub mod session;

pub use api::{BackendApi, HttpBackendApi};
pub use blob::{BlobStore, PresetBlobStore, SelectedFile, UploadEvent};
pub use config::{load_settings, ClientSettings};
pub use error::{ClientError, ValidationError};
pub use listings::{load_home_feed, HomeFeed, ListingsController, ListingsView};
pub use profile::{
    ProfileController, ProfileField, ProfileFormState, UploadHandle, UploadStatus,
};
pub use session::Session;

use anyhow::{Context, Result};
use reqwest::Client;

/// Builds the shared HTTP client with the configured request timeout.
pub fn http_client(settings: &ClientSettings) -> Result<Client> {
    Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("failed to build http client")
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
