use std::{fs, io, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

/// Largest avatar accepted before upload (2 MiB).
pub const DEFAULT_MAX_AVATAR_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub cloud_name: String,
    pub upload_preset: String,
    /// Overrides the upload URL derived from `cloud_name`.
    pub upload_endpoint: Option<String>,
    pub session_cookie: Option<String>,
    pub max_avatar_bytes: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3000".into(),
            cloud_name: "demo".into(),
            upload_preset: "unsigned_avatars".into(),
            upload_endpoint: None,
            session_cookie: None,
            max_avatar_bytes: DEFAULT_MAX_AVATAR_BYTES,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    cloud_name: Option<String>,
    upload_preset: Option<String>,
    upload_endpoint: Option<String>,
    session_cookie: Option<String>,
    max_avatar_bytes: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

impl ClientSettings {
    pub fn upload_url(&self) -> String {
        match &self.upload_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://api.cloudinary.com/v1_1/{}/image/upload",
                self.cloud_name
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid api_base_url '{}'", self.api_base_url))?;
        let upload_url = self.upload_url();
        Url::parse(&upload_url).with_context(|| format!("invalid upload url '{upload_url}'"))?;
        if self.upload_preset.trim().is_empty() {
            return Err(anyhow!("upload_preset must not be empty"));
        }
        if self.max_avatar_bytes == 0 {
            return Err(anyhow!("max_avatar_bytes must be greater than zero"));
        }
        Ok(())
    }

    fn merge_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.api_base_url {
            self.api_base_url = v;
        }
        if let Some(v) = file_cfg.cloud_name {
            self.cloud_name = v;
        }
        if let Some(v) = file_cfg.upload_preset {
            self.upload_preset = v;
        }
        if let Some(v) = file_cfg.upload_endpoint {
            self.upload_endpoint = Some(v);
        }
        if let Some(v) = file_cfg.session_cookie {
            self.session_cookie = Some(v);
        }
        if let Some(v) = file_cfg.max_avatar_bytes {
            self.max_avatar_bytes = v;
        }
        if let Some(v) = file_cfg.request_timeout_seconds {
            self.request_timeout_seconds = v;
        }
    }

    /// Applies `HOMES_*` variables, then the `APP__*` spelling which wins when both are set.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let pick = |short: &str, long: &str| lookup(long).or_else(|| lookup(short));

        if let Some(v) = pick("HOMES_API_URL", "APP__API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = pick("HOMES_CLOUD_NAME", "APP__CLOUD_NAME") {
            self.cloud_name = v;
        }
        if let Some(v) = pick("HOMES_UPLOAD_PRESET", "APP__UPLOAD_PRESET") {
            self.upload_preset = v;
        }
        if let Some(v) = pick("HOMES_UPLOAD_URL", "APP__UPLOAD_ENDPOINT") {
            self.upload_endpoint = Some(v);
        }
        if let Some(v) = pick("HOMES_SESSION_COOKIE", "APP__SESSION_COOKIE") {
            self.session_cookie = Some(v);
        }
        if let Some(v) = pick("HOMES_MAX_AVATAR_BYTES", "APP__MAX_AVATAR_BYTES") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.max_avatar_bytes = parsed;
            }
        }
        if let Some(v) = pick("HOMES_REQUEST_TIMEOUT_SECONDS", "APP__REQUEST_TIMEOUT_SECONDS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.request_timeout_seconds = parsed;
            }
        }
    }
}

pub fn parse_settings(raw: &str) -> Result<ClientSettings> {
    let file_cfg: FileSettings = toml::from_str(raw).context("failed to parse client settings")?;
    let mut settings = ClientSettings::default();
    settings.merge_file(file_cfg);
    Ok(settings)
}

/// Defaults, overlaid by `path` when it exists, then by the process environment.
pub fn load_settings(path: &Path) -> Result<ClientSettings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => parse_settings(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => ClientSettings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    };

    settings.apply_env_overrides(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
