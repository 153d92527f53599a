// src/jamf/client.rs

//! Jamf Pro classic API client
//!
//! Lookups use `GET /JSSResource/<resource>/name/<name>` with a JSON
//! response; writes send XML documents to `/JSSResource/<resource>/id/<id>`
//! (`id/0` creates). Packages are uploaded to `/dbfileupload`. Every request
//! is retried with a fixed delay before the failure is reported.

use super::{ManagementApi, ObjectKind};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::blocking::{Body, Client};
use reqwest::{Method, StatusCode};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Blocking client for one Jamf Pro server
pub struct JamfClient {
    client: Client,
    base: Url,
    user: String,
    password: String,
    max_retries: u32,
    retry_delay: Duration,
    upload_timeout: Duration,
}

impl JamfClient {
    pub fn new(config: &ApiConfig, user: &str, password: &str) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::ConfigError(format!("Invalid API url '{}': {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(Error::ConfigError(format!("API url '{}' cannot hold paths", config.url)));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            user: user.to_string(),
            password: password.to_string(),
            max_retries: config.retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        })
    }

    /// `<base>/<segments...>` with each segment percent-encoded
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::ConfigError(format!("API url {} cannot hold paths", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resource_url(&self, kind: ObjectKind, by: &str, key: &str) -> Result<Url> {
        self.url(&["JSSResource", kind.endpoint(), by, key])
    }

    fn with_retries<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_retries => {
                    return Err(Error::ApiError(format!(
                        "{what} failed after {attempt} attempts: {e}"
                    )));
                }
                Err(e) => {
                    warn!(
                        "{} attempt {} of {} failed: {}, retrying...",
                        what, attempt, self.max_retries, e
                    );
                    std::thread::sleep(self.retry_delay);
                }
            }
        }
    }

    fn send_document(&self, method: Method, url: &Url, document: &str) -> Result<()> {
        let what = format!("{method} {url}");
        self.with_retries(&what, || {
            let response = self
                .client
                .request(method.clone(), url.clone())
                .basic_auth(&self.user, Some(&self.password))
                .header("Content-Type", "text/xml")
                .body(document.to_string())
                .send()
                .map_err(|e| Error::ApiError(e.to_string()))?;

            let status = response.status();
            debug!("{} -> {}", what, status);
            if status.is_success() {
                Ok(())
            } else {
                let body = response.text().unwrap_or_default();
                Err(Error::ApiError(format!("HTTP {status}: {}", body.trim())))
            }
        })
    }
}

impl ManagementApi for JamfClient {
    fn find_id(&self, kind: ObjectKind, name: &str) -> Result<Option<String>> {
        let url = self.resource_url(kind, "name", name)?;
        self.with_retries(&format!("GET {url}"), || {
            let response = self
                .client
                .get(url.clone())
                .basic_auth(&self.user, Some(&self.password))
                .header("Accept", "application/json")
                .send()
                .map_err(|e| Error::ApiError(e.to_string()))?;

            let status = response.status();
            debug!("GET {} -> {}", url, status);
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(Error::ApiError(format!("HTTP {status} looking up {kind} '{name}'")));
            }

            let body: serde_json::Value = response
                .json()
                .map_err(|e| Error::ApiError(format!("Invalid lookup response: {e}")))?;
            Ok(id_from_lookup(&body, kind))
        })
    }

    fn create(&self, kind: ObjectKind, name: &str, document: &str) -> Result<()> {
        debug!("Creating {} '{}'", kind, name);
        let url = self.resource_url(kind, "id", "0")?;
        self.send_document(Method::POST, &url, document)
    }

    fn update(&self, kind: ObjectKind, id: &str, name: &str, document: &str) -> Result<()> {
        debug!("Updating {} '{}' ({})", kind, name, id);
        let url = self.resource_url(kind, "id", id)?;
        self.send_document(Method::PUT, &url, document)
    }

    fn upload_package(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
        let url = self.url(&["dbfileupload"])?;

        self.with_retries(&format!("Upload of {name}"), || {
            info!("Uploading {}", name);
            let file = File::open(path).map_err(|e| {
                Error::IoError(format!("Failed to open {}: {e}", path.display()))
            })?;
            let response = self
                .client
                .post(url.clone())
                .basic_auth(&self.user, Some(&self.password))
                .timeout(self.upload_timeout)
                .header("DESTINATION", "0")
                .header("OBJECT_ID", "-1")
                .header("FILE_TYPE", "0")
                .header("FILE_NAME", name.as_str())
                .body(Body::from(file))
                .send()
                .map_err(|e| Error::ApiError(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .map_err(|e| Error::ApiError(format!("Failed to read upload response: {e}")))?;
            debug!("Upload response ({}): {}", status, text);
            if !status.is_success() {
                return Err(Error::ApiError(format!("HTTP {status} uploading {name}")));
            }
            parse_upload_response(&text)
        })
    }
}

fn id_from_lookup(body: &serde_json::Value, kind: ObjectKind) -> Option<String> {
    match body.pointer(kind.id_pointer())? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// The package id from a `/dbfileupload` response
///
/// The response must report `<successful>true</successful>` and carry an
/// `<id>`.
pub fn parse_upload_response(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current = String::new();
    let mut id = None;
    let mut successful = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                current = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                match current.as_str() {
                    "id" if id.is_none() => id = Some(text.trim().to_string()),
                    "successful" => successful = text.trim() == "true",
                    _ => {}
                }
            }
            Event::End(_) => current.clear(),
            Event::Eof => break,
            _ => {}
        }
    }

    if !successful {
        return Err(Error::ApiError("upload was not successful".to_string()));
    }
    id.filter(|id| !id.is_empty())
        .ok_or_else(|| Error::ApiError("upload response carries no id".to_string()))
}
