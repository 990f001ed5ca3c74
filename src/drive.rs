//! Google Drive document source.
//!
//! Implements [`DocumentSource`] over three Google REST endpoints:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | list | `GET {drive}/drive/v3/files?q=mimeType='…'&pageSize=N&fields=files(…)` |
//! | get_content | `GET {docs}/v1/documents/{id}` |
//! | create | `POST {docs}/v1/documents`, then `POST {docs}/v1/documents/{id}:batchUpdate` |
//!
//! # Credentials
//!
//! OAuth user credentials are read from a JSON file
//! (`drive.credentials_path`, default `./google_tokens.json`):
//!
//! ```json
//! {
//!   "token": "ya29...",
//!   "refresh_token": "1//0g...",
//!   "client_id": "....apps.googleusercontent.com",
//!   "client_secret": "..."
//! }
//! ```
//!
//! When a request comes back `401 Unauthorized` and a refresh token is
//! present, the access token is refreshed once via `drive.oauth_token_url`
//! and the request is retried. The refreshed token lives in memory only.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use drive_qa_core::models::{CreatedDocument, DocumentListing, ListFilter};
use drive_qa_core::source::DocumentSource;
use drive_qa_core::QaError;

use crate::config::DriveConfig;

const LIST_FIELDS: &str = "files(id,name,mimeType,createdTime,modifiedTime)";

/// OAuth credentials as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveCredentials {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl DriveCredentials {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read Google credentials: {} (generate OAuth tokens first)",
                path.display()
            )
        })?;
        Self::parse(&raw).with_context(|| format!("Invalid credentials file: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let creds: Self = serde_json::from_str(raw)?;
        if creds.token.trim().is_empty() {
            bail!("credentials token is empty");
        }
        Ok(creds)
    }

    fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewDocument {
    document_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// [`DocumentSource`] backed by Google Drive and Google Docs.
pub struct GoogleDriveSource {
    client: reqwest::Client,
    drive_base: String,
    docs_base: String,
    token_url: String,
    credentials: RwLock<DriveCredentials>,
}

impl GoogleDriveSource {
    /// Build a source from config, loading credentials from disk.
    pub fn from_config(config: &DriveConfig) -> Result<Self> {
        let credentials = DriveCredentials::load(&config.credentials_path)?;
        Self::new(config, credentials)
    }

    pub fn new(config: &DriveConfig, credentials: DriveCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            drive_base: config.drive_api_base.trim_end_matches('/').to_string(),
            docs_base: config.docs_api_base.trim_end_matches('/').to_string(),
            token_url: config.oauth_token_url.clone(),
            credentials: RwLock::new(credentials),
        })
    }

    /// Send an authorized request, refreshing the access token once on 401.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.credentials.read().await.token.clone();
        let resp = build().bearer_auth(&token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let refreshed = self.refresh(&token).await?;
        Ok(build().bearer_auth(&refreshed).send().await?)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// `stale` is the token that was rejected. If another request already
    /// replaced it, the newer token is returned without a second refresh.
    async fn refresh(&self, stale: &str) -> Result<String> {
        let mut creds = self.credentials.write().await;
        if creds.token != stale {
            return Ok(creds.token.clone());
        }
        if !creds.can_refresh() {
            bail!("access token rejected and no refresh token available");
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", creds.refresh_token.as_deref().unwrap_or_default()),
            ("client_id", creds.client_id.as_deref().unwrap_or_default()),
            ("client_secret", creds.client_secret.as_deref().unwrap_or_default()),
        ];
        let resp = self.client.post(&self.token_url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("token refresh failed ({}): {}", status, body);
        }
        let token: TokenResponse = resp.json().await?;
        info!("refreshed Google access token");
        creds.token = token.access_token.clone();
        Ok(token.access_token)
    }

    async fn list_files(&self, filter: &ListFilter) -> Result<Vec<DocumentListing>> {
        let url = format!("{}/drive/v3/files", self.drive_base);
        let mut query: Vec<(&str, String)> = vec![("fields", LIST_FIELDS.to_string())];
        if let Some(page_size) = filter.page_size {
            query.push(("pageSize", page_size.to_string()));
        }
        if let Some(content_type) = &filter.content_type {
            query.push(("q", format!("mimeType='{}'", content_type.replace('\'', "\\'"))));
        }

        let resp = self.send(|| self.client.get(&url).query(&query)).await?;
        let resp = ensure_success(resp).await?;
        let list: FileList = resp.json().await?;
        debug!(count = list.files.len(), "listed drive files");

        Ok(list
            .files
            .into_iter()
            .map(|f| DocumentListing {
                id: f.id,
                name: f.name,
                content_type: f.mime_type,
                created_time: f.created_time,
                modified_time: f.modified_time,
            })
            .collect())
    }

    async fn fetch_document(&self, id: &str) -> Result<String> {
        let url = format!("{}/v1/documents/{}", self.docs_base, id);
        let resp = self.send(|| self.client.get(&url)).await?;
        let resp = ensure_success(resp).await?;
        let doc: Value = resp.json().await?;
        Ok(extract_text(&doc))
    }

    async fn create_document(&self, title: &str, content: &str) -> Result<CreatedDocument> {
        let url = format!("{}/v1/documents", self.docs_base);
        let body = serde_json::json!({ "title": title });
        let resp = self.send(|| self.client.post(&url).json(&body)).await?;
        let resp = ensure_success(resp).await?;
        let created: NewDocument = resp.json().await?;

        if !content.is_empty() {
            let update_url = format!(
                "{}/v1/documents/{}:batchUpdate",
                self.docs_base, created.document_id
            );
            let update = serde_json::json!({
                "requests": [{
                    "insertText": {
                        "location": { "index": 1 },
                        "text": content,
                    }
                }]
            });
            let resp = self
                .send(|| self.client.post(&update_url).json(&update))
                .await?;
            ensure_success(resp)
                .await
                .with_context(|| format!("document {} created but text insert failed", created.document_id))?;
        }

        info!(id = %created.document_id, title, "created document");
        Ok(CreatedDocument {
            url: document_url(&created.document_id),
            id: created.document_id,
            title: title.to_string(),
        })
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(anyhow!("Google API error {}: {}", status, message))
}

/// Browser URL for editing a Google Doc.
pub fn document_url(id: &str) -> String {
    format!("https://docs.google.com/document/d/{}/edit", id)
}

/// Concatenate every `textRun` in a Docs API document body.
///
/// Only top-level paragraphs are read; tables and other structural
/// elements contribute nothing.
pub fn extract_text(doc: &Value) -> String {
    let mut text = String::new();
    let Some(content) = doc["body"]["content"].as_array() else {
        return text;
    };
    for element in content {
        let Some(elements) = element["paragraph"]["elements"].as_array() else {
            continue;
        };
        for elem in elements {
            if let Some(run) = elem["textRun"]["content"].as_str() {
                text.push_str(run);
            }
        }
    }
    text
}

#[async_trait]
impl DocumentSource for GoogleDriveSource {
    async fn list(&self, filter: &ListFilter) -> drive_qa_core::Result<Vec<DocumentListing>> {
        self.list_files(filter).await.map_err(|e| {
            warn!(error = %e, "drive listing failed");
            QaError::SourceUnavailable(format!("{:#}", e))
        })
    }

    async fn get_content(&self, id: &str) -> drive_qa_core::Result<String> {
        self.fetch_document(id)
            .await
            .map_err(|e| QaError::document_unavailable(id, format!("{:#}", e)))
    }

    async fn create(&self, title: &str, content: &str) -> drive_qa_core::Result<CreatedDocument> {
        self.create_document(title, content)
            .await
            .map_err(|e| QaError::SourceUnavailable(format!("{:#}", e)))
    }
}
