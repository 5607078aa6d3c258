use std::time::SystemTime;

use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const LIST_FIELDS: &str =
    "nextPageToken, files(id,name,parents,mimeType,capabilities/canShare,capabilities/canCopy)";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        retry_after: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    /// Fetches one page of every file and folder visible to the account,
    /// shared drives included.
    pub async fn list_files(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &page_size.max(1).to_string());
            query.append_pair("fields", LIST_FIELDS);
            query.append_pair("includeItemsFromAllDrives", "true");
            query.append_pair("supportsAllDrives", "true");
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                query.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
        let mut url = self.file_endpoint(&[id])?;
        url.query_pairs_mut()
            .append_pair("fields", "*")
            .append_pair("supportsAllDrives", "true");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_folder(&self, parent_id: &str, name: &str) -> Result<DriveFile, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        url.query_pairs_mut().append_pair("supportsAllDrives", "true");
        let request = FileRequest {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: vec![parent_id],
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn copy_file(
        &self,
        id: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<DriveFile, DriveError> {
        let mut url = self.file_endpoint(&[id, "copy"])?;
        url.query_pairs_mut().append_pair("supportsAllDrives", "true");
        let request = FileRequest {
            name,
            mime_type: None,
            parents: vec![parent_id],
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_permission(
        &self,
        file_id: &str,
        permission: &PermissionRequest,
    ) -> Result<Permission, DriveError> {
        let mut url = self.file_endpoint(&[file_id, "permissions"])?;
        url.query_pairs_mut()
            .append_pair("sendNotificationEmail", "false")
            .append_pair("supportsAllDrives", "true");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(permission)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_permission(
        &self,
        file_id: &str,
        permission_id: &str,
    ) -> Result<(), DriveError> {
        let mut url = self.file_endpoint(&[file_id, "permissions", permission_id])?;
        url.query_pairs_mut().append_pair("supportsAllDrives", "true");
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::api_error(response).await)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    // Ids are opaque, so they go in as escaped path segments.
    fn file_endpoint(&self, segments: &[&str]) -> Result<Url, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        url.path_segments_mut()
            .map_err(|_| DriveError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .extend(segments);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> DriveError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        DriveError::Api {
            status,
            body,
            retry_after,
        }
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, body, .. } => Some(classify_api_status(*status, body)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }

    /// Only throttling, as opposed to any retryable failure. A request that
    /// creates something may have succeeded despite a 5xx answer.
    pub fn is_rate_limited(&self) -> bool {
        self.classification() == Some(ApiErrorClass::RateLimit)
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            DriveError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DriveError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode, body: &str) -> ApiErrorClass {
    // Drive reports per-user quota exhaustion as 403 with a rate-limit reason.
    if status == StatusCode::FORBIDDEN
        && (body.contains("userRateLimitExceeded") || body.contains("rateLimitExceeded"))
    {
        ApiErrorClass::RateLimit
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(
        at.duration_since(SystemTime::now())
            .map(|d| d.as_secs())
            .unwrap_or(0),
    )
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn can_share(&self) -> bool {
        self.capabilities.as_ref().is_some_and(|c| c.can_share)
    }

    pub fn can_copy(&self) -> bool {
        self.capabilities.as_ref().is_some_and(|c| c.can_copy)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub can_share: bool,
    #[serde(default)]
    pub can_copy: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionRole {
    Reader,
    Commenter,
    Writer,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    #[serde(rename = "type")]
    pub grantee_type: String,
    pub email_address: String,
    pub role: PermissionRole,
}

impl PermissionRequest {
    pub fn user(email_address: impl Into<String>, role: PermissionRole) -> Self {
        Self {
            grantee_type: "user".to_string(),
            email_address: email_address.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Permission {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
}
