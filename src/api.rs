// ABOUTME: Blocking HTTP client for the Drive v3 files API
// ABOUTME: Bearer auth with refresh on 401, one retry of idempotent calls

use crate::auth::Session;
use crate::model::{FileList, RemoteFile};
use crate::util::{escape_query_value, truncate_str};
use crate::{Error, Result};
use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

const FILES_ENDPOINT: &str = "/drive/v3/files";
const UPLOAD_ENDPOINT: &str = "/upload/drive/v3/files";
const LIST_FIELDS: &str = "nextPageToken,files(id,name)";
const FILE_FIELDS: &str = "id,name";

/// Name lookup inside one folder, excluding trashed files.
#[derive(Debug, Clone, Copy)]
pub struct FileQuery<'a> {
    pub name: &'a str,
    pub parent_id: &'a str,
}

impl FileQuery<'_> {
    pub fn to_drive_query(&self) -> String {
        format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query_value(self.name),
            escape_query_value(self.parent_id)
        )
    }
}

/// The three store operations reconciliation needs.
pub trait RemoteStore: Sync {
    fn list_files(&self, query: &FileQuery<'_>, page_token: Option<&str>) -> Result<FileList>;

    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        content: &str,
        mime_type: &str,
    ) -> Result<RemoteFile>;

    fn update_file(&self, id: &str, content: &str, mime_type: &str) -> Result<RemoteFile>;
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Session,
    retry_min_ms: u64,
    retry_max_ms: u64,
}

impl ApiClient {
    pub fn new(session: Session, base_url: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(ApiClient {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_API_BASE.into())
                .trim_end_matches('/')
                .to_string(),
            session,
            retry_min_ms: 500,
            retry_max_ms: 1500,
        })
    }

    pub fn with_retry_backoff(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.retry_min_ms = min_ms;
        self.retry_max_ms = max_ms.max(min_ms);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn backoff(&self) {
        if self.retry_max_ms > 0 {
            let sleep_ms = rand::thread_rng().gen_range(self.retry_min_ms..=self.retry_max_ms);
            std::thread::sleep(Duration::from_millis(sleep_ms));
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Upload URL for an existing file, with `id` escaped as one path segment.
    fn file_upload_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url(UPLOAD_ENDPOINT))
            .map_err(|e| Error::Config(format!("Invalid API base {}: {}", self.base_url, e)))?;
        let no_path = || Error::Config(format!("API base {} cannot hold a path", self.base_url));
        url.path_segments_mut().map_err(|_| no_path())?.push(id);
        Ok(url)
    }

    /// Sends the request built by `build`, refreshing the token once on 401.
    /// Only `idempotent` requests are retried after a transient failure; a
    /// create may already have been applied when the response is lost.
    fn execute<T, F>(&self, endpoint: &str, idempotent: bool, build: F) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut token = self.session.access_token()?;
        let mut refreshed = false;
        let mut retried = false;

        loop {
            match self.send_once(endpoint, &build, &token) {
                Ok(value) => return Ok(value),
                Err(Error::Remote { status: 401, .. }) if !refreshed => {
                    debug!(endpoint, "access token rejected, refreshing");
                    refreshed = true;
                    token = self.session.force_refresh(&token)?;
                }
                Err(e) if idempotent && e.is_transient() && !retried => {
                    warn!(endpoint, error = %e, "transient failure, retrying once");
                    retried = true;
                    self.backoff();
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send_once<T, F>(&self, endpoint: &str, build: &F, token: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = build(&self.client)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(USER_AGENT, concat!("drivesync/", env!("CARGO_PKG_VERSION")))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(Error::Remote {
                endpoint: endpoint.into(),
                status: status.as_u16(),
                message: truncate_str(&message, 100),
            });
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(
                endpoint,
                body = %truncate_str(&body, 500),
                "failed to parse response"
            );
            Error::Parse(e)
        })
    }
}

fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    content: &str,
    mime_type: &str,
) -> Vec<u8> {
    format!(
        concat!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n",
            "--{b}\r\nContent-Type: {mime}\r\n\r\n{content}\r\n",
            "--{b}--\r\n",
        ),
        b = boundary,
        meta = metadata,
        mime = mime_type,
        content = content,
    )
    .into_bytes()
}

impl RemoteStore for ApiClient {
    fn list_files(&self, query: &FileQuery<'_>, page_token: Option<&str>) -> Result<FileList> {
        let url = self.url(FILES_ENDPOINT);
        let q = query.to_drive_query();

        self.execute(FILES_ENDPOINT, true, |client| {
            let req = client
                .get(&url)
                .query(&[("q", q.as_str()), ("fields", LIST_FIELDS)]);
            match page_token {
                Some(t) => req.query(&[("pageToken", t)]),
                None => req,
            }
        })
    }

    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        content: &str,
        mime_type: &str,
    ) -> Result<RemoteFile> {
        let url = self.url(UPLOAD_ENDPOINT);
        let boundary = format!("drivesync-{:016x}", rand::thread_rng().gen::<u64>());
        let metadata = json!({
            "name": name,
            "parents": [parent_id],
            "mimeType": mime_type,
        });
        let body = multipart_related(&boundary, &metadata, content, mime_type);
        let content_type = format!("multipart/related; boundary={}", boundary);

        self.execute(UPLOAD_ENDPOINT, false, |client| {
            client
                .post(&url)
                .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                .header(CONTENT_TYPE, content_type.as_str())
                .body(body.clone())
        })
    }

    fn update_file(&self, id: &str, content: &str, mime_type: &str) -> Result<RemoteFile> {
        let url = self.file_upload_url(id)?;

        self.execute(url.path(), true, |client| {
            client
                .patch(url.clone())
                .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
                .header(CONTENT_TYPE, mime_type)
                .body(content.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClientSecrets, Token};
    use tempfile::TempDir;

    fn session(temp: &TempDir) -> Session {
        let secrets = ClientSecrets {
            client_id: "id".into(),
            client_secret: "secret".into(),
            redirect_uris: vec!["http://localhost".into()],
            auth_uri: crate::model::DEFAULT_AUTH_URI.into(),
            token_uri: crate::model::DEFAULT_TOKEN_URI.into(),
        };
        let token = Token {
            access_token: "test_token".into(),
            refresh_token: None,
            scope: None,
            token_type: None,
            expiry_date: None,
        };
        Session::new(secrets, token, temp.path().join("token.json")).unwrap()
    }

    #[test]
    fn test_drive_query() {
        let q = FileQuery {
            name: "a.json",
            parent_id: "F1",
        };
        assert_eq!(
            q.to_drive_query(),
            "name = 'a.json' and 'F1' in parents and trashed = false"
        );
    }

    #[test]
    fn test_drive_query_escapes_quotes() {
        let q = FileQuery {
            name: "bob's notes.json",
            parent_id: "F1",
        };
        assert_eq!(
            q.to_drive_query(),
            "name = 'bob\\'s notes.json' and 'F1' in parents and trashed = false"
        );
    }

    #[test]
    fn test_multipart_related_layout() {
        let meta = json!({"name": "a.json"});
        let body = multipart_related("XYZ", &meta, "{\"k\":1}", "application/json");
        let body = String::from_utf8(body).unwrap();
        assert_eq!(
            body,
            concat!(
                "--XYZ\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n",
                "{\"name\":\"a.json\"}\r\n",
                "--XYZ\r\nContent-Type: application/json\r\n\r\n{\"k\":1}\r\n",
                "--XYZ--\r\n",
            )
        );
    }

    #[test]
    fn test_api_client_new() {
        let temp = TempDir::new().unwrap();
        let client = ApiClient::new(session(&temp), None).unwrap();
        assert_eq!(client.base_url, DEFAULT_API_BASE);
        assert_eq!(
            client.url(FILES_ENDPOINT),
            "https://www.googleapis.com/drive/v3/files"
        );
    }

    #[test]
    fn test_api_client_custom_base() {
        let temp = TempDir::new().unwrap();
        let client =
            ApiClient::new(session(&temp), Some("http://127.0.0.1:1234/".into())).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:1234");
    }

    #[test]
    fn test_file_upload_url_escapes_id() {
        let temp = TempDir::new().unwrap();
        let client = ApiClient::new(session(&temp), None).unwrap();

        let url = client.file_upload_url("X1").unwrap();
        assert_eq!(url.as_str(), "https://www.googleapis.com/upload/drive/v3/files/X1");

        let url = client.file_upload_url("a/b c?").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/upload/drive/v3/files/a%2Fb%20c%3F"
        );
    }

    #[test]
    fn test_api_client_retry_backoff_config() {
        let temp = TempDir::new().unwrap();
        let client = ApiClient::new(session(&temp), None)
            .unwrap()
            .with_retry_backoff(50, 10);
        assert_eq!(client.retry_min_ms, 50);
        assert_eq!(client.retry_max_ms, 50);
    }
}
