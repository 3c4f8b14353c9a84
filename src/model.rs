// ABOUTME: Serde data models for OAuth secrets, tokens and Drive responses
// ABOUTME: Tolerant parsing with optional fields and Google defaults

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_MS: i64 = 60_000;

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.into()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.into()
}

/// Top level of a downloaded `credentials.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsFile {
    #[serde(default)]
    pub installed: Option<ClientSecrets>,
    #[serde(default)]
    pub web: Option<ClientSecrets>,
}

impl SecretsFile {
    pub fn into_client(self) -> Option<ClientSecrets> {
        self.installed.or(self.web)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ClientSecrets {
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }
}


/// Token object as persisted to `token.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl Token {
    /// A token without an expiry date is assumed valid.
    pub fn is_expired(&self) -> bool {
        match self.expiry_date {
            Some(expiry) => Utc::now().timestamp_millis() + EXPIRY_SKEW_MS >= expiry,
            None => false,
        }
    }

    /// Folds a refresh response into this token. Google usually omits the
    /// refresh token on refresh, so the existing one is kept.
    pub fn merge(&mut self, resp: TokenResponse) {
        let refreshed = resp.into_token();
        self.access_token = refreshed.access_token;
        self.expiry_date = refreshed.expiry_date;
        if refreshed.refresh_token.is_some() {
            self.refresh_token = refreshed.refresh_token;
        }
        if refreshed.scope.is_some() {
            self.scope = refreshed.scope;
        }
        if refreshed.token_type.is_some() {
            self.token_type = refreshed.token_type;
        }
    }
}

/// Body returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn into_token(self) -> Token {
        let expiry_date = self
            .expires_in
            .map(|secs| Utc::now().timestamp_millis().saturating_add(secs.saturating_mul(1000)));

        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            token_type: self.token_type,
            expiry_date,
        }
    }
}

#[cfg(test)]
mod token_tests {
    use super::*;

    #[test]
    fn test_token_deserialize_minimal() {
        let token: Token = serde_json::from_str(r#"{"access_token": "ya29"}"#).unwrap();
        assert_eq!(token.access_token, "ya29");
        assert!(token.refresh_token.is_none());
        assert!(!token.is_expired());
    }

    #[test]
    fn test_token_expiry() {
        let mut token: Token = serde_json::from_str(r#"{"access_token": "ya29"}"#).unwrap();
        token.expiry_date = Some(Utc::now().timestamp_millis() - 1);
        assert!(token.is_expired());

        // inside the skew window
        token.expiry_date = Some(Utc::now().timestamp_millis() + 30_000);
        assert!(token.is_expired());

        token.expiry_date = Some(Utc::now().timestamp_millis() + 3_600_000);
        assert!(!token.is_expired());
    }

    #[test]
    fn test_token_response_into_token() {
        let json = r#"{
            "access_token": "ya29.new",
            "expires_in": 3599,
            "refresh_token": "1//refresh",
            "scope": "https://www.googleapis.com/auth/drive",
            "token_type": "Bearer"
        }"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        let token = resp.into_token();
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
        assert!(token.expiry_date.unwrap() > Utc::now().timestamp_millis());
    }

    #[test]
    fn test_huge_expires_in_saturates() {
        let resp: TokenResponse = serde_json::from_str(&format!(
            r#"{{"access_token": "a", "expires_in": {}}}"#,
            i64::MAX
        ))
        .unwrap();
        let token = resp.into_token();
        assert_eq!(token.expiry_date, Some(i64::MAX));
        assert!(!token.is_expired());
    }

    #[test]
    fn test_merge_keeps_refresh_token() {
        let mut token = Token {
            access_token: "old".into(),
            refresh_token: Some("keep-me".into()),
            scope: Some("scope".into()),
            token_type: Some("Bearer".into()),
            expiry_date: Some(0),
        };
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token": "new", "expires_in": 3600}"#).unwrap();
        token.merge(resp);

        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(token.scope.as_deref(), Some("scope"));
        assert!(!token.is_expired());
    }

    #[test]
    fn test_token_serialize_skips_empty_fields() {
        let token = Token {
            access_token: "a".into(),
            refresh_token: None,
            scope: None,
            token_type: None,
            expiry_date: None,
        };
        assert_eq!(serde_json::to_string(&token).unwrap(), r#"{"access_token":"a"}"#);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One page of a `files.list` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod drive_tests {
    use super::*;

    #[test]
    fn test_file_list_deserialize() {
        let json = r#"{
            "nextPageToken": "page-2",
            "files": [{"id": "X1", "name": "a.json"}, {"id": "X2"}],
            "kind": "drive#fileList"
        }"#;
        let list: FileList = serde_json::from_str(json).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(list.files.len(), 2);
        assert_eq!(list.files[1].name, "");
    }

    #[test]
    fn test_file_list_empty_body() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
        assert!(list.next_page_token.is_none());
    }
}
