// ABOUTME: OAuth2 credential lifecycle backed by token.json
// ABOUTME: Cached token → interactive consent → persisted token, with refresh

use crate::model::{ClientSecrets, SecretsFile, Token, TokenResponse};
use crate::storage::write_atomic;
use crate::util::truncate_str;
use crate::{Error, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Full Drive access. Changing it invalidates existing token files.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

pub fn load_secrets(path: &Path) -> Result<ClientSecrets> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Cannot read client secrets {}: {}. Download them from the Google Cloud Console",
            path.display(),
            e
        ))
    })?;

    let file: SecretsFile = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid client secrets {}: {}", path.display(), e)))?;

    let secrets = file.into_client().ok_or_else(|| {
        Error::Config(format!(
            "{} has no \"installed\" or \"web\" client",
            path.display()
        ))
    })?;

    if secrets.redirect_uri().is_none() {
        return Err(Error::Config(format!(
            "{} lists no redirect_uris",
            path.display()
        )));
    }

    Ok(secrets)
}

/// Any failure to read or parse the cache is a cache miss.
pub fn load_cached_token(path: &Path) -> Option<Token> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no cached token");
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparseable token file");
            None
        }
    }
}

pub fn persist_token(path: &Path, token: &Token) -> Result<()> {
    let json = serde_json::to_string(token)?;
    write_atomic(path, json.as_bytes())
}

/// Removes the cached token. A missing file is not an error.
pub fn discard_token(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "discarded cached token");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn auth_url(secrets: &ClientSecrets) -> Result<String> {
    let redirect_uri = secrets
        .redirect_uri()
        .ok_or_else(|| Error::Config("client secrets list no redirect_uris".into()))?;

    let mut url = Url::parse(&secrets.auth_uri)
        .map_err(|e| Error::Config(format!("Invalid auth_uri {}: {}", secrets.auth_uri, e)))?;
    url.query_pairs_mut()
        .append_pair("access_type", "offline")
        .append_pair("scope", DRIVE_SCOPE)
        .append_pair("response_type", "code")
        .append_pair("client_id", &secrets.client_id)
        .append_pair("redirect_uri", redirect_uri);

    Ok(url.into())
}

/// Source of the authorization code pasted back by the operator.
pub trait CodePrompt {
    fn ask_code(&mut self, auth_url: &str) -> Result<String>;
}

pub struct ConsolePrompt {
    pub open_browser: bool,
}

impl CodePrompt for ConsolePrompt {
    fn ask_code(&mut self, auth_url: &str) -> Result<String> {
        println!("Authorize this app by visiting this url: {}", auth_url);
        if self.open_browser {
            if let Err(e) = open::that(auth_url) {
                warn!(error = %e, "could not open a browser");
            }
        }

        print!("Enter the code from that page here: ");
        io::stdout().flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(Error::Auth(
                "stdin closed before an authorization code was entered".into(),
            ));
        }

        Ok(line.trim().to_string())
    }
}

fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
}

/// Returns a session from the cached token if there is one, otherwise runs
/// the consent flow once and stores the new token.
pub fn authorize(
    secrets: ClientSecrets,
    token_path: &Path,
    prompt: &mut dyn CodePrompt,
) -> Result<Session> {
    if let Some(token) = load_cached_token(token_path) {
        debug!(path = %token_path.display(), "using cached token");
        return Session::new(secrets, token, token_path.to_path_buf());
    }

    login(secrets, token_path, prompt)
}

/// Always runs the consent flow, replacing any cached token.
pub fn login(
    secrets: ClientSecrets,
    token_path: &Path,
    prompt: &mut dyn CodePrompt,
) -> Result<Session> {
    let url = auth_url(&secrets)?;
    let code = prompt.ask_code(&url)?;
    if code.is_empty() {
        return Err(Error::Auth("No authorization code entered".into()));
    }

    let http = http_client()?;
    let token = exchange_code(&http, &secrets, &code)?;

    persist_token(token_path, &token)?;
    println!("Token stored to {}", token_path.display());

    Session::with_client(http, secrets, token, token_path.to_path_buf())
}

fn exchange_code(http: &Client, secrets: &ClientSecrets, code: &str) -> Result<Token> {
    let redirect_uri = secrets.redirect_uri().unwrap_or_default();
    let form = [
        ("code", code),
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];

    let resp = request_token(http, &secrets.token_uri, &form, "code exchange")?;
    info!("authorization code exchanged for a token");
    Ok(resp.into_token())
}

fn request_token(
    http: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
    what: &str,
) -> Result<TokenResponse> {
    let response = http
        .post(token_uri)
        .form(form)
        .send()
        .map_err(|e| Error::Auth(format!("Token {} failed: {}", what, e)))?;

    let status = response.status();
    let body = response
        .text()
        .map_err(|e| Error::Auth(format!("Token {} failed: {}", what, e)))?;

    if !status.is_success() {
        return Err(Error::Auth(format!(
            "Token {} rejected ({}): {}",
            what,
            status.as_u16(),
            truncate_str(&body, 100)
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| Error::Auth(format!("Token {} returned an unreadable body: {}", what, e)))
}

/// Authorized credentials shared by every API call. The token sits behind a
/// mutex so a refresh on one worker is visible to all of them.
pub struct Session {
    http: Client,
    secrets: ClientSecrets,
    token: Mutex<Token>,
    token_path: PathBuf,
}

impl Session {
    pub fn new(secrets: ClientSecrets, token: Token, token_path: PathBuf) -> Result<Self> {
        Self::with_client(http_client()?, secrets, token, token_path)
    }

    fn with_client(
        http: Client,
        secrets: ClientSecrets,
        token: Token,
        token_path: PathBuf,
    ) -> Result<Self> {
        Ok(Session {
            http,
            secrets,
            token: Mutex::new(token),
            token_path,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Token> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn token(&self) -> Token {
        self.lock().clone()
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Current access token, refreshed first when it has expired.
    pub fn access_token(&self) -> Result<String> {
        let mut token = self.lock();
        if !token.is_expired() {
            return Ok(token.access_token.clone());
        }

        debug!("access token expired, refreshing");
        self.refresh_locked(&mut token)
    }

    /// Called after the store rejected `stale`. Skips the refresh when another
    /// caller already replaced that token.
    pub fn force_refresh(&self, stale: &str) -> Result<String> {
        let mut token = self.lock();
        if token.access_token != stale {
            return Ok(token.access_token.clone());
        }

        self.refresh_locked(&mut token)
    }

    fn refresh_locked(&self, token: &mut Token) -> Result<String> {
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            Error::Auth(format!(
                "Token expired and no refresh token is stored; delete {} and authorize again",
                self.token_path.display()
            ))
        })?;

        let form = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let resp = request_token(&self.http, &self.secrets.token_uri, &form, "refresh")?;
        token.merge(resp);

        persist_token(&self.token_path, token)?;
        info!(path = %self.token_path.display(), "refreshed access token");

        Ok(token.access_token.clone())
    }
}
