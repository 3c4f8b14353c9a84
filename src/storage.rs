// ABOUTME: File locations for secrets, token and sync config, plus atomic writes
// ABOUTME: Resolves the working directory with an override and platform fallback

use crate::{Error, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const TOKEN_FILE: &str = "token.json";
pub const SYNC_CONFIG_FILE: &str = "sync.json";

pub struct Paths {
    pub base_dir: PathBuf,
    pub credentials: PathBuf,
    pub token: PathBuf,
    pub sync_config: PathBuf,
}

impl Paths {
    /// Base directory precedence: explicit override → current directory when
    /// it holds `credentials.json` → platform config directory.
    pub fn new(base_dir_override: Option<PathBuf>) -> Result<Self> {
        let base_dir = if let Some(dir) = base_dir_override {
            dir
        } else if Path::new(CREDENTIALS_FILE).exists() {
            PathBuf::from(".")
        } else {
            ProjectDirs::from("", "", "drivesync")
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .config_dir()
                .to_path_buf()
        };

        Ok(Paths {
            credentials: base_dir.join(CREDENTIALS_FILE),
            token: base_dir.join(TOKEN_FILE),
            sync_config: base_dir.join(SYNC_CONFIG_FILE),
            base_dir,
        })
    }

    pub fn with_credentials(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.credentials = path;
        }
        self
    }

    pub fn with_token(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.token = path;
        }
        self
    }

    pub fn with_sync_config(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.sync_config = path;
        }
        self
    }
}

/// Writes through a temp file in the target's directory and renames it into
/// place. The result is readable by the owner only.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    use rand::Rng;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let random: u32 = rand::thread_rng().gen();
    let tmp_path = dir.join(format!(".{:x}.part", random));

    fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&tmp_path, perms)?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_new_with_override() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::new(Some(temp.path().to_path_buf())).unwrap();
        assert_eq!(paths.base_dir, temp.path());
        assert_eq!(paths.credentials, temp.path().join("credentials.json"));
        assert_eq!(paths.token, temp.path().join("token.json"));
        assert_eq!(paths.sync_config, temp.path().join("sync.json"));
    }

    #[test]
    fn test_paths_file_overrides() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::new(Some(temp.path().to_path_buf()))
            .unwrap()
            .with_token(Some("/elsewhere/tok.json".into()))
            .with_credentials(None);
        assert_eq!(paths.token, PathBuf::from("/elsewhere/tok.json"));
        assert_eq!(paths.credentials, temp.path().join("credentials.json"));
    }
}
