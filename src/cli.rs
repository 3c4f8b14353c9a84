// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines the sync and auth subcommands and global flags

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "drivesync")]
#[command(about = "Upload a fixed set of local files into a Drive folder", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding credentials.json, token.json and sync.json
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// OAuth client secrets file
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// Cached token file
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    /// Do not try to open the authorization URL in a browser
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// API base URL
    #[arg(long, global = true, default_value = crate::api::DEFAULT_API_BASE)]
    pub api_base: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Sync target list (defaults to sync.json in the config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Destination folder id (overrides dst_folder_id)
    #[arg(long)]
    pub folder: Option<String>,

    /// MIME type sent with every upload
    #[arg(long)]
    pub mime_type: Option<String>,

    /// Number of files synced concurrently
    #[arg(long, default_value_t = 1, value_parser = parse_jobs)]
    pub jobs: usize,

    /// Local files to sync (override local_file_paths)
    pub files: Vec<PathBuf>,
}

fn parse_jobs(s: &str) -> Result<usize, String> {
    let jobs: usize = s.parse().map_err(|_| format!("Invalid job count: {}", s))?;
    if jobs == 0 || jobs > 16 {
        return Err("jobs must be between 1 and 16".into());
    }
    Ok(jobs)
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Upload the configured files (default)
    Sync(SyncArgs),

    /// Run the authorization flow and store the token
    Auth {
        /// Discard any cached token first
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Sync(SyncArgs {
                jobs: 1,
                ..SyncArgs::default()
            }))
    }
}
