// ABOUTME: Public library API for drivesync
// ABOUTME: Credential manager, Drive client and file reconciler

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use model::{ClientSecrets, FileList, RemoteFile, Token};
