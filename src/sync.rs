// ABOUTME: Reconciles local files into a remote folder by name
// ABOUTME: Paginated lookup, then create or update, with progress reporting

use crate::{
    api::{FileQuery, RemoteStore},
    config::SyncConfig,
    model::RemoteFile,
    Error, Result,
};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Created(String),
    Updated(String),
}

impl SyncAction {
    pub fn remote_id(&self) -> &str {
        match self {
            SyncAction::Created(id) | SyncAction::Updated(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub name: String,
    pub action: SyncAction,
}

/// Outcomes in the same order as the configured paths.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<FileOutcome>,
}

impl SyncReport {
    pub fn created(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.action, SyncAction::Created(_)))
            .count()
    }

    pub fn updated(&self) -> usize {
        self.outcomes.len() - self.created()
    }
}

pub struct Reconciler<'a, S: RemoteStore> {
    store: &'a S,
    config: &'a SyncConfig,
    jobs: usize,
    show_progress: bool,
}

impl<'a, S: RemoteStore> Reconciler<'a, S> {
    pub fn new(store: &'a S, config: &'a SyncConfig) -> Self {
        Reconciler {
            store,
            config,
            jobs: 1,
            show_progress: true,
        }
    }

    /// Worker count; 1 keeps strict input order.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn run(&self) -> Result<SyncReport> {
        self.config.validate()?;
        info!("Begin: upload");

        let paths = &self.config.local_file_paths;
        let pb = if self.show_progress {
            let pb = ProgressBar::new(paths.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:40}] {pos}/{len} files {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let sync_one = |path: &PathBuf| -> Result<FileOutcome> {
            let outcome = self.sync_file(path)?;
            pb.inc(1);
            Ok(outcome)
        };

        let outcomes = if self.jobs == 1 {
            paths.iter().map(sync_one).collect::<Result<Vec<_>>>()
        } else {
            let groups = group_by_name(paths)?;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()
                .map_err(|e| {
                    Error::Config(format!("Cannot start {} workers: {}", self.jobs, e))
                })?;

            // Paths sharing a remote name stay on one worker, in input order.
            pool.install(|| {
                groups
                    .par_iter()
                    .map(|group| {
                        group
                            .iter()
                            .map(|&(idx, path)| sync_one(path).map(|outcome| (idx, outcome)))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .map(|groups| {
                let mut indexed: Vec<_> = groups.into_iter().flatten().collect();
                indexed.sort_by_key(|(idx, _)| *idx);
                indexed.into_iter().map(|(_, outcome)| outcome).collect()
            })
        };

        let report = match outcomes {
            Ok(outcomes) => SyncReport { outcomes },
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        };

        pb.finish_with_message(format!(
            "({} created, {} updated)",
            report.created(),
            report.updated()
        ));
        info!(
            created = report.created(),
            updated = report.updated(),
            "End: upload"
        );

        Ok(report)
    }

    /// LOOKUP then CREATE or UPDATE for a single file.
    pub fn sync_file(&self, path: &Path) -> Result<FileOutcome> {
        let name = base_name(path)?;
        let content = fs::read_to_string(path).map_err(|source| Error::LocalFile {
            path: path.to_path_buf(),
            source,
        })?;

        let action = match self.find_existing(&name)? {
            Some(existing) => {
                let updated =
                    self.store
                        .update_file(&existing.id, &content, &self.config.mime_type)?;
                info!(file = %name, id = %updated.id, "updated");
                SyncAction::Updated(updated.id)
            }
            None => {
                let created = self.store.create_file(
                    &name,
                    &self.config.dst_folder_id,
                    &content,
                    &self.config.mime_type,
                )?;
                info!(file = %name, id = %created.id, "created");
                SyncAction::Created(created.id)
            }
        };

        Ok(FileOutcome {
            path: path.to_path_buf(),
            name,
            action,
        })
    }

    /// First record returned for `name` in the destination folder. Pages are
    /// followed only until a page contains a match.
    pub fn find_existing(&self, name: &str) -> Result<Option<RemoteFile>> {
        let query = FileQuery {
            name,
            parent_id: &self.config.dst_folder_id,
        };
        let mut page_token: Option<String> = None;

        loop {
            let page = self.store.list_files(&query, page_token.as_deref())?;

            let mut files = page.files.into_iter();
            if let Some(first) = files.next() {
                let ignored = files.count();
                if ignored > 0 {
                    debug!(
                        file = %name,
                        id = %first.id,
                        ignored,
                        "duplicate names, using first match"
                    );
                }
                return Ok(Some(first));
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(None),
            }
        }
    }
}

/// Groups paths by base name, keeping each path's input index.
fn group_by_name(paths: &[PathBuf]) -> Result<Vec<Vec<(usize, &PathBuf)>>> {
    let mut groups: Vec<(String, Vec<(usize, &PathBuf)>)> = Vec::new();
    for (idx, path) in paths.iter().enumerate() {
        let name = base_name(path)?;
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, group)) => group.push((idx, path)),
            None => groups.push((name, vec![(idx, path)])),
        }
    }
    Ok(groups.into_iter().map(|(_, group)| group).collect())
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("{} has no usable file name", path.display())))
}
