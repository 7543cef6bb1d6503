pub mod reaper;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const INPUT_DIR: &str = "input_files";
const OUTPUT_DIR: &str = "output_files";
const OUTPUT_PREFIX: &str = "processed_";

/// Where uploads and annotated results live under the storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub url: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join(INPUT_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// `root/input_files/<name>`; `name` must already be sanitised.
    pub fn input_path(&self, name: &str) -> PathBuf {
        self.input_dir().join(name)
    }

    /// `root/output_files/processed_<name>`; `name` must already be sanitised.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir().join(format!("{}{}", OUTPUT_PREFIX, name))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.input_dir(), self.output_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: '{}'", dir.display()))?;
        }
        Ok(())
    }

    /// Annotated results currently on disk, sorted by name. Files that
    /// disappear while listing are skipped.
    pub fn list_processed(&self) -> Vec<StoredFile> {
        let mut files: Vec<StoredFile> = WalkDir::new(self.output_dir())
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_str()?;
                let name = file_name.strip_prefix(OUTPUT_PREFIX)?.to_string();
                let metadata = entry.metadata().ok()?;
                let modified = metadata.modified().ok()?;
                Some(StoredFile {
                    url: format!("/processed/{}", name),
                    name,
                    size: metadata.len(),
                    modified: DateTime::<Utc>::from(modified),
                })
            })
            .collect();

        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }
}

/// Reduce a caller-supplied file name to something safe to join onto a
/// storage directory. Returns `None` if nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = replaced.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        None
    } else {
        Some(cleaned.to_string())
    }
}
