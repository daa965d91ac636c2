use crate::query::Query;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_DIR_NAME: &str = "img";

/// Storage layout: one base directory holding one subdirectory per
/// sanitized query. The per-query folder is an append-only cache that
/// persists across runs.
#[derive(Debug, Clone)]
pub struct StorePaths {
    base_dir: PathBuf,
}

impl StorePaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn query_dir(&self, query: &Query) -> PathBuf {
        self.base_dir.join(query.sanitized())
    }

    /// Idempotent; an existing folder is reused silently.
    pub fn ensure_query_dir(&self, query: &Query) -> std::io::Result<PathBuf> {
        let dir = self.query_dir(query);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
