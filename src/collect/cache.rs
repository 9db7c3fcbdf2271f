use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Read-through cache of upstream responses, one file per request URL
pub struct ResponseCache {
    cache_dir: PathBuf,
    /// Entries older than this are misses; `None` keeps them forever
    max_age: Option<Duration>,
}

impl ResponseCache {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let cache_dir = match custom_dir {
            Some(dir) => dir,
            None => {
                let proj_dirs = ProjectDirs::from("", "", "catalog-ingest")
                    .context("Could not determine cache directory")?;
                proj_dirs.cache_dir().join("responses")
            }
        };

        fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

        Ok(Self {
            cache_dir,
            max_age: None,
        })
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.cache_dir.join(format!("{:x}.json", digest))
    }

    fn is_expired(&self, path: &Path) -> bool {
        let Some(max_age) = self.max_age else {
            return false;
        };
        let age = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(|modified| SystemTime::now().duration_since(modified).unwrap_or_default());
        match age {
            Ok(age) => age >= max_age,
            Err(_) => true,
        }
    }

    /// Cached body for `url`; unreadable and expired entries count as misses
    pub fn get(&self, url: &str) -> Option<Value> {
        let path = self.entry_path(url);
        if !path.exists() {
            return None;
        }
        if self.is_expired(&path) {
            debug!(url, "cache entry expired");
            return None;
        }
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(value) => {
                debug!(url, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding corrupt cache entry");
                fs::remove_file(&path).ok();
                None
            }
        }
    }

    pub fn put(&self, url: &str, body: &Value) -> Result<()> {
        let path = self.entry_path(url);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body.to_string())
            .with_context(|| format!("Failed to write cache entry {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to store cache entry {:?}", path))?;
        Ok(())
    }

    /// Remove every cached response, returning how many were deleted
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json" || ext == "tmp") {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {:?}", path))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
