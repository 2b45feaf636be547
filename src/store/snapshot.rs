//! Cached state of the store and its on-disk mirror.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::constants::defaults;
use crate::format::format_bytes;
use crate::registry::{repository_key, ArchitectureInfo, Image, Manifest, Repository, Source};

/// HTTP status code (as a string) to a human-readable explanation
pub type StatusCodes = BTreeMap<String, String>;

pub fn default_status_codes() -> StatusCodes {
    [
        ("0", "Registry unreachable: connection refused, DNS or TLS failure"),
        ("200", "Registry is up"),
        ("401", "Authentication required: check the credentials for this source"),
        ("403", "Access denied: the credentials lack permission"),
        ("404", "Not found: the registry does not serve the v2 API at this path"),
        ("408", "Request timed out"),
        ("429", "Rate limited by the registry"),
        ("500", "Registry internal error"),
        ("502", "Bad gateway between the proxy and the registry"),
        ("503", "Registry unavailable"),
    ]
    .into_iter()
    .map(|(code, text)| (code.to_string(), text.to_string()))
    .collect()
}

/// One tag as shown in a repository's detail view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub name: String,
    pub digest: String,
    /// Config plus layers, summed over every platform
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub architectures: Vec<ArchitectureInfo>,
}

impl TagSummary {
    /// Summarize a tag from its manifest and resolved images. A multi-image
    /// tag is as old as its oldest image.
    pub fn from_images(tag: &str, manifest: &Manifest, images: &[Image]) -> Self {
        Self {
            name: tag.to_string(),
            digest: manifest.digest.clone(),
            size: images.iter().map(|i| i.size).sum(),
            last_updated: images.iter().filter_map(|i| i.created()).min(),
            architectures: images.iter().map(|i| i.architecture_info()).collect(),
        }
    }

    pub fn formatted_size(&self) -> String {
        format_bytes(self.size)
    }
}

/// Aggregate view of a repository, computed from a sample of its tags.
///
/// `total_size`, `architectures` and `last_updated` only cover the sampled
/// tags and are approximate; `tag_count` is exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMeta {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub tag_count: usize,
    pub total_size: u64,
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl RepositoryMeta {
    /// A repository with no sampled data yet
    pub fn empty(repository: &Repository, tag_count: usize) -> Self {
        Self {
            source: repository.source.clone(),
            namespace: repository.namespace.clone(),
            name: repository.name.clone(),
            tag_count,
            total_size: 0,
            architectures: Vec::new(),
            last_updated: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn repository(&self) -> Repository {
        Repository::new(&self.source, self.namespace.clone(), &self.name)
    }

    pub fn full_name(&self) -> String {
        self.repository().full_name()
    }

    pub fn key(&self) -> String {
        repository_key(&self.source, &self.full_name())
    }

    pub fn is_untagged(&self) -> bool {
        self.tag_count == 0
    }

    pub fn formatted_size(&self) -> String {
        format_bytes(self.total_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDetail {
    #[serde(flatten)]
    pub meta: RepositoryMeta,
    pub tags: Vec<TagSummary>,
}

impl RepositoryDetail {
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.meta.fetched_at < ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Idle,
    Catalog,
    Tags,
    Manifests,
    Complete,
}

/// Progress of the refresh in flight
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingStage {
    pub stage: Stage,
    /// 0 to 100, never decreasing within one refresh
    pub progress: u8,
    pub message: String,
}

impl LoadingStage {
    pub fn new(stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            message: message.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }
}

/// Everything the store knows, replaced as a whole on every update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub repository_metas: Vec<RepositoryMeta>,
    /// Keyed by [`repository_key`]
    #[serde(default)]
    pub repository_details: BTreeMap<String, RepositoryDetail>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub status_codes: StatusCodes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_catalog_refresh: Option<DateTime<Utc>>,
    #[serde(default)]
    pub available_architectures: Vec<String>,
}

impl Snapshot {
    pub fn meta(&self, key: &str) -> Option<&RepositoryMeta> {
        self.repository_metas.iter().find(|m| m.key() == key)
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Sorted union of the architectures of every repository
    pub fn collect_architectures(metas: &[RepositoryMeta]) -> Vec<String> {
        let mut all: Vec<String> = metas
            .iter()
            .flat_map(|m| m.architectures.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn status_text(&self, code: u16) -> Option<&str> {
        self.status_codes.get(&code.to_string()).map(String::as_str)
    }
}

/// JSON file the snapshot is mirrored to
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CACHE_HOME/containerhub/repository-store.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("containerhub").join(defaults::SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore a saved snapshot. A missing file is not an error; an
    /// unreadable one is logged and ignored.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            debug!("No cached snapshot at {}", self.path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Ignoring corrupt snapshot {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    /// Replace the file with `snapshot`. The JSON goes to a uniquely named
    /// file in the same directory first and is renamed over the target, so
    /// concurrent writers never interleave.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut staging = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut staging, snapshot)
            .with_context(|| format!("Failed to write {}", staging.path().display()))?;
        staging
            .persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!("Saved snapshot to {}", self.path.display());
        Ok(())
    }
}
