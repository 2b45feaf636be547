use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{AuthConfig, Keychain};
use crate::constants::defaults;
use crate::registry::{ClientSettings, DigestFallback, RegistryKind, Source};
use crate::store::{default_status_codes, FetchSettings, RefreshIntervals, SnapshotFile, StatusCodes};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Registry sources by name
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    /// JSON document `{ "name": { "path": ..., "host": ... } }` with more
    /// sources. Inline sources win on a name clash.
    pub sources_file: Option<PathBuf>,

    /// JSON document `{ "404": "explanation", ... }`
    pub status_codes_file: Option<PathBuf>,

    /// Where the repository snapshot is kept
    pub cache_path: Option<PathBuf>,

    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: String,
    #[serde(default)]
    pub host: String,
    pub kind: Option<RegistryKind>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub batch_size: usize,
    pub detail_batch_size: usize,
    pub sample_size: usize,
    pub cache_ttl_secs: u64,
    pub light_refresh_secs: u64,
    pub full_refresh_secs: u64,
    pub digest_fallback: DigestFallback,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::TIMEOUT_MS,
            batch_size: defaults::BATCH_SIZE,
            detail_batch_size: defaults::DETAIL_BATCH_SIZE,
            sample_size: defaults::SAMPLE_SIZE,
            cache_ttl_secs: defaults::CACHE_TTL_SECS,
            light_refresh_secs: defaults::LIGHT_REFRESH_SECS,
            full_refresh_secs: defaults::FULL_REFRESH_SECS,
            digest_fallback: DigestFallback::default(),
        }
    }
}

impl FetchConfig {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            timeout: Duration::from_millis(self.timeout_ms),
            digest_fallback: self.digest_fallback,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            batch_size: self.batch_size,
            detail_batch_size: self.detail_batch_size,
            sample_size: self.sample_size,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    pub fn refresh_intervals(&self) -> RefreshIntervals {
        RefreshIntervals {
            light: Duration::from_secs(self.light_refresh_secs),
            full: Duration::from_secs(self.full_refresh_secs),
        }
    }
}

/// Entry of a sources JSON document
#[derive(Debug, Clone, Deserialize)]
struct SourceEntry {
    path: String,
    #[serde(default)]
    host: String,
}

impl Config {
    /// `$XDG_CONFIG_HOME/containerhub/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("containerhub").join("config.toml"))
    }

    /// Load `path`, which must exist, or the default location when it is
    /// present. With neither, the built-in defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Config::default()),
            },
        };

        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.resolve_relative_paths(path.parent());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Referenced files are relative to the config file's directory.
    fn resolve_relative_paths(&mut self, base: Option<&Path>) {
        let Some(base) = base else { return };
        for path in [
            &mut self.sources_file,
            &mut self.status_codes_file,
            &mut self.cache_path,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Every configured source with credentials attached: inline ones
    /// first, else whatever `keychain` holds for the source host.
    pub fn sources(&self, keychain: &dyn Keychain) -> Result<Vec<Source>> {
        let mut merged: BTreeMap<String, SourceConfig> = BTreeMap::new();

        if let Some(file) = &self.sources_file {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read sources file {}", file.display()))?;
            let entries: BTreeMap<String, SourceEntry> = serde_json::from_str(&content)
                .with_context(|| format!("Invalid sources file {}", file.display()))?;
            for (name, entry) in entries {
                merged.insert(
                    name,
                    SourceConfig {
                        path: entry.path,
                        host: entry.host,
                        kind: None,
                        username: None,
                        password: None,
                        token: None,
                    },
                );
            }
        }
        merged.extend(self.sources.clone());

        Ok(merged
            .into_iter()
            .map(|(name, config)| build_source(name, config, keychain))
            .collect())
    }

    /// Status explanations from `status_codes_file`, or the built-in ones.
    pub fn status_codes(&self) -> Result<StatusCodes> {
        let Some(file) = &self.status_codes_file else {
            return Ok(default_status_codes());
        };
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read status codes file {}", file.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid status codes file {}", file.display()))
    }

    pub fn snapshot_file(&self) -> Option<SnapshotFile> {
        self.cache_path
            .clone()
            .or_else(SnapshotFile::default_path)
            .map(SnapshotFile::new)
    }
}

fn build_source(name: String, config: SourceConfig, keychain: &dyn Keychain) -> Source {
    let mut source = Source::new(name, config.path, config.host);
    if let Some(kind) = config.kind {
        source.kind = kind;
    }
    source.username = config.username.clone();

    let inline = match (config.token, config.username, config.password) {
        (Some(token), _, _) => Some(AuthConfig::bearer(token)),
        (None, Some(username), Some(password)) => Some(AuthConfig::basic(username, password)),
        _ => None,
    };
    let credentials = match inline {
        Some(credentials) => Some(credentials),
        None => {
            let host = registry_host(&source);
            match keychain.resolve(&host) {
                Ok(auth) if !auth.is_anonymous() => {
                    debug!("Using stored credentials for {}", host);
                    Some(auth)
                }
                Ok(_) => None,
                Err(e) => {
                    warn!("Could not look up credentials for {}: {}", host, e);
                    None
                }
            }
        }
    };

    match credentials {
        Some(credentials) => source.with_credentials(credentials),
        None => source,
    }
}

/// `host[:port]` of a source, as it appears in a Docker config
fn registry_host(source: &Source) -> String {
    if !source.host.is_empty() {
        return source.host.clone();
    }
    let base = source.base_url();
    let without_scheme = base.split_once("://").map(|(_, rest)| rest).unwrap_or(base);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}
