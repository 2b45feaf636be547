//! Docker config lookup for source hosts

use super::{AuthConfig, DockerConfig};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Resolves credentials for a registry host
pub trait Keychain: Send + Sync {
    fn resolve(&self, host: &str) -> Result<AuthConfig>;
}

/// Keychain backed by the Docker CLI config file
pub struct DockerConfigKeychain {
    paths: Vec<PathBuf>,
    config: OnceLock<DockerConfig>,
}

impl DockerConfigKeychain {
    /// Look in the standard locations (`DOCKER_CONFIG`, `REGISTRY_AUTH_FILE`,
    /// `XDG_RUNTIME_DIR/containers/auth.json`, `~/.docker/config.json`).
    pub fn new() -> Self {
        Self::with_paths(Self::default_paths())
    }

    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            config: OnceLock::new(),
        }
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(docker_config) = std::env::var("DOCKER_CONFIG") {
            paths.push(PathBuf::from(docker_config).join("config.json"));
        }
        if let Ok(auth_file) = std::env::var("REGISTRY_AUTH_FILE") {
            paths.push(PathBuf::from(auth_file));
        }
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            paths.push(PathBuf::from(xdg_runtime).join("containers/auth.json"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".docker/config.json"));
        }

        paths
    }

    fn config(&self) -> &DockerConfig {
        self.config.get_or_init(|| {
            for path in &self.paths {
                if !path.exists() {
                    continue;
                }
                match Self::read(path) {
                    Ok(config) => {
                        debug!("Loaded Docker config from: {}", path.display());
                        return config;
                    }
                    Err(e) => warn!("Ignoring Docker config at {}: {:#}", path.display(), e),
                }
            }
            DockerConfig::default()
        })
    }

    fn read(path: &Path) -> Result<DockerConfig> {
        let content = std::fs::read_to_string(path).context("Failed to read file")?;
        serde_json::from_str(&content).context("Failed to parse JSON")
    }

    /// Keys a `docker login` may have stored credentials under for `host`
    pub(crate) fn host_variants(host: &str) -> Vec<String> {
        let host = host
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        if host == "docker.io" || host == "index.docker.io" || host == "registry-1.docker.io" {
            return vec![
                "https://index.docker.io/v1/".to_string(),
                "index.docker.io".to_string(),
                "docker.io".to_string(),
            ];
        }

        vec![
            host.to_string(),
            format!("https://{}", host),
            format!("http://{}", host),
            format!("https://{}/v2/", host),
        ]
    }
}

impl Default for DockerConfigKeychain {
    fn default() -> Self {
        Self::new()
    }
}

impl Keychain for DockerConfigKeychain {
    fn resolve(&self, host: &str) -> Result<AuthConfig> {
        let config = self.config();
        for variant in Self::host_variants(host) {
            if let Some(entry) = config.auths.get(&variant) {
                debug!("Found credentials for {} under {}", host, variant);
                return Ok(AuthConfig::from(entry));
            }
        }

        debug!("No credentials found for {}, using anonymous", host);
        Ok(AuthConfig::anonymous())
    }
}
