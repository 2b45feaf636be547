use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;
use crate::format::{format_bytes, split_repository_name};
use crate::manifest::{self, ConfigDocument, History, ManifestDocument, Platform, RootFs, RuntimeConfig};

/// Which API flavour a source speaks for listing and deleting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    #[default]
    Standard,
    /// ghcr.io behind a proxy exposing the GitHub packages API under `/github`
    GitHub,
}

impl RegistryKind {
    pub fn detect(path: &str, host: &str) -> Self {
        if path.to_lowercase().contains("ghcr.io") || host.to_lowercase().contains("ghcr.io") {
            RegistryKind::GitHub
        } else {
            RegistryKind::Standard
        }
    }
}

/// Last observed health of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "code", rename_all = "snake_case")]
pub enum SourceStatus {
    #[default]
    Unknown,
    /// The registry answered, with this HTTP status
    Reachable(u16),
    TimedOut,
    Unreachable,
}

impl SourceStatus {
    /// Integer code as older dashboards displayed it (408 timeout, 0 unreachable).
    pub fn code(&self) -> Option<u16> {
        match self {
            SourceStatus::Unknown => None,
            SourceStatus::Reachable(code) => Some(*code),
            SourceStatus::TimedOut => Some(408),
            SourceStatus::Unreachable => Some(0),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, SourceStatus::Reachable(code) if (200..300).contains(code))
    }
}

/// A configured registry endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    /// Base URL, e.g. `https://registry.example.com`
    pub path: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub kind: RegistryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip)]
    pub credentials: Option<AuthConfig>,
    #[serde(default)]
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl Source {
    pub fn new(name: impl Into<String>, path: impl Into<String>, host: impl Into<String>) -> Self {
        let path = path.into();
        let host = host.into();
        Self {
            name: name.into(),
            kind: RegistryKind::detect(&path, &host),
            path,
            host,
            username: None,
            credentials: None,
            status: SourceStatus::Unknown,
            last_checked: None,
        }
    }

    pub fn with_credentials(mut self, credentials: AuthConfig) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// A copy carrying a fresh health observation.
    pub fn with_status(&self, status: SourceStatus) -> Self {
        Self {
            status,
            last_checked: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Base URL without a trailing slash or `/v2` suffix
    pub fn base_url(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        trimmed.strip_suffix("/v2").unwrap_or(trimmed)
    }

    pub fn display_host(&self) -> &str {
        if self.host.is_empty() {
            self.base_url()
        } else {
            &self.host
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl Repository {
    pub fn new(source: impl Into<String>, namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Build from a catalog entry, splitting on the last `/`.
    pub fn from_full_name(source: impl Into<String>, full_name: &str) -> Self {
        let (namespace, name) = split_repository_name(full_name);
        Self::new(source, namespace, name)
    }

    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}/{}", namespace, self.name),
            None => self.name.clone(),
        }
    }

    /// Cache key, unique across sources
    pub fn key(&self) -> String {
        repository_key(&self.source, &self.full_name())
    }
}

pub fn repository_key(source: &str, full_name: &str) -> String {
    format!("{}:{}", source, full_name)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub repository: Repository,
    pub name: String,
}

impl Tag {
    pub fn new(repository: Repository, name: impl Into<String>) -> Self {
        Self {
            repository,
            name: name.into(),
        }
    }
}

/// How a manifest's digest was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestOrigin {
    /// `Docker-Content-Digest` response header
    Header,
    /// The manifest was requested by digest
    Reference,
    /// SHA-256 of the response body as received
    Computed,
    /// The tag name standing in for a digest; not content addressed
    TagName,
}

impl DigestOrigin {
    pub fn is_content_addressed(&self) -> bool {
        !matches!(self, DigestOrigin::TagName)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub repository: Repository,
    /// Tag or digest the manifest was requested by
    pub reference: String,
    pub digest: String,
    pub digest_origin: DigestOrigin,
    pub media_type: String,
    pub document: ManifestDocument,
    /// Platform declared for this manifest by its parent index, if any
    pub platform_hint: Option<Platform>,
}

impl Manifest {
    pub fn is_multi_platform(&self) -> bool {
        manifest::is_multi_platform_type(&self.media_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub repository: Repository,
    pub digest: String,
    pub size: u64,
    pub media_type: String,
}

impl Blob {
    pub fn is_json(&self) -> bool {
        self.media_type.contains("json")
    }

    pub fn formatted_size(&self) -> String {
        format_bytes(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub digest: String,
    pub size: u64,
    pub media_type: String,
}

/// Reference to an image's config blob plus what was learned from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageConfig {
    pub blob: Blob,
    pub architecture: String,
    pub os: String,
    pub variant: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

/// The fully fetched config blob
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBlob {
    pub digest: String,
    pub size: u64,
    pub media_type: String,
    pub architecture: String,
    pub os: String,
    pub variant: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub config: RuntimeConfig,
    pub history: Vec<History>,
    pub rootfs: Option<RootFs>,
    pub raw: ConfigDocument,
}

impl ConfigBlob {
    pub fn formatted_size(&self) -> String {
        format_bytes(self.size)
    }
}

/// One platform's concrete image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub architecture: String,
    pub os: String,
    pub variant: Option<String>,
    pub digest: String,
    /// Config size plus every layer size
    pub size: u64,
    pub config: ImageConfig,
    pub layers: Vec<LayerInfo>,
}

impl Image {
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.config.created
    }

    pub fn formatted_size(&self) -> String {
        format_bytes(self.size)
    }

    pub fn architecture_info(&self) -> ArchitectureInfo {
        ArchitectureInfo {
            architecture: self.architecture.clone(),
            os: self.os.clone(),
            variant: self.variant.clone(),
            digest: self.digest.clone(),
            size: self.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureInfo {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub digest: String,
    pub size: u64,
}

impl ArchitectureInfo {
    /// `os/arch[/variant]`
    pub fn platform(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}/{}/{}", self.os, self.architecture, variant),
            None => format!("{}/{}", self.os, self.architecture),
        }
    }
}
