use futures::future::{join_all, BoxFuture};
use hyper::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::constants::{defaults, header, media_type, platform};
use crate::error::{HttpFailure, RegistryError, Result};
use crate::format::parse_timestamp;
use crate::manifest::{self, CatalogResponse, ConfigDocument, ManifestDocument, Platform, TagListResponse};

mod github;
mod model;
pub mod transport;

pub use model::{
    repository_key, ArchitectureInfo, Blob, ConfigBlob, DigestOrigin, Image, ImageConfig,
    LayerInfo, Manifest, RegistryKind, Repository, Source, SourceStatus, Tag,
};
pub use transport::{HttpRequest, HttpResponse, HyperTransport, Transport, TransportError};


/// What to use as a manifest digest when the registry does not send
/// `Docker-Content-Digest`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestFallback {
    /// SHA-256 of the manifest bytes as received
    #[default]
    ComputeSha256,
    /// The tag name itself. Not a content digest; deletes by it usually fail.
    TagName,
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout: Duration,
    pub digest_fallback: DigestFallback,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(defaults::TIMEOUT_MS),
            digest_fallback: DigestFallback::default(),
        }
    }
}

/// Docker Registry HTTP API v2 client bound to one source
#[derive(Clone)]
pub struct RegistryClient {
    source: Source,
    transport: Arc<dyn Transport>,
    settings: ClientSettings,
    authorization: Option<String>,
}

impl RegistryClient {
    pub fn new(source: Source, transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
        let authorization = match source.credentials.as_ref().map(|c| c.to_authorization_header()) {
            Some(Ok(header)) => header,
            Some(Err(e)) => {
                warn!("Ignoring credentials for source {}: {}", source.name, e);
                None
            }
            None => None,
        };

        Self {
            source,
            transport,
            settings,
            authorization,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.source.base_url(), path)
    }

    fn manifest_url(&self, repository: &Repository, reference: &str) -> String {
        self.url(&format!("/v2/{}/manifests/{}", repository.full_name(), reference))
    }

    fn blob_url(&self, blob: &Blob) -> String {
        self.url(&format!("/v2/{}/blobs/{}", blob.repository.full_name(), blob.digest))
    }

    /// Send one request under the configured timeout. Any HTTP status is a
    /// success here; only "no response" is an error.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
    ) -> std::result::Result<HttpResponse, HttpFailure> {
        let mut request = HttpRequest::new(method, url);
        for (name, value) in headers {
            request = request.header(name, *value);
        }
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization.as_str());
        }

        debug!("{} {}", request.method, url);
        match tokio::time::timeout(self.settings.timeout, self.transport.send(request)).await {
            Err(_) => {
                debug!("Request to {} timed out after {:?}", url, self.settings.timeout);
                Err(HttpFailure::TimedOut)
            }
            Ok(Err(e)) => Err(HttpFailure::Network(e.to_string())),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// Like [`execute`](Self::execute) but non-2xx statuses become failures.
    async fn fetch(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
    ) -> std::result::Result<HttpResponse, HttpFailure> {
        let response = self.execute(method, url, headers).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(HttpFailure::from_status(response.status))
        }
    }

    /// List every repository in the source's catalog.
    pub async fn repositories(&self) -> Result<Vec<Repository>> {
        if self.source.kind == RegistryKind::GitHub {
            return github::repositories(self).await;
        }

        let url = self.url("/v2/_catalog");
        let response = self
            .fetch(Method::GET, &url, &[])
            .await
            .map_err(|failure| RegistryError::CatalogFetch {
                registry: self.source.name.clone(),
                failure,
            })?;
        let catalog: CatalogResponse = decode(&response, "catalog")?;

        Ok(catalog
            .repositories
            .unwrap_or_default()
            .iter()
            .map(|full_name| Repository::from_full_name(&self.source.name, full_name))
            .collect())
    }

    pub async fn repository(&self, name: &str, namespace: Option<&str>) -> Result<Option<Repository>> {
        let repositories = self.repositories().await?;
        Ok(repositories
            .into_iter()
            .find(|r| r.name == name && r.namespace.as_deref() == namespace))
    }

    /// Tags of a repository in listing order. A repository the registry
    /// does not know has no tags.
    pub async fn tags(&self, repository: &Repository) -> Result<Vec<Tag>> {
        let url = self.url(&format!("/v2/{}/tags/list", repository.full_name()));
        let response = match self.fetch(Method::GET, &url, &[]).await {
            Ok(response) => response,
            Err(HttpFailure::NotFound) => return Ok(Vec::new()),
            Err(failure) => {
                return Err(RegistryError::TagsFetch {
                    repository: repository.full_name(),
                    failure,
                })
            }
        };
        let list: TagListResponse = decode(&response, "tag list")?;

        Ok(list
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|name| Tag::new(repository.clone(), name))
            .collect())
    }

    pub async fn tag(&self, repository: &Repository, name: &str) -> Result<Option<Tag>> {
        let tags = self.tags(repository).await?;
        Ok(tags.into_iter().find(|t| t.name == name))
    }

    pub async fn manifest(&self, tag: &Tag) -> Result<Manifest> {
        self.fetch_manifest(&tag.repository, &tag.name, media_type::MANIFEST_ACCEPT, None)
            .await
    }

    async fn fetch_manifest(
        &self,
        repository: &Repository,
        reference: &str,
        accept: &str,
        platform_hint: Option<Platform>,
    ) -> Result<Manifest> {
        let url = self.manifest_url(repository, reference);
        let response = self
            .fetch(Method::GET, &url, &[("Accept", accept)])
            .await
            .map_err(|failure| RegistryError::ManifestFetch {
                repository: repository.full_name(),
                reference: reference.to_string(),
                failure,
            })?;

        let document: ManifestDocument = decode(&response, "manifest")?;
        let media_type = document
            .media_type
            .clone()
            .or_else(|| {
                response
                    .header("content-type")
                    .and_then(|v| v.split(';').next())
                    .map(|v| v.trim().to_string())
            })
            .unwrap_or_default();

        let (digest, digest_origin) = match response.header(header::DOCKER_CONTENT_DIGEST) {
            Some(digest) => (digest.to_string(), DigestOrigin::Header),
            None => self.fallback_digest(reference, &response),
        };

        Ok(Manifest {
            repository: repository.clone(),
            reference: reference.to_string(),
            digest,
            digest_origin,
            media_type,
            document,
            platform_hint,
        })
    }

    fn fallback_digest(&self, reference: &str, response: &HttpResponse) -> (String, DigestOrigin) {
        if reference.starts_with("sha256:") {
            return (reference.to_string(), DigestOrigin::Reference);
        }
        match self.settings.digest_fallback {
            DigestFallback::ComputeSha256 => {
                let body = response.body.to_vec();
                (format!("sha256:{}", sha256::digest(&body)), DigestOrigin::Computed)
            }
            DigestFallback::TagName => {
                debug!("No digest header for {}, using the tag name", reference);
                (reference.to_string(), DigestOrigin::TagName)
            }
        }
    }

    /// True when the registry answers 304 to a conditional HEAD, i.e. the
    /// tag still points at `known_digest`.
    pub async fn is_up_to_date(&self, tag: &Tag, known_digest: Option<&str>) -> bool {
        let Some(known_digest) = known_digest else {
            return false;
        };

        let url = self.manifest_url(&tag.repository, &tag.name);
        let headers = [
            ("If-None-Match", known_digest),
            ("Accept", media_type::MANIFEST_ACCEPT),
        ];
        match self.execute(Method::HEAD, &url, &headers).await {
            Ok(response) => response.status == 304,
            Err(_) => false,
        }
    }

    /// Platform-specific manifests referenced by an index, attestations
    /// excluded. Children that fail to load are skipped.
    pub async fn child_manifests(&self, manifest: &Manifest) -> Vec<Manifest> {
        if !manifest.is_multi_platform() {
            return Vec::new();
        }

        let accept = child_accept(&manifest.media_type);
        let fetches = manifest.document.image_entries().map(|entry| async move {
            match self
                .fetch_manifest(&manifest.repository, &entry.digest, accept, entry.platform.clone())
                .await
            {
                Ok(child) => Some(child),
                Err(e) => {
                    warn!("Failed to fetch child manifest {}: {}", entry.digest, e);
                    None
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    /// One image per platform. Single-platform manifests give exactly one;
    /// indexes are followed (nested ones too); other media types give none.
    pub async fn images(&self, manifest: &Manifest) -> Vec<Image> {
        self.images_at_depth(manifest, 0).await
    }

    fn images_at_depth<'a>(&'a self, manifest: &'a Manifest, depth: usize) -> BoxFuture<'a, Vec<Image>> {
        Box::pin(async move {
            if !manifest.is_multi_platform() {
                return self.single_image(manifest).await.into_iter().collect();
            }
            if depth >= defaults::MAX_INDEX_DEPTH {
                warn!(
                    "Index nesting deeper than {} at {}, giving up",
                    defaults::MAX_INDEX_DEPTH,
                    manifest.digest
                );
                return Vec::new();
            }

            let children = self.child_manifests(manifest).await;
            let nested = join_all(
                children
                    .iter()
                    .map(|child| self.images_at_depth(child, depth + 1)),
            )
            .await;
            nested.into_iter().flatten().collect()
        })
    }

    async fn single_image(&self, manifest: &Manifest) -> Option<Image> {
        if !manifest::is_single_platform_type(&manifest.media_type) {
            return None;
        }
        let config = manifest.document.config.as_ref()?;
        let layers = manifest.document.layers.as_ref()?;

        let blob = Blob {
            repository: manifest.repository.clone(),
            digest: config.digest.clone(),
            size: config.size.unwrap_or(0),
            media_type: config
                .media_type
                .clone()
                .unwrap_or_else(|| media_type::JSON.to_string()),
        };

        let info = match self.blob_json::<ConfigDocument>(&blob).await {
            Ok(document) => Some(document),
            Err(e) => {
                warn!("Failed to fetch config {}: {}", blob.digest, e);
                None
            }
        };
        let hint = manifest.platform_hint.as_ref();

        let architecture = first_present(
            info.as_ref().and_then(|c| c.architecture.clone()),
            hint.map(|p| p.architecture.clone()),
        )
        .unwrap_or_else(|| platform::DEFAULT_ARCHITECTURE.to_string());
        let os = first_present(
            info.as_ref().and_then(|c| c.os.clone()),
            hint.map(|p| p.os.clone()),
        )
        .unwrap_or_else(|| platform::DEFAULT_OS.to_string());
        let variant = first_present(
            info.as_ref().and_then(|c| c.variant.clone()),
            hint.and_then(|p| p.variant.clone()),
        );
        let created = info
            .as_ref()
            .and_then(|c| c.created_at())
            .and_then(parse_timestamp);

        let layers = layers
            .iter()
            .map(|layer| LayerInfo {
                digest: layer.digest.clone(),
                size: layer.size.unwrap_or(0),
                media_type: layer
                    .media_type
                    .clone()
                    .unwrap_or_else(|| media_type::OCTET_STREAM.to_string()),
            })
            .collect();

        Some(Image {
            architecture: architecture.clone(),
            os: os.clone(),
            variant: variant.clone(),
            digest: manifest.digest.clone(),
            size: manifest.document.image_size(),
            config: ImageConfig {
                blob,
                architecture,
                os,
                variant,
                created,
            },
            layers,
        })
    }

    /// Fetch and parse an image's config blob.
    pub async fn config_blob(&self, config: &ImageConfig) -> Result<ConfigBlob> {
        let document: ConfigDocument = self.blob_json(&config.blob).await?;

        Ok(ConfigBlob {
            digest: config.blob.digest.clone(),
            size: config.blob.size,
            media_type: config.blob.media_type.clone(),
            architecture: document
                .architecture
                .clone()
                .unwrap_or_else(|| config.architecture.clone()),
            os: document.os.clone().unwrap_or_else(|| config.os.clone()),
            variant: document.variant.clone().or_else(|| config.variant.clone()),
            created: document
                .created_at()
                .and_then(parse_timestamp)
                .or(config.created),
            config: document.config.clone().unwrap_or_default(),
            history: document.history.clone().unwrap_or_default(),
            rootfs: document.rootfs.clone(),
            raw: document,
        })
    }

    pub async fn blob_exists(&self, blob: &Blob) -> bool {
        let url = self.blob_url(blob);
        match self.execute(Method::HEAD, &url, &[]).await {
            Ok(response) => response.is_success(),
            Err(_) => false,
        }
    }

    pub async fn blob_data(&self, blob: &Blob) -> Result<hyper::body::Bytes> {
        let url = self.blob_url(blob);
        let response = self
            .fetch(Method::GET, &url, &[])
            .await
            .map_err(|failure| RegistryError::BlobFetch {
                digest: blob.digest.clone(),
                failure,
            })?;
        Ok(response.body)
    }

    pub async fn blob_json<T: DeserializeOwned>(&self, blob: &Blob) -> Result<T> {
        if !blob.is_json() {
            return Err(RegistryError::NotJson {
                digest: blob.digest.clone(),
                media_type: blob.media_type.clone(),
            });
        }
        let data = self.blob_data(blob).await?;
        serde_json::from_slice(&data).map_err(|source| RegistryError::Decode {
            what: format!("blob {}", blob.digest),
            source,
        })
    }

    /// Probe `GET /v2/`. Any HTTP answer, 401 included, means reachable.
    pub async fn ping(&self) -> SourceStatus {
        if self.source.kind == RegistryKind::GitHub {
            return github::ping(self).await;
        }

        let url = self.url("/v2/");
        status_of(self.execute(Method::GET, &url, &[]).await)
    }

    /// The source with its health refreshed.
    pub async fn probe(&self) -> Source {
        let status = self.ping().await;
        debug!("Source {} status: {:?}", self.source.name, status);
        self.source.with_status(status)
    }

    /// Delete the manifest a tag points at. A tag that no longer resolves
    /// counts as deleted.
    pub async fn delete_tag(&self, tag: &Tag) -> bool {
        let result = match self.source.kind {
            RegistryKind::GitHub => github::delete_tag(self, tag).await,
            RegistryKind::Standard => self.delete_manifest_of(tag).await,
        };

        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(
                    "Failed to delete {}:{}: {}",
                    tag.repository.full_name(),
                    tag.name,
                    e
                );
                false
            }
        }
    }

    async fn delete_manifest_of(&self, tag: &Tag) -> Result<bool> {
        let manifest = match self.manifest(tag).await {
            Ok(manifest) => manifest,
            Err(e) if e.is_not_found() => {
                debug!("{}:{} is already gone", tag.repository.full_name(), tag.name);
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        if !manifest.digest_origin.is_content_addressed() {
            warn!(
                "Deleting {}:{} by tag name; the registry did not report a digest",
                tag.repository.full_name(),
                tag.name
            );
        }

        let url = self.manifest_url(&tag.repository, &manifest.digest);
        let response = self
            .execute(Method::DELETE, &url, &[("Accept", manifest.media_type.as_str())])
            .await
            .map_err(|failure| RegistryError::Request {
                url: url.clone(),
                failure,
            })?;

        if response.is_success() || response.status == 404 {
            Ok(true)
        } else {
            warn!("DELETE {} answered {}", url, response.status);
            Ok(false)
        }
    }

    /// Delete every tag. Keeps going after a failure and reports whether
    /// all of them went.
    pub async fn delete_repository(&self, repository: &Repository) -> bool {
        let tags = match self.tags(repository).await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Failed to list tags of {}: {}", repository.full_name(), e);
                return false;
            }
        };

        let mut all_deleted = true;
        for tag in &tags {
            if !self.delete_tag(tag).await {
                all_deleted = false;
            }
        }
        all_deleted
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|source| RegistryError::Decode {
        what: what.to_string(),
        source,
    })
}

fn status_of(result: std::result::Result<HttpResponse, HttpFailure>) -> SourceStatus {
    match result {
        Ok(response) => SourceStatus::Reachable(response.status),
        Err(HttpFailure::TimedOut) => SourceStatus::TimedOut,
        Err(_) => SourceStatus::Unreachable,
    }
}

/// `Accept` for children of an index: the same family, index included so
/// nested indexes come back intact.
fn child_accept(parent_media_type: &str) -> &'static str {
    match parent_media_type {
        media_type::OCI_INDEX => {
            "application/vnd.oci.image.manifest.v1+json, application/vnd.oci.image.index.v1+json"
        }
        media_type::DOCKER_MANIFEST_LIST => {
            "application/vnd.docker.distribution.manifest.v2+json, application/vnd.docker.distribution.manifest.list.v2+json"
        }
        _ => media_type::MANIFEST_ACCEPT,
    }
}

fn first_present(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|v| !v.is_empty())
        .or_else(|| fallback.filter(|v| !v.is_empty()))
}
