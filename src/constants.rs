/// Manifest and blob media types understood by the registry client
pub mod media_type {
    /// Docker image manifest, schema 2
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list (multi-platform)
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// OCI image manifest
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index (multi-platform)
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

    /// Fallback media type for config blobs that do not declare one
    pub const JSON: &str = "application/json";

    /// Fallback media type for layers that do not declare one
    pub const OCTET_STREAM: &str = "application/octet-stream";

    /// `Accept` header value negotiating every supported manifest type
    pub const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, application/vnd.docker.distribution.manifest.list.v2+json, application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.manifest.v1+json";
}

/// Registry HTTP headers
pub mod header {
    pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";
}

/// Annotation marking buildkit attestation manifests inside an index
pub mod annotation {
    pub const REFERENCE_TYPE: &str = "vnd.docker.reference.type";
    pub const ATTESTATION_MANIFEST: &str = "attestation-manifest";
}

/// Platform used when neither the config blob nor the index says otherwise
pub mod platform {
    pub const DEFAULT_ARCHITECTURE: &str = "amd64";
    pub const DEFAULT_OS: &str = "linux";
}

/// Fetch and refresh defaults
pub mod defaults {
    /// Per-request timeout in milliseconds
    pub const TIMEOUT_MS: u64 = 3000;

    /// Repositories per wave during catalog and tag fetching
    pub const BATCH_SIZE: usize = 10;

    /// Tags per wave during a repository detail fetch
    pub const DETAIL_BATCH_SIZE: usize = 5;

    /// Tags sampled per repository when computing aggregate metadata
    pub const SAMPLE_SIZE: usize = 2;

    /// Age under which a full refresh or detail fetch is served from cache
    pub const CACHE_TTL_SECS: u64 = 30;

    /// Light (catalog-only) refresh period
    pub const LIGHT_REFRESH_SECS: u64 = 30;

    /// Full refresh period
    pub const FULL_REFRESH_SECS: u64 = 120;

    /// Deepest chain of nested indexes followed when resolving images
    pub const MAX_INDEX_DEPTH: usize = 8;

    /// File name of the persisted store snapshot
    pub const SNAPSHOT_FILE: &str = "repository-store.json";
}
