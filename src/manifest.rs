use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::media_type;

/// A manifest body as returned by `GET /v2/{name}/manifests/{ref}`.
///
/// One shape covers both single-platform manifests (`config` + `layers`)
/// and indexes (`manifests`); which fields are present depends on the
/// media type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: i32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<Descriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests: Option<Vec<IndexEntry>>,
}

/// Content descriptor for a config blob or layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub digest: String,
}

/// Entry of an index pointing at a platform-specific manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// Platform information for a manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Image configuration blob (`application/vnd.oci.image.config.v1+json`
/// or the Docker equivalent). Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RuntimeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<History>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs: Option<RootFs>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(rename = "ExposedPorts", default, skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<HashMap<String, serde_json::Value>>,
    #[serde(rename = "Env", default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(rename = "Entrypoint", default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(rename = "Cmd", default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(rename = "WorkingDir", default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(rename = "Labels", default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(rename = "StopSignal", default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
    #[serde(rename = "User", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub empty_layer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(default)]
    pub diff_ids: Vec<String>,
}

/// `{ "repositories": [...] }` from the catalog endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub repositories: Option<Vec<String>>,
}

/// `{ "name": ..., "tags": [...] }` from the tag list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagListResponse {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

pub fn is_multi_platform_type(media_type: &str) -> bool {
    media_type == media_type::DOCKER_MANIFEST_LIST || media_type == media_type::OCI_INDEX
}

pub fn is_single_platform_type(media_type: &str) -> bool {
    media_type == media_type::DOCKER_MANIFEST || media_type == media_type::OCI_MANIFEST
}

impl ManifestDocument {
    /// Size of a single-platform image: config plus every layer.
    pub fn image_size(&self) -> u64 {
        let config = self.config.as_ref().and_then(|c| c.size).unwrap_or(0);
        let layers: u64 = self
            .layers
            .iter()
            .flatten()
            .map(|layer| layer.size.unwrap_or(0))
            .sum();
        config + layers
    }

    /// Index entries that describe runnable images, leaving out attestations.
    pub fn image_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.manifests
            .iter()
            .flatten()
            .filter(|entry| !entry.is_attestation())
    }
}

impl IndexEntry {
    pub fn is_attestation(&self) -> bool {
        use crate::constants::annotation;
        self.annotations
            .as_ref()
            .and_then(|a| a.get(annotation::REFERENCE_TYPE))
            .map(|v| v == annotation::ATTESTATION_MANIFEST)
            .unwrap_or(false)
    }
}

impl ConfigDocument {
    /// Creation time, falling back to the first history entry.
    pub fn created_at(&self) -> Option<&str> {
        self.created.as_deref().or_else(|| {
            self.history
                .as_ref()
                .and_then(|h| h.first())
                .and_then(|h| h.created.as_deref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_platform_types() {
        assert!(is_multi_platform_type(media_type::DOCKER_MANIFEST_LIST));
        assert!(is_multi_platform_type(media_type::OCI_INDEX));
        assert!(!is_multi_platform_type(media_type::DOCKER_MANIFEST));
        assert!(!is_multi_platform_type(media_type::OCI_MANIFEST));
        assert!(!is_multi_platform_type("application/vnd.docker.distribution.manifest.v1+json"));
    }

    #[test]
    fn test_image_size_sums_config_and_layers() {
        let doc: ManifestDocument = serde_json::from_str(
            r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "size": 1469, "digest": "sha256:c0"},
                "layers": [
                    {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "size": 3370706, "digest": "sha256:l1"},
                    {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "size": 512, "digest": "sha256:l2"},
                    {"digest": "sha256:l3"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.image_size(), 1469 + 3370706 + 512);
    }

    #[test]
    fn test_image_size_without_layers() {
        let doc = ManifestDocument {
            config: Some(Descriptor {
                media_type: None,
                size: Some(42),
                digest: "sha256:c".to_string(),
            }),
            layers: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(doc.image_size(), 42);
    }

    #[test]
    fn test_image_entries_skip_attestations() {
        let doc: ManifestDocument = serde_json::from_str(
            r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.index.v1+json",
                "manifests": [
                    {"digest": "sha256:a", "platform": {"architecture": "amd64", "os": "linux"}},
                    {"digest": "sha256:b", "platform": {"architecture": "unknown", "os": "unknown"},
                     "annotations": {"vnd.docker.reference.type": "attestation-manifest"}}
                ]
            }"#,
        )
        .unwrap();
        let digests: Vec<&str> = doc.image_entries().map(|e| e.digest.as_str()).collect();
        assert_eq!(digests, vec!["sha256:a"]);
    }

    #[test]
    fn test_created_falls_back_to_history() {
        let config: ConfigDocument = serde_json::from_str(
            r#"{"history": [{"created": "2024-01-02T03:04:05Z", "created_by": "RUN x"}]}"#,
        )
        .unwrap();
        assert_eq!(config.created_at(), Some("2024-01-02T03:04:05Z"));
    }
}
