//! ghcr.io sources, reached through a proxy exposing the GitHub packages
//! API under `{base}/github`. Tags and manifests use the plain v2 API.

use hyper::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{decode, status_of, RegistryClient, Repository, SourceStatus, Tag};
use crate::error::{RegistryError, Result};

#[derive(Debug, Deserialize)]
struct Package {
    name: String,
    owner: PackageOwner,
}

#[derive(Debug, Deserialize)]
struct PackageOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PackageVersion {
    id: u64,
    #[serde(default)]
    metadata: Option<VersionMetadata>,
}

#[derive(Debug, Deserialize)]
struct VersionMetadata {
    #[serde(default)]
    container: Option<ContainerMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

impl PackageVersion {
    fn has_tag(&self, tag: &str) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.container.as_ref())
            .map(|c| c.tags.iter().any(|t| t == tag))
            .unwrap_or(false)
    }
}

fn username(client: &RegistryClient) -> Result<&str> {
    client
        .source()
        .username
        .as_deref()
        .ok_or_else(|| RegistryError::MissingUsername {
            registry: client.source().name.clone(),
        })
}

pub(super) async fn repositories(client: &RegistryClient) -> Result<Vec<Repository>> {
    let username = username(client)?;
    let url = client.url(&format!(
        "/github/users/{}/packages?package_type=container",
        username
    ));
    let response = client
        .fetch(Method::GET, &url, &[])
        .await
        .map_err(|failure| RegistryError::CatalogFetch {
            registry: client.source().name.clone(),
            failure,
        })?;
    let packages: Vec<Package> = decode(&response, "package list")?;

    Ok(packages
        .iter()
        .map(|p| {
            Repository::from_full_name(
                &client.source().name,
                &format!("{}/{}", p.owner.login, p.name),
            )
        })
        .collect())
}

pub(super) async fn ping(client: &RegistryClient) -> SourceStatus {
    let username = match username(client) {
        Ok(username) => username,
        Err(e) => {
            warn!("{}", e);
            return SourceStatus::Unknown;
        }
    };
    let url = client.url(&format!(
        "/github/users/{}/packages?package_type=container&per_page=1",
        username
    ));
    status_of(client.execute(Method::GET, &url, &[]).await)
}

/// Package name of a repository: everything after the owner segment.
fn package_name(repository: &Repository) -> String {
    let full_name = repository.full_name();
    match full_name.split_once('/') {
        Some((_, package)) if !package.is_empty() => package.to_string(),
        _ => full_name,
    }
}

/// Delete the package version carrying `tag`.
pub(super) async fn delete_tag(client: &RegistryClient, tag: &Tag) -> Result<bool> {
    let package = urlencoding::encode(&package_name(&tag.repository)).into_owned();
    let versions_url = client.url(&format!(
        "/github/user/packages/container/{}/versions?per_page=100",
        package
    ));
    let response = client
        .fetch(Method::GET, &versions_url, &[])
        .await
        .map_err(|failure| RegistryError::Request {
            url: versions_url.clone(),
            failure,
        })?;
    let versions: Vec<PackageVersion> = decode(&response, "package versions")?;

    let version = versions
        .iter()
        .find(|v| v.has_tag(&tag.name))
        .ok_or_else(|| RegistryError::VersionNotFound {
            package: package.clone(),
            tag: tag.name.clone(),
        })?;
    debug!("Tag {} is package version {}", tag.name, version.id);

    let delete_url = client.url(&format!(
        "/github/user/packages/container/{}/versions/{}",
        package, version.id
    ));
    let response = client
        .execute(Method::DELETE, &delete_url, &[])
        .await
        .map_err(|failure| RegistryError::Request {
            url: delete_url.clone(),
            failure,
        })?;

    Ok(response.is_success() || response.status == 404)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_drops_owner() {
        let repo = Repository::from_full_name("ghcr", "octocat/tools/cli");
        assert_eq!(package_name(&repo), "tools/cli");

        let bare = Repository::from_full_name("ghcr", "standalone");
        assert_eq!(package_name(&bare), "standalone");
    }

    #[test]
    fn test_version_tag_lookup() {
        let versions: Vec<PackageVersion> = serde_json::from_str(
            r#"[
                {"id": 1, "metadata": {"container": {"tags": ["v1", "latest"]}}},
                {"id": 2, "metadata": {"container": {"tags": []}}},
                {"id": 3}
            ]"#,
        )
        .unwrap();
        assert!(versions[0].has_tag("latest"));
        assert!(!versions[1].has_tag("latest"));
        assert!(!versions[2].has_tag("v1"));
    }
}
