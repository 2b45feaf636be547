//! Pure snapshot transitions: aggregation after a fetch and cache patches
//! after a successful delete.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::snapshot::{RepositoryDetail, RepositoryMeta, Snapshot, TagSummary};
use crate::registry::{repository_key, Repository};

/// A confirmed change on the registry side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    TagDeleted {
        source: String,
        repository: String,
        tag: String,
    },
    RepositoryDeleted {
        source: String,
        repository: String,
    },
}

impl Mutation {
    pub fn tag_deleted(repository: &Repository, tag: &str) -> Self {
        Mutation::TagDeleted {
            source: repository.source.clone(),
            repository: repository.full_name(),
            tag: tag.to_string(),
        }
    }

    pub fn repository_deleted(repository: &Repository) -> Self {
        Mutation::RepositoryDeleted {
            source: repository.source.clone(),
            repository: repository.full_name(),
        }
    }
}

/// The snapshot after `mutation`. `prior` is left untouched.
pub fn apply(prior: &Snapshot, mutation: &Mutation) -> Snapshot {
    let mut next = prior.clone();

    match mutation {
        Mutation::TagDeleted {
            source,
            repository,
            tag,
        } => {
            let key = repository_key(source, repository);
            let remaining = next.repository_details.get_mut(&key).map(|detail| {
                detail.tags.retain(|t| &t.name != tag);
                detail.meta.tag_count = detail.tags.len();
                detail.tags.len()
            });

            if let Some(meta) = next.repository_metas.iter_mut().find(|m| m.key() == key) {
                meta.tag_count = remaining.unwrap_or_else(|| meta.tag_count.saturating_sub(1));
            }
        }
        Mutation::RepositoryDeleted { source, repository } => {
            let key = repository_key(source, repository);
            next.repository_metas.retain(|m| m.key() != key);
            next.repository_details.remove(&key);
            next.available_architectures = Snapshot::collect_architectures(&next.repository_metas);
        }
    }

    next
}

/// Aggregate a repository from its sampled tags. Size is summed over the
/// sample; `last_updated` is the newest sampled tag.
pub fn aggregate_meta(
    repository: &Repository,
    tag_count: usize,
    sampled: &[TagSummary],
    fetched_at: DateTime<Utc>,
) -> RepositoryMeta {
    let mut architectures: Vec<String> = Vec::new();
    for info in sampled.iter().flat_map(|t| t.architectures.iter()) {
        if !architectures.contains(&info.architecture) {
            architectures.push(info.architecture.clone());
        }
    }

    RepositoryMeta {
        source: repository.source.clone(),
        namespace: repository.namespace.clone(),
        name: repository.name.clone(),
        tag_count,
        total_size: sampled.iter().map(|t| t.size).sum(),
        architectures,
        last_updated: sampled.iter().filter_map(|t| t.last_updated).max(),
        fetched_at,
    }
}

/// Detail view of a repository from every one of its tags.
pub fn aggregate_detail(
    repository: &Repository,
    tags: Vec<TagSummary>,
    fetched_at: DateTime<Utc>,
) -> RepositoryDetail {
    RepositoryDetail {
        meta: aggregate_meta(repository, tags.len(), &tags, fetched_at),
        tags,
    }
}

/// Fresh catalog counts merged with what the last full refresh learned.
///
/// Known repositories keep their size, architectures and timestamp; new
/// ones start empty; ones missing from the catalog are dropped.
pub fn merge_catalog(
    previous: &[RepositoryMeta],
    catalog: &[(Repository, usize)],
    fetched_at: DateTime<Utc>,
) -> Vec<RepositoryMeta> {
    let known: HashMap<String, &RepositoryMeta> =
        previous.iter().map(|m| (m.key(), m)).collect();

    catalog
        .iter()
        .map(|(repository, tag_count)| match known.get(&repository.key()) {
            Some(meta) if *tag_count > 0 => RepositoryMeta {
                tag_count: *tag_count,
                fetched_at,
                ..(*meta).clone()
            },
            _ => RepositoryMeta {
                fetched_at,
                ..RepositoryMeta::empty(repository, *tag_count)
            },
        })
        .collect()
}
