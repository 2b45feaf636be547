//! Fetch orchestration and cache store
//!
//! [`RepositoryStore`] drives one [`RegistryClient`] per configured source,
//! bounds concurrency with waves, aggregates per-repository metadata and
//! keeps the result in a [`Snapshot`] that is replaced whole on every
//! change and optionally mirrored to disk.

pub mod batch;
pub mod reducer;
pub mod scheduler;
pub mod snapshot;

pub use reducer::Mutation;
pub use scheduler::{RefreshIntervals, Scheduler, Visibility};
pub use snapshot::{
    default_status_codes, LoadingStage, RepositoryDetail, RepositoryMeta, Snapshot, SnapshotFile,
    Stage, StatusCodes, TagSummary,
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::constants::defaults;
use crate::format::split_repository_name;
use crate::registry::{
    repository_key, ClientSettings, RegistryClient, Repository, Source, Tag, Transport,
};
use batch::run_in_waves;


pub const NO_SOURCES: &str = "No sources available";
pub const NO_REACHABLE_REGISTRIES: &str = "No reachable registries";

/// Concurrency and caching knobs of the store
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Repositories per wave during a full or light refresh
    pub batch_size: usize,
    /// Tags per wave when loading one repository's detail
    pub detail_batch_size: usize,
    /// Leading tags whose manifests feed a repository's aggregates
    pub sample_size: usize,
    /// How long a full refresh or a detail fetch stays fresh
    pub cache_ttl: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            detail_batch_size: defaults::DETAIL_BATCH_SIZE,
            sample_size: defaults::SAMPLE_SIZE,
            cache_ttl: Duration::from_secs(defaults::CACHE_TTL_SECS),
        }
    }
}

/// Outcome of a bulk tag delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub requested: usize,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} tags deleted", self.deleted.len(), self.requested)
    }
}

struct CatalogEntry {
    client: usize,
    repository: Repository,
    tags: Vec<String>,
}

pub struct RepositoryStore {
    clients: Vec<RegistryClient>,
    settings: FetchSettings,
    state: Mutex<Snapshot>,
    progress: watch::Sender<LoadingStage>,
    error: Mutex<Option<String>>,
    file: Option<SnapshotFile>,
    revision: AtomicU64,
    /// Highest revision written to `file`
    persisted: Mutex<u64>,
}

impl RepositoryStore {
    pub fn new(
        sources: Vec<Source>,
        transport: Arc<dyn Transport>,
        client_settings: ClientSettings,
        settings: FetchSettings,
    ) -> Self {
        let clients = sources
            .iter()
            .map(|source| RegistryClient::new(source.clone(), transport.clone(), client_settings.clone()))
            .collect();
        let snapshot = Snapshot {
            sources,
            status_codes: default_status_codes(),
            ..Default::default()
        };

        Self {
            clients,
            settings,
            state: Mutex::new(snapshot),
            progress: watch::Sender::new(LoadingStage::new(Stage::Idle, 0, "Ready")),
            error: Mutex::new(None),
            file: None,
            revision: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    pub fn with_status_codes(mut self, status_codes: snapshot::StatusCodes) -> Self {
        self.state_mut().status_codes = status_codes;
        self
    }

    /// Mirror the snapshot to `file`, restoring whatever it already holds.
    /// Sources keep their configured definition; only their last known
    /// health is taken from the file.
    pub fn with_snapshot_file(mut self, file: SnapshotFile) -> Self {
        match file.load() {
            Ok(Some(saved)) => {
                info!(
                    "Restored {} repositories from {}",
                    saved.repository_metas.len(),
                    file.path().display()
                );
                let state = self.state_mut();
                let sources = state
                    .sources
                    .iter()
                    .map(|configured| match saved.source(&configured.name) {
                        Some(known) => Source {
                            status: known.status,
                            last_checked: known.last_checked,
                            ..configured.clone()
                        },
                        None => configured.clone(),
                    })
                    .collect();
                *state = Snapshot {
                    sources,
                    status_codes: std::mem::take(&mut state.status_codes),
                    ..saved
                };
            }
            Ok(None) => {}
            Err(e) => warn!("Could not restore snapshot: {:#}", e),
        }
        self.file = Some(file);
        self
    }

    fn state(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut Snapshot {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state().clone()
    }

    pub fn repository_metas(&self) -> Vec<RepositoryMeta> {
        self.state().repository_metas.clone()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.state().sources.clone()
    }

    pub fn loading_stage(&self) -> LoadingStage {
        self.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<LoadingStage> {
        self.progress.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_error(&self) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn report(&self, stage: Stage, progress: u8, message: impl Into<String>) {
        let stage = LoadingStage::new(stage, progress, message);
        debug!("{:?} {}%: {}", stage.stage, stage.progress, stage.message);
        self.progress.send_replace(stage);
    }

    fn fail(&self, message: &str) -> anyhow::Error {
        warn!("{}", message);
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
        self.report(Stage::Idle, 0, "Error occurred");
        anyhow!(message.to_string())
    }

    /// Derive the next snapshot from the current one and swap it in under a
    /// single lock, then mirror it to disk with the lock released.
    fn update(&self, change: impl FnOnce(&Snapshot) -> Snapshot) {
        let (revision, saved) = {
            let mut state = self.state();
            let next = change(&state);
            *state = next;
            let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
            (revision, self.file.as_ref().map(|_| state.clone()))
        };

        if let (Some(file), Some(snapshot)) = (&self.file, saved) {
            self.persist(file, revision, &snapshot);
        }
    }

    /// Write `snapshot` unless a later revision is already on disk.
    fn persist(&self, file: &SnapshotFile, revision: u64, snapshot: &Snapshot) {
        let mut written = self.persisted.lock().unwrap_or_else(PoisonError::into_inner);
        if revision <= *written {
            debug!("Snapshot revision {} superseded by {}", revision, *written);
            return;
        }
        match file.save(snapshot) {
            Ok(()) => *written = revision,
            Err(e) => warn!("Failed to persist snapshot: {:#}", e),
        }
    }

    fn client(&self, source: &str) -> Result<&RegistryClient> {
        self.clients
            .iter()
            .find(|c| c.source().name == source)
            .ok_or_else(|| anyhow!("Unknown source: {}", source))
    }

    fn full_refresh_is_fresh(&self) -> Option<Vec<RepositoryMeta>> {
        let state = self.state();
        let last_fetch = state.last_fetch?;
        let ttl = chrono::Duration::from_std(self.settings.cache_ttl).ok()?;
        if Utc::now() - last_fetch < ttl && !state.repository_metas.is_empty() {
            Some(state.repository_metas.clone())
        } else {
            None
        }
    }

    /// List catalogs and probe health of every source at once, then fetch
    /// tag lists in waves. Sources whose catalog failed contribute nothing.
    async fn fetch_catalog(&self, report_progress: bool) -> Result<(Vec<CatalogEntry>, Vec<Source>)> {
        if self.clients.is_empty() {
            return Err(self.fail(NO_SOURCES));
        }

        let listings = join_all(self.clients.iter().map(|client| async move {
            tokio::join!(client.repositories(), client.probe())
        }))
        .await;

        let mut pairs = Vec::new();
        let mut sources = Vec::with_capacity(listings.len());
        let mut reachable = 0;
        for (index, (listing, source)) in listings.into_iter().enumerate() {
            match listing {
                Ok(repositories) => {
                    reachable += 1;
                    pairs.extend(repositories.into_iter().map(|r| (index, r)));
                }
                Err(e) if e.is_not_found() => {
                    debug!("{} has no catalog", source.name);
                    reachable += 1;
                }
                Err(e) => warn!("{}", e),
            }
            sources.push(source);
        }
        if reachable == 0 {
            return Err(self.fail(NO_REACHABLE_REGISTRIES));
        }
        if report_progress {
            self.report(Stage::Catalog, 25, "Fetching tags...");
        }

        let listed = run_in_waves(
            pairs,
            self.settings.batch_size,
            |(client, repository)| async move {
                match self.clients[client].tags(&repository).await {
                    Ok(tags) => Some(CatalogEntry {
                        client,
                        tags: tags.into_iter().map(|t| t.name).collect(),
                        repository,
                    }),
                    Err(e) => {
                        warn!("Skipping {}: {}", repository.key(), e);
                        None
                    }
                }
            },
            |done, total| {
                if report_progress {
                    self.report(Stage::Tags, 25 + wave_progress(done, total, 25), "Fetching tags...");
                }
            },
        )
        .await;

        Ok((listed.into_iter().flatten().collect(), sources))
    }

    /// Full refresh: catalogs, tags and a sample of manifests from every
    /// source. Returns the cached list without any request when a full
    /// refresh finished within the cache TTL, unless `force`.
    pub async fn fetch_repository_metas(&self, force: bool) -> Result<Vec<RepositoryMeta>> {
        if !force {
            if let Some(cached) = self.full_refresh_is_fresh() {
                debug!("Using {} cached repositories", cached.len());
                return Ok(cached);
            }
        }

        self.report(Stage::Catalog, 5, "Fetching catalogs...");
        let (catalog, sources) = self.fetch_catalog(true).await?;

        let sample_size = self.settings.sample_size;
        let jobs: Vec<(usize, Tag)> = catalog
            .iter()
            .enumerate()
            .flat_map(|(entry, e)| {
                e.tags
                    .iter()
                    .take(sample_size)
                    .map(move |name| (entry, Tag::new(e.repository.clone(), name.clone())))
            })
            .collect();
        info!(
            "Sampling {} manifests across {} repositories",
            jobs.len(),
            catalog.len()
        );

        let sampled = run_in_waves(
            jobs,
            self.settings.batch_size,
            |(entry, tag)| {
                let client = &self.clients[catalog[entry].client];
                async move { (entry, summarize_tag(client, &tag).await) }
            },
            |done, total| {
                self.report(
                    Stage::Manifests,
                    50 + wave_progress(done, total, 35),
                    "Fetching manifests...",
                )
            },
        )
        .await;

        let mut by_entry: HashMap<usize, Vec<TagSummary>> = HashMap::new();
        for (entry, summary) in sampled {
            if let Some(summary) = summary {
                by_entry.entry(entry).or_default().push(summary);
            }
        }

        let now = Utc::now();
        let metas: Vec<RepositoryMeta> = catalog
            .iter()
            .enumerate()
            .map(|(index, e)| {
                let sampled = by_entry.remove(&index).unwrap_or_default();
                reducer::aggregate_meta(&e.repository, e.tags.len(), &sampled, now)
            })
            .collect();

        self.update(|prior| Snapshot {
            available_architectures: Snapshot::collect_architectures(&metas),
            repository_metas: metas.clone(),
            sources,
            last_fetch: Some(now),
            last_catalog_refresh: Some(now),
            ..prior.clone()
        });
        self.clear_error();
        self.report(
            Stage::Complete,
            100,
            format!("Loaded {} repositories", metas.len()),
        );
        info!("Loaded {} repositories", metas.len());

        Ok(metas)
    }

    /// Light refresh: catalogs, tag counts and health only. Aggregates of
    /// known repositories carry over from the last full refresh.
    pub async fn refresh_catalog(&self) -> Result<Vec<RepositoryMeta>> {
        let (catalog, sources) = self.fetch_catalog(false).await?;
        let counts: Vec<(Repository, usize)> = catalog
            .into_iter()
            .map(|e| (e.repository, e.tags.len()))
            .collect();

        let now = Utc::now();
        let mut metas = Vec::new();
        self.update(|prior| {
            metas = reducer::merge_catalog(&prior.repository_metas, &counts, now);
            Snapshot {
                available_architectures: Snapshot::collect_architectures(&metas),
                repository_metas: metas.clone(),
                sources,
                last_catalog_refresh: Some(now),
                ..prior.clone()
            }
        });
        debug!("Catalog refresh found {} repositories", metas.len());

        Ok(metas)
    }

    /// Every tag of one repository, with per-platform sizes. Cached per
    /// source and repository for the cache TTL.
    ///
    /// Without an explicit `source`, the source that listed the repository
    /// is used, then the first configured one.
    pub async fn fetch_repository_detail(
        &self,
        name: &str,
        namespace: Option<&str>,
        source: Option<&str>,
    ) -> Result<RepositoryDetail> {
        let source = match source {
            Some(source) => source.to_string(),
            None => self.resolve_source(name, namespace)?,
        };
        let client = self.client(&source)?;
        let repository = Repository::new(&source, namespace.map(str::to_string), name);
        let key = repository.key();

        let ttl = chrono::Duration::from_std(self.settings.cache_ttl)?;
        if let Some(detail) = self.state().repository_details.get(&key) {
            if detail.is_fresh(ttl, Utc::now()) {
                debug!("Using cached detail for {}", key);
                return Ok(detail.clone());
            }
        }

        let tags = client
            .tags(&repository)
            .await
            .with_context(|| format!("Failed to load repository details for {}", key))?;
        let tag_count = tags.len();

        let summaries = run_in_waves(
            tags,
            self.settings.detail_batch_size,
            |tag| async move { summarize_tag(client, &tag).await },
            |done, total| debug!("Detail wave {}/{} for {}", done, total, key),
        )
        .await;
        let tags: Vec<TagSummary> = summaries.into_iter().flatten().collect();

        let mut detail = reducer::aggregate_detail(&repository, tags, Utc::now());
        detail.meta.tag_count = tag_count;

        self.update(|prior| {
            let mut next = prior.clone();
            next.repository_details.insert(key.clone(), detail.clone());
            next
        });

        Ok(detail)
    }

    /// The repository `full_name` on `source`, else on the source that
    /// listed it, else on the first configured source.
    pub fn locate(&self, full_name: &str, source: Option<&str>) -> Result<Repository> {
        let (namespace, name) = split_repository_name(full_name);
        let source = match source {
            Some(source) => source.to_string(),
            None => self.resolve_source(&name, namespace.as_deref())?,
        };
        self.client(&source)?;
        Ok(Repository::new(source, namespace, name))
    }

    fn resolve_source(&self, name: &str, namespace: Option<&str>) -> Result<String> {
        let state = self.state();
        if let Some(meta) = state
            .repository_metas
            .iter()
            .find(|m| m.name == name && m.namespace.as_deref() == namespace)
        {
            return Ok(meta.source.clone());
        }
        state
            .sources
            .first()
            .map(|s| s.name.clone())
            .ok_or_else(|| anyhow!(NO_SOURCES))
    }

    /// Delete one tag and drop it from the cache on success.
    pub async fn delete_tag(&self, repository: &Repository, tag: &str) -> Result<bool> {
        let client = self.client(&repository.source)?;
        let deleted = client.delete_tag(&Tag::new(repository.clone(), tag)).await;
        if deleted {
            info!("Deleted {}:{}", repository.key(), tag);
            let mutation = Mutation::tag_deleted(repository, tag);
            self.update(|prior| reducer::apply(prior, &mutation));
        }
        Ok(deleted)
    }

    /// Delete several tags one after another, reporting partial success.
    pub async fn delete_tags(&self, repository: &Repository, tags: &[String]) -> Result<DeleteReport> {
        let mut report = DeleteReport {
            requested: tags.len(),
            ..Default::default()
        };
        for tag in tags {
            if self.delete_tag(repository, tag).await? {
                report.deleted.push(tag.clone());
            } else {
                report.failed.push(tag.clone());
            }
        }
        Ok(report)
    }

    /// Delete every tag of a repository. The repository leaves the cache
    /// only when all of them went.
    pub async fn delete_repository(&self, repository: &Repository) -> Result<bool> {
        let client = self.client(&repository.source)?;
        let deleted = client.delete_repository(repository).await;
        if deleted {
            info!("Deleted repository {}", repository.key());
            let mutation = Mutation::repository_deleted(repository);
            self.update(|prior| reducer::apply(prior, &mutation));
        }
        Ok(deleted)
    }

    /// Probe every source and record its health.
    pub async fn probe_sources(&self) -> Vec<Source> {
        let sources = join_all(self.clients.iter().map(|c| c.probe())).await;
        self.update(|prior| Snapshot {
            sources: sources.clone(),
            ..prior.clone()
        });
        sources
    }

    pub fn cached_detail(&self, source: &str, full_name: &str) -> Option<RepositoryDetail> {
        self.state()
            .repository_details
            .get(&repository_key(source, full_name))
            .cloned()
    }
}

/// Manifest and images of one tag. Failures are logged and yield `None`.
async fn summarize_tag(client: &RegistryClient, tag: &Tag) -> Option<TagSummary> {
    let manifest = match client.manifest(tag).await {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("Skipping tag {}: {}", tag.name, e);
            return None;
        }
    };
    let images = client.images(&manifest).await;
    Some(TagSummary::from_images(&tag.name, &manifest, &images))
}

fn wave_progress(done: usize, total: usize, span: u8) -> u8 {
    if total == 0 {
        return span;
    }
    ((done * span as usize) / total) as u8
}
