//! Service layer for the command line
//!
//! Wires configuration into a [`RepositoryStore`] and turns store results
//! into text, keeping main.rs down to argument handling.

pub mod render;

use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::auth::DockerConfigKeychain;
use crate::config::Config;
use crate::filter::RepositoryFilter;
use crate::registry::{HyperTransport, Transport};
use crate::store::{DeleteReport, RefreshIntervals, RepositoryStore, Scheduler, Visibility};


pub struct ExploreService {
    store: Arc<RepositoryStore>,
    intervals: RefreshIntervals,
}

impl ExploreService {
    pub fn new(store: Arc<RepositoryStore>, intervals: RefreshIntervals) -> Self {
        Self { store, intervals }
    }

    /// Build the store described by `config`, restoring its cached snapshot.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HyperTransport::new());
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let keychain = DockerConfigKeychain::new();
        let sources = config.sources(&keychain).context("Failed to load sources")?;
        if sources.is_empty() {
            warn!("No registry sources configured");
        }
        let status_codes = config
            .status_codes()
            .context("Failed to load status codes")?;

        let mut store = RepositoryStore::new(
            sources,
            transport,
            config.fetch.client_settings(),
            config.fetch.fetch_settings(),
        )
        .with_status_codes(status_codes);
        if let Some(file) = config.snapshot_file() {
            store = store.with_snapshot_file(file);
        }

        Ok(Self::new(Arc::new(store), config.fetch.refresh_intervals()))
    }

    pub fn store(&self) -> &Arc<RepositoryStore> {
        &self.store
    }

    /// Probe every source and describe its health.
    pub async fn sources(&self) -> String {
        let sources = self.store.probe_sources().await;
        render::sources(&sources, &self.store.snapshot().status_codes)
    }

    pub async fn list(&self, force: bool, filter: &RepositoryFilter) -> Result<String> {
        let metas = self.store.fetch_repository_metas(force).await?;
        let visible = filter.apply(&metas, &self.store.sources());
        Ok(render::repositories(&visible, Utc::now()))
    }

    pub async fn show(&self, repository: &str, source: Option<&str>) -> Result<String> {
        let repository = self.store.locate(repository, source)?;
        let detail = self
            .store
            .fetch_repository_detail(
                &repository.name,
                repository.namespace.as_deref(),
                Some(&repository.source),
            )
            .await?;
        Ok(render::repository_detail(&detail, Utc::now()))
    }

    pub async fn delete_tags(
        &self,
        repository: &str,
        tags: &[String],
        source: Option<&str>,
    ) -> Result<DeleteReport> {
        let repository = self.store.locate(repository, source)?;
        let report = self.store.delete_tags(&repository, tags).await?;
        info!("{}", report);
        Ok(report)
    }

    pub async fn delete_repository(&self, repository: &str, source: Option<&str>) -> Result<bool> {
        let repository = self.store.locate(repository, source)?;
        self.store.delete_repository(&repository).await
    }

    /// Keep the list refreshed in the background, handing the rendered
    /// table to `emit` whenever it changes, until `shutdown` resolves.
    pub async fn watch(
        &self,
        filter: &RepositoryFilter,
        shutdown: impl Future<Output = ()>,
        mut emit: impl FnMut(String),
    ) -> Result<()> {
        let (_visible, visibility) = watch::channel(Visibility::Visible);
        let mut scheduler = Scheduler::start(self.store.clone(), visibility, self.intervals);

        if let Err(e) = self.store.fetch_repository_metas(false).await {
            warn!("Initial refresh failed: {:#}", e);
        }

        let mut ticker = tokio::time::interval(self.intervals.light);
        let mut last_shown = None;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let metas = filter.apply(&self.store.repository_metas(), &self.store.sources());
                    if last_shown.as_ref() != Some(&metas) {
                        emit(render::repositories(&metas, Utc::now()));
                        last_shown = Some(metas);
                    }
                }
            }
        }

        scheduler.dispose();
        Ok(())
    }
}
